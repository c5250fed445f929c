pub mod installer;
pub mod manager;
pub mod ports;
pub mod renderer;
pub mod template;

pub use installer::InstallTransaction;
pub use manager::{
    InstallOptions, InstallReport, InstalledEntry, ListFilter, PluginDetails, PluginListing,
    PluginManager, PluginStatus, StatusReport, UninstallOptions, UninstallReport,
};
pub use ports::{allocate, ReservedPorts, DEFAULT_BASE_PORTS, DEFAULT_SEARCH_WINDOW};
pub use renderer::{render, render_artifacts, RenderedArtifact};
pub use template::RenderError;
