pub mod state;

pub use state::{InstallationState, InstalledPlugin, StateStore, STATE_SCHEMA_VERSION};
