//! Plugin catalog for the MSP monitoring stack.
//!
//! This crate models the set of installable plugins, loads and validates the
//! built-in catalog, and resolves install order across declared dependencies.
//! It performs no filesystem writes, so front-ends that only browse the
//! catalog can depend on it without pulling in the installer.

pub mod catalog;
pub mod category;
pub mod definition;
pub mod error;
pub mod resolver;
pub mod version;

pub use catalog::{Catalog, PluginPack, BUILTIN_CATALOG};
pub use category::Category;
pub use definition::{
    is_valid_env_name, is_valid_plugin_id, Complexity, EnvVarSpec, PluginDefinition, ServiceSpec,
    TemplateKind,
};
pub use error::{CatalogError, ResolveError};
pub use resolver::{installed_dependents, resolve_install_order};
pub use version::{is_schema_compatible, CATALOG_SCHEMA_VERSION};
