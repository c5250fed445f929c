use std::path::PathBuf;

use thiserror::Error;

/// Failure to load or validate a catalog document.
///
/// Any of these is fatal for the process: the installer never runs against a
/// catalog that failed validation.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid catalog document: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("catalog schema {found} is not supported by this build (supports {supported})")]
    IncompatibleSchema { found: String, supported: String },

    #[error("plugin id '{0}' is declared more than once")]
    DuplicateId(String),

    #[error("plugin '{id}' is invalid: {reason}")]
    InvalidDefinition { id: String, reason: String },

    #[error("plugin '{plugin}' depends on unknown plugin '{dependency}'")]
    UnknownDependency { plugin: String, dependency: String },

    #[error("dependency cycle in catalog: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("pack '{0}' is declared more than once")]
    DuplicatePack(String),

    #[error("pack '{pack}' references unknown plugin '{plugin}'")]
    UnknownPackMember { pack: String, plugin: String },
}

/// Failure to compute an install order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("unknown plugin '{0}'")]
    UnknownPlugin(String),

    /// The path starts and ends with the node that was revisited.
    #[error("dependency cycle detected: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),
}
