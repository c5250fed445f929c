//! Error taxonomy for install, uninstall and state handling.

use std::path::PathBuf;

use msp_plugin_catalog::{CatalogError, ResolveError};
use thiserror::Error;

use crate::plugin::template::RenderError;

pub type Result<T> = std::result::Result<T, PluginError>;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("unknown plugin '{0}'. Run 'msp-plugins list' to see available plugins")]
    UnknownPlugin(String),

    #[error("dependency cycle detected: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),

    #[error("no free port in {hint}..{} (window of {window})", hint.saturating_add(window.saturating_sub(1)))]
    PortExhausted { hint: u16, window: u16 },

    #[error("installed plugins depend on it: {}. Use --force to remove them too", .0.join(", "))]
    DependentsExist(Vec<String>),

    #[error("plugin '{0}' is not installed")]
    NotInstalled(String),

    #[error("installation state {path} is corrupt: {reason}")]
    CorruptState { path: PathBuf, reason: String },

    #[error("failed to write {path}: {source}")]
    ArtifactWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("base stack not found at {0}. Install the monitoring stack first or use --force")]
    BaseStackMissing(PathBuf),

    #[error("installation state {path} was modified by another process; re-run the command")]
    StateChanged { path: PathBuf },

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid plugin id '{0}'")]
    InvalidPluginId(String),

    #[error("unknown plugin pack '{0}'. Run 'msp-plugins packs' to see available packs")]
    UnknownPack(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl PluginError {
    /// Process exit code reported for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            PluginError::UnknownPlugin(_) => 2,
            PluginError::CycleDetected(_) => 3,
            PluginError::PortExhausted { .. } => 4,
            PluginError::DependentsExist(_) => 5,
            PluginError::NotInstalled(_) => 6,
            PluginError::CorruptState { .. } => 7,
            PluginError::ArtifactWriteFailed { .. } => 8,
            PluginError::BaseStackMissing(_) => 9,
            PluginError::StateChanged { .. } => 10,
            _ => 1,
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PluginError::Io {
            context: context.into(),
            source,
        }
    }
}

impl From<ResolveError> for PluginError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::UnknownPlugin(id) => PluginError::UnknownPlugin(id),
            ResolveError::CycleDetected(path) => PluginError::CycleDetected(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_for_taxonomy() {
        let errors = vec![
            PluginError::UnknownPlugin("x".into()),
            PluginError::CycleDetected(vec!["a".into(), "b".into(), "a".into()]),
            PluginError::PortExhausted { hint: 9100, window: 10 },
            PluginError::DependentsExist(vec!["b".into()]),
            PluginError::NotInstalled("x".into()),
            PluginError::CorruptState {
                path: PathBuf::from("plugins.json"),
                reason: "bad".into(),
            },
            PluginError::ArtifactWriteFailed {
                path: PathBuf::from("x"),
                source: std::io::Error::other("disk full"),
            },
            PluginError::BaseStackMissing(PathBuf::from("docker-compose.yml")),
            PluginError::StateChanged {
                path: PathBuf::from("plugins.json"),
            },
        ];
        let mut codes: Vec<u8> = errors.iter().map(PluginError::exit_code).collect();
        assert!(codes.iter().all(|c| *c > 1));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_resolve_error_conversion() {
        let err: PluginError = ResolveError::CycleDetected(vec!["a".into(), "b".into(), "a".into()]).into();
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.to_string(), "dependency cycle detected: a -> b -> a");

        let err: PluginError = ResolveError::UnknownPlugin("ghost".into()).into();
        assert!(matches!(err, PluginError::UnknownPlugin(id) if id == "ghost"));
    }

    #[test]
    fn test_port_exhausted_message() {
        let err = PluginError::PortExhausted { hint: 9100, window: 3 };
        assert_eq!(err.to_string(), "no free port in 9100..9102 (window of 3)");
    }

    #[test]
    fn test_other_errors_exit_one() {
        assert_eq!(PluginError::Config("bad".into()).exit_code(), 1);
        assert_eq!(PluginError::UnknownPack("p".into()).exit_code(), 1);
    }
}
