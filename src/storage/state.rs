//! Installation state persisted as `plugins.json` in the installation directory.
//!
//! The store is the only writer of that file. Each command loads it, mutates
//! an in-memory copy and saves it once. Saving replaces the file atomically
//! and refuses to overwrite a file that changed since it was loaded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::{PluginError, Result};
use crate::plugin::ports::ReservedPorts;
use crate::utils::paths::{get_state_file_path, PLUGINS_DIR_NAME};

pub const STATE_SCHEMA_VERSION: u32 = 1;

/// One installed plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPlugin {
    pub plugin_id: String,
    pub version: String,
    pub assigned_port: u16,
    pub installed_at: DateTime<Utc>,
    /// Files written for this plugin, relative to the installation directory
    pub artifact_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationState {
    schema_version: u32,
    base_ports: BTreeSet<u16>,
    /// Install order
    plugins: Vec<InstalledPlugin>,
    /// `plugins/` was created by an install rather than by the user
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    owns_plugins_root: bool,
    #[serde(skip)]
    reserved: ReservedPorts,
}

impl InstallationState {
    pub fn new(base_ports: impl IntoIterator<Item = u16>) -> Self {
        let base_ports: BTreeSet<u16> = base_ports.into_iter().collect();
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            reserved: ReservedPorts::new(base_ports.iter().copied()),
            base_ports,
            plugins: Vec::new(),
            owns_plugins_root: false,
        }
    }

    pub fn plugins(&self) -> &[InstalledPlugin] {
        &self.plugins
    }

    pub fn get(&self, plugin_id: &str) -> Option<&InstalledPlugin> {
        self.plugins.iter().find(|p| p.plugin_id == plugin_id)
    }

    pub fn is_installed(&self, plugin_id: &str) -> bool {
        self.get(plugin_id).is_some()
    }

    /// Installed ids in install order.
    pub fn installed_ids(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.plugin_id.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn base_ports(&self) -> &BTreeSet<u16> {
        &self.base_ports
    }

    pub fn reserved_ports(&self) -> &ReservedPorts {
        &self.reserved
    }

    /// Whether `plugins/` may be deleted once the last plugin is gone.
    pub fn owns_plugins_root(&self) -> bool {
        self.owns_plugins_root
    }

    pub fn mark_plugins_root_owned(&mut self) {
        self.owns_plugins_root = true;
    }

    /// Record an install, replacing any existing record for the same id.
    ///
    /// A replaced record keeps its position in install order and gives up its
    /// port before the new one is reserved.
    pub fn record_install(&mut self, record: InstalledPlugin) -> Result<()> {
        let existing = self.plugins.iter().position(|p| p.plugin_id == record.plugin_id);
        let previous_port = existing.map(|i| self.plugins[i].assigned_port);
        if let Some(port) = previous_port {
            self.reserved.release(port);
        }

        if !self.reserved.reserve(record.assigned_port) {
            if let Some(port) = previous_port {
                self.reserved.reserve(port);
            }
            return Err(PluginError::PortExhausted {
                hint: record.assigned_port,
                window: 1,
            });
        }

        match existing {
            Some(i) => self.plugins[i] = record,
            None => self.plugins.push(record),
        }
        Ok(())
    }

    /// Remove a plugin's record and release its port.
    pub fn record_uninstall(&mut self, plugin_id: &str) -> Result<InstalledPlugin> {
        let index = self
            .plugins
            .iter()
            .position(|p| p.plugin_id == plugin_id)
            .ok_or_else(|| PluginError::NotInstalled(plugin_id.to_string()))?;
        let record = self.plugins.remove(index);
        self.reserved.release(record.assigned_port);
        Ok(record)
    }

    /// Add configured base ports that the file did not know about.
    ///
    /// A port already assigned to a plugin is skipped; the plugin keeps it.
    fn merge_base_ports(&mut self, configured: &[u16]) {
        for &port in configured {
            if self.base_ports.contains(&port) {
                continue;
            }
            if let Some(owner) = self.plugins.iter().find(|p| p.assigned_port == port) {
                tracing::warn!(
                    port,
                    plugin = %owner.plugin_id,
                    "configured base port is already assigned, not reserving it"
                );
                continue;
            }
            self.base_ports.insert(port);
        }
        self.rebuild_reserved();
    }

    fn rebuild_reserved(&mut self) {
        let mut reserved = ReservedPorts::new(self.base_ports.iter().copied());
        for p in &self.plugins {
            reserved.reserve(p.assigned_port);
        }
        self.reserved = reserved;
    }

    /// Check the invariants a loaded file must satisfy.
    fn validate(&self) -> std::result::Result<(), String> {
        if self.schema_version != STATE_SCHEMA_VERSION {
            return Err(format!(
                "unsupported schema_version {} (expected {})",
                self.schema_version, STATE_SCHEMA_VERSION
            ));
        }

        let mut ids = HashSet::new();
        let mut ports = HashSet::new();
        for p in &self.plugins {
            if !msp_plugin_catalog::is_valid_plugin_id(&p.plugin_id) {
                return Err(format!("invalid plugin id '{}'", p.plugin_id));
            }
            if !ids.insert(p.plugin_id.as_str()) {
                return Err(format!("plugin '{}' is recorded twice", p.plugin_id));
            }
            if semver::Version::parse(&p.version).is_err() {
                return Err(format!("plugin '{}' has invalid version '{}'", p.plugin_id, p.version));
            }
            if p.assigned_port == 0 {
                return Err(format!("plugin '{}' has port 0", p.plugin_id));
            }
            if self.base_ports.contains(&p.assigned_port) {
                return Err(format!(
                    "plugin '{}' holds base stack port {}",
                    p.plugin_id, p.assigned_port
                ));
            }
            if !ports.insert(p.assigned_port) {
                return Err(format!("port {} is assigned twice", p.assigned_port));
            }
            let own_dir = Path::new(PLUGINS_DIR_NAME).join(&p.plugin_id);
            for artifact in &p.artifact_paths {
                let contained = artifact.starts_with(&own_dir)
                    && artifact.components().all(|c| matches!(c, Component::Normal(_)));
                if !contained {
                    return Err(format!(
                        "artifact {:?} of '{}' is outside {:?}",
                        artifact, p.plugin_id, own_dir
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Reads and writes the state file of one installation directory.
#[derive(Debug)]
pub struct StateStore {
    install_dir: PathBuf,
    path: PathBuf,
    /// Bytes seen by the last load or save; None if the file did not exist
    snapshot: Option<Vec<u8>>,
}

impl StateStore {
    pub fn new(install_dir: &Path) -> Self {
        Self {
            install_dir: install_dir.to_path_buf(),
            path: get_state_file_path(install_dir),
            snapshot: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn corrupt(&self, reason: impl Into<String>) -> PluginError {
        PluginError::CorruptState {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    fn read_current(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PluginError::io(
                format!("Failed to read state file {:?}", self.path),
                e,
            )),
        }
    }

    /// Load the state, or an empty state if the file does not exist.
    ///
    /// `base_ports` seeds a new state and is merged into an existing one.
    pub fn load(&mut self, base_ports: &[u16]) -> Result<InstallationState> {
        let Some(bytes) = self.read_current()? else {
            tracing::debug!(path = ?self.path, "no state file, starting empty");
            self.snapshot = None;
            return Ok(InstallationState::new(base_ports.iter().copied()));
        };

        let mut state: InstallationState =
            serde_json::from_slice(&bytes).map_err(|e| self.corrupt(e.to_string()))?;
        state.validate().map_err(|reason| self.corrupt(reason))?;
        state.merge_base_ports(base_ports);

        tracing::debug!(path = ?self.path, plugins = state.plugins.len(), "loaded state");
        self.snapshot = Some(bytes);
        Ok(state)
    }

    /// Persist the state atomically.
    ///
    /// Fails with `StateChanged` if the file no longer matches what was
    /// loaded. An empty state removes the file instead of writing it.
    pub fn save(&mut self, state: &InstallationState) -> Result<()> {
        if self.read_current()? != self.snapshot {
            return Err(PluginError::StateChanged {
                path: self.path.clone(),
            });
        }

        if state.is_empty() {
            if self.snapshot.is_some() {
                fs::remove_file(&self.path).map_err(|e| {
                    PluginError::io(format!("Failed to remove state file {:?}", self.path), e)
                })?;
                tracing::debug!(path = ?self.path, "removed empty state file");
            }
            self.snapshot = None;
            return Ok(());
        }

        let mut bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| PluginError::io("Failed to serialize state", std::io::Error::other(e)))?;
        bytes.push(b'\n');

        fs::create_dir_all(&self.install_dir).map_err(|e| {
            PluginError::io(format!("Failed to create {:?}", self.install_dir), e)
        })?;
        let mut tmp = NamedTempFile::new_in(&self.install_dir)
            .map_err(|e| PluginError::io("Failed to create temporary state file", e))?;
        tmp.write_all(&bytes)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| PluginError::io("Failed to write temporary state file", e))?;
        tmp.persist(&self.path).map_err(|e| {
            PluginError::io(format!("Failed to replace state file {:?}", self.path), e.error)
        })?;

        tracing::debug!(path = ?self.path, plugins = state.plugins.len(), "saved state");
        self.snapshot = Some(bytes);
        Ok(())
    }
}
