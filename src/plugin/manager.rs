//! Installer orchestrator.
//!
//! `PluginManager` is the single entry point front-ends use. Every command
//! loads the on-disk state fresh, works on an in-memory copy, and persists it
//! once at the end. Directory changes go through an [`InstallTransaction`] so
//! a failure anywhere in a command restores the tree and leaves the state
//! file untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::Utc;
use msp_plugin_catalog::{
    installed_dependents, is_valid_plugin_id, resolve_install_order, Catalog, Category,
    PluginDefinition, PluginPack,
};

use crate::config::Config;
use crate::error::{PluginError, Result};
use crate::plugin::installer::InstallTransaction;
use crate::plugin::ports::allocate;
use crate::plugin::renderer;
use crate::storage::{InstallationState, InstalledPlugin, StateStore};
use crate::utils::paths::get_base_compose_path;

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub category: Option<Category>,
    pub installed_only: bool,
}

#[derive(Debug, Clone)]
pub struct PluginListing<'a> {
    pub definition: &'a PluginDefinition,
    pub installed: Option<InstalledPlugin>,
}

/// Everything `info` shows about one plugin.
#[derive(Debug, Clone)]
pub struct PluginDetails<'a> {
    pub definition: &'a PluginDefinition,
    pub installed: Option<InstalledPlugin>,
    /// Direct dependencies that are not installed yet
    pub missing_dependencies: Vec<String>,
    /// Installed plugins that would block a plain uninstall
    pub installed_dependents: Vec<String>,
    /// Port an install would get right now
    pub planned_port: Option<u16>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    /// Re-render requested plugins that are already installed, and install
    /// even when the base stack is missing
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledEntry {
    pub plugin_id: String,
    pub port: u16,
    pub artifacts: Vec<PathBuf>,
    pub reinstalled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct InstallReport {
    /// In install order
    pub installed: Vec<InstalledEntry>,
    /// Requested plugins that were left as they were
    pub already_installed: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UninstallOptions {
    /// Also remove installed plugins that depend on the target
    pub force: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UninstallReport {
    /// In removal order, dependents first
    pub removed: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PluginStatus {
    pub record: InstalledPlugin,
    pub display_name: Option<String>,
    /// Recorded artifacts that are no longer on disk
    pub missing_artifacts: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub install_dir: PathBuf,
    pub base_stack_present: bool,
    pub state_file: PathBuf,
    pub state_file_present: bool,
    pub base_ports: BTreeSet<u16>,
    pub reserved_ports: BTreeSet<u16>,
    pub plugins: Vec<PluginStatus>,
}

pub struct PluginManager {
    catalog: Catalog,
    config: Config,
    install_dir: PathBuf,
}

impl PluginManager {
    pub fn new(catalog: Catalog, config: Config, install_dir: impl Into<PathBuf>) -> Result<Self> {
        config.validate().map_err(PluginError::Config)?;
        Ok(Self {
            catalog,
            config,
            install_dir: install_dir.into(),
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    fn load_state(&self) -> Result<(StateStore, InstallationState)> {
        let mut store = StateStore::new(&self.install_dir);
        let state = store.load(&self.config.ports.reserved)?;
        Ok((store, state))
    }

    fn definition(&self, id: &str) -> Result<&PluginDefinition> {
        if !is_valid_plugin_id(id) {
            return Err(PluginError::InvalidPluginId(id.to_string()));
        }
        self.catalog
            .get(id)
            .ok_or_else(|| PluginError::UnknownPlugin(id.to_string()))
    }

    /// Fail early if the state file cannot be trusted.
    pub fn verify_state(&self) -> Result<()> {
        self.load_state().map(|_| ())
    }

    // ========================================================================
    // Read-only commands
    // ========================================================================

    pub fn list(&self, filter: &ListFilter) -> Result<Vec<PluginListing<'_>>> {
        let (_, state) = self.load_state()?;
        Ok(self
            .catalog
            .list(filter.category)
            .into_iter()
            .map(|definition| PluginListing {
                definition,
                installed: state.get(&definition.id).cloned(),
            })
            .filter(|l| !filter.installed_only || l.installed.is_some())
            .collect())
    }

    pub fn info(&self, id: &str) -> Result<PluginDetails<'_>> {
        let definition = self.definition(id)?;
        let (_, state) = self.load_state()?;
        let installed = state.get(id).cloned();

        let missing_dependencies = definition
            .dependencies
            .iter()
            .filter(|d| !state.is_installed(d))
            .cloned()
            .collect();
        let dependents = installed_dependents(&self.catalog, id, &state.installed_ids());
        let planned_port = match &installed {
            Some(record) => Some(record.assigned_port),
            None => allocate(
                definition.base_port_hint,
                state.reserved_ports(),
                self.config.ports.search_window,
            )
            .ok(),
        };

        Ok(PluginDetails {
            definition,
            installed,
            missing_dependencies,
            installed_dependents: dependents,
            planned_port,
        })
    }

    pub fn categories(&self) -> BTreeMap<Category, usize> {
        self.catalog.category_counts()
    }

    pub fn packs(&self) -> &[PluginPack] {
        self.catalog.packs()
    }

    pub fn status(&self) -> Result<StatusReport> {
        let (store, state) = self.load_state()?;
        let plugins = state
            .plugins()
            .iter()
            .map(|record| PluginStatus {
                display_name: self
                    .catalog
                    .get(&record.plugin_id)
                    .map(|d| d.display_name.clone()),
                missing_artifacts: record
                    .artifact_paths
                    .iter()
                    .filter(|p| !self.install_dir.join(p).exists())
                    .cloned()
                    .collect(),
                record: record.clone(),
            })
            .collect();

        Ok(StatusReport {
            install_dir: self.install_dir.clone(),
            base_stack_present: get_base_compose_path(&self.install_dir).is_file(),
            state_file: store.path().to_path_buf(),
            state_file_present: store.path().is_file(),
            base_ports: state.base_ports().clone(),
            reserved_ports: state.reserved_ports().all(),
            plugins,
        })
    }

    // ========================================================================
    // Install
    // ========================================================================

    /// Install the requested plugins and any missing dependencies as one
    /// all-or-nothing transaction.
    pub fn install<S: AsRef<str>>(&self, ids: &[S], options: InstallOptions) -> Result<InstallReport> {
        let tx = InstallTransaction::begin(&self.install_dir);
        let span = tracing::info_span!("install", txn = %tx.id());
        let _enter = span.enter();

        let requested: Vec<&str> = ids.iter().map(AsRef::as_ref).collect();
        for id in &requested {
            self.definition(id)?;
        }

        let (mut store, state) = self.load_state()?;

        let order = resolve_install_order(&self.catalog, &requested, |id| {
            state.is_installed(id) && !(options.force && requested.contains(&id))
        })?;

        let mut report = InstallReport {
            already_installed: requested
                .iter()
                .filter(|id| state.is_installed(id) && !order.iter().any(|o| o == *id))
                .map(|id| id.to_string())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            ..Default::default()
        };

        if order.is_empty() {
            tracing::info!(requested = ?requested, "nothing to install");
            return Ok(report);
        }

        let base_compose = get_base_compose_path(&self.install_dir);
        if self.config.install.require_base_stack && !base_compose.is_file() {
            if !options.force {
                return Err(PluginError::BaseStackMissing(base_compose));
            }
            tracing::warn!(path = ?base_compose, "base stack missing, continuing because of --force");
            report.warnings.push(format!(
                "base stack not found at {}; installed anyway because of --force",
                base_compose.display()
            ));
        }

        tracing::info!(order = ?order, "installing");
        let mut working = state.clone();
        let mut tx = tx;
        match self.apply_install(&mut tx, &mut working, &order) {
            Ok(entries) => report.installed = entries,
            Err(e) => {
                tracing::error!("install failed, rolling back: {}", e);
                tx.rollback();
                return Err(e);
            }
        }

        if tx.created_root() {
            working.mark_plugins_root_owned();
        }

        if let Err(e) = store.save(&working) {
            tracing::error!("saving state failed, rolling back: {}", e);
            tx.rollback();
            return Err(e);
        }
        tx.commit();

        for entry in &report.installed {
            tracing::info!(plugin = %entry.plugin_id, port = entry.port, "installed");
        }
        Ok(report)
    }

    fn apply_install(
        &self,
        tx: &mut InstallTransaction,
        state: &mut InstallationState,
        order: &[String],
    ) -> Result<Vec<InstalledEntry>> {
        let mut entries = Vec::with_capacity(order.len());
        for id in order {
            let definition = self.definition(id)?;
            let previous = state.get(id).map(|r| r.assigned_port);
            let port = match previous {
                Some(port) => port,
                None => allocate(
                    definition.base_port_hint,
                    state.reserved_ports(),
                    self.config.ports.search_window,
                )?,
            };

            tx.stage_plugin_dir(&self.install_dir, id)?;
            let written = renderer::render(definition, port, &self.install_dir)?;
            let artifacts: Vec<PathBuf> = written
                .iter()
                .map(|p| p.strip_prefix(&self.install_dir).unwrap_or(p.as_path()).to_path_buf())
                .collect();

            state.record_install(InstalledPlugin {
                plugin_id: id.clone(),
                version: definition.version.clone(),
                assigned_port: port,
                installed_at: Utc::now(),
                artifact_paths: artifacts.clone(),
            })?;
            tracing::debug!(plugin = %id, port, files = artifacts.len(), "rendered");

            entries.push(InstalledEntry {
                plugin_id: id.clone(),
                port,
                artifacts,
                reinstalled: previous.is_some(),
            });
        }
        Ok(entries)
    }

    pub fn install_pack(&self, name: &str, options: InstallOptions) -> Result<InstallReport> {
        let pack = self
            .catalog
            .pack(name)
            .ok_or_else(|| PluginError::UnknownPack(name.to_string()))?;
        tracing::info!(pack = name, plugins = ?pack.plugins, "installing pack");
        self.install(&pack.plugins, options)
    }

    // ========================================================================
    // Uninstall
    // ========================================================================

    /// Remove a plugin. Installed dependents block removal unless forced, in
    /// which case they are removed first.
    pub fn uninstall(&self, id: &str, options: UninstallOptions) -> Result<UninstallReport> {
        let mut tx = InstallTransaction::begin(&self.install_dir);
        let span = tracing::info_span!("uninstall", txn = %tx.id(), plugin = id);
        let _enter = span.enter();

        if !is_valid_plugin_id(id) {
            return Err(PluginError::InvalidPluginId(id.to_string()));
        }
        let (mut store, state) = self.load_state()?;
        if !state.is_installed(id) {
            if !self.catalog.contains(id) {
                return Err(PluginError::UnknownPlugin(id.to_string()));
            }
            return Err(PluginError::NotInstalled(id.to_string()));
        }

        let dependents = installed_dependents(&self.catalog, id, &state.installed_ids());
        if !dependents.is_empty() && !options.force {
            return Err(PluginError::DependentsExist(dependents));
        }

        // Reverse install order puts dependents ahead of what they depend on.
        let removal: Vec<String> = state
            .installed_ids()
            .into_iter()
            .rev()
            .filter(|installed| *installed == id || dependents.iter().any(|d| d == installed))
            .map(str::to_string)
            .collect();
        tracing::info!(removal = ?removal, "uninstalling");

        let mut working = state.clone();
        for plugin_id in &removal {
            let step = tx
                .remove_plugin_dir(&self.install_dir, plugin_id)
                .and_then(|_| working.record_uninstall(plugin_id));
            if let Err(e) = step {
                tracing::error!("uninstall failed, rolling back: {}", e);
                tx.rollback();
                return Err(e);
            }
        }
        if working.is_empty() && working.owns_plugins_root() {
            tx.remove_root_if_empty_on_commit();
        }

        if let Err(e) = store.save(&working) {
            tracing::error!("saving state failed, rolling back: {}", e);
            tx.rollback();
            return Err(e);
        }
        tx.commit();

        Ok(UninstallReport { removed: removal })
    }
}
