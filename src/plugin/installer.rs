//! Directory transactions for plugin install and uninstall.
//!
//! Every plugin directory a command touches goes through an
//! [`InstallTransaction`]. New directories are removed on rollback. Existing
//! directories are moved aside to `plugins/.<id>.bak-<uuid>` first, then
//! restored on rollback or deleted on commit. User files listed in
//! [`PRESERVED_FILES`] are carried over into the replacement directory.

use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{PluginError, Result};
use crate::utils::paths::{get_plugin_dir, get_plugins_root};

/// Files the user owns inside a plugin directory; never re-rendered.
pub const PRESERVED_FILES: [&str; 1] = [".env"];

#[derive(Debug)]
enum Change {
    /// Directory did not exist before this transaction.
    Created { dir: PathBuf },
    /// Directory existed and was moved to `backup`; a fresh one may replace it.
    MovedAside { dir: PathBuf, backup: PathBuf },
}

#[derive(Debug)]
pub struct InstallTransaction {
    id: Uuid,
    plugins_root: PathBuf,
    created_root: bool,
    remove_empty_root: bool,
    changes: Vec<Change>,
}

impl InstallTransaction {
    pub fn begin(install_dir: &Path) -> Self {
        Self {
            id: Uuid::new_v4(),
            plugins_root: get_plugins_root(install_dir),
            created_root: false,
            remove_empty_root: false,
            changes: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether this transaction created `plugins/`.
    pub fn created_root(&self) -> bool {
        self.created_root
    }

    /// Remove `plugins/` on commit if it ends up empty.
    ///
    /// Only for roots this tool created; a directory the user made stays.
    pub fn remove_root_if_empty_on_commit(&mut self) {
        self.remove_empty_root = true;
    }

    fn backup_path(&self, plugin_id: &str) -> PathBuf {
        self.plugins_root
            .join(format!(".{}.bak-{}", plugin_id, self.id.simple()))
    }

    fn ensure_root(&mut self) -> Result<()> {
        if self.plugins_root.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(&self.plugins_root).map_err(|source| PluginError::ArtifactWriteFailed {
            path: self.plugins_root.clone(),
            source,
        })?;
        self.created_root = true;
        Ok(())
    }

    fn restore_preserved(&self, backup: &Path, dir: &Path) -> Result<()> {
        for name in PRESERVED_FILES {
            let from = backup.join(name);
            if !from.is_file() {
                continue;
            }
            let to = dir.join(name);
            fs::create_dir_all(dir)
                .and_then(|_| fs::copy(&from, &to))
                .map_err(|source| PluginError::ArtifactWriteFailed {
                    path: to.clone(),
                    source,
                })?;
            tracing::debug!(file = ?to, "kept user file across reinstall");
        }
        Ok(())
    }

    fn move_aside(&mut self, dir: PathBuf, plugin_id: &str) -> Result<()> {
        let backup = self.backup_path(plugin_id);
        fs::rename(&dir, &backup).map_err(|source| PluginError::ArtifactWriteFailed {
            path: dir.clone(),
            source,
        })?;
        tracing::debug!(dir = ?dir, backup = ?backup, "moved plugin directory aside");
        self.changes.push(Change::MovedAside { dir, backup });
        Ok(())
    }

    /// Prepare `plugins/<id>` for rendering.
    ///
    /// An existing directory is kept as a backup until commit; only its
    /// preserved user files reappear in the fresh directory.
    pub fn stage_plugin_dir(&mut self, install_dir: &Path, plugin_id: &str) -> Result<PathBuf> {
        let dir = get_plugin_dir(install_dir, plugin_id)?;
        self.ensure_root()?;
        if dir.exists() {
            self.move_aside(dir.clone(), plugin_id)?;
            let backup = self.backup_path(plugin_id);
            self.restore_preserved(&backup, &dir)?;
        } else {
            self.changes.push(Change::Created { dir: dir.clone() });
        }
        Ok(dir)
    }

    /// Take `plugins/<id>` out of the tree. Missing directories are fine.
    pub fn remove_plugin_dir(&mut self, install_dir: &Path, plugin_id: &str) -> Result<()> {
        let dir = get_plugin_dir(install_dir, plugin_id)?;
        if dir.exists() {
            self.move_aside(dir, plugin_id)?;
        } else {
            tracing::warn!(plugin = plugin_id, "plugin directory already gone");
        }
        Ok(())
    }

    /// Drop backups. Failures only leave stray backup directories behind.
    pub fn commit(self) {
        for change in &self.changes {
            if let Change::MovedAside { backup, .. } = change
                && let Err(e) = fs::remove_dir_all(backup)
            {
                tracing::warn!(backup = ?backup, "failed to remove backup: {}", e);
            }
        }
        if self.remove_empty_root {
            self.remove_root_if_empty();
        }
        tracing::debug!(txn = %self.id, changes = self.changes.len(), "transaction committed");
    }

    /// Undo every change, newest first.
    pub fn rollback(self) {
        for change in self.changes.iter().rev() {
            match change {
                Change::Created { dir } => {
                    if dir.exists()
                        && let Err(e) = fs::remove_dir_all(dir)
                    {
                        tracing::error!(dir = ?dir, "rollback could not remove directory: {}", e);
                    }
                }
                Change::MovedAside { dir, backup } => {
                    if dir.exists()
                        && let Err(e) = fs::remove_dir_all(dir)
                    {
                        tracing::error!(dir = ?dir, "rollback could not clear directory: {}", e);
                        continue;
                    }
                    if let Err(e) = fs::rename(backup, dir) {
                        tracing::error!(dir = ?dir, backup = ?backup, "rollback could not restore directory: {}", e);
                    }
                }
            }
        }
        if self.created_root {
            self.remove_root_if_empty();
        }
        tracing::info!(txn = %self.id, changes = self.changes.len(), "transaction rolled back");
    }

    fn remove_root_if_empty(&self) {
        let is_empty = fs::read_dir(&self.plugins_root)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if is_empty {
            let _ = fs::remove_dir(&self.plugins_root);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_rollback_removes_created_dirs_and_root() {
        let temp_dir = TempDir::new().unwrap();
        let mut tx = InstallTransaction::begin(temp_dir.path());
        let dir = tx.stage_plugin_dir(temp_dir.path(), "redis").unwrap();
        write(&dir.join("README.md"), "new");

        tx.rollback();
        assert!(!dir.exists());
        assert!(!temp_dir.path().join("plugins").exists());
    }

    #[test]
    fn test_rollback_restores_replaced_dir() {
        let temp_dir = TempDir::new().unwrap();
        let old = temp_dir.path().join("plugins/redis/README.md");
        write(&old, "old");

        let mut tx = InstallTransaction::begin(temp_dir.path());
        let dir = tx.stage_plugin_dir(temp_dir.path(), "redis").unwrap();
        assert!(!dir.exists());
        write(&dir.join("README.md"), "new");

        tx.rollback();
        assert_eq!(fs::read_to_string(&old).unwrap(), "old");
        assert_eq!(fs::read_dir(temp_dir.path().join("plugins")).unwrap().count(), 1);
    }

    #[test]
    fn test_commit_drops_backups() {
        let temp_dir = TempDir::new().unwrap();
        write(&temp_dir.path().join("plugins/redis/README.md"), "old");
        write(&temp_dir.path().join("plugins/neo4j/README.md"), "keep");

        let mut tx = InstallTransaction::begin(temp_dir.path());
        let dir = tx.stage_plugin_dir(temp_dir.path(), "redis").unwrap();
        write(&dir.join("README.md"), "new");
        tx.commit();

        assert_eq!(fs::read_to_string(dir.join("README.md")).unwrap(), "new");
        let names: Vec<String> = fs::read_dir(temp_dir.path().join("plugins"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|n| !n.starts_with('.')));
    }

    #[test]
    fn test_remove_then_rollback() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("plugins/redis/.env");
        write(&file, "SECRET=1");

        let mut tx = InstallTransaction::begin(temp_dir.path());
        tx.remove_plugin_dir(temp_dir.path(), "redis").unwrap();
        assert!(!file.exists());
        tx.rollback();
        assert_eq!(fs::read_to_string(&file).unwrap(), "SECRET=1");
    }

    #[test]
    fn test_remove_last_plugin_commit_clears_root() {
        let temp_dir = TempDir::new().unwrap();
        write(&temp_dir.path().join("plugins/redis/README.md"), "x");

        let mut tx = InstallTransaction::begin(temp_dir.path());
        tx.remove_plugin_dir(temp_dir.path(), "redis").unwrap();
        tx.remove_root_if_empty_on_commit();
        tx.commit();
        assert!(!temp_dir.path().join("plugins").exists());
    }

    #[test]
    fn test_commit_keeps_empty_root_by_default() {
        let temp_dir = TempDir::new().unwrap();
        write(&temp_dir.path().join("plugins/redis/README.md"), "x");

        let mut tx = InstallTransaction::begin(temp_dir.path());
        assert!(!tx.created_root());
        tx.remove_plugin_dir(temp_dir.path(), "redis").unwrap();
        tx.commit();
        assert!(temp_dir.path().join("plugins").is_dir());
    }

    #[test]
    fn test_rollback_keeps_existing_empty_root() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("plugins")).unwrap();

        let mut tx = InstallTransaction::begin(temp_dir.path());
        let dir = tx.stage_plugin_dir(temp_dir.path(), "redis").unwrap();
        write(&dir.join("README.md"), "new");
        assert!(!tx.created_root());
        tx.rollback();
        assert!(temp_dir.path().join("plugins").is_dir());
        assert_eq!(fs::read_dir(temp_dir.path().join("plugins")).unwrap().count(), 0);
    }

    #[test]
    fn test_restage_keeps_user_env() {
        let temp_dir = TempDir::new().unwrap();
        write(&temp_dir.path().join("plugins/okta/.env"), "OKTA_API_TOKEN=secret");
        write(&temp_dir.path().join("plugins/okta/README.md"), "old");

        let mut tx = InstallTransaction::begin(temp_dir.path());
        let dir = tx.stage_plugin_dir(temp_dir.path(), "okta").unwrap();
        assert_eq!(fs::read_to_string(dir.join(".env")).unwrap(), "OKTA_API_TOKEN=secret");
        assert!(!dir.join("README.md").exists());
        write(&dir.join("README.md"), "new");
        tx.commit();

        assert_eq!(fs::read_to_string(dir.join(".env")).unwrap(), "OKTA_API_TOKEN=secret");
        assert_eq!(fs::read_to_string(dir.join("README.md")).unwrap(), "new");
    }

    #[test]
    fn test_invalid_id_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut tx = InstallTransaction::begin(temp_dir.path());
        assert!(matches!(
            tx.stage_plugin_dir(temp_dir.path(), "../x"),
            Err(PluginError::InvalidPluginId(_))
        ));
        tx.rollback();
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }
}
