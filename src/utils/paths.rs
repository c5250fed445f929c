use anyhow::{anyhow, Result};
use msp_plugin_catalog::is_valid_plugin_id;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::PluginError;

/// Overrides both the config and data roots when set.
pub const HOME_ENV_VAR: &str = "MSP_PLUGINS_HOME";

pub const STATE_FILE_NAME: &str = "plugins.json";
pub const PLUGINS_DIR_NAME: &str = "plugins";
pub const BASE_COMPOSE_FILE_NAME: &str = "docker-compose.yml";

fn home_override() -> Option<PathBuf> {
    env::var_os(HOME_ENV_VAR)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

pub fn get_config_dir() -> Result<PathBuf> {
    if let Some(home) = home_override() {
        return Ok(home);
    }
    let base = dirs::config_dir().ok_or_else(|| anyhow!("Could not find config directory"))?;
    Ok(base.join("msp-plugins"))
}

pub fn get_data_dir() -> Result<PathBuf> {
    if let Some(home) = home_override() {
        return Ok(home);
    }
    let base = dirs::data_dir().ok_or_else(|| anyhow!("Could not find data directory"))?;
    Ok(base.join("msp-plugins"))
}

pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("config.toml"))
}

pub fn get_logs_dir() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("logs"))
}

pub fn get_crash_log_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("crash.log"))
}

pub fn get_state_file_path(install_dir: &Path) -> PathBuf {
    install_dir.join(STATE_FILE_NAME)
}

pub fn get_plugins_root(install_dir: &Path) -> PathBuf {
    install_dir.join(PLUGINS_DIR_NAME)
}

pub fn get_base_compose_path(install_dir: &Path) -> PathBuf {
    install_dir.join(BASE_COMPOSE_FILE_NAME)
}

/// Directory owned by one plugin: `<install_dir>/plugins/<id>`.
///
/// The id is checked before it is joined so the result is always a direct
/// child of the plugins root.
pub fn get_plugin_dir(install_dir: &Path, plugin_id: &str) -> Result<PathBuf, PluginError> {
    if !is_valid_plugin_id(plugin_id) {
        return Err(PluginError::InvalidPluginId(plugin_id.to_string()));
    }
    Ok(get_plugins_root(install_dir).join(plugin_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_home_override() {
        // SAFETY: serialized with every other test touching the environment
        unsafe {
            env::set_var(HOME_ENV_VAR, "/tmp/msp-home");
        }
        assert_eq!(get_config_path().unwrap(), PathBuf::from("/tmp/msp-home/config.toml"));
        assert_eq!(get_logs_dir().unwrap(), PathBuf::from("/tmp/msp-home/logs"));
        assert_eq!(get_crash_log_path().unwrap(), PathBuf::from("/tmp/msp-home/crash.log"));
        unsafe {
            env::remove_var(HOME_ENV_VAR);
        }
    }

    #[test]
    #[serial]
    fn test_default_dirs() {
        unsafe {
            env::remove_var(HOME_ENV_VAR);
        }
        if let Ok(path) = get_config_path() {
            assert!(path.to_string_lossy().contains("msp-plugins"));
            assert!(path.to_string_lossy().ends_with("config.toml"));
        }
    }

    #[test]
    fn test_install_dir_layout() {
        let root = Path::new("/srv/stack");
        assert_eq!(get_state_file_path(root), PathBuf::from("/srv/stack/plugins.json"));
        assert_eq!(get_base_compose_path(root), PathBuf::from("/srv/stack/docker-compose.yml"));
        assert_eq!(
            get_plugin_dir(root, "aws-cloudwatch").unwrap(),
            PathBuf::from("/srv/stack/plugins/aws-cloudwatch")
        );
    }

    #[test]
    fn test_plugin_dir_rejects_escapes() {
        let root = Path::new("/srv/stack");
        for bad in ["..", "../etc", "a/b", "", "Upper"] {
            assert!(matches!(
                get_plugin_dir(root, bad),
                Err(PluginError::InvalidPluginId(_))
            ));
        }
    }
}
