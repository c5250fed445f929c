//! Plugin definition record.
//!
//! A `PluginDefinition` is one `[[plugins]]` table from the catalog document.
//! Definitions are immutable once the catalog has been validated.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::category::Category;

/// An environment variable the plugin needs before it can start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVarSpec {
    pub name: String,
    pub description: String,
    pub example: String,
}

/// A container shipped by the plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    pub image: String,
}

/// Rough setup effort, shown in listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
    Expert,
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Complexity::Beginner => "beginner",
            Complexity::Intermediate => "intermediate",
            Complexity::Advanced => "advanced",
            Complexity::Expert => "expert",
        };
        write!(f, "{}", s)
    }
}

/// Artifacts that can be rendered for a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    Env,
    Compose,
    Settings,
    Readme,
    Setup,
    Dashboards,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 6] = [
        TemplateKind::Env,
        TemplateKind::Compose,
        TemplateKind::Settings,
        TemplateKind::Readme,
        TemplateKind::Setup,
        TemplateKind::Dashboards,
    ];

    /// File name of the artifact inside the plugin directory.
    pub fn file_name(self, plugin_id: &str) -> String {
        match self {
            TemplateKind::Env => ".env.template".to_string(),
            TemplateKind::Compose => "docker-compose.yml".to_string(),
            TemplateKind::Settings => format!("{}-config.yml", plugin_id),
            TemplateKind::Readme => "README.md".to_string(),
            TemplateKind::Setup => "setup.sh".to_string(),
            TemplateKind::Dashboards => "dashboard_queries.md".to_string(),
        }
    }
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_templates() -> Vec<TemplateKind> {
    TemplateKind::ALL.to_vec()
}

/// Catalog entry for one installable plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDefinition {
    /// Lowercase kebab slug, unique within the catalog
    pub id: String,

    pub display_name: String,

    pub category: Category,

    #[serde(default)]
    pub description: String,

    /// Plugin version in semver format
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub complexity: Complexity,

    #[serde(default)]
    pub size_mb: u32,

    /// Ids that must be installed before this plugin
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(rename = "env", default)]
    pub required_env_vars: Vec<EnvVarSpec>,

    /// Where the port search starts
    pub base_port_hint: u16,

    /// Containers, primary first
    #[serde(default)]
    pub services: Vec<ServiceSpec>,

    #[serde(default)]
    pub metrics: Vec<String>,

    #[serde(rename = "templates", default = "default_templates")]
    pub template_set: Vec<TemplateKind>,
}

/// Check if a plugin id is a lowercase kebab slug.
///
/// Ids end up as directory names under `plugins/`, so anything that could
/// form a path component other than a plain name is refused.
pub fn is_valid_plugin_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && !id.starts_with('-')
        && !id.ends_with('-')
        && !id.contains("--")
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Check if a name is usable as a shell / compose environment variable.
pub fn is_valid_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_uppercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

impl PluginDefinition {
    /// Validate the definition fields.
    ///
    /// Checks:
    /// - id is a valid slug
    /// - display_name is not empty
    /// - version is valid semver
    /// - base_port_hint is not zero
    /// - at least one service, with unique names
    /// - env var names are valid and unique, examples fit on one quoted line
    /// - no self dependency, no repeated dependency
    /// - template set is not empty
    pub fn validate(&self) -> Result<(), String> {
        if !is_valid_plugin_id(&self.id) {
            return Err(format!(
                "Invalid plugin id '{}': must be lowercase letters, digits and single dashes",
                self.id
            ));
        }

        if self.display_name.trim().is_empty() {
            return Err("Display name cannot be empty".to_string());
        }

        if semver::Version::parse(&self.version).is_err() {
            return Err(format!(
                "Invalid version '{}': must be valid semver",
                self.version
            ));
        }

        if self.base_port_hint == 0 {
            return Err("base_port_hint must be a non-zero port".to_string());
        }

        if self.services.is_empty() {
            return Err("At least one service is required".to_string());
        }
        for (i, service) in self.services.iter().enumerate() {
            if !is_valid_plugin_id(&service.name) {
                return Err(format!("Invalid service name '{}'", service.name));
            }
            if service.image.trim().is_empty() {
                return Err(format!("Service '{}' has empty image", service.name));
            }
            if self.services[..i].iter().any(|s| s.name == service.name) {
                return Err(format!("Service '{}' is declared twice", service.name));
            }
        }

        for (i, var) in self.required_env_vars.iter().enumerate() {
            if !is_valid_env_name(&var.name) {
                return Err(format!(
                    "Invalid environment variable name '{}': must be UPPER_SNAKE_CASE",
                    var.name
                ));
            }
            if self.required_env_vars[..i].iter().any(|v| v.name == var.name) {
                return Err(format!("Environment variable '{}' is declared twice", var.name));
            }
            if var.example.contains(['\'', '\n', '\r']) {
                return Err(format!(
                    "Example for '{}' cannot contain quotes or line breaks",
                    var.name
                ));
            }
        }

        for (i, dep) in self.dependencies.iter().enumerate() {
            if dep == &self.id {
                return Err("Plugin cannot depend on itself".to_string());
            }
            if self.dependencies[..i].contains(dep) {
                return Err(format!("Dependency '{}' is listed twice", dep));
            }
        }

        if self.template_set.is_empty() {
            return Err("Template set cannot be empty".to_string());
        }

        Ok(())
    }

    /// The container that binds the assigned port.
    pub fn primary_service(&self) -> Option<&ServiceSpec> {
        self.services.first()
    }

    pub fn renders(&self, kind: TemplateKind) -> bool {
        self.template_set.contains(&kind)
    }

    pub fn env_var(&self, name: &str) -> Option<&EnvVarSpec> {
        self.required_env_vars.iter().find(|v| v.name == name)
    }
}
