//! Per-plugin artifact rendering.
//!
//! Rendering is split in two: [`render_artifacts`] is a pure function from a
//! definition and a port to file contents, and [`render`] writes those
//! contents into the plugin's own directory under the installation root.

use std::fs;
use std::path::{Path, PathBuf};

use msp_plugin_catalog::{Category, PluginDefinition, TemplateKind};

use crate::error::{PluginError, Result};
use crate::plugin::template::{env_references, RenderError, Template, Vars};
use crate::utils::paths::get_plugin_dir;

/// Version stamped into every generation banner.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Variables every plugin container receives, whether declared or not.
pub const STANDARD_ENV_VARS: [&str; 4] = ["PLUGIN_NAME", "SERVICE_PORT", "METRICS_PORT", "LOG_LEVEL"];

const SETTINGS_VARS: &[&str] = &[
    "tool_version",
    "plugin_id",
    "display_name",
    "version",
    "category",
    "description",
    "port",
    "integration",
];

const ENV_TEMPLATE: Template = Template::new(
    "env",
    include_str!("templates/env.tmpl"),
    &["tool_version", "plugin_id", "display_name", "category", "port", "env_entries"],
);

const COMPOSE_TEMPLATE: Template = Template::new(
    "compose",
    include_str!("templates/compose.tmpl"),
    &["tool_version", "plugin_id", "display_name", "plugin_dir", "services"],
);

const README_TEMPLATE: Template = Template::new(
    "readme",
    include_str!("templates/readme.md.tmpl"),
    &[
        "tool_version",
        "plugin_id",
        "display_name",
        "description",
        "category",
        "version",
        "complexity",
        "port",
        "service_host",
        "dependencies",
        "services",
        "env_table",
    ],
);

const SETUP_TEMPLATE: Template = Template::new(
    "setup",
    include_str!("templates/setup.sh.tmpl"),
    &["tool_version", "plugin_id", "display_name", "port", "env_checklist"],
);

const DASHBOARDS_TEMPLATE: Template = Template::new(
    "dashboards",
    include_str!("templates/dashboards.md.tmpl"),
    &["tool_version", "plugin_id", "display_name", "port", "metric_sections", "first_metric"],
);

const SETTINGS_PLATFORM: Template =
    Template::new("settings/platform", include_str!("templates/settings/platform.tmpl"), SETTINGS_VARS);
const SETTINGS_SECURITY: Template =
    Template::new("settings/security", include_str!("templates/settings/security.tmpl"), SETTINGS_VARS);
const SETTINGS_CLOUD: Template =
    Template::new("settings/cloud", include_str!("templates/settings/cloud.tmpl"), SETTINGS_VARS);
const SETTINGS_OBSERVABILITY: Template = Template::new(
    "settings/observability",
    include_str!("templates/settings/observability.tmpl"),
    SETTINGS_VARS,
);
const SETTINGS_ITSM: Template =
    Template::new("settings/itsm", include_str!("templates/settings/itsm.tmpl"), SETTINGS_VARS);
const SETTINGS_IDENTITY: Template =
    Template::new("settings/identity", include_str!("templates/settings/identity.tmpl"), SETTINGS_VARS);
const SETTINGS_DATA: Template =
    Template::new("settings/data", include_str!("templates/settings/data.tmpl"), SETTINGS_VARS);
const SETTINGS_AI: Template =
    Template::new("settings/ai", include_str!("templates/settings/ai.tmpl"), SETTINGS_VARS);
const SETTINGS_ANALYTICS: Template =
    Template::new("settings/analytics", include_str!("templates/settings/analytics.tmpl"), SETTINGS_VARS);
const SETTINGS_DEVOPS: Template =
    Template::new("settings/devops", include_str!("templates/settings/devops.tmpl"), SETTINGS_VARS);

/// Every template compiled into the binary.
pub fn builtin_templates() -> [Template; 15] {
    [
        ENV_TEMPLATE,
        COMPOSE_TEMPLATE,
        README_TEMPLATE,
        SETUP_TEMPLATE,
        DASHBOARDS_TEMPLATE,
        SETTINGS_PLATFORM,
        SETTINGS_SECURITY,
        SETTINGS_CLOUD,
        SETTINGS_OBSERVABILITY,
        SETTINGS_ITSM,
        SETTINGS_IDENTITY,
        SETTINGS_DATA,
        SETTINGS_AI,
        SETTINGS_ANALYTICS,
        SETTINGS_DEVOPS,
    ]
}

fn settings_template(category: Category) -> Template {
    match category {
        Category::PerformanceScale => SETTINGS_PLATFORM,
        Category::AdvancedSecurity | Category::SecurityPartner => SETTINGS_SECURITY,
        Category::CloudIntegration => SETTINGS_CLOUD,
        Category::MonitoringPartner => SETTINGS_OBSERVABILITY,
        Category::CmdbItsm | Category::Ticketing => SETTINGS_ITSM,
        Category::IdentityManagement => SETTINGS_IDENTITY,
        Category::DataPlatform => SETTINGS_DATA,
        Category::AiMl => SETTINGS_AI,
        Category::AdvancedAnalytics => SETTINGS_ANALYTICS,
        Category::DevOpsAutomation => SETTINGS_DEVOPS,
    }
}

/// One rendered file, not yet written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    pub kind: TemplateKind,
    pub file_name: String,
    pub contents: String,
    pub executable: bool,
}

/// Double-quoted YAML scalar.
fn yaml_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Text safe inside a double-quoted shell string.
fn shell_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Compose service name of the container that binds the plugin port.
fn service_host(plugin: &PluginDefinition) -> &str {
    plugin
        .primary_service()
        .map(|s| s.name.as_str())
        .unwrap_or(plugin.id.as_str())
}

/// Single-quoted env-file value; compose reads it literally, `#` included.
fn env_quote(value: &str) -> String {
    format!("'{}'", value)
}

fn base_vars(plugin: &PluginDefinition, port: u16) -> Vars {
    let mut vars = Vars::new();
    vars.insert("tool_version", TOOL_VERSION.to_string());
    vars.insert("plugin_id", plugin.id.clone());
    vars.insert("display_name", plugin.display_name.clone());
    vars.insert("category", plugin.category.to_string());
    vars.insert("port", port.to_string());
    vars
}

fn render_env(plugin: &PluginDefinition, port: u16) -> std::result::Result<String, RenderError> {
    let mut vars = base_vars(plugin, port);
    let mut entries = String::new();
    if !plugin.required_env_vars.is_empty() {
        entries.push_str("\n# Integration settings");
        for var in &plugin.required_env_vars {
            entries.push_str(&format!(
                "\n\n# {}\n{}={}",
                var.description,
                var.name,
                env_quote(&var.example)
            ));
        }
    }
    vars.insert("env_entries", entries);
    ENV_TEMPLATE.render(&vars)
}

fn render_compose(plugin: &PluginDefinition, port: u16) -> std::result::Result<String, RenderError> {
    // Compose resolves relative paths against the first -f file, the base
    // stack in the installation directory.
    let plugin_dir = format!("./plugins/{}", plugin.id);
    let settings_file = TemplateKind::Settings.file_name(&plugin.id);
    let primary = service_host(plugin);

    let mut services = String::new();
    for service in &plugin.services {
        services.push_str(&format!(
            "  {name}:\n    image: {image}\n    container_name: {name}\n    restart: unless-stopped\n    env_file:\n      - {plugin_dir}/.env\n    volumes:\n      - {plugin_dir}/{settings_file}:/config/config.yml:ro\n",
            name = service.name,
            image = yaml_quote(&service.image),
        ));
        if service.name == primary {
            services.push_str(&format!(
                "    ports:\n      - \"{port}:{port}\"\n    healthcheck:\n      test: [\"CMD\", \"wget\", \"--no-verbose\", \"--tries=1\", \"--spider\", \"http://localhost:{port}/health\"]\n      interval: 60s\n      timeout: 10s\n      retries: 3\n      start_period: 60s\n    labels:\n      prometheus.scrape: \"true\"\n      prometheus.port: \"{port}\"\n      prometheus.path: /metrics\n"
            ));
        } else {
            services.push_str(&format!("    depends_on:\n      - {}\n", primary));
        }
        services.push_str("    networks:\n      - monitoring\n");
    }

    let mut vars = base_vars(plugin, port);
    vars.remove("category");
    vars.remove("port");
    vars.insert("plugin_dir", plugin_dir);
    vars.insert("services", services);
    COMPOSE_TEMPLATE.render(&vars)
}

fn render_settings(plugin: &PluginDefinition, port: u16) -> std::result::Result<String, RenderError> {
    let mut integration = String::from("integration:");
    if plugin.required_env_vars.is_empty() {
        integration.push_str(" {}");
    } else {
        for var in &plugin.required_env_vars {
            integration.push_str(&format!(
                "\n  {}: ${{{}}}",
                var.name.to_ascii_lowercase(),
                var.name
            ));
        }
    }

    let mut vars = base_vars(plugin, port);
    vars.insert("display_name", yaml_quote(&plugin.display_name));
    vars.insert("category", yaml_quote(plugin.category.display_name()));
    vars.insert("description", yaml_quote(&plugin.description));
    vars.insert("version", plugin.version.clone());
    vars.insert("integration", integration);
    settings_template(plugin.category).render(&vars)
}

fn render_readme(plugin: &PluginDefinition, port: u16) -> std::result::Result<String, RenderError> {
    let dependencies = if plugin.dependencies.is_empty() {
        "none".to_string()
    } else {
        plugin
            .dependencies
            .iter()
            .map(|d| format!("`{}`", d))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let services = plugin
        .services
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let role = if i == 0 { " (primary, binds the plugin port)" } else { "" };
            format!("- `{}`: `{}`{}", s.name, s.image, role)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let env_table = if plugin.required_env_vars.is_empty() {
        "   No integration settings are required.".to_string()
    } else {
        let mut table = String::from("   | Variable | Description | Example |\n   |---|---|---|");
        for var in &plugin.required_env_vars {
            table.push_str(&format!(
                "\n   | `{}` | {} | `{}` |",
                var.name,
                var.description.replace('|', "\\|"),
                var.example
            ));
        }
        table
    };

    let mut vars = base_vars(plugin, port);
    vars.insert("description", plugin.description.clone());
    vars.insert("version", plugin.version.clone());
    vars.insert("complexity", plugin.complexity.to_string());
    vars.insert("service_host", service_host(plugin).to_string());
    vars.insert("dependencies", dependencies);
    vars.insert("services", services);
    vars.insert("env_table", env_table);
    README_TEMPLATE.render(&vars)
}

fn render_setup(plugin: &PluginDefinition, port: u16) -> std::result::Result<String, RenderError> {
    let checklist = if plugin.required_env_vars.is_empty() {
        "echo \"  (no integration settings required)\"".to_string()
    } else {
        plugin
            .required_env_vars
            .iter()
            .map(|v| format!("echo \"  - {}: {}\"", v.name, shell_escape(&v.description)))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut vars = base_vars(plugin, port);
    vars.remove("category");
    vars.insert("display_name", shell_escape(&plugin.display_name));
    vars.insert("env_checklist", checklist);
    SETUP_TEMPLATE.render(&vars)
}

fn render_dashboards(plugin: &PluginDefinition, port: u16) -> std::result::Result<String, RenderError> {
    let fallback = format!("{}_up", plugin.id.replace('-', "_"));
    let metrics: Vec<&str> = if plugin.metrics.is_empty() {
        vec![fallback.as_str()]
    } else {
        plugin.metrics.iter().map(String::as_str).collect()
    };

    let mut sections = String::new();
    for metric in &metrics {
        sections.push_str(&format!(
            "\n### {metric}\n\n```promql\n{metric}\n```\n\nAdd to a Grafana time series panel; rate() it if the name ends in `_total`.\n"
        ));
    }

    let mut vars = base_vars(plugin, port);
    vars.remove("category");
    vars.insert("metric_sections", sections);
    vars.insert("first_metric", metrics[0].to_string());
    DASHBOARDS_TEMPLATE.render(&vars)
}

/// Reject `${VAR}` references that nothing will ever define.
fn check_env_references(
    plugin: &PluginDefinition,
    artifact: &str,
    contents: &str,
) -> std::result::Result<(), RenderError> {
    for name in env_references(contents) {
        if !STANDARD_ENV_VARS.contains(&name.as_str()) && plugin.env_var(&name).is_none() {
            return Err(RenderError::UndeclaredEnvVar {
                plugin: plugin.id.clone(),
                artifact: artifact.to_string(),
                name,
            });
        }
    }
    Ok(())
}

/// Render every artifact in the plugin's template set, in template order.
pub fn render_artifacts(
    plugin: &PluginDefinition,
    port: u16,
) -> std::result::Result<Vec<RenderedArtifact>, RenderError> {
    let mut out = Vec::new();
    for kind in TemplateKind::ALL {
        if !plugin.renders(kind) {
            continue;
        }
        let contents = match kind {
            TemplateKind::Env => render_env(plugin, port)?,
            TemplateKind::Compose => render_compose(plugin, port)?,
            TemplateKind::Settings => render_settings(plugin, port)?,
            TemplateKind::Readme => render_readme(plugin, port)?,
            TemplateKind::Setup => render_setup(plugin, port)?,
            TemplateKind::Dashboards => render_dashboards(plugin, port)?,
        };
        let file_name = kind.file_name(&plugin.id);
        if matches!(kind, TemplateKind::Compose | TemplateKind::Settings) {
            check_env_references(plugin, &file_name, &contents)?;
        }
        out.push(RenderedArtifact {
            kind,
            file_name,
            contents,
            executable: kind == TemplateKind::Setup,
        });
    }
    Ok(out)
}

#[cfg(unix)]
fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Render and write a plugin's artifacts into `<install_dir>/plugins/<id>/`.
///
/// Returns the written paths. Nothing is written outside that directory;
/// everything is rendered before the first write so a template error leaves
/// the filesystem untouched.
pub fn render(plugin: &PluginDefinition, port: u16, install_dir: &Path) -> Result<Vec<PathBuf>> {
    let plugin_dir = get_plugin_dir(install_dir, &plugin.id)?;
    let artifacts = render_artifacts(plugin, port)?;

    fs::create_dir_all(&plugin_dir).map_err(|source| PluginError::ArtifactWriteFailed {
        path: plugin_dir.clone(),
        source,
    })?;

    let mut written = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let path = plugin_dir.join(&artifact.file_name);
        fs::write(&path, artifact.contents.as_bytes()).map_err(|source| {
            PluginError::ArtifactWriteFailed {
                path: path.clone(),
                source,
            }
        })?;
        if artifact.executable {
            set_executable(&path).map_err(|source| PluginError::ArtifactWriteFailed {
                path: path.clone(),
                source,
            })?;
        }
        tracing::debug!(plugin = %plugin.id, file = %artifact.file_name, "wrote artifact");
        written.push(path);
    }

    Ok(written)
}
