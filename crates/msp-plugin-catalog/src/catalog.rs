//! Catalog loading and lookup.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use crate::category::Category;
use crate::definition::PluginDefinition;
use crate::error::{CatalogError, ResolveError};
use crate::resolver::resolve_install_order;
use crate::version::{is_schema_compatible, CATALOG_SCHEMA_VERSION};

/// The catalog document compiled into the crate.
pub const BUILTIN_CATALOG: &str = include_str!("../catalog/plugins.toml");

/// A named bundle of plugins installed together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginPack {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub plugins: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    schema_version: String,
    #[serde(default)]
    plugins: Vec<PluginDefinition>,
    #[serde(default)]
    packs: Vec<PluginPack>,
}

/// Validated, read-only set of plugin definitions.
#[derive(Debug, Clone)]
pub struct Catalog {
    plugins: Vec<PluginDefinition>,
    index: HashMap<String, usize>,
    packs: Vec<PluginPack>,
}

impl Catalog {
    /// Load the catalog embedded in this crate.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    /// Load and validate a catalog document from disk.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
        let doc: CatalogDocument = toml::from_str(content)?;

        let compatible = is_schema_compatible(&doc.schema_version, CATALOG_SCHEMA_VERSION)
            .unwrap_or(false);
        if !compatible {
            return Err(CatalogError::IncompatibleSchema {
                found: doc.schema_version,
                supported: CATALOG_SCHEMA_VERSION.to_string(),
            });
        }

        let catalog = Self::build(doc.plugins, doc.packs)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Build a pack-less catalog from in-memory definitions, with full validation.
    pub fn from_definitions(plugins: Vec<PluginDefinition>) -> Result<Self, CatalogError> {
        let catalog = Self::build(plugins, Vec::new())?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Build a catalog without referential or cycle checks.
    ///
    /// Only meant for exercising error paths (cyclic or dangling fixtures)
    /// that a validated catalog can never reach.
    #[doc(hidden)]
    pub fn from_definitions_unchecked(plugins: Vec<PluginDefinition>) -> Self {
        let mut index = HashMap::new();
        for (i, p) in plugins.iter().enumerate() {
            index.entry(p.id.clone()).or_insert(i);
        }
        Self {
            plugins,
            index,
            packs: Vec::new(),
        }
    }

    fn build(plugins: Vec<PluginDefinition>, packs: Vec<PluginPack>) -> Result<Self, CatalogError> {
        let mut index = HashMap::with_capacity(plugins.len());
        for (i, p) in plugins.iter().enumerate() {
            if index.insert(p.id.clone(), i).is_some() {
                return Err(CatalogError::DuplicateId(p.id.clone()));
            }
        }
        Ok(Self {
            plugins,
            index,
            packs,
        })
    }

    fn validate(&self) -> Result<(), CatalogError> {
        for p in &self.plugins {
            p.validate().map_err(|reason| CatalogError::InvalidDefinition {
                id: p.id.clone(),
                reason,
            })?;
        }

        for p in &self.plugins {
            if let Some(dep) = p.dependencies.iter().find(|d| !self.contains(d)) {
                return Err(CatalogError::UnknownDependency {
                    plugin: p.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }

        let all: Vec<&str> = self.plugins.iter().map(|p| p.id.as_str()).collect();
        match resolve_install_order(self, &all, |_| false) {
            Ok(_) => {}
            Err(ResolveError::CycleDetected(path)) => return Err(CatalogError::DependencyCycle(path)),
            Err(ResolveError::UnknownPlugin(id)) => {
                return Err(CatalogError::InvalidDefinition {
                    id,
                    reason: "unresolvable plugin".to_string(),
                });
            }
        }

        for (i, pack) in self.packs.iter().enumerate() {
            if self.packs[..i].iter().any(|p| p.name == pack.name) {
                return Err(CatalogError::DuplicatePack(pack.name.clone()));
            }
            if let Some(missing) = pack.plugins.iter().find(|id| !self.contains(id)) {
                return Err(CatalogError::UnknownPackMember {
                    pack: pack.name.clone(),
                    plugin: missing.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&PluginDefinition> {
        self.index.get(id).map(|&i| &self.plugins[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Declaration index of a plugin, used to break ordering ties.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// All definitions in declaration order.
    pub fn plugins(&self) -> &[PluginDefinition] {
        &self.plugins
    }

    /// Definitions ordered by category, then display name.
    ///
    /// Entries sharing both keep their declaration order.
    pub fn list(&self, category: Option<Category>) -> Vec<&PluginDefinition> {
        let mut out: Vec<&PluginDefinition> = self
            .plugins
            .iter()
            .filter(|p| category.is_none_or(|c| p.category == c))
            .collect();
        out.sort_by(|a, b| {
            a.category
                .cmp(&b.category)
                .then_with(|| a.display_name.cmp(&b.display_name))
        });
        out
    }

    /// Categories that have at least one plugin.
    pub fn all_categories(&self) -> BTreeSet<Category> {
        self.plugins.iter().map(|p| p.category).collect()
    }

    pub fn category_counts(&self) -> BTreeMap<Category, usize> {
        let mut counts = BTreeMap::new();
        for p in &self.plugins {
            *counts.entry(p.category).or_insert(0) += 1;
        }
        counts
    }

    pub fn packs(&self) -> &[PluginPack] {
        &self.packs
    }

    pub fn pack(&self, name: &str) -> Option<&PluginPack> {
        self.packs.iter().find(|p| p.name == name)
    }

    /// Plugins that declare `id` as a direct dependency.
    pub fn dependents_of(&self, id: &str) -> Vec<&PluginDefinition> {
        self.plugins
            .iter()
            .filter(|p| p.dependencies.iter().any(|d| d == id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HEADER: &str = "schema_version = \"1.0.0\"\n";

    fn plugin_toml(id: &str, deps: &str) -> String {
        format!(
            r#"
[[plugins]]
id = "{id}"
display_name = "{id}"
category = "Cloud Integration"
base_port_hint = 9400
dependencies = [{deps}]
services = [{{ name = "{id}", image = "x/y:1" }}]
"#
        )
    }

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = Catalog::builtin().unwrap();
        assert_eq!(catalog.plugins().len(), 47);
        assert_eq!(catalog.all_categories().len(), 12);
        assert_eq!(catalog.packs().len(), 6);
    }

    #[test]
    fn test_builtin_dependency_edges() {
        let catalog = Catalog::builtin().unwrap();
        let mut edges: Vec<(String, String)> = catalog
            .plugins()
            .iter()
            .flat_map(|p| p.dependencies.iter().map(|d| (p.id.clone(), d.clone())))
            .collect();
        edges.sort();
        let expected: Vec<(String, String)> = [
            ("auto-remediation", "predictive-alerts"),
            ("auto-scaling", "prometheus-federation"),
            ("aws-discovery", "aws-cloudwatch"),
            ("cost-optimization", "aws-cloudwatch"),
            ("gitops-deployment", "cicd-monitoring"),
            ("predictive-alerts", "anomaly-detection"),
        ]
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect();
        assert_eq!(edges, expected);
    }

    #[test]
    fn test_get_and_contains() {
        let catalog = Catalog::builtin().unwrap();
        let cw = catalog.get("aws-cloudwatch").unwrap();
        assert_eq!(cw.category, Category::CloudIntegration);
        assert_eq!(cw.base_port_hint, 9106);
        assert!(catalog.contains("okta"));
        assert!(catalog.get("does-not-exist").is_none());
    }

    #[test]
    fn test_list_ordering() {
        let catalog = Catalog::builtin().unwrap();
        let listed = catalog.list(None);
        assert_eq!(listed.len(), 47);
        for pair in listed.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            assert!(
                (a.category, &a.display_name) <= (b.category, &b.display_name),
                "{} listed before {}",
                a.id,
                b.id
            );
        }
        assert_eq!(listed[0].category, Category::PerformanceScale);
    }

    #[test]
    fn test_list_by_category() {
        let catalog = Catalog::builtin().unwrap();
        let ai: Vec<&str> = catalog
            .list(Some(Category::AiMl))
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ai, vec!["anomaly-detection", "auto-remediation", "predictive-alerts"]);
    }

    #[test]
    fn test_category_counts_sum() {
        let catalog = Catalog::builtin().unwrap();
        let counts = catalog.category_counts();
        assert_eq!(counts.values().sum::<usize>(), 47);
        assert_eq!(counts[&Category::DataPlatform], 9);
    }

    #[test]
    fn test_dependents_of() {
        let catalog = Catalog::builtin().unwrap();
        let ids: Vec<&str> = catalog
            .dependents_of("aws-cloudwatch")
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ids, vec!["aws-discovery", "cost-optimization"]);
    }

    #[test]
    fn test_packs_resolve() {
        let catalog = Catalog::builtin().unwrap();
        let pack = catalog.pack("ai-ml").unwrap();
        assert_eq!(pack.plugins, vec!["anomaly-detection", "predictive-alerts"]);
        assert!(catalog.pack("nope").is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let doc = format!("{}{}{}", HEADER, plugin_toml("a", ""), plugin_toml("a", ""));
        let err = Catalog::from_toml_str(&doc).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateId(id) if id == "a"));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let doc = format!("{}{}", HEADER, plugin_toml("a", "\"ghost\""));
        let err = Catalog::from_toml_str(&doc).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::UnknownDependency { plugin, dependency } if plugin == "a" && dependency == "ghost"
        ));
    }

    #[test]
    fn test_cycle_rejected() {
        let doc = format!(
            "{}{}{}",
            HEADER,
            plugin_toml("a", "\"b\""),
            plugin_toml("b", "\"a\"")
        );
        let err = Catalog::from_toml_str(&doc).unwrap_err();
        match err {
            CatalogError::DependencyCycle(path) => assert_eq!(path, vec!["a", "b", "a"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_definition_rejected() {
        let doc = format!("{}{}", HEADER, plugin_toml("Bad_Id", ""));
        let err = Catalog::from_toml_str(&doc).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidDefinition { .. }));
    }

    #[test]
    fn test_incompatible_schema_rejected() {
        let doc = format!("schema_version = \"2.0.0\"\n{}", plugin_toml("a", ""));
        let err = Catalog::from_toml_str(&doc).unwrap_err();
        assert!(matches!(err, CatalogError::IncompatibleSchema { .. }));

        let doc = format!("schema_version = \"banana\"\n{}", plugin_toml("a", ""));
        assert!(Catalog::from_toml_str(&doc).is_err());
    }

    #[test]
    fn test_unknown_pack_member_rejected() {
        let doc = format!(
            "{}{}\n[[packs]]\nname = \"p\"\nplugins = [\"a\", \"zzz\"]\n",
            HEADER,
            plugin_toml("a", "")
        );
        let err = Catalog::from_toml_str(&doc).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownPackMember { plugin, .. } if plugin == "zzz"));
    }

    #[test]
    fn test_parse_error() {
        let err = Catalog::from_toml_str("schema_version = ").unwrap_err();
        assert!(matches!(err, CatalogError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Catalog::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, CatalogError::Io { .. }));
    }
}
