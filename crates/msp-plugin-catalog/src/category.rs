use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Plugin categories, in display order.
///
/// The derived `Ord` follows declaration order, which is the order categories
/// are listed in the catalog and in `list` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Performance & Scale")]
    PerformanceScale,
    #[serde(rename = "Advanced Security")]
    AdvancedSecurity,
    #[serde(rename = "Cloud Integration")]
    CloudIntegration,
    #[serde(rename = "Security Partner Integration")]
    SecurityPartner,
    #[serde(rename = "Monitoring Partner Integration")]
    MonitoringPartner,
    #[serde(rename = "CMDB/ITSM Integration")]
    CmdbItsm,
    #[serde(rename = "Ticketing Platform Integration")]
    Ticketing,
    #[serde(rename = "Identity Management Integration")]
    IdentityManagement,
    #[serde(rename = "Data Platform Integration")]
    DataPlatform,
    #[serde(rename = "AI/ML Features")]
    AiMl,
    #[serde(rename = "Advanced Analytics")]
    AdvancedAnalytics,
    #[serde(rename = "DevOps Automation")]
    DevOpsAutomation,
}

impl Category {
    pub const ALL: [Category; 12] = [
        Category::PerformanceScale,
        Category::AdvancedSecurity,
        Category::CloudIntegration,
        Category::SecurityPartner,
        Category::MonitoringPartner,
        Category::CmdbItsm,
        Category::Ticketing,
        Category::IdentityManagement,
        Category::DataPlatform,
        Category::AiMl,
        Category::AdvancedAnalytics,
        Category::DevOpsAutomation,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            Category::PerformanceScale => "Performance & Scale",
            Category::AdvancedSecurity => "Advanced Security",
            Category::CloudIntegration => "Cloud Integration",
            Category::SecurityPartner => "Security Partner Integration",
            Category::MonitoringPartner => "Monitoring Partner Integration",
            Category::CmdbItsm => "CMDB/ITSM Integration",
            Category::Ticketing => "Ticketing Platform Integration",
            Category::IdentityManagement => "Identity Management Integration",
            Category::DataPlatform => "Data Platform Integration",
            Category::AiMl => "AI/ML Features",
            Category::AdvancedAnalytics => "Advanced Analytics",
            Category::DevOpsAutomation => "DevOps Automation",
        }
    }

    /// Kebab-case form accepted on the command line, e.g. `cmdb-itsm-integration`.
    pub fn slug(self) -> String {
        let mut slug = String::new();
        for c in self.display_name().chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
            } else if !slug.ends_with('-') {
                slug.push('-');
            }
        }
        slug.trim_end_matches('-').to_string()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| {
                c.display_name().eq_ignore_ascii_case(wanted) || c.slug() == wanted.to_lowercase()
            })
            .ok_or_else(|| format!("Unknown category: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Category::CmdbItsm.to_string(), "CMDB/ITSM Integration");
        assert_eq!(Category::AiMl.to_string(), "AI/ML Features");
    }

    #[test]
    fn test_slug() {
        assert_eq!(Category::PerformanceScale.slug(), "performance-scale");
        assert_eq!(Category::CmdbItsm.slug(), "cmdb-itsm-integration");
        assert_eq!(Category::AiMl.slug(), "ai-ml-features");
        assert_eq!(Category::DevOpsAutomation.slug(), "devops-automation");
    }

    #[test]
    fn test_from_str_accepts_display_name_and_slug() {
        assert_eq!(
            "cloud integration".parse::<Category>().unwrap(),
            Category::CloudIntegration
        );
        assert_eq!(
            "Data-Platform-Integration".parse::<Category>().unwrap(),
            Category::DataPlatform
        );
        assert_eq!("ai-ml-features".parse::<Category>().unwrap(), Category::AiMl);
        assert!("gardening".parse::<Category>().is_err());
    }

    #[test]
    fn test_order_follows_declaration() {
        let mut shuffled = vec![Category::DevOpsAutomation, Category::PerformanceScale, Category::AiMl];
        shuffled.sort();
        assert_eq!(
            shuffled,
            vec![Category::PerformanceScale, Category::AiMl, Category::DevOpsAutomation]
        );
    }

    #[test]
    fn test_serde_uses_display_name() {
        #[derive(Deserialize)]
        struct Wrapper {
            category: Category,
        }
        let parsed: Wrapper = toml::from_str(r#"category = "Security Partner Integration""#).unwrap();
        assert_eq!(parsed.category, Category::SecurityPartner);
    }
}
