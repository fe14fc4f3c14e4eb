// 🏷️ Category Rules - Rules as Data
// Keyword rules that infer an expense category from free-text descriptions.
//
// The built-in table mirrors the Indonesian bank-export vocabulary the
// system was first deployed against. Treat it as data, not business logic:
// deployments override it with `CategoryRules::from_file`.

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRule {
    /// Category assigned when any keyword matches.
    pub category: String,

    /// Case-insensitive substrings, any one of which triggers the rule.
    pub keywords: Vec<String>,

    /// Description/notes about this rule.
    #[serde(default)]
    pub description: Option<String>,
}

impl CategoryRule {
    /// Check whether any keyword occurs in the given text.
    pub fn matches(&self, text: &str) -> bool {
        let text_lower = text.to_lowercase();
        self.keywords
            .iter()
            .any(|kw| text_lower.contains(&kw.to_lowercase()))
    }
}

// ============================================================================
// RULE SET
// ============================================================================

pub const FALLBACK_CATEGORY: &str = "Other";

/// Ordered rule table. The FIRST matching rule wins; when nothing matches
/// the fallback category applies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRules {
    rules: Vec<CategoryRule>,
    fallback: String,
}

impl CategoryRules {
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        CategoryRules {
            rules,
            fallback: FALLBACK_CATEGORY.to_string(),
        }
    }

    /// Load rules from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read rules file: {:?}", path.as_ref()))?;

        let rules: Vec<CategoryRule> =
            serde_json::from_str(&content).context("Failed to parse rules JSON")?;

        Ok(CategoryRules::new(rules))
    }

    /// Infer the category for a free-text description.
    pub fn infer(&self, description: &str) -> &str {
        self.rules
            .iter()
            .find(|rule| rule.matches(description))
            .map(|rule| rule.category.as_str())
            .unwrap_or(&self.fallback)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for CategoryRules {
    /// Built-in table carried over from the original deployment.
    fn default() -> Self {
        let rule = |category: &str, keywords: &[&str]| CategoryRule {
            category: category.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            description: None,
        };

        CategoryRules::new(vec![
            rule("Operational", &["operasional", "lapangan", "kas"]),
            rule("Company", &["lelang", "tender", "proyek"]),
            rule("Personal", &["keluarga", "personal"]),
            rule("Utilities", &["pulsa", "emoney", "utility"]),
        ])
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_inference() {
        let rules = CategoryRules::default();

        assert_eq!(rules.infer("Biaya operasional kantor"), "Operational");
        assert_eq!(rules.infer("Setoran LELANG unit 4"), "Company");
        assert_eq!(rules.infer("transfer keluarga"), "Personal");
        assert_eq!(rules.infer("beli pulsa telkomsel"), "Utilities");
        assert_eq!(rules.infer("sesuatu yang lain"), "Other");
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let rules = CategoryRules::new(vec![
            CategoryRule {
                category: "First".to_string(),
                keywords: vec!["shared".to_string()],
                description: None,
            },
            CategoryRule {
                category: "Second".to_string(),
                keywords: vec!["shared".to_string()],
                description: None,
            },
        ]);

        assert_eq!(rules.infer("a shared keyword"), "First");
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let rules = CategoryRules::default();
        assert_eq!(rules.infer("KAS KECIL"), "Operational");
    }

    #[test]
    fn test_empty_table_falls_back() {
        let rules = CategoryRules::new(vec![]);
        assert_eq!(rules.infer("anything at all"), "Other");
    }

    #[test]
    fn test_rules_round_trip_as_json() {
        let rules = CategoryRules::default();
        let json = serde_json::to_string(&rules).unwrap();
        let parsed: CategoryRules = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.len(), rules.len());
        assert_eq!(parsed.infer("kas"), "Operational");
    }
}
