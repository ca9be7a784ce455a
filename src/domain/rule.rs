use serde::{Deserialize, Serialize};

use super::category::Category;

/// One enabled rule, as stored in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub category: Category,
    pub rule_name: String,
}

impl RuleRecord {
    pub fn new(category: Category, rule_name: impl Into<String>) -> Self {
        RuleRecord {
            category,
            rule_name: rule_name.into(),
        }
    }
}

/// Concrete forwarding target derived from a rule record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEndpoint {
    pub category: Category,
    pub rule_name: String,
    pub url: String,
}
