//! Source URL → category mapping.
//!
//! Rules are evaluated in the order they were configured and the first match
//! wins, so a URL that matches several rules is decided by their order alone.

use crate::config::CategoryConfig;

/// Category assigned when no rule matches.
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// One `(predicate, category)` pair. The predicate matches when the URL
/// contains any of the patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRule {
    category: String,
    patterns: Vec<String>,
}

impl CategoryRule {
    pub fn new<I, S>(category: impl Into<String>, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            category: category.into(),
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn matches(&self, url: &str) -> bool {
        self.patterns.iter().any(|pattern| url.contains(pattern.as_str()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Classifier {
    rules: Vec<CategoryRule>,
}

impl Classifier {
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        Self { rules }
    }

    pub fn from_config(categories: &[CategoryConfig]) -> Self {
        Self::new(
            categories
                .iter()
                .map(|c| CategoryRule::new(c.name.clone(), c.patterns.iter().cloned()))
                .collect(),
        )
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    pub fn classify(&self, url: &str) -> &str {
        self.rules
            .iter()
            .find(|rule| rule.matches(url))
            .map(CategoryRule::category)
            .unwrap_or(UNKNOWN_CATEGORY)
    }
}
