//! Skip-level exceptions
//!
//! A few cities list towns directly on their own page in some releases,
//! with no county tier in between. Each rule maps a city code and a set of
//! release years to the level actually listed under that city.

use crate::config::SkipLevelEntry;
use crate::model::Level;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
struct SkipRule {
    code: String,
    years: Vec<String>,
    skip_to: Level,
}

/// Lookup table of `(code, years) -> level` rules
#[derive(Debug, Clone, Default)]
pub struct SkipLevelTable {
    rules: Vec<SkipRule>,
}

impl SkipLevelTable {
    /// Builds the table from validated configuration entries
    ///
    /// Entries naming an unknown level are ignored; validation rejects them
    /// before they get here.
    pub fn from_config(entries: &[SkipLevelEntry]) -> Self {
        let rules = entries
            .iter()
            .filter_map(|entry| {
                Level::from_name(&entry.skip_to).map(|skip_to| SkipRule {
                    code: entry.code.clone(),
                    years: entry.years.clone(),
                    skip_to,
                })
            })
            .collect();
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Level of the records listed on `link`, the child page of a `level`
    /// node with the given `code`
    ///
    /// Rules only apply to cities. A rule matches when the code is equal and
    /// the link's path contains one of the rule's years.
    pub fn child_level(&self, level: Level, code: &str, link: &str) -> Option<Level> {
        let default = level.next();
        if level != Level::City {
            return default;
        }

        let parsed = Url::parse(link).ok();
        let link_path = parsed.as_ref().map_or(link, |u| u.path());

        self.rules
            .iter()
            .find(|rule| {
                rule.code == code && rule.years.iter().any(|y| link_path.contains(y.as_str()))
            })
            .map(|rule| {
                tracing::debug!("{} lists {} directly at {}", code, rule.skip_to, link);
                rule.skip_to
            })
            .or(default)
    }
}
