//! Deterministic keyword rules mapping publisher spellings to canonical names.
//!
//! A rule table is a JSON array. Each rule is either an object or a
//! `[canonical, keywords]` pair:
//!
//! ```json
//! [
//!     { "canonical": "O'Reilly Media", "keywords": ["o'reilly", "oreilly"] },
//!     ["No Starch Press", ["no starch"]]
//! ]
//! ```

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::Deserialize;
use std::path::Path;
use tracing::instrument;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub canonical: String,
    /// Lowercase, never empty.
    keywords: Vec<String>,
}
impl Rule {
    pub fn new(canonical: impl Into<String>, keywords: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        let keywords = keywords
            .into_iter()
            .map(|keyword| keyword.as_ref().trim().to_lowercase())
            .filter(|keyword| !keyword.is_empty())
            .collect();
        Self { canonical: canonical.into(), keywords }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Length (in characters) of this rule's longest keyword found in
    /// `lowercase`.
    fn longest_match(&self, lowercase: &str) -> Option<usize> {
        self.keywords.iter().filter(|k| lowercase.contains(k.as_str())).map(|k| k.chars().count()).max()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRule {
    Object { canonical: String, keywords: Vec<String> },
    Pair(String, Vec<String>),
}
impl From<RawRule> for Rule {
    fn from(raw: RawRule) -> Self {
        match raw {
            RawRule::Object { canonical, keywords } | RawRule::Pair(canonical, keywords) => {
                Rule::new(canonical, keywords)
            },
        }
    }
}

/// An ordered, read-only list of [`Rule`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleTable {
    rules: Vec<Rule>,
}
impl RuleTable {
    pub fn new(rules: impl IntoIterator<Item = Rule>) -> Self {
        Self { rules: rules.into_iter().filter(|rule| !rule.keywords.is_empty()).collect() }
    }

    pub fn parse(json: &str) -> serde_json::Result<Self> {
        let raw: Vec<RawRule> = serde_json::from_str(json)?;
        Ok(Self::new(raw.into_iter().map(Rule::from)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let rules = || ErrorKind::Rules(path.to_path_buf());
        let json = std::fs::read_to_string(path).or_raise(rules)?;
        Self::parse(&json).or_raise(rules)
    }

    /// Loads the table at `path`, degrading to an empty table when there is
    /// no path or the file is missing or malformed.
    #[instrument(skip_all, fields(path = ?path))]
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            tracing::info!("No publisher rule table configured");
            return Self::default();
        };
        match Self::from_file(path) {
            Ok(table) => {
                tracing::debug!(rules = table.len(), "Loaded publisher rule table");
                table
            },
            Err(error) => {
                tracing::warn!(path = %path.display(), "Continuing without publisher rules: {error:?}");
                Self::default()
            },
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Canonical name for `raw`, if any rule matches.
    ///
    /// The rule whose matching keyword is longest wins, so that a specific
    /// keyword (`"o'reilly media"`) beats a generic one (`"media"`) regardless
    /// of table order. Equal lengths go to the rule listed first.
    pub fn find(&self, raw: &str) -> Option<&str> {
        let lowercase = raw.to_lowercase();
        let mut best: Option<(usize, &Rule)> = None;
        for rule in &self.rules {
            if let Some(length) = rule.longest_match(&lowercase)
                && best.is_none_or(|(longest, _)| length > longest)
            {
                best = Some((length, rule));
            }
        }
        best.map(|(_, rule)| rule.canonical.as_str())
    }
}
