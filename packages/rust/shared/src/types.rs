//! Core domain types for Greylit search runs.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GreylitError, Result};

/// Fixed page size of the search API.
pub const PAGE_SIZE: usize = 10;

/// Documented ceiling of results kept per website.
pub const MAX_RESULTS_PER_WEBSITE: usize = 40;

/// Default number of unique results the escalator aims for per website.
pub const DEFAULT_TARGET_COUNT: usize = MAX_RESULTS_PER_WEBSITE;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one search run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Query tier. Tier 1 is the highest priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Priority {
    First,
    Second,
    Third,
}

impl Priority {
    /// All tiers in escalation order.
    pub const ALL: [Priority; 3] = [Priority::First, Priority::Second, Priority::Third];

    /// The tier number (1, 2 or 3).
    pub fn number(self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
            Self::Third => 3,
        }
    }

    /// Maximum number of pages requested for this tier per website.
    pub fn page_cap(self) -> u32 {
        match self {
            Self::First => 4,
            Self::Second => 8,
            Self::Third => 10,
        }
    }

    fn index(self) -> usize {
        usize::from(self.number() - 1)
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> Self {
        p.number()
    }
}

impl TryFrom<u8> for Priority {
    type Error = GreylitError;

    fn try_from(n: u8) -> Result<Self> {
        match n {
            1 => Ok(Self::First),
            2 => Ok(Self::Second),
            3 => Ok(Self::Third),
            other => Err(GreylitError::validation(format!(
                "priority {other} not supported (expected 1, 2 or 3)"
            ))),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

// ---------------------------------------------------------------------------
// QuerySpec
// ---------------------------------------------------------------------------

/// One tier's search terms, grouped the way the search form collects them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Terms that must all appear.
    #[serde(default)]
    pub all_words: String,
    /// A phrase that must appear verbatim.
    #[serde(default)]
    pub exact_phrase: String,
    /// Terms of which at least one must appear.
    #[serde(default)]
    pub any_words: String,
    /// Terms that must not appear.
    #[serde(default)]
    pub exclude_words: String,
    /// Tier this spec belongs to.
    pub priority: Priority,
}

impl QuerySpec {
    /// An empty spec for the given tier.
    pub fn new(priority: Priority) -> Self {
        Self {
            all_words: String::new(),
            exact_phrase: String::new(),
            any_words: String::new(),
            exclude_words: String::new(),
            priority,
        }
    }

    pub fn all_words(mut self, terms: impl Into<String>) -> Self {
        self.all_words = terms.into();
        self
    }

    pub fn exact_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.exact_phrase = phrase.into();
        self
    }

    pub fn any_words(mut self, terms: impl Into<String>) -> Self {
        self.any_words = terms.into();
        self
    }

    pub fn exclude_words(mut self, terms: impl Into<String>) -> Self {
        self.exclude_words = terms.into();
        self
    }

    /// A spec whose four term groups are all blank is treated as absent.
    pub fn is_empty(&self) -> bool {
        [
            &self.all_words,
            &self.exact_phrase,
            &self.any_words,
            &self.exclude_words,
        ]
        .iter()
        .all(|s| s.trim().is_empty())
    }

    /// Operator-facing label, stored as the records-store `search_query`.
    pub fn describe(&self, website: &str) -> String {
        let mut parts = Vec::new();
        if !self.all_words.trim().is_empty() {
            parts.push(format!("AND: {}", self.all_words.trim()));
        }
        if !self.exact_phrase.trim().is_empty() {
            parts.push(format!("EXACT: \"{}\"", self.exact_phrase.trim()));
        }
        if !self.any_words.trim().is_empty() {
            parts.push(format!("OR: {}", self.any_words.trim()));
        }
        if !self.exclude_words.trim().is_empty() {
            parts.push(format!("NOT: {}", self.exclude_words.trim()));
        }

        if parts.is_empty() {
            format!("search on {website}")
        } else {
            parts.join(" | ")
        }
    }
}

// ---------------------------------------------------------------------------
// TierSet
// ---------------------------------------------------------------------------

/// Up to three query specs, one slot per tier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierSet {
    slots: [Option<QuerySpec>; 3],
}

impl TierSet {
    /// An empty tier set (no queries).
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tier set from specs, placing each in its priority's slot.
    ///
    /// Fails if two specs claim the same tier.
    pub fn from_specs(specs: impl IntoIterator<Item = QuerySpec>) -> Result<Self> {
        let mut set = Self::new();
        for spec in specs {
            let idx = spec.priority.index();
            if set.slots[idx].is_some() {
                return Err(GreylitError::config(format!(
                    "tier {} is defined more than once",
                    spec.priority
                )));
            }
            set.slots[idx] = Some(spec);
        }
        Ok(set)
    }

    /// Set the spec for its own tier, replacing any previous one.
    pub fn with(mut self, spec: QuerySpec) -> Self {
        let idx = spec.priority.index();
        self.slots[idx] = Some(spec);
        self
    }

    /// The spec for `tier`, if present and non-empty.
    pub fn get(&self, tier: Priority) -> Option<&QuerySpec> {
        self.slots[tier.index()]
            .as_ref()
            .filter(|spec| !spec.is_empty())
    }

    /// Non-empty specs in escalation order.
    pub fn active(&self) -> impl Iterator<Item = &QuerySpec> {
        Priority::ALL.into_iter().filter_map(|tier| self.get(tier))
    }

    /// Whether no tier has any search terms.
    pub fn is_empty(&self) -> bool {
        self.active().next().is_none()
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// One record as returned by a search API page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

/// A deduplicated result, tagged with the tier that first found it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    /// Deduplication key within one website's result set.
    pub link: String,
    pub snippet: String,
    pub priority: Priority,
    pub source_website: String,
}

impl SearchResult {
    pub fn from_raw(raw: RawResult, priority: Priority, website: &str) -> Self {
        Self {
            title: raw.title,
            link: raw.link,
            snippet: raw.snippet,
            priority,
            source_website: website.to_string(),
        }
    }
}

/// Error note attached to a partial result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFailure {
    pub website: String,
    pub tier: Priority,
    pub page: u32,
    pub message: String,
}

impl fmt::Display for PageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tier {} page {}: {}",
            self.website, self.tier, self.page, self.message
        )
    }
}

/// Deduplicated results for one website.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSet {
    pub website: String,
    pub results: Vec<SearchResult>,
    /// Labels of the tiers that were actually queried, in order.
    #[serde(default)]
    pub queries: Vec<String>,
    /// Set when a page failure cut this website's search short.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<PageFailure>,
}

impl ResultSet {
    pub fn new(website: impl Into<String>) -> Self {
        Self {
            website: website.into(),
            results: Vec::new(),
            queries: Vec::new(),
            failure: None,
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn is_partial(&self) -> bool {
        self.failure.is_some()
    }

    /// Joined tier labels, used as the records-store `search_query` field.
    pub fn search_query(&self) -> String {
        if self.queries.is_empty() {
            format!("search on {}", self.website)
        } else {
            self.queries.join("; ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_is_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }

    #[test]
    fn priority_page_caps() {
        assert_eq!(Priority::First.page_cap(), 4);
        assert_eq!(Priority::Second.page_cap(), 8);
        assert_eq!(Priority::Third.page_cap(), 10);
    }

    #[test]
    fn priority_serializes_as_number() {
        let json = serde_json::to_string(&Priority::Third).expect("serialize");
        assert_eq!(json, "3");
        let parsed: Priority = serde_json::from_str("2").expect("deserialize");
        assert_eq!(parsed, Priority::Second);
        assert!(serde_json::from_str::<Priority>("4").is_err());
    }

    #[test]
    fn blank_spec_is_empty() {
        let spec = QuerySpec::new(Priority::First)
            .all_words("   ")
            .exclude_words("\t");
        assert!(spec.is_empty());
        assert!(!spec.exact_phrase("report").is_empty());
    }

    #[test]
    fn describe_lists_present_groups() {
        let spec = QuerySpec::new(Priority::First)
            .all_words("flood report")
            .exact_phrase("grey literature")
            .exclude_words("news");
        assert_eq!(
            spec.describe("example.com"),
            "AND: flood report | EXACT: \"grey literature\" | NOT: news"
        );
        assert_eq!(
            QuerySpec::new(Priority::Second).describe("example.com"),
            "search on example.com"
        );
    }

    #[test]
    fn tier_set_skips_blank_tiers() {
        let tiers = TierSet::new()
            .with(QuerySpec::new(Priority::First).all_words("flood"))
            .with(QuerySpec::new(Priority::Second).any_words("  "))
            .with(QuerySpec::new(Priority::Third).exact_phrase("storm surge"));

        let active: Vec<Priority> = tiers.active().map(|s| s.priority).collect();
        assert_eq!(active, vec![Priority::First, Priority::Third]);
        assert!(tiers.get(Priority::Second).is_none());
        assert!(TierSet::new().is_empty());
    }

    #[test]
    fn tier_set_rejects_duplicate_tiers() {
        let result = TierSet::from_specs([
            QuerySpec::new(Priority::First).all_words("a"),
            QuerySpec::new(Priority::First).all_words("b"),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn result_set_search_query_joins_labels() {
        let mut set = ResultSet::new("example.com");
        assert_eq!(set.search_query(), "search on example.com");
        set.queries.push("AND: flood".into());
        set.queries.push("OR: storm rain".into());
        assert_eq!(set.search_query(), "AND: flood; OR: storm rain");
    }
}
