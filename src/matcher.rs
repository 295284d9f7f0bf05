// 🔍 Name matcher - exact and fuzzy lookups against the store

use crate::store::{WatchlistEntry, WatchlistStore};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// How a search query is matched against stored names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Verbatim equality against `full_name`, case-sensitive as stored.
    Exact,

    /// OR-union of substring matches: the query is split on whitespace and an
    /// entry matches when its first or last name contains any token.
    Fuzzy,
}

impl SearchMode {
    /// `"weak"` (any casing) selects fuzzy matching; everything else is exact.
    pub fn from_param(param: &str) -> Self {
        if param.eq_ignore_ascii_case("weak") {
            SearchMode::Fuzzy
        } else {
            SearchMode::Exact
        }
    }
}

/// Search result projection of a stored entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameHit {
    pub uid: i64,

    #[serde(rename = "firstName")]
    pub first_name: String,

    #[serde(rename = "lastName")]
    pub last_name: String,
}

impl From<WatchlistEntry> for NameHit {
    fn from(entry: WatchlistEntry) -> Self {
        NameHit {
            uid: entry.uid,
            first_name: entry.first_name,
            last_name: entry.last_name,
        }
    }
}

// ============================================================================
// NAME MATCHER
// ============================================================================

pub struct NameMatcher;

impl NameMatcher {
    pub fn new() -> Self {
        NameMatcher
    }

    /// Answer a lookup query. Results come back in store-enumeration order;
    /// no ranking is computed. An empty result is a valid answer, not an
    /// error, and a fuzzy query with no tokens matches nothing.
    pub fn search(
        &self,
        store: &WatchlistStore,
        query: &str,
        mode: SearchMode,
    ) -> Result<Vec<NameHit>> {
        let entries = match mode {
            SearchMode::Exact => store.find_by_full_name(query)?,
            SearchMode::Fuzzy => {
                let tokens: Vec<&str> = query.split_whitespace().collect();
                if tokens.is_empty() {
                    return Ok(Vec::new());
                }
                store.find_by_name_tokens(&tokens)?
            }
        };

        Ok(entries.into_iter().map(NameHit::from).collect())
    }
}

impl Default for NameMatcher {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
