// Watchlist store - SQLite persistence for mirrored entries
// One row per person on the external list, keyed by the source-assigned uid.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One person record mirrored from the external watchlist.
///
/// `uid` is the identity assigned by the source feed; it is never generated
/// locally. `full_name` is always `first_name + " " + last_name` and is
/// recomputed on every name change, so it is never stored stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub uid: i64,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WatchlistEntry {
    /// The exact-match search key derived from the name components.
    pub fn full_name_of(first_name: &str, last_name: &str) -> String {
        format!("{} {}", first_name, last_name)
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Keyed storage for watchlist entries over a SQLite connection.
pub struct WatchlistStore {
    conn: Connection,
}

const ENTRY_COLUMNS: &str = "uid, first_name, last_name, full_name, created_at, updated_at";

impl WatchlistStore {
    /// Open (or create) the store at the given path and ensure the schema.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {:?}", path))?;
        let store = WatchlistStore { conn };
        store.setup()?;
        Ok(store)
    }

    /// In-memory store, used by tests and throwaway runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        let store = WatchlistStore { conn };
        store.setup()?;
        Ok(store)
    }

    fn setup(&self) -> Result<()> {
        // WAL mode for crash recovery
        self.conn.pragma_update(None, "journal_mode", "WAL")?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS names (
                uid        INTEGER PRIMARY KEY,
                first_name TEXT NOT NULL,
                last_name  TEXT NOT NULL,
                full_name  TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        // full_name is the exact-match search key
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_names_full_name ON names(full_name)",
            [],
        )?;

        Ok(())
    }

    /// Insert a new entry. `created_at` and `updated_at` are both set to now;
    /// `full_name` is derived from the components.
    pub fn insert(&self, uid: i64, first_name: &str, last_name: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let full_name = WatchlistEntry::full_name_of(first_name, last_name);

        self.conn
            .execute(
                "INSERT INTO names (uid, first_name, last_name, full_name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![uid, first_name, last_name, full_name, now, now],
            )
            .with_context(|| format!("failed to insert watchlist entry uid {}", uid))?;

        Ok(())
    }

    /// Overwrite the name components of an existing entry. `full_name` is
    /// recomputed and `updated_at` set to now; `uid` and `created_at` stay
    /// untouched.
    pub fn update_names(&self, uid: i64, first_name: &str, last_name: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let full_name = WatchlistEntry::full_name_of(first_name, last_name);

        self.conn
            .execute(
                "UPDATE names
                 SET first_name = ?1, last_name = ?2, full_name = ?3, updated_at = ?4
                 WHERE uid = ?5",
                params![first_name, last_name, full_name, now, uid],
            )
            .with_context(|| format!("failed to update watchlist entry uid {}", uid))?;

        Ok(())
    }

    /// All stored entries, in store-enumeration order.
    pub fn find_all(&self) -> Result<Vec<WatchlistEntry>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM names", ENTRY_COLUMNS))?;

        let entries = stmt
            .query_map([], Self::row_to_entry)?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read watchlist entries")?;

        Ok(entries)
    }

    /// Entries whose `full_name` equals `query` verbatim (case-sensitive).
    pub fn find_by_full_name(&self, query: &str) -> Result<Vec<WatchlistEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM names WHERE full_name = ?1",
            ENTRY_COLUMNS
        ))?;

        let entries = stmt
            .query_map([query], Self::row_to_entry)?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to search by full name")?;

        Ok(entries)
    }

    /// Entries whose first or last name contains any of the tokens as a
    /// substring (logical OR across tokens and both fields). Each matching
    /// entry appears once, in store-enumeration order. An empty token list
    /// matches nothing.
    pub fn find_by_name_tokens(&self, tokens: &[&str]) -> Result<Vec<WatchlistEntry>> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let clauses: Vec<String> = (1..=tokens.len())
            .map(|i| format!("first_name LIKE ?{i} OR last_name LIKE ?{i}"))
            .collect();
        let sql = format!(
            "SELECT {} FROM names WHERE {}",
            ENTRY_COLUMNS,
            clauses.join(" OR ")
        );
        let patterns: Vec<String> = tokens.iter().map(|t| format!("%{}%", t)).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params_from_iter(patterns.iter()), Self::row_to_entry)?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to search by name tokens")?;

        Ok(entries)
    }

    /// Number of stored entries.
    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM names", [], |row| row.get(0))
            .context("failed to count watchlist entries")?;

        Ok(count)
    }

    fn row_to_entry(row: &Row) -> rusqlite::Result<WatchlistEntry> {
        let created_at_str: String = row.get(4)?;
        let updated_at_str: String = row.get(5)?;

        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map_err(|_| rusqlite::Error::InvalidQuery)?
            .with_timezone(&Utc);
        let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
            .map_err(|_| rusqlite::Error::InvalidQuery)?
            .with_timezone(&Utc);

        Ok(WatchlistEntry {
            uid: row.get(0)?,
            first_name: row.get(1)?,
            last_name: row.get(2)?,
            full_name: row.get(3)?,
            created_at,
            updated_at,
        })
    }
}

#[cfg(test)]
impl WatchlistStore {
    /// Drop the backing table so the next operation fails, to exercise
    /// store-failure paths.
    pub(crate) fn break_schema(&self) {
        self.conn.execute("DROP TABLE names", []).unwrap();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_find_all() {
        let store = WatchlistStore::open_in_memory().unwrap();

        store.insert(1, "John", "Smith").unwrap();
        store.insert(2, "Anna", "Jones").unwrap();

        let entries = store.find_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(store.count().unwrap(), 2);

        let john = entries.iter().find(|e| e.uid == 1).unwrap();
        assert_eq!(john.first_name, "John");
        assert_eq!(john.last_name, "Smith");
        assert_eq!(john.full_name, "John Smith");
        assert_eq!(john.created_at, john.updated_at);
    }

    #[test]
    fn test_insert_duplicate_uid_fails() {
        let store = WatchlistStore::open_in_memory().unwrap();

        store.insert(1, "John", "Smith").unwrap();
        assert!(store.insert(1, "John", "Smith").is_err());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_update_names_recomputes_full_name() {
        let store = WatchlistStore::open_in_memory().unwrap();

        store.insert(1, "John", "Smith").unwrap();
        let before = store.find_all().unwrap().remove(0);

        std::thread::sleep(std::time::Duration::from_millis(5));
        store.update_names(1, "John", "Smithe").unwrap();

        let after = store.find_all().unwrap().remove(0);
        assert_eq!(after.uid, 1);
        assert_eq!(after.last_name, "Smithe");
        assert_eq!(after.full_name, "John Smithe");
        assert_eq!(after.created_at, before.created_at);
        assert!(after.updated_at > before.updated_at);
    }

    #[test]
    fn test_find_by_full_name_is_verbatim() {
        let store = WatchlistStore::open_in_memory().unwrap();

        store.insert(1, "John", "Smith").unwrap();
        store.insert(2, "Johnny", "Smith").unwrap();

        let hits = store.find_by_full_name("John Smith").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].uid, 1);

        // equality, not substring, and case-sensitive
        assert!(store.find_by_full_name("john smith").unwrap().is_empty());
        assert!(store.find_by_full_name("John").unwrap().is_empty());
    }

    #[test]
    fn test_find_by_name_tokens_union() {
        let store = WatchlistStore::open_in_memory().unwrap();

        store.insert(1, "John", "Smith").unwrap();
        store.insert(2, "Johnny", "Walker").unwrap();
        store.insert(3, "Anna", "Smithson").unwrap();
        store.insert(4, "Boris", "Petrov").unwrap();

        let hits = store.find_by_name_tokens(&["john", "smith"]).unwrap();
        let uids: Vec<i64> = hits.iter().map(|e| e.uid).collect();

        // OR-union across tokens and both name fields, substring matching
        assert_eq!(uids, vec![1, 2, 3]);
    }

    #[test]
    fn test_find_by_name_tokens_no_duplicate_rows() {
        let store = WatchlistStore::open_in_memory().unwrap();

        // matches both tokens, must still appear once
        store.insert(1, "John", "Johnson").unwrap();

        let hits = store.find_by_name_tokens(&["john", "son"]).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_find_by_name_tokens_empty_matches_nothing() {
        let store = WatchlistStore::open_in_memory().unwrap();
        store.insert(1, "John", "Smith").unwrap();

        assert!(store.find_by_name_tokens(&[]).unwrap().is_empty());
    }
}
