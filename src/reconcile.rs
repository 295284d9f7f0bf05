// ⚖️ Reconciliation engine - merge a fetched snapshot into the store
// Per candidate: decide New / Updated / Unchanged, apply the minimal mutation.

use crate::feed::CandidateRecord;
use crate::store::WatchlistStore;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

/// Counts for one reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    /// Candidates whose uid was not yet present.
    pub inserted: usize,

    /// Candidates whose uid existed with different name components.
    pub updated: usize,

    /// Candidates already present with identical name components.
    pub skipped: usize,
}

impl ReconcileSummary {
    /// Store mutations issued by the run.
    pub fn mutations(&self) -> usize {
        self.inserted + self.updated
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

pub struct ReconciliationEngine;

impl ReconciliationEngine {
    pub fn new() -> Self {
        ReconciliationEngine
    }

    /// Merge a candidate batch into the store.
    ///
    /// Candidates whose category is not `Individual` are discarded before
    /// comparison. The rest are processed strictly in feed order; after every
    /// insert or update the snapshot lookup is updated in step, so a later
    /// candidate carrying the same uid sees the effect of the earlier one.
    ///
    /// A candidate matches an existing entry on uid alone; it counts as
    /// unchanged when the stored `(first_name, last_name)` pair is identical.
    ///
    /// The first store failure aborts the whole run and propagates, with the
    /// counts completed so far attached to the error context. There is no
    /// partial-progress success result.
    pub fn reconcile(
        &self,
        store: &WatchlistStore,
        candidates: &[CandidateRecord],
    ) -> Result<ReconcileSummary> {
        let snapshot = store
            .find_all()
            .context("failed to read store snapshot")?;

        let mut known: HashMap<i64, (String, String)> = snapshot
            .into_iter()
            .map(|e| (e.uid, (e.first_name, e.last_name)))
            .collect();

        let mut summary = ReconcileSummary::default();

        for candidate in candidates {
            if !candidate.is_individual() {
                debug!(
                    uid = candidate.uid,
                    category = %candidate.category,
                    "discarding non-individual candidate"
                );
                continue;
            }

            match known.get(&candidate.uid) {
                Some((first, last))
                    if *first == candidate.first_name && *last == candidate.last_name =>
                {
                    summary.skipped += 1;
                }
                Some(_) => {
                    store
                        .update_names(candidate.uid, &candidate.first_name, &candidate.last_name)
                        .with_context(|| abort_context(&summary))?;
                    known.insert(
                        candidate.uid,
                        (candidate.first_name.clone(), candidate.last_name.clone()),
                    );
                    summary.updated += 1;
                }
                None => {
                    store
                        .insert(candidate.uid, &candidate.first_name, &candidate.last_name)
                        .with_context(|| abort_context(&summary))?;
                    known.insert(
                        candidate.uid,
                        (candidate.first_name.clone(), candidate.last_name.clone()),
                    );
                    summary.inserted += 1;
                }
            }
        }

        info!(
            inserted = summary.inserted,
            updated = summary.updated,
            skipped = summary.skipped,
            "reconciliation finished"
        );

        Ok(summary)
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn abort_context(summary: &ReconcileSummary) -> String {
    format!(
        "run aborted after {} inserts and {} updates",
        summary.inserted, summary.updated
    )
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn individual(uid: i64, first: &str, last: &str) -> CandidateRecord {
        CandidateRecord {
            uid,
            first_name: first.to_string(),
            last_name: last.to_string(),
            category: "Individual".to_string(),
        }
    }

    fn organization(uid: i64, first: &str, last: &str) -> CandidateRecord {
        CandidateRecord {
            uid,
            first_name: first.to_string(),
            last_name: last.to_string(),
            category: "Entity".to_string(),
        }
    }

    #[test]
    fn test_new_candidate_is_inserted() {
        let store = WatchlistStore::open_in_memory().unwrap();
        let engine = ReconciliationEngine::new();

        let summary = engine
            .reconcile(&store, &[individual(2, "John", "Smith")])
            .unwrap();

        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.mutations(), 1);

        let entries = store.find_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].uid, 2);
        assert_eq!(entries[0].full_name, "John Smith");
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let store = WatchlistStore::open_in_memory().unwrap();
        let engine = ReconciliationEngine::new();
        let batch = vec![
            individual(1, "John", "Smith"),
            individual(2, "Anna", "Jones"),
        ];

        let first = engine.reconcile(&store, &batch).unwrap();
        assert_eq!(first.inserted, 2);

        let second = engine.reconcile(&store, &batch).unwrap();
        assert_eq!(second.mutations(), 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(store.count().unwrap(), 2);

        println!("✅ Idempotency test passed: 0 mutations on second run");
    }

    #[test]
    fn test_changed_names_update_in_place() {
        let store = WatchlistStore::open_in_memory().unwrap();
        let engine = ReconciliationEngine::new();

        engine
            .reconcile(&store, &[individual(1, "John", "Smith")])
            .unwrap();
        let before = store.find_all().unwrap().remove(0);

        std::thread::sleep(std::time::Duration::from_millis(5));
        let summary = engine
            .reconcile(&store, &[individual(1, "John", "Smithe")])
            .unwrap();

        assert_eq!(summary.updated, 1);
        assert_eq!(summary.inserted, 0);

        let after = store.find_all().unwrap().remove(0);
        assert_eq!(after.uid, 1);
        assert_eq!(after.full_name, "John Smithe");
        assert_eq!(after.created_at, before.created_at);
        assert!(after.updated_at > before.updated_at);
    }

    #[test]
    fn test_non_individuals_never_mutate() {
        let store = WatchlistStore::open_in_memory().unwrap();
        let engine = ReconciliationEngine::new();

        let summary = engine
            .reconcile(&store, &[organization(2, "Acme", "Corp")])
            .unwrap();

        assert_eq!(summary, ReconcileSummary::default());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_duplicate_uid_in_one_batch_is_sequential() {
        let store = WatchlistStore::open_in_memory().unwrap();
        let engine = ReconciliationEngine::new();

        // the second candidate must see the first one's insert,
        // so it classifies as an update rather than a duplicate insert
        let batch = vec![
            individual(7, "John", "Smith"),
            individual(7, "John", "Smythe"),
        ];

        let summary = engine.reconcile(&store, &batch).unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.updated, 1);

        let entries = store.find_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].last_name, "Smythe");
    }

    #[test]
    fn test_identical_duplicate_in_one_batch_is_skipped() {
        let store = WatchlistStore::open_in_memory().unwrap();
        let engine = ReconciliationEngine::new();

        let batch = vec![
            individual(7, "John", "Smith"),
            individual(7, "John", "Smith"),
        ];

        let summary = engine.reconcile(&store, &batch).unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_store_failure_aborts_run() {
        let store = WatchlistStore::open_in_memory().unwrap();
        store.break_schema();
        let engine = ReconciliationEngine::new();

        let result = engine.reconcile(&store, &[individual(1, "John", "Smith")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_untouched_entries_are_left_alone() {
        let store = WatchlistStore::open_in_memory().unwrap();
        let engine = ReconciliationEngine::new();

        engine
            .reconcile(
                &store,
                &[individual(1, "John", "Smith"), individual(2, "Anna", "Jones")],
            )
            .unwrap();

        // a later snapshot missing uid 2 does not prune it
        let summary = engine
            .reconcile(&store, &[individual(1, "John", "Smith")])
            .unwrap();

        assert_eq!(summary.mutations(), 0);
        assert_eq!(store.count().unwrap(), 2);
    }
}
