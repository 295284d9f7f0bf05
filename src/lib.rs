// Watchlist Mirror - Core Library
// Local queryable mirror of the OFAC SDN list: store, source feed,
// reconciliation, single-flight refresh coordination, and name search.

pub mod config;
pub mod feed;
pub mod matcher;
pub mod reconcile;
pub mod store;
pub mod sync;

// Re-export commonly used types
pub use config::Settings;
pub use feed::{parse_sdn_xml, CandidateRecord, FeedError, SdnXmlFeed, SourceFeed, DEFAULT_FEED_URL};
pub use matcher::{NameHit, NameMatcher, SearchMode};
pub use reconcile::{ReconcileSummary, ReconciliationEngine};
pub use store::{WatchlistEntry, WatchlistStore};
pub use sync::{RefreshError, RefreshOutcome, RefreshState, SyncCoordinator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
