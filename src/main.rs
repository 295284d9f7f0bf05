// Watchlist Mirror - CLI
// refresh / search / status against the local mirror database.

use anyhow::Result;
use std::env;
use std::sync::{Arc, Mutex};

use watchlist_mirror::{
    NameMatcher, RefreshOutcome, SdnXmlFeed, SearchMode, Settings, SyncCoordinator, WatchlistStore,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("watchlist_mirror=info")
        .init();

    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("refresh") => run_refresh(),
        Some("search") => run_search(&args[2..]),
        Some("status") => run_status(),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("Watchlist Mirror v{}", watchlist_mirror::VERSION);
    println!();
    println!("Usage:");
    println!("  watchlist-mirror refresh              pull the list and reconcile the mirror");
    println!("  watchlist-mirror search <name> [weak] look up a name (weak = fuzzy)");
    println!("  watchlist-mirror status               show mirror size");
}

fn run_refresh() -> Result<()> {
    let settings = Settings::from_env();

    println!("🔄 Watchlist refresh");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("\n📡 Source: {}", settings.feed_url);

    let store = WatchlistStore::open(&settings.database_path)?;
    println!("✓ Database opened: {:?}", settings.database_path);

    let feed = SdnXmlFeed::new(settings.feed_url);
    let coordinator = SyncCoordinator::new(Box::new(feed), Arc::new(Mutex::new(store)));

    match coordinator.trigger_refresh() {
        RefreshOutcome::Completed(summary) => {
            println!("\n✓ Inserted: {}", summary.inserted);
            println!("✓ Updated: {}", summary.updated);
            println!("✓ Unchanged: {}", summary.skipped);
            Ok(())
        }
        RefreshOutcome::AlreadyInProgress => {
            println!("\n⏳ A refresh is already in progress");
            Ok(())
        }
        RefreshOutcome::Failed(cause) => Err(cause.into()),
    }
}

fn run_search(rest: &[String]) -> Result<()> {
    let Some(name) = rest.first() else {
        print_usage();
        std::process::exit(2);
    };
    let mode = rest
        .get(1)
        .map(|m| SearchMode::from_param(m))
        .unwrap_or(SearchMode::Exact);

    let settings = Settings::from_env();
    let store = WatchlistStore::open(&settings.database_path)?;

    let hits = NameMatcher::new().search(&store, name, mode)?;

    if hits.is_empty() {
        println!("No matches for \"{}\"", name);
        return Ok(());
    }

    for hit in &hits {
        println!("{:>8}  {} {}", hit.uid, hit.first_name, hit.last_name);
    }
    println!("\n✓ {} match(es)", hits.len());

    Ok(())
}

fn run_status() -> Result<()> {
    let settings = Settings::from_env();
    let store = WatchlistStore::open(&settings.database_path)?;

    let count = store.count()?;
    if count == 0 {
        println!("Mirror is empty. Run `watchlist-mirror refresh` first.");
    } else {
        println!("✓ {} entries mirrored in {:?}", count, settings.database_path);
    }

    Ok(())
}
