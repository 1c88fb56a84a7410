//! Store overview for `ah stats`.
//!
//! Per collection: record count, oldest and newest `published_date`, and the
//! highest `sequence_id` (the search-mode checkpoint).

use anyhow::Result;

use article_harness_core::models::Collection;
use article_harness_core::store::{ArticleStore, CollectionStats};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let store = SqliteStore::new(pool);
    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    let mut rows = Vec::new();
    for collection in Collection::all() {
        rows.push((collection, store.stats(collection).await?));
    }
    store.pool().close().await;

    println!("Article Harness: Store Stats");
    println!("============================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!(
        "  {:<10} {:>8}   {:<16} {:<16} {:>8}",
        "COLLECTION", "RECORDS", "OLDEST", "NEWEST", "MAX SEQ"
    );
    println!("  {}", "-".repeat(64));
    for (collection, stats) in &rows {
        println!("{}", format_row(*collection, stats));
    }
    println!();
    Ok(())
}

fn format_row(collection: Collection, stats: &CollectionStats) -> String {
    let date = |d: Option<chrono::DateTime<chrono::Utc>>| {
        d.map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string())
    };
    format!(
        "  {:<10} {:>8}   {:<16} {:<16} {:>8}",
        collection.as_str(),
        stats.records,
        date(stats.oldest_published),
        date(stats.newest_published),
        stats
            .max_sequence_id
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string())
    )
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
