use anyhow::Result;
use sqlx::SqlitePool;

use article_harness_core::models::Collection;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Safe to run repeatedly.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Archive and search collections share one layout
    for collection in Collection::all() {
        let table = collection.table();
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                uri TEXT PRIMARY KEY,
                headline TEXT,
                byline TEXT,
                published_at INTEGER, -- unix millis
                section TEXT NOT NULL DEFAULT '',
                subsection TEXT NOT NULL DEFAULT '',
                word_count INTEGER,
                sequence_id INTEGER,
                abstract TEXT,
                web_url TEXT,
                lead_paragraph TEXT,
                snippet TEXT,
                source TEXT,
                document_type TEXT,
                news_desk TEXT,
                type_of_material TEXT,
                extra_json TEXT NOT NULL DEFAULT '{{}}',
                content_hash TEXT NOT NULL,
                ingested_at INTEGER NOT NULL
            )
            "#
        ))
        .execute(pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_published_at ON {table}(published_at DESC)"
        ))
        .execute(pool)
        .await?;
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_sequence_id ON {table}(sequence_id)"
        ))
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ingest_leases (
            name TEXT PRIMARY KEY,
            holder TEXT NOT NULL,
            acquired_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
