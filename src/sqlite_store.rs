//! SQLite-backed [`ArticleStore`] implementation.
//!
//! Each [`Collection`] is one table keyed by `uri` (see [`crate::migrate`]).
//! Upserts use `INSERT ... ON CONFLICT(uri) DO UPDATE`, so every record write
//! is a single atomic statement and replays converge on the same row.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use article_harness_core::models::{CanonicalRecord, Collection, UpsertOutcome};
use article_harness_core::store::{ArticleStore, CollectionStats, LeaseOutcome};

const COLUMNS: &str = "uri, headline, byline, published_at, section, subsection, word_count, \
    sequence_id, abstract, web_url, lead_paragraph, snippet, source, document_type, news_desk, \
    type_of_material, extra_json, content_hash";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// `published_at` is stored as Unix milliseconds.
fn millis_to_utc(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.and_then(DateTime::from_timestamp_millis)
}

fn row_to_record(row: &SqliteRow) -> Result<CanonicalRecord> {
    let extra_json: String = row.try_get("extra_json")?;
    let extra = match serde_json::from_str::<serde_json::Value>(&extra_json) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    Ok(CanonicalRecord {
        uri: row.try_get("uri")?,
        headline: row.try_get("headline")?,
        byline: row.try_get("byline")?,
        published_date: millis_to_utc(row.try_get("published_at")?),
        section: row.try_get("section")?,
        subsection: row.try_get("subsection")?,
        word_count: row.try_get("word_count")?,
        sequence_id: row.try_get("sequence_id")?,
        abstract_text: row.try_get("abstract")?,
        web_url: row.try_get("web_url")?,
        lead_paragraph: row.try_get("lead_paragraph")?,
        snippet: row.try_get("snippet")?,
        source: row.try_get("source")?,
        document_type: row.try_get("document_type")?,
        news_desk: row.try_get("news_desk")?,
        type_of_material: row.try_get("type_of_material")?,
        extra,
        content_hash: row.try_get("content_hash")?,
    })
}

#[async_trait]
impl ArticleStore for SqliteStore {
    async fn find_by_uri(
        &self,
        collection: Collection,
        uri: &str,
    ) -> Result<Option<CanonicalRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM {} WHERE uri = ?",
            collection.table()
        ))
        .bind(uri)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn contains(&self, collection: Collection, uri: &str) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT 1 FROM {} WHERE uri = ?",
            collection.table()
        ))
        .bind(uri)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    async fn max_sequence_id(&self, collection: Collection) -> Result<Option<i64>> {
        let max: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT MAX(sequence_id) FROM {}",
            collection.table()
        ))
        .fetch_one(&self.pool)
        .await?;
        Ok(max)
    }

    async fn upsert(
        &self,
        collection: Collection,
        record: &CanonicalRecord,
    ) -> Result<UpsertOutcome> {
        let table = collection.table();

        let existing = sqlx::query(&format!(
            "SELECT content_hash, sequence_id FROM {table} WHERE uri = ?"
        ))
        .bind(&record.uri)
        .fetch_optional(&self.pool)
        .await?;

        let outcome = match existing {
            None => UpsertOutcome::Inserted,
            Some(row) => {
                let hash: String = row.try_get("content_hash")?;
                let seq: Option<i64> = row.try_get("sequence_id")?;
                if hash == record.content_hash && seq == record.sequence_id {
                    return Ok(UpsertOutcome::Unchanged);
                }
                UpsertOutcome::Updated
            }
        };

        let extra_json = serde_json::Value::Object(record.extra.clone()).to_string();
        sqlx::query(&format!(
            r#"
            INSERT INTO {table} ({COLUMNS}, ingested_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(uri) DO UPDATE SET
                headline = excluded.headline,
                byline = excluded.byline,
                published_at = excluded.published_at,
                section = excluded.section,
                subsection = excluded.subsection,
                word_count = excluded.word_count,
                sequence_id = excluded.sequence_id,
                abstract = excluded.abstract,
                web_url = excluded.web_url,
                lead_paragraph = excluded.lead_paragraph,
                snippet = excluded.snippet,
                source = excluded.source,
                document_type = excluded.document_type,
                news_desk = excluded.news_desk,
                type_of_material = excluded.type_of_material,
                extra_json = excluded.extra_json,
                content_hash = excluded.content_hash,
                ingested_at = excluded.ingested_at
            "#
        ))
        .bind(&record.uri)
        .bind(&record.headline)
        .bind(&record.byline)
        .bind(record.published_date.map(|d| d.timestamp_millis()))
        .bind(&record.section)
        .bind(&record.subsection)
        .bind(record.word_count)
        .bind(record.sequence_id)
        .bind(&record.abstract_text)
        .bind(&record.web_url)
        .bind(&record.lead_paragraph)
        .bind(&record.snippet)
        .bind(&record.source)
        .bind(&record.document_type)
        .bind(&record.news_desk)
        .bind(&record.type_of_material)
        .bind(&extra_json)
        .bind(&record.content_hash)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(outcome)
    }

    async fn stats(&self, collection: Collection) -> Result<CollectionStats> {
        let row = sqlx::query(&format!(
            "SELECT COUNT(*) AS n, MIN(published_at) AS oldest, MAX(published_at) AS newest, \
             MAX(sequence_id) AS max_seq FROM {}",
            collection.table()
        ))
        .fetch_one(&self.pool)
        .await?;

        let n: i64 = row.try_get("n")?;
        Ok(CollectionStats {
            records: n as u64,
            oldest_published: millis_to_utc(row.try_get("oldest")?),
            newest_published: millis_to_utc(row.try_get("newest")?),
            max_sequence_id: row.try_get("max_seq")?,
        })
    }

    async fn try_acquire_lease(
        &self,
        name: &str,
        holder: &str,
        ttl_secs: i64,
    ) -> Result<LeaseOutcome> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO ingest_leases (name, holder, acquired_at) VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                holder = excluded.holder,
                acquired_at = excluded.acquired_at
            WHERE ingest_leases.holder = excluded.holder OR ingest_leases.acquired_at <= ?
            "#,
        )
        .bind(name)
        .bind(holder)
        .bind(now)
        .bind(now - ttl_secs)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(LeaseOutcome::Acquired);
        }

        let current: Option<String> =
            sqlx::query_scalar("SELECT holder FROM ingest_leases WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(LeaseOutcome::Held {
            holder: current.unwrap_or_default(),
        })
    }

    async fn release_lease(&self, name: &str, holder: &str) -> Result<()> {
        sqlx::query("DELETE FROM ingest_leases WHERE name = ? AND holder = ?")
            .bind(name)
            .bind(holder)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use article_harness_core::models::RawRecord;
    use article_harness_core::normalize::normalize;
    use serde_json::json;
    use tempfile::TempDir;

    async fn store() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::connect_path(&tmp.path().join("data/articles.sqlite"))
            .await
            .unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        (tmp, SqliteStore::new(pool))
    }

    fn record(uri: &str, headline: &str) -> CanonicalRecord {
        normalize(&RawRecord(json!({
            "uri": uri,
            "headline": { "main": headline },
            "byline": { "original": "By Someone" },
            "pub_date": "2024-01-15T05:00:08+0000",
            "section_name": "World",
            "word_count": 640,
            "print_page": "A1"
        })))
        .unwrap()
    }

    #[tokio::test]
    async fn round_trips_a_record() {
        let (_tmp, store) = store().await;
        let rec = record("nyt://article/1", "Hello");
        store.upsert(Collection::Archive, &rec).await.unwrap();

        let loaded = store
            .find_by_uri(Collection::Archive, "nyt://article/1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, rec);
        assert!(store.contains(Collection::Archive, "nyt://article/1").await.unwrap());
        assert!(!store.contains(Collection::Search, "nyt://article/1").await.unwrap());
    }

    #[tokio::test]
    async fn fractional_publication_time_survives_round_trip() {
        let (_tmp, store) = store().await;
        let rec = normalize(&RawRecord(json!({
            "uri": "nyt://article/ms",
            "pub_date": "2024-01-15T05:00:08.250+0000"
        })))
        .unwrap();
        assert_eq!(rec.published_date.unwrap().timestamp_subsec_millis(), 250);

        store.upsert(Collection::Archive, &rec).await.unwrap();
        let loaded = store
            .find_by_uri(Collection::Archive, "nyt://article/ms")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, rec);
        assert_eq!(
            store.upsert(Collection::Archive, &loaded).await.unwrap(),
            UpsertOutcome::Unchanged
        );
    }

    #[tokio::test]
    async fn upsert_outcomes_and_single_row_per_uri() {
        let (_tmp, store) = store().await;
        let v1 = record("A", "first");
        assert_eq!(
            store.upsert(Collection::Archive, &v1).await.unwrap(),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            store.upsert(Collection::Archive, &v1).await.unwrap(),
            UpsertOutcome::Unchanged
        );
        let v2 = record("A", "second");
        assert_eq!(
            store.upsert(Collection::Archive, &v2).await.unwrap(),
            UpsertOutcome::Updated
        );

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM archive_articles")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
        let loaded = store.find_by_uri(Collection::Archive, "A").await.unwrap().unwrap();
        assert_eq!(loaded.headline.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn sequence_change_counts_as_update() {
        let (_tmp, store) = store().await;
        let mut rec = record("A", "same");
        rec.sequence_id = Some(0);
        store.upsert(Collection::Search, &rec).await.unwrap();
        rec.sequence_id = Some(3);
        assert_eq!(
            store.upsert(Collection::Search, &rec).await.unwrap(),
            UpsertOutcome::Updated
        );
        assert_eq!(store.max_sequence_id(Collection::Search).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn stats_on_empty_and_filled_collections() {
        let (_tmp, store) = store().await;
        let empty = store.stats(Collection::Search).await.unwrap();
        assert_eq!(empty, CollectionStats::default());
        assert_eq!(store.max_sequence_id(Collection::Search).await.unwrap(), None);

        store.upsert(Collection::Archive, &record("A", "a")).await.unwrap();
        let mut later = record("B", "b");
        later.published_date = Some(DateTime::from_timestamp(1_710_000_000, 0).unwrap());
        store.upsert(Collection::Archive, &later).await.unwrap();

        let stats = store.stats(Collection::Archive).await.unwrap();
        assert_eq!(stats.records, 2);
        assert!(stats.oldest_published < stats.newest_published);
        assert_eq!(stats.max_sequence_id, None);
    }

    #[tokio::test]
    async fn concurrent_upserts_of_distinct_uris() {
        let (_tmp, store) = store().await;
        let store = std::sync::Arc::new(store);
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .upsert(Collection::Archive, &record(&format!("uri-{i}"), "h"))
                    .await
                    .unwrap()
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), UpsertOutcome::Inserted);
        }
        assert_eq!(store.stats(Collection::Archive).await.unwrap().records, 8);
    }

    #[tokio::test]
    async fn leases_serialize_holders() {
        let (_tmp, store) = store().await;
        assert_eq!(
            store.try_acquire_lease("search", "run-1", 3600).await.unwrap(),
            LeaseOutcome::Acquired
        );
        // Re-entrant for the same holder
        assert_eq!(
            store.try_acquire_lease("search", "run-1", 3600).await.unwrap(),
            LeaseOutcome::Acquired
        );
        assert_eq!(
            store.try_acquire_lease("search", "run-2", 3600).await.unwrap(),
            LeaseOutcome::Held {
                holder: "run-1".into()
            }
        );
        store.release_lease("search", "run-1").await.unwrap();
        assert_eq!(
            store.try_acquire_lease("search", "run-2", 3600).await.unwrap(),
            LeaseOutcome::Acquired
        );
        // A lease older than the ttl is taken over
        assert_eq!(
            store.try_acquire_lease("search", "run-3", 0).await.unwrap(),
            LeaseOutcome::Acquired
        );
    }
}
