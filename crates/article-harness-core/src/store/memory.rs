//! In-memory [`ArticleStore`] implementation for tests.
//!
//! Uses `HashMap`s behind `std::sync::RwLock`. Semantics match the SQLite
//! store: one record per `(collection, uri)`, hash-based no-op detection,
//! and leases with a time-to-live.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{CanonicalRecord, Collection, UpsertOutcome};

use super::{ArticleStore, CollectionStats, LeaseOutcome};

struct Lease {
    holder: String,
    acquired_at: i64,
}

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<(Collection, String), CanonicalRecord>>,
    leases: RwLock<HashMap<String, Lease>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records of a collection, sorted by `uri`.
    pub fn snapshot(&self, collection: Collection) -> Vec<CanonicalRecord> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<CanonicalRecord> = records
            .iter()
            .filter(|((c, _), _)| *c == collection)
            .map(|(_, r)| r.clone())
            .collect();
        out.sort_by(|a, b| a.uri.cmp(&b.uri));
        out
    }

    pub fn len(&self, collection: Collection) -> usize {
        self.snapshot(collection).len()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl ArticleStore for InMemoryStore {
    async fn find_by_uri(
        &self,
        collection: Collection,
        uri: &str,
    ) -> Result<Option<CanonicalRecord>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.get(&(collection, uri.to_string())).cloned())
    }

    async fn max_sequence_id(&self, collection: Collection) -> Result<Option<i64>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records
            .iter()
            .filter(|((c, _), _)| *c == collection)
            .filter_map(|(_, r)| r.sequence_id)
            .max())
    }

    async fn upsert(
        &self,
        collection: Collection,
        record: &CanonicalRecord,
    ) -> Result<UpsertOutcome> {
        let mut records = self.records.write().map_err(poisoned)?;
        let key = (collection, record.uri.clone());
        let outcome = match records.get(&key) {
            None => UpsertOutcome::Inserted,
            Some(existing)
                if existing.content_hash == record.content_hash
                    && existing.sequence_id == record.sequence_id =>
            {
                return Ok(UpsertOutcome::Unchanged);
            }
            Some(_) => UpsertOutcome::Updated,
        };
        records.insert(key, record.clone());
        Ok(outcome)
    }

    async fn stats(&self, collection: Collection) -> Result<CollectionStats> {
        let records = self.records.read().map_err(poisoned)?;
        let mut stats = CollectionStats::default();
        for r in records
            .iter()
            .filter(|((c, _), _)| *c == collection)
            .map(|(_, r)| r)
        {
            stats.records += 1;
            if let Some(d) = r.published_date {
                stats.oldest_published = Some(stats.oldest_published.map_or(d, |o| o.min(d)));
                stats.newest_published = Some(stats.newest_published.map_or(d, |n| n.max(d)));
            }
            if let Some(s) = r.sequence_id {
                stats.max_sequence_id = Some(stats.max_sequence_id.map_or(s, |m| m.max(s)));
            }
        }
        Ok(stats)
    }

    async fn try_acquire_lease(
        &self,
        name: &str,
        holder: &str,
        ttl_secs: i64,
    ) -> Result<LeaseOutcome> {
        let now = chrono::Utc::now().timestamp();
        let mut leases = self.leases.write().map_err(poisoned)?;
        if let Some(existing) = leases.get(name) {
            if existing.holder != holder && existing.acquired_at > now - ttl_secs {
                return Ok(LeaseOutcome::Held {
                    holder: existing.holder.clone(),
                });
            }
        }
        leases.insert(
            name.to_string(),
            Lease {
                holder: holder.to_string(),
                acquired_at: now,
            },
        );
        Ok(LeaseOutcome::Acquired)
    }

    async fn release_lease(&self, name: &str, holder: &str) -> Result<()> {
        let mut leases = self.leases.write().map_err(poisoned)?;
        if leases.get(name).is_some_and(|l| l.holder == holder) {
            leases.remove(name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawRecord;
    use crate::normalize::normalize;
    use serde_json::json;

    fn record(uri: &str, headline: &str) -> CanonicalRecord {
        normalize(&RawRecord(json!({ "uri": uri, "headline": { "main": headline } }))).unwrap()
    }

    #[tokio::test]
    async fn upsert_keeps_one_record_per_uri() {
        let store = InMemoryStore::new();
        assert_eq!(
            store.upsert(Collection::Archive, &record("A", "v1")).await.unwrap(),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            store.upsert(Collection::Archive, &record("A", "v1")).await.unwrap(),
            UpsertOutcome::Unchanged
        );
        assert_eq!(
            store.upsert(Collection::Archive, &record("A", "v2")).await.unwrap(),
            UpsertOutcome::Updated
        );
        assert_eq!(store.len(Collection::Archive), 1);
        let stored = store.find_by_uri(Collection::Archive, "A").await.unwrap().unwrap();
        assert_eq!(stored.headline.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn collections_are_independent() {
        let store = InMemoryStore::new();
        store.upsert(Collection::Archive, &record("A", "x")).await.unwrap();
        assert!(store.contains(Collection::Archive, "A").await.unwrap());
        assert!(!store.contains(Collection::Search, "A").await.unwrap());
    }

    #[tokio::test]
    async fn max_sequence_id_tracks_search_records() {
        let store = InMemoryStore::new();
        assert_eq!(store.max_sequence_id(Collection::Search).await.unwrap(), None);
        for (i, uri) in ["A", "B", "C"].iter().enumerate() {
            let mut r = record(uri, "h");
            r.sequence_id = Some(i as i64 + 5);
            store.upsert(Collection::Search, &r).await.unwrap();
        }
        assert_eq!(store.max_sequence_id(Collection::Search).await.unwrap(), Some(7));
        assert_eq!(store.stats(Collection::Search).await.unwrap().records, 3);
    }

    #[tokio::test]
    async fn lease_blocks_second_holder_until_released() {
        let store = InMemoryStore::new();
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
        store.release_lease("search", "run-2").await.unwrap();
        assert!(matches!(
            store.try_acquire_lease("search", "run-2", 3600).await.unwrap(),
            LeaseOutcome::Held { .. }
        ));
        store.release_lease("search", "run-1").await.unwrap();
        assert_eq!(
            store.try_acquire_lease("search", "run-2", 3600).await.unwrap(),
            LeaseOutcome::Acquired
        );
    }

    #[tokio::test]
    async fn expired_lease_can_be_taken_over() {
        let store = InMemoryStore::new();
        store.try_acquire_lease("search", "crashed", 0).await.unwrap();
        assert_eq!(
            store.try_acquire_lease("search", "fresh", 0).await.unwrap(),
            LeaseOutcome::Acquired
        );
    }
}
