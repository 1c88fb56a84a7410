//! Storage abstraction for Article Harness.
//!
//! The [`ArticleStore`] trait is the only view of persistence the ingestion
//! core has. Each [`Collection`] behaves as a set keyed by `uri`; the store is
//! also the checkpoint, since the maximum `sequence_id` and the presence of a
//! `uri` are all a run needs to resume.
//!
//! Implementations must be `Send + Sync` and safe to call concurrently for
//! distinct keys.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{CanonicalRecord, Collection, UpsertOutcome};

/// Summary of one collection, used by `stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectionStats {
    pub records: u64,
    pub oldest_published: Option<DateTime<Utc>>,
    pub newest_published: Option<DateTime<Utc>>,
    pub max_sequence_id: Option<i64>,
}

/// Result of a lease request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseOutcome {
    Acquired,
    /// Another holder has a live lease.
    Held { holder: String },
}

/// Abstract article store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`find_by_uri`](ArticleStore::find_by_uri) | look up a record by natural key |
/// | [`max_sequence_id`](ArticleStore::max_sequence_id) | search-mode checkpoint |
/// | [`upsert`](ArticleStore::upsert) | insert or replace by `uri` |
/// | [`stats`](ArticleStore::stats) | counts and date bounds |
/// | [`try_acquire_lease`](ArticleStore::try_acquire_lease) | serialize runs of one mode |
#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn find_by_uri(
        &self,
        collection: Collection,
        uri: &str,
    ) -> Result<Option<CanonicalRecord>>;

    async fn contains(&self, collection: Collection, uri: &str) -> Result<bool> {
        Ok(self.find_by_uri(collection, uri).await?.is_some())
    }

    async fn max_sequence_id(&self, collection: Collection) -> Result<Option<i64>>;

    /// Insert if absent, otherwise replace every field (last write wins).
    ///
    /// Returns [`UpsertOutcome::Unchanged`] without writing when the stored
    /// record has the same content hash and sequence id.
    async fn upsert(
        &self,
        collection: Collection,
        record: &CanonicalRecord,
    ) -> Result<UpsertOutcome>;

    async fn stats(&self, collection: Collection) -> Result<CollectionStats>;

    /// Take the named lease unless someone else holds one younger than `ttl_secs`.
    async fn try_acquire_lease(
        &self,
        name: &str,
        holder: &str,
        ttl_secs: i64,
    ) -> Result<LeaseOutcome>;

    /// Release the lease if `holder` still owns it.
    async fn release_lease(&self, name: &str, holder: &str) -> Result<()>;
}
