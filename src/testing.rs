//! Test doubles shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use article_harness_core::error::FetchError;
use article_harness_core::fetch::ArticleFetcher;
use article_harness_core::models::{
    CanonicalRecord, Collection, FetchUnit, RawRecord, UpsertOutcome,
};
use article_harness_core::store::memory::InMemoryStore;
use article_harness_core::store::{ArticleStore, CollectionStats, LeaseOutcome};

type Scripted = Result<Vec<Value>, FetchError>;

/// Fetcher answering from per-unit scripts.
///
/// Lookup order: queued one-shot responses, then the unit's standing
/// response, then the fallback error, then an empty page.
#[derive(Default)]
pub struct ScriptedFetcher {
    queued: Mutex<HashMap<FetchUnit, VecDeque<Scripted>>>,
    standing: Mutex<HashMap<FetchUnit, Vec<Value>>>,
    fallback: Option<FetchError>,
    calls: AtomicU32,
    per_unit: Mutex<HashMap<FetchUnit, u32>>,
}

impl ScriptedFetcher {
    pub fn always(err: FetchError) -> Self {
        Self {
            fallback: Some(err),
            ..Self::default()
        }
    }

    pub fn push(&self, unit: FetchUnit, response: Scripted) {
        self.queued
            .lock()
            .unwrap()
            .entry(unit)
            .or_default()
            .push_back(response);
    }

    pub fn set(&self, unit: FetchUnit, docs: Vec<Value>) {
        self.standing.lock().unwrap().insert(unit, docs);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, unit: FetchUnit) -> u32 {
        self.per_unit.lock().unwrap().get(&unit).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ArticleFetcher for ScriptedFetcher {
    async fn fetch(&self, unit: &FetchUnit) -> Result<Vec<RawRecord>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.per_unit.lock().unwrap().entry(*unit).or_default() += 1;

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(unit)
            .and_then(|q| q.pop_front());
        let scripted = match queued {
            Some(s) => s,
            None => match self.standing.lock().unwrap().get(unit) {
                Some(docs) => Ok(docs.clone()),
                None => match &self.fallback {
                    Some(err) => Err(err.clone()),
                    None => Ok(Vec::new()),
                },
            },
        };
        scripted.map(|docs| docs.into_iter().map(RawRecord).collect())
    }
}

/// In-memory store that counts upserts and can be told to fail one `uri`.
#[derive(Default)]
pub struct CountingStore {
    pub inner: InMemoryStore,
    upserts: AtomicU32,
    fail_uri: Mutex<Option<String>>,
}

impl CountingStore {
    pub fn upserts(&self) -> u32 {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn fail_writes_for(&self, uri: Option<&str>) {
        *self.fail_uri.lock().unwrap() = uri.map(str::to_string);
    }
}

#[async_trait]
impl ArticleStore for CountingStore {
    async fn find_by_uri(
        &self,
        collection: Collection,
        uri: &str,
    ) -> Result<Option<CanonicalRecord>> {
        self.inner.find_by_uri(collection, uri).await
    }

    async fn max_sequence_id(&self, collection: Collection) -> Result<Option<i64>> {
        self.inner.max_sequence_id(collection).await
    }

    async fn upsert(
        &self,
        collection: Collection,
        record: &CanonicalRecord,
    ) -> Result<UpsertOutcome> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_uri.lock().unwrap().as_deref() == Some(record.uri.as_str()) {
            bail!("simulated write failure for {}", record.uri);
        }
        self.inner.upsert(collection, record).await
    }

    async fn stats(&self, collection: Collection) -> Result<CollectionStats> {
        self.inner.stats(collection).await
    }

    async fn try_acquire_lease(
        &self,
        name: &str,
        holder: &str,
        ttl_secs: i64,
    ) -> Result<LeaseOutcome> {
        self.inner.try_acquire_lease(name, holder, ttl_secs).await
    }

    async fn release_lease(&self, name: &str, holder: &str) -> Result<()> {
        self.inner.release_lease(name, holder).await
    }
}

/// `{ "uri": uri, "headline": { "main": ... }, ... }` in the upstream shape.
pub fn doc(uri: &str) -> Value {
    serde_json::json!({
        "uri": uri,
        "headline": { "main": format!("Headline {}", uri) },
        "byline": { "original": format!("By Author {}", uri) },
        "pub_date": "2024-01-15T05:00:00+0000",
        "section_name": "World",
        "word_count": 500,
        "multimedia": [{ "url": "image.jpg" }],
        "keywords": [{ "value": "news" }]
    })
}
