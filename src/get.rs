//! Record retrieval by `uri`.
//!
//! Looks a record up in one collection, or in every collection when none is
//! given, and prints it as pretty JSON.

use anyhow::{bail, Result};

use article_harness_core::models::{CanonicalRecord, Collection};
use article_harness_core::store::ArticleStore;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

/// First match for `uri`, searching `collection` or all collections in order.
pub async fn find_record(
    store: &dyn ArticleStore,
    uri: &str,
    collection: Option<Collection>,
) -> Result<Option<(Collection, CanonicalRecord)>> {
    let candidates: Vec<Collection> = match collection {
        Some(c) => vec![c],
        None => Collection::all().to_vec(),
    };
    for c in candidates {
        if let Some(record) = store.find_by_uri(c, uri).await? {
            return Ok(Some((c, record)));
        }
    }
    Ok(None)
}

/// `ah get`: print one stored record.
pub async fn run_get(config: &Config, uri: &str, collection: Option<Collection>) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let store = SqliteStore::new(pool);
    let found = find_record(&store, uri, collection).await;
    store.pool().close().await;

    match found? {
        Some((collection, record)) => {
            let mut value = serde_json::to_value(&record)?;
            if let Some(obj) = value.as_object_mut() {
                obj.insert("collection".into(), collection.as_str().into());
            }
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        None => bail!("record not found: {}", uri),
    }
}
