//! # Article Harness Core
//!
//! Runtime-free ingestion logic for Article Harness: the record model, the
//! error taxonomy, normalization, the archive and search walkers, and the
//! fetch and store traits.
//!
//! This crate contains no tokio, sqlx, or HTTP dependencies. The native
//! crate supplies the rate-limited client, the SQLite store, and the driver.

pub mod error;
pub mod fetch;
pub mod models;
pub mod normalize;
pub mod pages;
pub mod range;
pub mod store;
