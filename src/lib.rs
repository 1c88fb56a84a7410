//! # Article Harness
//!
//! Incremental, idempotent ingestion of articles from a rate-limited,
//! paginated content API into a local SQLite store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌─────────────┐   ┌──────────┐
//! │ RangeWalker  │──▶│ RetryPolicy  │──▶│ normalize   │──▶│  SQLite  │
//! │ PageWalker   │   │ RateLimited  │   │ (core)      │   │  upsert  │
//! └──────────────┘   │ Client       │   └─────────────┘   └──────────┘
//!                    └──────────────┘
//! ```
//!
//! Archive mode walks calendar months, search mode walks result pages and
//! numbers what it writes. The store doubles as the checkpoint: a rerun
//! resumes from `max(sequence_id)` and from whichever `uri`s are present.
//!
//! ## Quick Start
//!
//! ```bash
//! export NYTIMES_API_KEY=...
//! ah init
//! ah archive 2          # two years back to this month
//! ah archive --latest   # just this month
//! ah search 5           # first five result pages
//! ah stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`client`] | Rate-limited HTTP fetcher |
//! | [`retry`] | Bounded retry per fetch unit |
//! | [`ingest`] | Ingestion driver and CLI entry points |
//! | [`sqlite_store`] | SQLite-backed store |
//! | [`progress`] | Per-unit progress reporting |
//! | [`get`] | Record lookup |
//! | [`stats`] | Store overview |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod client;
pub mod config;
pub mod db;
pub mod get;
pub mod ingest;
pub mod migrate;
pub mod progress;
pub mod retry;
pub mod sqlite_store;
pub mod stats;

#[cfg(test)]
mod testing;
