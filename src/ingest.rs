//! Ingestion driver.
//!
//! Wires the walkers, the retrying fetcher, the normalizer and the store into
//! one run. Everything a run needs travels in an [`IngestionDriver`] built
//! once per command; there is no process-wide state.
//!
//! Per unit the driver:
//! 1. checks the [`CancelFlag`] (cancellation never interrupts a unit),
//! 2. fetches the unit through the [`RetryPolicy`],
//! 3. normalizes each raw record, dropping the ones without a `uri`,
//! 4. upserts the rest, applying early stop (archive) or sequence ids (search).
//!
//! A unit that exhausts its retries either aborts the run or is skipped,
//! depending on [`UnitFailurePolicy`]. Store failures always end the run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::Instrument;
use uuid::Uuid;

use article_harness_core::error::IngestError;
use article_harness_core::fetch::ArticleFetcher;
use article_harness_core::models::{
    CanonicalRecord, Collection, FetchUnit, RawRecord, UpsertOutcome,
};
use article_harness_core::normalize::normalize;
use article_harness_core::pages::PageWalker;
use article_harness_core::range::{ArchiveWindow, EarlyStopPolicy, RangeWalker};
use article_harness_core::store::{ArticleStore, LeaseOutcome};

use crate::client::RateLimitedClient;
use crate::config::{Config, UnitFailurePolicy};
use crate::db;
use crate::migrate;
use crate::progress::{ProgressEvent, ProgressMode, ProgressReporter};
use crate::retry::RetryPolicy;
use crate::sqlite_store::SqliteStore;

/// Lease name serializing search-mode runs.
pub const SEARCH_LEASE: &str = "search";

/// Shared stop request, checked between units.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Set the flag on Ctrl-C.
    pub fn cancel_on_ctrl_c(&self) {
        let flag = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping after the current unit");
                flag.cancel();
            }
        });
    }
}

/// Totals for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub units_total: u64,
    pub units_processed: u64,
    pub units_failed: u64,
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub dropped: u64,
    pub early_stops: u64,
    pub cancelled: bool,
}

impl RunReport {
    pub fn written(&self) -> u64 {
        self.inserted + self.updated
    }

    /// `key: value` lines for stdout, terminated by `ok`.
    pub fn render(&self, title: &str) -> String {
        let mut out = format!("{}\n", title);
        out.push_str(&format!(
            "  units processed: {} / {}\n",
            self.units_processed, self.units_total
        ));
        if self.units_failed > 0 {
            out.push_str(&format!("  units failed: {}\n", self.units_failed));
        }
        out.push_str(&format!("  inserted: {}\n", self.inserted));
        out.push_str(&format!("  updated: {}\n", self.updated));
        out.push_str(&format!("  unchanged: {}\n", self.unchanged));
        out.push_str(&format!("  dropped: {}\n", self.dropped));
        if self.early_stops > 0 {
            out.push_str(&format!("  early stops: {}\n", self.early_stops));
        }
        if self.cancelled {
            out.push_str("  cancelled: true\n");
        }
        out.push_str("ok");
        out
    }

    fn absorb(&mut self, unit: &UnitCounts) {
        self.units_processed += 1;
        self.inserted += unit.inserted;
        self.updated += unit.updated;
        self.unchanged += unit.unchanged;
        self.dropped += unit.dropped;
        if unit.early_stop {
            self.early_stops += 1;
        }
    }
}

#[derive(Debug, Default)]
struct UnitCounts {
    inserted: u64,
    updated: u64,
    unchanged: u64,
    dropped: u64,
    early_stop: bool,
}

impl UnitCounts {
    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    fn finished(&self, mode: &'static str, unit: &FetchUnit) -> ProgressEvent {
        ProgressEvent::UnitFinished {
            mode,
            unit: unit.to_string(),
            written: self.inserted + self.updated,
            unchanged: self.unchanged,
            dropped: self.dropped,
            early_stop: self.early_stop,
        }
    }
}

pub struct IngestionDriver<'a> {
    pub store: &'a dyn ArticleStore,
    pub fetcher: &'a dyn ArticleFetcher,
    pub retry: RetryPolicy,
    pub progress: &'a dyn ProgressReporter,
    pub cancel: CancelFlag,
    pub on_unit_failure: UnitFailurePolicy,
}

impl<'a> IngestionDriver<'a> {
    /// Walk the archive months of `walker`, oldest first.
    pub async fn run_archive(
        &self,
        walker: &RangeWalker,
        early_stop: EarlyStopPolicy,
    ) -> Result<RunReport, IngestError> {
        let span = tracing::info_span!("ingest", mode = "archive", run_id = %Uuid::new_v4());
        self.archive_months(walker, early_stop)
            .instrument(span)
            .await
    }

    async fn archive_months(
        &self,
        walker: &RangeWalker,
        early_stop: EarlyStopPolicy,
    ) -> Result<RunReport, IngestError> {
        let mut report = RunReport {
            units_total: walker.len() as u64,
            ..RunReport::default()
        };
        tracing::info!(first = %walker.first(), last = %walker.last(), "archive run started");

        for (i, month) in walker.months().enumerate() {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let unit = FetchUnit::Month(month);
            self.progress.report(ProgressEvent::UnitStarted {
                mode: "archive",
                n: i as u64 + 1,
                total: report.units_total,
                unit: unit.to_string(),
            });

            let Some(records) = self.fetch_unit("archive", &unit, &mut report).await? else {
                continue;
            };

            let mut counts = UnitCounts::default();
            let check_existing = early_stop.applies_to(month);
            for raw in &records {
                let Some(record) = normalize_or_drop(raw, &unit, &mut counts) else {
                    continue;
                };
                if check_existing {
                    let stored = self.store.contains(Collection::Archive, &record.uri).await?;
                    if early_stop.should_stop(month, stored) {
                        tracing::debug!(%unit, uri = %record.uri, "known record in past month, stopping early");
                        counts.early_stop = true;
                        break;
                    }
                }
                let outcome = self.store.upsert(Collection::Archive, &record).await?;
                counts.record(outcome);
            }

            tracing::debug!(%unit, ?counts, "unit done");
            self.progress.report(counts.finished("archive", &unit));
            report.absorb(&counts);
        }

        Ok(report)
    }

    /// Walk search pages `0..pages`, numbering written records.
    ///
    /// Holds the [`SEARCH_LEASE`] for the whole run so concurrent search runs
    /// cannot hand out the same sequence ids.
    pub async fn run_search(&self, pages: u32, lease_ttl_secs: i64) -> Result<RunReport, IngestError> {
        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("ingest", mode = "search", run_id = %run_id);
        self.search_leased(&run_id, pages, lease_ttl_secs)
            .instrument(span)
            .await
    }

    async fn search_leased(
        &self,
        run_id: &str,
        pages: u32,
        lease_ttl_secs: i64,
    ) -> Result<RunReport, IngestError> {
        match self
            .store
            .try_acquire_lease(SEARCH_LEASE, run_id, lease_ttl_secs)
            .await?
        {
            LeaseOutcome::Acquired => {}
            LeaseOutcome::Held { holder } => {
                return Err(IngestError::LeaseHeld {
                    name: SEARCH_LEASE.to_string(),
                    holder,
                })
            }
        }

        let result = self.search_pages(pages).await;

        if let Err(e) = self.store.release_lease(SEARCH_LEASE, run_id).await {
            tracing::warn!(error = %e, "failed to release search lease");
        }
        result
    }

    async fn search_pages(&self, pages: u32) -> Result<RunReport, IngestError> {
        let max_seq = self.store.max_sequence_id(Collection::Search).await?;
        let mut walker = PageWalker::new(pages, max_seq);
        let mut report = RunReport {
            units_total: pages as u64,
            ..RunReport::default()
        };
        tracing::info!(pages, next_sequence = walker.peek_sequence(), "search run started");

        for (i, unit) in walker.units().into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            self.progress.report(ProgressEvent::UnitStarted {
                mode: "search",
                n: i as u64 + 1,
                total: report.units_total,
                unit: unit.to_string(),
            });

            let Some(records) = self.fetch_unit("search", &unit, &mut report).await? else {
                continue;
            };

            let mut counts = UnitCounts::default();
            for raw in &records {
                let Some(record) = normalize_or_drop(raw, &unit, &mut counts) else {
                    continue;
                };
                let store = self.store;
                let outcome = walker
                    .assign(|seq| async move {
                        let record = CanonicalRecord {
                            sequence_id: Some(seq),
                            ..record
                        };
                        store.upsert(Collection::Search, &record).await
                    })
                    .await?;
                counts.record(outcome);
            }

            tracing::debug!(%unit, ?counts, "unit done");
            self.progress.report(counts.finished("search", &unit));
            report.absorb(&counts);
        }

        Ok(report)
    }

    /// Fetch with retry. `Ok(None)` means the unit failed and was skipped.
    async fn fetch_unit(
        &self,
        mode: &'static str,
        unit: &FetchUnit,
        report: &mut RunReport,
    ) -> Result<Option<Vec<RawRecord>>, IngestError> {
        match self.retry.fetch(self.fetcher, unit).await {
            Ok(records) => Ok(Some(records)),
            Err(err @ IngestError::UnitFailed { .. }) => {
                let skipped = self.on_unit_failure == UnitFailurePolicy::Skip;
                self.progress.report(ProgressEvent::UnitFailed {
                    mode,
                    unit: unit.to_string(),
                    error: err.to_string(),
                    skipped,
                });
                report.units_failed += 1;
                if skipped {
                    tracing::warn!(%unit, error = %err, "unit failed, skipping");
                    Ok(None)
                } else {
                    tracing::error!(%unit, error = %err, "unit failed, aborting run");
                    Err(err)
                }
            }
            Err(other) => Err(other),
        }
    }
}

fn normalize_or_drop(
    raw: &RawRecord,
    unit: &FetchUnit,
    counts: &mut UnitCounts,
) -> Option<CanonicalRecord> {
    match normalize(raw) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(%unit, error = %e, "dropping record");
            counts.dropped += 1;
            None
        }
    }
}

/// Parse an optional positional count; anything that is not a
/// non-negative integer yields `None`.
pub fn parse_count(arg: Option<&str>) -> Option<u32> {
    arg.and_then(|s| s.trim().parse::<u32>().ok())
}

/// Resolve the archive window from CLI arguments and config defaults.
///
/// `args` are the raw `[years] [month_offset]` values. A `-l`/`--latest`
/// that clap left among them (it follows a positional) still selects latest
/// mode. Anything else that is not one or two non-negative integers falls
/// back to the default window with a notice.
pub fn archive_window(config: &Config, args: &[String], latest: Option<u32>) -> ArchiveWindow {
    if let Some(months) = latest {
        return ArchiveWindow::Latest { months };
    }
    if let Some(pos) = args.iter().position(|a| a == "-l" || a == "--latest") {
        let months = parse_count(args.get(pos + 1).map(String::as_str)).unwrap_or(1);
        return ArchiveWindow::Latest { months };
    }

    let default = ArchiveWindow::Lookback {
        years: config.archive.default_years,
        month_offset: config.archive.default_month_offset,
    };
    let parsed: Option<Vec<u32>> = args.iter().map(|a| parse_count(Some(a.as_str()))).collect();
    match parsed.as_deref() {
        Some([]) => default,
        Some([years]) => ArchiveWindow::Lookback {
            years: *years,
            month_offset: config.archive.default_month_offset,
        },
        Some([years, month_offset]) => ArchiveWindow::Lookback {
            years: *years,
            month_offset: *month_offset,
        },
        _ => {
            eprintln!(
                "unrecognized archive arguments '{}'; using the default window of {} year(s), offset {}",
                args.join(" "),
                config.archive.default_years,
                config.archive.default_month_offset
            );
            default
        }
    }
}

/// Resolve the search page count, printing a notice when falling back.
pub fn search_page_count(config: &Config, pages: Option<&str>) -> u32 {
    match (pages, parse_count(pages)) {
        (_, Some(n)) => n,
        (Some(raw), None) => {
            eprintln!(
                "'{}' is not a valid page count; using the default of {}",
                raw, config.search.default_pages
            );
            config.search.default_pages
        }
        (None, None) => config.search.default_pages,
    }
}

struct Runtime {
    store: SqliteStore,
    progress: Box<dyn ProgressReporter>,
    cancel: CancelFlag,
}

async fn prepare(config: &Config, progress: ProgressMode) -> Result<Runtime> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let cancel = CancelFlag::new();
    cancel.cancel_on_ctrl_c();
    Ok(Runtime {
        store: SqliteStore::new(pool),
        progress: progress.reporter(),
        cancel,
    })
}

fn client(config: &Config, base_url: &str, api_key: &str) -> Result<RateLimitedClient> {
    RateLimitedClient::new(
        base_url,
        api_key,
        config.rate_limit.to_delay(),
        Duration::from_secs(config.api.timeout_secs),
    )
}

/// `ah archive`: walk the configured window and print the run report.
pub async fn run_archive_command(
    config: &Config,
    window: ArchiveWindow,
    progress: ProgressMode,
) -> Result<()> {
    let api_key = config.require_api_key()?;
    let rt = prepare(config, progress).await?;
    let fetcher = client(config, &config.api.archive_base_url, api_key)?;

    let walker = RangeWalker::new(window, Utc::now().date_naive());
    let early_stop = walker.early_stop(config.archive.early_stop);
    let driver = IngestionDriver {
        store: &rt.store,
        fetcher: &fetcher,
        retry: RetryPolicy::from_config(&config.retry),
        progress: rt.progress.as_ref(),
        cancel: rt.cancel.clone(),
        on_unit_failure: config.archive.on_unit_failure,
    };

    let result = driver.run_archive(&walker, early_stop).await;
    rt.store.pool().close().await;
    let report = result?;

    println!(
        "{}",
        report.render(&format!("archive {}..{}", walker.first(), walker.last()))
    );
    Ok(())
}

/// `ah search`: walk `pages` result pages and print the run report.
pub async fn run_search_command(config: &Config, pages: u32, progress: ProgressMode) -> Result<()> {
    let api_key = config.require_api_key()?;
    let rt = prepare(config, progress).await?;
    let fetcher = client(config, &config.api.search_base_url, api_key)?;

    let driver = IngestionDriver {
        store: &rt.store,
        fetcher: &fetcher,
        retry: RetryPolicy::from_config(&config.retry),
        progress: rt.progress.as_ref(),
        cancel: rt.cancel.clone(),
        on_unit_failure: config.search.on_unit_failure,
    };

    let result = driver.run_search(pages, config.search.lease_ttl_secs).await;
    rt.store.pool().close().await;
    let report = result?;

    println!("{}", report.render(&format!("search {} page(s)", pages)));
    Ok(())
}
