//! Archive-mode month walking and the early-stop heuristic.
//!
//! A [`RangeWalker`] turns a lookback request into the ordered list of months
//! to fetch, oldest first:
//!
//! ```text
//! anchor = today − month_offset
//! (anchor.year − years, anchor.month) ..= anchor
//! ```
//!
//! Both bounds are clamped to [`EARLIEST_MONTH`].
//!
//! In latest mode the lower bound and the offset are ignored and only the
//! `n` months ending at the current month are walked. "Today" is whatever
//! date the caller passes in; the CLI passes the current UTC date.

use chrono::{Datelike, NaiveDate};

use crate::models::{FetchUnit, YearMonth};

/// The first month the upstream archive covers. Windows reaching further
/// back are clamped here.
pub const EARLIEST_MONTH: YearMonth = YearMonth {
    year: 1851,
    month: 9,
};

/// How far back an archive run should reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveWindow {
    Lookback { years: u32, month_offset: u32 },
    Latest { months: u32 },
}

impl Default for ArchiveWindow {
    fn default() -> Self {
        ArchiveWindow::Lookback {
            years: 5,
            month_offset: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RangeWalker {
    current: YearMonth,
    first: YearMonth,
    last: YearMonth,
}

impl RangeWalker {
    pub fn new(window: ArchiveWindow, today: NaiveDate) -> Self {
        let current = YearMonth::new(today.year(), today.month());
        let floor = EARLIEST_MONTH.ordinal();
        // Ordinals stay in i64 until clamped so no window can wrap the i32 year.
        let (first, last) = match window {
            ArchiveWindow::Lookback {
                years,
                month_offset,
            } => {
                let anchor = (current.ordinal() - month_offset as i64).max(floor);
                let first = (anchor - years as i64 * 12).max(floor);
                (first, anchor)
            }
            ArchiveWindow::Latest { months } => {
                let span = months.max(1) as i64;
                ((current.ordinal() + 1 - span).max(floor), current.ordinal())
            }
        };
        let (first, last) = (YearMonth::from_ordinal(first), YearMonth::from_ordinal(last));
        Self {
            current,
            first,
            last,
        }
    }

    /// The calendar month containing "today".
    pub fn current_month(&self) -> YearMonth {
        self.current
    }

    pub fn first(&self) -> YearMonth {
        self.first
    }

    pub fn last(&self) -> YearMonth {
        self.last
    }

    pub fn len(&self) -> usize {
        (self.last.ordinal() - self.first.ordinal() + 1).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn months(&self) -> impl Iterator<Item = YearMonth> + '_ {
        let first = self.first.ordinal();
        (0..self.len() as i64).map(move |i| YearMonth::from_ordinal(first + i))
    }

    pub fn units(&self) -> Vec<FetchUnit> {
        self.months().map(FetchUnit::Month).collect()
    }

    /// Early-stop policy anchored at this walker's current month.
    pub fn early_stop(&self, enabled: bool) -> EarlyStopPolicy {
        EarlyStopPolicy {
            current: self.current,
            enabled,
        }
    }
}

/// Decides when the rest of an archive month can be skipped.
///
/// Once a record that is already stored shows up in a fully elapsed month,
/// the remainder of that month is assumed to be stored too. This is an
/// optimization only; turning it off just costs extra idempotent writes.
#[derive(Debug, Clone, Copy)]
pub struct EarlyStopPolicy {
    current: YearMonth,
    enabled: bool,
}

impl EarlyStopPolicy {
    pub fn disabled() -> Self {
        Self {
            current: YearMonth::new(0, 1),
            enabled: false,
        }
    }

    /// Whether existence checks are worth running for this month at all.
    pub fn applies_to(&self, month: YearMonth) -> bool {
        self.enabled && month < self.current
    }

    pub fn should_stop(&self, month: YearMonth, already_stored: bool) -> bool {
        already_stored && self.applies_to(month)
    }
}
