//! Per-unit progress reporting for ingestion runs.
//!
//! Progress goes to **stderr** so stdout stays parseable for scripts; the
//! final run report is the only thing `archive` and `search` print on stdout.

use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    /// Unit `n` of `total` is about to be fetched.
    UnitStarted {
        mode: &'static str,
        n: u64,
        total: u64,
        unit: String,
    },
    /// Unit finished; counts are for this unit only.
    UnitFinished {
        mode: &'static str,
        unit: String,
        written: u64,
        unchanged: u64,
        dropped: u64,
        early_stop: bool,
    },
    /// Unit exhausted its retries. `skipped` is false when the run aborts.
    UnitFailed {
        mode: &'static str,
        unit: String,
        error: String,
        skipped: bool,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "archive  month 3 / 25  (2022-05)".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::UnitStarted {
                mode,
                n,
                total,
                unit,
            } => format!(
                "{}  processing {} / {}  ({})\n",
                mode,
                format_number(*n),
                format_number(*total),
                unit
            ),
            ProgressEvent::UnitFinished {
                mode,
                unit,
                written,
                unchanged,
                dropped,
                early_stop,
            } => format!(
                "{}  {}  written {}, unchanged {}, dropped {}{}\n",
                mode,
                unit,
                format_number(*written),
                format_number(*unchanged),
                format_number(*dropped),
                if *early_stop { "  (early stop)" } else { "" }
            ),
            ProgressEvent::UnitFailed {
                mode,
                unit,
                error,
                skipped,
            } => format!(
                "{}  {}  FAILED ({}): {}\n",
                mode,
                unit,
                if *skipped { "skipping" } else { "aborting" },
                error
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::UnitStarted {
                mode,
                n,
                total,
                unit,
            } => serde_json::json!({
                "event": "unit_started",
                "mode": mode,
                "n": n,
                "total": total,
                "unit": unit
            }),
            ProgressEvent::UnitFinished {
                mode,
                unit,
                written,
                unchanged,
                dropped,
                early_stop,
            } => serde_json::json!({
                "event": "unit_finished",
                "mode": mode,
                "unit": unit,
                "written": written,
                "unchanged": unchanged,
                "dropped": dropped,
                "early_stop": early_stop
            }),
            ProgressEvent::UnitFailed {
                mode,
                unit,
                error,
                skipped,
            } => serde_json::json!({
                "event": "unit_failed",
                "mode": mode,
                "unit": unit,
                "error": error,
                "skipped": skipped
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// Progress mode for the CLI.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(61_234), "61,234");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
