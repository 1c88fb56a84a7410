//! Error taxonomy for ingestion.
//!
//! | Error | Scope | Handling |
//! |-------|-------|----------|
//! | [`FetchError::Transport`] | one request | retried only without an HTTP status |
//! | [`FetchError::Malformed`] | one request | retried |
//! | [`NormalizationError`] | one record | record dropped, unit continues |
//! | [`IngestError::UnitFailed`] | one unit | abort or skip, per mode |
//! | [`IngestError::StartupPrecondition`] | whole run | reported before any I/O |

use thiserror::Error;

use crate::models::FetchUnit;

/// Failure of a single upstream request.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Connection failure, timeout, or non-2xx status.
    #[error("transport error{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// The body did not parse into the `{ response: { docs: [...] } }` envelope.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl FetchError {
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        FetchError::Transport {
            status,
            message: message.into(),
        }
    }

    /// Whether another attempt at the same unit may succeed.
    ///
    /// An HTTP error status is an answer from upstream, not a hiccup.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Malformed(_) => true,
            FetchError::Transport { status, .. } => status.is_none(),
        }
    }
}

/// A raw record that cannot become a [`CanonicalRecord`](crate::models::CanonicalRecord).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("record has no uri")]
    MissingUri,
}

/// Run-level failures surfaced by the ingestion driver.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{unit} failed after {attempts} attempt(s): {last_error}")]
    UnitFailed {
        unit: FetchUnit,
        attempts: u32,
        last_error: FetchError,
    },

    #[error("{0}")]
    StartupPrecondition(String),

    #[error("lease '{name}' is held by another run ({holder})")]
    LeaseHeld { name: String, holder: String },

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}
