//! Bounded retry around a single fetch unit.
//!
//! Retryable failures (malformed bodies, connection-level errors) are tried
//! again after a delay, up to `max_attempts` calls in total. An HTTP error
//! status ends the unit immediately. Either way the caller gets
//! [`IngestError::UnitFailed`] carrying the unit, the attempt count, and the
//! last error. A unit is never revisited once the run has moved on.

use article_harness_core::error::IngestError;
use article_harness_core::fetch::ArticleFetcher;
use article_harness_core::models::{FetchUnit, RawRecord};

use crate::client::Delay;
use crate::config::RetryConfig;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Delay,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Delay) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.delay().to_delay())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn fetch(
        &self,
        fetcher: &dyn ArticleFetcher,
        unit: &FetchUnit,
    ) -> Result<Vec<RawRecord>, IngestError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match fetcher.fetch(unit).await {
                Ok(records) => return Ok(records),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    tracing::warn!(
                        %unit,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "fetch failed, retrying"
                    );
                    self.delay.wait().await;
                }
                Err(err) => {
                    return Err(IngestError::UnitFailed {
                        unit: *unit,
                        attempts: attempt,
                        last_error: err,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedFetcher;
    use article_harness_core::error::FetchError;
    use article_harness_core::models::YearMonth;

    fn unit() -> FetchUnit {
        FetchUnit::Month(YearMonth::new(2024, 1))
    }

    #[tokio::test]
    async fn always_malformed_exhausts_exactly_max_attempts() {
        let fetcher = ScriptedFetcher::always(FetchError::Malformed("unexpected EOF".into()));
        let policy = RetryPolicy::new(5, Delay::none());

        let err = policy.fetch(&fetcher, &unit()).await.unwrap_err();
        assert_eq!(fetcher.calls(), 5);
        match err {
            IngestError::UnitFailed {
                unit: u,
                attempts,
                last_error,
            } => {
                assert_eq!(u, unit());
                assert_eq!(attempts, 5);
                assert!(matches!(last_error, FetchError::Malformed(_)));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn http_status_is_not_retried() {
        let fetcher = ScriptedFetcher::always(FetchError::transport(Some(401), "unauthorized"));
        let policy = RetryPolicy::new(5, Delay::none());

        let err = policy.fetch(&fetcher, &unit()).await.unwrap_err();
        assert_eq!(fetcher.calls(), 1);
        assert!(matches!(err, IngestError::UnitFailed { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let fetcher = ScriptedFetcher::default();
        fetcher.push(unit(), Err(FetchError::Malformed("truncated".into())));
        fetcher.push(unit(), Err(FetchError::transport(None, "connection reset")));
        fetcher.push(unit(), Ok(vec![serde_json::json!({ "uri": "A" })]));
        let policy = RetryPolicy::new(5, Delay::none());

        let records = policy.fetch(&fetcher, &unit()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let fetcher = ScriptedFetcher::always(FetchError::Malformed("x".into()));
        let policy = RetryPolicy::new(0, Delay::none());
        assert_eq!(policy.max_attempts(), 1);
        assert!(policy.fetch(&fetcher, &unit()).await.is_err());
        assert_eq!(fetcher.calls(), 1);
    }
}
