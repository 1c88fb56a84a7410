//! Rate-limited HTTP client for the upstream article API.
//!
//! Every request is followed by a delay, whether it succeeded or not, so two
//! back-to-back calls are always at least one delay apart. The delay is a
//! floor rather than a token bucket, matching the upstream per-minute quota.
//! A jittered delay is sampled uniformly from `[min, max]` for each request.
//!
//! Failures map onto [`FetchError`]:
//! - connection errors, timeouts, and non-2xx statuses → `Transport`
//! - a body that is not the `{ response: { docs } }` envelope → `Malformed`

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;

use article_harness_core::error::FetchError;
use article_harness_core::fetch::{ArticleFetcher, Envelope};
use article_harness_core::models::{FetchUnit, RawRecord};

/// Length of the error body kept in transport errors.
const BODY_PREVIEW_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Delay {
    Fixed(Duration),
    /// Uniform in `[min, max]`.
    Jittered { min: Duration, max: Duration },
}

impl Delay {
    pub fn none() -> Self {
        Delay::Fixed(Duration::ZERO)
    }

    pub fn sample(&self) -> Duration {
        match *self {
            Delay::Fixed(d) => d,
            Delay::Jittered { min, max } if max <= min => min,
            Delay::Jittered { min, max } => {
                let secs = rand::thread_rng().gen_range(min.as_secs_f64()..=max.as_secs_f64());
                Duration::from_secs_f64(secs).clamp(min, max)
            }
        }
    }

    /// Suspend for one sampled delay.
    pub async fn wait(&self) {
        let d = self.sample();
        if !d.is_zero() {
            tokio::time::sleep(d).await;
        }
    }
}

pub struct RateLimitedClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    delay: Delay,
}

impl RateLimitedClient {
    pub fn new(base_url: &str, api_key: &str, delay: Delay, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            delay,
        })
    }

    /// `GET {base}/{endpoint}?{params}&api-key=...`, then wait out the delay.
    pub async fn fetch_envelope(
        &self,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<Envelope, FetchError> {
        let result = self.request(endpoint, params).await;
        self.delay.wait().await;
        result
    }

    async fn request(
        &self,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<Envelope, FetchError> {
        let url = join_url(&self.base_url, endpoint);
        tracing::debug!(%url, ?params, "GET");

        // without_url() keeps the api key out of error messages.
        let response = self
            .http
            .get(&url)
            .query(params)
            .query(&[("api-key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| {
                FetchError::transport(e.status().map(|s| s.as_u16()), e.without_url().to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::transport(
                Some(status.as_u16()),
                format!("{} {}", status, preview(&body)),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::transport(None, e.without_url().to_string()))?;
        Envelope::parse(&body)
    }
}

#[async_trait]
impl ArticleFetcher for RateLimitedClient {
    async fn fetch(&self, unit: &FetchUnit) -> Result<Vec<RawRecord>, FetchError> {
        let envelope = self.fetch_envelope(&unit.endpoint(), &unit.params()).await?;
        Ok(envelope.into_records())
    }
}

fn join_url(base: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

fn preview(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() > BODY_PREVIEW_LEN {
        let cut: String = trimmed.chars().take(BODY_PREVIEW_LEN).collect();
        format!("{}...", cut)
    } else {
        trimmed.to_string()
    }
}
