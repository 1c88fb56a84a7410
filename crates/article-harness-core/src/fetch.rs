//! The fetch seam between the ingestion driver and the upstream API.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::FetchError;
use crate::models::{FetchUnit, RawRecord};

/// Produces the raw records of one fetch unit.
///
/// The HTTP client implements this; tests substitute scripted fetchers.
#[async_trait]
pub trait ArticleFetcher: Send + Sync {
    async fn fetch(&self, unit: &FetchUnit) -> Result<Vec<RawRecord>, FetchError>;
}

/// `{ "response": { "docs": [ ... ] } }`, shared by the archive and search endpoints.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub response: EnvelopeBody,
}

#[derive(Debug, Deserialize)]
pub struct EnvelopeBody {
    pub docs: Vec<serde_json::Value>,
}

impl Envelope {
    /// Parses a response body, mapping any shape mismatch to [`FetchError::Malformed`].
    pub fn parse(body: &str) -> Result<Self, FetchError> {
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))
    }

    pub fn into_records(self) -> Vec<RawRecord> {
        self.response.docs.into_iter().map(RawRecord).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_docs() {
        let env = Envelope::parse(r#"{"status":"OK","response":{"docs":[{"uri":"A"},{"uri":"B"}],"meta":{}}}"#)
            .unwrap();
        let records = env.into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].uri(), Some("B"));
    }

    #[test]
    fn missing_response_is_malformed() {
        let err = Envelope::parse(r#"{"fault":{"faultstring":"Rate limit quota violation"}}"#)
            .unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[test]
    fn truncated_json_is_malformed() {
        let err = Envelope::parse(r#"{"response":{"docs":[{"uri":"A"}"#).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn null_docs_is_malformed() {
        assert!(Envelope::parse(r#"{"response":{"docs":null}}"#).is_err());
    }
}
