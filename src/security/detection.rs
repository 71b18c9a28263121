//! Detection-service client.
//!
//! Consults an external classifier with the request URI and buffered body.
//! The classifier is authoritative: `MALICIOUS` aborts the pipeline with
//! 403, any transport failure (including the 2 s timeout) aborts with 500.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default classifier endpoint, overridable with `--detection-url`.
pub const DEFAULT_DETECTION_URL: &str = "http://127.0.0.1:8000/analyze";

const DETECTION_TIMEOUT: Duration = Duration::from_secs(2);

/// Classifier verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Benign,
    Malicious,
}

#[derive(Serialize)]
struct DetectionRequest<'a> {
    uri: &'a str,
    body: &'a str,
}

#[derive(Deserialize)]
struct DetectionResponse {
    // Anything other than the literal MALICIOUS, including an absent
    // field, is treated as benign.
    #[serde(default)]
    authorized: String,
}

pub struct DetectionClient {
    client: reqwest::Client,
    url: String,
}

impl DetectionClient {
    pub fn new(url: String) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(DETECTION_TIMEOUT)
            .build()?;
        Ok(Self { client, url })
    }

    /// Classify one request. Errors map to a 500 in the pipeline.
    pub async fn classify(&self, uri: &str, body: &[u8]) -> Result<Classification, reqwest::Error> {
        let body_text = String::from_utf8_lossy(body);
        let response = self
            .client
            .post(&self.url)
            .json(&DetectionRequest {
                uri,
                body: &body_text,
            })
            .send()
            .await?;

        let verdict: DetectionResponse = response.json().await?;
        if verdict.authorized == "MALICIOUS" {
            tracing::warn!(uri = %uri, "detection service flagged request as malicious");
            Ok(Classification::Malicious)
        } else {
            Ok(Classification::Benign)
        }
    }
}
