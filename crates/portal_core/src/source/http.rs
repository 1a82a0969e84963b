//! HTTP JSON feed adapter.

use super::{records_from_value, RecordSource, SourceError, SourceResult};
use crate::normalize::RawRecord;
use log::{error, info};
use serde_json::Value;
use std::time::{Duration, Instant};

const CONNECT_TIMEOUT_CAP: Duration = Duration::from_secs(10);

/// Blocking GET of a JSON array with an explicit deadline.
pub struct HttpRecordSource {
    url: String,
    timeout: Duration,
    client: reqwest::blocking::Client,
}

impl HttpRecordSource {
    /// Creates a source for `url` with a whole-request `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> SourceResult<Self> {
        let url = url.into();
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(timeout.min(CONNECT_TIMEOUT_CAP))
            .timeout(timeout)
            .build()
            .map_err(|err| SourceError::Unreachable {
                location: url.clone(),
                message: format!("failed to create HTTP client: {err}"),
            })?;
        Ok(Self {
            url,
            timeout,
            client,
        })
    }

    fn map_transport_error(&self, err: reqwest::Error) -> SourceError {
        if err.is_timeout() {
            SourceError::Timeout {
                location: self.url.clone(),
                timeout: self.timeout,
            }
        } else if err.is_decode() {
            SourceError::Decode {
                location: self.url.clone(),
                message: err.to_string(),
            }
        } else {
            SourceError::Unreachable {
                location: self.url.clone(),
                message: err.to_string(),
            }
        }
    }
}

impl RecordSource for HttpRecordSource {
    fn location(&self) -> &str {
        &self.url
    }

    fn fetch_all(&self) -> SourceResult<Vec<RawRecord>> {
        let started_at = Instant::now();
        let result = self
            .client
            .get(&self.url)
            .send()
            .map_err(|err| self.map_transport_error(err))
            .and_then(|response| {
                let status = response.status();
                if !status.is_success() {
                    return Err(SourceError::Status {
                        location: self.url.clone(),
                        status: status.as_u16(),
                    });
                }
                response
                    .json::<Value>()
                    .map_err(|err| self.map_transport_error(err))
            })
            .and_then(|payload| records_from_value(&self.url, payload));

        match &result {
            Ok(records) => info!(
                "event=source_fetch module=source status=ok kind=http records={} duration_ms={}",
                records.len(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=source_fetch module=source status=error kind=http duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }
}
