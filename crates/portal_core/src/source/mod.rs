//! Pull adapters for the domain record stores.
//!
//! # Responsibility
//! - Fetch one feed in full as untyped records.
//! - Map transport failures onto `SourceError` without retrying.
//!
//! # Invariants
//! - Sources are read-only and independent; fetch order carries no meaning.
//! - A feed whose payload is not a JSON array of objects is a decode error.

use crate::normalize::RawRecord;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

mod file;
mod http;

pub use file::JsonFileSource;
pub use http::HttpRecordSource;

pub type SourceResult<T> = Result<T, SourceError>;

/// Failure to fetch one feed.
#[derive(Debug)]
pub enum SourceError {
    /// The store could not be reached.
    Unreachable { location: String, message: String },
    /// The fetch exceeded its deadline.
    Timeout { location: String, timeout: Duration },
    /// The store answered with a non-success status.
    Status { location: String, status: u16 },
    /// The payload is not a JSON array of records.
    Decode { location: String, message: String },
    Io {
        location: String,
        source: std::io::Error,
    },
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unreachable { location, message } => {
                write!(f, "source `{location}` is unreachable: {message}")
            }
            Self::Timeout { location, timeout } => write!(
                f,
                "source `{location}` timed out after {}s",
                timeout.as_secs()
            ),
            Self::Status { location, status } => {
                write!(f, "source `{location}` answered with HTTP {status}")
            }
            Self::Decode { location, message } => {
                write!(f, "source `{location}` returned an invalid payload: {message}")
            }
            Self::Io { location, source } => write!(f, "source `{location}` read failed: {source}"),
        }
    }
}

impl Error for SourceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// One read-only domain feed.
pub trait RecordSource: Send + Sync {
    /// Stable location label used in logs and errors.
    fn location(&self) -> &str;
    /// Fetches every record of the feed.
    fn fetch_all(&self) -> SourceResult<Vec<RawRecord>>;
}

/// The four feeds a load consumes.
pub struct DomainSources {
    pub employees: Box<dyn RecordSource>,
    pub projects: Box<dyn RecordSource>,
    pub expenses: Box<dyn RecordSource>,
    pub tasks: Box<dyn RecordSource>,
}

/// Builds a source for `location`.
///
/// `http://` and `https://` locations are fetched over HTTP with `timeout`;
/// anything else is read as a JSON file path.
pub fn source_for_location(
    location: &str,
    timeout: Duration,
) -> SourceResult<Box<dyn RecordSource>> {
    let trimmed = location.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(Box::new(HttpRecordSource::new(trimmed, timeout)?))
    } else {
        Ok(Box::new(JsonFileSource::new(trimmed)))
    }
}

/// Splits a decoded JSON payload into records.
pub(crate) fn records_from_value(location: &str, payload: Value) -> SourceResult<Vec<RawRecord>> {
    let Value::Array(items) = payload else {
        return Err(SourceError::Decode {
            location: location.to_string(),
            message: "expected a JSON array".to_string(),
        });
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(record) => Ok(record),
            _ => Err(SourceError::Decode {
                location: location.to_string(),
                message: format!("element {index} is not an object"),
            }),
        })
        .collect()
}
