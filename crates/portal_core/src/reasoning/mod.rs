//! External reasoning collaborator boundary.
//!
//! # Responsibility
//! - Define the narrow text-in/text-out contract the query service needs.
//! - Provide an OpenAI-compatible HTTP implementation.
//!
//! # Invariants
//! - The collaborator never receives a database handle; it only sees the
//!   prompt text the query service builds.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod http;

pub use http::{HttpReasoningClient, ReasoningClientConfig};

/// One system + user prompt exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningRequest {
    pub system: String,
    pub user: String,
}

/// Reasoning collaborator failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReasoningError {
    /// No API key or endpoint configured.
    Unconfigured(String),
    /// Transport failure or timeout.
    Http(String),
    /// Non-success status or unusable answer.
    Response(String),
}

impl Display for ReasoningError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unconfigured(message) => write!(f, "reasoning client not configured: {message}"),
            Self::Http(message) => write!(f, "reasoning request failed: {message}"),
            Self::Response(message) => write!(f, "reasoning response unusable: {message}"),
        }
    }
}

impl Error for ReasoningError {}

/// Text completion capability of the external collaborator.
pub trait ReasoningClient {
    fn complete(&self, request: &ReasoningRequest) -> Result<String, ReasoningError>;
}

impl<T: ReasoningClient + ?Sized> ReasoningClient for &T {
    fn complete(&self, request: &ReasoningRequest) -> Result<String, ReasoningError> {
        (**self).complete(request)
    }
}
