use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Which worker entry point to invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchKind {
    /// Product snapshot (primary source)
    Product,
    /// Review list (secondary source)
    Reviews,
}

impl fmt::Display for FetchKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FetchKind::Product => write!(f, "product"),
            FetchKind::Reviews => write!(f, "reviews"),
        }
    }
}

/// Classification of a failed worker attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RateLimited,
    Timeout,
    ProcessError,
    ParseError,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FailureKind::RateLimited => write!(f, "rate limited"),
            FailureKind::Timeout => write!(f, "timed out"),
            FailureKind::ProcessError => write!(f, "process error"),
            FailureKind::ParseError => write!(f, "parse error"),
        }
    }
}

/// A failed attempt with the diagnostic text that explains it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct FetchFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl FetchFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Result of one worker invocation. Consumed immediately, never persisted.
pub type FetchOutcome = Result<serde_json::Value, FetchFailure>;

const RATE_LIMIT_MARKERS: [&str; 4] = ["429", "rate limit", "too many requests", "blocked"];

/// Returns true if diagnostic text carries a rate-limit indicator
pub fn mentions_rate_limit(diagnostics: &str) -> bool {
    let lowered = diagnostics.to_lowercase();
    RATE_LIMIT_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Classifies a failure report from a worker by its diagnostic text
pub fn classify_diagnostics(diagnostics: &str) -> FailureKind {
    if mentions_rate_limit(diagnostics) {
        FailureKind::RateLimited
    } else {
        FailureKind::ProcessError
    }
}
