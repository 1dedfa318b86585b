//! Error differentiation for marketplace and backend responses
//!
//! Classifies HTTP failures into structured variants so the poller can arm
//! its cooldown on rate limits and the coordinator can fail fast on
//! validation problems without touching the network.

use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors produced by discovery, credential resolution, and bid submission
#[derive(Debug, Error)]
pub enum BidError {
    /// Request produced no response (timeout, DNS, connection reset)
    #[error("network error: {0}")]
    Network(String),

    /// Backend or marketplace returned an error status; message is surfaced
    /// verbatim when the body carries one
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// HTTP 429 or a body matching the rate-limit message pattern
    #[error("rate limited by marketplace")]
    RateLimited,

    /// A required credential field was empty; raised before any network call
    #[error("missing required credential field: {field}")]
    Validation { field: &'static str },

    /// The account-selection wait window elapsed with nothing selected
    #[error("no sub-account selected")]
    NoAccountSelected,

    /// The resolved sub-account has no numeric bidder id
    #[error("sub-account has no bidder id")]
    MissingBidderId,

    #[error("failed to fetch skills: {0}")]
    SkillFetchFailed(String),

    /// Local dedup guard hit; raised before any network call
    #[error("already bid on project {project_id} this session")]
    AlreadyBid { project_id: u64 },

    /// Non-2xx from the bid endpoint; never auto-retried
    #[error("bid rejected: {message}")]
    BidRejected { message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Error body shape shared by the marketplace and the backend
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn rate_limit_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)rate limit|too many requests|request limit reached")
            .expect("rate-limit pattern is valid")
    })
}

impl BidError {
    /// Classify an error response from either API
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.error.or(b.message))
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| body.trim().to_string());

        if status == 429 || rate_limit_pattern().is_match(&message) {
            return BidError::RateLimited;
        }

        let message = if message.is_empty() {
            "request failed".to_string()
        } else {
            message
        };

        BidError::Http { status, message }
    }

    /// Classify a transport-level reqwest error
    pub fn from_network(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            BidError::Network("request timed out".to_string())
        } else if err.is_connect() {
            BidError::Network("connection failed".to_string())
        } else {
            BidError::Network(err.to_string())
        }
    }

    /// Whether this error should arm the poller's cooldown
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, BidError::RateLimited)
    }
}
