//! Core types for the marketplace bidding bot

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Project pricing model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    Fixed,
    Hourly,
}

impl ProjectKind {
    /// Parse the marketplace's `type` field. Unknown values are rejected
    /// so a schema change surfaces as a skipped project, not a bad bid.
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("fixed") {
            Some(ProjectKind::Fixed)
        } else if s.eq_ignore_ascii_case("hourly") {
            Some(ProjectKind::Hourly)
        } else {
            None
        }
    }
}

impl fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectKind::Fixed => write!(f, "fixed"),
            ProjectKind::Hourly => write!(f, "hourly"),
        }
    }
}

/// Budget range attached to a project. Either bound may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub minimum: Option<Decimal>,
    pub maximum: Option<Decimal>,
}

/// Paid upgrade flags. Canonical booleans: the wire layer has already
/// merged top-level and nested representations by the time these exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upgrades {
    pub nda: bool,
    pub sealed: bool,
    pub nonpublic: bool,
}

impl Upgrades {
    pub fn any(&self) -> bool {
        self.nda || self.sealed || self.nonpublic
    }
}

/// A candidate project, snapshotted at poll time. Never merged across polls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub seo_url: String,
    pub kind: ProjectKind,
    pub budget: Budget,
    pub currency_code: String,
    pub owner_country: Option<String>,
    pub upgrades: Upgrades,
    pub submit_time: Option<DateTime<Utc>>,
    /// Canonical boolean; loose wire forms (`true` / `"True"`) are decoded
    /// at the client boundary.
    pub local: bool,
}

impl Project {
    /// Shortened title for log lines (UTF-8 safe)
    pub fn short_title(&self, max_len: usize) -> String {
        let chars: Vec<char> = self.title.chars().collect();
        if chars.len() <= max_len {
            self.title.clone()
        } else {
            let truncated: String = chars[..max_len.saturating_sub(3)].iter().collect();
            format!("{}...", truncated)
        }
    }
}

/// One linked marketplace identity with its own credentials and policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAccountCredential {
    pub key: String,
    pub token: String,
    pub bidder_id: Option<u64>,
    #[serde(default)]
    pub bidder_name: String,
    #[serde(default)]
    pub autobid_enabled: bool,
    #[serde(default)]
    pub job_type_filter: Option<ProjectKind>,
    #[serde(default)]
    pub proposal_type: Option<String>,
    /// Free-text pitch submitted alongside amount and period
    #[serde(default)]
    pub proposal: String,
}

impl SubAccountCredential {
    /// Whether this account can submit a bid at all (token + numeric bidder id)
    pub fn can_bid(&self) -> bool {
        !self.token.is_empty() && self.bidder_id.is_some()
    }
}

/// History-log entry for a submission attempt. Field names follow the
/// backend history endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidRecord {
    pub project_id: u64,
    pub bidder_id: u64,
    pub amount: Decimal,
    pub period: u32,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ProjectKind,
    pub bidder_type: String,
    pub budget: Budget,
    pub date: DateTime<Utc>,
    pub url: String,
}

/// Outcome handed to the notification boundary after a submission attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidOutcome {
    pub project_id: u64,
    pub title: String,
    pub amount: Decimal,
    pub period: u32,
    pub accepted: bool,
    pub message: Option<String>,
}

impl fmt::Display for BidOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.accepted {
            write!(f, "bid accepted: {} at {} ({}d)", self.project_id, self.amount, self.period)
        } else {
            write!(
                f,
                "bid rejected: {} - {}",
                self.project_id,
                self.message.as_deref().unwrap_or("no message")
            )
        }
    }
}
