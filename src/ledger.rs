//! Session-local bid deduplication guard
//!
//! Fast-path UX guard over project ids already attempted this session.
//! The backend stays authoritative for (project, bidder) uniqueness; this
//! ledger only prevents obviously redundant round trips.

use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct BidLedger {
    attempted: HashSet<u64>,
}

impl BidLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_bid(&self, project_id: u64) -> bool {
        self.attempted.contains(&project_id)
    }

    /// Record an attempt; returns false if the project was already present
    pub fn record(&mut self, project_id: u64) -> bool {
        self.attempted.insert(project_id)
    }

    pub fn len(&self) -> usize {
        self.attempted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempted.is_empty()
    }
}
