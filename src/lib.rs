//! Marketplace Auto-Bidder Library
//!
//! Automates bidding on a freelance marketplace for linked sub-accounts:
//!
//! - **Discovery**: a steady poller pulls newly submitted projects matching
//!   the account's skills, runs them through a pure filtering pipeline, and
//!   publishes the kept set.
//! - **Submission**: a coordinator validates credentials, guards against
//!   duplicate bids, computes a suggested amount from the project budget,
//!   and logs accepted bids to the backend history on a best-effort task.
//! - **Protection**: HTTP 429 (or a rate-limit message) suspends polling
//!   for a fixed five-minute cooldown with a single retry at expiry.

pub mod accounts;
pub mod bidder;
pub mod config;
pub mod cooldown;
pub mod db;
pub mod error;
pub mod filter;
pub mod ledger;
pub mod marketplace;
pub mod notify;
pub mod poller;
pub mod skills;
pub mod types;

pub use accounts::{AccountStore, Resolver};
pub use bidder::{calculate_bid_amount, BidReceipt, BidSubmitter};
pub use config::Config;
pub use cooldown::CooldownController;
pub use db::Database;
pub use error::BidError;
pub use ledger::BidLedger;
pub use marketplace::MarketplaceClient;
pub use notify::Notifier;
pub use poller::{Poller, TickOutcome};
pub use skills::SkillFetcher;
pub use types::{
    BidOutcome, BidRecord, Budget, Project, ProjectKind, SubAccountCredential, Upgrades,
};
