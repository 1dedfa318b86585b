//! Configuration management for the bidding bot

use anyhow::Result;
use std::env;

/// Bot configuration loaded from environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Marketplace read API base (projects, skills)
    pub marketplace_base_url: String,

    /// Backend write API base (bids, history log)
    pub backend_base_url: String,

    /// Path to SQLite database for the persisted feed cache and bid log
    pub database_path: String,

    /// Steady discovery interval in seconds
    pub poll_interval_seconds: u64,

    /// Optional faster externally-triggered refresh in seconds
    pub fast_refresh_seconds: Option<u64>,

    /// Path to the sub-account roster JSON file
    pub accounts_path: Option<String>,

    /// Single-account fallback when no roster file is configured
    pub marketplace_token: Option<String>,
    pub bidder_id: Option<u64>,
    pub bidder_name: Option<String>,

    /// Default proposal text for the fallback account
    pub proposal_text: Option<String>,

    /// Default delivery period in days
    pub bid_period_days: u32,

    /// Webhook URL for bid-outcome notifications (optional)
    pub webhook_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let marketplace_base_url = env::var("MARKETPLACE_API_URL")
            .unwrap_or_else(|_| MarketplaceApi::BASE_URL.to_string());

        let backend_base_url =
            env::var("BACKEND_API_URL").unwrap_or_else(|_| BackendApi::BASE_URL.to_string());

        let database_path =
            env::var("DATABASE_PATH").unwrap_or_else(|_| "bidbot.db".to_string());

        let poll_interval_seconds = env::var("POLL_INTERVAL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        let fast_refresh_seconds = env::var("FAST_REFRESH_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok());

        let accounts_path = env::var("ACCOUNTS_PATH").ok().filter(|s| !s.is_empty());

        let marketplace_token = env::var("MARKETPLACE_TOKEN").ok().filter(|s| !s.is_empty());

        let bidder_id = env::var("BIDDER_ID").ok().and_then(|v| v.parse().ok());

        let bidder_name = env::var("BIDDER_NAME").ok().filter(|s| !s.is_empty());

        let proposal_text = env::var("PROPOSAL_TEXT").ok().filter(|s| !s.is_empty());

        let bid_period_days = env::var("BID_PERIOD_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(7);

        let webhook_url = env::var("WEBHOOK_URL").ok().filter(|s| !s.is_empty());

        if accounts_path.is_none() && marketplace_token.is_none() {
            anyhow::bail!("either ACCOUNTS_PATH or MARKETPLACE_TOKEN must be set");
        }

        Ok(Self {
            marketplace_base_url,
            backend_base_url,
            database_path,
            poll_interval_seconds,
            fast_refresh_seconds,
            accounts_path,
            marketplace_token,
            bidder_id,
            bidder_name,
            proposal_text,
            bid_period_days,
            webhook_url,
        })
    }
}

/// Marketplace read API
pub struct MarketplaceApi;

impl MarketplaceApi {
    pub const BASE_URL: &'static str = "https://www.freelancer.com/api";

    /// Public site base for composing project links
    pub const SITE_URL: &'static str = "https://www.freelancer.com";

    pub fn project_url(seo_url: &str) -> String {
        format!("{}/projects/{}", Self::SITE_URL, seo_url)
    }
}

/// Backend write API
pub struct BackendApi;

impl BackendApi {
    pub const BASE_URL: &'static str = "https://backend.bidbot.internal";
}
