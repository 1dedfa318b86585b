//! Sub-account roster and credential resolution
//!
//! The store publishes the hydrated roster and the active selection on a
//! watch channel. Resolution awaits a usable selection instead of busy
//! polling, bounded by the same 5-second window the UI-facing design had:
//! store hydration can lag the first poll tick at startup.

use crate::config::Config;
use crate::error::BidError;
use crate::types::SubAccountCredential;
use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::time::{timeout, Duration};
use tracing::debug;

/// Bound on the wait for an active sub-account to appear
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Roster snapshot published to resolvers
#[derive(Debug, Clone, Default)]
struct Roster {
    accounts: Vec<SubAccountCredential>,
    /// Key of the currently active sub-account
    active: Option<String>,
}

/// Owns the roster; settings updates flow in through `hydrate`/`select`
pub struct AccountStore {
    tx: watch::Sender<Roster>,
}

impl AccountStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Roster::default());
        Self { tx }
    }

    /// Replace the roster. The first account becomes active when no explicit
    /// selection exists yet.
    pub fn hydrate(&self, accounts: Vec<SubAccountCredential>) {
        self.tx.send_modify(|roster| {
            if roster.active.is_none() {
                roster.active = accounts.first().map(|a| a.key.clone());
            }
            roster.accounts = accounts;
        });
    }

    /// Switch the active sub-account
    pub fn select(&self, key: &str) {
        let key = key.to_string();
        self.tx.send_modify(|roster| roster.active = Some(key));
    }

    pub fn resolver(&self) -> Resolver {
        Resolver {
            rx: self.tx.subscribe(),
            wait: RESOLVE_TIMEOUT,
        }
    }
}

impl Default for AccountStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves the active (or an explicitly keyed) sub-account's credentials
pub struct Resolver {
    rx: watch::Receiver<Roster>,
    wait: Duration,
}

impl Resolver {
    #[cfg(test)]
    fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Resolve credentials, waiting up to the window for a selection to
    /// exist. Side-effect-free; no retries beyond the window.
    pub async fn resolve(
        &mut self,
        selection_key: Option<&str>,
    ) -> Result<SubAccountCredential, BidError> {
        let waited = timeout(self.wait, async {
            loop {
                if let Some(account) = lookup(&self.rx.borrow(), selection_key) {
                    return account;
                }
                if self.rx.changed().await.is_err() {
                    // Store dropped; nothing will ever be selected. Park
                    // until the timeout fires.
                    std::future::pending::<()>().await;
                }
            }
        })
        .await;

        match waited {
            Ok(account) => {
                if account.bidder_id.is_none() {
                    return Err(BidError::MissingBidderId);
                }
                debug!("Resolved sub-account '{}'", account.key);
                Ok(account)
            }
            Err(_) => Err(BidError::NoAccountSelected),
        }
    }
}

fn lookup(roster: &Roster, selection_key: Option<&str>) -> Option<SubAccountCredential> {
    let key = match selection_key {
        Some(key) => key,
        None => roster.active.as_deref()?,
    };
    roster.accounts.iter().find(|a| a.key == key).cloned()
}

/// Load the sub-account roster from the configured JSON file, falling back
/// to a single account assembled from env credentials.
pub fn roster_from_config(config: &Config) -> Result<Vec<SubAccountCredential>> {
    if let Some(path) = &config.accounts_path {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read accounts roster {path}"))?;
        let accounts: Vec<SubAccountCredential> =
            serde_json::from_str(&raw).context("Failed to parse accounts roster")?;
        return Ok(accounts);
    }

    let token = config
        .marketplace_token
        .clone()
        .context("MARKETPLACE_TOKEN required without an accounts roster")?;

    Ok(vec![SubAccountCredential {
        key: "default".to_string(),
        token,
        bidder_id: config.bidder_id,
        bidder_name: config.bidder_name.clone().unwrap_or_default(),
        autobid_enabled: false,
        job_type_filter: None,
        proposal_type: None,
        proposal: config.proposal_text.clone().unwrap_or_default(),
    }])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(key: &str, bidder_id: Option<u64>) -> SubAccountCredential {
        SubAccountCredential {
            key: key.to_string(),
            token: "tok".to_string(),
            bidder_id,
            bidder_name: "tester".to_string(),
            autobid_enabled: false,
            job_type_filter: None,
            proposal_type: None,
            proposal: String::new(),
        }
    }

    #[tokio::test]
    async fn test_resolve_waits_for_hydration() {
        let store = AccountStore::new();
        let mut resolver = store.resolver();

        let handle = tokio::spawn(async move { resolver.resolve(None).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.hydrate(vec![account("main", Some(7))]);

        let resolved = handle.await.unwrap().unwrap();
        assert_eq!(resolved.key, "main");
        assert_eq!(resolved.bidder_id, Some(7));
    }

    #[tokio::test]
    async fn test_resolve_times_out_without_selection() {
        let store = AccountStore::new();
        let mut resolver = store.resolver().with_wait(Duration::from_millis(50));

        let err = resolver.resolve(None).await.unwrap_err();
        assert!(matches!(err, BidError::NoAccountSelected));
    }

    #[tokio::test]
    async fn test_resolve_rejects_missing_bidder_id() {
        let store = AccountStore::new();
        store.hydrate(vec![account("main", None)]);

        let mut resolver = store.resolver();
        let err = resolver.resolve(None).await.unwrap_err();
        assert!(matches!(err, BidError::MissingBidderId));
    }

    #[tokio::test]
    async fn test_resolve_by_explicit_key() {
        let store = AccountStore::new();
        store.hydrate(vec![account("main", Some(1)), account("second", Some(2))]);

        let mut resolver = store.resolver();
        let resolved = resolver.resolve(Some("second")).await.unwrap();
        assert_eq!(resolved.bidder_id, Some(2));

        // Active selection still resolves independently
        let resolved = resolver.resolve(None).await.unwrap();
        assert_eq!(resolved.key, "main");
    }

    #[tokio::test]
    async fn test_select_switches_active() {
        let store = AccountStore::new();
        store.hydrate(vec![account("main", Some(1)), account("second", Some(2))]);
        store.select("second");

        let mut resolver = store.resolver();
        let resolved = resolver.resolve(None).await.unwrap();
        assert_eq!(resolved.key, "second");
    }
}
