//! Project discovery poller
//!
//! Drives discovery on a steady timer: resolve credentials, fetch skills,
//! pull candidate projects for the lookback window, filter, publish. A
//! compare-exchange guard drops ticks that arrive while a fetch is in
//! flight, and a rate-limit signal suspends polling for a fixed cooldown
//! with exactly one retry scheduled at expiry.

use crate::accounts::Resolver;
use crate::cooldown::CooldownController;
use crate::db::Database;
use crate::error::BidError;
use crate::filter;
use crate::marketplace::MarketplaceClient;
use crate::skills::SkillFetcher;
use crate::types::Project;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, Notify};
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Steady discovery interval
pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Candidate window: only projects submitted within the last 300 seconds
pub const LOOKBACK_SECS: i64 = 300;

/// What a single tick did
#[derive(Debug)]
pub enum TickOutcome {
    /// Discovery completed; the filtered set was published
    Published(Vec<Project>),
    /// Dropped: a previous fetch was still in flight
    InFlight,
    /// Cooldown active (or just armed); one retry belongs at `retry_at`
    Cooldown { retry_at: Instant },
    /// Discovery failed; retried on the next scheduled tick
    Failed(BidError),
}

pub struct Poller {
    client: Arc<MarketplaceClient>,
    resolver: Mutex<Resolver>,
    skills: SkillFetcher,
    cooldown: Mutex<CooldownController>,
    fetching: AtomicBool,
    db: Option<Arc<Database>>,
    feed_tx: watch::Sender<Vec<Project>>,
}

impl Poller {
    /// Build a poller and the feed receiver its published sets flow out on
    pub fn new(
        client: Arc<MarketplaceClient>,
        resolver: Resolver,
        db: Option<Arc<Database>>,
    ) -> (Arc<Self>, watch::Receiver<Vec<Project>>) {
        let (feed_tx, feed_rx) = watch::channel(Vec::new());
        let skills = SkillFetcher::new(client.clone());
        let poller = Arc::new(Self {
            client,
            resolver: Mutex::new(resolver),
            skills,
            cooldown: Mutex::new(CooldownController::new()),
            fetching: AtomicBool::new(false),
            db,
            feed_tx,
        });
        (poller, feed_rx)
    }

    /// One poll tick. Cooldown and in-flight checks happen before any
    /// network call; the guard is released on every path.
    pub async fn tick(&self) -> TickOutcome {
        if let Some(retry_at) = self.cooldown.lock().await.active_until() {
            debug!("Tick under cooldown; retry in {:?}", retry_at - Instant::now());
            return TickOutcome::Cooldown { retry_at };
        }

        if self
            .fetching
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Tick dropped: fetch already in flight");
            return TickOutcome::InFlight;
        }

        let outcome = match self.discover().await {
            Ok(projects) => TickOutcome::Published(projects),
            Err(err) if err.is_rate_limit() => {
                let retry_at = self.cooldown.lock().await.arm();
                warn!("Rate limited; polling suspended for the cooldown window");
                TickOutcome::Cooldown { retry_at }
            }
            Err(err) => TickOutcome::Failed(err),
        };

        self.fetching.store(false, Ordering::Release);
        outcome
    }

    async fn discover(&self) -> Result<Vec<Project>, BidError> {
        let credential = self.resolver.lock().await.resolve(None).await?;
        // resolve() guarantees the id is present
        let bidder_id = credential.bidder_id.ok_or(BidError::MissingBidderId)?;

        let skills = self.skills.get_skills(&credential.token, bidder_id).await?;

        let from_time = Utc::now() - chrono::Duration::seconds(LOOKBACK_SECS);
        let fetched = self
            .client
            .fetch_projects(&credential.token, &skills, from_time)
            .await?;

        let kept = filter::apply(&fetched);
        info!("Discovery: {} candidates, {} kept", fetched.len(), kept.len());

        if let Some(db) = &self.db {
            if let Err(e) = db.store_snapshot(&kept, Utc::now()).await {
                warn!("Failed to persist feed snapshot: {}", e);
            }
        }

        let _ = self.feed_tx.send(kept.clone());
        Ok(kept)
    }

    /// Run the discovery loop until the task is aborted. `refresh` lets an
    /// external trigger request an early tick; it goes through the same
    /// guard and cooldown as the timer.
    pub async fn run(self: Arc<Self>, refresh: Arc<Notify>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first interval tick completes immediately; consume it so the
        // loop body below is the immediate first poll
        ticker.tick().await;

        info!("Poller started ({}s interval)", interval.as_secs());

        loop {
            match self.tick().await {
                TickOutcome::Published(projects) => {
                    debug!("Published {} projects", projects.len());
                }
                TickOutcome::InFlight => {}
                TickOutcome::Cooldown { retry_at } => {
                    info!(
                        "Cooldown: next attempt in {}s",
                        (retry_at - Instant::now()).as_secs()
                    );
                    // Exactly one retry, fired at expiry; refresh requests
                    // during the window are no-ops by construction
                    tokio::time::sleep_until(retry_at).await;
                    continue;
                }
                TickOutcome::Failed(err) => {
                    error!("Discovery failed: {}", err);
                }
            }

            tokio::select! {
                _ = ticker.tick() => {}
                _ = refresh.notified() => {
                    debug!("External refresh requested");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::AccountStore;
    use crate::config::Config;
    use crate::types::SubAccountCredential;

    fn test_config(base: &str) -> Config {
        Config {
            marketplace_base_url: base.to_string(),
            backend_base_url: base.to_string(),
            database_path: ":memory:".to_string(),
            poll_interval_seconds: 60,
            fast_refresh_seconds: None,
            accounts_path: None,
            marketplace_token: Some("tok".to_string()),
            bidder_id: Some(7),
            bidder_name: None,
            proposal_text: None,
            bid_period_days: 7,
            webhook_url: None,
        }
    }

    fn hydrated_store() -> AccountStore {
        let store = AccountStore::new();
        store.hydrate(vec![SubAccountCredential {
            key: "main".to_string(),
            token: "tok".to_string(),
            bidder_id: Some(7),
            bidder_name: "tester".to_string(),
            autobid_enabled: false,
            job_type_filter: None,
            proposal_type: None,
            proposal: String::new(),
        }]);
        store
    }

    fn skills_body() -> &'static str {
        r#"{"result":{"topSkills":[{"id":3}]}}"#
    }

    fn projects_body() -> String {
        serde_json::json!({
            "result": {
                "projects": [
                    {
                        "id": 500,
                        "owner_id": 1,
                        "title": "Kept project",
                        "description": "d",
                        "seo_url": "a/kept-500",
                        "type": "fixed",
                        "currency": { "code": "USD" },
                        "budget": { "minimum": "100", "maximum": "300" }
                    },
                    {
                        "id": 501,
                        "owner_id": 2,
                        "title": "Filtered project",
                        "description": "d",
                        "seo_url": "a/filtered-501",
                        "type": "fixed",
                        "currency": { "code": "INR" },
                        "budget": { "minimum": "100", "maximum": "300" }
                    }
                ],
                "users": {
                    "1": { "location": { "country": { "name": "Denmark" } } },
                    "2": { "location": { "country": { "name": "Denmark" } } }
                }
            }
        })
        .to_string()
    }

    async fn poller_against(server: &mockito::Server) -> (Arc<Poller>, watch::Receiver<Vec<Project>>) {
        let client = Arc::new(MarketplaceClient::new(&test_config(&server.url())));
        let store = hydrated_store();
        Poller::new(client, store.resolver(), None)
    }

    #[tokio::test]
    async fn test_tick_publishes_filtered_feed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex(r"^/users/0\.1/top-skills/.*".to_string()))
            .with_status(200)
            .with_body(skills_body())
            .create_async()
            .await;
        server
            .mock("GET", mockito::Matcher::Regex(r"^/projects/0\.1/projects/active/.*".to_string()))
            .with_status(200)
            .with_body(projects_body())
            .create_async()
            .await;

        let (poller, feed_rx) = poller_against(&server).await;
        match poller.tick().await {
            TickOutcome::Published(projects) => {
                assert_eq!(projects.len(), 1);
                assert_eq!(projects[0].id, 500);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        assert_eq!(feed_rx.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_ticks_make_one_discovery_call() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex(r"^/users/0\.1/top-skills/.*".to_string()))
            .with_status(200)
            .with_body(skills_body())
            .create_async()
            .await;
        let discovery = server
            .mock("GET", mockito::Matcher::Regex(r"^/projects/0\.1/projects/active/.*".to_string()))
            .with_status(200)
            .with_body(projects_body())
            .expect(1)
            .create_async()
            .await;

        let (poller, _feed_rx) = poller_against(&server).await;

        let (first, second) = tokio::join!(poller.tick(), poller.tick());
        let dropped = matches!(first, TickOutcome::InFlight)
            ^ matches!(second, TickOutcome::InFlight);
        assert!(dropped, "exactly one tick must be dropped by the guard");

        discovery.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_arms_cooldown() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex(r"^/users/0\.1/top-skills/.*".to_string()))
            .with_status(200)
            .with_body(skills_body())
            .create_async()
            .await;
        let discovery = server
            .mock("GET", mockito::Matcher::Regex(r"^/projects/0\.1/projects/active/.*".to_string()))
            .with_status(429)
            .with_body("")
            .expect(1)
            .create_async()
            .await;

        let (poller, _feed_rx) = poller_against(&server).await;

        let retry_at = match poller.tick().await {
            TickOutcome::Cooldown { retry_at } => retry_at,
            other => panic!("unexpected outcome: {other:?}"),
        };
        let window = retry_at - Instant::now();
        assert!(window > Duration::from_secs(295) && window <= Duration::from_secs(300));

        // Ticks during the window are no-ops: same retry instant, no HTTP
        match poller.tick().await {
            TickOutcome::Cooldown { retry_at: again } => assert_eq!(again, retry_at),
            other => panic!("unexpected outcome: {other:?}"),
        }
        discovery.assert_async().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_under_cooldown_makes_no_calls() {
        let mut server = mockito::Server::new_async().await;
        let any = server
            .mock("GET", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let (poller, _feed_rx) = poller_against(&server).await;
        poller.cooldown.lock().await.arm();
        tokio::time::advance(Duration::from_secs(180)).await;

        // 120s of the 5-minute window remain
        match poller.tick().await {
            TickOutcome::Cooldown { retry_at } => {
                assert_eq!(retry_at - Instant::now(), Duration::from_secs(120));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        any.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_tick_releases_guard() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex(r"^/users/0\.1/top-skills/.*".to_string()))
            .with_status(200)
            .with_body(skills_body())
            .create_async()
            .await;
        server
            .mock("GET", mockito::Matcher::Regex(r"^/projects/0\.1/projects/active/.*".to_string()))
            .with_status(500)
            .with_body("boom")
            .expect(2)
            .create_async()
            .await;

        let (poller, _feed_rx) = poller_against(&server).await;

        assert!(matches!(poller.tick().await, TickOutcome::Failed(_)));
        // Guard released: the next tick fetches again instead of dropping
        assert!(matches!(poller.tick().await, TickOutcome::Failed(_)));
    }
}
