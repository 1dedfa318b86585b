//! Skill fetcher with a per-session cache
//!
//! Cache-first: a user's skill ids are fetched once and reused for the rest
//! of the session. The cache is owned by the fetcher, so multi-account
//! deployments get one per session instead of a process-wide map.

use crate::error::BidError;
use crate::marketplace::MarketplaceClient;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub struct SkillFetcher {
    client: Arc<MarketplaceClient>,
    cache: Mutex<HashMap<u64, Vec<u64>>>,
}

impl SkillFetcher {
    pub fn new(client: Arc<MarketplaceClient>) -> Self {
        Self {
            client,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Ordered skill ids for a user; cached for the session
    pub async fn get_skills(&self, token: &str, user_id: u64) -> Result<Vec<u64>, BidError> {
        if let Some(hit) = self.cache.lock().await.get(&user_id) {
            debug!("Skill cache hit for user {}", user_id);
            return Ok(hit.clone());
        }

        let skills = self
            .client
            .fetch_skills(token, user_id)
            .await
            .map_err(|e| BidError::SkillFetchFailed(e.to_string()))?;

        self.cache.lock().await.insert(user_id, skills.clone());
        debug!("Cached {} skills for user {}", skills.len(), user_id);

        Ok(skills)
    }

    #[cfg(test)]
    async fn cached_users(&self) -> usize {
        self.cache.lock().await.len()
    }
}
