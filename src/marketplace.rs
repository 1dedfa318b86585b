//! HTTP client for the marketplace read API and the backend write API
//!
//! Owns every wire shape. Loose representations (the `local` flag arriving
//! as a boolean or the string `"true"`, upgrade flags at the project top
//! level or nested under `upgrades`) are decoded here into canonical
//! booleans so nothing downstream re-interprets them.

use crate::config::Config;
use crate::error::BidError;
use crate::types::{BidRecord, Budget, Project, ProjectKind, SubAccountCredential, Upgrades};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Header carrying the marketplace OAuth token on read calls
const MARKETPLACE_AUTH_HEADER: &str = "freelancer-oauth-v1";

/// Client for both external APIs
pub struct MarketplaceClient {
    http: reqwest::Client,
    marketplace_base: String,
    backend_base: String,
}

/// Raw project as returned by the active-projects endpoint
#[derive(Debug, Deserialize)]
struct RawProject {
    id: u64,
    title: String,
    #[serde(default)]
    owner_id: Option<u64>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    preview_description: Option<String>,
    #[serde(default)]
    seo_url: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    currency: Option<RawCurrency>,
    #[serde(default)]
    budget: Option<RawBudget>,
    #[serde(default)]
    submitdate: Option<i64>,
    #[serde(default)]
    local: Option<LooseBool>,
    #[serde(default)]
    upgrades: Option<RawUpgrades>,
    // The same flags are sometimes emitted at the top level instead
    #[serde(rename = "NDA", default)]
    nda: Option<LooseBool>,
    #[serde(default)]
    sealed: Option<LooseBool>,
    #[serde(default)]
    nonpublic: Option<LooseBool>,
}

#[derive(Debug, Deserialize)]
struct RawCurrency {
    #[serde(default)]
    code: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawBudget {
    #[serde(default)]
    minimum: Option<Decimal>,
    #[serde(default)]
    maximum: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct RawUpgrades {
    #[serde(rename = "NDA", default)]
    nda: Option<LooseBool>,
    #[serde(default)]
    sealed: Option<LooseBool>,
    #[serde(default)]
    nonpublic: Option<LooseBool>,
}

/// Boolean that may arrive as a real boolean or as a string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LooseBool {
    Flag(bool),
    Text(String),
}

impl LooseBool {
    fn truthy(&self) -> bool {
        match self {
            LooseBool::Flag(b) => *b,
            LooseBool::Text(s) => s.eq_ignore_ascii_case("true"),
        }
    }
}

fn truthy(flag: &Option<LooseBool>) -> bool {
    flag.as_ref().map(LooseBool::truthy).unwrap_or(false)
}

#[derive(Debug, Deserialize)]
struct RawUser {
    #[serde(default)]
    location: Option<RawLocation>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLocation {
    #[serde(default)]
    country: Option<RawCountry>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCountry {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectsEnvelope {
    result: ProjectsResult,
}

#[derive(Debug, Default, Deserialize)]
struct ProjectsResult {
    #[serde(default)]
    projects: Vec<RawProject>,
    /// Owner profiles keyed by user id
    #[serde(default)]
    users: HashMap<String, RawUser>,
}

#[derive(Debug, Deserialize)]
struct SkillsEnvelope {
    result: SkillsResult,
}

#[derive(Debug, Default, Deserialize)]
struct SkillsResult {
    #[serde(rename = "topSkills", default)]
    top_skills: Vec<RawSkill>,
}

#[derive(Debug, Deserialize)]
struct RawSkill {
    id: u64,
}

/// Payload for the backend bid endpoint
#[derive(Debug, Clone, Serialize)]
pub struct BidPayload {
    pub bid_via: &'static str,
    #[serde(rename = "projectId")]
    pub project_id: u64,
    pub seo_url: String,
    #[serde(rename = "projectType")]
    pub project_type: ProjectKind,
    #[serde(rename = "bidderId")]
    pub bidder_id: u64,
    #[serde(rename = "bidAmount")]
    pub bid_amount: Decimal,
    pub proposal: String,
    #[serde(rename = "bidderName")]
    pub bidder_name: String,
    #[serde(rename = "projectTitle")]
    pub project_title: String,
    #[serde(rename = "projectDescription")]
    pub project_description: String,
    pub budget: Budget,
}

impl BidPayload {
    pub fn compose(
        project: &Project,
        amount: Decimal,
        proposal: &str,
        credential: &SubAccountCredential,
        bidder_id: u64,
    ) -> Self {
        Self {
            bid_via: "bidbot",
            project_id: project.id,
            seo_url: project.seo_url.clone(),
            project_type: project.kind,
            bidder_id,
            bid_amount: amount,
            proposal: proposal.to_string(),
            bidder_name: credential.bidder_name.clone(),
            project_title: project.title.clone(),
            project_description: project.description.clone(),
            budget: project.budget,
        }
    }
}

impl MarketplaceClient {
    pub fn new(config: &Config) -> Self {
        // The original design had no request timeout; 30s bounds
        // worst-case tick latency.
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            marketplace_base: config.marketplace_base_url.trim_end_matches('/').to_string(),
            backend_base: config.backend_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch candidate projects matching the given skills, submitted after
    /// `from_time`
    pub async fn fetch_projects(
        &self,
        token: &str,
        skills: &[u64],
        from_time: DateTime<Utc>,
    ) -> Result<Vec<Project>, BidError> {
        let url = format!("{}/projects/0.1/projects/active/", self.marketplace_base);

        let mut query: Vec<(String, String)> = skills
            .iter()
            .map(|id| ("jobs[]".to_string(), id.to_string()))
            .collect();
        query.push(("from_time".to_string(), from_time.timestamp().to_string()));
        query.push(("full_description".to_string(), "true".to_string()));
        query.push(("user_details".to_string(), "true".to_string()));
        query.push(("user_reputation".to_string(), "true".to_string()));

        debug!("Fetching projects from {} ({} skills)", url, skills.len());

        let response = self
            .http
            .get(&url)
            .header(MARKETPLACE_AUTH_HEADER, token)
            .query(&query)
            .send()
            .await
            .map_err(|e| BidError::from_network(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BidError::from_response(status.as_u16(), &body));
        }

        let envelope: ProjectsEnvelope = response
            .json()
            .await
            .map_err(|e| BidError::Decode(e.to_string()))?;

        let users = envelope.result.users;
        let projects = envelope
            .result
            .projects
            .into_iter()
            .filter_map(|raw| decode_project(raw, &users))
            .collect();

        Ok(projects)
    }

    /// Fetch a user's skill ids
    pub async fn fetch_skills(&self, token: &str, user_id: u64) -> Result<Vec<u64>, BidError> {
        let url = format!("{}/users/0.1/top-skills/", self.marketplace_base);

        let response = self
            .http
            .get(&url)
            .header(MARKETPLACE_AUTH_HEADER, token)
            .query(&[
                ("userId", user_id.to_string()),
                ("limit", "9999".to_string()),
                ("compact", "true".to_string()),
            ])
            .send()
            .await
            .map_err(|e| BidError::from_network(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BidError::from_response(status.as_u16(), &body));
        }

        let envelope: SkillsEnvelope = response
            .json()
            .await
            .map_err(|e| BidError::Decode(e.to_string()))?;

        Ok(envelope.result.top_skills.into_iter().map(|s| s.id).collect())
    }

    /// Submit a composed bid to the backend
    pub async fn submit_bid(
        &self,
        token: &str,
        payload: &BidPayload,
    ) -> Result<serde_json::Value, BidError> {
        let url = format!("{}/api/bids", self.backend_base);

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(payload)
            .send()
            .await
            .map_err(|e| BidError::from_network(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BidError::from_response(status.as_u16(), &body));
        }

        response
            .json()
            .await
            .map_err(|e| BidError::Decode(e.to_string()))
    }

    /// Write a history-log entry for an accepted bid
    pub async fn log_history(&self, token: &str, record: &BidRecord) -> Result<(), BidError> {
        let url = format!("{}/api/bid-history", self.backend_base);

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(record)
            .send()
            .await
            .map_err(|e| BidError::from_network(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BidError::from_response(status.as_u16(), &body));
        }

        Ok(())
    }
}

/// Canonicalize a raw project, joining the owner country from the users map.
/// Projects with an unparseable pricing type are skipped.
fn decode_project(raw: RawProject, users: &HashMap<String, RawUser>) -> Option<Project> {
    let kind = ProjectKind::parse(raw.kind.as_deref()?)?;

    let owner_country = raw
        .owner_id
        .and_then(|id| users.get(&id.to_string()))
        .and_then(|u| u.location.as_ref())
        .and_then(|l| l.country.as_ref())
        .and_then(|c| c.name.clone());

    let budget = raw
        .budget
        .map(|b| Budget { minimum: b.minimum, maximum: b.maximum })
        .unwrap_or_default();

    // Upgrade flags may sit at the top level, under `upgrades`, or both
    let nested = raw.upgrades.unwrap_or_default();
    let upgrades = Upgrades {
        nda: truthy(&raw.nda) || truthy(&nested.nda),
        sealed: truthy(&raw.sealed) || truthy(&nested.sealed),
        nonpublic: truthy(&raw.nonpublic) || truthy(&nested.nonpublic),
    };

    let submit_time = raw
        .submitdate
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single());

    Some(Project {
        id: raw.id,
        title: raw.title,
        description: raw
            .description
            .or(raw.preview_description)
            .unwrap_or_default(),
        seo_url: raw.seo_url,
        kind,
        budget,
        currency_code: raw.currency.map(|c| c.code).unwrap_or_default(),
        owner_country,
        upgrades,
        submit_time,
        local: truthy(&raw.local),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_config(base: &str) -> Config {
        Config {
            marketplace_base_url: base.to_string(),
            backend_base_url: base.to_string(),
            database_path: ":memory:".to_string(),
            poll_interval_seconds: 60,
            fast_refresh_seconds: None,
            accounts_path: None,
            marketplace_token: Some("tok".to_string()),
            bidder_id: Some(1),
            bidder_name: Some("tester".to_string()),
            proposal_text: None,
            bid_period_days: 7,
            webhook_url: None,
        }
    }

    #[tokio::test]
    async fn test_fetch_projects_decodes_loose_shapes() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::json!({
            "result": {
                "projects": [
                    {
                        "id": 101,
                        "owner_id": 9,
                        "title": "Port a parser to Rust",
                        "description": "Long description",
                        "seo_url": "rust/parser-101",
                        "type": "fixed",
                        "currency": { "code": "USD" },
                        "budget": { "minimum": "30", "maximum": "250" },
                        "submitdate": 1700000000,
                        "local": "True",
                        "sealed": "true",
                        "upgrades": { "NDA": true }
                    },
                    {
                        "id": 102,
                        "owner_id": 10,
                        "title": "Hourly helper",
                        "preview_description": "Short",
                        "seo_url": "misc/helper-102",
                        "type": "hourly",
                        "currency": { "code": "EUR" },
                        "budget": { "minimum": "12", "maximum": "35" },
                        "local": false
                    },
                    {
                        "id": 103,
                        "title": "No type field, skipped",
                        "seo_url": "misc/skip-103"
                    }
                ],
                "users": {
                    "9": { "location": { "country": { "name": "Pakistan" } } },
                    "10": { "location": { "country": { "name": "Netherlands" } } }
                }
            }
        });
        let mock = server
            .mock("GET", mockito::Matcher::Regex(r"^/projects/0\.1/projects/active/.*".to_string()))
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let client = MarketplaceClient::new(&test_config(&server.url()));
        let projects = client
            .fetch_projects("tok", &[3, 9], Utc::now())
            .await
            .unwrap();
        mock.assert_async().await;

        assert_eq!(projects.len(), 2);

        let first = &projects[0];
        assert!(first.local, "string \"True\" decodes to a canonical true");
        assert!(first.upgrades.nda, "nested upgrade flag merged");
        assert!(first.upgrades.sealed, "top-level upgrade flag merged");
        assert_eq!(first.owner_country.as_deref(), Some("Pakistan"));
        assert_eq!(first.budget.minimum, Some(dec!(30)));
        assert!(first.submit_time.is_some());

        let second = &projects[1];
        assert!(!second.local);
        assert_eq!(second.kind, ProjectKind::Hourly);
        assert_eq!(second.description, "Short");
        assert_eq!(second.owner_country.as_deref(), Some("Netherlands"));
    }

    #[tokio::test]
    async fn test_fetch_skills() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Regex(r"^/users/0\.1/top-skills/.*".to_string()))
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("userId".into(), "42".into()),
                mockito::Matcher::UrlEncoded("limit".into(), "9999".into()),
                mockito::Matcher::UrlEncoded("compact".into(), "true".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"result":{"topSkills":[{"id":3},{"id":115},{"id":9}]}}"#)
            .create_async()
            .await;

        let client = MarketplaceClient::new(&test_config(&server.url()));
        let skills = client.fetch_skills("tok", 42).await.unwrap();
        mock.assert_async().await;

        // Order preserved as returned
        assert_eq!(skills, vec![3, 115, 9]);
    }

    #[tokio::test]
    async fn test_rate_limit_status_classified() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let client = MarketplaceClient::new(&test_config(&server.url()));
        let err = client.fetch_projects("tok", &[], Utc::now()).await.unwrap_err();
        assert!(err.is_rate_limit());
    }

    #[tokio::test]
    async fn test_rate_limit_message_classified() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(400)
            .with_body(r#"{"message":"Request limit reached for this token"}"#)
            .create_async()
            .await;

        let client = MarketplaceClient::new(&test_config(&server.url()));
        let err = client.fetch_projects("tok", &[], Utc::now()).await.unwrap_err();
        assert!(err.is_rate_limit());
    }
}
