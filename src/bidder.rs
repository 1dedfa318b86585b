//! Bid composition and submission
//!
//! Validates credentials and the dedup guard before any network call,
//! submits the composed payload, and hands the accepted bid to an explicit
//! history-log task. History failure is best-effort: it is logged and
//! observable on the task handle, and never rolls back the bid.

use crate::config::MarketplaceApi;
use crate::db::Database;
use crate::error::BidError;
use crate::ledger::BidLedger;
use crate::marketplace::{BidPayload, MarketplaceClient};
use crate::types::{BidOutcome, BidRecord, Budget, Project, ProjectKind, SubAccountCredential};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Suggested bid amount from the project's pricing model and budget.
/// `None` means the caller must supply a manual amount.
pub fn calculate_bid_amount(kind: ProjectKind, budget: &Budget) -> Option<Decimal> {
    let minimum = budget.minimum?;
    let maximum = budget.maximum?;
    match kind {
        ProjectKind::Hourly => {
            if minimum > dec!(10) {
                Some(minimum)
            } else {
                Some(maximum)
            }
        }
        ProjectKind::Fixed => {
            if minimum >= dec!(30) {
                Some(minimum)
            } else {
                None
            }
        }
    }
}

/// Result of an accepted submission
#[derive(Debug)]
pub struct BidReceipt {
    pub project_id: u64,
    pub amount: Decimal,
    pub period: u32,
    /// Backend response body for the accepted bid
    pub response: serde_json::Value,
    /// History-log task; dropping it detaches, awaiting it observes the
    /// independent best-effort outcome
    pub history: JoinHandle<Result<(), BidError>>,
}

impl BidReceipt {
    pub fn outcome(&self, project: &Project) -> BidOutcome {
        BidOutcome {
            project_id: self.project_id,
            title: project.title.clone(),
            amount: self.amount,
            period: self.period,
            accepted: true,
            message: None,
        }
    }
}

/// Composes and sends bids for one session
pub struct BidSubmitter {
    client: Arc<MarketplaceClient>,
    ledger: Mutex<BidLedger>,
    db: Option<Arc<Database>>,
}

impl BidSubmitter {
    pub fn new(client: Arc<MarketplaceClient>) -> Self {
        Self {
            client,
            ledger: Mutex::new(BidLedger::new()),
            db: None,
        }
    }

    /// Mirror submission attempts into the local bid log
    pub fn with_bid_log(mut self, db: Arc<Database>) -> Self {
        self.db = Some(db);
        self
    }

    /// Whether the dedup guard has seen this project this session
    pub async fn has_bid(&self, project_id: u64) -> bool {
        self.ledger.lock().await.has_bid(project_id)
    }

    /// Submit a bid. Fails before any network call on missing credentials
    /// or a dedup hit; a non-2xx from the bid endpoint is returned as
    /// `BidRejected` and never auto-retried.
    pub async fn submit(
        &self,
        project: &Project,
        amount: Decimal,
        period: u32,
        proposal: &str,
        credential: &SubAccountCredential,
    ) -> Result<BidReceipt, BidError> {
        if credential.token.is_empty() {
            return Err(BidError::Validation { field: "token" });
        }
        let Some(bidder_id) = credential.bidder_id else {
            return Err(BidError::Validation { field: "bidderId" });
        };

        {
            let mut ledger = self.ledger.lock().await;
            if ledger.has_bid(project.id) {
                return Err(BidError::AlreadyBid { project_id: project.id });
            }
            // Marked at attempt time: a rejected bid is never auto-retried,
            // so the guard covers it too
            ledger.record(project.id);
        }

        let payload = BidPayload::compose(project, amount, proposal, credential, bidder_id);

        let result = self.client.submit_bid(&credential.token, &payload).await;

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                let err = match err {
                    // Bid endpoint errors surface as rejections; rate limits
                    // and transport failures keep their own classification
                    BidError::Http { message, .. } => BidError::BidRejected { message },
                    other => other,
                };
                self.log_attempt(project.id, bidder_id, amount, period, false, Some(&err.to_string()))
                    .await;
                return Err(err);
            }
        };

        self.log_attempt(project.id, bidder_id, amount, period, true, None).await;

        info!(
            "Bid accepted: project {} at {} ({}d) - {}",
            project.id,
            amount,
            period,
            project.short_title(50)
        );

        let record = BidRecord {
            project_id: project.id,
            bidder_id,
            amount,
            period,
            description: proposal.to_string(),
            kind: project.kind,
            bidder_type: credential
                .proposal_type
                .clone()
                .unwrap_or_else(|| "standard".to_string()),
            budget: project.budget,
            date: Utc::now(),
            url: MarketplaceApi::project_url(&project.seo_url),
        };
        let history = self.spawn_history_log(credential.token.clone(), record);

        Ok(BidReceipt {
            project_id: project.id,
            amount,
            period,
            response,
            history,
        })
    }

    /// Best-effort local bid log; never affects the submission outcome
    async fn log_attempt(
        &self,
        project_id: u64,
        bidder_id: u64,
        amount: Decimal,
        period: u32,
        accepted: bool,
        message: Option<&str>,
    ) {
        if let Some(db) = &self.db {
            if let Err(e) = db
                .record_bid(project_id, bidder_id, amount, period, accepted, message)
                .await
            {
                warn!("Failed to write local bid log for project {}: {}", project_id, e);
            }
        }
    }

    /// Fire the backend history write as its own task. Failure is logged
    /// and carried on the handle only; the accepted bid stands.
    fn spawn_history_log(
        &self,
        token: String,
        record: BidRecord,
    ) -> JoinHandle<Result<(), BidError>> {
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = client.log_history(&token, &record).await {
                warn!("History log failed for project {}: {}", record.project_id, e);
                return Err(e);
            }
            Ok(())
        })
    }
}
