//! SQLite persistence: feed snapshot cache and local bid log

use crate::types::Project;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;

/// Fixed keys for the persisted feed cache
const KEY_LAST_PROJECTS: &str = "last_projects";
const KEY_LAST_FETCH_TIME: &str = "last_fetch_time";

/// Database connection pool
pub struct Database {
    pool: SqlitePool,
}

/// Aggregates over the local bid log
#[derive(Debug, Clone, Default)]
pub struct BidLogStats {
    pub total: i64,
    pub accepted: i64,
    pub rejected: i64,
}

impl BidLogStats {
    pub fn acceptance_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.accepted as f64 / self.total as f64) * 100.0
        }
    }
}

/// One row of the local bid log
#[derive(Debug, Clone)]
pub struct LoggedBid {
    pub project_id: u64,
    pub bidder_id: u64,
    pub amount: Decimal,
    pub period: u32,
    pub accepted: bool,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Database {
    /// Open (creating if missing) the database at `path`
    pub async fn new(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(path)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        // An in-memory database is per-connection; a pool would see a
        // different empty database on every checkout.
        let max_connections = if path.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.initialize().await?;

        Ok(db)
    }

    /// Initialize database schema
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bids (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL,
                bidder_id INTEGER NOT NULL,
                amount TEXT NOT NULL,
                period INTEGER NOT NULL,
                accepted INTEGER NOT NULL,
                message TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Persist the last successful project set and fetch timestamp
    pub async fn store_snapshot(
        &self,
        projects: &[Project],
        fetched_at: DateTime<Utc>,
    ) -> Result<()> {
        let serialized = serde_json::to_string(projects)?;

        sqlx::query("INSERT OR REPLACE INTO cache (key, value) VALUES (?, ?)")
            .bind(KEY_LAST_PROJECTS)
            .bind(serialized)
            .execute(&self.pool)
            .await?;

        sqlx::query("INSERT OR REPLACE INTO cache (key, value) VALUES (?, ?)")
            .bind(KEY_LAST_FETCH_TIME)
            .bind(fetched_at.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Load the persisted project set and fetch timestamp, if any
    pub async fn load_snapshot(&self) -> Result<Option<(Vec<Project>, DateTime<Utc>)>> {
        let projects: Option<String> = self.cache_value(KEY_LAST_PROJECTS).await?;
        let fetched_at: Option<String> = self.cache_value(KEY_LAST_FETCH_TIME).await?;

        let (Some(projects), Some(fetched_at)) = (projects, fetched_at) else {
            return Ok(None);
        };

        let projects: Vec<Project> =
            serde_json::from_str(&projects).context("Corrupt cached project set")?;
        let fetched_at = DateTime::parse_from_rfc3339(&fetched_at)
            .context("Corrupt cached fetch time")?
            .with_timezone(&Utc);

        Ok(Some((projects, fetched_at)))
    }

    async fn cache_value(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM cache WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    /// Record a submission attempt in the local bid log
    pub async fn record_bid(
        &self,
        project_id: u64,
        bidder_id: u64,
        amount: Decimal,
        period: u32,
        accepted: bool,
        message: Option<&str>,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO bids (project_id, bidder_id, amount, period, accepted, message, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(project_id as i64)
        .bind(bidder_id as i64)
        .bind(amount.to_string())
        .bind(period as i64)
        .bind(accepted as i64)
        .bind(message)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Aggregate counts over the bid log
    pub async fn stats(&self) -> Result<BidLogStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(accepted), 0) AS accepted
            FROM bids
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let total: i64 = row.get("total");
        let accepted: i64 = row.get("accepted");

        Ok(BidLogStats {
            total,
            accepted,
            rejected: total - accepted,
        })
    }

    /// Most recent bids, newest first
    pub async fn recent_bids(&self, limit: i64) -> Result<Vec<LoggedBid>> {
        let rows = sqlx::query(
            r#"
            SELECT project_id, bidder_id, amount, period, accepted, message, created_at
            FROM bids ORDER BY id DESC LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let amount: String = row.get("amount");
                let created_at: String = row.get("created_at");
                Ok(LoggedBid {
                    project_id: row.get::<i64, _>("project_id") as u64,
                    bidder_id: row.get::<i64, _>("bidder_id") as u64,
                    amount: Decimal::from_str(&amount).context("Corrupt bid amount")?,
                    period: row.get::<i64, _>("period") as u32,
                    accepted: row.get::<i64, _>("accepted") != 0,
                    message: row.get("message"),
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .context("Corrupt bid timestamp")?
                        .with_timezone(&Utc),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Budget, ProjectKind, Upgrades};
    use rust_decimal_macros::dec;

    fn sample_project(id: u64) -> Project {
        Project {
            id,
            title: format!("Project {id}"),
            description: String::new(),
            seo_url: format!("misc/project-{id}"),
            kind: ProjectKind::Fixed,
            budget: Budget { minimum: Some(dec!(100)), maximum: Some(dec!(300)) },
            currency_code: "USD".to_string(),
            owner_country: Some("Canada".to_string()),
            upgrades: Upgrades::default(),
            submit_time: None,
            local: false,
        }
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        assert!(db.load_snapshot().await.unwrap().is_none());

        let fetched_at = Utc::now();
        db.store_snapshot(&[sample_project(1), sample_project(2)], fetched_at)
            .await
            .unwrap();

        let (projects, loaded_at) = db.load_snapshot().await.unwrap().unwrap();
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[0].id, 1);
        assert_eq!(loaded_at.timestamp(), fetched_at.timestamp());

        // Fixed keys overwrite, not accumulate
        db.store_snapshot(&[sample_project(3)], Utc::now()).await.unwrap();
        let (projects, _) = db.load_snapshot().await.unwrap().unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].id, 3);
    }

    #[tokio::test]
    async fn test_bid_log_and_stats() {
        let db = Database::new("sqlite::memory:").await.unwrap();

        db.record_bid(101, 7, dec!(250), 7, true, None).await.unwrap();
        db.record_bid(102, 7, dec!(80), 5, false, Some("duplicate bid"))
            .await
            .unwrap();

        let stats = db.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.rejected, 1);
        assert!((stats.acceptance_rate() - 50.0).abs() < f64::EPSILON);

        let recent = db.recent_bids(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].project_id, 102);
        assert_eq!(recent[0].message.as_deref(), Some("duplicate bid"));
        assert_eq!(recent[1].amount, dec!(250));
    }
}
