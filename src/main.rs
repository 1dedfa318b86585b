//! Marketplace Auto-Bidder CLI

use anyhow::{anyhow, Context, Result};
use bidbot::accounts::roster_from_config;
use bidbot::bidder::calculate_bid_amount;
use bidbot::poller::TickOutcome;
use bidbot::{
    AccountStore, BidError, BidOutcome, BidSubmitter, Config, Database, MarketplaceClient,
    Notifier, Poller, Project,
};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "bidbot")]
#[command(about = "Automated bidding bot for freelance marketplace sub-accounts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run continuous discovery and auto-bidding
    Run {
        /// Poll interval in seconds
        #[arg(short, long, default_value = "60")]
        interval: u64,
    },

    /// Fetch and print the current filtered project feed once
    Scan {
        /// Maximum number of projects to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Submit a bid for a project from the cached feed
    Bid {
        /// Project id (must be present in the last fetched feed)
        project_id: u64,

        /// Bid amount; defaults to the suggested amount when derivable
        #[arg(short, long)]
        amount: Option<Decimal>,

        /// Delivery period in days
        #[arg(short, long)]
        period: Option<u32>,

        /// Sub-account key to bid with (defaults to the active account)
        #[arg(long)]
        account: Option<String>,
    },

    /// Show local bid log statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    // Load configuration
    let config = Config::from_env()?;

    match cli.command {
        Commands::Run { interval } => run_bot(&config, interval).await?,
        Commands::Scan { limit } => scan_projects(&config, limit).await?,
        Commands::Bid { project_id, amount, period, account } => {
            manual_bid(&config, project_id, amount, period, account.as_deref()).await?
        }
        Commands::Stats => show_stats(&config).await?,
    }

    Ok(())
}

fn hydrated_store(config: &Config) -> Result<AccountStore> {
    let roster = roster_from_config(config)?;
    let store = AccountStore::new();
    store.hydrate(roster);
    Ok(store)
}

async fn run_bot(config: &Config, interval: u64) -> Result<()> {
    println!("\n{}", "=".repeat(70));
    println!("  CONTINUOUS MODE");
    println!(
        "  Interval: {}s | Fast refresh: {}",
        interval,
        config
            .fast_refresh_seconds
            .map(|s| format!("{s}s"))
            .unwrap_or_else(|| "off".to_string())
    );
    if config.webhook_url.is_some() {
        println!("  Outcome webhook: ENABLED");
    }
    println!("{}\n", "=".repeat(70));

    let db = Arc::new(Database::new(&config.database_path).await?);
    let client = Arc::new(MarketplaceClient::new(config));
    let store = hydrated_store(config)?;
    let notifier = Notifier::new(config.webhook_url.clone());

    let submitter = Arc::new(BidSubmitter::new(client.clone()).with_bid_log(db.clone()));
    let (poller, mut feed_rx) = Poller::new(client, store.resolver(), Some(db));

    let refresh = Arc::new(Notify::new());
    let poller_task = tokio::spawn(
        poller.run(refresh.clone(), Duration::from_secs(interval)),
    );

    // Optional externally-triggered fast refresh
    let refresh_task = config.fast_refresh_seconds.map(|secs| {
        let refresh = refresh.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(secs));
            ticker.tick().await; // skip the immediate first tick
            loop {
                ticker.tick().await;
                refresh.notify_one();
            }
        })
    });

    let mut resolver = store.resolver();

    info!("Auto-bid loop started (Ctrl+C to stop)");

    while feed_rx.changed().await.is_ok() {
        let projects: Vec<Project> = feed_rx.borrow_and_update().clone();
        if projects.is_empty() {
            continue;
        }

        let credential = match resolver.resolve(None).await {
            Ok(credential) => credential,
            Err(e) => {
                error!("Cannot auto-bid: {}", e);
                continue;
            }
        };

        if !credential.autobid_enabled {
            debug!("Auto-bid disabled for '{}'", credential.key);
            continue;
        }

        for project in &projects {
            if let Some(kind) = credential.job_type_filter {
                if project.kind != kind {
                    continue;
                }
            }
            if submitter.has_bid(project.id).await {
                continue;
            }

            let Some(amount) = calculate_bid_amount(project.kind, &project.budget) else {
                debug!(
                    "Skipping {}: manual amount required ({} budget)",
                    project.id, project.kind
                );
                continue;
            };

            let period = config.bid_period_days;
            match submitter
                .submit(project, amount, period, &credential.proposal, &credential)
                .await
            {
                Ok(receipt) => {
                    notifier.notify(&receipt.outcome(project)).await;
                    // Detached on purpose; failure is logged by the task
                    drop(receipt.history);
                }
                Err(BidError::AlreadyBid { .. }) => {}
                Err(e) => {
                    error!("Auto-bid failed for project {}: {}", project.id, e);
                    notifier
                        .notify(&BidOutcome {
                            project_id: project.id,
                            title: project.title.clone(),
                            amount,
                            period,
                            accepted: false,
                            message: Some(e.to_string()),
                        })
                        .await;
                }
            }
        }
    }

    poller_task.abort();
    if let Some(task) = refresh_task {
        task.abort();
    }

    Ok(())
}

async fn scan_projects(config: &Config, limit: usize) -> Result<()> {
    println!("\n{}", "=".repeat(70));
    println!("  PROJECT SCANNER");
    println!("{}\n", "=".repeat(70));

    let db = Arc::new(Database::new(&config.database_path).await?);
    let client = Arc::new(MarketplaceClient::new(config));
    let store = hydrated_store(config)?;
    let (poller, _feed_rx) = Poller::new(client, store.resolver(), Some(db));

    println!("Fetching matching projects...\n");
    match poller.tick().await {
        TickOutcome::Published(projects) => {
            print_projects(&projects, limit);
        }
        TickOutcome::Cooldown { .. } => {
            println!("{}", "Rate limited; try again after the cooldown.".yellow());
        }
        TickOutcome::InFlight => unreachable!("single tick cannot overlap itself"),
        TickOutcome::Failed(e) => return Err(anyhow!(e)).context("Discovery failed"),
    }

    Ok(())
}

fn print_projects(projects: &[Project], limit: usize) {
    if projects.is_empty() {
        println!("No matching projects right now.\n");
        return;
    }

    println!("FILTERED FEED ({} projects)", projects.len());
    println!("{}", "-".repeat(70));

    for (i, project) in projects.iter().take(limit).enumerate() {
        let budget = match (project.budget.minimum, project.budget.maximum) {
            (Some(min), Some(max)) => format!("{min}-{max} {}", project.currency_code),
            _ => format!("? {}", project.currency_code),
        };
        let suggested = calculate_bid_amount(project.kind, &project.budget)
            .map(|a| format!("suggest {a}").green().to_string())
            .unwrap_or_else(|| "manual amount".yellow().to_string());

        println!("\n{}. \"{}\"", i + 1, project.short_title(60).bold());
        println!(
            "   #{} | {} | {} | {}",
            project.id,
            project.kind,
            budget,
            suggested
        );
        if let Some(country) = &project.owner_country {
            println!("   Owner: {}", country);
        }
    }

    if projects.len() > limit {
        println!("\n   ... and {} more", projects.len() - limit);
    }

    println!();
}

async fn manual_bid(
    config: &Config,
    project_id: u64,
    amount: Option<Decimal>,
    period: Option<u32>,
    account: Option<&str>,
) -> Result<()> {
    let db = Arc::new(Database::new(&config.database_path).await?);
    let client = Arc::new(MarketplaceClient::new(config));
    let store = hydrated_store(config)?;
    let notifier = Notifier::new(config.webhook_url.clone());

    let mut resolver = store.resolver();
    let credential = resolver.resolve(account).await?;

    let (projects, fetched_at) = db
        .load_snapshot()
        .await?
        .context("No cached feed; run `bidbot scan` first")?;
    let project = projects
        .iter()
        .find(|p| p.id == project_id)
        .with_context(|| {
            format!("Project {project_id} not in the cached feed (fetched {fetched_at})")
        })?;

    let amount = amount
        .or_else(|| calculate_bid_amount(project.kind, &project.budget))
        .context("No suggested amount for this budget; pass --amount")?;
    let period = period.unwrap_or(config.bid_period_days);

    let submitter = BidSubmitter::new(client).with_bid_log(db);
    match submitter
        .submit(project, amount, period, &credential.proposal, &credential)
        .await
    {
        Ok(receipt) => {
            println!(
                "{} project {} at {} ({}d)",
                "Bid accepted:".green().bold(),
                receipt.project_id,
                receipt.amount,
                receipt.period
            );
            notifier.notify(&receipt.outcome(project)).await;
            // Let the history write finish before the process exits
            let _ = receipt.history.await;
        }
        Err(e) => {
            println!("{} {}", "Bid failed:".red().bold(), e);
            notifier
                .notify(&BidOutcome {
                    project_id,
                    title: project.title.clone(),
                    amount,
                    period,
                    accepted: false,
                    message: Some(e.to_string()),
                })
                .await;
            return Err(anyhow!("bid not accepted"));
        }
    }

    Ok(())
}

async fn show_stats(config: &Config) -> Result<()> {
    let db = Database::new(&config.database_path).await?;
    let stats = db.stats().await?;

    println!("\n{}", "=".repeat(70));
    println!("  BID STATISTICS");
    println!("{}\n", "=".repeat(70));

    println!("  Total bids:      {}", stats.total);
    println!("  Accepted:        {}", stats.accepted);
    println!("  Rejected:        {}", stats.rejected);
    println!("  Acceptance rate: {:.1}%", stats.acceptance_rate());

    let recent = db.recent_bids(10).await?;
    if !recent.is_empty() {
        println!("\nRecent bids:");
        for bid in recent {
            let mark = if bid.accepted {
                "ok".green()
            } else {
                "fail".red()
            };
            println!(
                "  [{}] project {} at {} ({}d) {} {}",
                mark,
                bid.project_id,
                bid.amount,
                bid.period,
                bid.created_at.format("%Y-%m-%d %H:%M"),
                bid.message.unwrap_or_default()
            );
        }
    }

    println!();
    Ok(())
}
