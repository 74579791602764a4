//! eip-insights
//!
//! Command-line front end over the analytics service. Every view prints JSON.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use eip_insights::aggregation::MonthRange;
use eip_insights::config::AppConfig;
use eip_insights::database::models::{ContributorRole, ProposalKey, Repository};
use eip_insights::database::Database;
use eip_insights::filters::{parse_as_of, RawFilter, ViewFilter};
use eip_insights::AnalyticsService;

#[derive(Parser)]
#[command(name = "eip-insights")]
#[command(about = "Governance analytics over EIP/ERC/RIP lifecycle events")]
struct Cli {
    /// Configuration file (YAML or TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct FilterArgs {
    /// eips, ercs, rips or all
    #[arg(long)]
    repo: Option<String>,

    /// Window start (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    from: Option<String>,

    /// Window end; a bare date includes that day
    #[arg(long)]
    to: Option<String>,

    #[arg(long)]
    limit: Option<String>,

    #[arg(long)]
    sort_by: Option<String>,

    /// asc or desc
    #[arg(long)]
    sort_dir: Option<String>,
}

impl FilterArgs {
    fn validate(self) -> Result<ViewFilter> {
        let raw = RawFilter {
            repo: self.repo,
            from: self.from,
            to: self.to,
            limit: self.limit,
            sort_by: self.sort_by,
            sort_dir: self.sort_dir,
        };
        Ok(ViewFilter::try_from(raw)?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update the event store schema
    Migrate,
    /// Proposal counts per lifecycle stage
    Funnel {
        #[command(flatten)]
        filter: FilterArgs,
        /// Reconstruct counts from the log as of this date
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Status counts with month-over-month delta
    Snapshot {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Category x status matrix
    Crosstab {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Median days between lifecycle stages
    Velocity {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Pull request time to merge/close and first-response time
    Decisions {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Proposals with the most recent activity
    Trending {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Open pull requests by bottleneck category
    Bottlenecks {
        #[command(flatten)]
        filter: FilterArgs,
        /// Print per-category counts instead of individual pull requests
        #[arg(long)]
        breakdown: bool,
    },
    /// Open pull requests by governance state and waiting time
    Waiting {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        as_of: Option<String>,
        /// Print the state x bucket heatmap
        #[arg(long)]
        heatmap: bool,
    },
    /// Contributor rankings
    Leaderboard {
        #[command(flatten)]
        filter: FilterArgs,
        /// EDITOR, REVIEWER or CONTRIBUTOR
        #[arg(long)]
        role: Option<String>,
    },
    /// Status changes per month
    Momentum {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, default_value = "12")]
        months: u32,
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Pull request throughput and contributor activity per month
    Timeline {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, default_value = "12")]
        months: u32,
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Full history of one proposal
    Proposal {
        /// eips, ercs or rips
        repo: String,
        number: i64,
    },
    /// Proposals grouped by bucket for one network upgrade
    Upgrade {
        slug: String,
        #[arg(long)]
        as_of: Option<String>,
    },
    /// requires / required_by adjacency
    Dependencies {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Combined governance dashboard
    Dashboard {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        as_of: Option<String>,
    },
}

fn as_of_or_now(raw: Option<&str>) -> Result<DateTime<Utc>> {
    match raw {
        Some(raw) => Ok(parse_as_of(raw)?),
        None => Ok(Utc::now()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_filter.clone().into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let database = Database::new(&config.database_url, config.max_connections)
        .await
        .with_context(|| format!("Failed to open {}", config.database_url))?;

    if let Commands::Migrate = cli.command {
        database.run_migrations().await?;
        info!("Event store schema applied");
        return Ok(());
    }

    let service = AnalyticsService::from_config(&database, config)?;

    match cli.command {
        Commands::Migrate => {}
        Commands::Funnel { filter, as_of } => {
            let filter = filter.validate()?;
            match as_of {
                Some(raw) => print_json(&service.status_counts_as_of(&filter, parse_as_of(&raw)?).await?)?,
                None => print_json(&service.funnel(&filter).await?)?,
            }
        }
        Commands::Snapshot { filter, as_of } => {
            let filter = filter.validate()?;
            let as_of = as_of_or_now(as_of.as_deref())?;
            print_json(&service.status_snapshot(&filter, as_of).await?)?;
        }
        Commands::Crosstab { filter } => {
            print_json(&service.category_status_matrix(&filter.validate()?).await?)?;
        }
        Commands::Velocity { filter } => {
            print_json(&service.decision_velocity(&filter.validate()?).await?)?;
        }
        Commands::Decisions { filter } => {
            let filter = filter.validate()?;
            let (outcomes, response) = tokio::try_join!(
                service.time_to_decision(&filter),
                service.median_response(&filter),
            )?;
            print_json(&serde_json::json!({
                "time_to_decision": outcomes,
                "median_response": response,
            }))?;
        }
        Commands::Trending { filter, as_of } => {
            let filter = filter.validate()?;
            let as_of = as_of_or_now(as_of.as_deref())?;
            print_json(&service.trending(&filter, as_of).await?)?;
        }
        Commands::Bottlenecks { filter, breakdown } => {
            let filter = filter.validate()?;
            if breakdown {
                print_json(&service.bottleneck_breakdown(&filter).await?)?;
            } else {
                print_json(&service.bottlenecks(&filter).await?)?;
            }
        }
        Commands::Waiting { filter, as_of, heatmap } => {
            let filter = filter.validate()?;
            let as_of = as_of_or_now(as_of.as_deref())?;
            if heatmap {
                print_json(&service.waiting_heatmap(&filter, as_of).await?)?;
            } else {
                print_json(&service.waiting(&filter, as_of).await?)?;
            }
        }
        Commands::Leaderboard { filter, role } => {
            let filter = filter.validate()?;
            let role = role.as_deref().map(str::parse::<ContributorRole>).transpose()?;
            print_json(&service.leaderboard(&filter, role).await?)?;
        }
        Commands::Momentum { filter, months, as_of } => {
            let filter = filter.validate()?;
            let range = MonthRange::trailing(as_of_or_now(as_of.as_deref())?, months)?;
            print_json(&service.momentum(&filter, range).await?)?;
        }
        Commands::Timeline { filter, months, as_of } => {
            let filter = filter.validate()?;
            let range = MonthRange::trailing(as_of_or_now(as_of.as_deref())?, months)?;
            let (throughput, activity) = tokio::try_join!(
                service.monthly_throughput(&filter, range),
                service.activity_timeline(&filter, range),
            )?;
            print_json(&serde_json::json!({
                "throughput": throughput,
                "activity": activity,
            }))?;
        }
        Commands::Proposal { repo, number } => {
            let key = ProposalKey::new(repo.parse::<Repository>()?, number);
            print_json(&service.proposal_overview(key).await?)?;
        }
        Commands::Upgrade { slug, as_of } => {
            let as_of = as_of.as_deref().map(parse_as_of).transpose()?;
            print_json(&service.upgrade_composition(&slug, as_of).await?)?;
        }
        Commands::Dependencies { filter } => {
            print_json(&service.dependency_graph(&filter.validate()?).await?)?;
        }
        Commands::Dashboard { filter, as_of } => {
            let filter = filter.validate()?;
            let as_of = as_of_or_now(as_of.as_deref())?;
            print_json(&service.governance_dashboard(&filter, as_of).await?)?;
        }
    }

    Ok(())
}
