use std::fmt::Write as _;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use salewatch_core::{Fixture, Tz};
use salewatch_storage::FixtureStore;
use salewatch_sync::{open_store, RunOutcome, SyncConfig, SyncPipeline};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "salewatch")]
#[command(about = "Watch a club's ticket sale windows and mail calendar updates")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch, sync and mail once.
    Run,
    /// Run on every SYNC_CRON tick until interrupted.
    Watch,
    /// Create the store tables if they are missing.
    Setup,
    /// Drop the store tables.
    Teardown,
    /// Clear stored fingerprints and backups.
    Reset,
    /// Print parsed fixtures and their active sales.
    List {
        #[arg(long)]
        by_sale_date: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = SyncConfig::from_env();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let pipeline = SyncPipeline::from_config(config).await?;
            let summary = pipeline.run_and_report().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            if summary.outcome == RunOutcome::MailFailed {
                return Ok(ExitCode::from(2));
            }
        }
        Commands::Watch => {
            let config = SyncConfig {
                scheduler_enabled: true,
                ..config
            };
            let pipeline = Arc::new(SyncPipeline::from_config(config).await?);
            let Some(mut sched) = pipeline.maybe_build_scheduler().await? else {
                bail!("scheduler could not be built");
            };
            sched.start().await.context("starting scheduler")?;
            info!(cron = %pipeline.config().sync_cron, "watching for ticket sale changes");
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            info!("shutting down");
            sched.shutdown().await.context("stopping scheduler")?;
        }
        Commands::Setup => {
            required_store(&config).await?.create_tables_if_absent().await?;
            info!("store tables ready");
        }
        Commands::Teardown => {
            required_store(&config).await?.drop_tables().await?;
            info!("store tables dropped");
        }
        Commands::Reset => {
            required_store(&config).await?.reset().await?;
            info!("store cleared");
        }
        Commands::List { by_sale_date } => {
            let home_tz = config.home_tz;
            let pipeline = SyncPipeline::from_config(config).await?;
            let (list, details_ok) = pipeline.fetch_fixtures().await?;
            for fixture in list.fixtures(by_sale_date) {
                print!("{}", render_fixture(fixture, home_tz));
            }
            if !details_ok {
                return Ok(ExitCode::from(2));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn required_store(config: &SyncConfig) -> Result<Arc<dyn FixtureStore>> {
    open_store(&config.store)
        .await?
        .context("no fixture store configured; set DATABASE_URL or SALEWATCH_STORE")
}

fn render_fixture(fixture: &Fixture, home_tz: Tz) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", fixture.match_label());
    for sale in fixture.active_sales() {
        let when = sale
            .date
            .map(|d| d.with_timezone(&home_tz).format("%a %-d %b %Y %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(out, "  {when}  {}", sale.name());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use salewatch_core::{Sale, SaleStatus, Venue, DEFAULT_HOME_TZ};

    #[test]
    fn run_is_the_default_command() {
        let cli = Cli::try_parse_from(["salewatch"]).unwrap();
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["salewatch", "list", "--by-sale-date"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::List { by_sale_date: true })));
    }

    #[test]
    fn fixtures_render_with_active_sales_in_home_time() {
        let kickoff = DEFAULT_HOME_TZ
            .with_ymd_and_hms(2024, 10, 20, 16, 30, 0)
            .single()
            .unwrap();
        let mut fixture = Fixture::new("/x", "Chelsea", Venue::Home, "Premier League", kickoff);
        let date = Utc.with_ymd_and_hms(2024, 10, 15, 7, 15, 0).single().unwrap();
        fixture.push_sale(Sale::new(
            fixture.describe_sale("Members Sale (13+)"),
            SaleStatus::Pending,
            Some(date),
        ));

        let out = render_fixture(&fixture, DEFAULT_HOME_TZ);
        assert_eq!(
            out,
            "Chelsea (H) : Premier League 2024/25\n  Tue 15 Oct 2024 08:15  Members Sale (13+)\n"
        );
    }

    #[tokio::test]
    async fn store_commands_need_a_store() {
        let config = SyncConfig::from_lookup(|_| None);
        let err = required_store(&config).await.err().unwrap();
        assert!(err.to_string().contains("no fixture store configured"));
    }
}
