//! Scheduled refresh trigger for the Kindle dashboard.
//!
//! Every 30 minutes the rendering service is asked for a new dashboard
//! PNG. The request itself is what makes the service re-render; this
//! binary only checks that a PNG came back and logs how long it took.
//!
//! Modes:
//! - `run`       one invocation now, result JSON on stdout
//! - `serve`     built-in scheduler loop on the cron pattern
//! - `upcoming`  list the next scheduled runs
//! - `show-config` print the effective trigger definition

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

mod client;
mod config;
mod job;
mod runner;
mod schedule;

use client::HttpDashboardClient;
use config::{Config, TriggerConfig};
use runner::{RunOutcome, Runner};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Trigger definition (YAML). Defaults to the per-user config file, if any.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Dashboard URL; overrides DASHBOARD_URL.
    #[arg(long, global = true)]
    url: Option<String>,
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh the dashboard once, now.
    Run,
    /// Refresh on every cron slot until stopped.
    Serve,
    /// Print the next scheduled run times.
    Upcoming {
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
    /// Print the effective trigger definition as YAML.
    ShowConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; deployments inject the environment directly.
    dotenv::dotenv().ok();

    let args = Args::parse();
    let trigger = TriggerConfig::discover(args.config.as_deref())
        .context("Failed to load trigger definition")?;

    init_tracing(args.log_format, trigger.log_level.as_filter());

    let mut config = Config::from_env();
    if let Some(url) = args.url.as_deref() {
        config.dashboard_url = config::resolve_dashboard_url(Some(url));
    }

    let pattern = trigger
        .cron_pattern()
        .context("Invalid cron pattern in trigger definition")?;

    match args.command {
        Command::ShowConfig => {
            print!("{}", serde_yaml::to_string(&trigger)?);
            Ok(())
        }
        Command::Upcoming { count } => {
            for t in pattern.upcoming(Utc::now(), count) {
                println!("{}", job::iso_timestamp(t));
            }
            Ok(())
        }
        Command::Run => {
            let runner = build_runner(&config, &trigger, pattern);
            match runner.run_invocation(Utc::now()).await {
                RunOutcome::Succeeded(result) => {
                    println!("{}", serde_json::to_string(&result)?);
                    Ok(())
                }
                RunOutcome::Failed(msg) => anyhow::bail!("Dashboard refresh failed: {}", msg),
                RunOutcome::TimedOut => anyhow::bail!(
                    "Dashboard refresh exceeded {}s",
                    trigger.max_duration_secs
                ),
            }
        }
        Command::Serve => {
            info!("🖼️ Kindle Dash trigger v{}", env!("CARGO_PKG_VERSION"));
            info!(
                id = %trigger.id,
                cron = %trigger.cron.pattern,
                timezone = %trigger.cron.timezone,
                machine = ?trigger.machine.preset,
                "Trigger definition loaded"
            );
            let runner = build_runner(&config, &trigger, pattern);

            tokio::select! {
                _ = runner.run_forever() => {}
                res = tokio::signal::ctrl_c() => {
                    if let Err(e) = res {
                        error!("Failed to listen for shutdown signal: {}", e);
                    }
                    info!("Shutting down");
                }
            }
            Ok(())
        }
    }
}

fn build_runner(config: &Config, trigger: &TriggerConfig, pattern: schedule::CronPattern) -> Runner {
    Runner::new(
        Arc::new(HttpDashboardClient::new()),
        config.dashboard_url.clone(),
        pattern,
        trigger.max_duration(),
    )
}

/// `RUST_LOG` wins; otherwise the trigger's log level for this crate.
fn init_tracing(format: LogFormat, level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("kindle_dash_trigger={}", level).into());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
