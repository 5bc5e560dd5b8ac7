use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, Local};
use clap::{Parser, Subcommand};
use tracing::info;

use playtrack::config::{Config, IdentityConfig};
use playtrack::services::{
    JsonLinesSink, PlaytimeTracker, ReportSettings, Scheduler, SnapshotStore, SteamClient,
};
use playtrack::types::PlaytimeReport;

/// Daily per-game playtime from cumulative Steam snapshots
#[derive(Parser)]
#[command(name = "playtrack")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.playtrack/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh every identity daily until interrupted (default)
    Run,

    /// Run one fetch-and-reconcile cycle now
    Fetch {
        /// Only this Steam id
        #[arg(long)]
        identity: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the report from stored snapshots without fetching
    Report {
        /// Only this Steam id
        #[arg(long)]
        identity: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete snapshots older than the retention window
    Prune {
        /// Days of snapshots to keep, counting back from today
        #[arg(long)]
        keep_days: u32,

        /// Only this Steam id
        #[arg(long)]
        identity: Option<String>,
    },
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        let path = match self.config {
            Some(path) => path,
            None => Config::default_path()?,
        };
        let config = Config::load(&path)?;
        let store = Arc::new(config.store()?);

        match self.command {
            None | Some(Commands::Run) => run_daemon(&config, store),
            Some(Commands::Fetch { identity, json }) => {
                for ident in select(&config, identity.as_deref())? {
                    let today = Local::now().date_naive();
                    let outcome = make_tracker(ident, store.clone()).run_cycle(today);
                    for e in &outcome.errors {
                        eprintln!("{}: {}", ident.steam_id, e);
                    }
                    print_report(&outcome.report, json)?;
                }
                Ok(())
            }
            Some(Commands::Report { identity, json }) => {
                for ident in select(&config, identity.as_deref())? {
                    let today = Local::now().date_naive();
                    let report = make_tracker(ident, store.clone()).cached_report(today);
                    print_report(&report, json)?;
                }
                Ok(())
            }
            Some(Commands::Prune {
                keep_days,
                identity,
            }) => {
                let cutoff = Local::now().date_naive() - Duration::days(i64::from(keep_days));
                for ident in select(&config, identity.as_deref())? {
                    let removed = store
                        .prune(&ident.steam_id, cutoff)
                        .with_context(|| format!("pruning snapshots for {}", ident.steam_id))?;
                    println!(
                        "{}: removed {} snapshot(s) before {}",
                        ident.steam_id, removed, cutoff
                    );
                }
                Ok(())
            }
        }
    }
}

fn select<'a>(
    config: &'a Config,
    identity: Option<&str>,
) -> anyhow::Result<Vec<&'a IdentityConfig>> {
    match identity {
        Some(id) => config
            .identity(id)
            .map(|i| vec![i])
            .with_context(|| format!("identity {} is not configured", id)),
        None => Ok(config.identities.iter().collect()),
    }
}

fn make_tracker(identity: &IdentityConfig, store: Arc<SnapshotStore>) -> PlaytimeTracker {
    PlaytimeTracker::new(
        identity.steam_id.clone(),
        store,
        Arc::new(SteamClient::new(identity.api_key.expose())),
        ReportSettings::from(identity),
    )
}

fn run_daemon(config: &Config, store: Arc<SnapshotStore>) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;

    runtime.block_on(async {
        let sink = Arc::new(JsonLinesSink::new(std::io::stdout()));
        let mut scheduler = Scheduler::new(sink);
        for identity in &config.identities {
            let tracker = Arc::new(make_tracker(identity, store.clone()));
            scheduler.ensure_worker(tracker, identity.update_time.time());
        }
        info!(identities = scheduler.len(), "playtrack running, Ctrl-C to stop");

        tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
        info!("shutting down");
        scheduler.shutdown();
        Ok::<(), anyhow::Error>(())
    })
}

fn print_report(report: &PlaytimeReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Identity {}", report.identity);
    for day in &report.days {
        println!("  {}", day.date.format("%a %Y-%m-%d"));
        if day.entries.is_empty() {
            println!("    (no activity)");
        }
        for entry in &day.entries {
            let name = entry
                .name
                .clone()
                .unwrap_or_else(|| format!("app {}", entry.entity_id));
            println!("    {:>9}  {}", format_minutes(entry.delta_minutes), name);
        }
    }
    println!(
        "  {} day(s) observed, {} game(s) with activity",
        report.stats.unique_days_observed, report.stats.unique_entities_with_change
    );
    Ok(())
}

/// `95` -> `1h 35m`, negatives keep their sign
fn format_minutes(minutes: i64) -> String {
    let sign = if minutes < 0 { "-" } else { "" };
    let abs = minutes.unsigned_abs();
    if abs < 60 {
        format!("{}{}m", sign, abs)
    } else {
        format!("{}{}h {:02}m", sign, abs / 60, abs % 60)
    }
}
