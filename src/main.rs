use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use dump_manager::config::{self, Config};
use dump_manager::managers::coordinator::{self, select_sites, RunCoordinator, RunMode};
use dump_manager::managers::logging::{self, LoggingConfig};
use dump_manager::managers::notification::{format_bytes, DiscordNotifier, Notifier};
use dump_manager::managers::pipeline::{BackupPipeline, PipelineSettings};
use dump_manager::managers::retention;
use dump_manager::managers::status::{Digest, Outcome, StatusRecorder};
use dump_manager::utils::locker;
use dump_manager::utils::DockerDataSource;
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dump-manager")]
#[command(about = "Database dump backups for containerised sites", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/dump-manager/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up every enabled site, or a subset
    Run {
        /// Only sites whose container name contains this text
        #[arg(short, long, conflicts_with = "smoke_test")]
        site: Option<String>,

        /// Only the first enabled site
        #[arg(long)]
        smoke_test: bool,
    },

    /// Show which stored dumps the retention policy keeps or deletes
    Retention {
        /// Only sites whose container name contains this text
        #[arg(short, long)]
        site: Option<String>,

        /// Evaluate as if today were this date (YYYY-MM-DD)
        #[arg(long)]
        today: Option<NaiveDate>,

        /// Delete the dumps the policy drops
        #[arg(long)]
        apply: bool,
    },

    /// Show recent outcomes from the status ledger
    Status {
        /// Number of days to show, including today
        #[arg(short, long, default_value_t = 7)]
        days: u32,
    },

    /// Send a digest of recent outcomes
    Digest {
        /// Window in days (defaults to notifications.digest_days)
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// List configured sites in processing order
    List,

    /// Validate configuration file
    Validate,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Commands that only read the config log to the console
    if matches!(cli.command, Commands::Validate | Commands::List) {
        logging::init_console_logging();
        let config = config::load_config(&cli.config)?;
        return match cli.command {
            Commands::Validate => handle_validate(&config),
            _ => handle_list(&config),
        };
    }

    let config = config::load_config(&cli.config)?;

    // Setup logging with file rotation (must keep guard alive)
    let _log_guard = logging::init_logging(&LoggingConfig::from_global(&config.global))?;

    let today = Local::now().date_naive();

    match cli.command {
        Commands::Run { site, smoke_test } => {
            let mode = match (site, smoke_test) {
                (_, true) => RunMode::Smoke,
                (Some(name), false) => RunMode::Named(name),
                (None, false) => RunMode::All,
            };
            handle_run(&config, &mode, today)
        }
        Commands::Retention { site, today: as_of, apply } => {
            let mode = site.map(RunMode::Named).unwrap_or(RunMode::All);
            handle_retention(&config, &mode, as_of.unwrap_or(today), apply)
        }
        Commands::Status { days } => handle_status(&config, today, days),
        Commands::Digest { days } => {
            handle_digest(&config, today, days.unwrap_or(config.notifications.digest_days))
        }
        Commands::Validate | Commands::List => unreachable!("handled before logging setup"),
    }
}

fn build_notifier(config: &Config) -> Option<DiscordNotifier> {
    if config.notifications.discord_webhook_url.is_empty() {
        None
    } else {
        Some(DiscordNotifier::new(config.notifications.clone()))
    }
}

fn handle_run(config: &Config, mode: &RunMode, today: NaiveDate) -> Result<()> {
    let sites = config::resolve_sites(config);
    let source = DockerDataSource::new();
    let store = dump_manager::build_store(config)?;
    let recorder = StatusRecorder::new(config.global.status_path());
    let notifier = build_notifier(config);

    let pipeline = BackupPipeline::new(
        &source,
        store.as_ref(),
        &recorder,
        PipelineSettings::from_global(&config.global),
    );

    let mut coordinator = RunCoordinator::new(
        pipeline,
        notifier.as_ref().map(|n| n as &dyn Notifier),
        locker::lock_path(&config.global.work_dir),
    );
    if config.notifications.digest_after_run {
        coordinator = coordinator.with_digest(config.notifications.digest_days);
    }

    let summary = coordinator.run(&sites, mode, today)?;

    println!("=== Backup Run: {} ===\n", today);
    for report in &summary.reports {
        match &report.error {
            None => println!(
                "✓ {:<20} {:>10}  {}",
                report.site_id,
                format_bytes(report.byte_size),
                report.key.as_deref().unwrap_or("")
            ),
            Some(e) => println!("✗ {:<20} {}", report.site_id, e),
        }
        if let Some(ref retention) = report.retention {
            println!(
                "    retention: kept {}, deleted {}, delete failures {}, unparseable {}",
                retention.kept,
                retention.deleted.len(),
                retention.delete_failures(),
                retention.unparseable()
            );
        }
    }

    println!();
    println!("Total: {}", summary.total);
    println!("Succeeded: {}", summary.succeeded);
    println!("Failed: {}", summary.failed);

    if !summary.is_success() {
        bail!(
            "Backup failed for {} site(s): {}",
            summary.failed,
            summary.failed_sites().join(", ")
        );
    }

    Ok(())
}

fn handle_retention(config: &Config, mode: &RunMode, today: NaiveDate, apply: bool) -> Result<()> {
    let sites = config::resolve_sites(config);
    let selected = select_sites(&sites, mode)?;
    let store = dump_manager::build_store(config)?;

    println!("=== Retention as of {} ===\n", today);

    let mut seen = HashSet::new();
    for site in selected {
        // Sites may share a bucket; each bucket is evaluated once
        if !seen.insert(site.store_ref.clone()) {
            continue;
        }

        println!("Bucket: {} (site '{}')", site.store_ref, site.id);

        if apply {
            let report = locker::with_run_lock(&locker::lock_path(&config.global.work_dir), || {
                retention::apply_retention(store.as_ref(), &site.store_ref, today)
            })?;

            if let Some(ref e) = report.listing_error {
                eprintln!("  ✗ Listing failed: {}", e);
            }
            for key in &report.deleted {
                println!("  - deleted  {}", key);
            }
            for anomaly in &report.anomalies {
                eprintln!("  ⚠ {}", anomaly);
            }
            println!(
                "  Kept {}, deleted {}, anomalies {}\n",
                report.kept,
                report.deleted.len(),
                report.anomalies.len()
            );
            continue;
        }

        let objects = store
            .list(&site.store_ref, retention::KEY_PREFIX)
            .with_context(|| format!("Failed to list bucket '{}'", site.store_ref))?;
        let plan = retention::plan(objects.into_iter().map(|o| o.key), today);

        for (key, tier) in &plan.keep {
            println!("  + {:<8} {}", tier.to_string(), key);
        }
        for key in &plan.delete {
            println!("  - delete   {}", key);
        }
        for key in &plan.unparseable {
            println!("  ? skip     {}", key);
        }
        println!(
            "  Keep {}, delete {}, unparseable {}\n",
            plan.keep.len(),
            plan.delete.len(),
            plan.unparseable.len()
        );
    }

    if !apply {
        println!("Dry run. Use --apply to delete.");
    }

    Ok(())
}

fn handle_status(config: &Config, today: NaiveDate, days: u32) -> Result<()> {
    let recorder = StatusRecorder::new(config.global.status_path());
    let since = coordinator::digest_since(today, days);
    let records = recorder.query(since)?;

    println!("=== Status since {} ===\n", since);

    if records.is_empty() {
        println!("No runs recorded.");
        return Ok(());
    }

    for record in &records {
        match record.outcome {
            Outcome::Success => println!(
                "{}  ✓ {:<20} {}",
                record.date,
                record.site_id,
                format_bytes(record.byte_size)
            ),
            Outcome::Failure => println!(
                "{}  ✗ {:<20} {}",
                record.date, record.site_id, record.error_text
            ),
        }
    }

    Ok(())
}

fn handle_digest(config: &Config, today: NaiveDate, days: u32) -> Result<()> {
    let recorder = StatusRecorder::new(config.global.status_path());

    let digest = match build_notifier(config) {
        Some(notifier) => coordinator::send_digest(&recorder, &notifier, today, days)?,
        None => {
            let since = coordinator::digest_since(today, days);
            println!("No webhook configured; printing digest only.\n");
            Digest::from_records(&recorder.query(since)?, since)
        }
    };

    println!("=== Digest since {} ===", digest.since);
    println!("Runs: {}", digest.total);
    println!("Succeeded: {}", digest.succeeded);
    println!("Failed: {}", digest.failed);
    println!("Uploaded: {}", format_bytes(digest.bytes_uploaded));
    for failure in &digest.failures {
        println!("  ✗ {} {}: {}", failure.date, failure.site_id, failure.error_text);
    }

    Ok(())
}

fn handle_list(config: &Config) -> Result<()> {
    println!("=== Configured Sites ===\n");

    for site in &config.sites {
        let status = if site.enabled { "✓" } else { "✗" };
        println!("{} {}", status, site.name);
        println!("  Container: {}", site.container);
        println!("  Bucket: {}", site.bucket);
        println!("  Engine: {}", site.engine);
        println!(
            "  Timeout: {}s",
            site.timeout_seconds
                .unwrap_or(config.global.default_timeout_seconds)
        );
        println!();
    }

    Ok(())
}

fn handle_validate(config: &Config) -> Result<()> {
    let enabled = config.sites.iter().filter(|s| s.enabled).count();

    println!("Configuration is valid!");
    println!("Sites: {} ({} enabled)", config.sites.len(), enabled);
    println!("Storage: {:?}", config.storage.store_type);
    println!("Status ledger: {}", config.global.status_path().display());
    println!(
        "Notifications: {}",
        if config.notifications.discord_webhook_url.is_empty() {
            "disabled"
        } else {
            "discord"
        }
    );

    Ok(())
}
