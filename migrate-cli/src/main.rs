use anyhow::{Context, Result};
use clap::Parser;
use migrate::{
    MigrateError, MigrationEngine, MigrationOptions, MigrationSummary, ProgressChannel, ProgressEvent, ProgressLedger,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::prelude::*;

mod config;

use config::{FileConfig, MigrateConfig, DEFAULT_CONFIG_FILE, ENV_DEVICE_ID, ENV_KEY, ENV_URL};

const RULE_WIDTH: usize = 60;

#[derive(Parser, Debug)]
#[command(name = "migrate-blogs", version)]
#[command(about = "Migrate text files from a directory tree into the blogs table")]
#[command(after_help = "Examples:\n  migrate-blogs\n  migrate-blogs ~/notes --batch-size 20\n  migrate-blogs --reset --force")]
struct Cli {
    /// Root of the tree to migrate
    #[arg(default_value = ".")]
    repo_path: PathBuf,

    /// Files per checkpoint [default: 50]
    #[arg(long)]
    batch_size: Option<usize>,

    /// Seconds to pause between batches [default: 0.5]
    #[arg(long)]
    batch_delay: Option<f64>,

    /// Upload even when a matching remote record exists
    #[arg(long)]
    force: bool,

    /// Forget saved progress and start over
    #[arg(long)]
    reset: bool,

    /// Print credential diagnostics and verbose logs
    #[arg(long)]
    debug: bool,

    /// TOML config file [default: <repo_path>/migrate.toml when present]
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where failed files are copied [default: <repo_path>/migration_errors]
    #[arg(long)]
    error_dir: Option<PathBuf>,

    /// Target table [default: blogs]
    #[arg(long)]
    table: Option<String>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn effective_log_level(&self) -> &str {
        match &self.log_level {
            Some(level) => level,
            None if self.debug => "debug",
            None => "warn",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.effective_log_level());

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("\n❌ Fatal error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn parse_level(log_level: &str) -> tracing::Level {
    match log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

fn init_logging(log_level: &str) {
    let level = parse_level(log_level);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!(
                    "migrate={level},migrate_core={level},migrate_blogs={level}"
                ))
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    if !cli.repo_path.is_dir() {
        eprintln!("❌ Error: Directory not found: {}", cli.repo_path.display());
        return Ok(ExitCode::FAILURE);
    }
    let root = cli
        .repo_path
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", cli.repo_path.display()))?;

    let file_config = FileConfig::locate(cli.config.as_deref(), &root).await?;
    let mut config = MigrateConfig::from_env(file_config);
    if let Some(table) = &cli.table {
        config.store.table = table.clone();
    }

    if cli.debug {
        for line in config.diagnostics() {
            println!("🔧 Debug: {}", line);
        }
    }
    for warning in config.warnings() {
        println!("⚠️  Warning: {}", warning);
    }

    if let Err(e) = config.store.validate() {
        eprintln!("❌ Error: {}", e);
        eprintln!("\nSet these in the environment or in {}:", DEFAULT_CONFIG_FILE);
        eprintln!("  {}=your-project-url", ENV_URL);
        eprintln!("  {}=your-anon-key", ENV_KEY);
        eprintln!("  {}=system  # optional", ENV_DEVICE_ID);
        return Ok(ExitCode::FAILURE);
    }

    let options = migration_options(&cli, &config)?;

    let mut ledger = ProgressLedger::load(ProgressLedger::path_for_root(&root)).await;
    if cli.reset {
        println!("🔄 Resetting migration progress...");
        ledger.reset().await.context("Failed to reset progress")?;
    } else if ledger.stats().migrated > 0 {
        println!("📂 Loaded progress: {} files already migrated", ledger.stats().migrated);
        println!("   Last processed index: {}", ledger.cursor());
    }

    let client = config.store.connect().context("Failed to create store client")?;

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupt received");
            signal_token.cancel();
        }
    });

    let (reporter, channel) = ProgressChannel::new();
    let printer = tokio::spawn(print_progress(channel));

    let result = {
        let mut engine = MigrationEngine::new(client, options)
            .with_cancellation(token)
            .with_reporter(reporter);
        engine.run(&root, &mut ledger).await
    };
    // The engine owned the last reporter, so the printer drains and stops
    if let Err(e) = printer.await {
        debug!("Progress printer stopped: {}", e);
    }

    match result {
        Ok(summary) => {
            info!("Run finished in {:.1}s", summary.duration.as_secs_f64());
            Ok(exit_code(&summary))
        }
        Err(MigrateError::Authentication(message)) => {
            eprintln!("❌ Authentication failed: {}", message);
            eprintln!("   Please check {} and {}", ENV_URL, ENV_KEY);
            Ok(ExitCode::FAILURE)
        }
        Err(MigrateError::Cancelled { .. } | MigrateError::SystemicFailure { .. }) => Ok(ExitCode::FAILURE),
        Err(e) => Err(e.into()),
    }
}

/// CLI flags win over the config file, which wins over built-in defaults
fn migration_options(cli: &Cli, config: &MigrateConfig) -> Result<MigrationOptions> {
    let defaults = MigrationOptions::default();

    let batch_size = cli.batch_size.or(config.batch_size).unwrap_or(defaults.batch_size);
    if batch_size == 0 {
        anyhow::bail!("--batch-size must be at least 1");
    }

    let batch_delay = match cli.batch_delay.or(config.batch_delay) {
        Some(secs) => Duration::try_from_secs_f64(secs)
            .map_err(|_| anyhow::anyhow!("--batch-delay must be a non-negative number of seconds"))?,
        None => defaults.batch_delay,
    };

    let error_dir = match cli.error_dir.as_ref().or(config.error_dir.as_ref()) {
        Some(dir) => Some(
            std::path::absolute(dir).with_context(|| format!("Invalid error directory {}", dir.display()))?,
        ),
        None => None,
    };

    Ok(MigrationOptions {
        batch_size,
        batch_delay,
        smart_mode: !cli.force,
        device_id: config.device_id.clone(),
        table: config.store.table.clone(),
        error_dir,
        ..defaults
    })
}

fn exit_code(summary: &MigrationSummary) -> ExitCode {
    if summary.has_errors() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn print_progress(mut channel: ProgressChannel) {
    while let Some(event) = channel.recv().await {
        print_event(&event);
    }
}

fn print_event(event: &ProgressEvent) {
    let rule = "=".repeat(RULE_WIDTH);
    match event {
        ProgressEvent::MigrationStarted { root, device_id, batch_size, smart_mode, .. } => {
            println!("\n{}", rule);
            println!("🚀 Starting Migration");
            println!("{}", rule);
            println!("Repository: {}", root.display());
            println!("Device ID: {}", device_id);
            println!("Batch size: {}", batch_size);
            println!("Smart mode: {}", smart_mode);
            println!("{}\n", rule);
        }
        ProgressEvent::ScanCompleted { files_found, .. } => {
            println!("📁 Found {} text files", files_found);
        }
        ProgressEvent::ExistingRecordsFetched { count } => {
            println!("✓ Found {} existing records in database", count);
        }
        ProgressEvent::Resuming { index, files_total } => {
            println!("\n📂 Resuming from file {}/{}", index + 1, files_total);
        }
        ProgressEvent::FileFailed { relative_path, error } => {
            println!("❌ {}: {}", relative_path, error);
        }
        ProgressEvent::BatchCompleted {
            batch,
            total_batches,
            files_processed,
            files_total,
            percentage,
            migrated,
            skipped,
            errors,
        } => {
            println!(
                "📦 Batch {}/{} | Files {}/{} ({:.1}%) | ✓ {} | ⊘ {} | ✗ {}",
                batch, total_batches, files_processed, files_total, percentage, migrated, skipped, errors
            );
        }
        ProgressEvent::Interrupted { resume_index } => {
            println!("\n\n⚠️  Migration interrupted by user!");
            println!("Progress saved. Run again to resume from file {}", resume_index + 1);
        }
        ProgressEvent::Halted { consecutive_failures, .. } => {
            println!("\n❌ Too many consecutive failures ({})!", consecutive_failures);
            println!("   This usually indicates a systemic issue (invalid API key, network, etc.)");
            println!("   Please check your credentials and try again.");
        }
        ProgressEvent::Completed { summary } => print_summary(summary),
        ProgressEvent::Warning { message, file_path } => match file_path {
            Some(path) => println!("⚠️  {}: {}", path, message),
            None => println!("⚠️  {}", message),
        },
    }
}

fn print_summary(summary: &MigrationSummary) {
    let rule = "=".repeat(RULE_WIDTH);
    println!("\n{}", rule);
    println!("📊 Migration Summary");
    println!("{}", rule);
    println!("  Total files found: {}", summary.total_files);
    println!("  Successfully migrated: {}", summary.migrated);
    println!("  Skipped (existing): {}", summary.skipped);
    println!("  Errors: {}", summary.errors);
    println!("  This run: {} inserted, {} skipped, {} errors", summary.run_inserted, summary.run_skipped, summary.run_errors);
    if summary.unresolved_failures > 0 {
        println!("  Still failing from earlier runs: {}", summary.unresolved_failures);
    }
    println!("{}", rule);

    if let (Some(files), Some(log)) = (&summary.quarantine_dir, &summary.error_log) {
        println!("\n⚠️  Failed files copied to: {}", files.display());
        println!("   Error details in: {}", log.display());
    }
}
