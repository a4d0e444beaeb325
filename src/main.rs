//! Proctor Guard CLI
//!
//! Runs the proctoring state machine against the simulated browser, either
//! from a recorded script or live from stdin.

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use crossbeam_channel::{unbounded, RecvTimeoutError};
use proctor_guard::{
    audit::create_shared_log_with_persistence,
    config::{MonitorSelection, ProctorConfig},
    core::ViolationCategory,
    replay::{parse_script, ReplayRunner, ReplaySummary, ScriptAction},
    reporter::{MemoryReporter, ReportWorker, ViolationReporter},
    SharedAuditLog, INTEGRITY_NOTICE, VERSION,
};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "backend")]
use proctor_guard::{BackendConfig, BlockingBackendClient};

#[derive(Parser)]
#[command(name = "proctor-guard")]
#[command(version = VERSION)]
#[command(about = "Violation detection and warning state machine for exam proctoring", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Clone)]
struct SessionArgs {
    /// Monitors to attach (comma separated, or all)
    #[arg(long, default_value = "all")]
    monitors: String,

    /// Override the configured warning budget
    #[arg(long)]
    max_warnings: Option<u32>,

    /// Keep reports in memory instead of sending them to the backend
    #[arg(long)]
    dry_run: bool,

    /// Override the configured backend URL
    #[arg(long)]
    backend_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines session script
    Replay {
        /// Script file
        script: PathBuf,

        #[command(flatten)]
        session: SessionArgs,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Read script actions from stdin and apply them in real time
    Watch {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Show cumulative audit statistics
    Status,

    /// Show configuration
    Config,

    /// Show the cooldown applied to each violation category
    Cooldowns,

    /// Display the integrity notice shown to candidates
    Policy,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            script,
            session,
            json,
        } => cmd_replay(&script, &session, json),
        Commands::Watch { session } => cmd_watch(&session),
        Commands::Status => {
            cmd_status();
            Ok(())
        }
        Commands::Config => {
            cmd_config();
            Ok(())
        }
        Commands::Cooldowns => {
            cmd_cooldowns();
            Ok(())
        }
        Commands::Policy => {
            cmd_policy();
            Ok(())
        }
    }
}

/// Load configuration and apply command-line overrides.
fn session_config(args: &SessionArgs) -> anyhow::Result<ProctorConfig> {
    let mut config = ProctorConfig::load().unwrap_or_default();

    let selection = MonitorSelection::from_csv(&args.monitors);
    if !selection.any_enabled() {
        bail!("at least one monitor must be enabled");
    }
    config.monitors = selection;
    if let Some(max) = args.max_warnings {
        config.max_warnings = max;
    }
    if let Some(ref url) = args.backend_url {
        config.backend_url = url.clone();
    }
    config.validate().context("invalid configuration")?;

    if let Err(e) = config.ensure_directories() {
        tracing::warn!(error = %e, "could not create data directory");
    }
    Ok(config)
}

/// Where outbound records go for this run.
struct Transport {
    reporter: Box<dyn ViolationReporter>,
    worker: Option<ReportWorker>,
    memory: Option<MemoryReporter>,
}

impl Transport {
    fn memory() -> Self {
        let memory = MemoryReporter::new();
        Self {
            reporter: Box::new(memory.clone()),
            worker: None,
            memory: Some(memory),
        }
    }
}

/// Wait for queued records to be attempted, or print what a dry run kept.
fn finish_transport(worker: Option<ReportWorker>, memory: Option<MemoryReporter>) {
    if let Some(mut worker) = worker {
        worker.stop();
    }
    if let Some(memory) = memory {
        let records = memory.drain();
        println!("Dry run: {} record(s) not sent", records.len());
        for record in records {
            match serde_json::to_string(&record) {
                Ok(line) => println!("  {line}"),
                Err(e) => eprintln!("  unprintable record: {e}"),
            }
        }
    }
}

#[cfg(feature = "backend")]
fn build_transport(
    config: &ProctorConfig,
    dry_run: bool,
    audit: &SharedAuditLog,
) -> anyhow::Result<Transport> {
    if dry_run {
        return Ok(Transport::memory());
    }
    let mut backend = BackendConfig::new(config.backend_url.clone());
    if let Some(ref token) = config.backend_token {
        backend = backend.with_token(token.clone());
    }
    let client = BlockingBackendClient::new(backend).context("failed to create backend client")?;
    let (reporter, worker) =
        ReportWorker::spawn(client, config.report_queue_capacity, audit.clone());
    tracing::info!(url = %config.backend_url, "reporting to backend");
    Ok(Transport {
        reporter: Box::new(reporter),
        worker: Some(worker),
        memory: None,
    })
}

#[cfg(not(feature = "backend"))]
fn build_transport(
    _config: &ProctorConfig,
    dry_run: bool,
    _audit: &SharedAuditLog,
) -> anyhow::Result<Transport> {
    if !dry_run {
        tracing::warn!("backend feature not enabled at compile time, keeping reports in memory");
    }
    Ok(Transport::memory())
}

fn cmd_replay(script: &Path, args: &SessionArgs, json: bool) -> anyhow::Result<()> {
    let config = session_config(args)?;
    let content = std::fs::read_to_string(script)
        .with_context(|| format!("failed to read script {}", script.display()))?;
    let steps = parse_script(&content)?;

    let audit = create_shared_log_with_persistence(config.audit_path());
    let Transport {
        reporter,
        worker,
        memory,
    } = build_transport(&config, args.dry_run, &audit)?;

    let mut runner = ReplayRunner::new(&config, reporter, audit.clone(), Utc::now());
    let summary = runner.run(&steps);
    drop(runner);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    finish_transport(worker, memory);

    if let Err(e) = audit.save() {
        tracing::warn!(error = %e, "could not save audit stats");
    }
    println!();
    println!("{}", audit.summary());
    Ok(())
}

fn cmd_watch(args: &SessionArgs) -> anyhow::Result<()> {
    let config = session_config(args)?;
    let audit = create_shared_log_with_persistence(config.audit_path());
    let Transport {
        reporter,
        worker,
        memory,
    } = build_transport(&config, args.dry_run, &audit)?;

    println!("Proctor Guard v{VERSION}");
    println!("Reading actions from stdin, one JSON object per line.");
    println!("Press Ctrl+C to end the session");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    // stdin blocks, so lines come in over a channel
    let (sender, receiver) = unbounded::<String>();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if sender.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
    });

    let mut runner = ReplayRunner::new(&config, reporter, audit.clone(), Utc::now());

    while running.load(Ordering::SeqCst) {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                match serde_json::from_str::<ScriptAction>(line) {
                    Ok(action) => {
                        runner.advance_to(Utc::now());
                        runner.apply(&action);
                        println!(
                            "[{}] {:?} | warnings remaining: {}",
                            runner.now().format("%H:%M:%S%.3f"),
                            runner.controller().phase(),
                            runner.controller().warnings_remaining()
                        );
                    }
                    Err(e) => eprintln!("Ignoring line: {e}"),
                }
            }
            Err(RecvTimeoutError::Timeout) => runner.advance_to(Utc::now()),
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    println!();
    println!("Ending session...");
    runner.controller_mut().end();
    let summary = runner.summary();
    drop(runner);
    print_summary(&summary);

    finish_transport(worker, memory);

    if let Err(e) = audit.save() {
        tracing::warn!(error = %e, "could not save audit stats");
    }
    Ok(())
}

fn print_summary(summary: &ReplaySummary) {
    println!("Session Summary");
    println!("===============");
    println!("  Steps applied: {}", summary.steps);
    println!("  Elapsed: {:.1}s", summary.elapsed_ms as f64 / 1000.0);
    println!("  Final phase: {:?}", summary.phase);
    println!("  Warnings remaining: {}", summary.warnings_remaining);
    println!("  Keys blocked: {}", summary.keys_blocked);
    println!("  Fullscreen requests: {}", summary.fullscreen_requests);
    match summary.submission {
        Some(ref notice) => println!(
            "  Submitted: {:?} at {} ({} warning(s) used)",
            notice.reason,
            notice.at.format("%H:%M:%S%.3f"),
            notice.warnings_used
        ),
        None => println!("  Submitted: no"),
    }
}

fn cmd_status() {
    let config = ProctorConfig::load().unwrap_or_default();

    println!("Proctor Guard Status");
    println!("====================");
    println!();
    println!("Configuration:");
    println!("  Max warnings: {}", config.max_warnings);
    println!("  Backend: {}", config.backend_url);
    println!();

    let stats_path = config.audit_path();
    if stats_path.exists() {
        if let Ok(content) = std::fs::read_to_string(&stats_path) {
            if let Ok(stats) = serde_json::from_str::<serde_json::Value>(&content) {
                println!("Cumulative Statistics:");
                for key in [
                    "sessions_started",
                    "violations_accepted",
                    "reports_delivered",
                    "reports_failed",
                    "fullscreen_requests",
                    "auto_submissions",
                ] {
                    if let Some(value) = stats.get(key) {
                        println!("  {}: {value}", key.replace('_', " "));
                    }
                }
            }
        }
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_config() {
    let config = ProctorConfig::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", ProctorConfig::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn cmd_cooldowns() {
    let config = ProctorConfig::load().unwrap_or_default();

    println!(
        "{:<30} {:<28} {:<28} {:>10}",
        "CATEGORY", "BACKEND TYPE", "BUCKET", "COOLDOWN"
    );
    for category in ViolationCategory::ALL {
        let bucket = category.bucket();
        println!(
            "{:<30} {:<28} {:<28} {:>8}ms",
            category.as_str(),
            category.wire_name(),
            bucket.to_string(),
            config.cooldowns.for_bucket(bucket).as_millis()
        );
    }
}

fn cmd_policy() {
    println!("{INTEGRITY_NOTICE}");
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("error setting Ctrl+C handler")
}
