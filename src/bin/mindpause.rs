//! MindPause CLI - run the wellbeing pipeline from a desktop
//!
//! Commands:
//! - evaluate: Score a daily snapshot and print the escalation
//! - sync: Run the sync loop against a snapshot file and the backend
//! - listen: Bind the realtime listener and log lock changes
//! - doctor: Diagnose configuration and environment

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mindpause::escalation::evaluate;
use mindpause::presentation::RiskBreakdown;
use mindpause::sources::{FileMetricsSource, MetricsCapability};
use mindpause::{
    AppState, DailySnapshot, HttpMetricsApi, LockMailbox, LockState, LogNotifier, PauseConfig,
    PauseError, RealtimeListener, SyncLoop, TickOutcome, MINDPAUSE_VERSION, PRODUCER_NAME,
};

/// MindPause - escalating pause reminders and remote device lock
#[derive(Parser)]
#[command(name = "mindpause")]
#[command(version = MINDPAUSE_VERSION)]
#[command(about = "Digital wellbeing sync and lock client", long_about = None)]
struct Cli {
    /// Config file (.toml or .json); falls back to MINDPAUSE_* variables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a daily snapshot and print the escalation
    Evaluate {
        /// Snapshot file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Include chart percentages and color
        #[arg(long)]
        breakdown: bool,

        /// Pretty-print output
        #[arg(long)]
        pretty: bool,
    },

    /// Run the sync loop against a snapshot file
    Sync {
        /// User identifier sent with every report
        #[arg(short, long)]
        user: String,

        /// Snapshot file re-read on every tick
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Override the sync interval in seconds
        #[arg(long)]
        interval: Option<u64>,

        /// Skip posting the usage snapshot even when the file carries one
        #[arg(long)]
        no_report_usage: bool,

        /// Run a single tick and exit
        #[arg(long)]
        once: bool,
    },

    /// Bind the realtime listener and log lock changes until interrupted
    Listen {
        /// User identifier the socket is opened for
        #[arg(short, long)]
        user: String,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("MINDPAUSE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), PauseCliError> {
    match cli.command {
        Commands::Evaluate {
            input,
            breakdown,
            pretty,
        } => cmd_evaluate(&input, breakdown, pretty),
        Commands::Sync {
            user,
            snapshot,
            interval,
            no_report_usage,
            once,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            apply_sync_overrides(&mut config, interval, no_report_usage);
            config.validate()?;
            runtime()?.block_on(cmd_sync(config, user, snapshot, once))
        }
        Commands::Listen { user } => {
            let config = load_config(cli.config.as_deref())?;
            config.validate()?;
            runtime()?.block_on(cmd_listen(config, user))
        }
        Commands::Doctor { json } => cmd_doctor(cli.config.as_deref(), json),
    }
}

/// Command-line flags win over file and environment settings
fn apply_sync_overrides(config: &mut PauseConfig, interval: Option<u64>, no_report_usage: bool) {
    if let Some(secs) = interval {
        config.sync.interval_secs = secs;
    }
    if no_report_usage {
        config.sync.report_usage = false;
    }
}

fn runtime() -> Result<tokio::runtime::Runtime, PauseCliError> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

fn load_config(path: Option<&Path>) -> Result<PauseConfig, PauseCliError> {
    let config = match path {
        Some(path) => PauseConfig::from_file(path)?,
        None => PauseConfig::from_env()?,
    };
    Ok(config)
}

fn read_input(input: &Path) -> Result<String, PauseCliError> {
    if input.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn cmd_evaluate(input: &Path, breakdown: bool, pretty: bool) -> Result<(), PauseCliError> {
    let content = read_input(input)?;
    let snapshot: DailySnapshot = serde_json::from_str(&content)?;
    snapshot.date()?;

    let escalation = evaluate(&snapshot);
    let report = if breakdown {
        serde_json::json!({
            "escalation": escalation,
            "breakdown": RiskBreakdown::from_snapshot(&snapshot),
        })
    } else {
        serde_json::to_value(&escalation)?
    };

    if pretty {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", serde_json::to_string(&report)?);
    }
    Ok(())
}

async fn cmd_sync(
    config: PauseConfig,
    user: String,
    snapshot: PathBuf,
    once: bool,
) -> Result<(), PauseCliError> {
    let api = Arc::new(HttpMetricsApi::new(&config.api)?);
    let sync = Arc::new(SyncLoop::new(
        user,
        MetricsCapability::supported(FileMetricsSource::new(snapshot)),
        api,
        Arc::new(LogNotifier),
        config.sync.clone(),
        config.notifications.clone(),
    ));

    if once {
        let outcome = sync.tick().await;
        info!(?outcome, "sync tick finished");
        return match outcome {
            TickOutcome::FetchFailed => Err(PauseCliError::TickFailed),
            _ => Ok(()),
        };
    }

    let handle = sync.clone().spawn(AppState::Active);
    info!(interval_secs = config.sync.interval_secs, "sync loop running, ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    handle.shutdown().await;

    let state = sync.escalation_state();
    info!(
        date = ?state.last_notified_date,
        level = state.last_notified_level,
        "sync loop stopped"
    );
    Ok(())
}

async fn cmd_listen(config: PauseConfig, user: String) -> Result<(), PauseCliError> {
    let mailbox = LockMailbox::with_callback(LockState::Unlocked, |locked| {
        info!(locked, "lock state changed");
    });
    let mut listener = RealtimeListener::new(config, mailbox.publisher());
    listener.bind(&user)?;

    info!(user = %user, "listening for lock commands, ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    listener.shutdown().await;

    info!(state = ?mailbox.state(), "listener stopped");
    Ok(())
}

fn cmd_doctor(config_path: Option<&Path>, json: bool) -> Result<(), PauseCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("MindPause version {}", MINDPAUSE_VERSION),
    });

    // Config loads and validates
    match load_config(config_path) {
        Ok(config) => match config.validate() {
            Ok(()) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("API base URL {}", config.api.base_url),
                });
                checks.push(DoctorCheck {
                    name: "socket".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "Socket base URL {} (event '{}')",
                        config.socket_base_url(),
                        config.realtime.lock_event
                    ),
                });
            }
            Err(e) => checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            }),
        },
        Err(e) => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: if config_path.is_some() {
                CheckStatus::Error
            } else {
                CheckStatus::Warning
            },
            message: e.to_string(),
        }),
    }

    // stdin is only needed for `evaluate -i -`
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (evaluate -i - ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: MINDPAUSE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("MindPause Doctor Report");
        println!("=======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        warn!("doctor found errors");
        Err(PauseCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum PauseCliError {
    Io(io::Error),
    Json(serde_json::Error),
    Pause(PauseError),
    TickFailed,
    DoctorFailed,
}

impl From<io::Error> for PauseCliError {
    fn from(e: io::Error) -> Self {
        PauseCliError::Io(e)
    }
}

impl From<serde_json::Error> for PauseCliError {
    fn from(e: serde_json::Error) -> Self {
        PauseCliError::Json(e)
    }
}

impl From<PauseError> for PauseCliError {
    fn from(e: PauseError) -> Self {
        PauseCliError::Pause(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PauseCliError> for CliError {
    fn from(e: PauseCliError) -> Self {
        match e {
            PauseCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            PauseCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Expected {recordDate, tapsCount, scrollEvents}".to_string()),
            },
            PauseCliError::Pause(e) => {
                let hint = match &e {
                    PauseError::Config(_) => Some("Set MINDPAUSE_API_BASE_URL or pass --config"),
                    PauseError::Network(_) | PauseError::Http { .. } => {
                        Some("Check the backend is reachable")
                    }
                    PauseError::InvalidDate(_) => Some("Dates use YYYY-MM-DD"),
                    _ => None,
                };
                CliError {
                    code: e.label().to_uppercase(),
                    message: e.to_string(),
                    hint: hint.map(str::to_string),
                }
            }
            PauseCliError::TickFailed => CliError {
                code: "TICK_FAILED".to_string(),
                message: "Snapshot could not be read".to_string(),
                hint: Some("Check the --snapshot file".to_string()),
            },
            PauseCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
