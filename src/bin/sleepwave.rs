//! Sleepwave CLI - Command-line interface for Sleepwave
//!
//! Commands:
//! - analyze: Infer sleep episodes from screen events and store them
//! - debt: Print the current sleep debt
//! - add: Add a sleep episode by hand
//! - delete: Soft-delete a stored episode
//! - list: List stored episodes or nightly summaries
//! - energy: Print wake-up time and energy points
//! - doctor: Diagnose settings and store files

use chrono::{DateTime, FixedOffset, Local, NaiveDate, TimeZone, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use sleepwave::clock::FixedClock;
use sleepwave::config::Settings;
use sleepwave::manual::parse_local_time;
use sleepwave::pipeline::{utc_offset, SleepTracker};
use sleepwave::store::{MemoryStore, ScreenEventLog, SleepStore};
use sleepwave::{SleepError, SLEEPWAVE_VERSION};

/// Sleepwave - Sleep inference from screen on/off events
#[derive(Parser)]
#[command(name = "sleepwave")]
#[command(version = SLEEPWAVE_VERSION)]
#[command(about = "Infer sleep from screen activity and track sleep debt", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Episode store file
    #[arg(long, global = true, default_value = "sleepwave-store.json")]
    store: PathBuf,

    /// Settings file (defaults are used when it does not exist)
    #[arg(long, global = true, default_value = "sleepwave-settings.json")]
    settings: PathBuf,

    /// Fixed offset from UTC in minutes (defaults to the system time zone)
    #[arg(long, global = true, allow_negative_numbers = true)]
    utc_offset: Option<i32>,

    /// Evaluate as of this Unix timestamp in milliseconds
    #[arg(long, global = true)]
    now: Option<i64>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Infer sleep episodes from screen events and store them
    Analyze {
        /// Event file path, JSON array or NDJSON (use - for stdin)
        #[arg(short, long)]
        events: PathBuf,
    },

    /// Print the current sleep debt
    Debt,

    /// Add a sleep episode by hand
    Add {
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start_date: NaiveDate,

        /// Start time (HH:MM)
        #[arg(long)]
        start_time: String,

        /// End date (YYYY-MM-DD), defaults to the start date
        #[arg(long)]
        end_date: Option<NaiveDate>,

        /// End time (HH:MM)
        #[arg(long)]
        end_time: String,
    },

    /// Soft-delete a stored episode
    Delete {
        /// Episode id
        id: i64,
    },

    /// List stored episodes
    List {
        /// Group episodes by night
        #[arg(long)]
        summaries: bool,

        /// Include deleted episodes
        #[arg(long)]
        include_deleted: bool,
    },

    /// Print wake-up time and energy points for the current night
    Energy,

    /// Diagnose settings and store files
    Doctor,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable text
    Text,
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

type Tracker<Tz> = SleepTracker<MemoryStore, Settings, Tz>;

/// Zone used to read local hours.
///
/// The system zone follows DST transitions across the event history; an
/// explicit `--utc-offset` applies one offset to every instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Zone {
    System,
    Fixed(FixedOffset),
}

impl Zone {
    fn from_args(global: &GlobalArgs) -> Result<Self, CliFailure> {
        match global.utc_offset {
            Some(minutes) => Ok(Zone::Fixed(utc_offset(minutes)?)),
            None => Ok(Zone::System),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();
}

fn run(cli: Cli) -> Result<(), CliFailure> {
    let global = cli.global;
    if let Commands::Doctor = cli.command {
        return cmd_doctor(&global);
    }
    match Zone::from_args(&global)? {
        Zone::System => dispatch(&global, cli.command, Local),
        Zone::Fixed(offset) => dispatch(&global, cli.command, offset),
    }
}

fn dispatch<Tz: TimeZone>(global: &GlobalArgs, command: Commands, tz: Tz) -> Result<(), CliFailure> {
    match command {
        Commands::Analyze { events } => cmd_analyze(global, tz, &events),
        Commands::Debt => cmd_debt(global, tz),
        Commands::Add {
            start_date,
            start_time,
            end_date,
            end_time,
        } => cmd_add(global, tz, start_date, &start_time, end_date.unwrap_or(start_date), &end_time),
        Commands::Delete { id } => cmd_delete(global, tz, id),
        Commands::List {
            summaries,
            include_deleted,
        } => cmd_list(global, tz, summaries, include_deleted),
        Commands::Energy => cmd_energy(global, tz),
        Commands::Doctor => cmd_doctor(global),
    }
}

fn open_tracker<Tz: TimeZone>(global: &GlobalArgs, tz: Tz) -> Result<Tracker<Tz>, CliFailure> {
    let settings = Settings::load(&global.settings)?;
    let store = MemoryStore::load(&global.store).map_err(SleepError::from)?;

    let now = match global.now {
        Some(millis) => DateTime::<Utc>::from_timestamp_millis(millis)
            .ok_or_else(|| CliFailure::Usage(format!("Invalid --now timestamp: {}", millis)))?,
        None => Utc::now(),
    };

    Ok(SleepTracker::with_clock(store, settings, tz, FixedClock(now)))
}

fn close_tracker<Tz: TimeZone>(global: &GlobalArgs, tracker: Tracker<Tz>) -> Result<(), CliFailure> {
    let (store, settings) = tracker.into_parts()?;
    store.save(&global.store).map_err(SleepError::from)?;
    settings.save(&global.settings)?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T, format: OutputFormat) -> Result<(), CliFailure> {
    let output = match format {
        OutputFormat::JsonPretty => serde_json::to_string_pretty(value)?,
        _ => serde_json::to_string(value)?,
    };
    println!("{}", output);
    Ok(())
}

fn read_events(path: &Path) -> Result<ScreenEventLog, CliFailure> {
    let input = if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer).map(|_| buffer)
    } else {
        fs::read_to_string(path)
    };
    let input =
        input.map_err(|e| SleepError::Source(format!("Cannot read events from {}: {}", path.display(), e)))?;
    Ok(ScreenEventLog::parse(&input)?)
}

fn cmd_analyze<Tz: TimeZone>(global: &GlobalArgs, tz: Tz, events: &Path) -> Result<(), CliFailure> {
    let log = read_events(events)?;
    let tracker = open_tracker(global, tz)?;
    let report = tracker.analyze(&log)?;

    match global.format {
        OutputFormat::Text => {
            println!("Analysis {}", report.run_id);
            println!("Window:      {} .. {}", report.window_start, report.window_end);
            println!("Events:      {}", report.events);
            println!("Off-periods: {}", report.off_periods);
            println!(
                "Confirmed:   {} ({} pruned, {} extended)",
                report.confirmed, report.demoted, report.promoted
            );
            println!("Inserted:    {}", report.inserted.len());
            println!("Skipped:     {}", report.skipped);
        }
        format => print_json(&report, format)?,
    }

    close_tracker(global, tracker)
}

fn cmd_debt<Tz: TimeZone>(global: &GlobalArgs, tz: Tz) -> Result<(), CliFailure> {
    let tracker = open_tracker(global, tz)?;
    let debt = tracker.sleep_debt()?;

    match global.format {
        OutputFormat::Text => match &debt {
            Some(debt) => {
                println!("Sleep debt: {} h", debt.formatted());
                if debt.in_progress_night_excluded {
                    println!("(tonight is still in progress and not counted)");
                }
                for day in &debt.days {
                    println!(
                        "  {}  {:>5.2} h  {:+.2}",
                        day.label, day.sleep_hours, day.contribution
                    );
                }
            }
            None => println!("No sleep recorded yet"),
        },
        format => print_json(&debt, format)?,
    }

    close_tracker(global, tracker)
}

fn cmd_add<Tz: TimeZone>(
    global: &GlobalArgs,
    tz: Tz,
    start_date: NaiveDate,
    start_time: &str,
    end_date: NaiveDate,
    end_time: &str,
) -> Result<(), CliFailure> {
    let start = parse_local_time(start_date, start_time, &tz)?;
    let end = parse_local_time(end_date, end_time, &tz)?;
    let tracker = open_tracker(global, tz)?;

    let id = tracker.add_episode(start, end)?;
    match global.format {
        OutputFormat::Text => println!("Added sleep episode {}", id),
        format => print_json(&serde_json::json!({ "id": id }), format)?,
    }

    close_tracker(global, tracker)
}

fn cmd_delete<Tz: TimeZone>(global: &GlobalArgs, tz: Tz, id: i64) -> Result<(), CliFailure> {
    let tracker = open_tracker(global, tz)?;
    tracker.delete_episode(id)?;
    if let OutputFormat::Text = global.format {
        println!("Deleted sleep episode {}", id);
    }
    close_tracker(global, tracker)
}

fn cmd_list<Tz: TimeZone>(
    global: &GlobalArgs,
    tz: Tz,
    summaries: bool,
    include_deleted: bool,
) -> Result<(), CliFailure> {
    let tracker = open_tracker(global, tz)?;

    if summaries {
        let nights = tracker.daily_summaries()?;
        match global.format {
            OutputFormat::Text => {
                for night in &nights {
                    println!(
                        "{}  {}h {}m  ({} episodes)",
                        night.label,
                        night.total_minutes / 60,
                        night.total_minutes % 60,
                        night.episodes.len()
                    );
                }
            }
            format => print_json(&nights, format)?,
        }
        return Ok(());
    }

    let episodes = tracker.episodes(include_deleted)?;
    match global.format {
        OutputFormat::Text => {
            for e in &episodes {
                println!(
                    "#{:<4} {}  {} .. {}  {:>4} min{}",
                    e.id,
                    e.sleep_date,
                    e.start,
                    e.end,
                    e.duration_minutes,
                    if e.is_deleted { "  [deleted]" } else { "" }
                );
            }
        }
        format => print_json(&episodes, format)?,
    }
    Ok(())
}

fn cmd_energy<Tz: TimeZone>(global: &GlobalArgs, tz: Tz) -> Result<(), CliFailure> {
    let tracker = open_tracker(global, tz)?;
    let energy = tracker.energy()?;

    match global.format {
        OutputFormat::Text => {
            println!("Night of {}", energy.night_date);
            for point in &energy.points {
                println!("  {:<14} {}", format!("{:?}", point.kind), point.at);
            }
        }
        format => print_json(&energy, format)?,
    }
    Ok(())
}

fn cmd_doctor(global: &GlobalArgs) -> Result<(), CliFailure> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Sleepwave version {}", SLEEPWAVE_VERSION),
    });

    checks.push(if global.settings.exists() {
        match Settings::load(&global.settings) {
            Ok(settings) => DoctorCheck {
                name: "settings".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Night window {:02}:00-{:02}:00, need {} h",
                    settings.night_start_hour, settings.night_end_hour, settings.needed_sleep_hours
                ),
            },
            Err(e) => DoctorCheck {
                name: "settings".to_string(),
                status: CheckStatus::Error,
                message: format!("Invalid settings: {}", e),
            },
        }
    } else {
        DoctorCheck {
            name: "settings".to_string(),
            status: CheckStatus::Warning,
            message: "Settings file does not exist, defaults will be used".to_string(),
        }
    });

    checks.push(if global.store.exists() {
        match MemoryStore::load(&global.store) {
            Ok(store) => {
                let active = store.all_episodes(false).map(|e| e.len()).unwrap_or(0);
                DoctorCheck {
                    name: "store".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("{} episodes ({} active)", store.len(), active),
                }
            }
            Err(e) => DoctorCheck {
                name: "store".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot read store: {}", e),
            },
        }
    } else {
        DoctorCheck {
            name: "store".to_string(),
            status: CheckStatus::Warning,
            message: "Store file does not exist yet".to_string(),
        }
    });

    checks.push(DoctorCheck {
        name: "stdin".to_string(),
        status: CheckStatus::Ok,
        message: if atty::is(atty::Stream::Stdin) {
            "stdin is a TTY (pass --events <file>)".to_string()
        } else {
            "stdin is a pipe (--events - ready)".to_string()
        },
    });

    let report = DoctorReport {
        version: SLEEPWAVE_VERSION.to_string(),
        checks,
    };

    match global.format {
        OutputFormat::Text => {
            println!("Sleepwave Doctor Report");
            println!("=======================");
            println!("Version: {}", report.version);
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
        format => print_json(&report, format)?,
    }

    if report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error)) {
        Err(CliFailure::DoctorFailed)
    } else {
        Ok(())
    }
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Debug)]
enum CliFailure {
    Io(io::Error),
    Sleep(SleepError),
    Json(serde_json::Error),
    Usage(String),
    DoctorFailed,
}

impl From<io::Error> for CliFailure {
    fn from(e: io::Error) -> Self {
        CliFailure::Io(e)
    }
}

impl From<SleepError> for CliFailure {
    fn from(e: SleepError) -> Self {
        CliFailure::Sleep(e)
    }
}

impl From<serde_json::Error> for CliFailure {
    fn from(e: serde_json::Error) -> Self {
        CliFailure::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CliFailure> for CliError {
    fn from(e: CliFailure) -> Self {
        match e {
            CliFailure::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CliFailure::Sleep(e) => {
                let (code, hint) = match &e {
                    SleepError::Validation(_) => ("VALIDATION_ERROR", "Check the start and end times"),
                    SleepError::Config(_) => ("CONFIG_ERROR", "Fix the settings file or delete it to use defaults"),
                    SleepError::Store(_) => ("STORE_ERROR", "Run 'sleepwave doctor' to inspect the store"),
                    SleepError::AnalysisInProgress => ("ANALYSIS_IN_PROGRESS", "Wait for the running analysis to finish"),
                    SleepError::JsonError(_) | SleepError::ParseError(_) => {
                        ("PARSE_ERROR", "Events need timestamp_millis and kind fields")
                    }
                    SleepError::Source(_) => ("SOURCE_ERROR", "Check the event source"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            CliFailure::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            CliFailure::Usage(message) => CliError {
                code: "USAGE_ERROR".to_string(),
                message,
                hint: Some("Run 'sleepwave --help'".to_string()),
            },
            CliFailure::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// ============================================================================
// Report types
// ============================================================================

#[derive(Serialize)]
struct DoctorReport {
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
