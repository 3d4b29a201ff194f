use std::path::{Path, PathBuf};
use std::process;

use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use daemon::run_daemon;
use database::{
    add_medication, display_history, edit_medication, list_medications, manage_groups,
    remove_medication, show_upcoming, take_due_medications, take_medication, untake_medication, ListOptions,
    MedicationEdit, NewMedication, StoreError,
};

pub mod config;
pub mod daemon;
pub mod database;
pub mod dosage;
pub mod due;
pub mod reminders;
pub mod schedule;
pub mod time;

/// Weekdays selected on the command line, 0 = Sunday.
#[derive(Debug, Clone)]
struct DaySet(Vec<i64>);

fn parse_days(input: &str) -> Result<DaySet, String> {
    time::parse_days_arg(input).map(DaySet).ok_or_else(|| {
        "expected 'daily', 'weekdays', 'weekends' or a list like 'mon,wed,fri' / '1,3,5'"
            .to_string()
    })
}

fn parse_now(input: &str) -> Result<DateTime<Local>, String> {
    DateTime::parse_from_rfc3339(input)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| format!("expected RFC 3339, e.g. 2026-02-12T08:00:00+01:00 ({e})"))
}

#[derive(Parser)]
#[command(name = "pilltrack")]
#[command(
    about = "CLI-first medication schedule tracker",
    long_about = "Track medications on a weekly schedule (weekdays + times of day), record doses, and see what is due, how overdue it is, and how long until the next dose. Data is stored as JSON."
)]
#[command(version)]
struct Cli {
    /// Path to the medication database (default: $PILLTRACK_DATA or ~/.pilltrack.json)
    #[arg(long, global = true)]
    data: Option<PathBuf>,
    /// Evaluate as if the current time were this RFC 3339 instant
    #[arg(long, global = true, value_parser = parse_now)]
    now: Option<DateTime<Local>>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(visible_aliases = ["a", "ad"])]
    /// Add a new medication
    Add {
        /// Name of the medication
        name: String,
        /// Dosage amount (e.g., 500, 1.5)
        #[arg(short, long)]
        dose: f64,
        /// Dosage unit (e.g., "mg", "ml", "tablets")
        #[arg(short, long, default_value = "mg")]
        unit: String,
        /// Time of day, repeatable or comma-separated (e.g., "08:00", "8:00 PM", "08:00,20:00")
        #[arg(short = 't', long = "time", required = true)]
        times: Vec<String>,
        /// Weekdays (e.g., "daily", "weekdays", "mon,wed,fri", "1,3,5")
        #[arg(long, default_value = "daily", value_parser = parse_days)]
        days: DaySet,
        /// Optional notes
        #[arg(short, long)]
        notes: Option<String>,
        /// Optional group (e.g., "morning")
        #[arg(short, long)]
        group: Option<String>,
        /// Do not send reminders for this medication
        #[arg(long)]
        no_notify: bool,
    },
    /// Remove a medication and its intake history
    #[command(visible_alias = "r")]
    Remove {
        /// Name of the medication
        name: String,
    },
    /// Record a dose now
    #[command(visible_alias = "t")]
    Take { name: String },
    #[command(visible_alias = "u")]
    /// Remove the most recent dose (undo)
    Untake { name: String },
    /// Record a dose for every medication that is currently due
    #[command(visible_alias = "ta")]
    TakeDue,
    /// Edit an existing medication
    #[command(visible_alias = "e")]
    Edit {
        /// Name of the medication to edit
        name: String,
        /// New dosage amount
        #[arg(long)]
        dose: Option<f64>,
        /// New dosage unit
        #[arg(long)]
        unit: Option<String>,
        /// Replace the times of day (repeatable or comma-separated)
        #[arg(long = "time")]
        times: Vec<String>,
        /// Replace the weekdays
        #[arg(long, value_parser = parse_days)]
        days: Option<DaySet>,
        /// New notes (use empty string to clear)
        #[arg(long)]
        notes: Option<String>,
        /// New group (use empty string to clear)
        #[arg(long)]
        group: Option<String>,
        /// Turn reminders on or off
        #[arg(long)]
        notify: Option<bool>,
    },
    /// List medications with due state and countdown to the next dose
    #[command(visible_aliases = ["l", "s", "show"])]
    List {
        /// Show only medications that are due now
        #[arg(long)]
        due: bool,
        /// Show only medications in this group
        #[arg(short, long)]
        group: Option<String>,
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// List medication groups, or rename one
    #[command(visible_alias = "g")]
    Groups {
        /// Rename a group: OLD NEW (an empty NEW removes the group)
        #[arg(long, num_args = 2, value_names = ["OLD", "NEW"])]
        rename: Option<Vec<String>>,
    },
    /// View intake history and adherence
    #[command(visible_alias = "h")]
    History {
        /// Name of medication (optional - shows all if not specified)
        name: Option<String>,
        /// Number of days to show
        #[arg(short, long, default_value_t = 30)]
        days: u32,
    },
    /// Show the weekly reminders and when each fires next
    #[command(visible_alias = "up")]
    Upcoming,
    /// Start the background daemon for reminders
    #[command(visible_alias = "d")]
    Daemon {
        /// Seconds between checks
        #[arg(long, default_value_t = config::DEFAULT_POLL_SECS)]
        interval: u64,
    },
}

fn run(command: Commands, path: &Path, now: &DateTime<Local>) -> Result<(), StoreError> {
    match command {
        Commands::Add {
            name,
            dose,
            unit,
            times,
            days,
            notes,
            group,
            no_notify,
        } => add_medication(
            path,
            NewMedication {
                name,
                dosage_amount: dose,
                dosage_unit: unit,
                schedule_days: days.0,
                schedule_times: times,
                notes,
                group,
                enable_notifications: !no_notify,
            },
            now,
        ),
        Commands::Remove { name } => remove_medication(path, &name),
        Commands::Take { name } => take_medication(path, &name, now),
        Commands::Untake { name } => untake_medication(path, &name, now),
        Commands::TakeDue => take_due_medications(path, now),
        Commands::Edit {
            name,
            dose,
            unit,
            times,
            days,
            notes,
            group,
            notify,
        } => {
            let edit = MedicationEdit {
                dosage_amount: dose,
                dosage_unit: unit,
                schedule_days: days.map(|d| d.0),
                schedule_times: (!times.is_empty()).then_some(times),
                notes,
                group,
                enable_notifications: notify,
            };
            edit_medication(path, &name, edit, now)
        }
        Commands::List { due, group, json } => {
            let options = ListOptions {
                due_only: due,
                group,
                json,
            };
            list_medications(path, &options, now)
        }
        Commands::Groups { rename } => {
            let rename = rename
                .as_deref()
                .and_then(|pair| Some((pair.first()?.as_str(), pair.get(1)?.as_str())));
            manage_groups(path, rename, now)
        }
        Commands::History { name, days } => display_history(path, name.as_deref(), days, now),
        Commands::Upcoming => show_upcoming(path, now),
        Commands::Daemon { interval } => {
            run_daemon(path, interval);
            Ok(())
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    let Cli { data, now, command } = Cli::parse();
    let path = config::resolve_data_file(data.as_deref());
    tracing::debug!(version = config::APP_VERSION, path = %path.display(), "pilltrack starting");

    let now = match now {
        Some(now) => {
            tracing::info!(now = %now.to_rfc3339(), "Using overridden current time");
            now
        }
        None => Local::now(),
    };

    if let Err(e) = run(command, &path, &now) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
