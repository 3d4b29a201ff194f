use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use chrono::{DateTime, Duration, Local, TimeZone};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::dosage::{format_dosage, normalize_dosage_unit};
use crate::due::{
    evaluate_due, is_due, last_intake_at, next_dose_progress, parse_intake_timestamp,
};
use crate::reminders::plan_reminders;
use crate::schedule::Schedule;
use crate::time::{parse_time_token, split_time_tokens, weekday_label};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize medication database: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Medication '{0}' not found")]
    NotFound(String),

    #[error("Medication '{0}' already exists")]
    AlreadyExists(String),

    #[error("Medication '{0}' has no recorded intake to undo")]
    NothingToUndo(String),

    #[error("Invalid input: {0}")]
    Validation(String),
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IntakeRecord {
    /// RFC 3339 timestamp of the dose.
    pub taken_at: String,
    /// Dose at time of taking (in case it changes later).
    #[serde(default)]
    pub dose: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Medication {
    pub name: String,
    pub dosage_amount: f64,
    pub dosage_unit: String,
    /// Weekdays, 0 = Sunday ... 6 = Saturday. Rows without the field
    /// predate weekday scheduling and mean every day.
    #[serde(default = "every_day", deserialize_with = "lenient_days")]
    pub schedule_days: Vec<i64>,
    /// Raw time tokens; a single entry may hold a comma-joined list.
    #[serde(default, deserialize_with = "lenient_times")]
    pub schedule_times: Vec<String>,
    #[serde(default = "enabled")]
    pub enable_notifications: bool,
    pub notes: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    /// Intake history, newest first.
    #[serde(default)]
    pub intakes: Vec<IntakeRecord>,
    #[serde(default)]
    pub last_intake: Option<IntakeRecord>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

fn every_day() -> Vec<i64> {
    vec![1, 2, 3, 4, 5, 6, 0]
}

fn enabled() -> bool {
    true
}

/// Keep whatever weekday entries look like integers ("3", 3, 3.0).
/// Range filtering happens when the schedule is parsed.
fn lenient_days<'de, D>(deserializer: D) -> Result<Vec<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?;
    let Some(values) = raw else {
        return Ok(every_day());
    };

    Ok(values
        .iter()
        .filter_map(|value| match value {
            Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < 1e9)
                    .map(|f| f as i64)
            }),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        })
        .collect())
}

/// Keep string time entries and the text form of numbers; drop anything
/// else. Unparseable tokens are filtered later by the schedule parser.
fn lenient_times<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|value| match value {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect())
}

impl Medication {
    pub fn new(name: &str, dosage_amount: f64, dosage_unit: &str) -> Self {
        Self {
            name: name.to_string(),
            dosage_amount,
            dosage_unit: normalize_dosage_unit(dosage_unit),
            schedule_days: every_day(),
            schedule_times: Vec::new(),
            enable_notifications: true,
            notes: None,
            group: None,
            intakes: Vec::new(),
            last_intake: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    pub fn schedule(&self) -> Schedule {
        Schedule::parse(&self.schedule_days, &self.schedule_times)
    }

    pub fn dosage(&self) -> String {
        format_dosage(self.dosage_amount, &self.dosage_unit)
    }

    fn matches(&self, name_lower: &str) -> bool {
        self.name.to_lowercase() == name_lower
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MedicationDatabase {
    pub medications: Vec<Medication>,
}

/// Fields changed by `edit`; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct MedicationEdit {
    pub dosage_amount: Option<f64>,
    pub dosage_unit: Option<String>,
    pub schedule_days: Option<Vec<i64>>,
    pub schedule_times: Option<Vec<String>>,
    /// Empty string clears the notes.
    pub notes: Option<String>,
    /// Empty string clears the group.
    pub group: Option<String>,
    pub enable_notifications: Option<bool>,
}

/// Validate CLI time input strictly and split it into one token per entry.
pub fn validate_times(times: &[String]) -> Result<Vec<String>, StoreError> {
    let tokens: Vec<String> = split_time_tokens(times).map(str::to_string).collect();
    if tokens.is_empty() {
        return Err(StoreError::Validation(
            "at least one time is required".to_string(),
        ));
    }

    if let Some(bad) = tokens.iter().find(|token| parse_time_token(token).is_none()) {
        return Err(StoreError::Validation(format!(
            "invalid time '{}' (use HH:MM, e.g. 08:00, or 8:00 PM)",
            bad
        )));
    }
    Ok(tokens)
}

fn validate_days(days: &[i64]) -> Result<(), StoreError> {
    if days.is_empty() || days.iter().any(|day| !(0..=6).contains(day)) {
        return Err(StoreError::Validation(
            "days must be weekday numbers 0-6 (0 = Sunday)".to_string(),
        ));
    }
    Ok(())
}

fn validate_amount(amount: f64) -> Result<(), StoreError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(StoreError::Validation(
            "dosage amount must be a positive number".to_string(),
        ));
    }
    Ok(())
}

impl MedicationDatabase {
    pub fn find(&self, name: &str) -> Option<&Medication> {
        let name_lower = name.to_lowercase();
        self.medications.iter().find(|m| m.matches(&name_lower))
    }

    fn find_mut(&mut self, name: &str) -> Result<&mut Medication, StoreError> {
        let name_lower = name.to_lowercase();
        self.medications
            .iter_mut()
            .find(|m| m.matches(&name_lower))
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    /// Insert a new medication after validating its schedule.
    pub fn add<Tz: TimeZone>(
        &mut self,
        mut medication: Medication,
        now: &DateTime<Tz>,
    ) -> Result<(), StoreError>
    where
        Tz::Offset: fmt::Display,
    {
        medication.name = medication.name.trim().to_string();
        if medication.name.is_empty() {
            return Err(StoreError::Validation(
                "medication name cannot be empty".to_string(),
            ));
        }
        validate_amount(medication.dosage_amount)?;
        validate_days(&medication.schedule_days)?;
        medication.schedule_times = validate_times(&medication.schedule_times)?;

        if self.find(&medication.name).is_some() {
            return Err(StoreError::AlreadyExists(medication.name));
        }

        medication.dosage_unit = normalize_dosage_unit(&medication.dosage_unit);
        medication.created_at = now.to_rfc3339();
        medication.updated_at = medication.created_at.clone();
        self.medications.push(medication);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<Medication, StoreError> {
        let name_lower = name.to_lowercase();
        let index = self
            .medications
            .iter()
            .position(|m| m.matches(&name_lower))
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        Ok(self.medications.remove(index))
    }

    /// Record a dose at `now`, newest first.
    pub fn record_intake<Tz: TimeZone>(
        &mut self,
        name: &str,
        now: &DateTime<Tz>,
    ) -> Result<&Medication, StoreError>
    where
        Tz::Offset: fmt::Display,
    {
        let med = self.find_mut(name)?;
        let record = IntakeRecord {
            taken_at: now.to_rfc3339(),
            dose: med.dosage(),
        };
        med.intakes.insert(0, record.clone());
        med.last_intake = Some(record);
        med.updated_at = now.to_rfc3339();
        Ok(&*med)
    }

    /// Drop the newest intake.
    pub fn undo_intake<Tz: TimeZone>(
        &mut self,
        name: &str,
        now: &DateTime<Tz>,
    ) -> Result<IntakeRecord, StoreError>
    where
        Tz::Offset: fmt::Display,
    {
        let med = self.find_mut(name)?;
        if med.intakes.is_empty() {
            return Err(StoreError::NothingToUndo(med.name.clone()));
        }
        let removed = med.intakes.remove(0);
        med.last_intake = med.intakes.first().cloned();
        med.updated_at = now.to_rfc3339();
        Ok(removed)
    }

    /// Distinct groups with their member counts, sorted by name.
    ///
    /// Groups differing only in case are merged under the first spelling seen.
    pub fn groups(&self) -> Vec<(String, usize)> {
        let mut groups: Vec<(String, usize)> = Vec::new();
        for group in self.medications.iter().filter_map(|m| m.group.as_deref()) {
            let lower = group.to_lowercase();
            match groups.iter_mut().find(|(g, _)| g.to_lowercase() == lower) {
                Some((_, count)) => *count += 1,
                None => groups.push((group.to_string(), 1)),
            }
        }
        groups.sort_by_key(|(g, _)| g.to_lowercase());
        groups
    }

    /// Move every medication in group `from` to `to`. An empty `to`
    /// removes the group. Returns the number of medications changed.
    pub fn rename_group<Tz: TimeZone>(
        &mut self,
        from: &str,
        to: &str,
        now: &DateTime<Tz>,
    ) -> Result<usize, StoreError>
    where
        Tz::Offset: fmt::Display,
    {
        let from_lower = from.trim().to_lowercase();
        let to = to.trim();
        let mut changed = 0;

        for med in &mut self.medications {
            if med.group.as_ref().map(|g| g.to_lowercase()) == Some(from_lower.clone()) {
                med.group = (!to.is_empty()).then(|| to.to_string());
                med.updated_at = now.to_rfc3339();
                changed += 1;
            }
        }

        if changed == 0 {
            return Err(StoreError::Validation(format!("no group named '{}'", from.trim())));
        }
        Ok(changed)
    }

    /// Apply `edit` and describe what changed.
    pub fn edit<Tz: TimeZone>(
        &mut self,
        name: &str,
        edit: MedicationEdit,
        now: &DateTime<Tz>,
    ) -> Result<Vec<String>, StoreError>
    where
        Tz::Offset: fmt::Display,
    {
        if let Some(amount) = edit.dosage_amount {
            validate_amount(amount)?;
        }
        if let Some(days) = &edit.schedule_days {
            validate_days(days)?;
        }
        let times = edit
            .schedule_times
            .as_deref()
            .map(validate_times)
            .transpose()?;

        let med = self.find_mut(name)?;
        let mut changes = Vec::new();

        if let Some(amount) = edit.dosage_amount {
            med.dosage_amount = amount;
            changes.push(format!("amount -> {}", amount));
        }

        if let Some(unit) = edit.dosage_unit {
            med.dosage_unit = normalize_dosage_unit(&unit);
            changes.push(format!("unit -> {}", med.dosage_unit));
        }

        if let Some(days) = edit.schedule_days {
            let labels: Vec<&str> = days.iter().map(|d| weekday_label(*d as u32)).collect();
            changes.push(format!("days -> {}", labels.join(", ")));
            med.schedule_days = days;
        }

        if let Some(times) = times {
            changes.push(format!("times -> {}", times.join(", ")));
            med.schedule_times = times;
        }

        if let Some(notes) = edit.notes {
            if notes.is_empty() {
                med.notes = None;
                changes.push("notes -> (cleared)".to_string());
            } else {
                changes.push(format!("notes -> {}", notes));
                med.notes = Some(notes);
            }
        }

        if let Some(group) = edit.group {
            if group.is_empty() {
                med.group = None;
                changes.push("group -> (cleared)".to_string());
            } else {
                changes.push(format!("group -> {}", group));
                med.group = Some(group);
            }
        }

        if let Some(enabled) = edit.enable_notifications {
            med.enable_notifications = enabled;
            changes.push(format!(
                "notifications -> {}",
                if enabled { "on" } else { "off" }
            ));
        }

        if !changes.is_empty() {
            med.updated_at = now.to_rfc3339();
        }
        Ok(changes)
    }
}

/// Loads the medication database from disk.
///
/// A missing file is an empty database. The older format (a bare list of
/// medications) is migrated in place. A file that parses as neither is
/// copied to `*.json.corrupted` and an empty database is used instead.
pub fn load_database(path: &Path) -> Result<MedicationDatabase, StoreError> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No database yet, starting empty");
            return Ok(MedicationDatabase::default());
        }
        Err(e) => return Err(StoreError::io(path, e)),
    };

    if let Ok(db) = serde_json::from_str::<MedicationDatabase>(&contents) {
        return Ok(db);
    }

    if let Ok(medications) = serde_json::from_str::<Vec<Medication>>(&contents) {
        tracing::info!(count = medications.len(), "Migrating medication list to database format");
        let db = MedicationDatabase { medications };
        save_database(path, &db)?;
        return Ok(db);
    }

    let backup_path = path.with_extension("json.corrupted");
    tracing::warn!(
        path = %path.display(),
        backup = %backup_path.display(),
        "Medication database is corrupted, starting empty"
    );
    if let Err(e) = fs::copy(path, &backup_path) {
        tracing::error!("Failed to back up corrupted database: {e}");
    }
    Ok(MedicationDatabase::default())
}

/// Saves the database atomically (temp file + rename) with 0600 on unix.
pub fn save_database(path: &Path, db: &MedicationDatabase) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(db)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, &json).map_err(|e| StoreError::io(&temp_path, e))?;

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(StoreError::io(path, e));
    }

    #[cfg(unix)]
    {
        if let Ok(metadata) = fs::metadata(path) {
            let mut perms = metadata.permissions();
            perms.set_mode(0o600);
            if let Err(e) = fs::set_permissions(path, perms) {
                tracing::warn!("Failed to set file permissions: {e}");
            }
        }
    }

    tracing::debug!(path = %path.display(), count = db.medications.len(), "Saved database");
    Ok(())
}

/// One line of `list` output, also emitted as JSON.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StatusRow {
    pub name: String,
    pub dosage: String,
    pub days: Vec<String>,
    pub times: Vec<String>,
    pub group: Option<String>,
    pub notifications: bool,
    pub is_due: bool,
    pub due_at: Option<String>,
    pub overdue_minutes: i64,
    pub previous_slot_at: Option<String>,
    pub next_due_at: Option<String>,
    pub progress_remaining: Option<f64>,
    pub last_taken_at: Option<String>,
}

fn format_instant<Tz: TimeZone>(instant: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    instant.format("%Y-%m-%d %H:%M").to_string()
}

pub fn status_row<Tz: TimeZone>(medication: &Medication, now: &DateTime<Tz>) -> StatusRow
where
    Tz::Offset: fmt::Display,
{
    let schedule = medication.schedule();
    let due = evaluate_due(medication, now);
    let progress = next_dose_progress(medication, now);

    StatusRow {
        name: medication.name.clone(),
        dosage: medication.dosage(),
        days: schedule
            .days
            .iter()
            .map(|d| weekday_label(*d).to_string())
            .collect(),
        times: schedule.times.iter().map(|t| t.to_string()).collect(),
        group: medication.group.clone(),
        notifications: medication.enable_notifications,
        is_due: due.is_due,
        due_at: due.due_at.as_ref().map(format_instant),
        overdue_minutes: due.overdue_ms / 60_000,
        previous_slot_at: progress.previous_slot_at.as_ref().map(format_instant),
        next_due_at: progress.next_due_at.as_ref().map(format_instant),
        progress_remaining: progress.visible.then_some(progress.progress_remaining),
        last_taken_at: last_intake_at(medication, &now.timezone())
            .as_ref()
            .map(format_instant),
    }
}

fn progress_bar(remaining: f64) -> String {
    const WIDTH: usize = 20;
    let filled = (remaining.clamp(0.0, 1.0) * WIDTH as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(WIDTH - filled))
}

fn format_wait(ms: i64) -> String {
    let minutes = ms / 60_000;
    match (minutes / (24 * 60), (minutes / 60) % 24, minutes % 60) {
        (0, 0, m) => format!("{}m", m),
        (0, h, m) => format!("{}h {:02}m", h, m),
        (d, h, _) => format!("{}d {}h", d, h),
    }
}

/// Input for `add`, straight from the CLI.
#[derive(Debug, Clone)]
pub struct NewMedication {
    pub name: String,
    pub dosage_amount: f64,
    pub dosage_unit: String,
    pub schedule_days: Vec<i64>,
    pub schedule_times: Vec<String>,
    pub notes: Option<String>,
    pub group: Option<String>,
    pub enable_notifications: bool,
}

pub fn add_medication(
    path: &Path,
    new: NewMedication,
    now: &DateTime<Local>,
) -> Result<(), StoreError> {
    let mut db = load_database(path)?;

    let mut med = Medication::new(&new.name, new.dosage_amount, &new.dosage_unit);
    med.schedule_days = new.schedule_days;
    med.schedule_times = new.schedule_times;
    med.notes = new.notes;
    med.group = new.group;
    med.enable_notifications = new.enable_notifications;

    db.add(med, now)?;
    save_database(path, &db)?;
    println!("Added medication: {}", new.name.trim());

    if let Some(med) = db.find(new.name.trim()) {
        if let Some(next) = next_dose_progress(med, now).next_due_at {
            println!("  Next dose: {}", format_instant(&next));
        }
    }
    Ok(())
}

pub fn remove_medication(path: &Path, name: &str) -> Result<(), StoreError> {
    let mut db = load_database(path)?;
    let removed = db.remove(name)?;
    save_database(path, &db)?;

    println!("Removed medication: {}", removed.name);
    if !removed.intakes.is_empty() {
        println!("  Discarded {} intake record(s)", removed.intakes.len());
    }
    Ok(())
}

pub fn take_medication(path: &Path, name: &str, now: &DateTime<Local>) -> Result<(), StoreError> {
    let mut db = load_database(path)?;

    let was_due = db
        .find(name)
        .map(|med| is_due(med, now))
        .ok_or_else(|| StoreError::NotFound(name.to_string()))?;

    let med = db.record_intake(name, now)?;
    let (med_name, dose) = (med.name.clone(), med.dosage());
    save_database(path, &db)?;

    println!("Marked '{}' ({}) as taken at {}", med_name, dose, format_instant(now));
    if !was_due {
        println!("  Note: no dose was due right now");
    }
    Ok(())
}

pub fn untake_medication(
    path: &Path,
    name: &str,
    now: &DateTime<Local>,
) -> Result<(), StoreError> {
    let mut db = load_database(path)?;
    let removed = db.undo_intake(name, now)?;
    save_database(path, &db)?;
    println!("Removed intake of '{}' recorded at {}", name, removed.taken_at);
    Ok(())
}

/// Record a dose for every medication that is due at `now`.
pub fn take_due_medications(path: &Path, now: &DateTime<Local>) -> Result<(), StoreError> {
    let mut db = load_database(path)?;

    let due_names: Vec<String> = db
        .medications
        .iter()
        .filter(|med| evaluate_due(med, now).is_due)
        .map(|med| med.name.clone())
        .collect();

    if due_names.is_empty() {
        println!("No medications are currently due.");
        return Ok(());
    }

    for name in &due_names {
        db.record_intake(name, now)?;
    }
    save_database(path, &db)?;
    println!(
        "Marked {} medication(s) as taken at {}: {}",
        due_names.len(),
        format_instant(now),
        due_names.join(", ")
    );
    Ok(())
}

pub fn edit_medication(
    path: &Path,
    name: &str,
    edit: MedicationEdit,
    now: &DateTime<Local>,
) -> Result<(), StoreError> {
    let mut db = load_database(path)?;
    let changes = db.edit(name, edit, now)?;

    if changes.is_empty() {
        println!("No changes specified for '{}'", name);
        return Ok(());
    }

    save_database(path, &db)?;
    println!("Updated '{}': {}", name, changes.join(", "));
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub due_only: bool,
    pub group: Option<String>,
    pub json: bool,
}

/// Rows for `list`, filtered by due state and group.
pub fn collect_status<Tz: TimeZone>(
    db: &MedicationDatabase,
    options: &ListOptions,
    now: &DateTime<Tz>,
) -> Vec<StatusRow>
where
    Tz::Offset: fmt::Display,
{
    let group = options.group.as_ref().map(|g| g.to_lowercase());

    db.medications
        .iter()
        .filter(|med| match &group {
            Some(g) => med.group.as_ref().map(|mg| mg.to_lowercase()).as_ref() == Some(g),
            None => true,
        })
        .map(|med| status_row(med, now))
        .filter(|row| !options.due_only || row.is_due)
        .collect()
}

pub fn list_medications(
    path: &Path,
    options: &ListOptions,
    now: &DateTime<Local>,
) -> Result<(), StoreError> {
    let db = load_database(path)?;
    let rows = collect_status(&db, options, now);

    if options.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        if options.due_only {
            println!("No medications are currently due.");
        } else {
            println!("No medications found.");
        }
        return Ok(());
    }

    if options.due_only {
        println!("\nMedications Due Now:");
    } else {
        println!("\nMedications:");
    }
    println!("{}", "=".repeat(60));

    for row in rows {
        println!("\n{}", row.name);
        println!("  Dose:     {}", row.dosage);
        println!("  Days:     {}", row.days.join(", "));
        println!("  Times:    {}", row.times.join(", "));
        if let Some(group) = &row.group {
            println!("  Group:    {}", group);
        }

        if row.is_due {
            let due_at = row.due_at.as_deref().unwrap_or("-");
            println!(
                "  Status:   DUE since {} ({} overdue)",
                due_at,
                format_wait(row.overdue_minutes * 60_000)
            );
        } else if let (Some(next), Some(remaining)) = (&row.next_due_at, row.progress_remaining) {
            println!("  Next:     {} {}", next, progress_bar(remaining));
            if let Some(previous) = &row.previous_slot_at {
                println!("  Previous: {}", previous);
            }
        } else {
            println!("  Next:     (no schedule)");
        }

        if let Some(last) = &row.last_taken_at {
            println!("  Last:     {}", last);
        }
    }
    println!();
    Ok(())
}

/// List groups, or rename one when `rename` is `(from, to)`.
pub fn manage_groups(
    path: &Path,
    rename: Option<(&str, &str)>,
    now: &DateTime<Local>,
) -> Result<(), StoreError> {
    let mut db = load_database(path)?;

    if let Some((from, to)) = rename {
        let changed = db.rename_group(from, to, now)?;
        save_database(path, &db)?;
        if to.trim().is_empty() {
            println!("Removed group '{}' from {} medication(s)", from.trim(), changed);
        } else {
            println!("Renamed group '{}' to '{}' ({} medication(s))", from.trim(), to.trim(), changed);
        }
        return Ok(());
    }

    let groups = db.groups();
    if groups.is_empty() {
        println!("No groups defined.");
        return Ok(());
    }
    println!("\nGroups:");
    println!("{}", "=".repeat(60));
    for (group, count) in groups {
        println!("  {:<20} {} medication(s)", group, count);
    }
    println!();
    Ok(())
}

/// Print upcoming weekly reminders, soonest first.
pub fn show_upcoming(path: &Path, now: &DateTime<Local>) -> Result<(), StoreError> {
    let db = load_database(path)?;

    let mut reminders: Vec<_> = db
        .medications
        .iter()
        .flat_map(|med| plan_reminders(med, now))
        .collect();
    reminders.sort_by(|a, b| a.first_at.cmp(&b.first_at));

    if reminders.is_empty() {
        println!("No reminders scheduled.");
        return Ok(());
    }

    println!("\nUpcoming Reminders (weekly):");
    println!("{}", "=".repeat(60));
    for reminder in reminders {
        println!(
            "  {}  {:<3} {}  {}: {}  (id {}, in {})",
            format_instant(&reminder.first_at),
            weekday_label(reminder.weekday),
            reminder.time,
            reminder.medication,
            reminder.body,
            reminder.id,
            format_wait((reminder.first_at.clone() - *now).num_milliseconds())
        );
    }
    println!();
    Ok(())
}

/// Adherence over a window: recorded intakes vs. scheduled slots.
#[derive(Debug, Clone, PartialEq)]
pub struct Adherence {
    pub taken: usize,
    pub expected: usize,
}

impl Adherence {
    pub fn percent(&self) -> Option<f64> {
        if self.expected == 0 {
            return None;
        }
        Some((self.taken as f64 / self.expected as f64 * 100.0).min(100.0))
    }
}

/// Intakes within the last `days` days (newest first) and the adherence
/// they represent. Records with unreadable timestamps are kept.
pub fn intakes_within<'a, Tz: TimeZone>(
    medication: &'a Medication,
    days: u32,
    now: &DateTime<Tz>,
) -> (Vec<&'a IntakeRecord>, Adherence) {
    let cutoff = now.clone() - Duration::days(i64::from(days));
    let tz = now.timezone();

    let records: Vec<&IntakeRecord> = medication
        .intakes
        .iter()
        .filter(|record| match parse_intake_timestamp(&record.taken_at, &tz) {
            Some(taken_at) => taken_at >= cutoff && taken_at <= *now,
            None => true,
        })
        .collect();

    let expected = medication.schedule().slots_between(&cutoff, now).len();
    let adherence = Adherence {
        taken: records.len(),
        expected,
    };
    (records, adherence)
}

pub fn display_history(
    path: &Path,
    name: Option<&str>,
    days: u32,
    now: &DateTime<Local>,
) -> Result<(), StoreError> {
    let db = load_database(path)?;

    let meds: Vec<&Medication> = match name {
        Some(name) => vec![db
            .find(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?],
        None => db.medications.iter().collect(),
    };

    if meds.is_empty() {
        println!("No medications found.");
        return Ok(());
    }

    for med in meds {
        let (records, adherence) = intakes_within(med, days, now);

        if records.is_empty() {
            println!("\n{} - No doses in last {} days", med.name, days);
            continue;
        }

        println!("\n{} - History (last {} days)", med.name, days);
        println!("{}", "=".repeat(60));
        for record in &records {
            let when = parse_intake_timestamp(&record.taken_at, &Local)
                .map(|t| format_instant(&t))
                .unwrap_or_else(|| record.taken_at.clone());
            println!("  {} - {}", when, record.dose);
        }

        match adherence.percent() {
            Some(percent) => {
                println!(
                    "\n  Total doses: {} (Scheduled: {})",
                    adherence.taken, adherence.expected
                );
                println!("  Adherence: {:.1}%", percent);
            }
            None => println!("\n  Total doses: {} (nothing scheduled)", adherence.taken),
        }
    }
    println!();
    Ok(())
}
