use std::collections::HashSet;
use std::path::Path;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use notify_rust::Notification;

use crate::database::{load_database, Medication};
use crate::due::evaluate_due;
use crate::reminders::plan_reminders;

/// Remembers which (medication, due slot) pairs were already notified.
#[derive(Debug, Default)]
pub struct ReminderState {
    day: Option<NaiveDate>,
    sent: HashSet<(String, i64)>,
}

impl ReminderState {
    /// Medications due at `now` whose current slot has not been notified.
    ///
    /// The sent set is cleared whenever the calendar day changes.
    pub fn pending<'a, Tz: TimeZone>(
        &mut self,
        meds: &'a [Medication],
        now: &DateTime<Tz>,
    ) -> Vec<(&'a Medication, DateTime<Tz>)> {
        let today = now.date_naive();
        if self.day != Some(today) {
            if self.day.is_some() {
                tracing::info!(%today, "New day detected, clearing sent reminders");
            }
            self.sent.clear();
            self.day = Some(today);
        }

        meds.iter()
            .filter(|med| med.enable_notifications)
            .filter_map(|med| {
                let due = evaluate_due(med, now);
                if !due.is_due {
                    return None;
                }
                let due_at = due.due_at?;
                let key = (med.name.to_lowercase(), due_at.timestamp());
                (!self.sent.contains(&key)).then_some((med, due_at))
            })
            .collect()
    }

    pub fn mark_sent<Tz: TimeZone>(&mut self, med: &Medication, due_at: &DateTime<Tz>) {
        self.sent
            .insert((med.name.to_lowercase(), due_at.timestamp()));
    }
}

fn send_notification(med: &Medication, due_at: &DateTime<Local>) -> Result<(), String> {
    Notification::new()
        .summary("Medication Reminder")
        .body(&format!(
            "Time to take: {} ({})\nScheduled for: {}",
            med.name,
            med.dosage(),
            due_at.format("%H:%M")
        ))
        .icon("medication")
        .timeout(0) // Don't auto-dismiss
        .show()
        .map(|_| ())
        .map_err(|e| e.to_string())
}

pub fn run_daemon(path: &Path, interval_secs: u64) {
    tracing::info!(
        path = %path.display(),
        interval_secs,
        "Daemon started, checking for medication reminders"
    );
    println!("Press Ctrl+C to stop.");

    let mut state = ReminderState::default();
    let mut announced = false;

    loop {
        let now = Local::now();

        match load_database(path) {
            Ok(db) => {
                if !announced {
                    if let Some(next) = db
                        .medications
                        .iter()
                        .flat_map(|med| plan_reminders(med, &now))
                        .min_by(|a, b| a.first_at.cmp(&b.first_at))
                    {
                        tracing::info!(
                            medication = %next.medication,
                            at = %next.first_at.format("%Y-%m-%d %H:%M"),
                            "Next scheduled reminder"
                        );
                    }
                    announced = true;
                }

                for (med, due_at) in state.pending(&db.medications, &now) {
                    match send_notification(med, &due_at) {
                        Ok(()) => {
                            tracing::info!(
                                medication = %med.name,
                                dose = %med.dosage(),
                                due_at = %due_at.format("%H:%M"),
                                "Reminder sent"
                            );
                            state.mark_sent(med, &due_at);
                        }
                        Err(e) => {
                            tracing::error!(medication = %med.name, "Failed to send notification: {e}");
                        }
                    }
                }
            }
            Err(e) => tracing::warn!("Skipping reminder check: {e}"),
        }

        thread::sleep(Duration::from_secs(interval_secs.max(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 2, day, hour, minute, 0)
            .unwrap()
    }

    fn medication(name: &str, times: &[&str]) -> Medication {
        let mut med = Medication::new(name, 1.0, "tablets");
        med.schedule_times = times.iter().map(|t| t.to_string()).collect();
        med
    }

    #[test]
    fn notifies_each_slot_once() {
        let meds = vec![medication("Aspirin", &["08:00", "12:00"])];
        let mut state = ReminderState::default();

        let pending = state.pending(&meds, &at(12, 8, 1));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].1, at(12, 8, 0));
        state.mark_sent(pending[0].0, &pending[0].1);

        assert!(state.pending(&meds, &at(12, 8, 2)).is_empty());

        // The noon slot is a new due slot.
        let pending = state.pending(&meds, &at(12, 12, 0));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].1, at(12, 12, 0));
    }

    #[test]
    fn unsent_slots_stay_pending() {
        let meds = vec![medication("Aspirin", &["08:00"])];
        let mut state = ReminderState::default();
        assert_eq!(state.pending(&meds, &at(12, 8, 1)).len(), 1);
        assert_eq!(state.pending(&meds, &at(12, 8, 2)).len(), 1);
    }

    #[test]
    fn skips_disabled_and_taken() {
        let mut quiet = medication("Quiet", &["08:00"]);
        quiet.enable_notifications = false;
        let mut taken = medication("Taken", &["08:00"]);
        taken.intakes.push(crate::database::IntakeRecord {
            taken_at: at(12, 8, 0).to_rfc3339(),
            dose: "1 tablets".to_string(),
        });

        let meds = vec![quiet, taken];
        let mut state = ReminderState::default();
        assert!(state.pending(&meds, &at(12, 9, 0)).is_empty());
    }

    #[test]
    fn new_day_clears_sent_set() {
        let meds = vec![medication("Aspirin", &["08:00"])];
        let mut state = ReminderState::default();

        let pending = state.pending(&meds, &at(12, 8, 1));
        state.mark_sent(pending[0].0, &pending[0].1);
        assert!(state.pending(&meds, &at(12, 9, 0)).is_empty());

        let pending = state.pending(&meds, &at(13, 8, 5));
        assert_eq!(pending.len(), 1);
        assert!(state.sent.is_empty());
    }
}
