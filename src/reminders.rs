//! Weekly reminder planning for the notification layer.
//!
//! Each (time token, weekday) pair becomes one reminder repeating weekly.
//! First firings come from the same slot expansion the due logic uses, so
//! a legacy "24:00" entry fires at the following midnight.

use chrono::{DateTime, Datelike, Duration, TimeZone};

use crate::database::Medication;
use crate::dosage::format_dosage;
use crate::time::ParsedTime;

#[derive(Debug, Clone, PartialEq)]
pub struct Reminder<Tz: TimeZone> {
    pub id: i32,
    pub medication: String,
    /// Nominal schedule weekday, 0 = Sunday.
    pub weekday: u32,
    pub time: ParsedTime,
    pub first_at: DateTime<Tz>,
    pub body: String,
}

/// djb2 over UTF-16 code units.
fn hash_to_u32(input: &str) -> u32 {
    input.encode_utf16().fold(5381u32, |h, unit| {
        (h << 5).wrapping_add(h).wrapping_add(u32::from(unit))
    })
}

/// Stable, positive notification id for the `index`-th reminder of a
/// medication. Stays below `i32::MAX` for indexes under 147 million.
pub fn notification_id_for(medication_key: &str, index: u32) -> i32 {
    let base = hash_to_u32(medication_key) % 2_000_000 + 1;
    (base * 1000 + index) as i32
}

pub fn plan_reminders<Tz: TimeZone>(medication: &Medication, now: &DateTime<Tz>) -> Vec<Reminder<Tz>> {
    if !medication.enable_notifications {
        return Vec::new();
    }

    let schedule = medication.schedule();
    if schedule.is_empty() {
        return Vec::new();
    }

    let tz = now.timezone();
    let today = now.date_naive();
    let key = medication.name.to_lowercase();
    let body = format!(
        "Time for your medication: {}",
        format_dosage(medication.dosage_amount, &medication.dosage_unit)
    );

    let mut reminders = Vec::new();
    let mut index = 0;
    for time in &schedule.times {
        for &weekday in &schedule.days {
            // Start a day early so yesterday's "24:00" can still fire today.
            let first_at = (-1..=7)
                .filter_map(|offset| today.checked_add_signed(Duration::days(offset)))
                .filter(|date| date.weekday().num_days_from_sunday() == weekday)
                .filter_map(|date| schedule.slot_on(date, time, &tz))
                .find(|slot| slot > now);

            if let Some(first_at) = first_at {
                reminders.push(Reminder {
                    id: notification_id_for(&key, index),
                    medication: medication.name.clone(),
                    weekday,
                    time: *time,
                    first_at,
                    body: body.clone(),
                });
            }
            index += 1;
        }
    }

    reminders.sort_by(|a, b| a.first_at.cmp(&b.first_at));
    reminders
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

    fn medication(days: &[i64], times: &[&str]) -> Medication {
        let mut med = Medication::new("Aspirin", 500.0, "mg");
        med.schedule_days = days.to_vec();
        med.schedule_times = times.iter().map(|t| t.to_string()).collect();
        med
    }

    #[test]
    fn test_notification_ids() {
        assert_eq!(notification_id_for("", 0), 5_382_000);
        assert_eq!(notification_id_for("a", 2), 177_671_002);
        assert_eq!(
            notification_id_for("aspirin", 3),
            notification_id_for("aspirin", 0) + 3
        );
        for key in ["aspirin", "ibuprofen", "Vitamin D3", "ß-blocker"] {
            assert!(notification_id_for(key, 999) > 0);
        }
    }

    #[test]
    fn test_plan_first_firing_per_slot() {
        // Thursday 12:00: the 20:00 slot is still ahead today, 08:00 is next week.
        let med = medication(&[4], &["08:00", "20:00"]);
        let reminders = plan_reminders(&med, &at(12, 12, 0));
        assert_eq!(reminders.len(), 2);

        assert_eq!(reminders[0].first_at, at(12, 20, 0));
        assert_eq!(reminders[0].id, notification_id_for("aspirin", 1));
        assert_eq!(reminders[1].first_at, at(19, 8, 0));
        assert_eq!(reminders[1].id, notification_id_for("aspirin", 0));
        assert_eq!(reminders[1].body, "Time for your medication: 500 mg");
    }

    #[test]
    fn test_plan_legacy_midnight() {
        let med = medication(&[3], &["24:00"]);
        let reminders = plan_reminders(&med, &at(11, 23, 0));
        assert_eq!(reminders[0].first_at, at(12, 0, 0));
        assert_eq!(reminders[0].weekday, 3);

        let reminders = plan_reminders(&med, &at(12, 0, 10));
        assert_eq!(reminders[0].first_at, at(19, 0, 0));
    }

    #[test]
    fn test_plan_skips_disabled_and_empty() {
        let mut med = medication(&[1, 2], &["08:00"]);
        med.enable_notifications = false;
        assert!(plan_reminders(&med, &at(12, 8, 0)).is_empty());

        let med = medication(&[], &["08:00"]);
        assert!(plan_reminders(&med, &at(12, 8, 0)).is_empty());
    }
}
