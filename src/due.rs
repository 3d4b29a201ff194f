//! Due-state and countdown for a single medication.
//!
//! Everything here is a pure function of `(medication, now)`. The caller
//! supplies `now`; overriding it (tests, `--now`) needs no extra hooks.

use chrono::{DateTime, NaiveDateTime, TimeZone};

use crate::database::Medication;
use crate::schedule::resolve_local;

/// Calendar days scanned on each side of today for the previous/next slot.
pub const PROGRESS_WINDOW_DAYS: u64 = 8;

/// Due state of a medication at one instant.
///
/// `overdue_ms` is never negative and is zero whenever `is_due` is false.
/// `due_at` is `None` only when the schedule yields no slot today.
#[derive(Debug, Clone, PartialEq)]
pub struct DueInfo<Tz: TimeZone> {
    pub is_due: bool,
    pub due_at: Option<DateTime<Tz>>,
    pub overdue_ms: i64,
}

impl<Tz: TimeZone> DueInfo<Tz> {
    fn idle(due_at: Option<DateTime<Tz>>) -> Self {
        Self {
            is_due: false,
            due_at,
            overdue_ms: 0,
        }
    }
}

/// Countdown towards the next scheduled dose.
///
/// `progress_remaining` is 1.0 for a full cycle ahead and 0.0 when due.
#[derive(Debug, Clone, PartialEq)]
pub struct NextDoseProgress<Tz: TimeZone> {
    pub visible: bool,
    pub progress_remaining: f64,
    pub previous_slot_at: Option<DateTime<Tz>>,
    pub next_due_at: Option<DateTime<Tz>>,
    pub ms_until_next_due: i64,
}

impl<Tz: TimeZone> NextDoseProgress<Tz> {
    fn hidden(previous_slot_at: Option<DateTime<Tz>>) -> Self {
        Self {
            visible: false,
            progress_remaining: 0.0,
            previous_slot_at,
            next_due_at: None,
            ms_until_next_due: 0,
        }
    }
}

/// Parse a stored intake timestamp into `tz`.
///
/// RFC 3339 is the canonical form. Naive "YYYY-MM-DD HH:MM:SS" and the
/// older "HH:MM:SS - YYYY/MM/DD" rendering are read as local wall-clock
/// times in `tz`.
pub fn parse_intake_timestamp<Tz: TimeZone>(raw: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(tz));
    }

    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%H:%M:%S - %Y/%m/%d"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .and_then(|naive| resolve_local(tz, naive))
}

/// Most recent intake: `intakes[0]`, else `last_intake`.
pub fn last_intake_at<Tz: TimeZone>(medication: &Medication, tz: &Tz) -> Option<DateTime<Tz>> {
    let latest = medication
        .intakes
        .first()
        .or(medication.last_intake.as_ref())?;
    parse_intake_timestamp(&latest.taken_at, tz)
}

/// Decide whether today's latest passed slot is still unacknowledged.
pub fn evaluate_due<Tz: TimeZone>(medication: &Medication, now: &DateTime<Tz>) -> DueInfo<Tz> {
    let Some(latest_slot) = medication.schedule().latest_due_slot_as_of(now) else {
        return DueInfo::idle(None);
    };

    // An intake exactly at the slot satisfies it.
    if let Some(taken_at) = last_intake_at(medication, &now.timezone()) {
        if taken_at >= latest_slot {
            return DueInfo::idle(Some(latest_slot));
        }
    }

    let overdue_ms = (now.clone() - latest_slot.clone()).num_milliseconds().max(0);
    DueInfo {
        is_due: true,
        due_at: Some(latest_slot),
        overdue_ms,
    }
}

pub fn is_due<Tz: TimeZone>(medication: &Medication, now: &DateTime<Tz>) -> bool {
    evaluate_due(medication, now).is_due
}

/// Locate the surrounding slots and how much of the current cycle remains.
pub fn next_dose_progress<Tz: TimeZone>(
    medication: &Medication,
    now: &DateTime<Tz>,
) -> NextDoseProgress<Tz> {
    let due = evaluate_due(medication, now);
    if due.is_due {
        return NextDoseProgress {
            visible: true,
            progress_remaining: 0.0,
            previous_slot_at: due.due_at.clone(),
            next_due_at: due.due_at,
            ms_until_next_due: 0,
        };
    }

    let schedule = medication.schedule();
    if schedule.is_empty() {
        return NextDoseProgress::hidden(None);
    }

    let mut previous_slot = None;
    let mut next_slot = None;
    for slot in schedule.slots_around(now, PROGRESS_WINDOW_DAYS, PROGRESS_WINDOW_DAYS) {
        if slot <= *now {
            previous_slot = Some(slot);
        } else {
            next_slot = Some(slot);
            break;
        }
    }

    let Some(next_slot) = next_slot else {
        return NextDoseProgress::hidden(previous_slot);
    };

    let ms_until_next_due = (next_slot.clone() - now.clone()).num_milliseconds().max(0);
    let progress_remaining = match &previous_slot {
        None => 1.0,
        Some(previous) => {
            let cycle_ms = (next_slot.clone() - previous.clone()).num_milliseconds();
            if cycle_ms <= 0 {
                if ms_until_next_due > 0 {
                    1.0
                } else {
                    0.0
                }
            } else {
                (ms_until_next_due as f64 / cycle_ms as f64).clamp(0.0, 1.0)
            }
        }
    };

    NextDoseProgress {
        visible: true,
        progress_remaining,
        previous_slot_at: previous_slot,
        next_due_at: Some(next_slot),
        ms_until_next_due,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::IntakeRecord;
    use chrono::{Datelike, FixedOffset};

    const MINUTE_MS: i64 = 60 * 1000;

    fn tz() -> FixedOffset {
        FixedOffset::east_opt(3600).unwrap()
    }

    // 2026-02-12 is a Thursday.
    fn at(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
        tz().with_ymd_and_hms(2026, 2, day, hour, minute, 0).unwrap()
    }

    fn medication(days: &[i64], times: &[&str]) -> Medication {
        let mut med = Medication::new("Test Medication", 1.0, "mg");
        med.schedule_days = days.to_vec();
        med.schedule_times = times.iter().map(|t| t.to_string()).collect();
        med
    }

    fn intake(taken_at: DateTime<FixedOffset>) -> IntakeRecord {
        IntakeRecord {
            taken_at: taken_at.to_rfc3339(),
            dose: "1 mg".to_string(),
        }
    }

    fn weekday(now: &DateTime<FixedOffset>) -> i64 {
        i64::from(now.weekday().num_days_from_sunday())
    }

    #[test]
    fn test_due_when_slot_reached_without_intake() {
        let now = at(12, 8, 0);
        let med = medication(&[weekday(&now)], &["08:00"]);
        let info = evaluate_due(&med, &now);
        assert!(info.is_due);
        assert_eq!(info.due_at, Some(at(12, 8, 0)));
        assert_eq!(info.overdue_ms, 0);
    }

    #[test]
    fn test_not_due_before_first_slot() {
        let now = at(12, 7, 59);
        let med = medication(&[weekday(&now)], &["08:00"]);
        assert!(!is_due(&med, &now));
        assert_eq!(evaluate_due(&med, &now).due_at, None);
    }

    #[test]
    fn test_not_due_after_tracked_intake() {
        let now = at(12, 8, 30);
        let mut med = medication(&[weekday(&now)], &["08:00"]);
        med.intakes.push(intake(at(12, 8, 5)));
        let info = evaluate_due(&med, &now);
        assert!(!info.is_due);
        assert_eq!(info.due_at, Some(at(12, 8, 0)));
        assert_eq!(info.overdue_ms, 0);
    }

    #[test]
    fn test_intake_exactly_at_slot_counts() {
        let now = at(12, 9, 0);
        let mut med = medication(&[weekday(&now)], &["08:00"]);
        med.intakes.push(intake(at(12, 8, 0)));
        assert!(!is_due(&med, &now));
    }

    #[test]
    fn test_later_slot_due_when_only_earlier_tracked() {
        let now = at(12, 12, 1);
        let mut med = medication(&[weekday(&now)], &["08:00", "12:00"]);
        med.intakes.push(intake(at(12, 8, 10)));
        let info = evaluate_due(&med, &now);
        assert!(info.is_due);
        assert_eq!(info.due_at, Some(at(12, 12, 0)));
        assert_eq!(info.overdue_ms, MINUTE_MS);
    }

    #[test]
    fn test_legacy_midnight_due_on_following_day() {
        let now = at(13, 0, 10);
        let previous_day = (weekday(&now) + 6) % 7;
        let med = medication(&[previous_day], &["24:00"]);
        let info = evaluate_due(&med, &now);
        assert!(info.is_due);
        assert_eq!(info.due_at, Some(at(13, 0, 0)));
        assert_eq!(info.overdue_ms, 10 * MINUTE_MS);
    }

    #[test]
    fn test_overdue_duration() {
        let now = at(12, 9, 30);
        let med = medication(&[weekday(&now)], &["08:00"]);
        let info = evaluate_due(&med, &now);
        assert!(info.is_due);
        assert_eq!(info.overdue_ms, 90 * MINUTE_MS);

        let mut tracked = med.clone();
        tracked.intakes.push(intake(at(12, 8, 10)));
        let info = evaluate_due(&tracked, &now);
        assert!(!info.is_due);
        assert_eq!(info.overdue_ms, 0);
    }

    #[test]
    fn test_overdue_grows_until_tracked() {
        let med = medication(&[4], &["08:00"]);
        let mut last = -1;
        for minute in [0, 1, 15, 59] {
            let info = evaluate_due(&med, &at(12, 9, minute));
            assert!(info.overdue_ms > last);
            last = info.overdue_ms;
        }
    }

    #[test]
    fn test_stale_missed_dose_is_not_due() {
        // Thursday dose never taken; on Friday it no longer shows as due.
        let med = medication(&[4], &["08:00"]);
        assert!(!is_due(&med, &at(13, 9, 0)));
    }

    #[test]
    fn test_last_intake_fallback_and_unparseable() {
        let now = at(12, 9, 0);
        let mut med = medication(&[4], &["08:00"]);
        med.last_intake = Some(intake(at(12, 8, 30)));
        assert!(!is_due(&med, &now));

        // The intake list wins over the fallback field.
        med.intakes.push(intake(at(11, 8, 30)));
        assert!(is_due(&med, &now));

        med.intakes[0].taken_at = "not a timestamp".to_string();
        assert!(is_due(&med, &now));
    }

    #[test]
    fn test_parse_intake_timestamp_formats() {
        let expected = at(12, 8, 5);
        assert_eq!(
            parse_intake_timestamp("2026-02-12T07:05:00Z", &tz()),
            Some(expected)
        );
        assert_eq!(
            parse_intake_timestamp("2026-02-12 08:05:00", &tz()),
            Some(expected)
        );
        assert_eq!(
            parse_intake_timestamp("08:05:00 - 2026/02/12", &tz()),
            Some(expected)
        );
        assert_eq!(parse_intake_timestamp("", &tz()), None);
        assert_eq!(parse_intake_timestamp("yesterday", &tz()), None);
    }

    #[test]
    fn test_evaluation_is_repeatable() {
        let now = at(12, 10, 0);
        let med = medication(&[4], &["08:00", "20:00"]);
        assert_eq!(evaluate_due(&med, &now), evaluate_due(&med, &now));
        assert_eq!(next_dose_progress(&med, &now), next_dose_progress(&med, &now));
    }

    #[test]
    fn test_progress_when_due_is_empty_bar() {
        let now = at(12, 8, 30);
        let med = medication(&[4], &["08:00"]);
        let progress = next_dose_progress(&med, &now);
        assert!(progress.visible);
        assert_eq!(progress.progress_remaining, 0.0);
        assert_eq!(progress.previous_slot_at, Some(at(12, 8, 0)));
        assert_eq!(progress.next_due_at, Some(at(12, 8, 0)));
        assert_eq!(progress.ms_until_next_due, 0);
    }

    #[test]
    fn test_progress_between_daily_slots() {
        let now = at(12, 14, 0);
        let mut med = medication(&[0, 1, 2, 3, 4, 5, 6], &["08:00", "20:00"]);
        med.intakes.push(intake(at(12, 8, 5)));
        let progress = next_dose_progress(&med, &now);
        assert!(progress.visible);
        assert_eq!(progress.previous_slot_at, Some(at(12, 8, 0)));
        assert_eq!(progress.next_due_at, Some(at(12, 20, 0)));
        assert_eq!(progress.ms_until_next_due, 6 * 60 * MINUTE_MS);
        assert!((progress.progress_remaining - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_progress_weekly_cadence() {
        // Thursday only; on Friday 08:00 six of seven days remain.
        let now = at(13, 8, 0);
        let med = medication(&[4], &["08:00"]);
        let progress = next_dose_progress(&med, &now);
        assert!(progress.visible);
        assert_eq!(progress.previous_slot_at, Some(at(12, 8, 0)));
        assert_eq!(progress.next_due_at, Some(at(19, 8, 0)));
        assert!((progress.progress_remaining - 6.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_progress_hidden_without_schedule() {
        let now = at(12, 8, 0);
        for med in [
            medication(&[], &["08:00"]),
            medication(&[4], &[]),
            medication(&[4], &["bogus"]),
        ] {
            let progress = next_dose_progress(&med, &now);
            assert!(!progress.visible);
            assert_eq!(progress.next_due_at, None);
            assert_eq!(progress.ms_until_next_due, 0);
        }
    }
}
