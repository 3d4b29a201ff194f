//! Weekly recurrence expansion.
//!
//! A [`Schedule`] is the normalised form of a medication's stored weekdays
//! and time tokens. It turns them into concrete instants in the caller's
//! time zone. Nothing here reads the wall clock; every query takes `now`.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, NaiveDateTime, TimeZone};

use crate::time::{parse_schedule_times, parse_weekday_set, ParsedTime};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    /// Selected weekdays, 0 = Sunday ... 6 = Saturday.
    pub days: BTreeSet<u32>,
    /// Valid time slots in stored order.
    pub times: Vec<ParsedTime>,
}

impl Schedule {
    pub fn parse(days: &[i64], times: &[String]) -> Self {
        Self {
            days: parse_weekday_set(days),
            times: parse_schedule_times(times),
        }
    }

    /// True when no slot can ever be produced.
    pub fn is_empty(&self) -> bool {
        self.days.is_empty() || self.times.is_empty()
    }

    pub fn runs_on(&self, date: NaiveDate) -> bool {
        self.days.contains(&date.weekday().num_days_from_sunday())
    }

    /// Instant of `time` when scheduled on the nominal day `date`.
    ///
    /// The legacy next-day slot lands on the following calendar day.
    pub fn slot_on<Tz: TimeZone>(
        &self,
        date: NaiveDate,
        time: &ParsedTime,
        tz: &Tz,
    ) -> Option<DateTime<Tz>> {
        let day = date.checked_add_days(Days::new(u64::from(time.day_offset)))?;
        let naive = day.and_hms_opt(time.hour, time.minute, 0)?;
        resolve_local(tz, naive)
    }

    /// Every slot whose nominal day is `date`, or nothing if `date` is not
    /// a selected weekday.
    pub fn slots_for_day<Tz: TimeZone>(&self, date: NaiveDate, tz: &Tz) -> Vec<DateTime<Tz>> {
        if !self.runs_on(date) {
            return Vec::new();
        }
        self.times
            .iter()
            .filter_map(|time| self.slot_on(date, time, tz))
            .collect()
    }

    /// Latest slot that falls on `now`'s calendar day and is not after `now`.
    ///
    /// Yesterday is considered too, so a "24:00" slot on yesterday's weekday
    /// counts as today's midnight. Slots from earlier days never qualify:
    /// a missed dose stops being due once its day is over.
    pub fn latest_due_slot_as_of<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        if self.is_empty() {
            return None;
        }

        let tz = now.timezone();
        let today = now.date_naive();
        let yesterday = today.pred_opt()?;

        [today, yesterday]
            .into_iter()
            .flat_map(|date| self.slots_for_day(date, &tz))
            .filter(|slot| slot.date_naive() == today && slot <= now)
            .max()
    }

    /// All slots from `days_before` calendar days before `now`'s day through
    /// `days_after` days after it, ascending.
    pub fn slots_around<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
        days_before: u64,
        days_after: u64,
    ) -> Vec<DateTime<Tz>> {
        if self.is_empty() {
            return Vec::new();
        }

        let tz = now.timezone();
        let today = now.date_naive();
        let (Some(first), Some(last)) = (
            today.checked_sub_days(Days::new(days_before)),
            today.checked_add_days(Days::new(days_after)),
        ) else {
            return Vec::new();
        };

        let mut slots: Vec<DateTime<Tz>> = first
            .iter_days()
            .take_while(|date| *date <= last)
            .flat_map(|date| self.slots_for_day(date, &tz))
            .collect();
        slots.sort();
        slots
    }

    /// Slots inside the half-open range `[start, end)`, ascending.
    pub fn slots_between<Tz: TimeZone>(
        &self,
        start: &DateTime<Tz>,
        end: &DateTime<Tz>,
    ) -> Vec<DateTime<Tz>> {
        if self.is_empty() || end <= start {
            return Vec::new();
        }

        // One extra day before `start` catches legacy next-day slots.
        let span_days = (end.clone() - start.clone()).num_days().max(0) as u64 + 1;
        let mut slots = self.slots_around(start, 1, span_days);
        slots.retain(|slot| slot >= start && slot < end);
        slots
    }
}

/// Map a local wall-clock time to an instant.
///
/// Ambiguous times (clocks going back) take the earlier instant. Times that
/// do not exist (clocks going forward) are pushed one hour later.
pub fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn tz() -> FixedOffset {
        FixedOffset::east_opt(2 * 3600).unwrap()
    }

    // 2026-02-12 is a Thursday (weekday 4).
    fn at(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
        tz().with_ymd_and_hms(2026, 2, day, hour, minute, 0).unwrap()
    }

    fn schedule(days: &[i64], times: &[&str]) -> Schedule {
        let times: Vec<String> = times.iter().map(|t| t.to_string()).collect();
        Schedule::parse(days, &times)
    }

    #[test]
    fn test_empty_schedules() {
        assert!(schedule(&[], &["08:00"]).is_empty());
        assert!(schedule(&[4], &[]).is_empty());
        assert!(schedule(&[4], &["nonsense", "25:00"]).is_empty());
        assert!(schedule(&[9, -2], &["08:00"]).is_empty());
        assert_eq!(schedule(&[4], &["garbage"]).latest_due_slot_as_of(&at(12, 9, 0)), None);
    }

    #[test]
    fn test_latest_slot_picks_most_recent_today() {
        let sched = schedule(&[4], &["20:00", "08:00", "12:00"]);
        assert_eq!(sched.latest_due_slot_as_of(&at(12, 7, 59)), None);
        assert_eq!(sched.latest_due_slot_as_of(&at(12, 8, 0)), Some(at(12, 8, 0)));
        assert_eq!(sched.latest_due_slot_as_of(&at(12, 12, 30)), Some(at(12, 12, 0)));
        assert_eq!(sched.latest_due_slot_as_of(&at(12, 23, 59)), Some(at(12, 20, 0)));
    }

    #[test]
    fn test_latest_slot_ignores_other_days() {
        // Scheduled Thursday only; on Friday nothing is due any more.
        let sched = schedule(&[4], &["08:00"]);
        assert_eq!(sched.latest_due_slot_as_of(&at(13, 9, 0)), None);
        // Wednesday is not selected either.
        assert_eq!(sched.latest_due_slot_as_of(&at(11, 9, 0)), None);
    }

    #[test]
    fn test_latest_slot_legacy_midnight_rolls_into_today() {
        let sched = schedule(&[4], &["24:00"]);
        // Thursday's 24:00 is Friday 00:00.
        assert_eq!(sched.latest_due_slot_as_of(&at(13, 0, 10)), Some(at(13, 0, 0)));
        // It never counts on Thursday itself.
        assert_eq!(sched.latest_due_slot_as_of(&at(12, 23, 59)), None);
    }

    #[test]
    fn test_weekday_wraparound_saturday_to_sunday() {
        // Saturday 2026-02-14 at 24:00 is Sunday 2026-02-15 00:00.
        let sched = schedule(&[6], &["24:00"]);
        assert_eq!(sched.latest_due_slot_as_of(&at(15, 6, 0)), Some(at(15, 0, 0)));
    }

    #[test]
    fn test_slots_around_sorted_and_windowed() {
        let sched = schedule(&[4], &["20:00", "08:00"]);
        let slots = sched.slots_around(&at(12, 9, 0), 8, 8);
        // Thursdays in window: Feb 5, 12, 19.
        assert_eq!(
            slots,
            vec![
                at(5, 8, 0),
                at(5, 20, 0),
                at(12, 8, 0),
                at(12, 20, 0),
                at(19, 8, 0),
                at(19, 20, 0),
            ]
        );
    }

    #[test]
    fn test_slots_between_is_half_open() {
        let sched = schedule(&[0, 1, 2, 3, 4, 5, 6], &["08:00"]);
        let slots = sched.slots_between(&at(10, 8, 0), &at(13, 8, 0));
        assert_eq!(slots, vec![at(10, 8, 0), at(11, 8, 0), at(12, 8, 0)]);
        assert!(sched.slots_between(&at(13, 8, 0), &at(10, 8, 0)).is_empty());
    }

    #[test]
    fn test_slots_between_includes_legacy_slot_from_previous_day() {
        // Wednesday 24:00 lands on Thursday 00:00, inside the range.
        let sched = schedule(&[3], &["24:00"]);
        let slots = sched.slots_between(&at(12, 0, 0), &at(12, 12, 0));
        assert_eq!(slots, vec![at(12, 0, 0)]);
    }
}
