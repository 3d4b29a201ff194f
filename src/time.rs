use std::collections::BTreeSet;
use std::fmt;

/// A single time-of-day slot parsed from a schedule token.
///
/// `day_offset` is `1` only for the legacy `"24:00"` token, which means
/// midnight at the start of the day after the nominal schedule day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParsedTime {
    pub hour: u32,
    pub minute: u32,
    pub day_offset: u32,
}

impl ParsedTime {
    pub fn new(hour: u32, minute: u32) -> Self {
        Self {
            hour,
            minute,
            day_offset: 0,
        }
    }

    fn next_day_midnight() -> Self {
        Self {
            hour: 0,
            minute: 0,
            day_offset: 1,
        }
    }
}

impl fmt::Display for ParsedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.day_offset > 0 {
            write!(f, "24:00")
        } else {
            write!(f, "{:02}:{:02}", self.hour, self.minute)
        }
    }
}

/// Parse one schedule time token.
///
/// Accepts:
/// - 24-hour form: "8:00", "08:30", "23:59", and the legacy "24:00"
/// - 12-hour form: "8:00 PM", "12:15am", "9:45   Am"
///
/// Minutes must always be two digits. Anything else yields `None`; callers
/// drop such tokens instead of failing the whole schedule.
pub fn parse_time_token(token: &str) -> Option<ParsedTime> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    let (hour_part, rest) = token.split_once(':')?;
    if hour_part.is_empty() || hour_part.len() > 2 || !all_digits(hour_part) {
        return None;
    }

    let minute_part = rest.get(..2)?;
    if !all_digits(minute_part) {
        return None;
    }
    let suffix = rest[2..].trim_start();

    let hour = hour_part.parse::<u32>().ok()?;
    let minute = minute_part.parse::<u32>().ok()?;
    if minute >= 60 {
        return None;
    }

    if suffix.is_empty() {
        return match hour {
            24 if minute == 0 => Some(ParsedTime::next_day_midnight()),
            0..=23 => Some(ParsedTime::new(hour, minute)),
            _ => None,
        };
    }

    let is_pm = if suffix.eq_ignore_ascii_case("pm") {
        true
    } else if suffix.eq_ignore_ascii_case("am") {
        false
    } else {
        return None;
    };

    if !(1..=12).contains(&hour) {
        return None;
    }

    let hour = match (is_pm, hour) {
        (false, 12) => 0,
        (true, 12) => 12,
        (true, h) => h + 12,
        (false, h) => h,
    };
    Some(ParsedTime::new(hour, minute))
}

fn all_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

/// Split raw schedule entries into individual tokens.
///
/// Older rows store several times in one entry ("08:00, 20:00").
pub fn split_time_tokens(entries: &[String]) -> impl Iterator<Item = &str> {
    entries
        .iter()
        .flat_map(|entry| entry.split(','))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Parse every valid time slot from the raw schedule entries, in order.
pub fn parse_schedule_times(entries: &[String]) -> Vec<ParsedTime> {
    split_time_tokens(entries)
        .filter_map(parse_time_token)
        .collect()
}

/// Normalise stored weekday numbers (0 = Sunday ... 6 = Saturday).
///
/// Out-of-range values are discarded and duplicates collapse.
pub fn parse_weekday_set(days: &[i64]) -> BTreeSet<u32> {
    days.iter()
        .filter(|day| (0..=6).contains(*day))
        .map(|day| *day as u32)
        .collect()
}

const WEEKDAY_NAMES: [&str; 7] = [
    "sunday",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
];

/// Short display name for a weekday number (0 = Sunday).
pub fn weekday_label(day: u32) -> &'static str {
    match day {
        0 => "Sun",
        1 => "Mon",
        2 => "Tue",
        3 => "Wed",
        4 => "Thu",
        5 => "Fri",
        6 => "Sat",
        _ => "?",
    }
}

/// Parse the `--days` argument of the CLI.
///
/// Accepts "daily", "weekdays", "weekends", or a comma list of weekday
/// numbers (0 = Sunday) and English names ("mon", "Tuesday", ...).
/// Unlike the stored schedule this is strict: one bad entry rejects the
/// whole argument.
pub fn parse_days_arg(input: &str) -> Option<Vec<i64>> {
    let lower = input.trim().to_lowercase();

    match lower.as_str() {
        "daily" | "every day" | "all" => return Some(vec![0, 1, 2, 3, 4, 5, 6]),
        "weekdays" => return Some(vec![1, 2, 3, 4, 5]),
        "weekends" | "weekend" => return Some(vec![0, 6]),
        _ => {}
    }

    let mut days = Vec::new();
    for part in lower.split(',').map(str::trim) {
        if part.is_empty() {
            continue;
        }

        let day = if let Ok(num) = part.parse::<i64>() {
            if !(0..=6).contains(&num) {
                return None;
            }
            num
        } else {
            let index = WEEKDAY_NAMES
                .iter()
                .position(|name| part.len() >= 3 && name.starts_with(part))?;
            index as i64
        };

        if !days.contains(&day) {
            days.push(day);
        }
    }

    if days.is_empty() {
        None
    } else {
        days.sort_unstable();
        Some(days)
    }
}
