use std::sync::LazyLock;

use chrono::{NaiveTime, Weekday};
use regex::Regex;

use actsync_core::WeekdaySet;

use super::FieldParseError;

const DAY: &str = r"(mon(?:days?)?|tue(?:s(?:days?)?)?|tu|wed(?:s|nesdays?)?|we|thu(?:r(?:s(?:days?)?)?)?|th|fri(?:days?)?|fr|sat(?:urdays?)?|sa|sun(?:days?)?|su)";

static DAY_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"\b{DAY}\b\.?")).expect("valid regex"));

/// `"9 - 10:30 am"`: a bare start hour that only reads as a time because of
/// the meridiem time after the dash.
static BARE_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[^:\d])(\d{1,2})\s*(-|–)\s*(\d{1,2}(?::\d{2})?\s*[ap]\.?\s?m)")
        .expect("valid regex")
});

static TIMES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(\d{1,2})(?::(\d{2}))?\s*([ap])\.?\s?m\b\.?|\b(\d{1,2}):(\d{2})\b|\b(noon|midnight)\b",
    )
    .expect("valid regex")
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Schedule {
    pub days: WeekdaySet,
    pub start: Option<NaiveTime>,
    pub end: Option<NaiveTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Meridiem {
    Am,
    Pm,
}

#[derive(Debug, Clone, Copy)]
struct ClockToken {
    hour: u32,
    minute: u32,
    meridiem: Option<Meridiem>,
}

impl ClockToken {
    fn resolve(self, meridiem: Option<Meridiem>) -> Option<NaiveTime> {
        let hour = match meridiem {
            Some(_) if self.hour == 0 || self.hour > 12 => return None,
            Some(Meridiem::Am) => self.hour % 12,
            Some(Meridiem::Pm) => self.hour % 12 + 12,
            None => self.hour,
        };
        NaiveTime::from_hms_opt(hour, self.minute, 0)
    }
}

fn weekday(token: &str) -> Option<Weekday> {
    let t = token.trim_end_matches('.');
    let day = match t.get(..2)? {
        "mo" => Weekday::Mon,
        "tu" => Weekday::Tue,
        "we" => Weekday::Wed,
        "th" => Weekday::Thu,
        "fr" => Weekday::Fri,
        "sa" => Weekday::Sat,
        "su" => Weekday::Sun,
        _ => return None,
    };
    Some(day)
}

#[derive(Debug, Clone, Copy)]
struct DayToken {
    start: usize,
    end: usize,
    day: Weekday,
    short: bool,
}

fn is_separator(c: char) -> bool {
    matches!(c, '/' | ',' | '&' | '-' | '–')
}

fn is_range_joiner(between: &str) -> bool {
    matches!(between.trim(), "-" | "–" | "to" | "through" | "thru")
}

fn is_list_joiner(between: &str) -> bool {
    let t = between.trim();
    t.is_empty() || t == "and" || is_range_joiner(t) || t.chars().all(is_separator)
}

/// Day names found in `lower`. Two-letter forms ("we", "su") are ordinary
/// words too, so they only count when touching a separator or another day.
fn day_tokens(lower: &str) -> Vec<DayToken> {
    let found: Vec<DayToken> = DAY_TOKEN
        .find_iter(lower)
        .filter_map(|m| {
            Some(DayToken {
                start: m.start(),
                end: m.end(),
                day: weekday(m.as_str())?,
                short: m.as_str().trim_end_matches('.').len() == 2,
            })
        })
        .collect();

    found
        .iter()
        .enumerate()
        .filter(|&(i, tok)| {
            if !tok.short {
                return true;
            }
            let touches_separator = lower[..tok.start].chars().next_back().is_some_and(is_separator)
                || lower[tok.end..].chars().next().is_some_and(is_separator);
            let after_day = i
                .checked_sub(1)
                .and_then(|j| found.get(j))
                .is_some_and(|prev| is_list_joiner(&lower[prev.end..tok.start]));
            let before_day = found
                .get(i + 1)
                .is_some_and(|next| is_list_joiner(&lower[tok.end..next.start]));
            touches_separator || after_day || before_day
        })
        .map(|(_, tok)| *tok)
        .collect()
}

fn parse_days(lower: &str) -> WeekdaySet {
    let mut days = WeekdaySet::EMPTY;
    if lower.contains("weekday") {
        days.extend(WeekdaySet::WEEKDAYS);
    }
    if lower.contains("weekend") {
        days.extend(WeekdaySet::WEEKEND);
    }
    if lower.contains("daily") || lower.contains("every day") {
        days.extend(WeekdaySet::ALL);
    }

    let tokens = day_tokens(lower);
    let mut i = 0;
    while let Some(tok) = tokens.get(i) {
        match tokens.get(i + 1) {
            Some(next) if is_range_joiner(&lower[tok.end..next.start]) => {
                days.insert_range(tok.day, next.day);
                i += 2;
            }
            _ => {
                days.insert(tok.day);
                i += 1;
            }
        }
    }
    days
}

fn parse_clock_tokens(lower: &str) -> Vec<ClockToken> {
    let text = BARE_START.replace_all(lower, "${1}${2}:00 ${3} ${4}");
    TIMES
        .captures_iter(&text)
        .filter_map(|caps| {
            if let Some(word) = caps.get(6) {
                let hour = if word.as_str() == "noon" { 12 } else { 0 };
                return Some(ClockToken {
                    hour,
                    minute: 0,
                    meridiem: None,
                });
            }
            if let Some(hour) = caps.get(1) {
                let meridiem = match caps.get(3).map(|m| m.as_str()) {
                    Some("a") => Meridiem::Am,
                    _ => Meridiem::Pm,
                };
                return Some(ClockToken {
                    hour: hour.as_str().parse().ok()?,
                    minute: caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?,
                    meridiem: Some(meridiem),
                });
            }
            Some(ClockToken {
                hour: caps.get(4)?.as_str().parse().ok()?,
                minute: caps.get(5)?.as_str().parse().ok()?,
                meridiem: None,
            })
        })
        .collect()
}

/// Resolves a start/end pair. A start without AM/PM borrows the end's
/// ("4:30 - 5:30 pm"), switching to AM when that would put it after the end
/// ("11:00 - 1:00 pm").
fn resolve_pair(
    start: ClockToken,
    end: Option<ClockToken>,
) -> Result<(NaiveTime, Option<NaiveTime>), FieldParseError> {
    let invalid =
        |t: ClockToken| FieldParseError::new(format!("invalid time {}:{:02}", t.hour, t.minute));

    let end_time = match end {
        Some(e) => Some(e.resolve(e.meridiem).ok_or_else(|| invalid(e))?),
        None => None,
    };

    let start_time = match (start.meridiem, end.and_then(|e| e.meridiem)) {
        (None, Some(borrowed)) if (1..=12).contains(&start.hour) => {
            let candidate = start.resolve(Some(borrowed)).ok_or_else(|| invalid(start))?;
            match end_time {
                Some(end_time) if candidate > end_time && borrowed == Meridiem::Pm => {
                    start.resolve(Some(Meridiem::Am)).ok_or_else(|| invalid(start))?
                }
                _ => candidate,
            }
        }
        (meridiem, _) => start.resolve(meridiem).ok_or_else(|| invalid(start))?,
    };

    Ok((start_time, end_time))
}

/// Parses meeting days and a time window, e.g. `"Mon, Wed 4:30 - 5:30 PM"`,
/// `"Tu/Th 6pm-7:15pm"`, `"Mon-Fri 9:00 am - noon"`, `"Weekends 10:00"`.
///
/// The first two times found are the start and end. Fails only when neither
/// days nor a time could be found.
pub(crate) fn parse_schedule(raw: &str) -> Result<Schedule, FieldParseError> {
    let lower = raw.trim().to_lowercase();
    let days = parse_days(&lower);
    let tokens = parse_clock_tokens(&lower);

    let (start, end) = match tokens.first() {
        Some(&first) => {
            let (s, e) = resolve_pair(first, tokens.get(1).copied())?;
            (Some(s), e)
        }
        None => (None, None),
    };

    if days.is_empty() && start.is_none() {
        return Err(FieldParseError::new("no days or times found"));
    }

    Ok(Schedule { days, start, end })
}
