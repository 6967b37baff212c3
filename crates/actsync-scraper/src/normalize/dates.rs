use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::{Captures, Regex};

use super::FieldParseError;

static DATES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\b(\d{4})-(\d{2})-(\d{2})\b",
        r"|\b(\d{1,2})/(\d{1,2})/(\d{4}|\d{2})\b",
        r"|\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})(?:st|nd|rd|th)?\b(?:,?\s*(\d{4})\b)?",
    ))
    .expect("valid regex")
});

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// A date as written; month-name dates may omit the year.
#[derive(Debug, Clone, Copy)]
struct DateToken {
    year: Option<i32>,
    month: u32,
    day: u32,
}

fn group<T: std::str::FromStr>(caps: &Captures<'_>, idx: usize) -> Option<T> {
    caps.get(idx).and_then(|m| m.as_str().parse().ok())
}

fn token(caps: &Captures<'_>) -> Option<DateToken> {
    if caps.get(1).is_some() {
        return Some(DateToken {
            year: Some(group(caps, 1)?),
            month: group(caps, 2)?,
            day: group(caps, 3)?,
        });
    }
    if let Some(raw_year) = caps.get(6) {
        let year: i32 = raw_year.as_str().parse().ok()?;
        let year = if raw_year.as_str().len() == 2 {
            2000 + year
        } else {
            year
        };
        return Some(DateToken {
            year: Some(year),
            month: group(caps, 4)?,
            day: group(caps, 5)?,
        });
    }
    let month_name = caps.get(7)?.as_str();
    let month = MONTHS.iter().position(|m| *m == month_name)?;
    Some(DateToken {
        year: group(caps, 9),
        month: u32::try_from(month).ok()? + 1,
        day: group(caps, 8)?,
    })
}

fn to_date(t: DateToken, year: i32) -> Result<NaiveDate, FieldParseError> {
    NaiveDate::from_ymd_opt(year, t.month, t.day).ok_or_else(|| {
        FieldParseError::new(format!("invalid date {year}-{:02}-{:02}", t.month, t.day))
    })
}

/// Parses a date or date range into `(start, end)`.
///
/// Accepts ISO (`2025-01-06`), numeric US (`01/06/25`, `1/6/2025`) and
/// month-name (`Jan 6 - Mar 10, 2025`) forms. A month-name start without a
/// year takes the end's year, stepping back one year when that would put it
/// after the end (`Dec 15 - Jan 20, 2026`). A single date is both start and
/// end.
pub(crate) fn parse_date_range(
    raw: &str,
) -> Result<(Option<NaiveDate>, Option<NaiveDate>), FieldParseError> {
    let lower = raw.trim().to_lowercase();
    let tokens: Vec<DateToken> = DATES.captures_iter(&lower).filter_map(|c| token(&c)).collect();

    let (start, end) = match tokens.as_slice() {
        [] => return Err(FieldParseError::new("no dates found")),
        [single] => (*single, *single),
        [first, second, ..] => (*first, *second),
    };

    let Some(end_year) = end.year.or(start.year) else {
        return Err(FieldParseError::new("date has no year"));
    };
    let end_date = to_date(end, end_year)?;

    let start_date = match start.year {
        Some(year) => to_date(start, year)?,
        None => {
            let same_year = to_date(start, end_year)?;
            if same_year > end_date {
                to_date(start, end_year - 1)?
            } else {
                same_year
            }
        }
    };

    if start_date > end_date {
        return Err(FieldParseError::new(format!(
            "date range ends before it starts ({start_date} > {end_date})"
        )));
    }

    Ok((Some(start_date), Some(end_date)))
}
