use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::FieldParseError;

/// Age treated as the lower bound for listings labelled only "Adult".
const ADULT_MIN_AGE: i32 = 18;
const MAX_AGE: i32 = 120;

const YEARS: &str = r"(?:y|yr|yrs|year|years)\b\.?";
const MONTHS: &str = r"(?:m|mo|mos|mth|mths|month|months)\b\.?";
const DASH: &str = r"(?:-|–|—|to)";

static MONTH_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(\d{{1,3}})\s*({MONTHS}|{YEARS})\s*{DASH}\s*(\d{{1,3}})\s*({MONTHS}|{YEARS})"
    ))
    .expect("valid regex")
});

static AND_UP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(\d{{1,3}})\s*(?:{YEARS})?\s*(?:\+|(?:and|&)\s*(?:up|over|older))"
    ))
    .expect("valid regex")
});

static UNDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:under|younger than|below)\s*(\d{1,3})").expect("valid regex")
});

/// A bare `N-M` is only an age range after "age(s)" or before a year unit.
static RANGE_AFTER_AGES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\bages?:?\s*(\d{{1,3}})\s*(?:{YEARS})?\s*{DASH}\s*(\d{{1,3}})"
    ))
    .expect("valid regex")
});

static RANGE_IN_YEARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(\d{{1,3}})\s*(?:{YEARS})?\s*{DASH}\s*(\d{{1,3}})\s*{YEARS}"
    ))
    .expect("valid regex")
});

/// Numbers next to these words count something other than age.
static NOT_AGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:(?:grades?|weeks?|wks?|days?|hours?|hrs?|sessions?|classes|lessons?)\b|gr\.)")
        .expect("valid regex")
});

static AGE_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bages?\b").expect("valid regex"));

static SINGLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^(?:ages?:?\s*)?(\d{{1,3}})\s*(?:{YEARS})?(?:\s*old)?$"))
        .expect("valid regex")
});

static ADULT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\badults?\b").expect("valid regex"));

fn num(caps: &Captures<'_>, idx: usize) -> Option<i32> {
    caps.get(idx).and_then(|m| m.as_str().parse().ok())
}

fn to_years(value: i32, unit: &str) -> i32 {
    if unit.starts_with('m') {
        value / 12
    } else {
        value
    }
}

/// Parses an age restriction into `(min, max)` in whole years.
///
/// Recognised shapes: `"Ages 8-14"`, `"8 - 14 yrs"`, `"6+"`,
/// `"5 yrs and up"`, `"Under 6"`, `"18 mo - 3 yrs"`, `"Age 4"`, `"Adult"`.
/// Month bounds are rounded down to years. Anything else is an error; the
/// caller records it and leaves both bounds empty rather than guessing.
pub(crate) fn parse_age_range(raw: &str) -> Result<(Option<i32>, Option<i32>), FieldParseError> {
    let lower = raw.trim().to_lowercase();
    if lower.is_empty() {
        return Err(FieldParseError::new("empty age text"));
    }
    if NOT_AGE.is_match(&lower) && !AGE_WORD.is_match(&lower) {
        return Err(FieldParseError::new("numbers do not describe an age"));
    }

    let parsed = if let Some(c) = MONTH_RANGE.captures(&lower) {
        let min = num(&c, 1).map(|v| to_years(v, &c[2]));
        let max = num(&c, 3).map(|v| to_years(v, &c[4]));
        (min, max)
    } else if let Some(c) = AND_UP.captures(&lower) {
        (num(&c, 1), None)
    } else if let Some(c) = UNDER.captures(&lower) {
        (None, num(&c, 1).map(|v| (v - 1).max(0)))
    } else if let Some(c) = RANGE_AFTER_AGES
        .captures(&lower)
        .or_else(|| RANGE_IN_YEARS.captures(&lower))
    {
        (num(&c, 1), num(&c, 2))
    } else if let Some(c) = SINGLE.captures(&lower) {
        let age = num(&c, 1);
        (age, age)
    } else if ADULT.is_match(&lower) {
        (Some(ADULT_MIN_AGE), None)
    } else {
        return Err(FieldParseError::new("unrecognised age format"));
    };

    validate(parsed)
}

fn validate(
    (min, max): (Option<i32>, Option<i32>),
) -> Result<(Option<i32>, Option<i32>), FieldParseError> {
    for bound in [min, max].into_iter().flatten() {
        if bound > MAX_AGE {
            return Err(FieldParseError::new(format!("implausible age {bound}")));
        }
    }
    if let (Some(lo), Some(hi)) = (min, max) {
        if lo > hi {
            return Err(FieldParseError::new(format!("inverted age range {lo}-{hi}")));
        }
    }
    Ok((min, max))
}
