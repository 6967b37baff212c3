use chrono::{NaiveDate, NaiveTime, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Registration state of an activity, as a closed set.
///
/// Provider strings that do not map cleanly land on [`RegistrationStatus::Unknown`];
/// they are never coerced into one of the known values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Open,
    Full,
    Closed,
    Waitlist,
    #[default]
    Unknown,
}

impl RegistrationStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RegistrationStatus::Open => "open",
            RegistrationStatus::Full => "full",
            RegistrationStatus::Closed => "closed",
            RegistrationStatus::Waitlist => "waitlist",
            RegistrationStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RegistrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(RegistrationStatus::Open),
            "full" => Ok(RegistrationStatus::Full),
            "closed" => Ok(RegistrationStatus::Closed),
            "waitlist" => Ok(RegistrationStatus::Waitlist),
            "unknown" => Ok(RegistrationStatus::Unknown),
            other => Err(format!("unknown registration status \"{other}\"")),
        }
    }
}

/// A set of weekdays stored as a 7-bit mask (bit 0 = Monday).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeekdaySet(u8);

const DAY_CODES: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

impl WeekdaySet {
    pub const EMPTY: WeekdaySet = WeekdaySet(0);
    pub const WEEKDAYS: WeekdaySet = WeekdaySet(0b001_1111);
    pub const WEEKEND: WeekdaySet = WeekdaySet(0b110_0000);
    pub const ALL: WeekdaySet = WeekdaySet(0b111_1111);

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= 1 << day.num_days_from_monday();
    }

    /// Inserts every day from `from` to `to` inclusive, wrapping past Sunday
    /// (so `Sat..=Mon` is Saturday, Sunday, Monday).
    pub fn insert_range(&mut self, from: Weekday, to: Weekday) {
        let mut day = from;
        loop {
            self.insert(day);
            if day == to {
                break;
            }
            day = day.succ();
        }
    }

    pub fn extend(&mut self, other: WeekdaySet) {
        self.0 |= other.0;
    }

    #[must_use]
    pub fn contains(self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = Weekday> {
        [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ]
        .into_iter()
        .filter(move |d| self.contains(*d))
    }

    /// Three-letter lowercase day codes in Monday-first order, as stored in
    /// the `activities.schedule_days` column.
    #[must_use]
    pub fn to_codes(self) -> Vec<String> {
        self.iter()
            .map(|d| DAY_CODES[d.num_days_from_monday() as usize].to_string())
            .collect()
    }

    /// Inverse of [`WeekdaySet::to_codes`]; unknown codes are ignored.
    #[must_use]
    pub fn from_codes<S: AsRef<str>>(codes: &[S]) -> Self {
        let mut set = WeekdaySet::EMPTY;
        for code in codes {
            if let Some(idx) = DAY_CODES.iter().position(|c| *c == code.as_ref()) {
                set.0 |= 1 << idx;
            }
        }
        set
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = WeekdaySet::EMPTY;
        for day in iter {
            set.insert(day);
        }
        set
    }
}

/// An activity listing after field normalization, ready for reconciliation.
///
/// One value exists per `(provider, external_id)` per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedActivity {
    /// The provider's own identifier for the listing (course / barcode number).
    pub external_id: String,
    pub name: String,
    /// Top-level menu section the listing was found under.
    pub category: Option<String>,
    /// Second-level menu entry the listing was found under.
    pub subcategory: Option<String>,
    pub cost_amount: Option<Decimal>,
    pub age_min: Option<i32>,
    pub age_max: Option<i32>,
    pub schedule_days: WeekdaySet,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
    pub location_name: Option<String>,
    pub registration_status: RegistrationStatus,
    pub registration_url: Option<String>,
}

impl NormalizedActivity {
    /// Hex-encoded SHA-256 over every field.
    ///
    /// Two activities with the same hash carry identical content; storage uses
    /// this to tell a real update from a re-sighting.
    #[must_use]
    pub fn content_hash(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        format!("{:x}", Sha256::digest(&bytes))
    }
}
