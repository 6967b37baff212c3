//! Per-run merge of normalized listings.
//!
//! A listing can be seen more than once in a run (several sections, or a
//! summary row plus its detail page). [`ActivityAccumulator`] keeps one value
//! per external id, merging field by field: the most recent non-empty value
//! wins, except that a value read from a detail page is never overwritten by
//! one read from a summary row.

use std::collections::HashMap;

use actsync_core::{NormalizedActivity, RegistrationStatus};

use crate::types::ListingSource;

/// Bit per mergeable field, set when the current value came from a detail page.
mod field {
    pub const NAME: u16 = 1 << 0;
    pub const CATEGORY: u16 = 1 << 1;
    pub const SUBCATEGORY: u16 = 1 << 2;
    pub const COST: u16 = 1 << 3;
    pub const AGE_MIN: u16 = 1 << 4;
    pub const AGE_MAX: u16 = 1 << 5;
    pub const DAYS: u16 = 1 << 6;
    pub const START: u16 = 1 << 7;
    pub const END: u16 = 1 << 8;
    pub const DATE_START: u16 = 1 << 9;
    pub const DATE_END: u16 = 1 << 10;
    pub const LOCATION: u16 = 1 << 11;
    pub const STATUS: u16 = 1 << 12;
    pub const REG_URL: u16 = 1 << 13;
}

/// Bits of the fields `activity` actually carries a value for.
fn presence_mask(a: &NormalizedActivity) -> u16 {
    [
        (field::NAME, !a.name.is_empty()),
        (field::CATEGORY, a.category.is_some()),
        (field::SUBCATEGORY, a.subcategory.is_some()),
        (field::COST, a.cost_amount.is_some()),
        (field::AGE_MIN, a.age_min.is_some()),
        (field::AGE_MAX, a.age_max.is_some()),
        (field::DAYS, !a.schedule_days.is_empty()),
        (field::START, a.start_time.is_some()),
        (field::END, a.end_time.is_some()),
        (field::DATE_START, a.date_start.is_some()),
        (field::DATE_END, a.date_end.is_some()),
        (field::LOCATION, a.location_name.is_some()),
        (
            field::STATUS,
            a.registration_status != RegistrationStatus::Unknown,
        ),
        (field::REG_URL, a.registration_url.is_some()),
    ]
    .into_iter()
    .filter(|(_, present)| *present)
    .fold(0, |mask, (bit, _)| mask | bit)
}

struct Entry {
    activity: NormalizedActivity,
    from_detail: u16,
}

struct Merge<'a> {
    from_detail: &'a mut u16,
    incoming_is_detail: bool,
}

impl Merge<'_> {
    fn apply<T>(&mut self, bit: u16, slot: &mut T, incoming: T, present: bool) {
        if !present {
            return;
        }
        let held_by_detail = *self.from_detail & bit != 0;
        if self.incoming_is_detail || !held_by_detail {
            *slot = incoming;
            if self.incoming_is_detail {
                *self.from_detail |= bit;
            }
        }
    }

    fn opt<T>(&mut self, bit: u16, slot: &mut Option<T>, incoming: Option<T>) {
        let present = incoming.is_some();
        self.apply(bit, slot, incoming, present);
    }
}

/// Owned by a single run; append-only until [`ActivityAccumulator::into_activities`].
#[derive(Default)]
pub struct ActivityAccumulator {
    order: Vec<String>,
    entries: HashMap<String, Entry>,
    duplicates: usize,
}

impl ActivityAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a normalized activity, merging into any earlier sighting.
    pub fn push(&mut self, activity: NormalizedActivity, source: ListingSource) {
        let is_detail = source == ListingSource::Detail;
        let Some(entry) = self.entries.get_mut(&activity.external_id) else {
            self.order.push(activity.external_id.clone());
            self.entries.insert(
                activity.external_id.clone(),
                Entry {
                    from_detail: if is_detail {
                        presence_mask(&activity)
                    } else {
                        0
                    },
                    activity,
                },
            );
            return;
        };

        self.duplicates += 1;
        let current = &mut entry.activity;
        let mut m = Merge {
            from_detail: &mut entry.from_detail,
            incoming_is_detail: is_detail,
        };

        let name_present = !activity.name.is_empty();
        m.apply(field::NAME, &mut current.name, activity.name, name_present);
        m.opt(field::CATEGORY, &mut current.category, activity.category);
        m.opt(field::SUBCATEGORY, &mut current.subcategory, activity.subcategory);
        m.opt(field::COST, &mut current.cost_amount, activity.cost_amount);
        m.opt(field::AGE_MIN, &mut current.age_min, activity.age_min);
        m.opt(field::AGE_MAX, &mut current.age_max, activity.age_max);
        let days_present = !activity.schedule_days.is_empty();
        m.apply(
            field::DAYS,
            &mut current.schedule_days,
            activity.schedule_days,
            days_present,
        );
        m.opt(field::START, &mut current.start_time, activity.start_time);
        m.opt(field::END, &mut current.end_time, activity.end_time);
        m.opt(field::DATE_START, &mut current.date_start, activity.date_start);
        m.opt(field::DATE_END, &mut current.date_end, activity.date_end);
        m.opt(field::LOCATION, &mut current.location_name, activity.location_name);
        let status_present = activity.registration_status != RegistrationStatus::Unknown;
        m.apply(
            field::STATUS,
            &mut current.registration_status,
            activity.registration_status,
            status_present,
        );
        m.opt(
            field::REG_URL,
            &mut current.registration_url,
            activity.registration_url,
        );
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of pushes that merged into an existing entry.
    #[must_use]
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// The merged activities in first-seen order.
    #[must_use]
    pub fn into_activities(mut self) -> Vec<NormalizedActivity> {
        self.order
            .iter()
            .filter_map(|id| self.entries.remove(id))
            .map(|e| e.activity)
            .collect()
    }
}
