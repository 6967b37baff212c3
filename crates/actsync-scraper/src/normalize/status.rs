use std::sync::LazyLock;

use regex::Regex;

use actsync_core::RegistrationStatus;

use super::FieldParseError;

static SPOTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s*(?:spots?|spaces?|openings?|seats?|places?)\b").expect("valid regex")
});

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Maps provider registration wording onto [`RegistrationStatus`].
///
/// Checks run most-specific first: a waitlist mention wins over "full",
/// spot counts decide between open and full, and closed wording is checked
/// before open wording so "unavailable" never reads as "available". Text
/// announcing a future opening is a recognised [`RegistrationStatus::Unknown`].
pub(crate) fn parse_status(raw: &str) -> Result<RegistrationStatus, FieldParseError> {
    let lower = raw.trim().to_lowercase();

    if contains_any(&lower, &["waitlist", "wait list", "waiting list"]) {
        return Ok(RegistrationStatus::Waitlist);
    }
    if let Some(count) = SPOTS
        .captures(&lower)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
    {
        return Ok(if count == 0 {
            RegistrationStatus::Full
        } else {
            RegistrationStatus::Open
        });
    }
    if contains_any(
        &lower,
        &["full", "sold out", "no spots", "no space", "no openings"],
    ) {
        return Ok(RegistrationStatus::Full);
    }
    if contains_any(
        &lower,
        &[
            "closed",
            "ended",
            "cancel",
            "expired",
            "unavailable",
            "not available",
            "in progress",
        ],
    ) {
        return Ok(RegistrationStatus::Closed);
    }
    if contains_any(&lower, &["opens", "coming soon", "not yet open", "starts on"]) {
        return Ok(RegistrationStatus::Unknown);
    }
    if contains_any(
        &lower,
        &["open", "register", "available", "enroll", "book now", "add to cart", "sign up"],
    ) {
        return Ok(RegistrationStatus::Open);
    }

    Err(FieldParseError::new("unrecognised registration status"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(s: &str) -> RegistrationStatus {
        parse_status(s).unwrap()
    }

    #[test]
    fn direct_words() {
        assert_eq!(status("Open"), RegistrationStatus::Open);
        assert_eq!(status("FULL"), RegistrationStatus::Full);
        assert_eq!(status("Registration Closed"), RegistrationStatus::Closed);
        assert_eq!(status("Waitlist"), RegistrationStatus::Waitlist);
    }

    #[test]
    fn waitlist_wins_over_full() {
        assert_eq!(status("Full - Join Waitlist"), RegistrationStatus::Waitlist);
    }

    #[test]
    fn spot_counts() {
        assert_eq!(status("3 spots left"), RegistrationStatus::Open);
        assert_eq!(status("0 spaces remaining"), RegistrationStatus::Full);
    }

    #[test]
    fn unavailable_is_closed_not_open() {
        assert_eq!(status("Unavailable"), RegistrationStatus::Closed);
    }

    #[test]
    fn future_opening_is_unknown() {
        assert_eq!(status("Registration opens Jan 5"), RegistrationStatus::Unknown);
    }

    #[test]
    fn unrecognised_is_error() {
        assert!(parse_status("Ask at front desk").is_err());
    }
}
