use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

use super::FieldParseError;

static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,3}(?:,\d{3})+|\d+)(?:\.(\d+))?|\.(\d+)").expect("valid regex")
});

/// Parses a price such as `"$2,642.50"`, `"CA$ 45"` or `"Free"`.
///
/// Currency symbols, thousands separators and surrounding words are ignored.
/// When several amounts appear (`"$40.00 / $35.00 member"`) the first one
/// wins. Amounts with more than two fractional digits are rejected rather
/// than rounded.
pub(crate) fn parse_cost(raw: &str) -> Result<Decimal, FieldParseError> {
    let lower = raw.trim().to_lowercase();
    if lower.starts_with("free") {
        return Ok(Decimal::ZERO);
    }

    let Some(caps) = AMOUNT.captures(&lower) else {
        if lower.contains("free") || lower.contains("no charge") || lower.contains("no cost") {
            return Ok(Decimal::ZERO);
        }
        return Err(FieldParseError::new("no amount found"));
    };

    let whole = caps.get(0).map_or("", |m| m.as_str());
    let end = caps.get(0).map_or(0, |m| m.end());
    let rest = &lower[end..];
    if rest.starts_with(|c: char| c.is_ascii_digit())
        || rest
            .strip_prefix(',')
            .is_some_and(|r| r.starts_with(|c: char| c.is_ascii_digit()))
    {
        return Err(FieldParseError::new(format!(
            "malformed digit grouping in \"{whole}\""
        )));
    }

    let integer = caps.get(1).map_or("0", |m| m.as_str()).replace(',', "");
    let amount = match caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str()) {
        None => integer,
        Some(frac) if (1..=2).contains(&frac.len()) => format!("{integer}.{frac}"),
        Some(frac) => {
            return Err(FieldParseError::new(format!(
                "{} fractional digits in \"{whole}\"",
                frac.len()
            )))
        }
    };

    Decimal::from_str(&amount).map_err(|e| FieldParseError::new(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn thousands_separator_and_cents() {
        assert_eq!(parse_cost("$2,642.50").unwrap(), dec("2642.50"));
    }

    #[test]
    fn free_is_zero() {
        assert_eq!(parse_cost("Free").unwrap(), Decimal::ZERO);
        assert_eq!(parse_cost("FREE - drop in").unwrap(), Decimal::ZERO);
        assert_eq!(parse_cost("Free (ages 3+)").unwrap(), Decimal::ZERO);
    }

    #[test]
    fn whole_dollars_and_single_fraction_digit() {
        assert_eq!(parse_cost("$45").unwrap(), dec("45"));
        assert_eq!(parse_cost("12.5").unwrap(), dec("12.5"));
        assert_eq!(parse_cost(" CA$ 89.00 ").unwrap(), dec("89"));
    }

    #[test]
    fn first_amount_wins() {
        assert_eq!(parse_cost("$40.00 / $35.00 member").unwrap(), dec("40"));
    }

    #[test]
    fn cents_without_leading_zero() {
        assert_eq!(parse_cost("$.50").unwrap(), dec("0.50"));
        assert_eq!(parse_cost("Drop-in .75").unwrap(), dec("0.75"));
        assert!(parse_cost("$.505").is_err());
    }

    #[test]
    fn rejects_three_fraction_digits() {
        assert!(parse_cost("$12.345").is_err());
    }

    #[test]
    fn rejects_bad_grouping() {
        assert!(parse_cost("$1,2345.00").is_err());
    }

    #[test]
    fn rejects_text_without_amount() {
        assert!(parse_cost("TBD").is_err());
        assert!(parse_cost("").is_err());
    }
}
