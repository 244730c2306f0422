//! Typed coercion of loosely formatted reply values: amounts and dates.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

lazy_static! {
    // Three-letter currency code before or after the number
    static ref CURRENCY_CODE: Regex = Regex::new(
        r"^(?i:[a-z]{3})\s*|\s*(?i:[a-z]{3})$"
    ).unwrap();

    static ref NUMERIC: Regex = Regex::new(
        r"^([-+])?\s*(\d[\d\s\u{00a0}',.]*)$"
    ).unwrap();

    // YYYY-MM-DD, optionally followed by a time
    static ref DATE_YMD: Regex = Regex::new(
        r"^(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})(?:[T ].*)?$"
    ).unwrap();

    static ref DATE_SLASH: Regex = Regex::new(
        r"^(\d{1,2})/(\d{1,2})/(\d{4})$"
    ).unwrap();

    static ref DATE_DOTTED: Regex = Regex::new(
        r"^(\d{1,2})\.(\d{1,2})\.(\d{4})$"
    ).unwrap();
}

const CURRENCY_SYMBOLS: [char; 6] = ['$', '€', '£', '¥', '₹', '₽'];

/// Parse a JSON number rendered as text, including exponent notation.
pub fn decimal_from_number(n: &serde_json::Number) -> Option<Decimal> {
    let s = n.to_string();
    Decimal::from_str(&s)
        .or_else(|_| Decimal::from_scientific(&s))
        .ok()
}

/// Parse a human-formatted amount such as `"$1,234.56"`, `"1 234,56 EUR"`
/// or `"(12.00)"`.
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let mut s = s.trim();
    let mut negative = false;

    if let Some(inner) = s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        negative = true;
        s = inner.trim();
    }

    let without_symbols = s.replace(CURRENCY_SYMBOLS, "").replace("zł", "");
    let without_code = CURRENCY_CODE.replace_all(without_symbols.trim(), "");

    let caps = NUMERIC.captures(without_code.trim())?;
    if caps.get(1).is_some_and(|m| m.as_str() == "-") {
        negative = !negative;
    }

    let digits: String = caps[2]
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();

    let value = Decimal::from_str(&normalize_separators(&digits)).ok()?;
    Some(if negative { -value } else { value })
}

/// Resolve thousands and decimal separators into a plain `1234.56` form.
fn normalize_separators(digits: &str) -> String {
    let commas = digits.matches(',').count();
    let dots = digits.matches('.').count();

    match (commas, dots) {
        (0, 0) | (0, 1) => digits.to_string(),
        // 1.234.567
        (0, _) => digits.replace('.', ""),
        (1, 0) => {
            // A single comma with exactly three digits after it groups
            // thousands; otherwise it is the decimal separator
            let decimals = digits.rsplit(',').next().map_or(0, str::len);
            if decimals == 3 {
                digits.replace(',', "")
            } else {
                digits.replace(',', ".")
            }
        }
        (_, 0) => digits.replace(',', ""),
        _ => {
            let last_comma = digits.rfind(',');
            let last_dot = digits.rfind('.');
            if last_comma > last_dot {
                digits.replace('.', "").replace(',', ".")
            } else {
                digits.replace(',', "")
            }
        }
    }
}

/// Parse a date in ISO form, `DD.MM.YYYY`, or a slash form whose day and
/// month can be told apart. The error describes why the value was refused.
pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    let s = s.trim();

    if let Some(caps) = DATE_YMD.captures(s) {
        return ymd(&caps[1], &caps[2], &caps[3]);
    }

    if let Some(caps) = DATE_DOTTED.captures(s) {
        return ymd(&caps[3], &caps[2], &caps[1]);
    }

    if let Some(caps) = DATE_SLASH.captures(s) {
        let first: u32 = caps[1].parse().unwrap_or(0);
        let second: u32 = caps[2].parse().unwrap_or(0);
        return match (first > 12, second > 12) {
            // DD/MM/YYYY
            (true, false) => ymd(&caps[3], &caps[2], &caps[1]),
            // MM/DD/YYYY
            (false, true) => ymd(&caps[3], &caps[1], &caps[2]),
            (false, false) if first == second => ymd(&caps[3], &caps[1], &caps[2]),
            (false, false) => Err(format!("ambiguous day/month order in '{}'", s)),
            (true, true) => Err(format!("invalid date '{}'", s)),
        };
    }

    Err(format!("unrecognized date format '{}'", s))
}

fn ymd(year: &str, month: &str, day: &str) -> Result<NaiveDate, String> {
    let year: i32 = year.parse().map_err(|_| format!("invalid year '{}'", year))?;
    let month: u32 = month.parse().map_err(|_| format!("invalid month '{}'", month))?;
    let day: u32 = day.parse().map_err(|_| format!("invalid day '{}'", day))?;

    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| format!("no such date {:04}-{:02}-{:02}", year, month, day))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_amount_formats() {
        assert_eq!(parse_amount("1234.56"), Some(dec("1234.56")));
        assert_eq!(parse_amount("$1,234.56"), Some(dec("1234.56")));
        assert_eq!(parse_amount("1 234,56 EUR"), Some(dec("1234.56")));
        assert_eq!(parse_amount("1.234.567,89 €"), Some(dec("1234567.89")));
        assert_eq!(parse_amount("USD 2,500"), Some(dec("2500")));
        assert_eq!(parse_amount("12,5"), Some(dec("12.5")));
        assert_eq!(parse_amount("1,000,000"), Some(dec("1000000")));
        assert_eq!(parse_amount("99,99 zł"), Some(dec("99.99")));
    }

    #[test]
    fn test_parse_amount_negative() {
        assert_eq!(parse_amount("-5.00"), Some(dec("-5.00")));
        assert_eq!(parse_amount("(12.00)"), Some(dec("-12.00")));
        assert_eq!(parse_amount("$-3"), Some(dec("-3")));
    }

    #[test]
    fn test_parse_amount_rejects_text() {
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("N/A"), None);
        assert_eq!(parse_amount("twelve"), None);
        assert_eq!(parse_amount("12 apples"), None);
    }

    #[test]
    fn test_decimal_from_number() {
        let n: serde_json::Number = serde_json::from_str("150.75").unwrap();
        assert_eq!(decimal_from_number(&n), Some(dec("150.75")));

        let n: serde_json::Number = serde_json::from_str("1.5e-3").unwrap();
        assert_eq!(decimal_from_number(&n), Some(dec("0.0015")));
    }

    #[test]
    fn test_parse_date_iso_and_dotted() {
        assert_eq!(parse_date("2024-01-15"), Ok(date(2024, 1, 15)));
        assert_eq!(parse_date("2024-01-15T00:00:00Z"), Ok(date(2024, 1, 15)));
        assert_eq!(parse_date("15.01.2024"), Ok(date(2024, 1, 15)));
        assert!(parse_date("2024-02-30").is_err());
    }

    #[test]
    fn test_parse_date_slash_disambiguation() {
        assert_eq!(parse_date("25/12/2024"), Ok(date(2024, 12, 25)));
        assert_eq!(parse_date("12/25/2024"), Ok(date(2024, 12, 25)));
        assert_eq!(parse_date("07/07/2024"), Ok(date(2024, 7, 7)));

        let err = parse_date("03/04/2024").unwrap_err();
        assert!(err.contains("ambiguous"));
    }

    #[test]
    fn test_parse_date_rejects_prose() {
        assert!(parse_date("next Tuesday").is_err());
        assert!(parse_date("").is_err());
    }
}
