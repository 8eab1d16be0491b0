//! Lenient string-to-primitive conversion for query and header values.
//!
//! Every helper takes the raw `Option<&str>` straight from a query map or
//! header lookup and falls back to an explicit default instead of failing.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Parse a 32-bit integer, returning `default` on failure or overflow.
pub fn parse_int(value: Option<&str>, default: i32) -> i32 {
    parse_nullable_int(value).unwrap_or(default)
}

/// Parse an integer raised to at least `min`, returning `default` on failure.
pub fn parse_int_min(value: Option<&str>, min: i32, default: i32) -> i32 {
    match parse_nullable_int(value) {
        Some(n) => n.max(min),
        None => default,
    }
}

/// Parse a 32-bit integer, `None` on failure.
pub fn parse_nullable_int(value: Option<&str>) -> Option<i32> {
    non_blank(value).and_then(|v| v.parse().ok())
}

/// Parse a 64-bit integer, returning `default` on failure.
pub fn parse_long(value: Option<&str>, default: i64) -> i64 {
    parse_nullable_long(value).unwrap_or(default)
}

pub fn parse_nullable_long(value: Option<&str>) -> Option<i64> {
    non_blank(value).and_then(|v| v.parse().ok())
}

/// Truthiness from the first character: `t`, `y` and `1` are true.
pub fn parse_bool(value: Option<&str>) -> bool {
    parse_nullable_bool(value).unwrap_or(false)
}

/// Like [`parse_bool`] but `None` for an empty value.
pub fn parse_nullable_bool(value: Option<&str>) -> Option<bool> {
    let leading = non_blank(value)?.chars().next()?.to_ascii_lowercase();
    Some(matches!(leading, 't' | 'y' | '1'))
}

/// Parse a float, `0.0` on failure.
pub fn parse_double(value: Option<&str>) -> f64 {
    non_blank(value)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.0)
}

/// Parse any `FromStr` type (typically an enum), returning `default` on failure.
pub fn parse_enum<T: FromStr>(value: Option<&str>, default: T) -> T {
    parse_nullable_enum(value).unwrap_or(default)
}

/// Parse any `FromStr` type, `None` on failure.
pub fn parse_nullable_enum<T: FromStr>(value: Option<&str>) -> Option<T> {
    non_blank(value).and_then(|v| v.parse().ok())
}

/// Parse a timestamp (RFC 3339, RFC 2822 or a bare `YYYY-MM-DD` date taken
/// as midnight UTC), returning `default` on failure.
pub fn parse_datetime(value: Option<&str>, default: DateTime<Utc>) -> DateTime<Utc> {
    parse_nullable_datetime(value).unwrap_or(default)
}

/// Like [`parse_datetime`] but `None` on failure.
pub fn parse_nullable_datetime(value: Option<&str>) -> Option<DateTime<Utc>> {
    let v = non_blank(value)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(v) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(v) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(v, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Parse a GUID, the nil UUID on failure.
pub fn parse_guid(value: Option<&str>) -> Uuid {
    non_blank(value)
        .and_then(|v| Uuid::parse_str(v).ok())
        .unwrap_or_else(Uuid::nil)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int(Some("42"), 0), 42);
        assert_eq!(parse_int(Some(" -7 "), 0), -7);
        assert_eq!(parse_int(Some("abc"), 50001), 50001);
        assert_eq!(parse_int(None, 5), 5);
        assert_eq!(parse_int(Some(""), 5), 5);
    }

    #[test]
    fn test_parse_long() {
        assert_eq!(parse_long(Some("5000000000"), 0), 5_000_000_000);
        assert_eq!(parse_int(Some("5000000000"), 9), 9);
        assert_eq!(parse_long(Some(" -3 "), 0), -3);
        assert_eq!(parse_long(Some("1e3"), 8), 8);
        assert_eq!(parse_nullable_long(Some("")), None);
    }

    #[test]
    fn test_parse_int_min() {
        assert_eq!(parse_int_min(Some("3"), 10, 0), 10);
        assert_eq!(parse_int_min(Some("30"), 10, 0), 30);
        assert_eq!(parse_int_min(Some("x"), 10, 99), 99);
    }

    #[test]
    fn test_parse_nullable_int() {
        assert_eq!(parse_nullable_int(Some("12")), Some(12));
        assert_eq!(parse_nullable_int(Some("1.5")), None);
        assert_eq!(parse_nullable_int(None), None);
    }

    #[test]
    fn test_parse_bool() {
        for truthy in ["true", "T", "yes", "Y", "1", " y"] {
            assert!(parse_bool(Some(truthy)), "{truthy}");
        }
        for falsy in ["false", "no", "0", "maybe"] {
            assert!(!parse_bool(Some(falsy)), "{falsy}");
        }
        assert!(!parse_bool(None));
        assert_eq!(parse_nullable_bool(Some("  ")), None);
        assert_eq!(parse_nullable_bool(Some("nope")), Some(false));
    }

    #[test]
    fn test_parse_double() {
        assert_eq!(parse_double(Some("2.5")), 2.5);
        assert_eq!(parse_double(Some("x")), 0.0);
    }

    #[derive(Debug, PartialEq)]
    enum Color {
        Red,
        Blue,
    }

    impl FromStr for Color {
        type Err = ();
        fn from_str(s: &str) -> Result<Self, ()> {
            match s.to_ascii_lowercase().as_str() {
                "red" => Ok(Color::Red),
                "blue" => Ok(Color::Blue),
                _ => Err(()),
            }
        }
    }

    #[test]
    fn test_parse_enum() {
        assert_eq!(parse_enum(Some(" BLUE "), Color::Red), Color::Blue);
        assert_eq!(parse_enum(Some("green"), Color::Red), Color::Red);
        assert_eq!(parse_enum(None, Color::Blue), Color::Blue);
        assert_eq!(parse_nullable_enum::<Color>(Some("green")), None);
    }

    #[test]
    fn test_parse_datetime() {
        let fallback = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let parsed = parse_datetime(Some("2024-03-05T10:20:30+02:00"), fallback);
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 5, 8, 20, 30).unwrap());

        let parsed = parse_datetime(Some("2024-03-05"), fallback);
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap());

        let parsed = parse_datetime(Some("Tue, 05 Mar 2024 10:20:30 GMT"), fallback);
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 5, 10, 20, 30).unwrap());

        assert_eq!(parse_datetime(Some("yesterday"), fallback), fallback);
        assert_eq!(parse_nullable_datetime(None), None);
    }

    #[test]
    fn test_parse_guid() {
        let id = Uuid::new_v4();
        assert_eq!(parse_guid(Some(&id.to_string())), id);
        assert_eq!(parse_guid(Some("not-a-guid")), Uuid::nil());
    }
}
