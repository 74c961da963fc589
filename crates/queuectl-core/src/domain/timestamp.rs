//! Timestamp text format used for persistence.
//!
//! Fixed-width RFC 3339 in UTC with microseconds (`2024-01-01T12:00:00.000000Z`).
//! Because every value has the same width and zone, comparing the text
//! compares the instants, which the claim query relies on.

use chrono::{DateTime, SecondsFormat, Utc};

/// `9999-12-31T23:59:59.999999Z`
const MAX_MICROS: i64 = 253_402_300_799_999_999;
/// `0000-01-01T00:00:00.000000Z`
const MIN_MICROS: i64 = -62_167_219_200_000_000;

/// Clamp into the 4-digit-year range. Outside it chrono writes `+10000-...`,
/// which breaks both the fixed width and `parse`.
pub fn clamp(ts: DateTime<Utc>) -> DateTime<Utc> {
    let micros = ts.timestamp_micros().clamp(MIN_MICROS, MAX_MICROS);
    DateTime::from_timestamp_micros(micros).unwrap_or(ts)
}

/// Latest instant that can be stored.
pub fn max() -> DateTime<Utc> {
    clamp(DateTime::<Utc>::MAX_UTC)
}

pub fn format(ts: DateTime<Utc>) -> String {
    clamp(ts).to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse any RFC 3339 timestamp and normalize it to UTC.
pub fn parse(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(text).map(|ts| ts.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn format_is_fixed_width_utc() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(format(ts), "2024-01-01T12:00:00.000000Z");
    }

    #[test]
    fn text_order_matches_time_order() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 9, 59, 59).unwrap();
        let b = a + Duration::milliseconds(1500);
        assert!(format(a) < format(b));
    }

    #[test]
    fn far_future_is_clamped_to_year_9999() {
        let text = format(DateTime::<Utc>::MAX_UTC);
        assert_eq!(text, "9999-12-31T23:59:59.999999Z");
        assert_eq!(parse(&text).unwrap(), max());

        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert!(format(now) < text);
    }

    #[test]
    fn distant_past_is_clamped_to_year_0() {
        assert_eq!(format(DateTime::<Utc>::MIN_UTC), "0000-01-01T00:00:00.000000Z");
    }

    #[test]
    fn parse_normalizes_offsets() {
        let ts = parse("2024-01-01T21:00:00+09:00").unwrap();
        assert_eq!(format(ts), "2024-01-01T12:00:00.000000Z");
    }
}
