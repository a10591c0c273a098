//! Timestamp handling for fire-event properties.
//!
//! Upstream data carries wall-clock UTC timestamps, sometimes with a `Z` or a
//! numeric offset suffix and sometimes naive. The clock fields are always
//! interpreted as UTC regardless of any offset present, matching the data
//! producer's convention.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

/// Seconds in one UTC day.
pub const DAY_SECONDS: f64 = 86_400.0;

/// Parse a timestamp string into epoch seconds.
///
/// Accepts RFC 3339 (`2023-08-14T12:30:00Z`, `2023-08-14T12:30:00+02:00`),
/// naive datetimes with `T` or space separators, and bare dates. Returns
/// `None` on anything unparseable.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        // The offset is discarded: clock fields are re-tagged as UTC.
        return Some(epoch_seconds(&dt.naive_local().and_utc()));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(epoch_seconds(&naive.and_utc()));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(epoch_seconds(&date.and_hms_opt(0, 0, 0)?.and_utc()));
    }
    None
}

fn epoch_seconds(dt: &DateTime<Utc>) -> f64 {
    dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_micros()) / 1e6
}

/// The UTC day containing an epoch timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct DayBucket {
    /// `YYYY-MM-DD`
    pub label: String,
    pub start_ts: f64,
    pub end_ts: f64,
}

/// Bucket an epoch timestamp into its UTC day.
#[must_use]
pub fn day_bucket(ts: f64) -> Option<DayBucket> {
    let dt = DateTime::<Utc>::from_timestamp(ts.floor() as i64, 0)?;
    let date = dt.date_naive();
    let start = date.and_hms_opt(0, 0, 0)?.and_utc();
    let end = start + Duration::days(1);
    Some(DayBucket {
        label: date.to_string(),
        start_ts: start.timestamp() as f64,
        end_ts: end.timestamp() as f64,
    })
}

/// Parse a `YYYY-MM-DD` CLI argument into the epoch of UTC midnight.
///
/// Used as a clap value parser, hence the `String` error type.
pub fn parse_date_arg(value: &str) -> Result<f64, String> {
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date: {value}"))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| format!("Invalid date: {value}"))?;
    Ok(midnight.and_utc().timestamp() as f64)
}

/// Turn an inclusive end-date midnight into the exclusive next-day boundary.
#[must_use]
pub fn end_date_exclusive(end_date_ts: f64) -> f64 {
    end_date_ts + DAY_SECONDS
}

/// True when `ts` falls inside the optional `[start, end)` window.
#[must_use]
pub fn in_range(ts: f64, start_ts: Option<f64>, end_ts: Option<f64>) -> bool {
    if let Some(start) = start_ts
        && ts < start
    {
        return false;
    }
    if let Some(end) = end_ts
        && ts >= end
    {
        return false;
    }
    true
}

/// Format an epoch as an ISO timestamp with a `Z` suffix.
#[must_use]
pub fn to_iso(ts: f64) -> Option<String> {
    let dt = DateTime::<Utc>::from_timestamp(ts.floor() as i64, 0)?;
    Some(dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("2023-08-14T12:30:00Z", 1_692_016_200.0)]
    #[case("2023-08-14T12:30:00", 1_692_016_200.0)]
    #[case("2023-08-14 12:30:00", 1_692_016_200.0)]
    // Offsets are ignored, clock fields are taken as UTC
    #[case("2023-08-14T12:30:00+02:00", 1_692_016_200.0)]
    #[case("2023-08-14", 1_691_971_200.0)]
    fn parses_valid_timestamps(#[case] raw: &str, #[case] expected: f64) {
        assert_eq!(parse_timestamp(raw), Some(expected));
    }

    #[rstest]
    #[case("")]
    #[case("not a date")]
    #[case("2023-13-40T99:00:00Z")]
    #[case("1692016200")]
    fn rejects_invalid_timestamps(#[case] raw: &str) {
        assert_eq!(parse_timestamp(raw), None);
    }

    #[test]
    fn subsecond_precision_survives() {
        let ts = parse_timestamp("2023-08-14T12:30:00.250Z").expect("parses");
        assert!((ts - 1_692_016_200.25).abs() < 1e-6);
    }

    #[test]
    fn day_bucket_covers_one_day() {
        let bucket = day_bucket(1_692_016_200.0).expect("valid epoch");
        assert_eq!(bucket.label, "2023-08-14");
        assert_eq!(bucket.start_ts, 1_691_971_200.0);
        assert_eq!(bucket.end_ts - bucket.start_ts, DAY_SECONDS);
    }

    #[test]
    fn date_arg_roundtrip() {
        let start = parse_date_arg("2023-08-14").expect("valid date");
        assert_eq!(start, 1_691_971_200.0);
        assert_eq!(end_date_exclusive(start), 1_691_971_200.0 + DAY_SECONDS);
        assert!(parse_date_arg("14-08-2023").is_err());
    }

    #[test]
    fn range_is_half_open() {
        let start = Some(100.0);
        let end = Some(200.0);
        assert!(in_range(100.0, start, end));
        assert!(in_range(199.9, start, end));
        assert!(!in_range(200.0, start, end));
        assert!(!in_range(99.9, start, end));
        assert!(in_range(5.0, None, None));
    }

    #[test]
    fn iso_formatting() {
        assert_eq!(
            to_iso(1_692_016_200.0).as_deref(),
            Some("2023-08-14T12:30:00Z")
        );
    }
}
