//! Conversion from the store's Apple-epoch timestamps.
//!
//! The store records dates relative to 2001-01-01 00:00:00 UTC. Older
//! databases use seconds, newer ones nanoseconds; anything above 1e9 is
//! treated as nanoseconds.

use chrono::{DateTime, Utc};

/// Seconds between the Unix epoch and the Apple epoch (2001-01-01).
pub const APPLE_EPOCH_OFFSET_SECS: i64 = 978_307_200;

const NANOS_THRESHOLD: i64 = 1_000_000_000;

/// Converts a raw store timestamp to UTC. Zero means "no date".
#[must_use]
pub fn from_apple_time(raw: i64) -> Option<DateTime<Utc>> {
    if raw == 0 {
        return None;
    }
    let (secs, nanos) = if raw.abs() > NANOS_THRESHOLD {
        (raw.div_euclid(1_000_000_000), raw.rem_euclid(1_000_000_000))
    } else {
        (raw, 0)
    };
    DateTime::from_timestamp(
        secs + APPLE_EPOCH_OFFSET_SECS,
        u32::try_from(nanos).unwrap_or(0),
    )
}

/// Converts a UTC time to the store's nanosecond representation.
#[must_use]
pub fn to_apple_time(date: DateTime<Utc>) -> i64 {
    (date.timestamp() - APPLE_EPOCH_OFFSET_SECS) * 1_000_000_000
        + i64::from(date.timestamp_subsec_nanos())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_zero_is_none() {
        assert_eq!(from_apple_time(0), None);
    }

    #[test]
    fn test_seconds_format() {
        let date = from_apple_time(86_400).unwrap();
        assert_eq!(date, Utc.with_ymd_and_hms(2001, 1, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_nanoseconds_format() {
        // 2024-01-01 00:00:00 UTC
        let raw = 725_760_000_i64 * 1_000_000_000;
        let date = from_apple_time(raw).unwrap();
        assert_eq!(date, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_to_apple_time_inverts() {
        let date = Utc.with_ymd_and_hms(2023, 6, 15, 12, 30, 0).unwrap();
        assert_eq!(from_apple_time(to_apple_time(date)), Some(date));
    }
}
