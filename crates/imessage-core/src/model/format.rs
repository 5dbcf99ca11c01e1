//! Display helpers shared by the one-shot commands and the terminal UI.

use std::fmt;

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Compact relative time for list columns: `14:05`, `Yesterday`, `Tue`, `03/18`.
#[must_use]
pub fn short_time<Tz>(date: DateTime<Utc>, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let local = date.with_timezone(&now.timezone());
    let age = now.clone().signed_duration_since(date);
    if age < Duration::hours(24) {
        local.format("%H:%M").to_string()
    } else if age < Duration::hours(48) {
        "Yesterday".to_string()
    } else if age < Duration::days(7) {
        local.format("%a").to_string()
    } else {
        local.format("%m/%d").to_string()
    }
}

/// Longer relative time for message listings, `Unknown` when absent.
#[must_use]
pub fn long_time<Tz>(date: Option<DateTime<Utc>>, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let Some(date) = date else {
        return "Unknown".to_string();
    };
    let local = date.with_timezone(&now.timezone());
    let age = now.clone().signed_duration_since(date);
    if age < Duration::hours(24) {
        local.format("%I:%M %p").to_string()
    } else if age < Duration::hours(48) {
        local.format("Yesterday %I:%M %p").to_string()
    } else if age < Duration::days(7) {
        local.format("%A %I:%M %p").to_string()
    } else {
        local.format("%Y-%m-%d %I:%M %p").to_string()
    }
}

/// Flattens `text` onto one line and cuts it to `max_chars`, ending in `...`.
#[must_use]
pub fn truncate(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= max_chars {
        return flat.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = flat.chars().take(keep).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_short_time_buckets() {
        let now = now();
        assert_eq!(short_time(now - Duration::hours(2), &now), "10:00");
        assert_eq!(short_time(now - Duration::hours(30), &now), "Yesterday");
        assert_eq!(short_time(now - Duration::days(3), &now), "Sun");
        assert_eq!(short_time(now - Duration::days(30), &now), "02/19");
    }

    #[test]
    fn test_long_time() {
        let now = now();
        assert_eq!(long_time(None, &now), "Unknown");
        assert_eq!(long_time(Some(now - Duration::hours(1)), &now), "11:00 AM");
        assert_eq!(
            long_time(Some(now - Duration::days(10)), &now),
            "2024-03-10 12:00 PM"
        );
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("line one\nline two", 40), "line one line two");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
        assert_eq!(truncate("héllo wörld", 8), "héllo...");
    }
}
