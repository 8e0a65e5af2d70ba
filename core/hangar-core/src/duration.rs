//! Elapsed-time computation for live timers and stop payloads.
//!
//! The computation has no temporal coupling: the reference instant is
//! always injected, so live display and the authoritative stop duration
//! share one function. Negative spans clamp to zero (clock skew defense).

use chrono::{DateTime, Utc};

/// Whole seconds between a session start and a reference instant,
/// never negative.
pub fn elapsed_secs(started_at: DateTime<Utc>, reference: DateTime<Utc>) -> u64 {
    reference
        .signed_duration_since(started_at)
        .num_seconds()
        .max(0) as u64
}

/// `HH:MM:SS` rendering for timer rows. Hours widen past two digits
/// rather than wrap.
pub fn format_hms(total_secs: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 6, h, m, s).unwrap()
    }

    #[test]
    fn ninety_second_span() {
        assert_eq!(elapsed_secs(at(10, 0, 0), at(10, 1, 30)), 90);
    }

    #[test]
    fn zero_span() {
        assert_eq!(elapsed_secs(at(10, 0, 0), at(10, 0, 0)), 0);
    }

    #[test]
    fn skewed_clock_clamps_to_zero() {
        assert_eq!(elapsed_secs(at(10, 1, 30), at(10, 0, 0)), 0);
    }

    #[test]
    fn subsecond_precision_floors() {
        let start = at(10, 0, 0);
        let reference = start + chrono::Duration::milliseconds(1999);
        assert_eq!(elapsed_secs(start, reference), 1);
    }

    #[test]
    fn formats_hours_minutes_seconds() {
        assert_eq!(format_hms(0), "00:00:00");
        assert_eq!(format_hms(90), "00:01:30");
        assert_eq!(format_hms(3661), "01:01:01");
        assert_eq!(format_hms(360_000), "100:00:00");
    }
}
