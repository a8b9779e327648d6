use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{ModelError, Result};

/// Canonical manifest-key format: ISO-8601 UTC at second precision.
pub const INSTANT_KEY_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// One slot of the rolling window: a position plus its quantized UTC time.
///
/// The index is dense and oldest-first within a single run's window. It is
/// what the duplicate registry reasons about when deciding adjacency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetInstant {
    pub index: usize,
    pub time: DateTime<Utc>,
}

impl TargetInstant {
    pub fn new(index: usize, time: DateTime<Utc>) -> Self {
        Self { index, time }
    }

    /// Manifest key for this instant. Stable across runs because the planner
    /// quantizes onto the interval grid before constructing instants.
    pub fn key(&self) -> String {
        self.time.format(INSTANT_KEY_FORMAT).to_string()
    }

    /// Directory component of the frame path (`YYYY-MM-DD`).
    pub fn day_dir(&self) -> String {
        self.time.format("%Y-%m-%d").to_string()
    }

    /// File component of the frame path (`frame_HHMM.jpg`).
    pub fn file_name(&self) -> String {
        self.time.format("frame_%H%M.jpg").to_string()
    }
}

/// Parse a manifest key back into its UTC time.
pub fn parse_instant_key(key: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(key, INSTANT_KEY_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|err| ModelError::InvalidTimestamp(format!("{key}: {err}")))
}

/// Floor a time onto the interval grid.
pub fn quantize(time: DateTime<Utc>, interval_minutes: u32) -> DateTime<Utc> {
    let step = i64::from(interval_minutes) * 60;
    let secs = time.timestamp().div_euclid(step) * step;
    DateTime::from_timestamp(secs, 0).expect("quantized timestamp in range")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn key_round_trips() {
        let time = Utc.with_ymd_and_hms(2026, 3, 14, 15, 45, 0).unwrap();
        let instant = TargetInstant::new(7, time);
        assert_eq!(instant.key(), "2026-03-14T15:45:00Z");
        assert_eq!(parse_instant_key(&instant.key()).unwrap(), time);
    }

    #[test]
    fn quantize_floors_onto_grid() {
        let time = Utc.with_ymd_and_hms(2026, 3, 14, 15, 44, 59).unwrap();
        let floored = quantize(time, 15);
        assert_eq!(floored, Utc.with_ymd_and_hms(2026, 3, 14, 15, 30, 0).unwrap());

        let exact = Utc.with_ymd_and_hms(2026, 3, 14, 15, 45, 0).unwrap();
        assert_eq!(quantize(exact, 15), exact);
    }

    #[test]
    fn path_components() {
        let time = Utc.with_ymd_and_hms(2026, 3, 14, 5, 0, 0).unwrap();
        let instant = TargetInstant::new(0, time);
        assert_eq!(instant.day_dir(), "2026-03-14");
        assert_eq!(instant.file_name(), "frame_0500.jpg");
    }
}
