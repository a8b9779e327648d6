use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{FrameRecord, FrameStatus, TargetInstant, instant};

pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    MANIFEST_SCHEMA_VERSION
}

/// Source of truth for per-frame status, keyed by the canonical instant key.
///
/// A `BTreeMap` keeps iteration in chronological order for free because the
/// key format sorts lexicographically with time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub frames: BTreeMap<String, FrameRecord>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION,
            frames: BTreeMap::new(),
        }
    }
}

impl Manifest {
    pub fn get(&self, instant: &TargetInstant) -> Option<&FrameRecord> {
        self.frames.get(&instant.key())
    }

    pub fn upsert(&mut self, instant: &TargetInstant, record: FrameRecord) {
        self.frames.insert(instant.key(), record);
    }

    /// Successful records in chronological order with their parsed times.
    pub fn successes(
        &self,
    ) -> impl Iterator<Item = (DateTime<Utc>, &FrameRecord)> {
        self.frames.iter().filter_map(|(key, record)| {
            if record.status != FrameStatus::Success {
                return None;
            }
            instant::parse_instant_key(key).ok().map(|time| (time, record))
        })
    }

    pub fn count_status(&self, status: FrameStatus) -> usize {
        self.frames
            .values()
            .filter(|record| record.status == status)
            .count()
    }

    /// Drop records whose instant falls before the cutoff. Returns how many
    /// were removed; used by the retention sweep alongside directory cleanup.
    pub fn prune_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.frames.len();
        self.frames.retain(|key, _| {
            instant::parse_instant_key(key)
                .map(|time| time >= cutoff)
                .unwrap_or(false)
        });
        before - self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn instant_at(index: usize, minute: u32) -> TargetInstant {
        TargetInstant::new(
            index,
            Utc.with_ymd_and_hms(2026, 2, 1, 12, minute, 0).unwrap(),
        )
    }

    #[test]
    fn upsert_is_keyed_by_instant() {
        let mut manifest = Manifest::default();
        let instant = instant_at(0, 0);
        let now = instant.time;

        manifest.upsert(&instant, FrameRecord::first_attempt(now, 1));
        manifest.upsert(&instant, FrameRecord::first_attempt(now, 2));
        assert_eq!(manifest.frames.len(), 1);
        assert_eq!(manifest.get(&instant).unwrap().attempts, 2);
    }

    #[test]
    fn prune_removes_only_older_records() {
        let mut manifest = Manifest::default();
        for (index, minute) in [(0, 0), (1, 15), (2, 30)] {
            let instant = instant_at(index, minute);
            manifest
                .upsert(&instant, FrameRecord::first_attempt(instant.time, 1));
        }

        let cutoff = Utc.with_ymd_and_hms(2026, 2, 1, 12, 15, 0).unwrap();
        assert_eq!(manifest.prune_before(cutoff), 1);
        assert_eq!(manifest.frames.len(), 2);
    }

    #[test]
    fn successes_iterate_in_time_order() {
        let mut manifest = Manifest::default();
        for (index, minute) in [(2, 30), (0, 0), (1, 15)] {
            let instant = instant_at(index, minute);
            let mut record = FrameRecord::first_attempt(instant.time, 1);
            record.status = FrameStatus::Success;
            manifest.upsert(&instant, record);
        }

        let times: Vec<_> =
            manifest.successes().map(|(time, _)| time.minute()).collect();
        assert_eq!(times, vec![0, 15, 30]);
    }
}
