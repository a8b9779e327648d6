use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse progress marker persisted with the run state snapshot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    Idle,
    Planning,
    Processing,
    Encoding,
    Retention,
    Complete,
    Interrupted,
}

/// Aggregated counters for one production pass.
///
/// Mutated by the scheduler as frames move through the pipeline, flushed at
/// every checkpoint, and rendered into the final report and `health.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub phase: RunPhase,
    pub started_at: DateTime<Utc>,
    pub frames_planned: u64,
    pub frames_succeeded: u64,
    pub frames_failed: u64,
    pub frames_skipped: u64,
    pub frames_retried: u64,
    pub frames_abandoned: u64,
    /// Count of accepted source fetches that needed a non-zero offset.
    pub fallbacks_used: u64,
    /// Count of duplicate rejections that a later offset resolved.
    pub duplicates_resolved: u64,
    pub errors_by_kind: BTreeMap<String, u64>,
}

impl RunState {
    pub fn begin(now: DateTime<Utc>) -> Self {
        Self {
            phase: RunPhase::Planning,
            started_at: now,
            frames_planned: 0,
            frames_succeeded: 0,
            frames_failed: 0,
            frames_skipped: 0,
            frames_retried: 0,
            frames_abandoned: 0,
            fallbacks_used: 0,
            duplicates_resolved: 0,
            errors_by_kind: BTreeMap::new(),
        }
    }

    pub fn record_error(&mut self, kind: &str) {
        *self.errors_by_kind.entry(kind.to_string()).or_insert(0) += 1;
    }

    /// Frames this run actually worked on (planned minus already-done).
    pub fn frames_processed(&self) -> u64 {
        self.frames_succeeded + self.frames_failed
    }

    /// True when more than the given percentage of planned frames failed.
    pub fn failure_ratio_exceeds(&self, percent: u64) -> bool {
        self.frames_planned > 0
            && self.frames_failed * 100 > self.frames_planned * percent
    }
}
