use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Fingerprint;

/// Terminal and retryable states of one window slot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum FrameStatus {
    Success,
    Failed,
    /// Failed for longer than the abandonment horizon; never retried.
    Abandoned,
}

/// Persistent per-instant record; the manifest is a map of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub status: FrameStatus,
    pub first_attempt_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
    /// Total transport attempts accumulated across runs; monotone, >= 1.
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corona_offset: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_offset: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corona_fingerprint: Option<Fingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_fingerprint: Option<Fingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    /// Set when the frame was accepted despite exhausting every fallback
    /// offset with duplicates; excuses the cross-frame uniqueness invariant.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
}

impl FrameRecord {
    /// Fresh record for a slot touched for the first time.
    pub fn first_attempt(now: DateTime<Utc>, attempts: u32) -> Self {
        Self {
            status: FrameStatus::Failed,
            first_attempt_at: now,
            last_attempt_at: now,
            attempts: attempts.max(1),
            last_error: None,
            corona_offset: None,
            disk_offset: None,
            corona_fingerprint: None,
            disk_fingerprint: None,
            file_path: None,
            bytes: None,
            duplicate: false,
        }
    }

    /// Fold another processing attempt into the record.
    pub fn touch(&mut self, now: DateTime<Utc>, attempts: u32) {
        self.last_attempt_at = now;
        self.attempts = self.attempts.saturating_add(attempts.max(1));
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = FrameStatus::Failed;
        self.last_error = Some(error.into());
    }

    pub fn mark_abandoned(&mut self) {
        self.status = FrameStatus::Abandoned;
    }

    /// A failed record strictly older than the horizon is abandoned; at
    /// exactly the horizon it is still eligible for one more retry.
    pub fn past_abandonment_horizon(
        &self,
        now: DateTime<Utc>,
        horizon: chrono::Duration,
    ) -> bool {
        self.status == FrameStatus::Failed
            && now - self.first_attempt_at > horizon
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 10, h, 0, 0).unwrap()
    }

    #[test]
    fn attempts_are_monotone() {
        let mut record = FrameRecord::first_attempt(at(0), 3);
        assert_eq!(record.attempts, 3);
        record.touch(at(1), 2);
        assert_eq!(record.attempts, 5);
        assert!(record.first_attempt_at <= record.last_attempt_at);
    }

    #[test]
    fn horizon_boundary_is_strict() {
        let horizon = Duration::days(7);
        let mut record = FrameRecord::first_attempt(at(0), 1);
        record.mark_failed("upstream 500");

        let exactly = at(0) + horizon;
        assert!(!record.past_abandonment_horizon(exactly, horizon));

        let past = exactly + Duration::minutes(1);
        assert!(record.past_abandonment_horizon(past, horizon));
    }

    #[test]
    fn success_is_never_abandoned() {
        let mut record = FrameRecord::first_attempt(at(0), 1);
        record.status = FrameStatus::Success;
        let far = at(0) + Duration::days(30);
        assert!(!record.past_abandonment_horizon(far, Duration::days(7)));
    }
}
