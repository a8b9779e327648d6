use chrono::{DateTime, Utc};

use crate::{Fingerprint, SourceKind};

/// One retrieved source image, possibly at an adjusted instant.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub bytes: Vec<u8>,
    pub fingerprint: Fingerprint,
    /// The instant actually requested from the upstream (offset applied).
    pub actual_time: DateTime<Utc>,
    /// Signed minutes deviation from the requested target instant.
    pub offset_applied: i32,
    pub kind: SourceKind,
    /// Set when every offset produced a duplicate and this result is the
    /// last duplicate-rejected body returned as a best effort. Carries the
    /// window index the fingerprint was first seen at.
    pub duplicate_of: Option<usize>,
}

impl FetchResult {
    pub fn is_fallback(&self) -> bool {
        self.offset_applied != 0
    }

    pub fn is_duplicate(&self) -> bool {
        self.duplicate_of.is_some()
    }
}
