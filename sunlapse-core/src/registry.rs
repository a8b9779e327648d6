//! Cross-frame duplicate detection.
//!
//! The registry is the single synchronization point that lets parallel
//! fetch workers run a sequential-looking fallback search: two workers
//! racing on the same fingerprint serialize on `offer`, the first wins, and
//! the loser moves to its next offset.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use sunlapse_model::{
    Fingerprint, FrameStatus, Manifest, SourceKind, TargetInstant,
};
use tracing::debug;

/// Outcome of offering a fingerprint for a window slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Accepted,
    /// The fingerprint is already bound to a non-adjacent slot.
    DuplicateOf(usize),
}

/// Process-wide index of per-source image fingerprints.
///
/// Derived state: discarded at startup and replayed from the manifest, so
/// it is never persisted on its own. The lock is a plain `std` mutex and is
/// never held across an await point.
#[derive(Debug, Default)]
pub struct DuplicateRegistry {
    inner: Mutex<HashMap<SourceKind, HashMap<Fingerprint, BTreeSet<usize>>>>,
}

impl DuplicateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay successful manifest records onto the current window's index
    /// space. Records carrying the duplicate marker are skipped: their
    /// fingerprints intentionally collide with an earlier slot.
    pub fn rebuild(manifest: &Manifest, window: &[TargetInstant]) -> Self {
        let registry = Self::new();
        let mut seeded = 0usize;
        for instant in window {
            let Some(record) = manifest.get(instant) else {
                continue;
            };
            if record.status != FrameStatus::Success || record.duplicate {
                continue;
            }
            if let Some(fp) = record.corona_fingerprint {
                registry.offer(SourceKind::Corona, fp, instant.index);
                seeded += 1;
            }
            if let Some(fp) = record.disk_fingerprint {
                registry.offer(SourceKind::Disk, fp, instant.index);
                seeded += 1;
            }
        }
        debug!("duplicate registry rebuilt with {seeded} fingerprints");
        registry
    }

    /// Atomically bind `fingerprint` to `index` unless it already belongs
    /// to a non-adjacent slot. Re-offering an existing binding is accepted,
    /// which keeps replays and resumed runs idempotent. Adjacent slots
    /// (|i - j| <= 1) may legitimately share a fingerprint: the upstream
    /// publishes identical frames at cadence boundaries.
    pub fn offer(
        &self,
        kind: SourceKind,
        fingerprint: Fingerprint,
        index: usize,
    ) -> Offer {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        let slots = inner
            .entry(kind)
            .or_default()
            .entry(fingerprint)
            .or_default();

        if slots.contains(&index) {
            return Offer::Accepted;
        }
        if let Some(&prev) =
            slots.iter().find(|&&slot| slot.abs_diff(index) > 1)
        {
            return Offer::DuplicateOf(prev);
        }
        slots.insert(index);
        Offer::Accepted
    }

    /// Number of distinct fingerprints tracked for a source.
    pub fn len(&self, kind: SourceKind) -> usize {
        self.inner
            .lock()
            .expect("registry lock poisoned")
            .get(&kind)
            .map(|prints| prints.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        SourceKind::ALL.iter().all(|&kind| self.len(kind) == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sunlapse_model::FrameRecord;

    fn fp(tag: u8) -> Fingerprint {
        Fingerprint::of(&[tag])
    }

    #[test]
    fn non_adjacent_repeat_is_rejected() {
        let registry = DuplicateRegistry::new();
        assert_eq!(
            registry.offer(SourceKind::Corona, fp(1), 5),
            Offer::Accepted
        );
        assert_eq!(
            registry.offer(SourceKind::Corona, fp(1), 9),
            Offer::DuplicateOf(5)
        );
    }

    #[test]
    fn adjacent_repeat_is_tolerated() {
        let registry = DuplicateRegistry::new();
        registry.offer(SourceKind::Disk, fp(2), 5);
        assert_eq!(registry.offer(SourceKind::Disk, fp(2), 6), Offer::Accepted);
        // A third consecutive repeat is non-adjacent to the first slot.
        assert_eq!(
            registry.offer(SourceKind::Disk, fp(2), 7),
            Offer::DuplicateOf(5)
        );
    }

    #[test]
    fn reoffer_of_same_slot_is_idempotent() {
        let registry = DuplicateRegistry::new();
        registry.offer(SourceKind::Corona, fp(3), 10);
        assert_eq!(
            registry.offer(SourceKind::Corona, fp(3), 10),
            Offer::Accepted
        );
    }

    #[test]
    fn sources_are_indexed_independently() {
        let registry = DuplicateRegistry::new();
        registry.offer(SourceKind::Corona, fp(4), 0);
        assert_eq!(
            registry.offer(SourceKind::Disk, fp(4), 50),
            Offer::Accepted
        );
    }

    #[test]
    fn rebuild_skips_duplicate_marked_records() {
        let start = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap();
        let window: Vec<_> = (0..3)
            .map(|i| {
                TargetInstant::new(
                    i,
                    start + chrono::Duration::minutes(15 * i as i64),
                )
            })
            .collect();

        let mut manifest = Manifest::default();
        let mut ok = FrameRecord::first_attempt(start, 1);
        ok.status = FrameStatus::Success;
        ok.corona_fingerprint = Some(fp(7));
        manifest.upsert(&window[0], ok.clone());

        let mut dup = ok.clone();
        dup.duplicate = true;
        manifest.upsert(&window[2], dup);

        let registry = DuplicateRegistry::rebuild(&manifest, &window);
        // Only the clean record was replayed; the marked one would have
        // collided with slot 0.
        assert_eq!(registry.len(SourceKind::Corona), 1);
        assert_eq!(
            registry.offer(SourceKind::Corona, fp(7), 2),
            Offer::DuplicateOf(0)
        );
    }

    #[test]
    fn concurrent_offers_serialize() {
        use std::sync::Arc;

        let registry = Arc::new(DuplicateRegistry::new());
        let mut handles = Vec::new();
        for index in [3usize, 30, 60, 90] {
            let registry = registry.clone();
            handles.push(std::thread::spawn(move || {
                registry.offer(SourceKind::Corona, fp(9), index)
            }));
        }

        let accepted = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|offer| *offer == Offer::Accepted)
            .count();
        // Exactly one racer wins a shared fingerprint on distant slots.
        assert_eq!(accepted, 1);
    }
}
