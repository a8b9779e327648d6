//! Filesystem layout and crash-safe persistence.
//!
//! Every state file (manifest, run state, health) is published atomically:
//! serialize to a uniquely named `.tmp` sibling, then rename over the
//! destination. Frame files get the same treatment so a killed run never
//! leaves a half-written JPEG behind a `success` record.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use sunlapse_config::StorageConfig;
use sunlapse_model::{HealthSnapshot, Manifest, RunState, TargetInstant};
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone)]
pub struct FrameStore {
    frames_root: PathBuf,
    videos_root: PathBuf,
    manifest_path: PathBuf,
    state_path: PathBuf,
    health_path: PathBuf,
}

impl FrameStore {
    pub fn new(storage: &StorageConfig) -> Self {
        Self {
            frames_root: storage.frames_root(),
            videos_root: storage.videos_root(),
            manifest_path: storage.manifest_path(),
            state_path: storage.state_path(),
            health_path: storage.health_path(),
        }
    }

    pub fn frames_root(&self) -> &Path {
        &self.frames_root
    }

    pub fn videos_root(&self) -> &Path {
        &self.videos_root
    }

    pub async fn ensure_layout(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.frames_root).await?;
        tokio::fs::create_dir_all(&self.videos_root).await?;
        Ok(())
    }

    /// Canonical path of one frame: `frames/YYYY-MM-DD/frame_HHMM.jpg`.
    pub fn frame_path(&self, instant: &TargetInstant) -> PathBuf {
        self.frames_root
            .join(instant.day_dir())
            .join(instant.file_name())
    }

    /// Persist a composed frame; returns its path and size.
    pub async fn write_frame(
        &self,
        instant: &TargetInstant,
        bytes: &[u8],
    ) -> Result<(PathBuf, u64)> {
        let path = self.frame_path(instant);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        write_atomic(&path, bytes).await?;
        Ok((path, bytes.len() as u64))
    }

    /// Load the manifest, tolerating absence and corruption: a fresh
    /// manifest is the correct recovery in both cases, the frames on disk
    /// are re-fetched or re-linked as the window is processed.
    pub async fn load_manifest(&self) -> Manifest {
        match tokio::fs::read(&self.manifest_path).await {
            Ok(bytes) => match serde_json::from_slice::<Manifest>(&bytes) {
                Ok(manifest) => {
                    debug!(
                        frames = manifest.frames.len(),
                        "manifest loaded"
                    );
                    manifest
                }
                Err(err) => {
                    warn!(
                        "manifest corrupt, starting fresh: {err}"
                    );
                    Manifest::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Manifest::default()
            }
            Err(err) => {
                warn!("manifest unreadable, starting fresh: {err}");
                Manifest::default()
            }
        }
    }

    pub async fn save_manifest(&self, manifest: &Manifest) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(manifest)?;
        write_atomic(&self.manifest_path, &bytes).await
    }

    pub async fn save_state(&self, state: &RunState) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        write_atomic(&self.state_path, &bytes).await
    }

    pub async fn save_health(&self, health: &HealthSnapshot) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(health)?;
        write_atomic(&self.health_path, &bytes).await
    }

    pub async fn load_health(&self) -> Result<Option<HealthSnapshot>> {
        match tokio::fs::read(&self.health_path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Delete frame directories dated strictly before the cutoff day.
    /// Best-effort: failures are logged and never fail the run.
    pub async fn sweep_frames(&self, cutoff: NaiveDate) -> usize {
        let mut removed = 0usize;
        let mut entries = match tokio::fs::read_dir(&self.frames_root).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!("retention: frames root unreadable: {err}");
                return 0;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Ok(date) = NaiveDate::parse_from_str(name, "%Y-%m-%d")
            else {
                continue;
            };
            if date >= cutoff {
                continue;
            }
            match tokio::fs::remove_dir_all(entry.path()).await {
                Ok(()) => {
                    debug!(dir = name, "retention: removed frame directory");
                    removed += 1;
                }
                Err(err) => {
                    warn!(dir = name, "retention: removal failed: {err}");
                }
            }
        }
        removed
    }

    /// Delete rendered videos whose date suffix is older than the cutoff.
    pub async fn sweep_videos(&self, cutoff: NaiveDate) -> usize {
        let mut removed = 0usize;
        let mut entries = match tokio::fs::read_dir(&self.videos_root).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!("retention: videos root unreadable: {err}");
                return 0;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(date) = video_date(name) else { continue };
            if date >= cutoff {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    debug!(file = name, "retention: removed video");
                    removed += 1;
                }
                Err(err) => {
                    warn!(file = name, "retention: removal failed: {err}");
                }
            }
        }
        removed
    }
}

/// Parse the `<name>_<YYYY-MM-DD>.mp4` date suffix.
fn video_date(file_name: &str) -> Option<NaiveDate> {
    let stem = file_name.strip_suffix(".mp4")?;
    let (_, date) = stem.rsplit_once('_')?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Atomic publish with a single retry: storage hiccups are retried once,
/// persistent failure escalates to the caller as fatal.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    match try_write_atomic(path, bytes).await {
        Ok(()) => Ok(()),
        Err(first) => {
            warn!(
                path = %path.display(),
                "atomic write failed, retrying once: {first}"
            );
            try_write_atomic(path, bytes)
                .await
                .map_err(PipelineError::Storage)
        }
    }
}

async fn try_write_atomic(
    path: &Path,
    bytes: &[u8],
) -> std::io::Result<()> {
    // Unique temp name: concurrent writers racing on the same destination
    // never clobber each other's scratch file.
    let tmp = path.with_extension(format!(
        "tmp.{}",
        uuid::Uuid::new_v4().simple()
    ));
    tokio::fs::write(&tmp, bytes).await?;
    match tokio::fs::rename(&tmp, path).await {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = tokio::fs::remove_file(&tmp).await;
            Err(err)
        }
    }
}

/// Timestamp parsed from a frame path produced by [`FrameStore::frame_path`].
pub fn frame_path_time(path: &Path) -> Option<DateTime<Utc>> {
    let file = path.file_stem()?.to_str()?;
    let hhmm = file.strip_prefix("frame_")?;
    let day = path.parent()?.file_name()?.to_str()?;
    let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()?;
    let hours: u32 = hhmm.get(0..2)?.parse().ok()?;
    let minutes: u32 = hhmm.get(2..4)?.parse().ok()?;
    date.and_hms_opt(hours, minutes, 0).map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store(dir: &Path) -> FrameStore {
        let storage = StorageConfig {
            base_dir: dir.to_path_buf(),
            ..StorageConfig::default()
        };
        FrameStore::new(&storage)
    }

    fn instant() -> TargetInstant {
        TargetInstant::new(
            0,
            Utc.with_ymd_and_hms(2026, 7, 4, 13, 45, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn frame_layout_matches_contract() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.ensure_layout().await.unwrap();

        let (path, bytes) =
            store.write_frame(&instant(), b"jpegish").await.unwrap();
        assert!(path.ends_with("frames/2026-07-04/frame_1345.jpg"));
        assert_eq!(bytes, 7);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn corrupt_manifest_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        tokio::fs::write(dir.path().join("manifest.json"), b"{nope")
            .await
            .unwrap();

        let manifest = store.load_manifest().await;
        assert!(manifest.frames.is_empty());
    }

    #[tokio::test]
    async fn manifest_round_trips_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.ensure_layout().await.unwrap();

        let mut manifest = Manifest::default();
        let target = instant();
        manifest.upsert(
            &target,
            sunlapse_model::FrameRecord::first_attempt(target.time, 1),
        );
        store.save_manifest(&manifest).await.unwrap();

        let loaded = store.load_manifest().await;
        assert_eq!(loaded.frames.len(), 1);

        // No temp litter left behind.
        let mut entries =
            tokio::fs::read_dir(dir.path()).await.unwrap();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            assert!(!name.to_string_lossy().contains(".tmp."));
        }
    }

    #[tokio::test]
    async fn frame_sweep_respects_cutoff() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.ensure_layout().await.unwrap();

        for day in ["2026-06-01", "2026-06-10", "not-a-date"] {
            tokio::fs::create_dir_all(store.frames_root().join(day))
                .await
                .unwrap();
        }

        let cutoff = NaiveDate::from_ymd_opt(2026, 6, 5).unwrap();
        assert_eq!(store.sweep_frames(cutoff).await, 1);
        assert!(!store.frames_root().join("2026-06-01").exists());
        assert!(store.frames_root().join("2026-06-10").exists());
        assert!(store.frames_root().join("not-a-date").exists());
    }

    #[tokio::test]
    async fn video_sweep_parses_date_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.ensure_layout().await.unwrap();

        for name in [
            "desktop_2026-06-01.mp4",
            "desktop_2026-06-20.mp4",
            "unrelated.txt",
        ] {
            tokio::fs::write(store.videos_root().join(name), b"x")
                .await
                .unwrap();
        }

        let cutoff = NaiveDate::from_ymd_opt(2026, 6, 10).unwrap();
        assert_eq!(store.sweep_videos(cutoff).await, 1);
        assert!(!store.videos_root().join("desktop_2026-06-01.mp4").exists());
        assert!(store.videos_root().join("desktop_2026-06-20.mp4").exists());
        assert!(store.videos_root().join("unrelated.txt").exists());
    }

    #[test]
    fn frame_path_time_round_trips() {
        let target = instant();
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let path = store.frame_path(&target);
        assert_eq!(frame_path_time(&path), Some(target.time));
    }
}
