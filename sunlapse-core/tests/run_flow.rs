//! Full production passes through the run controller: exit outcomes, the
//! health snapshot, lock exclusion, and the retention sweep.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::{DynamicImage, Rgba, RgbaImage};
use sunlapse_config::{Config, CropRect};
use sunlapse_core::fetch::{FetchError, SourceFetcher};
use sunlapse_core::{RunController, RunOutcome};
use sunlapse_model::{HealthSnapshot, SourceKind, SourceSpec};
use tokio_util::sync::CancellationToken;

fn test_config(base_dir: &Path) -> Config {
    let mut config = Config::default();
    config.window.interval_minutes = 60;
    config.window.total_days = 1;
    config.fetch.concurrency = 2;
    config.fetch.attempts_per_offset = 2;
    config.fetch.retry_base_delay_ms = 0;
    config.fetch.min_body_bytes = 64;
    config.composite.concurrency = 2;
    config.composite.disk_final_size = 96;
    config.composite.composite_radius = 40;
    config.composite.feather_radius = 10;
    config.composite.canvas_width = 128;
    config.composite.canvas_height = 96;
    config.composite.crop = CropRect {
        left: 16,
        top: 8,
        width: 96,
        height: 80,
    };
    config.composite.min_frame_bytes = 128;
    config.storage.base_dir = base_dir.to_path_buf();
    config.storage.min_free_bytes = 0;
    config
}

/// Upstream that serves a unique image per requested time, or nothing.
struct FlatFetcher {
    healthy: bool,
}

#[async_trait]
impl SourceFetcher for FlatFetcher {
    async fn fetch_at(
        &self,
        spec: &SourceSpec,
        time: DateTime<Utc>,
    ) -> Result<Vec<u8>, FetchError> {
        if !self.healthy {
            return Err(FetchError::Unavailable("HTTP 503".to_string()));
        }
        let (width, height) = match spec.kind {
            SourceKind::Corona => (128, 96),
            SourceKind::Disk => (96, 96),
        };
        let seed = time.timestamp() as u64;
        let image = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([
                ((seed + u64::from(x)) % 251) as u8,
                ((seed / 7 + u64::from(y)) % 241) as u8,
                (seed % 223) as u8,
                255,
            ])
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(image)
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .unwrap();
        Ok(bytes)
    }
}

fn fake_encoder(dir: &Path) -> PathBuf {
    let script = dir.join("fake-ffmpeg");
    std::fs::write(
        &script,
        "#!/bin/sh\n\
         case \"$1\" in -version) exit 0;; esac\n\
         for last; do :; done\n\
         printf 'mp4' > \"$last\"\n",
    )
    .unwrap();
    let mut perms = std::fs::metadata(&script).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&script, perms).unwrap();
    script
}

async fn read_health(base_dir: &Path) -> HealthSnapshot {
    let bytes =
        tokio::fs::read(base_dir.join("health.json")).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn happy_run_produces_videos_and_health() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.encode.ffmpeg_path =
        fake_encoder(dir.path()).display().to_string();

    // A stale frame directory from a long-gone window.
    let stale = dir.path().join("frames/2020-01-01");
    std::fs::create_dir_all(&stale).unwrap();

    let controller = RunController::new(
        Arc::new(config),
        Arc::new(FlatFetcher { healthy: true }),
        CancellationToken::new(),
    );
    let outcome = controller.execute().await;

    assert_eq!(outcome, RunOutcome::Success);

    let run_date = Utc::now().date_naive().format("%Y-%m-%d").to_string();
    for name in ["desktop", "mobile", "social"] {
        let video = dir
            .path()
            .join(format!("videos/{name}_{run_date}.mp4"));
        assert!(video.exists(), "missing rendition {name}");
    }

    let health = read_health(dir.path()).await;
    assert_eq!(health.exit_code, 0);
    assert_eq!(health.state.frames_succeeded, 24);
    assert_eq!(health.videos_written.len(), 3);

    // Retention removed the ancient directory.
    assert!(!stale.exists());

    // The lock was released.
    assert!(!dir.path().join("production.lock").exists());
}

#[tokio::test]
async fn dead_upstream_exits_no_frames() {
    let dir = tempfile::tempdir().unwrap();
    let controller = RunController::new(
        Arc::new(test_config(dir.path())),
        Arc::new(FlatFetcher { healthy: false }),
        CancellationToken::new(),
    );
    let outcome = controller.execute().await;

    assert_eq!(outcome, RunOutcome::NoFrames);
    let health = read_health(dir.path()).await;
    assert_eq!(health.exit_code, 2);
    assert_eq!(health.state.frames_failed, 24);
}

#[tokio::test]
async fn fresh_lock_turns_the_run_away() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path()).unwrap();
    std::fs::write(
        dir.path().join("production.lock"),
        serde_json::json!({
            "pid": 99999,
            "started_at": Utc::now(),
        })
        .to_string(),
    )
    .unwrap();

    let controller = RunController::new(
        Arc::new(test_config(dir.path())),
        Arc::new(FlatFetcher { healthy: true }),
        CancellationToken::new(),
    );
    assert_eq!(controller.execute().await, RunOutcome::Busy);

    // The foreign lock is untouched.
    assert!(dir.path().join("production.lock").exists());
}

#[tokio::test]
async fn pre_cancelled_run_exits_interrupted() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let controller = RunController::new(
        Arc::new(test_config(dir.path())),
        Arc::new(FlatFetcher { healthy: true }),
        cancel,
    );
    let outcome = controller.execute().await;

    assert_eq!(outcome, RunOutcome::Interrupted);
    let health = read_health(dir.path()).await;
    assert_eq!(health.exit_code, 130);
}
