mod composite;
mod encode;

pub use composite::{CompositeConfig, CropRect, GradeParams};
pub use encode::{EncodeConfig, RenditionSpec};

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sunlapse_model::SourceSpec;

/// Everything one production pass needs, grouped by concern.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub fetch: FetchConfig,
    pub composite: CompositeConfig,
    pub encode: EncodeConfig,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
    pub sources: SourcesConfig,
}

/// Rolling-window geometry. The window always ends at the last interval
/// boundary at or before `now - safe_delay`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Days of upstream data-availability lag tolerated before the window
    /// end. The upstream routinely publishes imagery late.
    pub safe_delay_days: u32,
    /// Length of the rolling window in days.
    pub total_days: u32,
    /// Frame cadence in minutes; must divide 1440.
    pub interval_minutes: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            safe_delay_days: 2,
            total_days: 56,
            interval_minutes: 15,
        }
    }
}

impl WindowConfig {
    pub fn frames_per_day(&self) -> usize {
        (1440 / self.interval_minutes) as usize
    }

    pub fn frame_count(&self) -> usize {
        self.total_days as usize * self.frames_per_day()
    }

    pub fn interval(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.interval_minutes))
    }

    pub fn safe_delay(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.safe_delay_days))
    }
}

/// Upstream retrieval tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Base URL of the upstream screenshot service.
    pub upstream_base: String,
    /// Transport attempts per (target, offset) pair.
    pub attempts_per_offset: u32,
    /// Base of the linear retry backoff: delay = base * attempt.
    pub retry_base_delay_ms: u64,
    /// Hard per-request timeout. The upstream is documented to be slow
    /// under load, hence the generous default.
    pub request_timeout_secs: u64,
    /// Bodies at or below this size are rejected as invalid images.
    pub min_body_bytes: u64,
    /// Parallel fetch workers.
    pub concurrency: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            upstream_base: "https://api.helioviewer.org".to_string(),
            attempts_per_offset: 3,
            retry_base_delay_ms: 500,
            request_timeout_secs: 300,
            min_body_bytes: 1024,
            concurrency: 8,
        }
    }
}

impl FetchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms * u64::from(attempt))
    }
}

/// Scheduler and retention tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Flush manifest and run state every this many processed frames.
    pub checkpoint_every: usize,
    /// Failed records older than this stop being retried.
    pub abandon_after_days: u32,
    /// Frame directories older than `window_start - grace` are deleted.
    pub frame_retention_grace_days: u32,
    /// Rendered videos older than this are deleted.
    pub video_retention_days: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            checkpoint_every: 100,
            abandon_after_days: 7,
            frame_retention_grace_days: 1,
            video_retention_days: 3,
        }
    }
}

impl PipelineConfig {
    pub fn abandonment_horizon(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.abandon_after_days))
    }
}

/// Filesystem layout and run-level gates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root under which frames, videos, and all state files live.
    pub base_dir: PathBuf,
    /// Free-space floor checked before a run starts.
    pub min_free_bytes: u64,
    /// Locks older than this are considered stale and stolen.
    pub lock_stale_hours: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("/var/lib/sunlapse"),
            min_free_bytes: 10 * 1024 * 1024 * 1024,
            lock_stale_hours: 12,
        }
    }
}

impl StorageConfig {
    pub fn frames_root(&self) -> PathBuf {
        self.base_dir.join("frames")
    }

    pub fn videos_root(&self) -> PathBuf {
        self.base_dir.join("videos")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.base_dir.join("manifest.json")
    }

    pub fn state_path(&self) -> PathBuf {
        self.base_dir.join("state.json")
    }

    pub fn health_path(&self) -> PathBuf {
        self.base_dir.join("health.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.base_dir.join("production.lock")
    }

    /// Per-run scratch space for chunk files and concat lists.
    pub fn scratch_dir(&self) -> PathBuf {
        std::env::temp_dir().join("sunlapse")
    }

    pub fn lock_stale_after(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.lock_stale_hours))
    }
}

/// The two source layers. Carried in config so the fallback-offset order is
/// an explicit, versioned property of a deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub corona: SourceSpec,
    pub disk: SourceSpec,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            corona: SourceSpec::corona(),
            disk: SourceSpec::disk(),
        }
    }
}
