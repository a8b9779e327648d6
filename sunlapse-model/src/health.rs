use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::RunState;

/// Machine-readable mirror of the end-of-run report (`health.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub generated_at: DateTime<Utc>,
    /// Exit-code label of the finished run (`success`, `partial-errors`, ...).
    pub outcome: String,
    pub exit_code: i32,
    pub runtime_seconds: f64,
    /// Frames per second of wall-clock processing throughput.
    pub throughput: f64,
    pub state: RunState,
    #[serde(default)]
    pub videos_written: Vec<String>,
    #[serde(default)]
    pub frames_omitted_from_video: u64,
}
