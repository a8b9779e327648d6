//! Exclusive-run lock.
//!
//! One lock file per base directory, holding the owner's pid and start
//! time. A lock younger than the stale threshold means another run is
//! active; an older one is presumed dead (a crashed pass under cron) and
//! stolen.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::store::write_atomic;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum LockState {
    Acquired(LockGuard),
    Busy(LockInfo),
}

/// Removes the lock file when released. `Drop` is the crash backstop;
/// callers should still prefer the explicit async release.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    released: bool,
}

impl LockGuard {
    pub async fn release(mut self) {
        self.released = true;
        if let Err(err) = tokio::fs::remove_file(&self.path).await {
            warn!("failed to remove lock file: {err}");
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

pub async fn acquire(
    path: &Path,
    stale_after: chrono::Duration,
) -> Result<LockState> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            match serde_json::from_slice::<LockInfo>(&bytes) {
                Ok(info) => {
                    let age = Utc::now() - info.started_at;
                    if age <= stale_after {
                        return Ok(LockState::Busy(info));
                    }
                    info!(
                        pid = info.pid,
                        "stealing stale lock ({} old)",
                        humantime_like(age)
                    );
                }
                Err(err) => {
                    warn!("lock file unparseable, replacing: {err}");
                }
            }
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }

    let info = LockInfo {
        pid: std::process::id(),
        started_at: Utc::now(),
    };
    let bytes = serde_json::to_vec_pretty(&info)?;
    write_atomic(path, &bytes).await?;

    Ok(LockState::Acquired(LockGuard {
        path: path.to_path_buf(),
        released: false,
    }))
}

fn humantime_like(duration: chrono::Duration) -> String {
    format!("{}h{}m", duration.num_hours(), duration.num_minutes() % 60)
}
