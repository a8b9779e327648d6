//! End-of-run reporting: the single-page text report and its
//! machine-readable `health.json` mirror.

use std::time::Duration;

use chrono::Utc;
use sunlapse_model::{HealthSnapshot, RunState};

use crate::encode::EncodeReport;
use crate::run::RunOutcome;

pub fn render(
    state: &RunState,
    encodes: &[EncodeReport],
    outcome: RunOutcome,
    runtime: Duration,
) -> String {
    let throughput = throughput(state, runtime);
    let mut out = String::new();

    out.push_str(&format!(
        "sunlapse run: {} ({})\n",
        outcome.label(),
        humantime::format_duration(truncate_to_secs(runtime))
    ));
    out.push_str(&format!(
        "frames: {} planned, {} succeeded, {} skipped, {} retried, \
         {} failed, {} abandoned\n",
        state.frames_planned,
        state.frames_succeeded,
        state.frames_skipped,
        state.frames_retried,
        state.frames_failed,
        state.frames_abandoned,
    ));
    out.push_str(&format!(
        "fallbacks used: {}, duplicates resolved: {}\n",
        state.fallbacks_used, state.duplicates_resolved
    ));

    if !state.errors_by_kind.is_empty() {
        out.push_str("errors by kind:\n");
        for (kind, count) in &state.errors_by_kind {
            out.push_str(&format!("  {kind}: {count}\n"));
        }
    }

    if encodes.is_empty() {
        out.push_str("videos: none\n");
    } else {
        out.push_str("videos:\n");
        for encode in encodes {
            out.push_str(&format!(
                "  {} -> {} ({} frames, {} omitted, {} chunk{})\n",
                encode.rendition,
                encode.output.display(),
                encode.frames,
                encode.omitted,
                encode.chunks,
                if encode.chunks == 1 { "" } else { "s" },
            ));
        }
    }

    out.push_str(&format!("throughput: {throughput:.2} frames/s\n"));
    out
}

pub fn snapshot(
    state: &RunState,
    encodes: &[EncodeReport],
    outcome: RunOutcome,
    runtime: Duration,
) -> HealthSnapshot {
    HealthSnapshot {
        generated_at: Utc::now(),
        outcome: outcome.label().to_string(),
        exit_code: outcome.exit_code(),
        runtime_seconds: runtime.as_secs_f64(),
        throughput: throughput(state, runtime),
        state: state.clone(),
        videos_written: encodes
            .iter()
            .map(|encode| encode.output.display().to_string())
            .collect(),
        frames_omitted_from_video: encodes
            .iter()
            .map(|encode| encode.omitted as u64)
            .max()
            .unwrap_or(0),
    }
}

fn throughput(state: &RunState, runtime: Duration) -> f64 {
    let secs = runtime.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    state.frames_processed() as f64 / secs
}

fn truncate_to_secs(duration: Duration) -> Duration {
    Duration::from_secs(duration.as_secs())
}
