//! Pure planning for the encode stage: frame selection, chunk
//! partitioning, and concat-list rendering.

use std::ops::Range;
use std::path::PathBuf;

use sunlapse_config::RenditionSpec;
use sunlapse_model::{FrameStatus, Manifest, TargetInstant};

/// Ordered encode input for one rendition.
#[derive(Debug, Clone)]
pub struct Selection {
    pub files: Vec<PathBuf>,
    /// Window instants inside the selected span with no successful frame.
    /// Omitted instants shorten the video instead of being substituted,
    /// so upstream gaps stay visible.
    pub omitted: usize,
}

/// Select the rendition's frames from the manifest, oldest first.
///
/// Duration-capped renditions keep the most recent `max_duration * fps`
/// frames; the omission count is then relative to the instants the kept
/// span covers.
pub fn select_frames(
    manifest: &Manifest,
    window: &[TargetInstant],
    rendition: &RenditionSpec,
    fps: u32,
) -> Selection {
    let mut files = Vec::new();
    let mut success_at = vec![false; window.len()];

    for instant in window {
        if let Some(record) = manifest.get(instant)
            && record.status == FrameStatus::Success
            && let Some(path) = &record.file_path
        {
            success_at[instant.index] = true;
            files.push((instant.index, PathBuf::from(path)));
        }
    }

    let cap = rendition
        .max_duration_secs
        .map(|secs| (secs * fps) as usize);
    let mut span_start = 0;
    if let Some(cap) = cap
        && files.len() > cap
    {
        files.drain(..files.len() - cap);
        span_start = files.first().map(|(index, _)| *index).unwrap_or(0);
    }

    let omitted = success_at
        .iter()
        .skip(span_start)
        .filter(|&&success| !success)
        .count();

    Selection {
        files: files.into_iter().map(|(_, path)| path).collect(),
        omitted,
    }
}

/// Contiguous sub-runs of at most `max_chunk_frames`.
pub fn partition_chunks(len: usize, max_chunk_frames: usize) -> Vec<Range<usize>> {
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < len {
        let end = (start + max_chunk_frames).min(len);
        chunks.push(start..end);
        start = end;
    }
    chunks
}

/// Concat-demuxer input: one `file` line per frame with its display
/// duration. The demuxer ignores the duration after the final entry, so
/// the last file is listed once more to keep the tail frame on screen.
pub fn concat_list(files: &[PathBuf], fps: u32) -> String {
    let frame_duration = 1.0 / f64::from(fps);
    let mut out = String::from("ffconcat version 1.0\n");
    for path in files {
        out.push_str(&format!(
            "file '{}'\nduration {:.6}\n",
            escape_path(path),
            frame_duration
        ));
    }
    if let Some(last) = files.last() {
        out.push_str(&format!("file '{}'\n", escape_path(last)));
    }
    out
}

/// Stream-copy concat input listing finished chunk files.
pub fn chunk_list(chunks: &[PathBuf]) -> String {
    let mut out = String::from("ffconcat version 1.0\n");
    for path in chunks {
        out.push_str(&format!("file '{}'\n", escape_path(path)));
    }
    out
}

fn escape_path(path: &std::path::Path) -> String {
    path.to_string_lossy().replace('\'', "'\\''")
}
