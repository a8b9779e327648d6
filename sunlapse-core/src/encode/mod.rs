//! External-encoder orchestration.
//!
//! Frames are fed to the encoder through concat-demuxer list files. Long
//! selections are split into chunks encoded independently and then
//! stream-copied together, so the encoder's peak memory is bounded by
//! `max_chunk_frames` regardless of window length.

pub mod plan;

pub use plan::{Selection, select_frames};

use std::path::{Path, PathBuf};
use std::process::Stdio;

use chrono::NaiveDate;
use sunlapse_config::{EncodeConfig, RenditionSpec};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::store::write_atomic;

/// Result of one rendition encode, for the end-of-run report.
#[derive(Debug, Clone)]
pub struct EncodeReport {
    pub rendition: String,
    pub output: PathBuf,
    pub frames: usize,
    pub omitted: usize,
    pub chunks: usize,
}

pub struct EncoderOrchestrator {
    config: EncodeConfig,
    videos_root: PathBuf,
    scratch: PathBuf,
}

impl std::fmt::Debug for EncoderOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderOrchestrator")
            .field("videos_root", &self.videos_root)
            .field("scratch", &self.scratch)
            .finish_non_exhaustive()
    }
}

impl EncoderOrchestrator {
    pub fn new(
        config: EncodeConfig,
        videos_root: PathBuf,
        scratch_root: PathBuf,
    ) -> Self {
        // Unique per run so a crashed pass never poisons the next one.
        let scratch = scratch_root
            .join(format!("encode-{}", uuid::Uuid::new_v4().simple()));
        Self {
            config,
            videos_root,
            scratch,
        }
    }

    /// A missing encoder binary is a deployment error, fatal to the run.
    pub async fn ensure_encoder(&self) -> Result<()> {
        let status = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|err| {
                PipelineError::Encoder(format!(
                    "{} not runnable: {err}",
                    self.config.ffmpeg_path
                ))
            })?;
        if !status.success() {
            return Err(PipelineError::Encoder(format!(
                "{} -version exited with {status}",
                self.config.ffmpeg_path
            )));
        }
        Ok(())
    }

    /// Encode one rendition from an already-computed selection.
    pub async fn encode_rendition(
        &self,
        selection: &Selection,
        rendition: &RenditionSpec,
        run_date: NaiveDate,
    ) -> Result<EncodeReport> {
        if selection.files.is_empty() {
            return Err(PipelineError::Encoder(format!(
                "{}: no frames selected",
                rendition.name
            )));
        }

        tokio::fs::create_dir_all(&self.scratch).await?;
        tokio::fs::create_dir_all(&self.videos_root).await?;

        let output = self.videos_root.join(format!(
            "{}_{}.mp4",
            rendition.name,
            run_date.format("%Y-%m-%d")
        ));

        let ranges = plan::partition_chunks(
            selection.files.len(),
            self.config.max_chunk_frames,
        );
        info!(
            rendition = %rendition.name,
            frames = selection.files.len(),
            omitted = selection.omitted,
            chunks = ranges.len(),
            "encoding rendition"
        );

        let report = if ranges.len() == 1 {
            self.encode_frames(
                &selection.files,
                rendition,
                &output,
                "single",
            )
            .await?;
            EncodeReport {
                rendition: rendition.name.clone(),
                output,
                frames: selection.files.len(),
                omitted: selection.omitted,
                chunks: 1,
            }
        } else {
            let mut chunk_files = Vec::with_capacity(ranges.len());
            for (index, range) in ranges.iter().enumerate() {
                let chunk_path = self.scratch.join(format!(
                    "{}_chunk{:03}.mp4",
                    rendition.name, index
                ));
                self.encode_frames(
                    &selection.files[range.clone()],
                    rendition,
                    &chunk_path,
                    &format!("chunk {index}"),
                )
                .await?;
                chunk_files.push(chunk_path);
            }
            self.concat_chunks(&chunk_files, rendition, &output).await?;

            for chunk in &chunk_files {
                if let Err(err) = tokio::fs::remove_file(chunk).await {
                    warn!(
                        chunk = %chunk.display(),
                        "failed to remove chunk: {err}"
                    );
                }
            }

            EncodeReport {
                rendition: rendition.name.clone(),
                output,
                frames: selection.files.len(),
                omitted: selection.omitted,
                chunks: chunk_files.len(),
            }
        };

        let _ = tokio::fs::remove_dir_all(&self.scratch).await;
        Ok(report)
    }

    /// Encode a contiguous frame run into one MP4.
    async fn encode_frames(
        &self,
        files: &[PathBuf],
        rendition: &RenditionSpec,
        output: &Path,
        label: &str,
    ) -> Result<()> {
        let list_path = self.scratch.join(format!(
            "{}_{}.ffconcat",
            rendition.name,
            uuid::Uuid::new_v4().simple()
        ));
        let list = plan::concat_list(files, self.config.fps);
        write_atomic(&list_path, list.as_bytes()).await?;

        let mut cmd = Command::new(&self.config.ffmpeg_path);
        cmd.arg("-hide_banner")
            .arg("-y")
            .arg("-f")
            .arg("concat")
            .arg("-safe")
            .arg("0")
            .arg("-i")
            .arg(&list_path)
            .arg("-vf")
            .arg(filter_for(rendition))
            .arg("-c:v")
            .arg("libx264")
            .arg("-preset")
            .arg(&self.config.preset)
            .arg("-crf")
            .arg(self.config.crf.to_string())
            .arg("-pix_fmt")
            .arg("yuv420p")
            .arg("-r")
            .arg(self.config.fps.to_string())
            .arg("-movflags")
            .arg("+faststart")
            .arg(output);

        let result = run_encoder(cmd, label).await;
        let _ = tokio::fs::remove_file(&list_path).await;
        result
    }

    /// Stream-copy the chunk files into the final output; no re-encode.
    async fn concat_chunks(
        &self,
        chunks: &[PathBuf],
        rendition: &RenditionSpec,
        output: &Path,
    ) -> Result<()> {
        let list_path = self
            .scratch
            .join(format!("{}_chunks.ffconcat", rendition.name));
        write_atomic(&list_path, plan::chunk_list(chunks).as_bytes())
            .await?;

        let mut cmd = Command::new(&self.config.ffmpeg_path);
        cmd.arg("-hide_banner")
            .arg("-y")
            .arg("-f")
            .arg("concat")
            .arg("-safe")
            .arg("0")
            .arg("-i")
            .arg(&list_path)
            .arg("-c")
            .arg("copy")
            .arg("-movflags")
            .arg("+faststart")
            .arg(output);

        let result = run_encoder(cmd, "concat").await;
        let _ = tokio::fs::remove_file(&list_path).await;
        result
    }
}

/// Desktop frames are already the target geometry; portrait renditions
/// scale to the target height and center-crop the width.
fn filter_for(rendition: &RenditionSpec) -> String {
    if rendition.portrait_crop {
        format!(
            "scale=-2:{h},crop={w}:{h}",
            w = rendition.width,
            h = rendition.height
        )
    } else {
        format!("scale={}:{}", rendition.width, rendition.height)
    }
}

/// Spawn the encoder, keep a stderr tail for diagnostics, check the exit
/// status. The encoder's output is never parsed beyond that.
async fn run_encoder(mut cmd: Command, label: &str) -> Result<()> {
    debug!("running encoder ({label}): {cmd:?}");

    let mut child = cmd
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| {
            PipelineError::Encoder(format!("failed to spawn encoder: {err}"))
        })?;

    let mut tail: std::collections::VecDeque<String> =
        std::collections::VecDeque::with_capacity(24);
    if let Some(stderr) = child.stderr.take() {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tail.len() == 24 {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }

    let status = child.wait().await.map_err(|err| {
        PipelineError::Encoder(format!("failed to wait on encoder: {err}"))
    })?;

    if !status.success() {
        let detail: Vec<String> = tail.into_iter().collect();
        return Err(PipelineError::Encoder(format!(
            "{label} exited with {status}: {}",
            detail.join("\n")
        )));
    }
    Ok(())
}
