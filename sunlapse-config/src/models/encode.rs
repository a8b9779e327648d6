use serde::{Deserialize, Serialize};

/// One video output variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenditionSpec {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Portrait renditions scale the desktop frame to the target height and
    /// center-crop the width.
    pub portrait_crop: bool,
    /// Cap on output duration; the selection keeps the most recent frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_secs: Option<u32>,
}

impl RenditionSpec {
    pub fn desktop() -> Self {
        Self {
            name: "desktop".to_string(),
            width: 1460,
            height: 1200,
            portrait_crop: false,
            max_duration_secs: None,
        }
    }

    pub fn mobile() -> Self {
        Self {
            name: "mobile".to_string(),
            width: 1080,
            height: 1350,
            portrait_crop: true,
            max_duration_secs: None,
        }
    }

    pub fn social() -> Self {
        Self {
            name: "social".to_string(),
            width: 1080,
            height: 1350,
            portrait_crop: true,
            max_duration_secs: Some(60),
        }
    }
}

/// External-encoder invocation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeConfig {
    /// Encoder binary resolved on PATH.
    pub ffmpeg_path: String,
    pub fps: u32,
    /// Constant rate factor, 0..=51 (0 is visually lossless).
    pub crf: u8,
    /// libx264 quality/speed preset.
    pub preset: String,
    /// Selections longer than this are split into independently encoded
    /// chunks and stream-copied together, bounding encoder memory.
    pub max_chunk_frames: usize,
    pub renditions: Vec<RenditionSpec>,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            fps: 24,
            crf: 18,
            preset: "slow".to_string(),
            max_chunk_frames: 1000,
            renditions: vec![
                RenditionSpec::desktop(),
                RenditionSpec::mobile(),
                RenditionSpec::social(),
            ],
        }
    }
}
