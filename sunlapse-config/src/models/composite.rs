use serde::{Deserialize, Serialize};

/// Color-grading parameters for one source layer.
///
/// These are frozen rendition constants, not per-run knobs: changing any of
/// them changes every produced frame and therefore bumps the rendition
/// version of the published videos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeParams {
    pub saturation: f32,
    pub brightness: f32,
    pub hue_shift_deg: f32,
    /// Fixed RGB tint overlaid after the base grade.
    pub tint: [u8; 3],
    /// Blend weight of the tint overlay, 0..=1.
    pub tint_alpha: f32,
    /// Affine contrast: out = in * mul + off.
    pub contrast_mul: f32,
    pub contrast_off: f32,
    pub gamma: f32,
}

impl GradeParams {
    pub fn corona() -> Self {
        Self {
            saturation: 0.6,
            brightness: 0.95,
            hue_shift_deg: -5.0,
            tint: [255, 140, 60],
            tint_alpha: 0.12,
            contrast_mul: 1.15,
            contrast_off: -10.0,
            gamma: 1.1,
        }
    }

    pub fn disk() -> Self {
        Self {
            saturation: 1.2,
            brightness: 1.05,
            hue_shift_deg: 10.0,
            tint: [255, 200, 120],
            tint_alpha: 0.08,
            contrast_mul: 1.05,
            contrast_off: 0.0,
            gamma: 0.95,
        }
    }
}

/// Rectangle extracted from the blended canvas as the final frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// Full compositing contract for one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeConfig {
    pub corona_grade: GradeParams,
    pub disk_grade: GradeParams,
    /// Square edge the disk layer is resized to before feathering.
    pub disk_final_size: u32,
    /// Fully transparent at this radius; must stay below half the disk edge.
    pub composite_radius: u32,
    /// Width of the opaque-to-transparent gradient inside the radius.
    pub feather_radius: u32,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub crop: CropRect,
    pub jpeg_quality: u8,
    /// Encoded frames below this size fail validation.
    pub min_frame_bytes: u64,
    /// Parallel composite workers.
    pub concurrency: usize,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            corona_grade: GradeParams::corona(),
            disk_grade: GradeParams::disk(),
            disk_final_size: 1435,
            composite_radius: 600,
            feather_radius: 125,
            canvas_width: 1920,
            canvas_height: 1435,
            crop: CropRect {
                left: 230,
                top: 117,
                width: 1460,
                height: 1200,
            },
            jpeg_quality: 95,
            min_frame_bytes: 50 * 1024,
            concurrency: 4,
        }
    }
}
