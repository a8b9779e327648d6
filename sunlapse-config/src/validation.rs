//! Startup guard rails.
//!
//! Hard errors reject configurations that would corrupt output or deadlock
//! the pipeline; warnings flag values that are legal but suspicious.

use thiserror::Error;

use crate::models::Config;

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("interval of {0} minutes does not divide 1440")]
    IntervalNotDivisor(u32),

    #[error("window must span at least one day, got {0}")]
    EmptyWindow(u32),

    #[error(
        "{kind} fallback offset {offset} exceeds the half-interval bound of \
         {bound} minutes"
    )]
    OffsetOutOfBounds {
        kind: &'static str,
        offset: i32,
        bound: i32,
    },

    #[error("{kind} fallback sequence must start with offset 0")]
    OffsetSequenceMissingZero { kind: &'static str },

    #[error(
        "composite radius {radius} must stay below half the disk edge ({half})"
    )]
    CompositeRadiusTooLarge { radius: u32, half: u32 },

    #[error("feather radius {feather} exceeds composite radius {radius}")]
    FeatherExceedsRadius { feather: u32, radius: u32 },

    #[error(
        "crop rectangle {left},{top} {width}x{height} leaves the \
         {canvas_w}x{canvas_h} canvas"
    )]
    CropOutsideCanvas {
        left: u32,
        top: u32,
        width: u32,
        height: u32,
        canvas_w: u32,
        canvas_h: u32,
    },

    #[error("crf {0} is outside 0..=51")]
    CrfOutOfRange(u8),

    #[error("fps must be non-zero")]
    ZeroFps,

    #[error("{0} concurrency must be non-zero")]
    ZeroConcurrency(&'static str),

    #[error("checkpoint interval must be non-zero")]
    ZeroCheckpoint,

    #[error("max_chunk_frames must be non-zero")]
    ZeroChunk,
}

/// Non-fatal findings surfaced at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning(pub String);

pub type ConfigWarnings = Vec<ConfigWarning>;

pub fn validate(
    config: &Config,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::new();

    if config.window.interval_minutes == 0
        || 1440 % config.window.interval_minutes != 0
    {
        return Err(ConfigGuardRailError::IntervalNotDivisor(
            config.window.interval_minutes,
        ));
    }
    if config.window.total_days == 0 {
        return Err(ConfigGuardRailError::EmptyWindow(0));
    }

    // Offsets past the half-interval would alias the neighboring slot.
    let bound = (config.window.interval_minutes / 2) as i32 - 1;
    for spec in [&config.sources.corona, &config.sources.disk] {
        let kind = match spec.kind {
            sunlapse_model::SourceKind::Corona => "corona",
            sunlapse_model::SourceKind::Disk => "disk",
        };
        if spec.fallback_offsets.first() != Some(&0) {
            return Err(ConfigGuardRailError::OffsetSequenceMissingZero {
                kind,
            });
        }
        for &offset in &spec.fallback_offsets {
            if offset.abs() > bound {
                return Err(ConfigGuardRailError::OffsetOutOfBounds {
                    kind,
                    offset,
                    bound,
                });
            }
        }
    }

    let half = config.composite.disk_final_size / 2;
    if config.composite.composite_radius >= half {
        return Err(ConfigGuardRailError::CompositeRadiusTooLarge {
            radius: config.composite.composite_radius,
            half,
        });
    }
    if config.composite.feather_radius > config.composite.composite_radius {
        return Err(ConfigGuardRailError::FeatherExceedsRadius {
            feather: config.composite.feather_radius,
            radius: config.composite.composite_radius,
        });
    }

    let crop = config.composite.crop;
    if crop.left + crop.width > config.composite.canvas_width
        || crop.top + crop.height > config.composite.canvas_height
    {
        return Err(ConfigGuardRailError::CropOutsideCanvas {
            left: crop.left,
            top: crop.top,
            width: crop.width,
            height: crop.height,
            canvas_w: config.composite.canvas_width,
            canvas_h: config.composite.canvas_height,
        });
    }

    if config.encode.crf > 51 {
        return Err(ConfigGuardRailError::CrfOutOfRange(config.encode.crf));
    }
    if config.encode.fps == 0 {
        return Err(ConfigGuardRailError::ZeroFps);
    }
    if config.encode.max_chunk_frames == 0 {
        return Err(ConfigGuardRailError::ZeroChunk);
    }
    if config.fetch.concurrency == 0 {
        return Err(ConfigGuardRailError::ZeroConcurrency("fetch"));
    }
    if config.composite.concurrency == 0 {
        return Err(ConfigGuardRailError::ZeroConcurrency("composite"));
    }
    if config.pipeline.checkpoint_every == 0 {
        return Err(ConfigGuardRailError::ZeroCheckpoint);
    }

    if config.encode.crf > 30 {
        warnings.push(ConfigWarning(format!(
            "crf {} will look visibly degraded",
            config.encode.crf
        )));
    }
    if config.fetch.concurrency > 32 {
        warnings.push(ConfigWarning(format!(
            "fetch concurrency {} is likely to trip upstream rate limits",
            config.fetch.concurrency
        )));
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_passes() {
        let config = Config::default();
        assert!(validate(&config).unwrap().is_empty());
    }

    #[test]
    fn interval_must_divide_day() {
        let mut config = Config::default();
        config.window.interval_minutes = 7;
        assert!(matches!(
            validate(&config),
            Err(ConfigGuardRailError::IntervalNotDivisor(7))
        ));
    }

    #[test]
    fn half_interval_offset_is_rejected() {
        // 15-minute cadence: interval/2 - 1 = 6 is the last legal magnitude.
        let mut config = Config::default();
        config.sources.corona.fallback_offsets = vec![0, -6, 6];
        assert!(validate(&config).is_ok());

        config.sources.corona.fallback_offsets = vec![0, 7];
        assert!(matches!(
            validate(&config),
            Err(ConfigGuardRailError::OffsetOutOfBounds { .. })
        ));
    }

    #[test]
    fn crop_must_stay_inside_canvas() {
        let mut config = Config::default();
        config.composite.crop.left = 600;
        assert!(matches!(
            validate(&config),
            Err(ConfigGuardRailError::CropOutsideCanvas { .. })
        ));
    }

    #[test]
    fn radius_bound_is_strict() {
        let mut config = Config::default();
        config.composite.composite_radius =
            config.composite.disk_final_size / 2;
        assert!(matches!(
            validate(&config),
            Err(ConfigGuardRailError::CompositeRadiusTooLarge { .. })
        ));
    }
}
