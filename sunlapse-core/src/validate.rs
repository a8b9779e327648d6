//! Frame validation, backing the `--validate` CLI mode.
//!
//! A frame passes when it decodes to exactly the crop geometry and meets
//! the minimum encoded size. Pointed at a base directory, the validator
//! additionally cross-checks the manifest: recorded fallback offsets must
//! stay inside the half-interval bound and every successful record's file
//! must exist.

use std::path::Path;

use sunlapse_config::Config;
use sunlapse_model::{FrameStatus, Manifest};
use tracing::debug;

use crate::error::{PipelineError, Result};

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub checked: usize,
    pub failures: Vec<String>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, message: String) {
        self.failures.push(message);
    }
}

/// Validate a single frame file against the composite contract.
pub fn validate_frame_file(
    path: &Path,
    config: &Config,
) -> std::result::Result<(), String> {
    let bytes = std::fs::read(path)
        .map_err(|err| format!("{}: unreadable: {err}", path.display()))?;

    if (bytes.len() as u64) < config.composite.min_frame_bytes {
        return Err(format!(
            "{}: {} bytes below the {} byte minimum",
            path.display(),
            bytes.len(),
            config.composite.min_frame_bytes
        ));
    }

    let decoded = image::load_from_memory(&bytes)
        .map_err(|err| format!("{}: undecodable: {err}", path.display()))?;

    let crop = config.composite.crop;
    if decoded.width() != crop.width || decoded.height() != crop.height {
        return Err(format!(
            "{}: decodes to {}x{}, expected {}x{}",
            path.display(),
            decoded.width(),
            decoded.height(),
            crop.width,
            crop.height
        ));
    }

    Ok(())
}

/// Validate a frame file, a directory of frames, or a base directory with
/// a manifest.
pub async fn validate_path(
    path: &Path,
    config: &Config,
) -> Result<ValidationReport> {
    let mut report = ValidationReport::default();

    if path.is_file() {
        report.checked = 1;
        if let Err(failure) = validate_frame_file(path, config) {
            report.fail(failure);
        }
        return Ok(report);
    }

    if !path.is_dir() {
        return Err(PipelineError::Internal(format!(
            "{} is neither a file nor a directory",
            path.display()
        )));
    }

    let manifest_path = path.join("manifest.json");
    if manifest_path.exists() {
        let bytes = tokio::fs::read(&manifest_path).await?;
        let manifest: Manifest = serde_json::from_slice(&bytes)?;
        validate_manifest(&manifest, config, &mut report);
    }

    let mut stack = vec![path.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let entry_path = entry.path();
            if entry_path.is_dir() {
                stack.push(entry_path);
            } else if entry_path.extension().and_then(|ext| ext.to_str())
                == Some("jpg")
            {
                report.checked += 1;
                if crate::store::frame_path_time(&entry_path).is_none() {
                    report.fail(format!(
                        "{}: not a canonical frame path",
                        entry_path.display()
                    ));
                }
                if let Err(failure) =
                    validate_frame_file(&entry_path, config)
                {
                    report.fail(failure);
                }
            }
        }
    }

    debug!(
        checked = report.checked,
        failures = report.failures.len(),
        "validation complete"
    );
    Ok(report)
}

fn validate_manifest(
    manifest: &Manifest,
    config: &Config,
    report: &mut ValidationReport,
) {
    let bound = (config.window.interval_minutes / 2) as i32 - 1;

    check_fingerprint_uniqueness(manifest, report);

    for (key, record) in &manifest.frames {
        for (label, offset) in [
            ("corona", record.corona_offset),
            ("disk", record.disk_offset),
        ] {
            if let Some(offset) = offset
                && offset.abs() > bound
            {
                report.fail(format!(
                    "{key}: {label} offset {offset} exceeds the \
                     half-interval bound of {bound}"
                ));
            }
        }

        if record.status == FrameStatus::Success {
            match &record.file_path {
                Some(file) if Path::new(file).exists() => {}
                Some(file) => {
                    report.fail(format!("{key}: missing file {file}"));
                }
                None => {
                    report.fail(format!(
                        "{key}: success record without a file path"
                    ));
                }
            }
            if record.attempts == 0 {
                report.fail(format!("{key}: zero attempts on a record"));
            }
        }
    }
}

/// Cross-frame uniqueness: non-adjacent successful records must not share
/// a fingerprint for the same source unless they carry the duplicate
/// marker. Manifest keys sort chronologically, so the key's position is
/// the record's slot in the window.
fn check_fingerprint_uniqueness(
    manifest: &Manifest,
    report: &mut ValidationReport,
) {
    use std::collections::{BTreeSet, HashMap};
    use sunlapse_model::Fingerprint;

    let mut seen: [HashMap<Fingerprint, BTreeSet<usize>>; 2] =
        [HashMap::new(), HashMap::new()];

    for (slot, (key, record)) in manifest.frames.iter().enumerate() {
        if record.status != FrameStatus::Success || record.duplicate {
            continue;
        }
        let prints = [
            (0usize, "corona", record.corona_fingerprint),
            (1usize, "disk", record.disk_fingerprint),
        ];
        for (source, label, fingerprint) in prints {
            let Some(fingerprint) = fingerprint else { continue };
            let slots = seen[source].entry(fingerprint).or_default();
            if slots.iter().any(|&prev| slot.abs_diff(prev) > 1) {
                report.fail(format!(
                    "{key}: {label} fingerprint repeats a non-adjacent \
                     frame without a duplicate marker"
                ));
            }
            slots.insert(slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};

    fn tiny_config() -> Config {
        let mut config = Config::default();
        config.composite.crop.width = 64;
        config.composite.crop.height = 48;
        config.composite.crop.left = 0;
        config.composite.crop.top = 0;
        config.composite.min_frame_bytes = 16;
        config
    }

    fn write_jpeg(path: &Path, width: u32, height: u32) {
        let image = RgbaImage::from_pixel(
            width,
            height,
            Rgba([120, 90, 30, 255]),
        );
        DynamicImage::ImageRgba8(image)
            .to_rgb8()
            .save_with_format(path, image::ImageFormat::Jpeg)
            .unwrap();
    }

    #[tokio::test]
    async fn correct_frame_passes() {
        let dir = tempfile::tempdir().unwrap();
        let frame = dir.path().join("frame_0000.jpg");
        write_jpeg(&frame, 64, 48);

        let report =
            validate_path(&frame, &tiny_config()).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.checked, 1);
    }

    #[tokio::test]
    async fn wrong_dimensions_fail() {
        let dir = tempfile::tempdir().unwrap();
        let frame = dir.path().join("frame_0000.jpg");
        write_jpeg(&frame, 32, 32);

        let report =
            validate_path(&frame, &tiny_config()).await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].contains("32x32"));
    }

    #[tokio::test]
    async fn directory_walk_finds_all_frames() {
        let dir = tempfile::tempdir().unwrap();
        let day = dir.path().join("2026-01-01");
        std::fs::create_dir_all(&day).unwrap();
        write_jpeg(&day.join("frame_0000.jpg"), 64, 48);
        write_jpeg(&day.join("frame_0015.jpg"), 10, 10);

        let report =
            validate_path(dir.path(), &tiny_config()).await.unwrap();
        assert_eq!(report.checked, 2);
        assert_eq!(report.failures.len(), 1);
    }

    #[tokio::test]
    async fn manifest_offsets_are_bounded() {
        use chrono::{TimeZone, Utc};
        use sunlapse_model::{FrameRecord, TargetInstant};

        let dir = tempfile::tempdir().unwrap();
        let mut manifest = Manifest::default();
        let instant = TargetInstant::new(
            0,
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        );
        let mut record = FrameRecord::first_attempt(instant.time, 1);
        // 7 == interval/2 for the 15-minute cadence: out of bounds.
        record.corona_offset = Some(7);
        manifest.upsert(&instant, record);
        std::fs::write(
            dir.path().join("manifest.json"),
            serde_json::to_vec(&manifest).unwrap(),
        )
        .unwrap();

        let report =
            validate_path(dir.path(), &tiny_config()).await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].contains("offset 7"));
    }

    #[tokio::test]
    async fn repeated_fingerprints_need_a_marker() {
        use chrono::{TimeZone, Utc};
        use sunlapse_model::{
            Fingerprint, FrameRecord, FrameStatus, TargetInstant,
        };

        let dir = tempfile::tempdir().unwrap();
        let mut manifest = Manifest::default();
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let shared = Fingerprint::of(b"same frame");

        for index in [0usize, 1, 5] {
            let instant = TargetInstant::new(
                index,
                start + chrono::Duration::minutes(15 * index as i64),
            );
            let mut record = FrameRecord::first_attempt(instant.time, 1);
            record.status = FrameStatus::Success;
            record.corona_fingerprint = Some(shared);
            manifest.upsert(&instant, record);
        }

        std::fs::write(
            dir.path().join("manifest.json"),
            serde_json::to_vec(&manifest).unwrap(),
        )
        .unwrap();

        let report =
            validate_path(dir.path(), &tiny_config()).await.unwrap();
        // Slots 0 and 1 are adjacent and tolerated; slot 5 is not. The
        // success records also lack files, which fails separately.
        assert!(report
            .failures
            .iter()
            .any(|failure| failure.contains("without a duplicate marker")));
    }
}
