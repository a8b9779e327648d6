use serde::{Deserialize, Serialize};

/// The two imagery layers fused into every frame.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Wide-field coronagraph layer.
    Corona,
    /// Near-Sun disk layer.
    Disk,
}

impl SourceKind {
    pub const ALL: [SourceKind; 2] = [SourceKind::Corona, SourceKind::Disk];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Corona => "corona",
            SourceKind::Disk => "disk",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upstream request shape for one source layer.
///
/// `fallback_offsets` is ordered, starts at 0, and is walked strictly in the
/// declared order when the exact instant is missing or a duplicate. The order
/// is intentionally asymmetric per source (the upstream's data availability
/// is not symmetric around an instant); reordering it changes composition
/// output and is a configuration version bump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub kind: SourceKind,
    /// Numeric layer id understood by the upstream screenshot endpoint.
    pub layer_id: u32,
    /// Arc-seconds per pixel requested from the upstream.
    pub image_scale: f64,
    pub width: u32,
    pub height: u32,
    /// Signed minute offsets, tried in order, first entry always 0.
    pub fallback_offsets: Vec<i32>,
}

impl SourceSpec {
    /// Default coronagraph layer: biased toward negative offsets.
    pub fn corona() -> Self {
        Self {
            kind: SourceKind::Corona,
            layer_id: 4,
            image_scale: 8.0,
            width: 1920,
            height: 1435,
            fallback_offsets: vec![0, -3, -6, 3],
        }
    }

    /// Default disk layer: offsets alternate sign.
    pub fn disk() -> Self {
        Self {
            kind: SourceKind::Disk,
            layer_id: 10,
            image_scale: 2.42,
            width: 1435,
            height: 1435,
            fallback_offsets: vec![0, -3, 3, -6, 6],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_start_at_zero() {
        for spec in [SourceSpec::corona(), SourceSpec::disk()] {
            assert_eq!(spec.fallback_offsets.first(), Some(&0));
        }
    }

    #[test]
    fn offsets_stay_inside_half_interval() {
        // 15-minute cadence permits magnitudes up to 15/2 - 1 = 6.
        for spec in [SourceSpec::corona(), SourceSpec::disk()] {
            assert!(spec.fallback_offsets.iter().all(|off| off.abs() <= 6));
        }
    }
}
