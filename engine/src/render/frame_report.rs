//! Per-frame statistics and non-fatal capacity conditions.

use std::fmt;

/// A capacity limit hit during a frame. The frame still completes; the
/// affected data is clamped, never written out of bounds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CapacityWarning {
    /// More lights were submitted than `max_lights`; the excess was dropped.
    LightsTruncated { submitted: usize, kept: u32 },
    /// The light index list filled up; `dropped` indices were not written.
    LightIndexOverflow { dropped: u32, capacity: u32 },
}

impl fmt::Display for CapacityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LightsTruncated { submitted, kept } => write!(
                f,
                "{} lights submitted, only the first {} are considered",
                submitted, kept
            ),
            Self::LightIndexOverflow { dropped, capacity } => write!(
                f,
                "light index list full ({} entries), {} assignments dropped",
                capacity, dropped
            ),
        }
    }
}

/// Summary of one pipeline frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterFrameReport {
    /// Clusters touched by visible geometry (length of the unique list)
    pub active_clusters: u32,
    /// Lights taken into the frame's snapshot
    pub light_count: u32,
    /// Light indices written across all clusters
    pub light_assignments: u32,
    /// Largest per-cluster light count
    pub max_lights_per_cluster: u32,
    pub warnings: Vec<CapacityWarning>,
}

impl ClusterFrameReport {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_display() {
        let w = CapacityWarning::LightsTruncated {
            submitted: 10_005,
            kept: 10_000,
        };
        assert_eq!(
            w.to_string(),
            "10005 lights submitted, only the first 10000 are considered"
        );

        let w = CapacityWarning::LightIndexOverflow {
            dropped: 3,
            capacity: 64,
        };
        assert!(w.to_string().contains("3 assignments dropped"));
    }

    #[test]
    fn test_default_report_is_clean() {
        assert!(!ClusterFrameReport::default().has_warnings());
    }
}
