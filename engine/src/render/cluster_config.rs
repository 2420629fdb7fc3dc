//! Cluster Configuration Module
//!
//! Constants and runtime settings for the clustered lighting grid.
//!
//! Clusters divide the view frustum into a 3D grid:
//! - X/Y: Screen-space tiles of `block_size × block_size` pixels
//! - Z: Exponentially distributed depth slices, derived from the vertical FOV
//!   so that each cluster is roughly cube-shaped in view space
//!
//! Buffer capacities are fixed per grid: the light-index list is sized from
//! the cluster count and an average overlap hint, never grown mid-frame.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::debug_clusters::DebugClusterMode;
use crate::error::{ClusterError, Result};

/// Default screen tile size in pixels (per side).
pub const DEFAULT_BLOCK_SIZE: u32 = 32;

/// Maximum number of point lights considered per frame.
/// Lights beyond this are dropped with a warning.
pub const MAX_LIGHTS_COUNT: u32 = 10_000;

/// Expected lights per cluster, used to size the shared light-index list.
pub const AVERAGE_OVERLAPPING_LIGHTS_PER_CLUSTER: u32 = 200;

/// Upper bound on `clusterDimX × clusterDimY × clusterDimZ`.
pub const DEFAULT_MAX_CLUSTERS: u32 = 1 << 20;

/// Hard cap on light-index entries: 128 MiB of u32, the default wgpu
/// `max_storage_buffer_binding_size`.
pub const DEFAULT_MAX_LIGHT_INDICES: u32 = 1 << 25;

/// Workgroup size of `cs_build_aabbs` in cluster_aabb.wgsl.
pub const AABB_WORKGROUP_SIZE: u32 = 64;

/// Workgroup tile (per side) of `cs_mark_active` in cluster_flags.wgsl.
pub const FLAGS_WORKGROUP_TILE: u32 = 16;

/// Workgroup size of the per-cluster linear kernels (flag compaction).
pub const UNIQUE_WORKGROUP_SIZE: u32 = 64;

/// Workgroup size of `cs_assign_lights` in cluster_assign.wgsl.
/// The indirect dispatch args are derived from this value.
pub const ASSIGN_WORKGROUP_SIZE: u32 = 64;

/// Runtime settings for the cluster pipeline, loadable from JSON.
///
/// ```
/// use cluster_forward_engine::render::cluster_config::ClusterSettings;
///
/// let settings = ClusterSettings::from_json_str(r#"{ "block_size": 64 }"#).unwrap();
/// assert_eq!(settings.block_size, 64);
/// assert_eq!(settings.max_lights, 10_000);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    /// Screen tile size in pixels
    pub block_size: u32,
    /// Lights considered per frame (`MaxLightsCount`)
    pub max_lights: u32,
    /// Average overlap hint sizing the light-index list
    pub average_overlap: u32,
    /// Capacity of the per-cluster buffers
    pub max_clusters: u32,
    /// Hard cap on the light-index list length
    pub max_light_indices: u32,
    /// Cluster visualization
    pub debug_mode: DebugClusterMode,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_lights: MAX_LIGHTS_COUNT,
            average_overlap: AVERAGE_OVERLAPPING_LIGHTS_PER_CLUSTER,
            max_clusters: DEFAULT_MAX_CLUSTERS,
            max_light_indices: DEFAULT_MAX_LIGHT_INDICES,
            debug_mode: DebugClusterMode::Off,
        }
    }
}

impl ClusterSettings {
    /// Parse settings from a JSON string. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ClusterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_json_str(&json)?;
        log::info!(
            "Loaded cluster settings from {}: block {} px, {} lights, overlap {}",
            path.display(),
            settings.block_size,
            settings.max_lights,
            settings.average_overlap
        );
        Ok(settings)
    }

    /// Reject settings that cannot produce a usable grid.
    pub fn validate(&self) -> Result<()> {
        let zero = [
            ("block_size", self.block_size),
            ("max_lights", self.max_lights),
            ("average_overlap", self.average_overlap),
            ("max_clusters", self.max_clusters),
            ("max_light_indices", self.max_light_indices),
        ]
        .into_iter()
        .find(|(_, value)| *value == 0);

        match zero {
            Some((name, _)) => Err(ClusterError::InvalidSettings(format!(
                "{} must be greater than zero",
                name
            ))),
            None => Ok(()),
        }
    }

    /// Light-index list capacity for a grid of `cluster_count` clusters:
    /// `min(cluster_count × average_overlap, max_light_indices)`.
    pub fn light_index_capacity(&self, cluster_count: u32) -> u32 {
        let wanted = cluster_count as u64 * self.average_overlap as u64;
        wanted.min(self.max_light_indices as u64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_BLOCK_SIZE, 32);
        assert_eq!(MAX_LIGHTS_COUNT, 10_000);
        assert_eq!(AVERAGE_OVERLAPPING_LIGHTS_PER_CLUSTER, 200);
        assert_eq!(DEFAULT_MAX_LIGHT_INDICES as u64 * 4, 128 * 1024 * 1024);
    }

    #[test]
    fn test_default_settings_validate() {
        let settings = ClusterSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.debug_mode, DebugClusterMode::Off);
    }

    #[test]
    fn test_zero_block_size_rejected() {
        let settings = ClusterSettings {
            block_size: 0,
            ..Default::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("block_size"));
    }

    #[test]
    fn test_light_index_capacity_uses_overlap() {
        let settings = ClusterSettings {
            average_overlap: 8,
            ..Default::default()
        };
        assert_eq!(settings.light_index_capacity(100), 800);
    }

    #[test]
    fn test_light_index_capacity_clamped() {
        let settings = ClusterSettings {
            max_light_indices: 1000,
            ..Default::default()
        };
        // 108_560 clusters × 200 would be far past the cap
        assert_eq!(settings.light_index_capacity(108_560), 1000);
    }
}
