//! Cluster Bounds Calculation
//!
//! Computes one view-space AABB per cluster. Each cluster is a truncated
//! pyramid: its screen tile's four corners, unprojected onto view rays, cut
//! by the near and far depth of its slice. The AABB is the per-axis min/max
//! of those 8 points.
//!
//! Bounds are in view space, so they only depend on camera intrinsics and the
//! block size. Moving or turning the camera never invalidates them.
//!
//! cluster_aabb.wgsl runs the same construction on the GPU.

use glam::{Mat4, Vec3};
use rayon::prelude::*;

use super::cluster_buffers::ClusterAabb;
use super::cluster_dims::GridDimensions;
use crate::camera::{CameraIntrinsics, ClusterCamera, unproject_ndc};
use crate::error::Result;

/// Build AABBs for every cluster of the grid, in flattened index order.
///
/// Embarrassingly parallel over cluster index.
pub fn build_cluster_aabbs(dims: &GridDimensions, inverse_projection: &Mat4) -> Vec<ClusterAabb> {
    (0..dims.cluster_count())
        .into_par_iter()
        .map(|index| cluster_aabb(dims, inverse_projection, index))
        .collect()
}

/// AABB of a single cluster.
pub fn cluster_aabb(dims: &GridDimensions, inverse_projection: &Mat4, index: u32) -> ClusterAabb {
    let (x, y, z) = dims.unflatten(index);
    let (depth_near, depth_far) = dims.slice_depth_range(z);
    let (left, right, top, bottom) = dims.tile_ndc_rect(x, y);

    let rays = [
        unproject_ndc(inverse_projection, left, top, 0.0),
        unproject_ndc(inverse_projection, right, top, 0.0),
        unproject_ndc(inverse_projection, left, bottom, 0.0),
        unproject_ndc(inverse_projection, right, bottom, 0.0),
    ];

    let mut corners = [Vec3::ZERO; 8];
    for (i, ray) in rays.iter().enumerate() {
        corners[i] = point_at_view_depth(*ray, depth_near);
        corners[i + 4] = point_at_view_depth(*ray, depth_far);
    }

    ClusterAabb::from_points(&corners)
}

/// Slide a view-space point along its ray from the eye to a given view depth.
#[inline]
pub fn point_at_view_depth(point_on_ray: Vec3, view_depth: f32) -> Vec3 {
    point_on_ray * (view_depth / -point_on_ray.z)
}

/// Caches cluster dimensions and AABBs, rebuilding only when the camera
/// intrinsics or block size change.
#[derive(Clone, Debug, Default)]
pub struct ClusterBoundsTracker {
    key: Option<(CameraIntrinsics, u32)>,
    dims: Option<GridDimensions>,
    aabbs: Vec<ClusterAabb>,
}

impl ClusterBoundsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if bounds are missing or were built for different intrinsics.
    pub fn needs_update(&self, camera: &ClusterCamera, block_size: u32) -> bool {
        self.key != Some((camera.intrinsics(), block_size))
    }

    /// Redimension and rebuild if needed. Returns `true` when a rebuild
    /// happened. Invalid cameras and oversized grids fail here, before
    /// anything is allocated, and leave the previous bounds untouched.
    pub fn update(&mut self, camera: &ClusterCamera, block_size: u32, max_clusters: u32) -> Result<bool> {
        if !self.needs_update(camera, block_size) {
            return Ok(false);
        }

        let dims = GridDimensions::from_camera(camera, block_size)?;
        dims.check_capacity(max_clusters)?;

        self.aabbs = build_cluster_aabbs(&dims, &camera.inverse_projection());
        self.dims = Some(dims);
        self.key = Some((camera.intrinsics(), block_size));

        log::info!(
            "Cluster grid {}x{}x{} ({} clusters) for {}x{}, bounds rebuilt",
            dims.dim_x,
            dims.dim_y,
            dims.dim_z,
            dims.cluster_count(),
            dims.width,
            dims.height
        );
        Ok(true)
    }

    pub fn dims(&self) -> Option<&GridDimensions> {
        self.dims.as_ref()
    }

    pub fn aabbs(&self) -> &[ClusterAabb] {
        &self.aabbs
    }

    /// Force a rebuild on the next update.
    pub fn invalidate(&mut self) {
        self.key = None;
    }

    pub fn has_cached_bounds(&self) -> bool {
        self.dims.is_some()
    }
}

// ============================================================================
// Tests
// ============================================================================
