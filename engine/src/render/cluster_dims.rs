//! Cluster Grid Dimensioning
//!
//! Derives the cluster grid and its depth-slicing constants from the camera.
//! Every consumer of the grid (AABB builder, active-cluster detector, light
//! heat map, shading lookup, and the WGSL prelude through `ClusterUniforms`)
//! goes through the methods here, so the screen/depth → cluster mapping has
//! exactly one definition.
//!
//! ## Depth slicing
//!
//! Slices grow exponentially so clusters stay roughly cube-shaped:
//!
//! ```text
//! slice_scale    = 2·tan(fov_y / 2) / dim_y
//! log_slice_base = 1 / ln(1 + slice_scale)
//! dim_z          = max(1, floor(ln(z_far / z_near) · log_slice_base))
//! slice_near(z)  = z_near · (1 + slice_scale)^z
//! slice(d)       = floor(ln(d / z_near) · log_slice_base)
//! ```
//!
//! The last slice is stretched to `z_far` so the grid covers the whole
//! frustum even though `dim_z` is floored.
//!
//! ## Index layout
//!
//! X varies fastest, then Y, then Z: `i = x + y·dim_x + z·dim_x·dim_y`.
//! Tile Y counts pixel rows from the top of the screen.

use crate::camera::ClusterCamera;
use crate::error::{ClusterError, Result};

/// Cluster grid dimensions and slicing constants for one set of camera
/// intrinsics. Immutable until the intrinsics change.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridDimensions {
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Near plane distance
    pub z_near: f32,
    /// Far plane distance
    pub z_far: f32,
    /// Tiles across the screen
    pub dim_x: u32,
    /// Tiles down the screen
    pub dim_y: u32,
    /// Depth slices
    pub dim_z: u32,
    /// `2·tan(fov_y/2) / dim_y`
    pub slice_scale: f32,
    /// `1 / ln(1 + slice_scale)`
    pub log_slice_base: f32,
    /// Tile size in pixels
    pub block_size: u32,
    /// Screen width in pixels
    pub width: u32,
    /// Screen height in pixels
    pub height: u32,
}

impl GridDimensions {
    /// Compute grid dimensions from raw camera parameters.
    ///
    /// Fails with [`ClusterError::InvalidCamera`] for non-finite values, a FOV
    /// outside (0, π), `z_near ≤ 0`, `z_far ≤ z_near`, a zero resolution or a
    /// zero block size.
    pub fn compute(
        fov_y: f32,
        z_near: f32,
        z_far: f32,
        width: u32,
        height: u32,
        block_size: u32,
    ) -> Result<Self> {
        if !(fov_y.is_finite() && z_near.is_finite() && z_far.is_finite()) {
            return Err(ClusterError::InvalidCamera(format!(
                "non-finite parameters (fov_y={}, near={}, far={})",
                fov_y, z_near, z_far
            )));
        }
        if fov_y <= 0.0 || fov_y >= std::f32::consts::PI {
            return Err(ClusterError::InvalidCamera(format!(
                "fov_y {} must be in (0, π)",
                fov_y
            )));
        }
        if z_near <= 0.0 {
            return Err(ClusterError::InvalidCamera(format!(
                "near plane {} must be positive",
                z_near
            )));
        }
        if z_far <= z_near {
            return Err(ClusterError::InvalidCamera(format!(
                "far plane {} must be beyond near plane {}",
                z_far, z_near
            )));
        }
        if width == 0 || height == 0 {
            return Err(ClusterError::InvalidCamera(format!(
                "resolution {}x{} has a zero dimension",
                width, height
            )));
        }
        if block_size == 0 {
            return Err(ClusterError::InvalidCamera(
                "block size must be at least one pixel".to_string(),
            ));
        }

        let dim_x = width.div_ceil(block_size);
        let dim_y = height.div_ceil(block_size);

        let slice_scale = 2.0 * (fov_y * 0.5).tan() / dim_y as f32;
        let log_slice_base = 1.0 / (1.0 + slice_scale).ln();
        // A FOV this narrow makes 1 + slice_scale round to 1 in f32
        if !log_slice_base.is_finite() {
            return Err(ClusterError::InvalidCamera(format!(
                "fov_y {} is too narrow to slice in depth",
                fov_y
            )));
        }
        let slices = ((z_far / z_near).ln() * log_slice_base).floor();
        let dim_z = if slices >= 1.0 { slices as u32 } else { 1 };

        Ok(Self {
            fov_y,
            z_near,
            z_far,
            dim_x,
            dim_y,
            dim_z,
            slice_scale,
            log_slice_base,
            block_size,
            width,
            height,
        })
    }

    /// Compute grid dimensions for a camera.
    pub fn from_camera(camera: &ClusterCamera, block_size: u32) -> Result<Self> {
        Self::compute(
            camera.fov_y,
            camera.near,
            camera.far,
            camera.width,
            camera.height,
            block_size,
        )
    }

    /// `dim_x × dim_y × dim_z` without overflow.
    pub fn required_clusters(&self) -> u64 {
        (self.dim_x as u64)
            .checked_mul(self.dim_y as u64)
            .and_then(|xy| xy.checked_mul(self.dim_z as u64))
            .unwrap_or(u64::MAX)
    }

    /// Total cluster count. Only meaningful once [`Self::check_capacity`]
    /// has accepted the grid.
    #[inline]
    pub fn cluster_count(&self) -> u32 {
        self.required_clusters().min(u32::MAX as u64) as u32
    }

    /// Reject grids that do not fit the fixed-capacity cluster buffers.
    pub fn check_capacity(&self, max_clusters: u32) -> Result<()> {
        let required = self.required_clusters();
        if required > max_clusters as u64 {
            return Err(ClusterError::ClusterCapacityExceeded {
                dims: [self.dim_x, self.dim_y, self.dim_z],
                required,
                capacity: max_clusters,
            });
        }
        Ok(())
    }

    /// Growth factor between consecutive slice boundaries.
    #[inline]
    pub fn near_k(&self) -> f32 {
        1.0 + self.slice_scale
    }

    /// View-depth bounds `(near, far)` of slice `z`.
    pub fn slice_depth_range(&self, z: u32) -> (f32, f32) {
        let k = self.near_k();
        let slice_near = self.z_near * k.powi(z as i32);
        let slice_far = if z + 1 >= self.dim_z {
            self.z_far
        } else {
            self.z_near * k.powi(z as i32 + 1)
        };
        (slice_near, slice_far)
    }

    /// Depth slice containing a positive view depth, clamped to the grid.
    #[inline]
    pub fn depth_to_slice(&self, view_depth: f32) -> u32 {
        // Also catches NaN
        if !(view_depth > self.z_near) {
            return 0;
        }
        let slice = ((view_depth / self.z_near).ln() * self.log_slice_base).floor();
        (slice.max(0.0) as u32).min(self.dim_z - 1)
    }

    /// Tile containing a pixel position (pixels from the top-left corner).
    #[inline]
    pub fn tile_of_pixel(&self, px: f32, py: f32) -> (u32, u32) {
        let bs = self.block_size as f32;
        let x = (px.max(0.0) / bs).floor() as u32;
        let y = (py.max(0.0) / bs).floor() as u32;
        (x.min(self.dim_x - 1), y.min(self.dim_y - 1))
    }

    /// Cluster index for a shaded point: its pixel position and view depth.
    #[inline]
    pub fn cluster_index_for(&self, px: f32, py: f32, view_depth: f32) -> u32 {
        let (x, y) = self.tile_of_pixel(px, py);
        self.flatten(x, y, self.depth_to_slice(view_depth))
    }

    /// Linear index for cluster (x, y, z).
    #[inline]
    pub fn flatten(&self, x: u32, y: u32, z: u32) -> u32 {
        x + y * self.dim_x + z * self.dim_x * self.dim_y
    }

    /// Grid coordinate (x, y, z) for a linear index.
    #[inline]
    pub fn unflatten(&self, index: u32) -> (u32, u32, u32) {
        let per_slice = self.dim_x * self.dim_y;
        let z = index / per_slice;
        let rem = index % per_slice;
        (rem % self.dim_x, rem / self.dim_x, z)
    }

    /// NDC rectangle `(left, right, top, bottom)` covered by tile (x, y).
    ///
    /// Edge tiles are clipped to the screen.
    pub fn tile_ndc_rect(&self, x: u32, y: u32) -> (f32, f32, f32, f32) {
        let bs = self.block_size;
        let px_left = (x * bs).min(self.width) as f32;
        let px_right = ((x + 1) * bs).min(self.width) as f32;
        let py_top = (y * bs).min(self.height) as f32;
        let py_bottom = ((y + 1) * bs).min(self.height) as f32;

        let w = self.width as f32;
        let h = self.height as f32;
        (
            2.0 * px_left / w - 1.0,
            2.0 * px_right / w - 1.0,
            1.0 - 2.0 * py_top / h,
            1.0 - 2.0 * py_bottom / h,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_dims() -> GridDimensions {
        GridDimensions::compute(60f32.to_radians(), 0.3, 100.0, 1280, 720, 32).unwrap()
    }

    #[test]
    fn test_scenario_dimensions() {
        let dims = scenario_dims();
        assert_eq!(dims.dim_x, 40);
        assert_eq!(dims.dim_y, 23);
        assert_eq!(dims.dim_z, 118);
        assert_eq!(dims.cluster_count(), 40 * 23 * 118);
    }

    #[test]
    fn test_near_k_and_scale() {
        let dims = scenario_dims();
        let expected = 2.0 * 30f32.to_radians().tan() / 23.0;
        assert!((dims.slice_scale - expected).abs() < 1e-6);
        assert!((dims.near_k() - (1.0 + expected)).abs() < 1e-6);
        assert!((dims.log_slice_base - 1.0 / (1.0 + expected).ln()).abs() < 1e-3);
    }

    #[test]
    fn test_invalid_camera_rejected() {
        let fov = 60f32.to_radians();
        assert!(GridDimensions::compute(fov, 0.0, 100.0, 1280, 720, 32).is_err());
        assert!(GridDimensions::compute(fov, -1.0, 100.0, 1280, 720, 32).is_err());
        assert!(GridDimensions::compute(fov, 10.0, 10.0, 1280, 720, 32).is_err());
        assert!(GridDimensions::compute(fov, 10.0, 5.0, 1280, 720, 32).is_err());
        assert!(GridDimensions::compute(fov, 0.3, 100.0, 0, 720, 32).is_err());
        assert!(GridDimensions::compute(fov, 0.3, 100.0, 1280, 0, 32).is_err());
        assert!(GridDimensions::compute(fov, 0.3, 100.0, 1280, 720, 0).is_err());
        assert!(GridDimensions::compute(0.0, 0.3, 100.0, 1280, 720, 32).is_err());
        assert!(GridDimensions::compute(f32::NAN, 0.3, 100.0, 1280, 720, 32).is_err());
    }

    #[test]
    fn test_tiny_fov_is_invalid_camera() {
        let err = GridDimensions::compute(1e-6, 0.1, 1000.0, 1280, 720, 32).unwrap_err();
        assert!(matches!(err, ClusterError::InvalidCamera(_)), "{:?}", err);
    }

    #[test]
    fn test_required_clusters_saturates() {
        let mut dims = GridDimensions::compute(1.0, 0.1, 100.0, 64, 64, 32).unwrap();
        dims.dim_x = u32::MAX;
        dims.dim_y = u32::MAX;
        dims.dim_z = u32::MAX;
        assert_eq!(dims.required_clusters(), u64::MAX);
        assert!(dims.check_capacity(u32::MAX).is_err());
    }

    #[test]
    fn test_shallow_frustum_has_one_slice() {
        let dims = GridDimensions::compute(60f32.to_radians(), 1.0, 1.01, 64, 64, 32).unwrap();
        assert_eq!(dims.dim_z, 1);
        assert_eq!(dims.slice_depth_range(0), (1.0, 1.01));
        assert_eq!(dims.depth_to_slice(50.0), 0);
    }

    #[test]
    fn test_capacity_check() {
        let dims = scenario_dims();
        assert!(dims.check_capacity(dims.cluster_count()).is_ok());
        let err = dims.check_capacity(1000).unwrap_err();
        assert!(matches!(err, ClusterError::ClusterCapacityExceeded { .. }));
    }

    #[test]
    fn test_flatten_unflatten() {
        let dims = scenario_dims();
        for &(x, y, z) in &[(0, 0, 0), (39, 0, 0), (0, 22, 0), (5, 7, 100), (39, 22, 117)] {
            let i = dims.flatten(x, y, z);
            assert_eq!(dims.unflatten(i), (x, y, z));
        }
        assert_eq!(dims.flatten(1, 0, 0), 1);
        assert_eq!(dims.flatten(0, 1, 0), 40);
        assert_eq!(dims.flatten(0, 0, 1), 40 * 23);
        assert_eq!(dims.flatten(39, 22, 117), dims.cluster_count() - 1);
    }

    #[test]
    fn test_slice_ranges_continuous() {
        let dims = scenario_dims();
        let (first_near, _) = dims.slice_depth_range(0);
        assert!((first_near - 0.3).abs() < 1e-6);

        for z in 0..dims.dim_z - 1 {
            let (n0, f0) = dims.slice_depth_range(z);
            let (n1, _) = dims.slice_depth_range(z + 1);
            assert!(f0 > n0);
            assert!((f0 - n1).abs() <= f0 * 1e-5, "slice {} far {} vs next near {}", z, f0, n1);
        }

        let (_, last_far) = dims.slice_depth_range(dims.dim_z - 1);
        assert_eq!(last_far, 100.0);
    }

    #[test]
    fn test_depth_to_slice_inside_range() {
        let dims = scenario_dims();
        for z in [0, 1, 10, 57, 100, dims.dim_z - 1] {
            let (near, far) = dims.slice_depth_range(z);
            let mid = (near * far).sqrt();
            assert_eq!(dims.depth_to_slice(mid), z, "mid depth {} of slice {}", mid, z);
        }
    }

    #[test]
    fn test_depth_to_slice_clamped() {
        let dims = scenario_dims();
        assert_eq!(dims.depth_to_slice(0.01), 0);
        assert_eq!(dims.depth_to_slice(f32::NAN), 0);
        assert_eq!(dims.depth_to_slice(1.0e6), dims.dim_z - 1);
    }

    #[test]
    fn test_tile_of_pixel() {
        let dims = scenario_dims();
        assert_eq!(dims.tile_of_pixel(0.5, 0.5), (0, 0));
        assert_eq!(dims.tile_of_pixel(31.5, 31.5), (0, 0));
        assert_eq!(dims.tile_of_pixel(32.5, 64.5), (1, 2));
        assert_eq!(dims.tile_of_pixel(1279.5, 719.5), (39, 22));
        assert_eq!(dims.tile_of_pixel(5000.0, 5000.0), (39, 22));
    }

    #[test]
    fn test_tile_ndc_rect_clipped() {
        let dims = scenario_dims();
        let (l, r, t, b) = dims.tile_ndc_rect(0, 0);
        assert_eq!(l, -1.0);
        assert_eq!(t, 1.0);
        assert!(r > l);
        assert!(b < t);

        // 720 = 22.5 tiles: the last row stops at the screen edge
        let (_, _, _, bottom) = dims.tile_ndc_rect(39, 22);
        assert!((bottom + 1.0).abs() < 1e-6);
    }
}
