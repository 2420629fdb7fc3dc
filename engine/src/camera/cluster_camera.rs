//! Cluster Camera
//!
//! The camera description the cluster pipeline consumes each frame: intrinsics
//! (FOV, near/far, resolution) drive grid dimensioning and cluster AABBs,
//! extrinsics (position/target) only feed the view matrix used to move lights
//! into view space.
//!
//! ## Coordinate System
//!
//! - Right-handed, view space looks toward -Z
//! - Projection maps view depth into wgpu's [0, 1] NDC depth range
//! - "View depth" is the positive distance `-view.z`

use glam::{Mat4, Vec3};

/// Camera parameters supplied by the scene each frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClusterCamera {
    /// Camera position in world space
    pub position: Vec3,
    /// Point the camera looks at
    pub target: Vec3,
    /// World up vector
    pub up: Vec3,
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Near plane distance
    pub near: f32,
    /// Far plane distance
    pub far: f32,
    /// Render target width in pixels
    pub width: u32,
    /// Render target height in pixels
    pub height: u32,
}

impl Default for ClusterCamera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, -20.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y: 60f32.to_radians(),
            near: 0.3,
            far: 100.0,
            width: 1280,
            height: 720,
        }
    }
}

/// The subset of camera state that cluster dimensions and AABBs depend on.
///
/// Two cameras with equal intrinsics share the same grid, so moving or
/// rotating the camera never forces a cluster rebuild.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraIntrinsics {
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    pub width: u32,
    pub height: u32,
}

impl ClusterCamera {
    /// Create a camera looking from `position` at `target` with world-up Y.
    pub fn new(
        position: Vec3,
        target: Vec3,
        fov_y: f32,
        near: f32,
        far: f32,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            position,
            target,
            up: Vec3::Y,
            fov_y,
            near,
            far,
            width,
            height,
        }
    }

    /// Set resolution and return self for chaining.
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Width / height. Zero height yields zero rather than infinity.
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f32 / self.height as f32
    }

    pub fn intrinsics(&self) -> CameraIntrinsics {
        CameraIntrinsics {
            fov_y: self.fov_y,
            near: self.near,
            far: self.far,
            width: self.width,
            height: self.height,
        }
    }

    /// World → view transform.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// View → clip transform (wgpu depth range).
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect_ratio(), self.near, self.far)
    }

    pub fn inverse_projection(&self) -> Mat4 {
        self.projection_matrix().inverse()
    }

    /// NDC depth written by the rasterizer for a surface at `view_depth`.
    pub fn ndc_depth_for_view_depth(&self, view_depth: f32) -> f32 {
        self.projection_matrix()
            .project_point3(Vec3::new(0.0, 0.0, -view_depth))
            .z
    }
}

/// Unproject an NDC point into view space.
#[inline]
pub fn unproject_ndc(inverse_projection: &Mat4, ndc_x: f32, ndc_y: f32, ndc_z: f32) -> Vec3 {
    inverse_projection.project_point3(Vec3::new(ndc_x, ndc_y, ndc_z))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_camera_looks_at_origin() {
        let camera = ClusterCamera::default();
        let view = camera.view_matrix();
        let origin_view = view.transform_point3(Vec3::ZERO);
        assert!(origin_view.x.abs() < 1e-4);
        assert!(origin_view.y.abs() < 1e-4);
        assert!((origin_view.z + 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_ndc_depth_range() {
        let camera = ClusterCamera::default();
        assert!(camera.ndc_depth_for_view_depth(camera.near).abs() < 1e-5);
        assert!((camera.ndc_depth_for_view_depth(camera.far) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_unproject_inverts_projection() {
        let camera = ClusterCamera::default();
        let ndc_z = camera.ndc_depth_for_view_depth(20.0);
        let p = unproject_ndc(&camera.inverse_projection(), 0.0, 0.0, ndc_z);
        assert!((p.z + 20.0).abs() < 1e-2, "got {}", p.z);
    }

    #[test]
    fn test_intrinsics_ignore_position() {
        let a = ClusterCamera::default();
        let mut b = a;
        b.position = Vec3::new(5.0, 1.0, -3.0);
        assert_eq!(a.intrinsics(), b.intrinsics());

        let c = a.with_resolution(1920, 1080);
        assert_ne!(a.intrinsics(), c.intrinsics());
    }

    #[test]
    fn test_zero_height_aspect() {
        let camera = ClusterCamera::default().with_resolution(100, 0);
        assert_eq!(camera.aspect_ratio(), 0.0);
    }
}
