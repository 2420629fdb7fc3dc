//! CPU Depth Buffer
//!
//! Row-major NDC depth values (wgpu convention, 0 = near plane, 1 = far plane),
//! the CPU-side stand-in for the depth pre-pass output. A cleared sample
//! (1.0) is background and touches no cluster.
//!
//! Pixel (0, 0) is the top-left corner, matching texture coordinates on the GPU.

use glam::{Mat4, Vec3};

use crate::camera::{ClusterCamera, unproject_ndc};
use crate::error::{ClusterError, Result};

/// Depth value of a cleared (background) sample.
pub const CLEARED_DEPTH: f32 = 1.0;

#[derive(Clone, Debug, PartialEq)]
pub struct DepthBuffer {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl DepthBuffer {
    /// A cleared buffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![CLEARED_DEPTH; width as usize * height as usize],
        }
    }

    /// Wrap existing NDC depth samples (e.g. read back from a GPU texture).
    pub fn from_ndc(width: u32, height: u32, data: Vec<f32>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(ClusterError::InvalidSettings(format!(
                "depth data has {} samples, {}x{} needs {}",
                data.len(),
                width,
                height,
                expected
            )));
        }
        Ok(Self { width, height, data })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    fn index(&self, px: u32, py: u32) -> usize {
        py as usize * self.width as usize + px as usize
    }

    /// NDC depth at a pixel. Out-of-range pixels read as cleared.
    #[inline]
    pub fn get(&self, px: u32, py: u32) -> f32 {
        if px >= self.width || py >= self.height {
            return CLEARED_DEPTH;
        }
        self.data[self.index(px, py)]
    }

    pub fn set(&mut self, px: u32, py: u32, ndc_depth: f32) {
        if px < self.width && py < self.height {
            let i = self.index(px, py);
            self.data[i] = ndc_depth;
        }
    }

    pub fn clear(&mut self) {
        self.data.fill(CLEARED_DEPTH);
    }

    /// Write a surface at `view_depth` to one pixel.
    pub fn set_view_depth(&mut self, camera: &ClusterCamera, px: u32, py: u32, view_depth: f32) {
        self.set(px, py, camera.ndc_depth_for_view_depth(view_depth));
    }

    /// Fill the whole buffer with a screen-parallel wall at `view_depth`.
    pub fn fill_view_depth(&mut self, camera: &ClusterCamera, view_depth: f32) {
        self.data.fill(camera.ndc_depth_for_view_depth(view_depth));
    }

    /// Fill the pixel rectangle `[x0, x1) × [y0, y1)` with a surface at
    /// `view_depth`. The rectangle is clipped to the buffer.
    pub fn fill_rect_view_depth(
        &mut self,
        camera: &ClusterCamera,
        (x0, y0): (u32, u32),
        (x1, y1): (u32, u32),
        view_depth: f32,
    ) {
        let ndc = camera.ndc_depth_for_view_depth(view_depth);
        for py in y0..y1.min(self.height) {
            for px in x0..x1.min(self.width) {
                let i = self.index(px, py);
                self.data[i] = ndc;
            }
        }
    }

    /// NDC coordinates of a pixel centre.
    #[inline]
    pub fn pixel_ndc(&self, px: u32, py: u32) -> (f32, f32) {
        (
            2.0 * (px as f32 + 0.5) / self.width as f32 - 1.0,
            1.0 - 2.0 * (py as f32 + 0.5) / self.height as f32,
        )
    }

    /// View-space position of the surface seen through a pixel centre, or
    /// `None` for background samples.
    pub fn view_position_at(&self, inverse_projection: &Mat4, px: u32, py: u32) -> Option<Vec3> {
        let depth = self.get(px, py);
        if depth >= CLEARED_DEPTH {
            return None;
        }
        let (ndc_x, ndc_y) = self.pixel_ndc(px, py);
        Some(unproject_ndc(inverse_projection, ndc_x, ndc_y, depth))
    }

    /// Positive view depth through a pixel centre, or `None` for background.
    #[inline]
    pub fn view_depth_at(&self, inverse_projection: &Mat4, px: u32, py: u32) -> Option<f32> {
        self.view_position_at(inverse_projection, px, py).map(|p| -p.z)
    }
}
