//! Point Lights
//!
//! Scene-facing point light description and the per-frame light snapshot
//! the cluster passes consume.
//!
//! The scene owns its light list and may keep mutating it; each frame the
//! pipeline copies at most `max_lights` of them into a [`LightSnapshot`] and
//! only ever reads that copy. Lights stay in world space; the assignment pass
//! moves them into view space with the camera's view matrix.

use super::frame_report::CapacityWarning;

/// Scene point light in world space. Never uploaded as-is; the snapshot
/// splits it into [`GpuPointLight`] and [`GpuLightColor`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PointLight {
    pub position: [f32; 3],
    pub radius: f32,
    pub color: [f32; 3],
    pub intensity: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            radius: 5.0,
            color: [1.0, 1.0, 1.0],
            intensity: 1.0,
        }
    }
}

impl PointLight {
    /// Create a new point light with the given parameters.
    pub fn new(position: [f32; 3], color: [f32; 3], radius: f32, intensity: f32) -> Self {
        Self {
            position,
            radius,
            color,
            intensity,
        }
    }

    /// White light of unit intensity.
    pub fn at(position: [f32; 3], radius: f32) -> Self {
        Self {
            position,
            radius,
            ..Default::default()
        }
    }

    /// Set color and return self for chaining.
    pub fn with_color(mut self, color: [f32; 3]) -> Self {
        self.color = color;
        self
    }

    /// Set radius and return self for chaining.
    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    /// Set intensity and return self for chaining.
    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }
}

/// Light position and radius as read by the cluster kernels.
///
/// WGSL: `struct PointLight { position_radius: vec4<f32> }` (16 bytes)
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuPointLight {
    pub position_radius: [f32; 4],
}

/// Light color for the shading consumer, parallel to [`GpuPointLight`].
///
/// WGSL: `struct LightColor { color_intensity: vec4<f32> }` (16 bytes)
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuLightColor {
    pub color_intensity: [f32; 4],
}

static_assertions::assert_eq_size!(GpuPointLight, [u8; 16]);
static_assertions::assert_eq_size!(GpuLightColor, [u8; 16]);

impl From<&PointLight> for GpuPointLight {
    fn from(light: &PointLight) -> Self {
        let [x, y, z] = light.position;
        Self {
            position_radius: [x, y, z, light.radius],
        }
    }
}

impl From<&PointLight> for GpuLightColor {
    fn from(light: &PointLight) -> Self {
        let [r, g, b] = light.color;
        Self {
            color_intensity: [r, g, b, light.intensity],
        }
    }
}

/// Frame-local copy of the scene's lights, capped at `max_lights`.
#[derive(Clone, Debug, Default)]
pub struct LightSnapshot {
    /// Positions and radii, in submission order
    pub lights: Vec<GpuPointLight>,
    /// Colors, parallel to `lights`
    pub colors: Vec<GpuLightColor>,
    /// How many lights the scene submitted
    pub submitted: usize,
}

impl LightSnapshot {
    /// Copy the first `max_lights` lights. Excess lights are dropped and a
    /// warning is logged.
    pub fn capture(lights: &[PointLight], max_lights: u32) -> Self {
        let mut snapshot = Self::default();
        snapshot.recapture(lights, max_lights);
        snapshot
    }

    /// Same as [`Self::capture`], refilling this snapshot's storage in place.
    pub fn recapture(&mut self, lights: &[PointLight], max_lights: u32) {
        let kept = &lights[..lights.len().min(max_lights as usize)];
        self.lights.clear();
        self.lights.extend(kept.iter().map(GpuPointLight::from));
        self.colors.clear();
        self.colors.extend(kept.iter().map(GpuLightColor::from));
        self.submitted = lights.len();
        if let Some(warning) = self.warning() {
            log::warn!("{}", warning);
        }
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.lights.len() as u32
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.submitted > self.lights.len()
    }

    /// The truncation warning, if lights were dropped.
    pub fn warning(&self) -> Option<CapacityWarning> {
        self.is_truncated().then(|| CapacityWarning::LightsTruncated {
            submitted: self.submitted,
            kept: self.len(),
        })
    }
}
