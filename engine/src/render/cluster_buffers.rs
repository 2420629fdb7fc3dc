//! Cluster GPU Buffer Structures
//!
//! Rust mirrors of the GPU-resident cluster data and the buffer set the
//! compute passes share.
//!
//! ## Buffers
//!
//! | Buffer              | Element              | Count               | Written by            |
//! |---------------------|----------------------|---------------------|-----------------------|
//! | cluster AABBs       | `ClusterAabb` (32 B) | cluster count       | AABB build (rare)     |
//! | cluster flags       | `u32`                | cluster count       | active-cluster scan   |
//! | unique counter      | `u32` (atomic)       | 1                   | compaction            |
//! | unique clusters     | `u32`                | cluster count       | compaction            |
//! | unique count        | `u32`                | 1                   | copy (sequence point) |
//! | dispatch args       | `DispatchIndirectArgs` | 1                 | indirect update       |
//! | draw args           | `DrawIndirectArgs`   | 1                   | indirect update       |
//! | light grid          | `LightGridEntry` (8 B) | cluster count     | light assignment      |
//! | light index counter | `LightIndexCounter`  | 1                   | light assignment      |
//! | light index list    | `u32`                | index capacity      | light assignment      |
//!
//! Everything is allocated once per grid and reused in place every frame.

use super::cluster_config::ASSIGN_WORKGROUP_SIZE;
use super::cluster_dims::GridDimensions;
use super::point_lights::{GpuLightColor, GpuPointLight};
use crate::camera::ClusterCamera;
use glam::Vec3;

// ============================================================================
// ClusterAabb - View-space bounds of one cluster
// ============================================================================

/// View-space axis-aligned bounding box of a single cluster.
///
/// WGSL Layout (32 bytes, 2 rows of 16 bytes):
///   Row 0 (offset 0-15):  min.xyz, min.w (unused, 1.0)
///   Row 1 (offset 16-31): max.xyz, max.w (unused, 1.0)
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ClusterAabb {
    pub min: [f32; 4],
    pub max: [f32; 4],
}

impl ClusterAabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: [min.x, min.y, min.z, 1.0],
            max: [max.x, max.y, max.z, 1.0],
        }
    }

    /// Bounding box of a set of points.
    pub fn from_points(points: &[Vec3]) -> Self {
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for p in points {
            min = min.min(*p);
            max = max.max(*p);
        }
        Self::new(min, max)
    }

    #[inline]
    pub fn min3(&self) -> Vec3 {
        Vec3::new(self.min[0], self.min[1], self.min[2])
    }

    #[inline]
    pub fn max3(&self) -> Vec3 {
        Vec3::new(self.max[0], self.max[1], self.max[2])
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min3() + self.max3()) * 0.5
    }

    /// Point containment with a tolerance on every face.
    #[inline]
    pub fn contains_point(&self, point: Vec3, epsilon: f32) -> bool {
        let min = self.min3() - Vec3::splat(epsilon);
        let max = self.max3() + Vec3::splat(epsilon);
        point.cmpge(min).all() && point.cmple(max).all()
    }
}

// ============================================================================
// LightGridEntry - Per-cluster range into the light index list
// ============================================================================

/// `{offset, count}` into the light index list.
///
/// WGSL Layout (8 bytes):
///   offset 0: offset (u32)
///   offset 4: count  (u32)
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightGridEntry {
    pub offset: u32,
    pub count: u32,
}

impl LightGridEntry {
    pub fn new(offset: u32, count: u32) -> Self {
        Self { offset, count }
    }

    /// Index-list range covered by this cluster.
    #[inline]
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset as usize..(self.offset + self.count) as usize
    }
}

/// Shared write cursor of the light index list.
///
/// `next` is the reservation cursor and saturates at the list capacity;
/// `overflow` accumulates the number of indices that did not fit.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightIndexCounter {
    pub next: u32,
    pub overflow: u32,
}

// ============================================================================
// Indirect arguments
// ============================================================================

/// Layout of `dispatch_workgroups_indirect` arguments.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DispatchIndirectArgs {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

/// Layout of `draw_indirect` arguments.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawIndirectArgs {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

/// Both argument buffers derived from one unique-cluster count.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct IndirectArgs {
    /// Light assignment: one invocation per unique cluster
    pub dispatch: DispatchIndirectArgs,
    /// Cluster visualization: one point per unique cluster
    pub draw: DrawIndirectArgs,
}

impl IndirectArgs {
    /// Same derivation as `cs_update_indirect_args` in cluster_indirect.wgsl.
    pub fn from_unique_count(count: u32) -> Self {
        Self {
            dispatch: DispatchIndirectArgs {
                x: count.div_ceil(ASSIGN_WORKGROUP_SIZE),
                y: 1,
                z: 1,
            },
            draw: DrawIndirectArgs {
                vertex_count: count,
                instance_count: 1,
                first_vertex: 0,
                first_instance: 0,
            },
        }
    }
}

// ============================================================================
// ClusterUniforms - Shared by every cluster kernel
// ============================================================================

/// Uniform block of the cluster_common.wgsl prelude.
///
/// WGSL Layout (256 bytes):
///   offset   0: projection         mat4x4<f32>
///   offset  64: inverse_projection mat4x4<f32>
///   offset 128: view               mat4x4<f32>
///   offset 192: screen_dimensions  vec4<f32>  (width, height, 1/width, 1/height)
///   offset 208: grid_dim           vec4<u32>  (dim_x, dim_y, dim_z, cluster_count)
///   offset 224: cluster_size       vec4<u32>  (block, block, light_count, index_capacity)
///   offset 240: depth_params       vec4<f32>  (z_near, near_k, log_slice_base, z_far)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ClusterUniforms {
    pub projection: [[f32; 4]; 4],
    pub inverse_projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub screen_dimensions: [f32; 4],
    pub grid_dim: [u32; 4],
    pub cluster_size: [u32; 4],
    pub depth_params: [f32; 4],
}

static_assertions::assert_eq_size!(ClusterUniforms, [u8; 256]);
static_assertions::assert_eq_size!(ClusterAabb, [u8; 32]);
static_assertions::assert_eq_size!(LightGridEntry, [u8; 8]);
static_assertions::assert_eq_size!(LightIndexCounter, [u8; 8]);
static_assertions::assert_eq_size!(DispatchIndirectArgs, [u8; 12]);
static_assertions::assert_eq_size!(DrawIndirectArgs, [u8; 16]);

impl ClusterUniforms {
    pub fn new(
        dims: &GridDimensions,
        camera: &ClusterCamera,
        light_count: u32,
        index_capacity: u32,
    ) -> Self {
        let projection = camera.projection_matrix();
        let w = dims.width as f32;
        let h = dims.height as f32;
        Self {
            projection: projection.to_cols_array_2d(),
            inverse_projection: projection.inverse().to_cols_array_2d(),
            view: camera.view_matrix().to_cols_array_2d(),
            screen_dimensions: [w, h, 1.0 / w, 1.0 / h],
            grid_dim: [dims.dim_x, dims.dim_y, dims.dim_z, dims.cluster_count()],
            cluster_size: [dims.block_size, dims.block_size, light_count, index_capacity],
            depth_params: [dims.z_near, dims.near_k(), dims.log_slice_base, dims.z_far],
        }
    }
}

// ============================================================================
// Buffer Size Constants
// ============================================================================

pub const CLUSTER_AABB_SIZE: u64 = std::mem::size_of::<ClusterAabb>() as u64;
pub const LIGHT_GRID_ENTRY_SIZE: u64 = std::mem::size_of::<LightGridEntry>() as u64;
pub const CLUSTER_UNIFORMS_SIZE: u64 = std::mem::size_of::<ClusterUniforms>() as u64;
pub const LIGHT_INDEX_COUNTER_SIZE: u64 = std::mem::size_of::<LightIndexCounter>() as u64;
pub const DISPATCH_ARGS_SIZE: u64 = std::mem::size_of::<DispatchIndirectArgs>() as u64;
pub const DRAW_ARGS_SIZE: u64 = std::mem::size_of::<DrawIndirectArgs>() as u64;
const U32_SIZE: u64 = 4;

// ============================================================================
// ClusterGpuBuffers - The buffer set shared by every pass
// ============================================================================

/// All GPU buffers of the cluster pipeline for one grid.
pub struct ClusterGpuBuffers {
    pub uniforms: wgpu::Buffer,
    pub aabbs: wgpu::Buffer,
    pub flags: wgpu::Buffer,
    pub unique_counter: wgpu::Buffer,
    pub unique_clusters: wgpu::Buffer,
    pub unique_count: wgpu::Buffer,
    pub dispatch_args: wgpu::Buffer,
    pub draw_args: wgpu::Buffer,
    pub lights: wgpu::Buffer,
    pub light_colors: wgpu::Buffer,
    pub light_grid: wgpu::Buffer,
    pub light_index_counter: wgpu::Buffer,
    pub light_indices: wgpu::Buffer,
    /// Clusters the per-cluster buffers hold
    pub cluster_count: u32,
    /// Lights the light buffers hold
    pub light_capacity: u32,
    /// Entries the light index list holds
    pub index_capacity: u32,
}

fn storage_buffer(
    device: &wgpu::Device,
    label: &str,
    size: u64,
    extra: wgpu::BufferUsages,
) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        // Zero-sized bindings are invalid
        size: size.max(U32_SIZE),
        usage: wgpu::BufferUsages::STORAGE | extra,
        mapped_at_creation: false,
    })
}

impl ClusterGpuBuffers {
    /// Allocate the buffer set for `dims`.
    ///
    /// `index_capacity` must already be clamped to the device's storage
    /// binding limit.
    pub fn new(
        device: &wgpu::Device,
        dims: &GridDimensions,
        light_capacity: u32,
        index_capacity: u32,
    ) -> Self {
        use wgpu::BufferUsages as U;

        let clusters = dims.cluster_count() as u64;
        let lights = light_capacity as u64;

        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("cluster_uniforms"),
            size: CLUSTER_UNIFORMS_SIZE,
            usage: U::UNIFORM | U::COPY_DST,
            mapped_at_creation: false,
        });

        log::debug!(
            "Allocating cluster buffers: {} clusters, {} lights, {} index slots",
            clusters,
            lights,
            index_capacity
        );

        Self {
            uniforms,
            aabbs: storage_buffer(device, "cluster_aabbs", clusters * CLUSTER_AABB_SIZE, U::COPY_SRC),
            flags: storage_buffer(device, "cluster_flags", clusters * U32_SIZE, U::COPY_DST | U::COPY_SRC),
            unique_counter: storage_buffer(device, "unique_cluster_counter", U32_SIZE, U::COPY_DST | U::COPY_SRC),
            unique_clusters: storage_buffer(device, "unique_clusters", clusters * U32_SIZE, U::COPY_SRC),
            unique_count: storage_buffer(device, "unique_cluster_count", U32_SIZE, U::COPY_DST | U::COPY_SRC),
            dispatch_args: storage_buffer(device, "assign_dispatch_args", DISPATCH_ARGS_SIZE, U::INDIRECT | U::COPY_SRC),
            draw_args: storage_buffer(device, "debug_draw_args", DRAW_ARGS_SIZE, U::INDIRECT | U::COPY_SRC),
            lights: storage_buffer(
                device,
                "cluster_lights",
                lights * std::mem::size_of::<GpuPointLight>() as u64,
                U::COPY_DST,
            ),
            light_colors: storage_buffer(
                device,
                "cluster_light_colors",
                lights * std::mem::size_of::<GpuLightColor>() as u64,
                U::COPY_DST,
            ),
            light_grid: storage_buffer(device, "light_grid", clusters * LIGHT_GRID_ENTRY_SIZE, U::COPY_DST | U::COPY_SRC),
            light_index_counter: storage_buffer(
                device,
                "light_index_counter",
                LIGHT_INDEX_COUNTER_SIZE,
                U::COPY_DST | U::COPY_SRC,
            ),
            light_indices: storage_buffer(device, "light_index_list", index_capacity as u64 * U32_SIZE, U::COPY_SRC),
            cluster_count: dims.cluster_count(),
            light_capacity,
            index_capacity,
        }
    }

    /// Write the per-frame uniforms.
    pub fn write_uniforms(&self, queue: &wgpu::Queue, uniforms: &ClusterUniforms) {
        queue.write_buffer(&self.uniforms, 0, bytemuck::bytes_of(uniforms));
    }

    /// Upload the frame's light snapshot.
    pub fn write_lights(&self, queue: &wgpu::Queue, lights: &[GpuPointLight], colors: &[GpuLightColor]) {
        if lights.is_empty() {
            return;
        }
        queue.write_buffer(&self.lights, 0, bytemuck::cast_slice(lights));
        queue.write_buffer(&self.light_colors, 0, bytemuck::cast_slice(colors));
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_sizes() {
        assert_eq!(CLUSTER_AABB_SIZE, 32);
        assert_eq!(LIGHT_GRID_ENTRY_SIZE, 8);
        assert_eq!(CLUSTER_UNIFORMS_SIZE, 256);
        assert_eq!(DISPATCH_ARGS_SIZE, 12);
        assert_eq!(DRAW_ARGS_SIZE, 16);
    }

    #[test]
    fn test_aabb_from_points() {
        let points = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, -2.0, 0.5),
            Vec3::new(-1.0, 3.0, -4.0),
        ];
        let aabb = ClusterAabb::from_points(&points);
        assert_eq!(aabb.min3(), Vec3::new(-1.0, -2.0, -4.0));
        assert_eq!(aabb.max3(), Vec3::new(1.0, 3.0, 0.5));
        assert_eq!(aabb.center(), Vec3::new(0.0, 0.5, -1.75));
    }

    #[test]
    fn test_aabb_contains_point() {
        let aabb = ClusterAabb::new(Vec3::ZERO, Vec3::splat(10.0));
        assert!(aabb.contains_point(Vec3::splat(5.0), 0.0));
        assert!(aabb.contains_point(Vec3::splat(10.0), 0.0));
        assert!(!aabb.contains_point(Vec3::new(10.1, 5.0, 5.0), 0.0));
        assert!(aabb.contains_point(Vec3::new(10.1, 5.0, 5.0), 0.2));
    }

    #[test]
    fn test_light_grid_entry_range() {
        let entry = LightGridEntry::new(12, 3);
        assert_eq!(entry.range(), 12..15);
        assert!(LightGridEntry::default().range().is_empty());
    }

    #[test]
    fn test_indirect_args_from_count() {
        let zero = IndirectArgs::from_unique_count(0);
        assert_eq!(zero.dispatch, DispatchIndirectArgs { x: 0, y: 1, z: 1 });
        assert_eq!(zero.draw.vertex_count, 0);

        let one = IndirectArgs::from_unique_count(1);
        assert_eq!(one.dispatch.x, 1);

        let exact = IndirectArgs::from_unique_count(ASSIGN_WORKGROUP_SIZE);
        assert_eq!(exact.dispatch.x, 1);

        let over = IndirectArgs::from_unique_count(ASSIGN_WORKGROUP_SIZE + 1);
        assert_eq!(over.dispatch.x, 2);
        assert_eq!(over.draw.vertex_count, ASSIGN_WORKGROUP_SIZE + 1);
        assert_eq!(over.draw.instance_count, 1);
    }

    #[test]
    fn test_uniforms_pack_grid() {
        let camera = ClusterCamera::default();
        let dims = GridDimensions::from_camera(&camera, 32).unwrap();
        let uniforms = ClusterUniforms::new(&dims, &camera, 7, 1000);

        assert_eq!(uniforms.grid_dim, [40, 23, 118, 40 * 23 * 118]);
        assert_eq!(uniforms.cluster_size, [32, 32, 7, 1000]);
        assert_eq!(uniforms.screen_dimensions[0], 1280.0);
        assert_eq!(uniforms.screen_dimensions[3], 1.0 / 720.0);
        assert_eq!(uniforms.depth_params[0], 0.3);
        assert_eq!(uniforms.depth_params[1], dims.near_k());
        assert_eq!(uniforms.depth_params[2], dims.log_slice_base);
        assert_eq!(uniforms.depth_params[3], 100.0);
    }
}
