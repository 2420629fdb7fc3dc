//! Clustered Lighting (GPU)
//!
//! Owns the cluster compute pipelines and buffer set, and encodes the
//! per-frame passes:
//!
//! ```text
//! prepare (intrinsics changed) → AABB build, submitted immediately
//! encode_frame                 → flags → unique → count copy → indirect args → assignment
//! ```
//!
//! Nothing on the per-frame path reads back to the CPU; the assignment pass
//! is sized by indirect dispatch. `read_frame` and `read_frame_stats` are
//! explicit, blocking readbacks for tools and tests.

use std::path::Path;

use super::binding_validator::validate_shading_bindings;
use super::cluster_buffers::{
    ClusterAabb, ClusterGpuBuffers, ClusterUniforms, DispatchIndirectArgs, DrawIndirectArgs, IndirectArgs,
    LightGridEntry, LightIndexCounter,
};
use super::cluster_config::ClusterSettings;
use super::cluster_dims::GridDimensions;
use super::cluster_dispatch as dispatch;
use super::compute_pipelines::{ClusterComputePipelines, storage_entry, uniform_entry};
use super::frame_report::{CapacityWarning, ClusterFrameReport};
use super::gpu_context::read_buffer;
use super::point_lights::{LightSnapshot, PointLight};
use crate::camera::{CameraIntrinsics, ClusterCamera};
use crate::error::{ClusterError, Result};

// @group(0) @binding(0): uniform ClusterUniforms
// @group(0) @binding(1): storage<read> light_grid
// @group(0) @binding(2): storage<read> light_indices
// @group(0) @binding(3): storage<read> lights
// @group(0) @binding(4): storage<read> light_colors
pub fn shading_layout_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    let stages = wgpu::ShaderStages::FRAGMENT | wgpu::ShaderStages::COMPUTE;
    vec![
        uniform_entry(0, stages),
        storage_entry(1, stages, true),
        storage_entry(2, stages, true),
        storage_entry(3, stages, true),
        storage_entry(4, stages, true),
    ]
}

/// Everything the passes wrote in one frame, read back to the CPU.
#[derive(Clone, Debug, Default)]
pub struct GpuFrameReadback {
    pub flags: Vec<u32>,
    pub unique_clusters: Vec<u32>,
    pub light_grid: Vec<LightGridEntry>,
    /// The written prefix of the index list
    pub light_indices: Vec<u32>,
    pub index_counter: LightIndexCounter,
    pub indirect: IndirectArgs,
}

impl GpuFrameReadback {
    /// Light indices assigned to one cluster.
    pub fn light_indices_for(&self, cluster: u32) -> &[u32] {
        self.light_grid
            .get(cluster as usize)
            .and_then(|entry| self.light_indices.get(entry.range()))
            .unwrap_or(&[])
    }
}

/// GPU clustered light assignment.
pub struct ClusteredLighting {
    settings: ClusterSettings,
    pipelines: ClusterComputePipelines,
    shading_layout: wgpu::BindGroupLayout,
    key: Option<(CameraIntrinsics, u32)>,
    dims: Option<GridDimensions>,
    buffers: Option<ClusterGpuBuffers>,
    snapshot: LightSnapshot,
    last_light_count: u32,
    last_truncation: Option<CapacityWarning>,
}

impl ClusteredLighting {
    /// Create the pipelines from the embedded shaders.
    pub fn new(device: &wgpu::Device, settings: ClusterSettings) -> Result<Self> {
        Self::build(device, settings, None)
    }

    /// Create the pipelines from shaders on disk.
    pub fn with_shader_dir(device: &wgpu::Device, settings: ClusterSettings, dir: &Path) -> Result<Self> {
        Self::build(device, settings, Some(dir))
    }

    fn build(device: &wgpu::Device, settings: ClusterSettings, shader_dir: Option<&Path>) -> Result<Self> {
        settings.validate()?;
        let pipelines = ClusterComputePipelines::new(device, shader_dir)?;

        let entries = shading_layout_entries();
        if validate_shading_bindings(&entries) > 0 {
            log::warn!("Clustered shading bind group layout does not match expectations");
        }
        let shading_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("clustered_shading_bind_group_layout"),
            entries: &entries,
        });

        Ok(Self {
            settings,
            pipelines,
            shading_layout,
            key: None,
            dims: None,
            buffers: None,
            snapshot: LightSnapshot::default(),
            last_light_count: 0,
            last_truncation: None,
        })
    }

    pub fn settings(&self) -> &ClusterSettings {
        &self.settings
    }

    pub fn dims(&self) -> Option<&GridDimensions> {
        self.dims.as_ref()
    }

    pub fn buffers(&self) -> Option<&ClusterGpuBuffers> {
        self.buffers.as_ref()
    }

    /// Redimension, reallocate and rebuild the cluster AABBs if the camera
    /// intrinsics changed. The rebuild is submitted before returning, so the
    /// next frame always sees current bounds. Returns `true` on a rebuild.
    pub fn prepare(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, camera: &ClusterCamera) -> Result<bool> {
        let key = (camera.intrinsics(), self.settings.block_size);
        if self.key == Some(key) {
            return Ok(false);
        }

        let dims = GridDimensions::from_camera(camera, self.settings.block_size)?;
        dims.check_capacity(self.settings.max_clusters)?;

        let binding_limit = (device.limits().max_storage_buffer_binding_size as u64 / 4).min(u32::MAX as u64) as u32;
        let index_capacity = self
            .settings
            .light_index_capacity(dims.cluster_count())
            .min(binding_limit);

        let buffers = ClusterGpuBuffers::new(device, &dims, self.settings.max_lights, index_capacity);
        buffers.write_uniforms(queue, &ClusterUniforms::new(&dims, camera, 0, index_capacity));

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("cluster_aabb_encoder"),
        });
        dispatch::dispatch_build_aabbs(&mut encoder, device, &self.pipelines, &buffers);
        queue.submit(std::iter::once(encoder.finish()));

        log::info!(
            "Cluster grid {}x{}x{} ({} clusters, {} index slots), GPU bounds rebuilt",
            dims.dim_x,
            dims.dim_y,
            dims.dim_z,
            dims.cluster_count(),
            index_capacity
        );

        self.dims = Some(dims);
        self.buffers = Some(buffers);
        self.key = Some(key);
        Ok(true)
    }

    /// Upload the frame's uniforms and lights and encode every per-frame pass.
    ///
    /// `depth` is the depth pre-pass output (`Depth32Float`, bindable as a
    /// texture). Fails with `StaleBounds` if `prepare` was not called for
    /// this camera's intrinsics. Returns the light truncation warning, if any.
    pub fn encode_frame(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        depth: &wgpu::Texture,
        camera: &ClusterCamera,
        lights: &[PointLight],
    ) -> Result<Vec<CapacityWarning>> {
        if self.key != Some((camera.intrinsics(), self.settings.block_size)) {
            return Err(ClusterError::StaleBounds);
        }
        let (Some(dims), Some(buffers)) = (self.dims.as_ref(), self.buffers.as_ref()) else {
            return Err(ClusterError::StaleBounds);
        };
        if (depth.width(), depth.height()) != (camera.width, camera.height) {
            return Err(ClusterError::DepthBufferMismatch {
                expected: (camera.width, camera.height),
                actual: (depth.width(), depth.height()),
            });
        }

        self.snapshot.recapture(lights, self.settings.max_lights);
        let snapshot = &self.snapshot;
        buffers.write_uniforms(
            queue,
            &ClusterUniforms::new(dims, camera, snapshot.len(), buffers.index_capacity),
        );
        buffers.write_lights(queue, &snapshot.lights, &snapshot.colors);

        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor {
            label: Some("cluster_depth_view"),
            aspect: wgpu::TextureAspect::DepthOnly,
            ..Default::default()
        });

        dispatch::clear_active_flags(encoder, buffers);
        dispatch::dispatch_mark_active(
            encoder,
            device,
            &self.pipelines,
            buffers,
            &depth_view,
            (camera.width, camera.height),
        );

        dispatch::clear_unique_counter(encoder, buffers);
        dispatch::dispatch_find_unique(encoder, device, &self.pipelines, buffers);

        dispatch::copy_unique_count(encoder, buffers);
        dispatch::dispatch_update_indirect(encoder, device, &self.pipelines, buffers);

        dispatch::clear_light_assignment(encoder, buffers);
        dispatch::dispatch_assign_lights(encoder, device, &self.pipelines, buffers);

        self.last_light_count = snapshot.len();
        self.last_truncation = snapshot.warning();
        Ok(self.last_truncation.iter().cloned().collect())
    }

    /// Layout of the bind group shading passes read the light lists through.
    pub fn shading_bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.shading_layout
    }

    pub fn create_shading_bind_group(&self, device: &wgpu::Device) -> Result<wgpu::BindGroup> {
        let buffers = self.buffers.as_ref().ok_or(ClusterError::StaleBounds)?;
        Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("clustered_shading_bind_group"),
            layout: &self.shading_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffers.uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: buffers.light_grid.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: buffers.light_indices.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: buffers.lights.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: buffers.light_colors.as_entire_binding(),
                },
            ],
        }))
    }

    /// Read the cluster AABBs back (blocking).
    pub fn read_aabbs(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<ClusterAabb>> {
        let buffers = self.buffers.as_ref().ok_or(ClusterError::StaleBounds)?;
        read_buffer(device, queue, &buffers.aabbs, buffers.cluster_count as usize)
    }

    /// Read back everything the last submitted frame wrote (blocking).
    pub fn read_frame(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<GpuFrameReadback> {
        let buffers = self.buffers.as_ref().ok_or(ClusterError::StaleBounds)?;
        let clusters = buffers.cluster_count as usize;

        let unique_count = first(read_buffer::<u32>(device, queue, &buffers.unique_count, 1)?)?;
        let index_counter = first(read_buffer::<LightIndexCounter>(
            device,
            queue,
            &buffers.light_index_counter,
            1,
        )?)?;
        let dispatch = first(read_buffer::<DispatchIndirectArgs>(device, queue, &buffers.dispatch_args, 1)?)?;
        let draw = first(read_buffer::<DrawIndirectArgs>(device, queue, &buffers.draw_args, 1)?)?;
        let written = index_counter.next.min(buffers.index_capacity) as usize;

        Ok(GpuFrameReadback {
            flags: read_buffer(device, queue, &buffers.flags, clusters)?,
            unique_clusters: read_buffer(device, queue, &buffers.unique_clusters, unique_count as usize)?,
            light_grid: read_buffer(device, queue, &buffers.light_grid, clusters)?,
            light_indices: read_buffer(device, queue, &buffers.light_indices, written)?,
            index_counter,
            indirect: IndirectArgs { dispatch, draw },
        })
    }

    /// Summarize the last submitted frame (blocking readback).
    pub fn read_frame_stats(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<ClusterFrameReport> {
        let buffers = self.buffers.as_ref().ok_or(ClusterError::StaleBounds)?;
        let frame = self.read_frame(device, queue)?;
        Ok(frame_report(
            &frame,
            buffers.index_capacity,
            self.last_light_count,
            self.last_truncation.clone(),
        ))
    }
}

fn first<T: Copy>(values: Vec<T>) -> Result<T> {
    values
        .first()
        .copied()
        .ok_or_else(|| ClusterError::Readback("empty readback".to_string()))
}

fn frame_report(
    frame: &GpuFrameReadback,
    index_capacity: u32,
    light_count: u32,
    truncation: Option<CapacityWarning>,
) -> ClusterFrameReport {
    let mut warnings: Vec<CapacityWarning> = truncation.into_iter().collect();
    if frame.index_counter.overflow > 0 {
        let warning = CapacityWarning::LightIndexOverflow {
            dropped: frame.index_counter.overflow,
            capacity: index_capacity,
        };
        log::warn!("{}", warning);
        warnings.push(warning);
    }

    ClusterFrameReport {
        active_clusters: frame.unique_clusters.len() as u32,
        light_count,
        light_assignments: frame.light_indices.len() as u32,
        max_lights_per_cluster: frame.light_grid.iter().map(|e| e.count).max().unwrap_or(0),
        warnings,
    }
}
