//! Compute Pipeline Infrastructure
//!
//! Creates the five cluster compute pipelines and their bind group layouts:
//! - AABB build: cluster bounds, on grid changes only
//! - Active-cluster scan: marks clusters touched by the depth buffer
//! - Unique compaction: appends flagged cluster indices
//! - Indirect update: derives dispatch and draw args from the unique count
//! - Light assignment: per active cluster, dispatched indirectly
//!
//! Every layout starts with the `ClusterUniforms` block at binding 0, the
//! binding cluster_common.wgsl declares.

use std::path::Path;

use super::binding_validator::validate_compute_bindings;
use super::cluster_buffers::CLUSTER_UNIFORMS_SIZE;
use super::shader_loader::ClusterShader;
use crate::error::Result;

pub(crate) fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(CLUSTER_UNIFORMS_SIZE),
        },
        count: None,
    }
}

pub(crate) fn storage_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    read_only: bool,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn depth_texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Depth,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

const COMPUTE: wgpu::ShaderStages = wgpu::ShaderStages::COMPUTE;

// @group(0) @binding(0): uniform ClusterUniforms
// @group(0) @binding(1): storage<read_write> cluster_aabbs
pub fn aabb_layout_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    vec![uniform_entry(0, COMPUTE), storage_entry(1, COMPUTE, false)]
}

// @group(0) @binding(0): uniform ClusterUniforms
// @group(0) @binding(1): texture_depth_2d
// @group(0) @binding(2): storage<read_write> cluster_flags (atomic)
pub fn flags_layout_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    vec![
        uniform_entry(0, COMPUTE),
        depth_texture_entry(1),
        storage_entry(2, COMPUTE, false),
    ]
}

// @group(0) @binding(0): uniform ClusterUniforms
// @group(0) @binding(1): storage<read> cluster_flags
// @group(0) @binding(2): storage<read_write> unique_counter (atomic)
// @group(0) @binding(3): storage<read_write> unique_clusters
pub fn unique_layout_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    vec![
        uniform_entry(0, COMPUTE),
        storage_entry(1, COMPUTE, true),
        storage_entry(2, COMPUTE, false),
        storage_entry(3, COMPUTE, false),
    ]
}

// @group(0) @binding(0): uniform ClusterUniforms
// @group(0) @binding(1): storage<read> unique_count
// @group(0) @binding(2): storage<read_write> dispatch_args
// @group(0) @binding(3): storage<read_write> draw_args
pub fn indirect_layout_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    vec![
        uniform_entry(0, COMPUTE),
        storage_entry(1, COMPUTE, true),
        storage_entry(2, COMPUTE, false),
        storage_entry(3, COMPUTE, false),
    ]
}

// @group(0) @binding(0): uniform ClusterUniforms
// @group(0) @binding(1): storage<read> unique_count
// @group(0) @binding(2): storage<read> unique_clusters
// @group(0) @binding(3): storage<read> cluster_aabbs
// @group(0) @binding(4): storage<read> lights
// @group(0) @binding(5): storage<read_write> light_grid
// @group(0) @binding(6): storage<read_write> index_counter (atomic)
// @group(0) @binding(7): storage<read_write> light_indices
pub fn assign_layout_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    vec![
        uniform_entry(0, COMPUTE),
        storage_entry(1, COMPUTE, true),
        storage_entry(2, COMPUTE, true),
        storage_entry(3, COMPUTE, true),
        storage_entry(4, COMPUTE, true),
        storage_entry(5, COMPUTE, false),
        storage_entry(6, COMPUTE, false),
        storage_entry(7, COMPUTE, false),
    ]
}

/// A compute pipeline with the bind group layout it was built against.
pub struct ClusterComputePass {
    pub pipeline: wgpu::ComputePipeline,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl ClusterComputePass {
    fn new(
        device: &wgpu::Device,
        shader: ClusterShader,
        entries: &[wgpu::BindGroupLayoutEntry],
        shader_dir: Option<&Path>,
    ) -> Result<Self> {
        let label = shader.label();
        let module = shader.create_module(device, shader_dir)?;

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{}_bind_group_layout", label)),
            entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{}_pipeline_layout", label)),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(&format!("{}_pipeline", label)),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some(shader.entry_points()[0]),
            compilation_options: Default::default(),
            cache: None,
        });

        Ok(Self {
            pipeline,
            bind_group_layout,
        })
    }
}

/// Holds all cluster compute pipelines.
pub struct ClusterComputePipelines {
    pub build_aabbs: ClusterComputePass,
    pub mark_active: ClusterComputePass,
    pub find_unique: ClusterComputePass,
    pub update_indirect: ClusterComputePass,
    pub assign_lights: ClusterComputePass,
}

impl ClusterComputePipelines {
    /// Create all pipelines from the embedded shaders, or from `shader_dir`
    /// when given.
    pub fn new(device: &wgpu::Device, shader_dir: Option<&Path>) -> Result<Self> {
        let aabb_entries = aabb_layout_entries();
        let flags_entries = flags_layout_entries();
        let unique_entries = unique_layout_entries();
        let indirect_entries = indirect_layout_entries();
        let assign_entries = assign_layout_entries();

        let mismatches = validate_compute_bindings(
            &aabb_entries,
            &flags_entries,
            &unique_entries,
            &indirect_entries,
            &assign_entries,
        );
        if mismatches > 0 {
            log::warn!("{} cluster compute binding mismatch(es) detected", mismatches);
        }

        let pipelines = Self {
            build_aabbs: ClusterComputePass::new(device, ClusterShader::Aabb, &aabb_entries, shader_dir)?,
            mark_active: ClusterComputePass::new(device, ClusterShader::Flags, &flags_entries, shader_dir)?,
            find_unique: ClusterComputePass::new(device, ClusterShader::Unique, &unique_entries, shader_dir)?,
            update_indirect: ClusterComputePass::new(
                device,
                ClusterShader::Indirect,
                &indirect_entries,
                shader_dir,
            )?,
            assign_lights: ClusterComputePass::new(device, ClusterShader::Assign, &assign_entries, shader_dir)?,
        };
        log::info!("Cluster compute pipelines created");
        Ok(pipelines)
    }
}
