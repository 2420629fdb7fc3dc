//! Shader Binding Validator
//!
//! Validates that the cluster bind group layouts match their expected shader
//! bindings at startup. Catches mismatches between Rust-side layouts and WGSL
//! declarations before they cause GPU validation errors at dispatch time.
//!
//! The expected bindings are defined here as the canonical source of truth,
//! matching the WGSL shader declarations. The actual bind group layout entries
//! used during pipeline creation are passed in for comparison.

use std::fmt;

/// Describes a single expected binding in a bind group layout.
#[derive(Debug, Clone)]
struct ExpectedBinding {
    binding: u32,
    binding_type: ExpectedBindingType,
    label: &'static str,
}

/// The type of a binding, matching wgpu::BindingType variants we use.
#[derive(Debug, Clone, PartialEq)]
enum ExpectedBindingType {
    UniformBuffer,
    StorageBufferReadOnly,
    StorageBufferReadWrite,
    DepthTexture2d,
    Other,
}

impl fmt::Display for ExpectedBindingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UniformBuffer => write!(f, "uniform buffer"),
            Self::StorageBufferReadOnly => write!(f, "storage buffer (read-only)"),
            Self::StorageBufferReadWrite => write!(f, "storage buffer (read-write)"),
            Self::DepthTexture2d => write!(f, "depth texture 2d"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Describes the expected layout for one bind group of a pipeline.
struct ExpectedBindGroup {
    pipeline_name: &'static str,
    group_index: u32,
    bindings: Vec<ExpectedBinding>,
}

fn binding(binding: u32, binding_type: ExpectedBindingType, label: &'static str) -> ExpectedBinding {
    ExpectedBinding {
        binding,
        binding_type,
        label,
    }
}

/// Classifies a wgpu::BindGroupLayoutEntry into our ExpectedBindingType.
fn classify_entry(entry: &wgpu::BindGroupLayoutEntry) -> ExpectedBindingType {
    match &entry.ty {
        wgpu::BindingType::Buffer { ty, .. } => match ty {
            wgpu::BufferBindingType::Uniform => ExpectedBindingType::UniformBuffer,
            wgpu::BufferBindingType::Storage { read_only: true } => ExpectedBindingType::StorageBufferReadOnly,
            wgpu::BufferBindingType::Storage { read_only: false } => ExpectedBindingType::StorageBufferReadWrite,
        },
        wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Depth,
            view_dimension: wgpu::TextureViewDimension::D2,
            ..
        } => ExpectedBindingType::DepthTexture2d,
        _ => ExpectedBindingType::Other,
    }
}

/// Validates actual bind group layout entries against expected bindings.
/// Returns the number of mismatches found.
fn validate_bind_group(expected: &ExpectedBindGroup, actual_entries: &[wgpu::BindGroupLayoutEntry]) -> u32 {
    let mut mismatches = 0u32;

    for exp in &expected.bindings {
        match actual_entries.iter().find(|e| e.binding == exp.binding) {
            None => {
                log::warn!(
                    "Binding mismatch in '{}' group {} binding {}: expected {} ({}), actual: MISSING",
                    expected.pipeline_name,
                    expected.group_index,
                    exp.binding,
                    exp.binding_type,
                    exp.label
                );
                mismatches += 1;
            }
            Some(actual) => {
                let actual_type = classify_entry(actual);
                if actual_type != exp.binding_type {
                    log::warn!(
                        "Binding mismatch in '{}' group {} binding {}: expected {} ({}), actual: {}",
                        expected.pipeline_name,
                        expected.group_index,
                        exp.binding,
                        exp.binding_type,
                        exp.label,
                        actual_type
                    );
                    mismatches += 1;
                }
            }
        }
    }

    for actual in actual_entries {
        if !expected.bindings.iter().any(|e| e.binding == actual.binding) {
            log::warn!(
                "Extra binding in '{}' group {} binding {}: type {} not in shader expectations",
                expected.pipeline_name,
                expected.group_index,
                actual.binding,
                classify_entry(actual)
            );
            mismatches += 1;
        }
    }

    mismatches
}

/// Validate all cluster compute pipeline bind groups.
///
/// Called from `ClusterComputePipelines::new()` with the same entry slices
/// used for layout creation.
pub fn validate_compute_bindings(
    aabb_entries: &[wgpu::BindGroupLayoutEntry],
    flags_entries: &[wgpu::BindGroupLayoutEntry],
    unique_entries: &[wgpu::BindGroupLayoutEntry],
    indirect_entries: &[wgpu::BindGroupLayoutEntry],
    assign_entries: &[wgpu::BindGroupLayoutEntry],
) -> u32 {
    use ExpectedBindingType::*;

    let mut total = 0u32;

    let aabb = ExpectedBindGroup {
        pipeline_name: "Cluster AABB",
        group_index: 0,
        bindings: vec![
            binding(0, UniformBuffer, "ClusterUniforms"),
            binding(1, StorageBufferReadWrite, "cluster_aabbs"),
        ],
    };
    total += validate_bind_group(&aabb, aabb_entries);

    let flags = ExpectedBindGroup {
        pipeline_name: "Cluster Flags",
        group_index: 0,
        bindings: vec![
            binding(0, UniformBuffer, "ClusterUniforms"),
            binding(1, DepthTexture2d, "depth_texture"),
            binding(2, StorageBufferReadWrite, "cluster_flags"),
        ],
    };
    total += validate_bind_group(&flags, flags_entries);

    let unique = ExpectedBindGroup {
        pipeline_name: "Unique Clusters",
        group_index: 0,
        bindings: vec![
            binding(0, UniformBuffer, "ClusterUniforms"),
            binding(1, StorageBufferReadOnly, "cluster_flags"),
            binding(2, StorageBufferReadWrite, "unique_counter"),
            binding(3, StorageBufferReadWrite, "unique_clusters"),
        ],
    };
    total += validate_bind_group(&unique, unique_entries);

    let indirect = ExpectedBindGroup {
        pipeline_name: "Indirect Args",
        group_index: 0,
        bindings: vec![
            binding(0, UniformBuffer, "ClusterUniforms"),
            binding(1, StorageBufferReadOnly, "unique_count"),
            binding(2, StorageBufferReadWrite, "dispatch_args"),
            binding(3, StorageBufferReadWrite, "draw_args"),
        ],
    };
    total += validate_bind_group(&indirect, indirect_entries);

    let assign = ExpectedBindGroup {
        pipeline_name: "Light Assign",
        group_index: 0,
        bindings: vec![
            binding(0, UniformBuffer, "ClusterUniforms"),
            binding(1, StorageBufferReadOnly, "unique_count"),
            binding(2, StorageBufferReadOnly, "unique_clusters"),
            binding(3, StorageBufferReadOnly, "cluster_aabbs"),
            binding(4, StorageBufferReadOnly, "lights"),
            binding(5, StorageBufferReadWrite, "light_grid"),
            binding(6, StorageBufferReadWrite, "index_counter"),
            binding(7, StorageBufferReadWrite, "light_indices"),
        ],
    };
    total += validate_bind_group(&assign, assign_entries);

    total
}

/// Validate the read-only bind group handed to shading passes.
pub fn validate_shading_bindings(entries: &[wgpu::BindGroupLayoutEntry]) -> u32 {
    use ExpectedBindingType::*;

    let shading = ExpectedBindGroup {
        pipeline_name: "Clustered Shading",
        group_index: 0,
        bindings: vec![
            binding(0, UniformBuffer, "ClusterUniforms"),
            binding(1, StorageBufferReadOnly, "light_grid"),
            binding(2, StorageBufferReadOnly, "light_indices"),
            binding(3, StorageBufferReadOnly, "lights"),
            binding(4, StorageBufferReadOnly, "light_colors"),
        ],
    };
    validate_bind_group(&shading, entries)
}

/// Validate the cluster debug render bind group.
pub fn validate_debug_bindings(entries: &[wgpu::BindGroupLayoutEntry]) -> u32 {
    use ExpectedBindingType::*;

    let debug = ExpectedBindGroup {
        pipeline_name: "Cluster Debug",
        group_index: 0,
        bindings: vec![
            binding(0, UniformBuffer, "ClusterUniforms"),
            binding(1, StorageBufferReadOnly, "cluster_aabbs"),
            binding(2, StorageBufferReadOnly, "light_grid"),
            binding(3, StorageBufferReadOnly, "unique_clusters"),
        ],
    };
    validate_bind_group(&debug, entries)
}
