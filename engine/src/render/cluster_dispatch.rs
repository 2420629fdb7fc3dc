//! Cluster Compute Dispatchers
//!
//! Records the cluster passes into a command encoder. Each pass is its own
//! compute pass, so every storage write of one pass is visible to the next.
//!
//! Frame order:
//! 1. `clear_active_flags` + `dispatch_mark_active`
//! 2. `clear_unique_counter` + `dispatch_find_unique`
//! 3. `copy_unique_count` + `dispatch_update_indirect`
//! 4. `clear_light_assignment` + `dispatch_assign_lights`
//!
//! `dispatch_build_aabbs` runs only when the grid changes.

use super::cluster_buffers::{ClusterGpuBuffers, LIGHT_INDEX_COUNTER_SIZE};
use super::cluster_config::{AABB_WORKGROUP_SIZE, FLAGS_WORKGROUP_TILE, UNIQUE_WORKGROUP_SIZE};
use super::compute_pipelines::{ClusterComputePass, ClusterComputePipelines};

/// ceil(items / workgroup_size)
#[inline]
pub fn workgroup_count(items: u32, workgroup_size: u32) -> u32 {
    items.div_ceil(workgroup_size)
}

fn bind_group(
    device: &wgpu::Device,
    label: &str,
    pass: &ClusterComputePass,
    resources: &[wgpu::BindingResource<'_>],
) -> wgpu::BindGroup {
    let entries: Vec<wgpu::BindGroupEntry<'_>> = resources
        .iter()
        .enumerate()
        .map(|(binding, resource)| wgpu::BindGroupEntry {
            binding: binding as u32,
            resource: resource.clone(),
        })
        .collect();
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout: &pass.bind_group_layout,
        entries: &entries,
    })
}

fn run_pass(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    pass: &ClusterComputePass,
    bind_group: &wgpu::BindGroup,
    workgroups: (u32, u32, u32),
) {
    let mut compute = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some(label),
        timestamp_writes: None,
    });
    compute.set_pipeline(&pass.pipeline);
    compute.set_bind_group(0, bind_group, &[]);
    compute.dispatch_workgroups(workgroups.0, workgroups.1, workgroups.2);
}

/// Build one view-space AABB per cluster.
pub fn dispatch_build_aabbs(
    encoder: &mut wgpu::CommandEncoder,
    device: &wgpu::Device,
    pipelines: &ClusterComputePipelines,
    buffers: &ClusterGpuBuffers,
) {
    let pass = &pipelines.build_aabbs;
    let bind_group = bind_group(
        device,
        "cluster_aabb_bind_group",
        pass,
        &[buffers.uniforms.as_entire_binding(), buffers.aabbs.as_entire_binding()],
    );
    let groups = workgroup_count(buffers.cluster_count, AABB_WORKGROUP_SIZE);
    run_pass(encoder, "cluster_aabb_pass", pass, &bind_group, (groups, 1, 1));
}

/// Zero every cluster flag.
pub fn clear_active_flags(encoder: &mut wgpu::CommandEncoder, buffers: &ClusterGpuBuffers) {
    encoder.clear_buffer(&buffers.flags, 0, None);
}

/// Flag every cluster touched by a non-background depth sample.
pub fn dispatch_mark_active(
    encoder: &mut wgpu::CommandEncoder,
    device: &wgpu::Device,
    pipelines: &ClusterComputePipelines,
    buffers: &ClusterGpuBuffers,
    depth_view: &wgpu::TextureView,
    (width, height): (u32, u32),
) {
    let pass = &pipelines.mark_active;
    let bind_group = bind_group(
        device,
        "cluster_flags_bind_group",
        pass,
        &[
            buffers.uniforms.as_entire_binding(),
            wgpu::BindingResource::TextureView(depth_view),
            buffers.flags.as_entire_binding(),
        ],
    );
    let groups = (
        workgroup_count(width, FLAGS_WORKGROUP_TILE),
        workgroup_count(height, FLAGS_WORKGROUP_TILE),
        1,
    );
    run_pass(encoder, "cluster_flags_pass", pass, &bind_group, groups);
}

/// Reset the unique-cluster append cursor.
pub fn clear_unique_counter(encoder: &mut wgpu::CommandEncoder, buffers: &ClusterGpuBuffers) {
    encoder.clear_buffer(&buffers.unique_counter, 0, None);
}

/// Append the index of every flagged cluster to the unique list.
pub fn dispatch_find_unique(
    encoder: &mut wgpu::CommandEncoder,
    device: &wgpu::Device,
    pipelines: &ClusterComputePipelines,
    buffers: &ClusterGpuBuffers,
) {
    let pass = &pipelines.find_unique;
    let bind_group = bind_group(
        device,
        "cluster_unique_bind_group",
        pass,
        &[
            buffers.uniforms.as_entire_binding(),
            buffers.flags.as_entire_binding(),
            buffers.unique_counter.as_entire_binding(),
            buffers.unique_clusters.as_entire_binding(),
        ],
    );
    let groups = workgroup_count(buffers.cluster_count, UNIQUE_WORKGROUP_SIZE);
    run_pass(encoder, "cluster_unique_pass", pass, &bind_group, (groups, 1, 1));
}

/// Copy the final append cursor into the count buffer the later passes read.
pub fn copy_unique_count(encoder: &mut wgpu::CommandEncoder, buffers: &ClusterGpuBuffers) {
    encoder.copy_buffer_to_buffer(&buffers.unique_counter, 0, &buffers.unique_count, 0, 4);
}

/// Write the assignment dispatch args and debug draw args from the count.
pub fn dispatch_update_indirect(
    encoder: &mut wgpu::CommandEncoder,
    device: &wgpu::Device,
    pipelines: &ClusterComputePipelines,
    buffers: &ClusterGpuBuffers,
) {
    let pass = &pipelines.update_indirect;
    let bind_group = bind_group(
        device,
        "cluster_indirect_bind_group",
        pass,
        &[
            buffers.uniforms.as_entire_binding(),
            buffers.unique_count.as_entire_binding(),
            buffers.dispatch_args.as_entire_binding(),
            buffers.draw_args.as_entire_binding(),
        ],
    );
    run_pass(encoder, "cluster_indirect_pass", pass, &bind_group, (1, 1, 1));
}

/// Reset the light grid and the index list cursor.
pub fn clear_light_assignment(encoder: &mut wgpu::CommandEncoder, buffers: &ClusterGpuBuffers) {
    encoder.clear_buffer(&buffers.light_grid, 0, None);
    encoder.clear_buffer(&buffers.light_index_counter, 0, Some(LIGHT_INDEX_COUNTER_SIZE));
}

/// Assign lights to every active cluster, one invocation per unique cluster.
pub fn dispatch_assign_lights(
    encoder: &mut wgpu::CommandEncoder,
    device: &wgpu::Device,
    pipelines: &ClusterComputePipelines,
    buffers: &ClusterGpuBuffers,
) {
    let pass = &pipelines.assign_lights;
    let bind_group = bind_group(
        device,
        "cluster_assign_bind_group",
        pass,
        &[
            buffers.uniforms.as_entire_binding(),
            buffers.unique_count.as_entire_binding(),
            buffers.unique_clusters.as_entire_binding(),
            buffers.aabbs.as_entire_binding(),
            buffers.lights.as_entire_binding(),
            buffers.light_grid.as_entire_binding(),
            buffers.light_index_counter.as_entire_binding(),
            buffers.light_indices.as_entire_binding(),
        ],
    );

    let mut compute = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some("cluster_assign_pass"),
        timestamp_writes: None,
    });
    compute.set_pipeline(&pass.pipeline);
    compute.set_bind_group(0, &bind_group, &[]);
    compute.dispatch_workgroups_indirect(&buffers.dispatch_args, 0);
}
