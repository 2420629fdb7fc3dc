//! Cluster Debug Visualization
//!
//! Two views of the cluster grid:
//! - `ClusterDebugRenderer` draws one point per cluster at its AABB centre,
//!   either every cluster (direct draw) or only the active ones (indirect
//!   draw from the args the indirect-update kernel writes).
//! - `light_count_heatmap` colours each screen pixel by the light count of
//!   the cluster it falls into, on the CPU.
//!
//! Both share the same colour ramp (`heat_color` here, in cluster_debug.wgsl
//! on the GPU).

use std::path::Path;

use glam::Mat4;
use serde::{Deserialize, Serialize};

use super::binding_validator::validate_debug_bindings;
use super::cluster_buffers::{ClusterGpuBuffers, LightGridEntry};
use super::cluster_dims::GridDimensions;
use super::compute_pipelines::{storage_entry, uniform_entry};
use super::depth_buffer::DepthBuffer;
use super::shader_loader::ClusterShader;
use crate::error::Result;

/// Which clusters the debug overlay draws.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugClusterMode {
    #[default]
    Off,
    /// Every cluster of the grid
    AllClusters,
    /// Only clusters in the compacted unique list
    ActiveClusters,
}

/// Colour ramp from blue (0) through green and yellow to red (1).
pub fn heat_color(t: f32) -> [u8; 4] {
    let x = t.clamp(0.0, 1.0) * 4.0;
    let channel = |center: f32| ((1.5 - (x - center).abs()).clamp(0.0, 1.0) * 255.0).round() as u8;
    [channel(3.0), channel(2.0), channel(1.0), 255]
}

const BACKGROUND: image::Rgba<u8> = image::Rgba([0, 0, 0, 255]);
const UNLIT: image::Rgba<u8> = image::Rgba([32, 32, 32, 255]);

/// Per-pixel light count of the cluster each pixel falls into.
///
/// `max_display` lights (or more) map to the hot end of the ramp. Background
/// pixels stay black; geometry in clusters with no lights is dark grey.
pub fn light_count_heatmap(
    depth: &DepthBuffer,
    dims: &GridDimensions,
    inverse_projection: &Mat4,
    light_grid: &[LightGridEntry],
    max_display: u32,
) -> image::RgbaImage {
    let scale = 1.0 / max_display.max(1) as f32;
    image::RgbaImage::from_fn(depth.width(), depth.height(), |px, py| {
        let Some(view_depth) = depth.view_depth_at(inverse_projection, px, py) else {
            return BACKGROUND;
        };
        let cluster = dims.cluster_index_for(px as f32 + 0.5, py as f32 + 0.5, view_depth);
        match light_grid.get(cluster as usize).map(|e| e.count) {
            Some(count) if count > 0 => image::Rgba(heat_color(count as f32 * scale)),
            _ => UNLIT,
        }
    })
}

// @group(0) @binding(0): uniform ClusterUniforms
// @group(0) @binding(1): storage<read> cluster_aabbs
// @group(0) @binding(2): storage<read> light_grid
// @group(0) @binding(3): storage<read> unique_clusters
pub fn debug_layout_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    let vertex = wgpu::ShaderStages::VERTEX;
    vec![
        uniform_entry(0, vertex),
        storage_entry(1, vertex, true),
        storage_entry(2, vertex, true),
        storage_entry(3, vertex, true),
    ]
}

/// Point-list overlay of cluster centres, coloured by light count.
pub struct ClusterDebugRenderer {
    pub bind_group_layout: wgpu::BindGroupLayout,
    all_clusters_pipeline: wgpu::RenderPipeline,
    active_clusters_pipeline: wgpu::RenderPipeline,
}

impl ClusterDebugRenderer {
    /// Build the overlay pipelines from the embedded debug shader, or from
    /// `shader_dir` when given (the same directory passed to
    /// `ClusteredLighting::with_shader_dir`).
    pub fn new(
        device: &wgpu::Device,
        color_format: wgpu::TextureFormat,
        shader_dir: Option<&Path>,
    ) -> Result<Self> {
        let entries = debug_layout_entries();
        if validate_debug_bindings(&entries) > 0 {
            log::warn!("Cluster debug bind group layout does not match cluster_debug.wgsl");
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("cluster_debug_bind_group_layout"),
            entries: &entries,
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("cluster_debug_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let module = ClusterShader::Debug.create_module(device, shader_dir)?;

        let make_pipeline = |label: &str, vertex_entry: &str| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some(vertex_entry),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: color_format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::PointList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        Ok(Self {
            all_clusters_pipeline: make_pipeline("cluster_debug_all_pipeline", "vs_all_clusters"),
            active_clusters_pipeline: make_pipeline("cluster_debug_active_pipeline", "vs_active_clusters"),
            bind_group_layout,
        })
    }

    pub fn create_bind_group(&self, device: &wgpu::Device, buffers: &ClusterGpuBuffers) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("cluster_debug_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffers.uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: buffers.aabbs.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: buffers.light_grid.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: buffers.unique_clusters.as_entire_binding(),
                },
            ],
        })
    }

    /// Record the overlay into an open render pass.
    pub fn draw(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        bind_group: &wgpu::BindGroup,
        buffers: &ClusterGpuBuffers,
        mode: DebugClusterMode,
    ) {
        match mode {
            DebugClusterMode::Off => {}
            DebugClusterMode::AllClusters => {
                pass.set_pipeline(&self.all_clusters_pipeline);
                pass.set_bind_group(0, bind_group, &[]);
                pass.draw(0..buffers.cluster_count, 0..1);
            }
            DebugClusterMode::ActiveClusters => {
                pass.set_pipeline(&self.active_clusters_pipeline);
                pass.set_bind_group(0, bind_group, &[]);
                pass.draw_indirect(&buffers.draw_args, 0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::ClusterCamera;

    #[test]
    fn test_mode_serde_names() {
        let json = serde_json::to_string(&DebugClusterMode::ActiveClusters).unwrap();
        assert_eq!(json, "\"active_clusters\"");
        let mode: DebugClusterMode = serde_json::from_str("\"all_clusters\"").unwrap();
        assert_eq!(mode, DebugClusterMode::AllClusters);
        assert_eq!(DebugClusterMode::default(), DebugClusterMode::Off);
    }

    #[test]
    fn test_heat_color_ramp() {
        assert_eq!(heat_color(0.0), [0, 0, 128, 255]);
        assert_eq!(heat_color(1.0), [128, 0, 0, 255]);
        let mid = heat_color(0.5);
        assert_eq!(mid[1], 255);
        // Out of range clamps
        assert_eq!(heat_color(7.0), heat_color(1.0));
    }

    #[test]
    fn test_debug_layout_matches_shader() {
        assert_eq!(validate_debug_bindings(&debug_layout_entries()), 0);
    }

    #[test]
    fn test_heatmap_background_and_counts() {
        let camera = ClusterCamera::default().with_resolution(64, 64);
        let dims = GridDimensions::from_camera(&camera, 32).unwrap();
        let inv = camera.inverse_projection();

        let mut depth = DepthBuffer::new(64, 64);
        depth.fill_rect_view_depth(&camera, (0, 0), (32, 32), 10.0);

        let mut grid = vec![LightGridEntry::default(); dims.cluster_count() as usize];
        let lit = dims.cluster_index_for(0.5, 0.5, 10.0);
        grid[lit as usize] = LightGridEntry::new(0, 4);

        let image = light_count_heatmap(&depth, &dims, &inv, &grid, 4);
        assert_eq!(image.dimensions(), (64, 64));
        assert_eq!(*image.get_pixel(63, 63), BACKGROUND);
        assert_eq!(image.get_pixel(0, 0).0, heat_color(1.0));
    }
}
