//! Clustered Lighting Demo
//!
//! Run with: `cargo run --bin cluster-demo -- [settings.json] [--lights N] [--out heatmap.png] [--shader-dir DIR] [--cpu-only]`
//!
//! Builds a synthetic scene (a back wall, a box in front of it and a grid of
//! point lights), runs the CPU cluster pipeline and writes a light-count heat
//! map. When a GPU adapter is available the same frame runs through the
//! compute passes and the two results are compared.
//!
//! Set `RUST_LOG=debug` for per-frame statistics.

use std::path::{Path, PathBuf};

use glam::Vec3;

use cluster_forward_engine::camera::ClusterCamera;
use cluster_forward_engine::render::{
    ClusterDebugRenderer, ClusterFrameReport, ClusterSettings, ClusteredLighting, CpuClusterPipeline,
    DebugClusterMode, DepthBuffer, GpuContext, GpuContextConfig, PointLight, light_count_heatmap,
};
use cluster_forward_engine::{ClusterError, Result};

/// View depth of the back wall.
const WALL_DEPTH: f32 = 40.0;
/// View depth of the box in front of the wall.
const BOX_DEPTH: f32 = 12.0;
/// Light count mapped to the hot end of the heat map.
const HEATMAP_MAX_LIGHTS: u32 = 16;

struct DemoArgs {
    settings: Option<PathBuf>,
    lights: usize,
    out: PathBuf,
    shader_dir: Option<PathBuf>,
    cpu_only: bool,
}

fn parse_args() -> Result<DemoArgs> {
    let mut args = DemoArgs {
        settings: None,
        lights: 256,
        out: PathBuf::from("cluster_heatmap.png"),
        shader_dir: None,
        cpu_only: false,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--lights" => {
                let value = iter.next().unwrap_or_default();
                args.lights = value
                    .parse()
                    .map_err(|_| ClusterError::InvalidSettings(format!("--lights expects a number, got '{}'", value)))?;
            }
            "--out" => {
                let value = iter
                    .next()
                    .ok_or_else(|| ClusterError::InvalidSettings("--out expects a path".to_string()))?;
                args.out = PathBuf::from(value);
            }
            "--shader-dir" => {
                let value = iter
                    .next()
                    .ok_or_else(|| ClusterError::InvalidSettings("--shader-dir expects a path".to_string()))?;
                args.shader_dir = Some(PathBuf::from(value));
            }
            "--cpu-only" => args.cpu_only = true,
            other if other.starts_with("--") => {
                return Err(ClusterError::InvalidSettings(format!("unknown option '{}'", other)));
            }
            path => args.settings = Some(PathBuf::from(path)),
        }
    }
    Ok(args)
}

/// Camera at (0, 0, -20) looking toward +Z, so world z = view depth - 20.
fn demo_camera() -> ClusterCamera {
    ClusterCamera::default()
}

fn world_z(view_depth: f32) -> f32 {
    view_depth - 20.0
}

/// Lights on a jittered grid spanning the space between the camera and the wall.
fn demo_lights(count: usize) -> Vec<PointLight> {
    let side = (count as f32).cbrt().ceil().max(1.0) as usize;
    (0..count)
        .map(|i| {
            let (x, y, z) = (i % side, (i / side) % side, i / (side * side));
            let t = |n: usize| (n as f32 + 0.5) / side as f32;
            let position = Vec3::new(
                (t(x) - 0.5) * 40.0,
                (t(y) - 0.5) * 22.0,
                world_z(2.0 + t(z) * (WALL_DEPTH - 2.0)),
            );
            let hue = i as f32 / count as f32;
            PointLight::at(position.to_array(), 3.0).with_color([hue, 1.0 - hue, 0.5])
        })
        .collect()
}

fn demo_depth(camera: &ClusterCamera) -> DepthBuffer {
    let mut depth = DepthBuffer::new(camera.width, camera.height);
    depth.fill_view_depth(camera, WALL_DEPTH);
    let (w, h) = (camera.width, camera.height);
    depth.fill_rect_view_depth(camera, (w / 8, h / 2), (w / 2, h - h / 8), BOX_DEPTH);
    depth
}

fn log_report(label: &str, report: &ClusterFrameReport) {
    log::info!(
        "{}: {} active clusters, {} lights, {} assignments, max {} lights in one cluster",
        label,
        report.active_clusters,
        report.light_count,
        report.light_assignments,
        report.max_lights_per_cluster
    );
    for warning in &report.warnings {
        log::warn!("{}: {}", label, warning);
    }
}

/// Run a wall-only frame on both paths and compare the results. The GPU wall
/// comes from clearing the depth attachment to the wall's NDC depth.
fn gpu_parity_check(
    settings: &ClusterSettings,
    shader_dir: Option<&Path>,
    camera: &ClusterCamera,
    lights: &[PointLight],
) -> Result<()> {
    let ctx = GpuContext::new_headless(GpuContextConfig::default())?;

    let mut wall = DepthBuffer::new(camera.width, camera.height);
    wall.fill_view_depth(camera, WALL_DEPTH);
    let mut cpu = CpuClusterPipeline::new(settings.clone())?;
    let cpu_report = cpu.run_frame(camera, &wall, lights)?;

    let mut gpu = match shader_dir {
        Some(dir) => ClusteredLighting::with_shader_dir(&ctx.device, settings.clone(), dir)?,
        None => ClusteredLighting::new(&ctx.device, settings.clone())?,
    };
    gpu.prepare(&ctx.device, &ctx.queue, camera)?;

    let (depth_texture, depth_view) = ctx.create_depth_texture(camera.width, camera.height);
    let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("cluster_demo_encoder"),
    });
    ctx.encode_depth_clear(&mut encoder, &depth_view, camera.ndc_depth_for_view_depth(WALL_DEPTH));
    gpu.encode_frame(&ctx.device, &ctx.queue, &mut encoder, &depth_texture, camera, lights)?;
    ctx.queue.submit(std::iter::once(encoder.finish()));

    let gpu_report = gpu.read_frame_stats(&ctx.device, &ctx.queue)?;
    log_report("CPU (wall)", &cpu_report);
    log_report("GPU (wall)", &gpu_report);

    if cpu_report.active_clusters == gpu_report.active_clusters
        && cpu_report.light_assignments == gpu_report.light_assignments
    {
        log::info!("CPU/GPU parity OK");
    } else {
        log::warn!(
            "CPU/GPU mismatch: active {} vs {}, assignments {} vs {}",
            cpu_report.active_clusters,
            gpu_report.active_clusters,
            cpu_report.light_assignments,
            gpu_report.light_assignments
        );
    }

    if settings.debug_mode != DebugClusterMode::Off {
        write_debug_overlay(&ctx, &gpu, settings.debug_mode, shader_dir, camera)?;
    }
    Ok(())
}

fn write_debug_overlay(
    ctx: &GpuContext,
    gpu: &ClusteredLighting,
    mode: DebugClusterMode,
    shader_dir: Option<&Path>,
    camera: &ClusterCamera,
) -> Result<()> {
    let Some(buffers) = gpu.buffers() else {
        return Err(ClusterError::StaleBounds);
    };
    let format = wgpu::TextureFormat::Rgba8Unorm;
    let target = ctx.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("cluster_debug_target"),
        size: wgpu::Extent3d {
            width: camera.width,
            height: camera.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = target.create_view(&wgpu::TextureViewDescriptor::default());

    let renderer = ClusterDebugRenderer::new(&ctx.device, format, shader_dir)?;
    let bind_group = renderer.create_bind_group(&ctx.device, buffers);

    let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("cluster_debug_encoder"),
    });
    {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("cluster_debug_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        renderer.draw(&mut pass, &bind_group, buffers, mode);
    }
    ctx.queue.submit(std::iter::once(encoder.finish()));

    let image = ctx.read_texture_rgba8(&target)?;
    let path = PathBuf::from("cluster_debug.png");
    image.save(&path)?;
    log::info!("Wrote cluster overlay ({:?}) to {}", mode, path.display());
    Ok(())
}

fn run() -> Result<()> {
    let args = parse_args()?;
    let settings = match &args.settings {
        Some(path) => ClusterSettings::load(path)?,
        None => ClusterSettings::default(),
    };

    let camera = demo_camera();
    let depth = demo_depth(&camera);
    let lights = demo_lights(args.lights);
    log::info!(
        "Scene: {}x{}, {} lights, wall at {} and box at {} view depth",
        camera.width,
        camera.height,
        lights.len(),
        WALL_DEPTH,
        BOX_DEPTH
    );

    let mut cpu = CpuClusterPipeline::new(settings.clone())?;
    let report = cpu.run_frame(&camera, &depth, &lights)?;
    log_report("CPU", &report);

    let dims = cpu.dims().copied().ok_or(ClusterError::StaleBounds)?;
    let heatmap = light_count_heatmap(
        &depth,
        &dims,
        &camera.inverse_projection(),
        cpu.light_grid(),
        HEATMAP_MAX_LIGHTS,
    );
    heatmap.save(&args.out)?;
    log::info!("Wrote light-count heat map to {}", args.out.display());

    if args.cpu_only {
        return Ok(());
    }
    match gpu_parity_check(&settings, args.shader_dir.as_deref(), &camera, &lights) {
        Ok(()) => Ok(()),
        Err(err @ (ClusterError::AdapterUnavailable(_) | ClusterError::DeviceRequest(_))) => {
            log::warn!("Skipping GPU pass: {}", err);
            Ok(())
        }
        Err(err) => Err(err),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run() {
        log::error!("{}", err);
        std::process::exit(1);
    }
}
