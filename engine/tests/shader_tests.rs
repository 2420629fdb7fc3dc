//! Shader Tests - WGSL Validation and Layout Agreement
//!
//! Parses every composed cluster shader with naga and checks it against the
//! Rust side: entry points, workgroup sizes, struct sizes and bind group
//! layouts. No GPU is needed.

use std::path::Path;

use cluster_forward_engine::ClusterError;
use cluster_forward_engine::render::cluster_buffers::{
    CLUSTER_AABB_SIZE, CLUSTER_UNIFORMS_SIZE, DISPATCH_ARGS_SIZE, DRAW_ARGS_SIZE, LIGHT_GRID_ENTRY_SIZE,
    LIGHT_INDEX_COUNTER_SIZE,
};
use cluster_forward_engine::render::cluster_config::{
    AABB_WORKGROUP_SIZE, ASSIGN_WORKGROUP_SIZE, FLAGS_WORKGROUP_TILE, UNIQUE_WORKGROUP_SIZE,
};
use cluster_forward_engine::render::compute_pipelines::{
    aabb_layout_entries, assign_layout_entries, flags_layout_entries, indirect_layout_entries,
    unique_layout_entries,
};
use cluster_forward_engine::render::debug_clusters::{ClusterDebugRenderer, debug_layout_entries};
use cluster_forward_engine::render::{GpuContext, GpuContextConfig};
use cluster_forward_engine::render::shader_loader::{ClusterShader, paths};

// ============================================================================
// Helpers
// ============================================================================

fn parse(shader: ClusterShader) -> naga::Module {
    let source = shader.source();
    match naga::front::wgsl::parse_str(&source) {
        Ok(module) => module,
        Err(err) => panic!("{} failed to parse:\n{}", shader.label(), err.emit_to_string(&source)),
    }
}

fn validate(shader: ClusterShader, module: &naga::Module) {
    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    if let Err(err) = validator.validate(module) {
        panic!(
            "{} failed validation:\n{}",
            shader.label(),
            err.emit_to_string(&shader.source())
        );
    }
}

fn entry_point<'a>(module: &'a naga::Module, name: &str) -> &'a naga::EntryPoint {
    module
        .entry_points
        .iter()
        .find(|ep| ep.name == name)
        .unwrap_or_else(|| panic!("missing entry point {}", name))
}

fn struct_span(module: &naga::Module, name: &str) -> u32 {
    module
        .types
        .iter()
        .find_map(|(_, ty)| match (&ty.name, &ty.inner) {
            (Some(n), naga::TypeInner::Struct { span, .. }) if n == name => Some(*span),
            _ => None,
        })
        .unwrap_or_else(|| panic!("missing struct {}", name))
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Kind {
    Uniform,
    Storage { read_only: bool },
    Texture,
    Other,
}

/// (binding, kind) of every group 0 resource the module declares.
fn shader_bindings(module: &naga::Module) -> Vec<(u32, Kind)> {
    let mut bindings: Vec<(u32, Kind)> = module
        .global_variables
        .iter()
        .filter_map(|(_, var)| {
            let binding = var.binding.as_ref()?;
            assert_eq!(binding.group, 0, "{:?} outside group 0", var.name);
            let kind = match var.space {
                naga::AddressSpace::Uniform => Kind::Uniform,
                naga::AddressSpace::Storage { access } => Kind::Storage {
                    read_only: !access.contains(naga::StorageAccess::STORE),
                },
                naga::AddressSpace::Handle => Kind::Texture,
                _ => Kind::Other,
            };
            Some((binding.binding, kind))
        })
        .collect();
    bindings.sort();
    bindings
}

fn layout_bindings(entries: &[wgpu::BindGroupLayoutEntry]) -> Vec<(u32, Kind)> {
    let mut bindings: Vec<(u32, Kind)> = entries
        .iter()
        .map(|entry| {
            let kind = match entry.ty {
                wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    ..
                } => Kind::Uniform,
                wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only },
                    ..
                } => Kind::Storage { read_only },
                wgpu::BindingType::Texture { .. } => Kind::Texture,
                _ => Kind::Other,
            };
            (entry.binding, kind)
        })
        .collect();
    bindings.sort();
    bindings
}

fn layout_for(shader: ClusterShader) -> Vec<wgpu::BindGroupLayoutEntry> {
    match shader {
        ClusterShader::Aabb => aabb_layout_entries(),
        ClusterShader::Flags => flags_layout_entries(),
        ClusterShader::Unique => unique_layout_entries(),
        ClusterShader::Indirect => indirect_layout_entries(),
        ClusterShader::Assign => assign_layout_entries(),
        ClusterShader::Debug => debug_layout_entries(),
    }
}

// ============================================================================
// Parsing and Validation
// ============================================================================

#[test]
fn test_all_shaders_validate() {
    for shader in ClusterShader::ALL {
        let module = parse(shader);
        validate(shader, &module);
    }
}

#[test]
fn test_entry_points_exist() {
    for shader in ClusterShader::ALL {
        let module = parse(shader);
        for name in shader.entry_points() {
            entry_point(&module, name);
        }
        assert_eq!(module.entry_points.len(), shader.entry_points().len(), "{}", shader.label());
    }
}

#[test]
fn test_debug_entry_point_stages() {
    let module = parse(ClusterShader::Debug);
    assert_eq!(entry_point(&module, "vs_all_clusters").stage, naga::ShaderStage::Vertex);
    assert_eq!(entry_point(&module, "vs_active_clusters").stage, naga::ShaderStage::Vertex);
    assert_eq!(entry_point(&module, "fs_main").stage, naga::ShaderStage::Fragment);
}

// ============================================================================
// Rust / WGSL Agreement
// ============================================================================

#[test]
fn test_workgroup_sizes_match_dispatch() {
    let cases = [
        (ClusterShader::Aabb, "cs_build_aabbs", [AABB_WORKGROUP_SIZE, 1, 1]),
        (ClusterShader::Flags, "cs_mark_active", [FLAGS_WORKGROUP_TILE, FLAGS_WORKGROUP_TILE, 1]),
        (ClusterShader::Unique, "cs_find_unique", [UNIQUE_WORKGROUP_SIZE, 1, 1]),
        (ClusterShader::Indirect, "cs_update_indirect_args", [1, 1, 1]),
        (ClusterShader::Assign, "cs_assign_lights", [ASSIGN_WORKGROUP_SIZE, 1, 1]),
    ];
    for (shader, name, expected) in cases {
        let module = parse(shader);
        let ep = entry_point(&module, name);
        assert_eq!(ep.stage, naga::ShaderStage::Compute);
        assert_eq!(ep.workgroup_size, expected, "{}", name);
    }
}

#[test]
fn test_indirect_group_size_matches_assign_kernel() {
    let module = parse(ClusterShader::Indirect);
    let (_, constant) = module
        .constants
        .iter()
        .find(|(_, c)| c.name.as_deref() == Some("ASSIGN_WORKGROUP_SIZE"))
        .expect("ASSIGN_WORKGROUP_SIZE constant");
    match module.global_expressions[constant.init] {
        naga::Expression::Literal(naga::Literal::U32(value)) => assert_eq!(value, ASSIGN_WORKGROUP_SIZE),
        ref other => panic!("unexpected initializer {:?}", other),
    }
}

#[test]
fn test_struct_sizes_match_rust() {
    let module = parse(ClusterShader::Assign);
    assert_eq!(struct_span(&module, "ClusterUniforms") as u64, CLUSTER_UNIFORMS_SIZE);
    assert_eq!(struct_span(&module, "ClusterAabb") as u64, CLUSTER_AABB_SIZE);
    assert_eq!(struct_span(&module, "LightGridEntry") as u64, LIGHT_GRID_ENTRY_SIZE);
    assert_eq!(struct_span(&module, "LightIndexCounter") as u64, LIGHT_INDEX_COUNTER_SIZE);

    let module = parse(ClusterShader::Indirect);
    assert_eq!(struct_span(&module, "DispatchIndirectArgs") as u64, DISPATCH_ARGS_SIZE);
    assert_eq!(struct_span(&module, "DrawIndirectArgs") as u64, DRAW_ARGS_SIZE);
}

#[test]
fn test_bind_group_layouts_match_shaders() {
    for shader in ClusterShader::ALL {
        let module = parse(shader);
        assert_eq!(
            shader_bindings(&module),
            layout_bindings(&layout_for(shader)),
            "{} bindings",
            shader.label()
        );
    }
}

// ============================================================================
// Runtime Loading
// ============================================================================

#[test]
fn test_runtime_sources_match_embedded() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join(paths::SHADER_DIR);
    for shader in ClusterShader::ALL {
        let loaded = shader.load_from_dir(&dir).unwrap();
        assert_eq!(loaded, shader.source(), "{}", shader.label());
    }
}

#[test]
fn test_missing_shader_dir_is_io_error() {
    let err = ClusterShader::Assign
        .load_from_dir("no/such/shader/dir")
        .unwrap_err();
    assert!(matches!(err, ClusterError::Io { .. }));
}

#[test]
fn test_debug_renderer_uses_shader_dir() {
    // Needs an adapter; skipped on machines without one
    let Ok(ctx) = GpuContext::new_headless(GpuContextConfig::default()) else {
        return;
    };
    let format = wgpu::TextureFormat::Rgba8Unorm;

    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join(paths::SHADER_DIR);
    assert!(ClusterDebugRenderer::new(&ctx.device, format, Some(&dir)).is_ok());

    let missing = ClusterDebugRenderer::new(&ctx.device, format, Some(Path::new("no/such/shader/dir")));
    assert!(matches!(missing, Err(ClusterError::Io { .. })));
}

// ============================================================================
// Index Reservation
// ============================================================================

#[test]
fn test_assign_kernel_reserves_without_wrapping() {
    let source = ClusterShader::Assign.source();
    // A plain atomicAdd on the cursor wraps once reservations pass u32::MAX
    assert!(!source.contains("atomicAdd(&index_counter"));
    assert!(source.contains("atomicCompareExchangeWeak(&index_counter.next"));
    assert!(source.contains("atomicCompareExchangeWeak(&index_counter.overflow"));

    let module = parse(ClusterShader::Assign);
    for name in ["reserve_indices", "add_overflow"] {
        assert!(
            module.functions.iter().any(|(_, f)| f.name.as_deref() == Some(name)),
            "missing {}",
            name
        );
    }
}
