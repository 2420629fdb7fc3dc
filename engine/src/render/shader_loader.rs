//! Shader Loading Utilities
//!
//! Loads and composes the cluster WGSL kernels. Every kernel is compiled as
//! `cluster_common.wgsl` followed by the kernel file, so the uniform block and
//! grid math are declared once.
//!
//! Shaders are embedded at compile time by default; `ShaderSource::Runtime`
//! loads them from disk instead, for editing shaders without a rebuild.

use std::path::Path;

use crate::error::{ClusterError, Result};

/// Shader source that can be either embedded at compile time or loaded at runtime.
pub enum ShaderSource {
    /// Embedded shader source (no file I/O at runtime)
    Embedded(&'static str),
    /// Runtime-loaded shader source
    Runtime(String),
}

impl ShaderSource {
    /// Get the shader source as a string slice.
    pub fn as_str(&self) -> &str {
        match self {
            ShaderSource::Embedded(s) => s,
            ShaderSource::Runtime(s) => s.as_str(),
        }
    }
}

/// Load a shader from the filesystem at runtime.
pub fn load_shader_file(path: impl AsRef<Path>) -> Result<ShaderSource> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path).map_err(|source| ClusterError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(ShaderSource::Runtime(source))
}

/// Prepend the shared prelude to a kernel.
pub fn compose(common: &str, kernel: &str) -> String {
    let mut source = String::with_capacity(common.len() + kernel.len() + 1);
    source.push_str(common);
    source.push('\n');
    source.push_str(kernel);
    source
}

/// Create a wgpu shader module from WGSL source.
pub fn create_shader_module(device: &wgpu::Device, label: &str, source: &str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}

/// The cluster shader programs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ClusterShader {
    Aabb,
    Flags,
    Unique,
    Indirect,
    Assign,
    Debug,
}

impl ClusterShader {
    pub const ALL: [ClusterShader; 6] = [
        ClusterShader::Aabb,
        ClusterShader::Flags,
        ClusterShader::Unique,
        ClusterShader::Indirect,
        ClusterShader::Assign,
        ClusterShader::Debug,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ClusterShader::Aabb => "cluster_aabb",
            ClusterShader::Flags => "cluster_flags",
            ClusterShader::Unique => "cluster_unique",
            ClusterShader::Indirect => "cluster_indirect",
            ClusterShader::Assign => "cluster_assign",
            ClusterShader::Debug => "cluster_debug",
        }
    }

    /// Kernel file name under the shader directory.
    pub fn file_name(self) -> &'static str {
        match self {
            ClusterShader::Aabb => "cluster_aabb.wgsl",
            ClusterShader::Flags => "cluster_flags.wgsl",
            ClusterShader::Unique => "cluster_unique.wgsl",
            ClusterShader::Indirect => "cluster_indirect.wgsl",
            ClusterShader::Assign => "cluster_assign.wgsl",
            ClusterShader::Debug => "cluster_debug.wgsl",
        }
    }

    /// Entry points the pipelines reference.
    pub fn entry_points(self) -> &'static [&'static str] {
        match self {
            ClusterShader::Aabb => &["cs_build_aabbs"],
            ClusterShader::Flags => &["cs_mark_active"],
            ClusterShader::Unique => &["cs_find_unique"],
            ClusterShader::Indirect => &["cs_update_indirect_args"],
            ClusterShader::Assign => &["cs_assign_lights"],
            ClusterShader::Debug => &["vs_all_clusters", "vs_active_clusters", "fs_main"],
        }
    }

    /// Kernel source without the prelude.
    pub fn kernel_source(self) -> ShaderSource {
        ShaderSource::Embedded(match self {
            ClusterShader::Aabb => embedded::CLUSTER_AABB,
            ClusterShader::Flags => embedded::CLUSTER_FLAGS,
            ClusterShader::Unique => embedded::CLUSTER_UNIQUE,
            ClusterShader::Indirect => embedded::CLUSTER_INDIRECT,
            ClusterShader::Assign => embedded::CLUSTER_ASSIGN,
            ClusterShader::Debug => embedded::CLUSTER_DEBUG,
        })
    }

    /// Complete embedded source, ready to compile.
    pub fn source(self) -> String {
        compose(embedded::CLUSTER_COMMON, self.kernel_source().as_str())
    }

    /// Complete source loaded from `dir` (which must hold both the prelude
    /// and the kernel file).
    pub fn load_from_dir(self, dir: impl AsRef<Path>) -> Result<String> {
        let dir = dir.as_ref();
        let common = load_shader_file(dir.join(paths::COMMON_FILE))?;
        let kernel = load_shader_file(dir.join(self.file_name()))?;
        log::info!("Loaded {} from {}", self.label(), dir.display());
        Ok(compose(common.as_str(), kernel.as_str()))
    }

    /// Compile on `device`, from `dir` when given, embedded otherwise.
    pub fn create_module(self, device: &wgpu::Device, dir: Option<&Path>) -> Result<wgpu::ShaderModule> {
        let source = match dir {
            Some(dir) => self.load_from_dir(dir)?,
            None => self.source(),
        };
        Ok(create_shader_module(device, self.label(), &source))
    }
}

/// Shader locations on disk (relative to project root).
pub mod paths {
    /// Directory of the cluster shaders
    pub const SHADER_DIR: &str = "engine/shaders";

    /// Shared prelude file name
    pub const COMMON_FILE: &str = "cluster_common.wgsl";
}

/// Embedded shaders that are compiled into the binary.
pub mod embedded {
    pub const CLUSTER_COMMON: &str = include_str!("../../shaders/cluster_common.wgsl");
    pub const CLUSTER_AABB: &str = include_str!("../../shaders/cluster_aabb.wgsl");
    pub const CLUSTER_FLAGS: &str = include_str!("../../shaders/cluster_flags.wgsl");
    pub const CLUSTER_UNIQUE: &str = include_str!("../../shaders/cluster_unique.wgsl");
    pub const CLUSTER_INDIRECT: &str = include_str!("../../shaders/cluster_indirect.wgsl");
    pub const CLUSTER_ASSIGN: &str = include_str!("../../shaders/cluster_assign.wgsl");
    pub const CLUSTER_DEBUG: &str = include_str!("../../shaders/cluster_debug.wgsl");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_source_embedded() {
        let source = ShaderSource::Embedded("fn main() {}");
        assert_eq!(source.as_str(), "fn main() {}");
    }

    #[test]
    fn test_shader_source_runtime() {
        let source = ShaderSource::Runtime("fn main() {}".to_string());
        assert_eq!(source.as_str(), "fn main() {}");
    }

    #[test]
    fn test_compose_puts_prelude_first() {
        let composed = compose("struct A { x: u32 };", "fn f() {}");
        assert!(composed.starts_with("struct A"));
        assert!(composed.ends_with("fn f() {}"));
    }

    #[test]
    fn test_every_kernel_has_its_entry_points() {
        for shader in ClusterShader::ALL {
            let source = shader.source();
            assert!(source.contains("struct ClusterUniforms"));
            for entry in shader.entry_points() {
                assert!(
                    source.contains(&format!("fn {}(", entry)),
                    "{} is missing {}",
                    shader.label(),
                    entry
                );
            }
        }
    }

    #[test]
    fn test_missing_runtime_file_is_io_error() {
        let err = load_shader_file("does/not/exist.wgsl").err();
        assert!(matches!(err, Some(ClusterError::Io { .. })));
    }
}
