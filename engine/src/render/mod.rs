//! Render Module
//!
//! Clustered forward lighting: the view frustum is split into a 3D grid of
//! clusters, the clusters touched by visible geometry are found from the
//! depth pre-pass, and each of those clusters gets the list of point lights
//! whose spheres reach it.
//!
//! The passes exist twice: as wgpu compute kernels (`ClusteredLighting`)
//! and as a rayon CPU implementation (`CpuClusterPipeline`) with the same
//! atomic semantics. Both derive every index from `GridDimensions`.

pub mod atomic_list;
pub mod binding_validator;
pub mod cluster_bounds;
pub mod cluster_buffers;
pub mod cluster_config;
pub mod cluster_cpu;
pub mod cluster_dims;
pub mod cluster_dispatch;
pub mod cluster_pipeline;
pub mod compute_pipelines;
pub mod debug_clusters;
pub mod depth_buffer;
pub mod frame_report;
pub mod gpu_context;
pub mod point_lights;
pub mod shader_loader;

// Re-export commonly used types for convenience
pub use atomic_list::AtomicAppendList;
pub use cluster_bounds::{ClusterBoundsTracker, build_cluster_aabbs};
pub use cluster_buffers::{
    ClusterAabb, ClusterGpuBuffers, ClusterUniforms, DispatchIndirectArgs, DrawIndirectArgs, IndirectArgs,
    LightGridEntry, LightIndexCounter,
};
pub use cluster_config::{ClusterSettings, MAX_LIGHTS_COUNT};
pub use cluster_cpu::CpuClusterPipeline;
pub use cluster_dims::GridDimensions;
pub use cluster_pipeline::{ClusteredLighting, GpuFrameReadback};
pub use debug_clusters::{ClusterDebugRenderer, DebugClusterMode, light_count_heatmap};
pub use depth_buffer::DepthBuffer;
pub use frame_report::{CapacityWarning, ClusterFrameReport};
pub use gpu_context::{GpuContext, GpuContextConfig};
pub use point_lights::{LightSnapshot, PointLight};
pub use shader_loader::{ClusterShader, ShaderSource};
