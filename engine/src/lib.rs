//! Cluster Forward Engine Library
//!
//! Clustered light assignment for forward rendering with wgpu.
//!
//! # Modules
//!
//! - [`render`] - Cluster grid, GPU compute passes, CPU reference pipeline, debug views
//! - [`camera`] - Camera parameters and projection math
//! - [`error`] - Error type shared by every fallible operation
//!
//! # Example
//!
//! ```
//! use cluster_forward_engine::camera::ClusterCamera;
//! use cluster_forward_engine::render::{ClusterSettings, CpuClusterPipeline, DepthBuffer, PointLight};
//!
//! let camera = ClusterCamera::default().with_resolution(128, 64);
//! let mut depth = DepthBuffer::new(128, 64);
//! depth.fill_view_depth(&camera, 10.0);
//!
//! let lights = [PointLight::at([0.0, 0.0, -10.0], 4.0)];
//! let mut pipeline = CpuClusterPipeline::new(ClusterSettings::default()).unwrap();
//! let report = pipeline.run_frame(&camera, &depth, &lights).unwrap();
//! assert!(report.active_clusters > 0);
//! ```

pub mod camera;
pub mod error;
pub mod render;

pub use error::{ClusterError, Result};
// Re-export the render module contents at crate level for convenience
pub use render::*;
