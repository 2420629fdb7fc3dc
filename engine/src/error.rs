//! Error types for the cluster lighting engine.
//!
//! Configuration problems (bad camera, bad settings, grids that do not fit the
//! fixed-capacity buffers) are hard errors raised before any buffer is
//! allocated. Capacity conditions hit while a frame is running (too many
//! lights, index-list overflow) are not errors; they are reported through
//! [`crate::render::CapacityWarning`] in the frame report.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Invalid camera parameters: {0}")]
    InvalidCamera(String),

    #[error("Invalid cluster settings: {0}")]
    InvalidSettings(String),

    #[error("Cluster grid {dims:?} needs {required} clusters, capacity is {capacity}")]
    ClusterCapacityExceeded {
        dims: [u32; 3],
        required: u64,
        capacity: u32,
    },

    #[error("Depth buffer is {actual:?} but the camera resolution is {expected:?}")]
    DepthBufferMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Cluster bounds are stale: camera intrinsics changed without prepare()")]
    StaleBounds,

    #[error("No compatible GPU adapter: {0}")]
    AdapterUnavailable(String),

    #[error("GPU device request failed: {0}")]
    DeviceRequest(String),

    #[error("GPU readback failed: {0}")]
    Readback(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Settings parse error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, ClusterError>;
