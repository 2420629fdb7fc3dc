//! Camera Module
//!
//! The camera state the cluster pipeline consumes. Window-system agnostic:
//! only camera parameters and projection math.

pub mod cluster_camera;

pub use cluster_camera::{CameraIntrinsics, ClusterCamera, unproject_ndc};
