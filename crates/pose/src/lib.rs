//! Heatmap pose decoding.
//!
//! A pose network emits a per-joint confidence map on a coarse grid and,
//! optionally, a sub-cell offset field. This crate extracts those tensors from
//! a backend's raw outputs and turns them into `(x, y, confidence)` keypoints,
//! either one image at a time or for a whole batch at once.

pub mod backend;
pub mod batch;
pub mod config;
pub mod decode;
pub mod error;
pub mod estimator;
pub mod extract;

// Re-export commonly used types for convenience
pub use backend::InferenceBackend;
pub use config::{ExecutionProvider, PoseConfig};
pub use decode::{Joint, Pose};
pub use error::DecodeError;
pub use estimator::{BatchPoseOutput, PoseEstimator, PoseOutput};
