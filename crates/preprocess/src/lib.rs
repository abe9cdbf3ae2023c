//! Frame batching for heatmap pose models.
//!
//! Pose networks take a fixed-size NHWC batch of `f32` pixel values. This crate
//! turns loose RGB frames into that tensor.

pub mod batcher;

pub use batcher::{FrameBatch, FrameBatcher};
