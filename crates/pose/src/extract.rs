//! Turns raw backend tensors into a confidence map and an optional offset field.

use crate::{config::PoseConfig, error::DecodeError};
use common::span_debug;
use ndarray::{Array3, Array4, Array5, ArrayD, Axis, Ix3, Ix4};

/// Decoder inputs for one image.
#[derive(Debug, Clone)]
pub struct SingleOutputs {
    /// `[height, width, num_joints]`
    pub scmap: Array3<f32>,
    /// `[height, width, num_joints, 2]`, already scaled by `locref_stdev`
    pub locref: Option<Array4<f32>>,
}

/// Decoder inputs for a whole batch.
#[derive(Debug, Clone)]
pub struct BatchOutputs {
    /// `[batch, height, width, num_joints]`
    pub scmap: Array4<f32>,
    /// `[batch, height, width, num_joints, 2]`, already scaled by `locref_stdev`
    pub locref: Option<Array5<f32>>,
}

/// Extract single-image outputs.
///
/// Accepts a confidence map of `[1, H, W, J]`, `[H, W, J]` or, for single-joint
/// models, `[1, H, W]` or `[H, W]`. A rank-3 map with a leading singleton whose
/// last axis is not `num_joints` long is read as `[1, H, W]`. The leading batch
/// axis must be a singleton. Offsets are only read when location refinement is
/// enabled.
pub fn extract_outputs(
    outputs: Vec<ArrayD<f32>>,
    config: &PoseConfig,
) -> Result<SingleOutputs, DecodeError> {
    let _s = span_debug!("extract_outputs");

    let mut outputs = outputs.into_iter();
    let raw_scmap = outputs
        .next()
        .ok_or(DecodeError::MissingOutput("confidence map"))?;

    let scmap = match raw_scmap.ndim() {
        2 => raw_scmap.insert_axis(Axis(2)),
        // A single-joint map may arrive as [1, H, W] with the joint axis squeezed out
        3 if raw_scmap.shape()[0] == 1 && raw_scmap.shape()[2] != config.num_joints => {
            drop_unit_batch(raw_scmap)?.insert_axis(Axis(2))
        }
        3 => raw_scmap,
        4 => drop_unit_batch(raw_scmap)?,
        _ => {
            return Err(DecodeError::UnsupportedRank {
                name: "confidence map",
                shape: raw_scmap.shape().to_vec(),
            });
        }
    }
    .into_dimensionality::<Ix3>()?;

    let (height, width, joints) = scmap.dim();
    check_joints(joints, config)?;

    let locref = if config.location_refinement {
        let raw = outputs
            .next()
            .ok_or(DecodeError::MissingOutput("location refinement"))?;
        let raw = match raw.ndim() {
            3 => raw,
            4 => drop_unit_batch(raw)?,
            _ => {
                return Err(DecodeError::UnsupportedRank {
                    name: "location refinement",
                    shape: raw.shape().to_vec(),
                });
            }
        };

        let channels = raw.shape()[2];
        if channels % 2 != 0 {
            return Err(DecodeError::OddOffsetChannels(channels));
        }
        if raw.shape()[..2] != [height, width] || channels / 2 != joints {
            return Err(DecodeError::OffsetShapeMismatch {
                scmap: scmap.shape().to_vec(),
                offset: raw.shape().to_vec(),
            });
        }

        let mut locref = raw
            .to_shape((height, width, joints, 2))?
            .into_owned();
        locref *= config.locref_stdev;
        Some(locref)
    } else {
        None
    };

    tracing::trace!(
        scmap_shape = ?scmap.shape(),
        locref = locref.is_some(),
        "Extracted single-image outputs"
    );

    Ok(SingleOutputs { scmap, locref })
}

/// Extract batched outputs, keeping the leading batch axis.
///
/// The confidence map is `[N, H, W, J]`, or `[N, H, W]` for single-joint
/// models. `N` must equal the configured batch size.
pub fn extract_outputs_batch(
    outputs: Vec<ArrayD<f32>>,
    config: &PoseConfig,
) -> Result<BatchOutputs, DecodeError> {
    let _s = span_debug!("extract_outputs_batch");

    let mut outputs = outputs.into_iter();
    let raw_scmap = outputs
        .next()
        .ok_or(DecodeError::MissingOutput("confidence map"))?;

    let scmap = match raw_scmap.ndim() {
        3 => raw_scmap.insert_axis(Axis(3)),
        4 => raw_scmap,
        _ => {
            return Err(DecodeError::UnsupportedRank {
                name: "confidence map",
                shape: raw_scmap.shape().to_vec(),
            });
        }
    }
    .into_dimensionality::<Ix4>()?;

    let (batch, height, width, joints) = scmap.dim();
    if batch != config.batch_size {
        return Err(DecodeError::BatchSizeMismatch {
            expected: config.batch_size,
            actual: batch,
        });
    }
    check_joints(joints, config)?;

    let locref = if config.location_refinement {
        let raw = outputs
            .next()
            .ok_or(DecodeError::MissingOutput("location refinement"))?;
        if raw.ndim() != 4 {
            return Err(DecodeError::UnsupportedRank {
                name: "location refinement",
                shape: raw.shape().to_vec(),
            });
        }

        let channels = raw.shape()[3];
        if channels % 2 != 0 {
            return Err(DecodeError::OddOffsetChannels(channels));
        }
        if raw.shape()[..3] != [batch, height, width] || channels / 2 != joints {
            return Err(DecodeError::OffsetShapeMismatch {
                scmap: scmap.shape().to_vec(),
                offset: raw.shape().to_vec(),
            });
        }

        let mut locref = raw
            .to_shape((batch, height, width, joints, 2))?
            .into_owned();
        locref *= config.locref_stdev;
        Some(locref)
    } else {
        None
    };

    tracing::trace!(
        scmap_shape = ?scmap.shape(),
        locref = locref.is_some(),
        "Extracted batch outputs"
    );

    Ok(BatchOutputs { scmap, locref })
}

fn drop_unit_batch(array: ArrayD<f32>) -> Result<ArrayD<f32>, DecodeError> {
    let actual = array.len_of(Axis(0));
    if actual != 1 {
        return Err(DecodeError::BatchSizeMismatch {
            expected: 1,
            actual,
        });
    }
    Ok(array.index_axis_move(Axis(0), 0))
}

fn check_joints(actual: usize, config: &PoseConfig) -> Result<(), DecodeError> {
    if actual != config.num_joints {
        return Err(DecodeError::JointCountMismatch {
            expected: config.num_joints,
            actual,
        });
    }
    Ok(())
}
