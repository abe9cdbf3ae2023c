//! Single-image pose decoding.

use crate::error::DecodeError;
use ndarray::{Array2, ArrayView1, ArrayView3, ArrayView4, Axis};

/// One decoded body part in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Joint {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

/// Decoded joints of one image, in the confidence map's joint order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pose {
    pub joints: Vec<Joint>,
}

impl Pose {
    /// Rebuild a pose from one row of the batched `[x, y, c, x, y, c, ...]` layout.
    pub fn from_flat(row: ArrayView1<f32>) -> Self {
        let joints = row
            .exact_chunks(3)
            .into_iter()
            .map(|c| Joint {
                x: c[0],
                y: c[1],
                confidence: c[2],
            })
            .collect();
        Self { joints }
    }

    /// `[num_joints, 3]` array of `(x, y, confidence)` rows.
    pub fn to_array(&self) -> Array2<f32> {
        let mut out = Array2::zeros((self.joints.len(), 3));
        for (mut row, joint) in out.outer_iter_mut().zip(&self.joints) {
            row[0] = joint.x;
            row[1] = joint.y;
            row[2] = joint.confidence;
        }
        out
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }
}

/// Index and value of the maximum, in iteration order.
///
/// The first occurrence wins on ties, so over a row-major 2D slice the
/// top-most, then left-most, cell is chosen. Returns `None` for an empty input.
///
/// NaN never beats a real value, which intentionally departs from NumPy's
/// `argmax` (it returns the first NaN). An all-NaN input yields index 0 with a
/// NaN value.
#[inline]
pub fn argmax<'a>(values: impl IntoIterator<Item = &'a f32>) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &value) in values.into_iter().enumerate() {
        match best {
            Some((_, top)) if value > top || (top.is_nan() && !value.is_nan()) => {
                best = Some((i, value));
            }
            Some(_) => {}
            None => best = Some((i, value)),
        }
    }
    best
}

/// Combine a confidence map and offsets into the final pose.
///
/// `scmap` is `[H, W, J]`, `locref` is `[H, W, J, 2]` holding `(dx, dy)` per
/// cell and joint. Each joint lands at the centre of its best cell, shifted by
/// the offset: `(col, row) * stride + stride / 2 + (dx, dy)`.
pub fn argmax_pose_predict(
    scmap: ArrayView3<f32>,
    locref: Option<ArrayView4<f32>>,
    stride: f32,
) -> Result<Pose, DecodeError> {
    let (height, width, num_joints) = scmap.dim();
    if height == 0 || width == 0 {
        return Err(DecodeError::EmptyGrid);
    }
    if let Some(locref) = &locref {
        if locref.dim() != (height, width, num_joints, 2) {
            return Err(DecodeError::OffsetShapeMismatch {
                scmap: scmap.shape().to_vec(),
                offset: locref.shape().to_vec(),
            });
        }
    }

    let half = 0.5 * stride;
    let joints = scmap
        .axis_iter(Axis(2))
        .enumerate()
        .map(|(joint, slice)| {
            let (flat, confidence) = argmax(slice.iter()).ok_or(DecodeError::EmptyGrid)?;
            let (row, col) = (flat / width, flat % width);

            // Offsets are stored (dx, dy); flip to the grid's (row, col) order.
            let offset = locref.as_ref().map_or([0.0, 0.0], |l| {
                [l[[row, col, joint, 1]], l[[row, col, joint, 0]]]
            });

            let grid_pos = [
                row as f32 * stride + half + offset[0],
                col as f32 * stride + half + offset[1],
            ];

            Ok(Joint {
                x: grid_pos[1],
                y: grid_pos[0],
                confidence,
            })
        })
        .collect::<Result<Vec<_>, DecodeError>>()?;

    Ok(Pose { joints })
}
