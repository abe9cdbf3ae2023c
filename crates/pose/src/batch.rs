//! Batched pose decoding over whole-batch array reductions.

use crate::{decode::argmax, error::DecodeError};
use ndarray::{Array2, Array3, ArrayView4, ArrayView5, Axis};

/// Decode every image of a batch at once.
///
/// `scmap` is `[N, H, W, J]`, `locref` is `[N, H, W, J, 2]` with `(dx, dy)`
/// in the last axis. Returns `[N, 3 * J]` rows laid out as
/// `[x0, y0, c0, x1, y1, c1, ...]` in joint order.
///
/// The argmax runs as one lane reduction over the flattened `H * W` axis, with
/// the same first-occurrence tie-break as [`crate::decode::argmax_pose_predict`].
#[tracing::instrument(level = "debug", skip_all, fields(shape = ?scmap.shape()))]
pub fn argmax_pose_predict_batch(
    scmap: ArrayView4<f32>,
    locref: Option<ArrayView5<f32>>,
    stride: f32,
) -> Result<Array2<f32>, DecodeError> {
    let (batch, height, width, num_joints) = scmap.dim();
    if height == 0 || width == 0 {
        return Err(DecodeError::EmptyGrid);
    }
    if let Some(locref) = &locref {
        if locref.dim() != (batch, height, width, num_joints, 2) {
            return Err(DecodeError::OffsetShapeMismatch {
                scmap: scmap.shape().to_vec(),
                offset: locref.shape().to_vec(),
            });
        }
    }

    // [N, H * W, J]: one lane per image and joint along axis 1
    let flat = scmap.to_shape((batch, height * width, num_joints))?;
    let maxloc = flat.map_axis(Axis(1), |lane| argmax(lane.iter()).map_or(0, |(i, _)| i));

    let half = 0.5 * stride;
    let mut poses = Array2::<f32>::zeros((batch, 3 * num_joints));

    // Gather loop over batch x joints. Each (image, joint) pair reads only its
    // own cell, so the result matches element-wise fancy indexing.
    for ((image, joint), &idx) in maxloc.indexed_iter() {
        let (row, col) = (idx / width, idx % width);

        let (dx, dy) = locref.as_ref().map_or((0.0, 0.0), |l| {
            (l[[image, row, col, joint, 0]], l[[image, row, col, joint, 1]])
        });
        let confidence = scmap[[image, row, col, joint]];

        let base = 3 * joint;
        poses[[image, base]] = col as f32 * stride + half + dx;
        poses[[image, base + 1]] = row as f32 * stride + half + dy;
        poses[[image, base + 2]] = confidence;
    }

    Ok(poses)
}

/// Per-image heat image for inspection: every joint slice is scaled to
/// `[0, 255]` by its own maximum and the joints are summed.
///
/// Returns `[N, H, W]`. A slice whose maximum is not positive adds nothing.
pub fn confidence_images(scmap: ArrayView4<f32>) -> Array3<f32> {
    let (batch, height, width, _) = scmap.dim();
    let mut images = Array3::<f32>::zeros((batch, height, width));

    for (mut out, sc) in images.outer_iter_mut().zip(scmap.outer_iter()) {
        for slice in sc.axis_iter(Axis(2)) {
            let max = slice.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            if max > 0.0 {
                out.zip_mut_with(&slice, |acc, &v| *acc += v / max * 255.0);
            }
        }
    }

    images
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::argmax_pose_predict;
    use ndarray::{Array4, Array5};

    fn synthetic(batch: usize, height: usize, width: usize, joints: usize) -> Array4<f32> {
        Array4::from_shape_fn((batch, height, width, joints), |(n, r, c, j)| {
            ((n * 31 + r * 17 + c * 5 + j * 13) % 23) as f32 / 23.0
        })
    }

    #[test]
    fn test_batch_layout_is_xyc_per_joint() {
        let mut scmap = Array4::<f32>::zeros((2, 4, 4, 2));
        scmap[[0, 1, 2, 0]] = 0.9;
        scmap[[0, 3, 0, 1]] = 0.5;
        scmap[[1, 0, 3, 0]] = 0.7;
        scmap[[1, 2, 2, 1]] = 0.6;

        let poses = argmax_pose_predict_batch(scmap.view(), None, 8.0).unwrap();

        assert_eq!(poses.shape(), &[2, 6]);
        let expected = [
            [20.0, 12.0, 0.9, 4.0, 28.0, 0.5],
            [28.0, 4.0, 0.7, 20.0, 20.0, 0.6],
        ];
        for (row, want) in poses.outer_iter().zip(expected.iter()) {
            for (got, want) in row.iter().zip(want.iter()) {
                assert!((got - want).abs() < 1e-5, "got {}, want {}", got, want);
            }
        }
    }

    #[test]
    fn test_batch_offsets_are_not_swapped() {
        let mut scmap = Array4::<f32>::zeros((1, 3, 3, 1));
        scmap[[0, 2, 1, 0]] = 1.0;
        let mut locref = Array5::<f32>::zeros((1, 3, 3, 1, 2));
        locref[[0, 2, 1, 0, 0]] = 0.5; // dx
        locref[[0, 2, 1, 0, 1]] = -1.0; // dy

        let poses = argmax_pose_predict_batch(scmap.view(), Some(locref.view()), 2.0).unwrap();

        assert!((poses[[0, 0]] - (1.0 * 2.0 + 1.0 + 0.5)).abs() < 1e-6);
        assert!((poses[[0, 1]] - (2.0 * 2.0 + 1.0 - 1.0)).abs() < 1e-6);
    }

    #[test]
    fn test_batch_agrees_with_single_image_decoder() {
        let scmap = synthetic(3, 5, 7, 4);
        let locref = Array5::from_shape_fn((3, 5, 7, 4, 2), |(n, r, c, j, k)| {
            (n as f32 - r as f32 + c as f32 * 0.5 - j as f32) * if k == 0 { 0.1 } else { -0.2 }
        });

        let poses = argmax_pose_predict_batch(scmap.view(), Some(locref.view()), 8.0).unwrap();

        for image in 0..3 {
            let single = argmax_pose_predict(
                scmap.index_axis(Axis(0), image),
                Some(locref.index_axis(Axis(0), image)),
                8.0,
            )
            .unwrap();
            let row = poses.index_axis(Axis(0), image);
            for (j, joint) in single.joints.iter().enumerate() {
                assert!((row[3 * j] - joint.x).abs() < 1e-4, "image {image} joint {j} x");
                assert!((row[3 * j + 1] - joint.y).abs() < 1e-4, "image {image} joint {j} y");
                assert_eq!(row[3 * j + 2], joint.confidence);
            }
        }
    }

    #[test]
    fn test_batch_ties_resolve_row_major() {
        let mut scmap = Array4::<f32>::zeros((1, 2, 3, 1));
        scmap[[0, 1, 0, 0]] = 0.5;
        scmap[[0, 0, 2, 0]] = 0.5;

        let poses = argmax_pose_predict_batch(scmap.view(), None, 1.0).unwrap();
        assert!((poses[[0, 0]] - 2.5).abs() < 1e-6);
        assert!((poses[[0, 1]] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_batch_confidence_is_slice_maximum() {
        let scmap = synthetic(2, 4, 6, 3);
        let poses = argmax_pose_predict_batch(scmap.view(), None, 4.0).unwrap();

        for image in 0..2 {
            for joint in 0..3 {
                let max = scmap
                    .index_axis(Axis(0), image)
                    .index_axis(Axis(2), joint)
                    .fold(f32::NEG_INFINITY, |m, &v| m.max(v));
                assert_eq!(poses[[image, 3 * joint + 2]], max);
            }
        }
    }

    #[test]
    fn test_batch_offset_shape_mismatch_is_rejected() {
        let scmap = Array4::<f32>::zeros((2, 3, 3, 1));
        let locref = Array5::<f32>::zeros((1, 3, 3, 1, 2));
        let err = argmax_pose_predict_batch(scmap.view(), Some(locref.view()), 1.0).unwrap_err();
        assert!(matches!(err, DecodeError::OffsetShapeMismatch { .. }));
    }

    #[test]
    fn test_confidence_images_normalize_each_joint() {
        let mut scmap = Array4::<f32>::zeros((2, 2, 2, 2));
        scmap[[0, 0, 0, 0]] = 0.5;
        scmap[[0, 1, 1, 0]] = 0.25;
        scmap[[0, 1, 1, 1]] = 0.1;
        scmap[[1, 0, 1, 0]] = 0.8;

        let images = confidence_images(scmap.view());

        assert_eq!(images.shape(), &[2, 2, 2]);
        assert!((images[[0, 0, 0]] - 255.0).abs() < 1e-3);
        // 0.25 / 0.5 * 255 from joint 0 plus the full 255 of joint 1
        assert!((images[[0, 1, 1]] - (127.5 + 255.0)).abs() < 1e-3);
        assert!((images[[1, 0, 1]] - 255.0).abs() < 1e-3);
        assert_eq!(images[[1, 1, 1]], 0.0, "All-zero joint slice adds nothing");
    }
}
