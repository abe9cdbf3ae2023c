use crate::{
    backend::InferenceBackend,
    batch::{argmax_pose_predict_batch, confidence_images},
    config::PoseConfig,
    decode::{Pose, argmax_pose_predict},
    error::DecodeError,
    extract::{BatchOutputs, SingleOutputs, extract_outputs, extract_outputs_batch},
};
use ndarray::{Array2, Array3, Array4, Array5, ArrayD, ArrayView3, ArrayView4, Axis, s};
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
};
use preprocess::FrameBatch;
use std::time::Instant;

/// Single-image prediction with the intermediate tensors kept.
#[derive(Debug, Clone)]
pub struct PoseOutput {
    /// `[H, W, J]`
    pub scmap: Array3<f32>,
    /// `[H, W, J, 2]`, scaled offsets
    pub locref: Option<Array4<f32>>,
    pub pose: Pose,
}

/// Batch prediction with the visualization maps and offsets kept.
#[derive(Debug, Clone)]
pub struct BatchPoseOutput {
    /// `[N, H, W]` per-image heat images, see [`confidence_images`]
    pub scmap_imgs: Array3<f32>,
    /// `[N, H, W, J, 2]`, scaled offsets
    pub locref: Option<Array5<f32>>,
    /// `[N, 3 * J]`
    pub poses: Array2<f32>,
}

struct Metrics {
    duration: Histogram<f64>,
    images: Counter<u64>,
}

impl Metrics {
    fn init(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [
            0.001, 0.002, 0.005, 0.01, 0.02, 0.05, 0.1, 0.2, 0.5, 1.0, 2.0,
        ];
        let duration = meter
            .f64_histogram("pose_inference_duration_seconds")
            .with_description("Time to run one backend call and decode its outputs")
            .with_unit("s")
            .with_boundaries(latency_buckets.to_vec())
            .build();
        let images = meter
            .u64_counter("pose_images_total")
            .with_description("Total images fed to the backend")
            .build();

        Self { duration, images }
    }
}

/// Runs a backend and decodes its heatmaps into poses.
///
/// Every call is one synchronous backend invocation; nothing is carried over
/// between calls.
pub struct PoseEstimator<B: InferenceBackend> {
    backend: B,
    config: PoseConfig,
    metrics: Metrics,
}

impl<B: InferenceBackend> PoseEstimator<B> {
    /// Fails if `config` does not pass [`PoseConfig::validate`].
    pub fn new(backend: B, config: PoseConfig) -> anyhow::Result<Self> {
        config.validate()?;
        tracing::info!(
            batch_size = config.batch_size,
            num_joints = config.num_joints,
            stride = config.stride,
            location_refinement = config.location_refinement,
            "Pose estimator ready"
        );
        Ok(Self {
            backend,
            config,
            metrics: Metrics::init("pose"),
        })
    }

    pub fn config(&self) -> &PoseConfig {
        &self.config
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Pose of one `[H, W, 3]` image.
    pub fn predict(&mut self, image: ArrayView3<f32>) -> anyhow::Result<Pose> {
        Ok(self.predict_full(image)?.pose)
    }

    /// Like [`PoseEstimator::predict`] but also returns the confidence map and offsets.
    pub fn predict_full(&mut self, image: ArrayView3<f32>) -> anyhow::Result<PoseOutput> {
        let (height, width, _) = image.dim();
        let _span = tracing::info_span!("predict_image", height, width).entered();
        let start = Instant::now();

        let outputs = self.run_backend(image.insert_axis(Axis(0)))?;
        let SingleOutputs { scmap, locref } = extract_outputs(outputs, &self.config)?;
        let pose = argmax_pose_predict(
            scmap.view(),
            locref.as_ref().map(|l| l.view()),
            self.config.stride,
        )?;

        self.metrics
            .duration
            .record(start.elapsed().as_secs_f64(), &[]);
        tracing::trace!(joints = pose.len(), "Image decoded");

        Ok(PoseOutput {
            scmap,
            locref,
            pose,
        })
    }

    /// Poses of a `[N, H, W, 3]` batch, one `[x, y, c, ...]` row per image.
    ///
    /// `N` must equal the configured batch size.
    pub fn predict_batch(&mut self, images: ArrayView4<f32>) -> anyhow::Result<Array2<f32>> {
        let _span = tracing::info_span!("predict_batch", batch = images.dim().0).entered();
        let start = Instant::now();

        let BatchOutputs { scmap, locref } = self.run_batch(images)?;
        let poses = argmax_pose_predict_batch(
            scmap.view(),
            locref.as_ref().map(|l| l.view()),
            self.config.stride,
        )?;

        self.metrics
            .duration
            .record(start.elapsed().as_secs_f64(), &[]);

        Ok(poses)
    }

    /// Like [`PoseEstimator::predict_batch`] but also returns heat images and offsets.
    pub fn predict_batch_full(
        &mut self,
        images: ArrayView4<f32>,
    ) -> anyhow::Result<BatchPoseOutput> {
        let _span = tracing::info_span!("predict_batch_full", batch = images.dim().0).entered();
        let start = Instant::now();

        let BatchOutputs { scmap, locref } = self.run_batch(images)?;
        let poses = argmax_pose_predict_batch(
            scmap.view(),
            locref.as_ref().map(|l| l.view()),
            self.config.stride,
        )?;
        let scmap_imgs = confidence_images(scmap.view());

        self.metrics
            .duration
            .record(start.elapsed().as_secs_f64(), &[]);

        Ok(BatchPoseOutput {
            scmap_imgs,
            locref,
            poses,
        })
    }

    /// Poses of an assembled frame batch, with the padding rows dropped.
    pub fn predict_frames(&mut self, frames: &FrameBatch) -> anyhow::Result<Array2<f32>> {
        let poses = self.predict_batch(frames.tensor.view())?;
        Ok(poses.slice_move(s![..frames.len, ..]))
    }

    fn run_batch(&mut self, images: ArrayView4<f32>) -> anyhow::Result<BatchOutputs> {
        let batch = images.dim().0;
        if batch != self.config.batch_size {
            return Err(DecodeError::BatchSizeMismatch {
                expected: self.config.batch_size,
                actual: batch,
            }
            .into());
        }

        let outputs = self.run_backend(images)?;
        Ok(extract_outputs_batch(outputs, &self.config)?)
    }

    fn run_backend(&mut self, images: ArrayView4<f32>) -> anyhow::Result<Vec<ArrayD<f32>>> {
        let _infer_span = tracing::info_span!("model_inference").entered();

        tracing::trace!(shape = ?images.shape(), "Running backend");
        let outputs = self.backend.run(images.view())?;
        self.metrics.images.add(images.dim().0 as u64, &[]);

        tracing::debug!(
            outputs = outputs.len(),
            scmap_shape = ?outputs.first().map(|o| o.shape()),
            "Backend finished"
        );
        Ok(outputs)
    }
}
