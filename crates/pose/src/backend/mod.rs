use ndarray::{ArrayD, ArrayView4};

#[cfg(feature = "ort-backend")]
pub mod ort;

/// Forward pass of a heatmap pose network.
///
/// The backend is fed one NHWC batch of `f32` pixel values and returns its
/// raw outputs in a fixed order: the confidence map first, then the raw
/// location-refinement tensor when the model was configured to produce it.
pub trait InferenceBackend {
    fn run(&mut self, images: ArrayView4<f32>) -> anyhow::Result<Vec<ArrayD<f32>>>;
}

impl<B: InferenceBackend + ?Sized> InferenceBackend for Box<B> {
    fn run(&mut self, images: ArrayView4<f32>) -> anyhow::Result<Vec<ArrayD<f32>>> {
        (**self).run(images)
    }
}
