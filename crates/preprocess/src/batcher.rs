use common::span;
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use ndarray::Array4;

const CHANNELS: usize = 3;

/// A fixed-size NHWC batch of `f32` pixel values ready for the backend.
#[derive(Debug)]
pub struct FrameBatch {
    /// `[batch_size, height, width, 3]`, raw 0-255 values
    pub tensor: Array4<f32>,
    /// Number of leading slots holding real frames; the rest are zero padding
    pub len: usize,
}

/// Accumulates RGB frames into a batch tensor of constant size.
///
/// The backend is always fed `batch_size` images. A partially filled batch is
/// zero padded on [`FrameBatcher::finish`] and callers keep only the first
/// `len` results.
pub struct FrameBatcher {
    batch_size: usize,
    input_size: Option<(u32, u32)>,
    frame_size: Option<(u32, u32)>,
    data: Vec<f32>,
    len: usize,
    resizer: Resizer,
}

impl FrameBatcher {
    /// `input_size` is `(width, height)`; when set every frame is resized to it.
    pub fn new(batch_size: usize, input_size: Option<(u32, u32)>) -> Self {
        Self {
            batch_size,
            input_size,
            frame_size: None,
            data: Vec::new(),
            len: 0,
            resizer: Resizer::new(),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.batch_size
    }

    /// Append one RGB frame in HWC byte order.
    pub fn push(&mut self, pixels: &[u8], width: u32, height: u32) -> anyhow::Result<()> {
        let _s = span!("batch_push");

        if self.is_full() {
            anyhow::bail!("Batch full: {} frames already queued", self.batch_size);
        }

        let expected_size = width as usize * height as usize * CHANNELS;
        if pixels.len() != expected_size {
            anyhow::bail!(
                "Buffer size mismatch: expected {} bytes for {}x{} RGB, got {} bytes",
                expected_size,
                width,
                height,
                pixels.len()
            );
        }

        let target = self.input_size.unwrap_or((width, height));
        if let Some(size) = self.frame_size {
            if size != target {
                anyhow::bail!(
                    "Frame size {}x{} does not match batch frame size {}x{}",
                    target.0,
                    target.1,
                    size.0,
                    size.1
                );
            }
        }

        tracing::trace!(
            width,
            height,
            target_width = target.0,
            target_height = target.1,
            slot = self.len,
            "Queueing frame"
        );

        // Nothing in the batcher changes until the frame is converted
        let resized;
        let frame = if (width, height) == target {
            pixels
        } else {
            let src = ImageRef::new(width, height, pixels, PixelType::U8x3)?;
            let mut dst = Image::new(target.0, target.1, PixelType::U8x3);
            self.resizer.resize(
                &src,
                &mut dst,
                &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
            )?;
            resized = dst;
            resized.buffer()
        };

        let slot_len = Self::slot_len(target);
        if self.frame_size.is_none() {
            self.data = vec![0.0; self.batch_size * slot_len];
        }
        let start = self.len * slot_len;
        write_slot(&mut self.data[start..start + slot_len], frame);

        self.frame_size = Some(target);
        self.len += 1;
        Ok(())
    }

    /// Hand out the accumulated batch and reset for the next one.
    pub fn finish(&mut self) -> anyhow::Result<FrameBatch> {
        let Some((width, height)) = self.frame_size.take() else {
            anyhow::bail!("Cannot finish an empty batch");
        };

        let len = std::mem::take(&mut self.len);
        let data = std::mem::take(&mut self.data);
        let tensor = Array4::from_shape_vec(
            (self.batch_size, height as usize, width as usize, CHANNELS),
            data,
        )?;

        tracing::debug!(len, batch_size = self.batch_size, "Batch assembled");

        Ok(FrameBatch { tensor, len })
    }

    fn slot_len((width, height): (u32, u32)) -> usize {
        width as usize * height as usize * CHANNELS
    }
}

#[inline]
fn write_slot(slot: &mut [f32], pixels: &[u8]) {
    for (dst, &src) in slot.iter_mut().zip(pixels) {
        *dst = src as f32;
    }
}
