use std::path::Path;

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use ndarray::Array4;
use tracing::{debug, warn};

use crate::engine::{spatial_dims_from_shape, InferenceSession, ScanError};
use crate::types::EngineConfig;

/// Per-pixel document-region confidence, clamped to [0, 1].
///
/// Produced once per detection attempt, binarized over several thresholds,
/// then discarded.
#[derive(Clone)]
pub struct ProbabilityMask {
    buf: ImageBuffer<Luma<f32>, Vec<f32>>,
}

impl ProbabilityMask {
    /// Builds a mask from raw model output in row-major order, clamping every
    /// value into [0, 1]. Model outputs are not trusted to stay in range.
    pub fn from_raw(width: u32, height: u32, mut data: Vec<f32>) -> Option<Self> {
        if data.len() != (width as usize) * (height as usize) {
            return None;
        }
        for v in &mut data {
            *v = v.clamp(0.0, 1.0);
        }
        ImageBuffer::from_raw(width, height, data).map(|buf| Self { buf })
    }

    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.buf.get_pixel(x, y)[0]
    }

    /// Linear-interpolated resample. Values stay within [0, 1].
    pub fn resized(&self, width: u32, height: u32) -> Self {
        if (width, height) == self.buf.dimensions() {
            return self.clone();
        }
        Self {
            buf: imageops::resize(&self.buf, width, height, FilterType::Triangle),
        }
    }

    /// Binary image with 255 where confidence exceeds `threshold`, 0 elsewhere.
    pub fn binarize(&self, threshold: f32) -> GrayImage {
        GrayImage::from_fn(self.buf.width(), self.buf.height(), |x, y| {
            if self.buf.get_pixel(x, y)[0] > threshold {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }
}

/// Capability-checked segmentation strategy.
///
/// Loading is attempted once at construction; a missing or malformed model
/// asset leaves the runner in an unavailable state instead of failing, and
/// the detector degrades to the classical edge pipeline.
///
/// One runner is not safe for concurrent inference calls (`segment` takes
/// `&mut self`); callers that share an instance across threads must serialize
/// access.
pub struct SegmentationRunner {
    session: Option<InferenceSession>,
}

impl SegmentationRunner {
    pub fn load(model_path: &Path, engine_cfg: &EngineConfig) -> Self {
        match InferenceSession::from_file(model_path, engine_cfg) {
            Ok(session) => {
                let (height, width) = session.output_dims();
                debug!(height, width, model = %model_path.display(), "segmentation model loaded");
                Self {
                    session: Some(session),
                }
            }
            Err(err) => {
                warn!(
                    model = %model_path.display(),
                    error = %err,
                    "segmentation model unavailable, falling back to edge detection"
                );
                Self { session: None }
            }
        }
    }

    /// Runner with no model; `segment` always returns `None`.
    pub fn unavailable() -> Self {
        Self { session: None }
    }

    pub fn is_loaded(&self) -> bool {
        self.session.is_some()
    }

    /// One forward inference pass over `image`, returning a probability mask
    /// resized back to the input dimensions.
    ///
    /// Returns `None` when the model is not loaded or any step of the pass
    /// fails; a failed attempt is logged and skipped, never propagated.
    pub fn segment(&mut self, image: &RgbImage) -> Option<ProbabilityMask> {
        let session = self.session.as_mut()?;

        let (src_w, src_h) = image.dimensions();
        if src_w == 0 || src_h == 0 {
            return None;
        }

        // Input spatial dims follow the output tensor shape, as the model is
        // a same-resolution segmentation net.
        let (model_h, model_w) = session.output_dims();
        let resized = imageops::resize(image, model_w as u32, model_h as u32, FilterType::Triangle);

        // NHWC float input, each channel normalized from [0,255] to [-1,1].
        let mut input = Array4::<f32>::zeros((1, model_h, model_w, 3));
        for (x, y, px) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            input[[0, y, x, 0]] = (px[0] as f32 - 127.5) / 127.5;
            input[[0, y, x, 1]] = (px[1] as f32 - 127.5) / 127.5;
            input[[0, y, x, 2]] = (px[2] as f32 - 127.5) / 127.5;
        }

        let output = match session.run(&input) {
            Ok(output) => output,
            Err(err) => {
                warn!(error = %err, "segmentation inference failed, skipping mask");
                return None;
            }
        };

        let dims: Vec<i64> = output.shape().iter().map(|&d| d as i64).collect();
        let (out_h, out_w) = match spatial_dims_from_shape(&dims) {
            Ok(dims) => dims,
            Err(_) => {
                warn!(?dims, "unexpected segmentation output shape");
                return None;
            }
        };
        if output.len() != out_h * out_w {
            // More than one channel or batch entry; not the single-channel
            // probability map this pipeline expects.
            warn!(?dims, "segmentation output is not single-channel");
            return None;
        }

        let data: Vec<f32> = output.iter().copied().collect();
        let mask = ProbabilityMask::from_raw(out_w as u32, out_h as u32, data)?;
        Some(mask.resized(src_w, src_h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_clamps_out_of_range_values() {
        let mask = ProbabilityMask::from_raw(2, 1, vec![-0.3, 1.7]).unwrap();
        assert_eq!(mask.get(0, 0), 0.0);
        assert_eq!(mask.get(1, 0), 1.0);
    }

    #[test]
    fn from_raw_rejects_length_mismatch() {
        assert!(ProbabilityMask::from_raw(3, 3, vec![0.5; 8]).is_none());
    }

    #[test]
    fn binarize_splits_at_threshold() {
        let mask = ProbabilityMask::from_raw(2, 2, vec![0.2, 0.4, 0.6, 0.8]).unwrap();
        let binary = mask.binarize(0.5);
        assert_eq!(binary.get_pixel(0, 0)[0], 0);
        assert_eq!(binary.get_pixel(1, 0)[0], 0);
        assert_eq!(binary.get_pixel(0, 1)[0], 255);
        assert_eq!(binary.get_pixel(1, 1)[0], 255);
    }

    #[test]
    fn resized_keeps_values_in_range() {
        let mask = ProbabilityMask::from_raw(2, 2, vec![0.0, 1.0, 1.0, 0.0]).unwrap();
        let big = mask.resized(8, 8);
        assert_eq!(big.width(), 8);
        assert_eq!(big.height(), 8);
        for y in 0..8 {
            for x in 0..8 {
                let v = big.get(x, y);
                assert!((0.0..=1.0).contains(&v), "value {v} out of range");
            }
        }
    }

    #[test]
    fn unavailable_runner_reports_not_loaded_and_yields_no_mask() {
        let mut runner = SegmentationRunner::unavailable();
        assert!(!runner.is_loaded());
        assert!(runner.segment(&RgbImage::new(16, 16)).is_none());
    }

    #[test]
    fn missing_model_file_degrades_instead_of_failing() {
        let runner = SegmentationRunner::load(
            Path::new("definitely/not/a/model.onnx"),
            &EngineConfig::default(),
        );
        assert!(!runner.is_loaded());
    }
}
