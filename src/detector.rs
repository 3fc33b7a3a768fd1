use image::{GrayImage, RgbImage};
use imageproc::contrast::equalize_histogram;
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::{close, open};
use tracing::debug;

use crate::engine::ScanError;
use crate::extract::extract_quad;
use crate::frame::{rotate_upright_into, Frame};
use crate::geometry::Quadrilateral;
use crate::segmentation::{ProbabilityMask, SegmentationRunner};
use crate::types::DetectorConfig;

/// Reusable per-detector buffers, sized on first use and reallocated only
/// when the frame dimensions change.
struct ScratchBuffers {
    rgb: RgbImage,
    gray: GrayImage,
    upright: GrayImage,
}

impl ScratchBuffers {
    fn new() -> Self {
        Self {
            rgb: RgbImage::new(0, 0),
            gray: GrayImage::new(0, 0),
            upright: GrayImage::new(0, 0),
        }
    }

    fn rgb_for(&mut self, width: u32, height: u32) -> &mut RgbImage {
        if self.rgb.dimensions() != (width, height) {
            self.rgb = RgbImage::new(width, height);
        }
        &mut self.rgb
    }
}

/// A detection strategy, tried in the order given by [`STRATEGY_ORDER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Segmentation mask binarized over the configured threshold list.
    Mask,
    /// Gaussian blur followed by Canny edges.
    Edges,
}

/// Fallback chain: mask-guided detection first, classical edges second.
pub const STRATEGY_ORDER: [Strategy; 2] = [Strategy::Mask, Strategy::Edges];

/// Document boundary detector.
///
/// Two strategies run in order: mask-guided detection when a segmentation
/// model is loaded, then the classical blur/Canny pipeline as a fallback.
/// All per-frame allocations beyond what the image crates require internally
/// come from the detector's own scratch buffers, so a long-lived instance is
/// cheap to call on every preview frame.
pub struct DocumentDetector {
    cfg: DetectorConfig,
    segmentation: SegmentationRunner,
    scratch: ScratchBuffers,
}

impl DocumentDetector {
    /// Builds a detector, loading the segmentation model when the
    /// configuration names one. Model load failures are logged and degrade
    /// the detector to the classical strategy; construction never fails.
    pub fn new(cfg: DetectorConfig) -> Self {
        let segmentation = match &cfg.model_path {
            Some(path) => SegmentationRunner::load(path, &cfg.engine),
            None => SegmentationRunner::unavailable(),
        };
        Self::with_runner(cfg, segmentation)
    }

    /// Builds a detector around an already-constructed runner.
    pub fn with_runner(cfg: DetectorConfig, segmentation: SegmentationRunner) -> Self {
        Self {
            cfg,
            segmentation,
            scratch: ScratchBuffers::new(),
        }
    }

    pub fn has_segmentation(&self) -> bool {
        self.segmentation.is_loaded()
    }

    /// Detects the document boundary in a camera frame.
    ///
    /// The returned quadrilateral is in upright coordinates (after the
    /// frame's rotation hint is applied), corners in top-left, top-right,
    /// bottom-right, bottom-left order. `Ok(None)` means no boundary was
    /// found, which is the common case for empty or cluttered scenes.
    pub fn detect(&mut self, frame: &Frame) -> Result<Option<Quadrilateral>, ScanError> {
        frame.write_gray(&mut self.scratch.gray);
        // The upright buffer is moved out for the duration of the call so
        // the strategies can borrow the detector mutably.
        let taken = std::mem::replace(&mut self.scratch.upright, GrayImage::new(0, 0));
        let upright = rotate_upright_into(&self.scratch.gray, frame.rotation(), taken);
        let quad = self.detect_gray(&upright);
        self.scratch.upright = upright;
        Ok(quad)
    }

    /// Detection on an already-upright grayscale image, running each strategy
    /// in [`STRATEGY_ORDER`] until one succeeds. A strategy whose capability
    /// is missing (no loaded model) is skipped rather than counted as failed.
    pub fn detect_gray(&mut self, gray: &GrayImage) -> Option<Quadrilateral> {
        for strategy in STRATEGY_ORDER {
            let quad = match strategy {
                Strategy::Mask if self.segmentation.is_loaded() => self.detect_with_mask(gray),
                Strategy::Mask => None,
                Strategy::Edges => self.detect_classical(gray),
            };
            if quad.is_some() {
                return quad;
            }
        }
        None
    }

    /// Mask-guided strategy: histogram-equalized input goes through the
    /// segmentation model, and the probability mask is binarized at each
    /// configured threshold until one yields a valid quadrilateral.
    fn detect_with_mask(&mut self, gray: &GrayImage) -> Option<Quadrilateral> {
        let equalized = equalize_histogram(gray);

        let (width, height) = equalized.dimensions();
        let rgb = self.scratch.rgb_for(width, height);
        for (x, y, px) in equalized.enumerate_pixels() {
            let v = px[0];
            rgb.put_pixel(x, y, image::Rgb([v, v, v]));
        }

        let mask = self.segmentation.segment(&self.scratch.rgb)?;
        search_mask(&mask, &self.cfg)
    }

    /// Classical strategy: Gaussian blur then Canny edges, with the same
    /// contour filters as the mask path.
    fn detect_classical(&mut self, gray: &GrayImage) -> Option<Quadrilateral> {
        let blurred = gaussian_blur_f32(gray, self.cfg.blur_sigma);
        let edges = canny(&blurred, self.cfg.canny_low, self.cfg.canny_high);
        let quad = extract_quad(&edges, &self.cfg);
        if quad.is_some() {
            debug!("edge strategy found document boundary");
        }
        quad
    }
}

/// Threshold search over a probability mask: binarize at each configured
/// threshold in order, clean up with a morphological close then open, and
/// extract. The first threshold yielding a quadrilateral wins, so the most
/// permissive valid detection is preferred.
fn search_mask(mask: &ProbabilityMask, cfg: &DetectorConfig) -> Option<Quadrilateral> {
    let radius = cfg.morph_kernel_radius;
    for &threshold in &cfg.mask_thresholds {
        let binary = mask.binarize(threshold);
        // Close small holes first, then drop speckle noise.
        let cleaned = open(&close(&binary, Norm::L2, radius), Norm::L2, radius);
        if let Some(quad) = extract_quad(&cleaned, cfg) {
            debug!(threshold, "mask strategy found document boundary");
            return Some(quad);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Rotation;
    use crate::geometry::Point2f;
    use image::{imageops, Luma};

    fn document_scene() -> GrayImage {
        let mut img = GrayImage::new(400, 300);
        for y in 60..=240 {
            for x in 80..=320 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        img
    }

    // 100x100 mask: a strong-confidence rectangle with a weak-confidence
    // triangular roof attached. The loosest threshold binarizes both into a
    // five-cornered shape; stricter thresholds isolate the rectangle.
    fn roofed_mask() -> ProbabilityMask {
        let mut data = vec![0.0f32; 100 * 100];
        for y in 30..=80 {
            for x in 20..=80 {
                data[y * 100 + x] = 0.9;
            }
        }
        for y in 10..30 {
            let half_width = (y - 10) * 30 / 20;
            for x in (50 - half_width)..=(50 + half_width) {
                data[(y * 100 + x) as usize] = 0.35;
            }
        }
        ProbabilityMask::from_raw(100, 100, data).unwrap()
    }

    fn assert_close(actual: Point2f, expected: Point2f, tolerance: f32) {
        assert!(
            actual.distance(&expected) <= tolerance,
            "expected ~({}, {}), got ({}, {})",
            expected.x,
            expected.y,
            actual.x,
            actual.y
        );
    }

    #[test]
    fn classical_path_detects_bright_rectangle() {
        let mut detector = DocumentDetector::new(DetectorConfig::default());
        let quad = detector
            .detect_gray(&document_scene())
            .expect("rectangle expected");

        // Canny marks edges a pixel or two off the true boundary; allow for
        // that plus approximation slack.
        let tolerance = 3.5;
        assert_close(quad.top_left, Point2f::new(80.0, 60.0), tolerance);
        assert_close(quad.top_right, Point2f::new(320.0, 60.0), tolerance);
        assert_close(quad.bottom_right, Point2f::new(320.0, 240.0), tolerance);
        assert_close(quad.bottom_left, Point2f::new(80.0, 240.0), tolerance);
    }

    #[test]
    fn rotation_hint_normalizes_before_detection() {
        let upright = document_scene();
        let mut detector = DocumentDetector::new(DetectorConfig::default());
        let reference = detector.detect_gray(&upright).expect("rectangle expected");

        // A sensor reporting a 90 degree rotation delivers the scene turned a
        // quarter turn counter-clockwise; detection must undo that.
        let sensor = imageops::rotate270(&upright);
        let frame = Frame::from_gray(sensor, Rotation::Deg90).unwrap();
        let detected = detector
            .detect(&frame)
            .unwrap()
            .expect("rectangle expected");

        for (a, b) in detected.points().iter().zip(reference.points().iter()) {
            assert!(a.distance(b) <= 1.5);
        }
    }

    #[test]
    fn blank_frame_yields_none() {
        let mut detector = DocumentDetector::new(DetectorConfig::default());
        let frame = Frame::from_gray(GrayImage::new(200, 200), Rotation::Deg0).unwrap();
        assert!(detector.detect(&frame).unwrap().is_none());
    }

    #[test]
    fn mask_search_finds_quad_from_probability_mask() {
        let quad = search_mask(&roofed_mask(), &DetectorConfig::default())
            .expect("rectangle expected");
        let tolerance = 2.5;
        assert_close(quad.top_left, Point2f::new(20.0, 30.0), tolerance);
        assert_close(quad.top_right, Point2f::new(80.0, 30.0), tolerance);
        assert_close(quad.bottom_right, Point2f::new(80.0, 80.0), tolerance);
        assert_close(quad.bottom_left, Point2f::new(20.0, 80.0), tolerance);
    }

    #[test]
    fn mask_search_advances_past_malformed_loose_threshold() {
        let mask = roofed_mask();

        // At the loosest threshold alone the roof merges with the rectangle
        // into a five-cornered shape and nothing is found.
        let mut loose_only = DetectorConfig::default();
        loose_only.mask_thresholds = vec![0.3];
        assert!(search_mask(&mask, &loose_only).is_none());

        // The full list continues to a stricter threshold where the strong
        // rectangle stands alone.
        let quad = search_mask(&mask, &DetectorConfig::default()).expect("rectangle expected");
        assert_close(quad.top_left, Point2f::new(20.0, 30.0), 2.5);
    }

    #[test]
    fn empty_mask_yields_none_at_every_threshold() {
        let mask = ProbabilityMask::from_raw(64, 64, vec![0.0; 64 * 64]).unwrap();
        assert!(search_mask(&mask, &DetectorConfig::default()).is_none());
    }

    #[test]
    fn repeated_detection_reuses_scratch_buffers() {
        let mut detector = DocumentDetector::new(DetectorConfig::default());
        let frame = Frame::from_gray(document_scene(), Rotation::Deg0).unwrap();

        let first = detector.detect(&frame).unwrap().expect("rectangle expected");
        let second = detector.detect(&frame).unwrap().expect("rectangle expected");
        assert_eq!(first, second);

        // A differently-sized frame in between forces a reallocation.
        let small = Frame::from_gray(GrayImage::new(123, 77), Rotation::Deg0).unwrap();
        assert!(detector.detect(&small).unwrap().is_none());

        let third = detector.detect(&frame).unwrap().expect("rectangle expected");
        assert_eq!(first, third);
    }

    #[test]
    fn strategy_order_prefers_mask() {
        assert_eq!(STRATEGY_ORDER, [Strategy::Mask, Strategy::Edges]);
    }

    #[test]
    fn missing_model_degrades_to_classical() {
        let cfg = DetectorConfig::with_model("no/such/model.onnx".into());
        let mut detector = DocumentDetector::new(cfg);
        assert!(!detector.has_segmentation());
        assert!(detector.detect_gray(&document_scene()).is_some());
    }
}
