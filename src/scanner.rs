use std::path::Path;

use image::DynamicImage;
use tracing::info;

use crate::detector::DocumentDetector;
use crate::engine::ScanError;
use crate::frame::{Frame, Rotation};
use crate::geometry::Quadrilateral;
use crate::rectify::rectify;
use crate::types::DetectorConfig;

/// Result of a still capture: the rectified document plus everything needed
/// to redo the crop with user-adjusted corners.
pub struct CaptureResult {
    /// Perspective-corrected document image.
    pub rectified: DynamicImage,
    /// The unmodified input image.
    pub original: DynamicImage,
    /// The detected boundary, `None` when detection found nothing.
    pub detected: Option<Quadrilateral>,
    /// The quadrilateral actually used for rectification; equals `detected`
    /// when detection succeeded, otherwise the default inset crop.
    pub effective: Quadrilateral,
}

/// High-level scanning facade combining detection and rectification.
///
/// Holds the detector (and with it the loaded segmentation session and
/// scratch buffers), so one scanner instance should be reused across frames
/// and captures.
pub struct DocScanner {
    detector: DocumentDetector,
}

impl DocScanner {
    pub fn new(cfg: DetectorConfig) -> Self {
        Self {
            detector: DocumentDetector::new(cfg),
        }
    }

    /// Boundary detection for live preview overlays.
    pub fn detect(&mut self, frame: &Frame) -> Result<Option<Quadrilateral>, ScanError> {
        self.detector.detect(frame)
    }

    /// Full still capture: detect the boundary and rectify the document.
    ///
    /// Always yields an image; when no boundary is found the default inset
    /// crop is applied instead.
    pub fn capture(&mut self, image: DynamicImage) -> Result<CaptureResult, ScanError> {
        let frame = Frame::from_dynamic(&image, Rotation::Deg0)?;
        let detected = self.detector.detect(&frame)?;
        let (rectified, effective) = rectify(&image, detected.as_ref())?;

        info!(
            detected = detected.is_some(),
            width = rectified.width(),
            height = rectified.height(),
            "capture complete"
        );

        Ok(CaptureResult {
            rectified,
            original: image,
            detected,
            effective,
        })
    }

    /// Loads an image from disk and captures it.
    pub fn capture_file<P: AsRef<Path>>(&mut self, path: P) -> Result<CaptureResult, ScanError> {
        let image = image::open(path.as_ref())
            .map_err(|e| ScanError::Image(format!("{}: {e}", path.as_ref().display())))?;
        self.capture(image)
    }
}
