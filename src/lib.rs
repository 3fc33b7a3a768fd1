//! # DocuScan - Document Detection and Rectification
//!
//! DocuScan locates document boundaries in camera frames and warps the
//! detected region to an upright, perspective-corrected image. Detection
//! runs a neural segmentation model through ONNX Runtime when one is
//! available and falls back to a classical Canny edge pipeline when it is
//! not, so the library works with or without a model asset.
//!
//! ## Features
//!
//! - **Dual-strategy detection**: segmentation mask first, edges as fallback
//! - **Rotation aware**: frames carry the sensor's quarter-turn hint
//! - **Always captures**: a default inset crop applies when nothing is found
//! - **Pure Rust**: no OpenCV, image processing via `image` and `imageproc`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docuscan::{DetectorConfig, DocScanner};
//!
//! let config = DetectorConfig::with_model("models/seg.onnx".into());
//! let mut scanner = DocScanner::new(config);
//!
//! let result = scanner.capture_file("page.jpg")?;
//! if let Some(quad) = &result.detected {
//!     println!("document at {:?}", quad.points());
//! }
//! result.rectified.save("page_scanned.png")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Core modules
mod detector;
mod engine;
mod extract;
mod frame;
mod geometry;
mod rectify;
mod scanner;
mod segmentation;
mod types;

// Public API exports
pub use crate::detector::{DocumentDetector, Strategy, STRATEGY_ORDER};
pub use crate::engine::ScanError;
pub use crate::frame::{rotate_upright, Frame, Rotation};
pub use crate::geometry::{Point2f, Quadrilateral};
pub use crate::rectify::{default_quad, rectify, DEFAULT_INSET_RATIO};
pub use crate::scanner::{CaptureResult, DocScanner};
pub use crate::segmentation::{ProbabilityMask, SegmentationRunner};
pub use crate::types::{DetectorConfig, EngineConfig};
