use std::path::PathBuf;

/// ONNX Runtime session tuning.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub intra_op_num_threads: i32,
    pub inter_op_num_threads: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        // Use all available CPUs for intra-op parallelism
        let num_threads = std::thread::available_parallelism()
            .map(|n| n.get() as i32)
            .unwrap_or(4);

        Self {
            intra_op_num_threads: num_threads,
            inter_op_num_threads: 1, // Keep inter-op at 1 for better cache locality
        }
    }
}

/// Detection pipeline configuration.
///
/// The threshold list and filter ratios are tuned constants, not
/// algorithmically necessary values; they are plain fields so callers can
/// adjust them without touching the pipeline.
#[derive(Clone, Debug)]
pub struct DetectorConfig {
    /// Path to the segmentation model asset. `None` (or a missing/unreadable
    /// file) disables mask-guided detection; the detector then relies on the
    /// Canny fallback alone.
    pub model_path: Option<PathBuf>,

    /// Minimal area of a candidate contour relative to the full frame.
    /// Lower values detect smaller/partial documents while still filtering noise.
    pub min_area_ratio: f64,

    /// Accepted bounding-box width/height range. 0.25-4.0 allows fairly
    /// extreme tilt before a candidate is discarded.
    pub aspect_ratio_range: (f64, f64),

    /// Minimal contour-area / bounding-box-area ratio. Filters sparse and
    /// highly non-convex shapes; 0.35 still accepts partially visible documents.
    pub min_fill_ratio: f64,

    /// Polygon approximation tolerance as a fraction of the contour
    /// perimeter. Slightly larger than strict tracing would use, so a tilted
    /// rectangle collapses to a 4-point polygon more often.
    pub approx_tolerance_factor: f64,

    /// Probability thresholds to binarize the segmentation mask at, tried in
    /// order. Low-to-high, so the most permissive detection wins first and
    /// stricter cuts only run when the loose mask yields a malformed shape.
    pub mask_thresholds: Vec<f32>,

    /// Radius of the morphological close/open kernel applied to binarized masks.
    pub morph_kernel_radius: u8,

    /// Gaussian blur sigma for the Canny fallback path.
    pub blur_sigma: f32,

    /// Canny hysteresis thresholds.
    pub canny_low: f32,
    pub canny_high: f32,

    pub engine: EngineConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            min_area_ratio: 0.02,
            aspect_ratio_range: (0.25, 4.0),
            min_fill_ratio: 0.35,
            approx_tolerance_factor: 0.025,
            mask_thresholds: vec![0.3, 0.4, 0.5, 0.6, 0.7],
            morph_kernel_radius: 1,
            blur_sigma: 1.4,
            canny_low: 75.0,
            canny_high: 200.0,
            engine: EngineConfig::default(),
        }
    }
}

impl DetectorConfig {
    /// Default configuration with a segmentation model asset.
    pub fn with_model(model_path: PathBuf) -> Self {
        Self {
            model_path: Some(model_path),
            ..Self::default()
        }
    }
}
