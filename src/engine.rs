use std::path::Path;

use ndarray::{Array4, ArrayD};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{TensorRef, ValueType};

use crate::types::EngineConfig;

#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),

    #[error("image processing error: {0}")]
    Image(String),

    #[error("invalid frame dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("model output tensor has no usable spatial shape")]
    InvalidOutputShape,

    #[error("perspective transform error: {0}")]
    Transform(String),
}

/// ONNX Runtime session wrapper for the segmentation model.
///
/// The model's spatial dimensions are read from its output tensor shape at
/// load time rather than hardcoded, so the pipeline adapts to whatever model
/// asset is bundled.
pub struct InferenceSession {
    session: Session,
    output_height: usize,
    output_width: usize,
}

impl InferenceSession {
    pub fn from_file(model_path: &Path, engine_cfg: &EngineConfig) -> Result<Self, ScanError> {
        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?;

        if engine_cfg.intra_op_num_threads > 0 {
            builder = builder.with_intra_threads(engine_cfg.intra_op_num_threads as usize)?;
        }

        if engine_cfg.inter_op_num_threads > 0 {
            builder = builder.with_inter_threads(engine_cfg.inter_op_num_threads as usize)?;
        }

        let session = builder.commit_from_file(model_path)?;
        let (output_height, output_width) = output_spatial_dims(&session)?;

        Ok(Self {
            session,
            output_height,
            output_width,
        })
    }

    /// Spatial dimensions `(height, width)` of the model's output tensor.
    pub fn output_dims(&self) -> (usize, usize) {
        (self.output_height, self.output_width)
    }

    pub fn run(&mut self, input: &Array4<f32>) -> Result<ArrayD<f32>, ScanError> {
        let input_ref = TensorRef::from_array_view(input.view())?;
        let outputs = self.session.run(ort::inputs![input_ref])?;
        let tensor = outputs[0].try_extract_array::<f32>()?;
        Ok(tensor.into_owned())
    }
}

fn output_spatial_dims(session: &Session) -> Result<(usize, usize), ScanError> {
    let output = session.outputs.first().ok_or(ScanError::InvalidOutputShape)?;
    let ValueType::Tensor { shape, .. } = &output.output_type else {
        return Err(ScanError::InvalidOutputShape);
    };
    let dims: Vec<i64> = shape.iter().copied().collect();
    spatial_dims_from_shape(&dims)
}

/// Extracts `(height, width)` from a single-channel tensor shape.
///
/// Accepts `[N, H, W]`, NHWC `[N, H, W, C]` and NCHW `[N, C, H, W]` layouts
/// with a small channel count. Symbolic (negative) dimensions are rejected,
/// which makes a dynamically-shaped model count as unloadable.
pub(crate) fn spatial_dims_from_shape(dims: &[i64]) -> Result<(usize, usize), ScanError> {
    let (h, w) = match dims {
        [_, h, w] => (*h, *w),
        [_, c, h, w] if *c <= 4 && *w > 4 => (*h, *w),
        [_, h, w, c] if *c <= 4 => (*h, *w),
        [h, w] => (*h, *w),
        _ => return Err(ScanError::InvalidOutputShape),
    };

    if h <= 0 || w <= 0 {
        return Err(ScanError::InvalidOutputShape);
    }
    Ok((h as usize, w as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_parsing_nhwc() {
        assert_eq!(spatial_dims_from_shape(&[1, 256, 256, 1]).unwrap(), (256, 256));
        assert_eq!(spatial_dims_from_shape(&[1, 192, 320, 3]).unwrap(), (192, 320));
    }

    #[test]
    fn shape_parsing_nchw() {
        assert_eq!(spatial_dims_from_shape(&[1, 1, 256, 256]).unwrap(), (256, 256));
        assert_eq!(spatial_dims_from_shape(&[1, 3, 480, 640]).unwrap(), (480, 640));
    }

    #[test]
    fn shape_parsing_rank_three_and_two() {
        assert_eq!(spatial_dims_from_shape(&[1, 128, 96]).unwrap(), (128, 96));
        assert_eq!(spatial_dims_from_shape(&[64, 48]).unwrap(), (64, 48));
    }

    #[test]
    fn shape_parsing_rejects_dynamic_and_odd_ranks() {
        assert!(spatial_dims_from_shape(&[1, -1, -1, 1]).is_err());
        assert!(spatial_dims_from_shape(&[1]).is_err());
        assert!(spatial_dims_from_shape(&[1, 2, 3, 4, 5]).is_err());
        assert!(spatial_dims_from_shape(&[]).is_err());
    }
}
