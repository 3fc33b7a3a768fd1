use image::{DynamicImage, GrayImage, Pixel, RgbImage};

use crate::engine::ScanError;

/// Rotation hint carried by a frame, as reported by the capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    pub fn degrees(self) -> i32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

enum FramePixels {
    Gray(GrayImage),
    Rgb(RgbImage),
}

/// One camera frame: pixel data plus the sensor rotation hint.
///
/// The frame is a value type; detection never retains a reference past the
/// call. Constructors reject zero-sized buffers so the pipeline can assume
/// non-empty input everywhere downstream.
pub struct Frame {
    pixels: FramePixels,
    rotation: Rotation,
}

impl Frame {
    pub fn from_gray(pixels: GrayImage, rotation: Rotation) -> Result<Self, ScanError> {
        check_dimensions(pixels.width(), pixels.height())?;
        Ok(Self {
            pixels: FramePixels::Gray(pixels),
            rotation,
        })
    }

    pub fn from_rgb(pixels: RgbImage, rotation: Rotation) -> Result<Self, ScanError> {
        check_dimensions(pixels.width(), pixels.height())?;
        Ok(Self {
            pixels: FramePixels::Rgb(pixels),
            rotation,
        })
    }

    pub fn from_dynamic(image: &DynamicImage, rotation: Rotation) -> Result<Self, ScanError> {
        match image {
            DynamicImage::ImageLuma8(gray) => Self::from_gray(gray.clone(), rotation),
            other => Self::from_rgb(other.to_rgb8(), rotation),
        }
    }

    /// Width of the raw buffer, before any rotation is applied.
    pub fn width(&self) -> u32 {
        match &self.pixels {
            FramePixels::Gray(img) => img.width(),
            FramePixels::Rgb(img) => img.width(),
        }
    }

    /// Height of the raw buffer, before any rotation is applied.
    pub fn height(&self) -> u32 {
        match &self.pixels {
            FramePixels::Gray(img) => img.height(),
            FramePixels::Rgb(img) => img.height(),
        }
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Writes the grayscale conversion of the raw pixels into `out`,
    /// reallocating it only when the dimensions differ.
    pub fn write_gray(&self, out: &mut GrayImage) {
        let (width, height) = (self.width(), self.height());
        if out.dimensions() != (width, height) {
            *out = GrayImage::new(width, height);
        }
        match &self.pixels {
            FramePixels::Gray(img) => out.copy_from_slice(img),
            FramePixels::Rgb(img) => {
                for (x, y, px) in img.enumerate_pixels() {
                    out.put_pixel(x, y, px.to_luma());
                }
            }
        }
    }

    /// Grayscale copy in sensor-upright orientation, so all downstream
    /// geometry is rotation-free.
    pub fn to_upright_gray(&self) -> GrayImage {
        let mut gray = GrayImage::new(0, 0);
        self.write_gray(&mut gray);
        rotate_upright(&gray, self.rotation)
    }
}

fn check_dimensions(width: u32, height: u32) -> Result<(), ScanError> {
    if width == 0 || height == 0 {
        return Err(ScanError::InvalidDimensions { width, height });
    }
    Ok(())
}

/// Applies the rotation hint, returning a new upright buffer.
///
/// 90 degrees maps to transpose+flip (a clockwise quarter turn), 180 to a
/// flip on both axes, 270 to the counter-clockwise quarter turn.
pub fn rotate_upright(img: &GrayImage, rotation: Rotation) -> GrayImage {
    rotate_upright_into(img, rotation, GrayImage::new(0, 0))
}

/// Like [`rotate_upright`], but writes into `out` and returns it, reusing
/// its storage when the dimensions already match. Every output pixel is
/// overwritten, so stale content in a reused buffer is harmless.
pub fn rotate_upright_into(img: &GrayImage, rotation: Rotation, mut out: GrayImage) -> GrayImage {
    let (width, height) = img.dimensions();
    let out_dims = match rotation {
        Rotation::Deg0 | Rotation::Deg180 => (width, height),
        Rotation::Deg90 | Rotation::Deg270 => (height, width),
    };
    if out.dimensions() != out_dims {
        out = GrayImage::new(out_dims.0, out_dims.1);
    }

    match rotation {
        Rotation::Deg0 => out.copy_from_slice(img),
        Rotation::Deg90 => {
            for (x, y, px) in img.enumerate_pixels() {
                out.put_pixel(height - 1 - y, x, *px);
            }
        }
        Rotation::Deg180 => {
            for (x, y, px) in img.enumerate_pixels() {
                out.put_pixel(width - 1 - x, height - 1 - y, *px);
            }
        }
        Rotation::Deg270 => {
            for (x, y, px) in img.enumerate_pixels() {
                out.put_pixel(y, width - 1 - x, *px);
            }
        }
    }
    out
}
