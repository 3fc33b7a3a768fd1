use image::{DynamicImage, ImageBuffer, Pixel};
use nalgebra::{DMatrix, Matrix3};
use tracing::debug;

use crate::engine::ScanError;
use crate::geometry::{Point2f, Quadrilateral};

/// Margin of the substitute crop used when no boundary was detected,
/// as a fraction of each image dimension.
pub const DEFAULT_INSET_RATIO: f32 = 0.05;

/// Axis-aligned quadrilateral inset from the image borders, used in place of
/// a detected boundary so capture always yields a crop.
pub fn default_quad(width: u32, height: u32) -> Quadrilateral {
    let w = width as f32;
    let h = height as f32;
    let inset_x = w * DEFAULT_INSET_RATIO;
    let inset_y = h * DEFAULT_INSET_RATIO;
    Quadrilateral::new(
        Point2f::new(inset_x, inset_y),
        Point2f::new(w - inset_x, inset_y),
        Point2f::new(w - inset_x, h - inset_y),
        Point2f::new(inset_x, h - inset_y),
    )
}

/// Warps the region bounded by `quad` to an upright rectangle.
///
/// When `quad` is `None` the default inset crop is substituted, so this
/// always produces an image. The output size follows the quadrilateral's
/// edge lengths, which preserves the document's aspect ratio under moderate
/// perspective. Returns the rectified image together with the quadrilateral
/// that was actually applied.
pub fn rectify(
    image: &DynamicImage,
    quad: Option<&Quadrilateral>,
) -> Result<(DynamicImage, Quadrilateral), ScanError> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(ScanError::InvalidDimensions { width, height });
    }

    let effective = match quad {
        Some(q) => *q,
        None => {
            debug!("no detected boundary, applying default inset crop");
            default_quad(width, height)
        }
    };

    let (out_w, out_h) = effective.target_size();
    let src = effective.points().map(|p| [p.x, p.y]);
    let dst = [
        [0.0, 0.0],
        [(out_w - 1) as f32, 0.0],
        [(out_w - 1) as f32, (out_h - 1) as f32],
        [0.0, (out_h - 1) as f32],
    ];
    let matrix = perspective_transform(&src, &dst)?;

    let rectified = match image {
        DynamicImage::ImageLuma8(gray) => {
            DynamicImage::ImageLuma8(warp_into(gray, &matrix, out_w, out_h)?)
        }
        other => DynamicImage::ImageRgb8(warp_into(&other.to_rgb8(), &matrix, out_w, out_h)?),
    };

    Ok((rectified, effective))
}

/// Solves the 3x3 homography mapping `src_pts` onto `dst_pts`.
///
/// The 8-parameter linear system with the bottom-right element fixed at 1 is
/// tried first; degenerate configurations fall through to an SVD of the full
/// 9-parameter system.
fn perspective_transform(
    src_pts: &[[f32; 2]; 4],
    dst_pts: &[[f32; 2]; 4],
) -> Result<[[f64; 3]; 3], ScanError> {
    let mut a = DMatrix::<f64>::zeros(8, 8);
    let mut b = DMatrix::<f64>::zeros(8, 1);

    for i in 0..4 {
        let x = src_pts[i][0] as f64;
        let y = src_pts[i][1] as f64;
        let u = dst_pts[i][0] as f64;
        let v = dst_pts[i][1] as f64;

        a[(i, 0)] = x;
        a[(i, 1)] = y;
        a[(i, 2)] = 1.0;
        a[(i, 6)] = -u * x;
        a[(i, 7)] = -u * y;
        b[(i, 0)] = u;

        a[(i + 4, 3)] = x;
        a[(i + 4, 4)] = y;
        a[(i + 4, 5)] = 1.0;
        a[(i + 4, 6)] = -v * x;
        a[(i + 4, 7)] = -v * y;
        b[(i + 4, 0)] = v;
    }

    if let Some(solution) = a.clone().lu().solve(&b) {
        let residual = (&a * &solution - &b).norm();
        if residual < 1e-8 {
            return Ok([
                [solution[(0, 0)], solution[(1, 0)], solution[(2, 0)]],
                [solution[(3, 0)], solution[(4, 0)], solution[(5, 0)]],
                [solution[(6, 0)], solution[(7, 0)], 1.0],
            ]);
        }
    }

    // Full homogeneous system: the null-space direction of A, taken from the
    // eigenvector of A^T A with the smallest eigenvalue.
    let mut a9 = DMatrix::<f64>::zeros(8, 9);
    for i in 0..4 {
        let x = src_pts[i][0] as f64;
        let y = src_pts[i][1] as f64;
        let u = dst_pts[i][0] as f64;
        let v = dst_pts[i][1] as f64;

        a9[(i, 0)] = x;
        a9[(i, 1)] = y;
        a9[(i, 2)] = 1.0;
        a9[(i, 6)] = -u * x;
        a9[(i, 7)] = -u * y;
        a9[(i, 8)] = -u;

        a9[(i + 4, 3)] = x;
        a9[(i + 4, 4)] = y;
        a9[(i + 4, 5)] = 1.0;
        a9[(i + 4, 6)] = -v * x;
        a9[(i + 4, 7)] = -v * y;
        a9[(i + 4, 8)] = -v;
    }

    let ata = a9.transpose() * &a9;
    let svd = ata.svd(true, false);
    let u = svd
        .u
        .ok_or_else(|| ScanError::Transform("SVD failed".into()))?;
    let h = u.column(8);

    Ok([
        [h[0], h[1], h[2]],
        [h[3], h[4], h[5]],
        [h[6], h[7], h[8]],
    ])
}

fn invert_matrix_3x3(m: &[[f64; 3]; 3]) -> Result<[[f64; 3]; 3], ScanError> {
    let mat = Matrix3::new(
        m[0][0], m[0][1], m[0][2],
        m[1][0], m[1][1], m[1][2],
        m[2][0], m[2][1], m[2][2],
    );

    let inv = mat
        .try_inverse()
        .ok_or_else(|| ScanError::Transform("transform matrix is not invertible".into()))?;

    Ok([
        [inv[(0, 0)], inv[(0, 1)], inv[(0, 2)]],
        [inv[(1, 0)], inv[(1, 1)], inv[(1, 2)]],
        [inv[(2, 0)], inv[(2, 1)], inv[(2, 2)]],
    ])
}

/// Inverse-mapped warp with bilinear sampling, nearest neighbor at the
/// source edges where a full 2x2 neighborhood is unavailable.
fn warp_into<P>(
    src: &ImageBuffer<P, Vec<u8>>,
    matrix: &[[f64; 3]; 3],
    out_w: u32,
    out_h: u32,
) -> Result<ImageBuffer<P, Vec<u8>>, ScanError>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let mut out = ImageBuffer::new(out_w, out_h);
    let m_inv = invert_matrix_3x3(matrix)?;

    let (m00, m01, m02) = (m_inv[0][0], m_inv[0][1], m_inv[0][2]);
    let (m10, m11, m12) = (m_inv[1][0], m_inv[1][1], m_inv[1][2]);
    let (m20, m21, m22) = (m_inv[2][0], m_inv[2][1], m_inv[2][2]);
    let src_cols = src.width() as i32;
    let src_rows = src.height() as i32;
    let channels = P::CHANNEL_COUNT as usize;

    for y in 0..out_h {
        let y_f = y as f64;
        let m01y = m01 * y_f;
        let m11y = m11 * y_f;
        let m21y = m21 * y_f;

        for x in 0..out_w {
            let x_f = x as f64;
            let src_x_h = m00 * x_f + m01y + m02;
            let src_y_h = m10 * x_f + m11y + m12;
            let w = m20 * x_f + m21y + m22;

            let src_x_f = src_x_h / w;
            let src_y_f = src_y_h / w;

            let x0 = src_x_f.floor() as i32;
            let y0 = src_y_f.floor() as i32;
            let x1 = x0 + 1;
            let y1 = y0 + 1;

            if x0 >= 0 && x1 < src_cols && y0 >= 0 && y1 < src_rows {
                let fx = src_x_f - x0 as f64;
                let fy = src_y_f - y0 as f64;

                let p00 = src.get_pixel(x0 as u32, y0 as u32);
                let p10 = src.get_pixel(x1 as u32, y0 as u32);
                let p01 = src.get_pixel(x0 as u32, y1 as u32);
                let p11 = src.get_pixel(x1 as u32, y1 as u32);

                let mut blended = *p00;
                let slice = blended.channels_mut();
                for c in 0..channels {
                    slice[c] = ((1.0 - fx) * (1.0 - fy) * p00.channels()[c] as f64
                        + fx * (1.0 - fy) * p10.channels()[c] as f64
                        + (1.0 - fx) * fy * p01.channels()[c] as f64
                        + fx * fy * p11.channels()[c] as f64) as u8;
                }
                out.put_pixel(x, y, blended);
            } else if x0 >= 0 && x0 < src_cols && y0 >= 0 && y0 < src_rows {
                out.put_pixel(x, y, *src.get_pixel(x0 as u32, y0 as u32));
            }
        }
    }

    Ok(out)
}
