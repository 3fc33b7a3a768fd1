use image::GrayImage;
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use tracing::trace;

use crate::geometry::{bounding_rect, contour_area, Point2f, Quadrilateral};
use crate::types::DetectorConfig;

/// Searches a binary or edge image for a dominant four-vertex contour.
///
/// External contours only, tested largest-first since the document is
/// assumed to be the dominant foreground shape. Candidates are rejected when
/// they are too small relative to the frame, too extreme in aspect ratio to
/// be a tilted rectangle, or too sparse (low fill ratio); the first survivor
/// that approximates to exactly four vertices wins.
pub fn extract_quad(binary: &GrayImage, cfg: &DetectorConfig) -> Option<Quadrilateral> {
    let (width, height) = binary.dimensions();
    let frame_area = width as f64 * height as f64;
    if frame_area == 0.0 {
        return None;
    }

    let contours: Vec<Contour<i32>> = find_contours(binary);
    let mut candidates: Vec<(f64, &Contour<i32>)> = contours
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| (contour_area(&c.points), c))
        .collect();
    candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    for (area, contour) in candidates {
        if area < frame_area * cfg.min_area_ratio {
            continue;
        }

        let Some((_, _, rect_w, rect_h)) = bounding_rect(&contour.points) else {
            continue;
        };
        let rect_area = rect_w as f64 * rect_h as f64;
        let aspect_ratio = rect_w as f64 / rect_h as f64;
        let fill_ratio = area / rect_area;

        if aspect_ratio < cfg.aspect_ratio_range.0 || aspect_ratio > cfg.aspect_ratio_range.1 {
            trace!(aspect_ratio, "candidate rejected by aspect ratio");
            continue;
        }
        if fill_ratio < cfg.min_fill_ratio {
            trace!(fill_ratio, "candidate rejected by fill ratio");
            continue;
        }

        // Tolerance proportional to the perimeter, deliberately on the loose
        // side so an imperfectly traced tilted rectangle still collapses to
        // four vertices.
        let perimeter = arc_length(&contour.points, true);
        let approx = approximate_polygon_dp(&contour.points, cfg.approx_tolerance_factor * perimeter, true);
        if approx.len() != 4 {
            trace!(vertices = approx.len(), "polygon approximation is not a quadrilateral");
            continue;
        }

        let points = [
            Point2f::from(approx[0]),
            Point2f::from(approx[1]),
            Point2f::from(approx[2]),
            Point2f::from(approx[3]),
        ];
        return Some(Quadrilateral::from_points(points));
    }

    None
}
