use imageproc::point::Point;

/// 2-D point in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Point2f {
    pub x: f32,
    pub y: f32,
}

impl Point2f {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2f) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl From<Point<i32>> for Point2f {
    fn from(p: Point<i32>) -> Self {
        Self::new(p.x as f32, p.y as f32)
    }
}

/// Four ordered corner points of a detected document boundary.
///
/// The order is always `top_left, top_right, bottom_right, bottom_left`,
/// tracing the boundary without self-intersection. Construction from
/// arbitrary point sets goes through [`Quadrilateral::from_points`], which
/// canonicalizes the order.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quadrilateral {
    pub top_left: Point2f,
    pub top_right: Point2f,
    pub bottom_right: Point2f,
    pub bottom_left: Point2f,
}

impl Quadrilateral {
    pub fn new(top_left: Point2f, top_right: Point2f, bottom_right: Point2f, bottom_left: Point2f) -> Self {
        Self {
            top_left,
            top_right,
            bottom_right,
            bottom_left,
        }
    }

    /// Canonicalizes four arbitrary points using the sum/difference method:
    /// top-left has the minimum `x + y`, bottom-right the maximum `x + y`,
    /// top-right the minimum `y - x`, bottom-left the maximum `y - x`.
    ///
    /// Ties are broken by the earliest index in the input, so the ordering is
    /// deterministic even for degenerate near-square inputs.
    pub fn from_points(points: [Point2f; 4]) -> Self {
        let mut tl = 0;
        let mut br = 0;
        let mut tr = 0;
        let mut bl = 0;

        for i in 1..4 {
            let s = points[i].x + points[i].y;
            if s < points[tl].x + points[tl].y {
                tl = i;
            }
            if s > points[br].x + points[br].y {
                br = i;
            }
            let d = points[i].y - points[i].x;
            if d < points[tr].y - points[tr].x {
                tr = i;
            }
            if d > points[bl].y - points[bl].x {
                bl = i;
            }
        }

        Self {
            top_left: points[tl],
            top_right: points[tr],
            bottom_right: points[br],
            bottom_left: points[bl],
        }
    }

    /// Corner points in canonical TL, TR, BR, BL order.
    pub fn points(&self) -> [Point2f; 4] {
        [self.top_left, self.top_right, self.bottom_right, self.bottom_left]
    }

    /// Destination canvas size for rectification.
    ///
    /// Each axis takes the longer of the two opposite edges so that no source
    /// content is lost to perspective foreshortening. The extra pixel makes a
    /// quadrilateral spanning the exact image bounds rectify to an image of
    /// the same dimensions.
    pub fn target_size(&self) -> (u32, u32) {
        let top = self.top_left.distance(&self.top_right);
        let bottom = self.bottom_left.distance(&self.bottom_right);
        let left = self.top_left.distance(&self.bottom_left);
        let right = self.top_right.distance(&self.bottom_right);

        let width = top.max(bottom).round().max(0.0) as u32 + 1;
        let height = left.max(right).round().max(0.0) as u32 + 1;
        (width, height)
    }
}

/// Enclosed area of a closed contour via the shoelace formula.
pub fn contour_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }

    let mut area = 0.0f64;
    for i in 0..points.len() {
        let j = (i + 1) % points.len();
        area += points[i].x as f64 * points[j].y as f64;
        area -= points[j].x as f64 * points[i].y as f64;
    }
    area.abs() / 2.0
}

/// Axis-aligned bounding rectangle `(x, y, width, height)` of a point set,
/// with width/height counted in pixels (inclusive bounds).
pub fn bounding_rect(points: &[Point<i32>]) -> Option<(i32, i32, u32, u32)> {
    let first = points.first()?;
    let mut min_x = first.x;
    let mut max_x = first.x;
    let mut min_y = first.y;
    let mut max_y = first.y;

    for p in &points[1..] {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }

    Some((min_x, min_y, (max_x - min_x + 1) as u32, (max_y - min_y + 1) as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_points() -> [Point2f; 4] {
        [
            Point2f::new(310.0, 55.0),  // top-right
            Point2f::new(78.0, 61.0),   // top-left
            Point2f::new(85.0, 243.0),  // bottom-left
            Point2f::new(321.0, 238.0), // bottom-right
        ]
    }

    #[test]
    fn from_points_orders_corners_canonically() {
        let quad = Quadrilateral::from_points(quad_points());
        assert_eq!(quad.top_left, Point2f::new(78.0, 61.0));
        assert_eq!(quad.top_right, Point2f::new(310.0, 55.0));
        assert_eq!(quad.bottom_right, Point2f::new(321.0, 238.0));
        assert_eq!(quad.bottom_left, Point2f::new(85.0, 243.0));
    }

    #[test]
    fn ordering_is_permutation_invariant() {
        let base = Quadrilateral::from_points(quad_points());
        let mut pts = quad_points();
        pts.rotate_left(2);
        pts.swap(0, 1);
        let permuted = Quadrilateral::from_points(pts);
        assert_eq!(base, permuted);
    }

    #[test]
    fn ordering_satisfies_sum_diff_extrema() {
        let quad = Quadrilateral::from_points(quad_points());
        let sum = |p: Point2f| p.x + p.y;
        let diff = |p: Point2f| p.y - p.x;

        for p in quad.points() {
            assert!(sum(quad.top_left) <= sum(p));
            assert!(sum(quad.bottom_right) >= sum(p));
            assert!(diff(quad.top_right) <= diff(p));
            assert!(diff(quad.bottom_left) >= diff(p));
        }
    }

    #[test]
    fn tie_break_takes_earliest_input_index() {
        let pts = [
            Point2f::new(0.0, 0.0),
            Point2f::new(10.0, 0.0),
            Point2f::new(10.0, 10.0),
            Point2f::new(0.0, 10.0),
        ];
        let quad = Quadrilateral::from_points(pts);
        assert_eq!(quad.top_left, Point2f::new(0.0, 0.0));
        assert_eq!(quad.top_right, Point2f::new(10.0, 0.0));
        assert_eq!(quad.bottom_right, Point2f::new(10.0, 10.0));
        assert_eq!(quad.bottom_left, Point2f::new(0.0, 10.0));

        // Degenerate input: all four points identical. Every role resolves to
        // index 0, deterministically.
        let p = Point2f::new(5.0, 5.0);
        let degenerate = Quadrilateral::from_points([p; 4]);
        assert_eq!(degenerate.points(), [p; 4]);
    }

    #[test]
    fn target_size_spans_longest_edges() {
        let quad = Quadrilateral::new(
            Point2f::new(0.0, 0.0),
            Point2f::new(99.0, 0.0),
            Point2f::new(99.0, 49.0),
            Point2f::new(0.0, 49.0),
        );
        assert_eq!(quad.target_size(), (100, 50));
    }

    #[test]
    fn contour_area_of_rectangle() {
        let pts = vec![
            Point::new(0, 0),
            Point::new(10, 0),
            Point::new(10, 5),
            Point::new(0, 5),
        ];
        assert!((contour_area(&pts) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn contour_area_degenerate_is_zero() {
        assert_eq!(contour_area(&[Point::new(3, 4)]), 0.0);
        assert_eq!(contour_area(&[Point::new(0, 0), Point::new(5, 5)]), 0.0);
    }

    #[test]
    fn bounding_rect_inclusive_extent() {
        let pts = vec![
            Point::new(2, 3),
            Point::new(12, 3),
            Point::new(12, 8),
            Point::new(2, 8),
        ];
        assert_eq!(bounding_rect(&pts), Some((2, 3, 11, 6)));
        assert_eq!(bounding_rect(&[]), None);
    }
}
