//! Plane geometry for page boundary detection.
//!
//! Pure functions over [`Point`] slices: contour area, bounding box, corner
//! labelling and the destination size of a perspective warp. Perimeter and
//! polygon simplification come from `imageproc::geometry`.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl From<imageproc::point::Point<i32>> for Point {
    fn from(p: imageproc::point::Point<i32>) -> Self {
        Self::new(p.x as f64, p.y as f64)
    }
}

/// Four page corners, labelled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quad {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_right: Point,
    pub bottom_left: Point,
}

impl Quad {
    /// Corners in warp order: tl, tr, br, bl.
    pub fn corners(&self) -> [Point; 4] {
        [self.top_left, self.top_right, self.bottom_right, self.bottom_left]
    }
}

/// Axis-aligned box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.saturating_add(self.width) <= width
            && self.y.saturating_add(self.height) <= height
    }
}

/// Area enclosed by a closed polygon (shoelace formula).
pub fn polygon_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0.0;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        twice_area += p.x * q.y - q.x * p.y;
    }
    (twice_area / 2.0).abs()
}

/// Axis-aligned bounding box of a point set.
pub fn bounding_box(points: &[Point]) -> Option<BoundingBox> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    if min_x < 0.0 || min_y < 0.0 {
        return None;
    }
    Some(BoundingBox {
        x: min_x as u32,
        y: min_y as u32,
        width: (max_x - min_x) as u32 + 1,
        height: (max_y - min_y) as u32 + 1,
    })
}

/// Label four unordered points.
///
/// top-left minimizes x+y, bottom-right maximizes x+y, top-right minimizes y−x,
/// bottom-left maximizes y−x. Ties keep the earliest point in a canonical
/// (x, y) ordering so the result never depends on input order.
pub fn order_corners(points: [Point; 4]) -> Quad {
    let mut pts = points;
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));

    let pick = |key: &dyn Fn(&Point) -> f64, maximize: bool| -> Point {
        let mut best = pts[0];
        for p in &pts[1..] {
            let better = if maximize { key(p) > key(&best) } else { key(p) < key(&best) };
            if better {
                best = *p;
            }
        }
        best
    };

    let sum = |p: &Point| p.x + p.y;
    let diff = |p: &Point| p.y - p.x;

    Quad {
        top_left: pick(&sum, false),
        top_right: pick(&diff, false),
        bottom_right: pick(&sum, true),
        bottom_left: pick(&diff, true),
    }
}

/// Width and height of the flattened page for a labelled quad.
pub fn destination_size(quad: &Quad) -> (u32, u32) {
    let width = quad
        .bottom_right
        .distance(&quad.bottom_left)
        .max(quad.top_right.distance(&quad.top_left));
    let height = quad
        .top_right
        .distance(&quad.bottom_right)
        .max(quad.top_left.distance(&quad.bottom_left));
    (width as u32, height as u32)
}

/// Scale `(width, height)` down uniformly so it fits inside the source frame.
pub fn fit_within(size: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (w, h) = size;
    let (max_w, max_h) = bounds;
    if w <= max_w && h <= max_h {
        return size;
    }
    let scale = (max_w as f64 / w as f64).min(max_h as f64 / h as f64);
    let scaled_w = ((w as f64 * scale).floor() as u32).clamp(1, max_w);
    let scaled_h = ((h as f64 * scale).floor() as u32).clamp(1, max_h);
    (scaled_w, scaled_h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polygon_area() {
        let square = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        assert_eq!(polygon_area(&square), 100.0);
        assert_eq!(polygon_area(&square[..2]), 0.0);
    }

    #[test]
    fn test_order_corners_is_permutation_invariant() {
        let pts = [
            Point::new(12.0, 8.0),
            Point::new(205.0, 20.0),
            Point::new(190.0, 290.0),
            Point::new(5.0, 270.0),
        ];
        let expected = order_corners(pts);
        assert_eq!(expected.top_left, Point::new(12.0, 8.0));
        assert_eq!(expected.top_right, Point::new(205.0, 20.0));
        assert_eq!(expected.bottom_right, Point::new(190.0, 290.0));
        assert_eq!(expected.bottom_left, Point::new(5.0, 270.0));

        let mut idx = [0usize, 1, 2, 3];
        // Heap's algorithm over all 24 orderings
        let mut c = [0usize; 4];
        let mut i = 0;
        while i < 4 {
            if c[i] < i {
                if i % 2 == 0 {
                    idx.swap(0, i);
                } else {
                    idx.swap(c[i], i);
                }
                let permuted = [pts[idx[0]], pts[idx[1]], pts[idx[2]], pts[idx[3]]];
                assert_eq!(order_corners(permuted), expected);
                c[i] += 1;
                i = 0;
            } else {
                c[i] = 0;
                i += 1;
            }
        }
    }

    #[test]
    fn test_destination_size_uses_longest_edges() {
        let quad = order_corners([
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(110.0, 50.0),
            Point::new(0.0, 50.0),
        ]);
        assert_eq!(destination_size(&quad), (110, 50));
    }

    #[test]
    fn test_fit_within_preserves_ratio() {
        assert_eq!(fit_within((300, 200), (400, 400)), (300, 200));
        let (w, h) = fit_within((800, 400), (400, 400));
        assert_eq!((w, h), (400, 200));
    }

    #[test]
    fn test_bounding_box() {
        let bbox = bounding_box(&[Point::new(3.0, 4.0), Point::new(10.0, 2.0), Point::new(5.0, 9.0)])
            .unwrap();
        assert_eq!(bbox, BoundingBox { x: 3, y: 2, width: 8, height: 8 });
        assert!(bbox.fits_within(11, 10));
        assert!(!bbox.fits_within(10, 10));
        assert!(bounding_box(&[]).is_none());
    }
}
