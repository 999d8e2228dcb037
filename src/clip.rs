//! Rectangle clipping for line and polygon primitives.
//!
//! Every drawing operation is clipped against the active world-coordinate
//! window before anything reaches a device backend, so devices never see
//! coordinates outside the viewport. Two algorithms cover the primitive set:
//!
//! - Liang-Barsky parametric clipping for individual line segments
//! - Sutherland-Hodgman half-plane clipping for filled polygons
//!
//! Polylines are clipped segment by segment and re-chained into visible
//! runs, so a path that leaves and re-enters the window produces separate
//! device strokes rather than a spurious connecting line.

use crate::utils::math::nearly_equal;

/// An axis-aligned clipping rectangle.
///
/// Constructed from the active window bounds; `new` normalizes the corner
/// ordering so callers may pass descending axes (a window with `x_min >
/// x_max` is a legal, mirrored window).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipBox {
    /// Smallest x coordinate still inside the box.
    pub x_min: f64,
    /// Largest x coordinate still inside the box.
    pub x_max: f64,
    /// Smallest y coordinate still inside the box.
    pub y_min: f64,
    /// Largest y coordinate still inside the box.
    pub y_max: f64,
}

impl ClipBox {
    /// Creates a clipping rectangle spanning the two corner pairs.
    ///
    /// The corners may be given in either order along each axis.
    #[must_use]
    pub fn new(x_a: f64, x_b: f64, y_a: f64, y_b: f64) -> Self {
        Self {
            x_min: x_a.min(x_b),
            x_max: x_a.max(x_b),
            y_min: y_a.min(y_b),
            y_max: y_a.max(y_b),
        }
    }

    /// Returns `true` when the point lies inside the box or on its boundary.
    #[inline]
    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }
}

/// Clips one line segment against a rectangle using Liang-Barsky
/// parametric clipping.
///
/// # Arguments
///
/// * `clip` - The clipping rectangle.
/// * `start` - Segment start point.
/// * `end` - Segment end point.
///
/// # Returns
///
/// The visible portion of the segment as a `(start, end)` pair, or `None`
/// when the segment lies entirely outside the rectangle. A segment touching
/// the boundary at a single point yields that degenerate pair.
#[must_use]
pub fn clip_segment(
    clip: &ClipBox,
    start: (f64, f64),
    end: (f64, f64),
) -> Option<((f64, f64), (f64, f64))> {
    let (x1, y1) = start;
    let (x2, y2) = end;
    let dx = x2 - x1;
    let dy = y2 - y1;

    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;

    // One (p, q) pair per rectangle edge: left, right, bottom, top.
    let edges = [
        (-dx, x1 - clip.x_min),
        (dx, clip.x_max - x1),
        (-dy, y1 - clip.y_min),
        (dy, clip.y_max - y1),
    ];

    for (p, q) in edges {
        if p == 0.0 {
            // Parallel to this edge: outside the half-plane means gone.
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            if r > t0 {
                t0 = r;
            }
        } else {
            if r < t0 {
                return None;
            }
            if r < t1 {
                t1 = r;
            }
        }
    }

    Some((
        (x1 + t0 * dx, y1 + t0 * dy),
        (x1 + t1 * dx, y1 + t1 * dy),
    ))
}

/// Clips a polyline against a rectangle, splitting it into visible runs.
///
/// Consecutive segments whose clipped portions share an endpoint are
/// chained into a single run; a gap (the path leaving the rectangle)
/// starts a new run.
///
/// # Arguments
///
/// * `clip` - The clipping rectangle.
/// * `points` - Polyline vertices in order.
///
/// # Returns
///
/// Zero or more visible runs, each with at least two points. An input with
/// fewer than two points produces no runs.
#[must_use]
pub fn clip_polyline(clip: &ClipBox, points: &[(f64, f64)]) -> Vec<Vec<(f64, f64)>> {
    let mut runs: Vec<Vec<(f64, f64)>> = Vec::new();
    let mut current: Vec<(f64, f64)> = Vec::new();

    for pair in points.windows(2) {
        match clip_segment(clip, pair[0], pair[1]) {
            Some((a, b)) => {
                let connects = current
                    .last()
                    .is_some_and(|&(lx, ly)| nearly_equal(lx, a.0) && nearly_equal(ly, a.1));
                if connects {
                    current.push(b);
                } else {
                    if current.len() >= 2 {
                        runs.push(std::mem::take(&mut current));
                    } else {
                        current.clear();
                    }
                    current.push(a);
                    current.push(b);
                }
            }
            None => {
                if current.len() >= 2 {
                    runs.push(std::mem::take(&mut current));
                } else {
                    current.clear();
                }
            }
        }
    }
    if current.len() >= 2 {
        runs.push(current);
    }
    runs
}

/// One half-plane boundary of the clipping rectangle.
#[derive(Debug, Clone, Copy)]
enum Boundary {
    Left(f64),
    Right(f64),
    Bottom(f64),
    Top(f64),
}

impl Boundary {
    #[inline]
    fn inside(self, (x, y): (f64, f64)) -> bool {
        match self {
            Self::Left(x_min) => x >= x_min,
            Self::Right(x_max) => x <= x_max,
            Self::Bottom(y_min) => y >= y_min,
            Self::Top(y_max) => y <= y_max,
        }
    }

    /// Intersection of segment `a -> b` with this boundary line.
    ///
    /// Only called when the segment straddles the boundary, so the
    /// denominator is never zero.
    fn intersect(self, a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
        match self {
            Self::Left(x) | Self::Right(x) => {
                let t = (x - a.0) / (b.0 - a.0);
                (x, a.1 + t * (b.1 - a.1))
            }
            Self::Bottom(y) | Self::Top(y) => {
                let t = (y - a.1) / (b.1 - a.1);
                (a.0 + t * (b.0 - a.0), y)
            }
        }
    }
}

/// Clips a polygon against a rectangle using Sutherland-Hodgman
/// half-plane clipping.
///
/// # Arguments
///
/// * `clip` - The clipping rectangle.
/// * `points` - Polygon vertices in order; the polygon is treated as
///   closed (last vertex connects back to the first).
///
/// # Returns
///
/// The clipped polygon's vertices, or an empty vector when nothing of the
/// polygon lies inside the rectangle. Fewer than three input vertices
/// produce an empty vector.
#[must_use]
pub fn clip_polygon(clip: &ClipBox, points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    if points.len() < 3 {
        return Vec::new();
    }

    let boundaries = [
        Boundary::Left(clip.x_min),
        Boundary::Right(clip.x_max),
        Boundary::Bottom(clip.y_min),
        Boundary::Top(clip.y_max),
    ];

    let mut output: Vec<(f64, f64)> = points.to_vec();
    for boundary in boundaries {
        if output.is_empty() {
            break;
        }
        let input = std::mem::take(&mut output);
        let mut prev = input[input.len() - 1];
        for &cur in &input {
            match (boundary.inside(prev), boundary.inside(cur)) {
                (true, true) => output.push(cur),
                (true, false) => output.push(boundary.intersect(prev, cur)),
                (false, true) => {
                    output.push(boundary.intersect(prev, cur));
                    output.push(cur);
                }
                (false, false) => {}
            }
            prev = cur;
        }
    }

    if output.len() < 3 {
        return Vec::new();
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx_eq::assert_approx_eq;

    fn unit_box() -> ClipBox {
        ClipBox::new(0.0, 1.0, 0.0, 1.0)
    }

    #[test]
    fn test_new_normalizes_corner_order() {
        let b = ClipBox::new(5.0, -1.0, 3.0, 2.0);
        assert_approx_eq!(b.x_min, -1.0);
        assert_approx_eq!(b.x_max, 5.0);
        assert_approx_eq!(b.y_min, 2.0);
        assert_approx_eq!(b.y_max, 3.0);
    }

    #[test]
    fn test_segment_fully_inside_is_unchanged() {
        let clipped = clip_segment(&unit_box(), (0.2, 0.2), (0.8, 0.6)).unwrap();
        assert_approx_eq!(clipped.0.0, 0.2);
        assert_approx_eq!(clipped.0.1, 0.2);
        assert_approx_eq!(clipped.1.0, 0.8);
        assert_approx_eq!(clipped.1.1, 0.6);
    }

    #[test]
    fn test_segment_fully_outside_is_rejected() {
        assert!(clip_segment(&unit_box(), (1.5, 1.5), (2.0, 3.0)).is_none());
        // Parallel to an edge and outside it.
        assert!(clip_segment(&unit_box(), (-0.5, -0.2), (1.5, -0.2)).is_none());
    }

    #[test]
    fn test_segment_crossing_is_trimmed_to_the_boundary() {
        let clipped = clip_segment(&unit_box(), (-1.0, 0.5), (2.0, 0.5)).unwrap();
        assert_approx_eq!(clipped.0.0, 0.0);
        assert_approx_eq!(clipped.0.1, 0.5);
        assert_approx_eq!(clipped.1.0, 1.0);
        assert_approx_eq!(clipped.1.1, 0.5);
    }

    #[test]
    fn test_diagonal_through_corner_region_is_trimmed_on_both_ends() {
        let clipped = clip_segment(&unit_box(), (-0.5, 0.0), (1.0, 1.5)).unwrap();
        assert_approx_eq!(clipped.0.0, 0.0);
        assert_approx_eq!(clipped.0.1, 0.5);
        assert_approx_eq!(clipped.1.0, 0.5);
        assert_approx_eq!(clipped.1.1, 1.0);
    }

    #[test]
    fn test_polyline_leaving_and_reentering_splits_into_two_runs() {
        // In at x<=1, out over 1<x<2... the middle vertex sits outside.
        let clip = ClipBox::new(0.0, 1.0, 0.0, 10.0);
        let path = [(0.5, 1.0), (1.5, 2.0), (0.5, 3.0)];
        let runs = clip_polyline(&clip, &path);
        assert_eq!(runs.len(), 2);
        assert_approx_eq!(runs[0][0].0, 0.5);
        assert_approx_eq!(runs[0][1].0, 1.0);
        assert_approx_eq!(runs[1][0].0, 1.0);
        assert_approx_eq!(runs[1][1].0, 0.5);
    }

    #[test]
    fn test_polyline_inside_stays_one_run() {
        let path = [(0.1, 0.1), (0.5, 0.5), (0.9, 0.2)];
        let runs = clip_polyline(&unit_box(), &path);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].len(), 3);
    }

    #[test]
    fn test_polygon_overlapping_a_corner_gains_the_corner_vertex() {
        // Triangle poking past the upper-right corner of the unit box.
        let tri = [(0.5, 0.5), (2.0, 0.5), (0.5, 2.0)];
        let clipped = clip_polygon(&unit_box(), &tri);
        assert!(clipped.len() >= 5);
        assert!(
            clipped
                .iter()
                .all(|&(x, y)| unit_box().contains(x, y)),
            "clipped polygon must stay inside the box: {clipped:?}"
        );
        assert!(
            clipped
                .iter()
                .any(|&(x, y)| nearly_equal(x, 1.0) && nearly_equal(y, 1.0)),
            "corner vertex expected in {clipped:?}"
        );
    }

    #[test]
    fn test_polygon_outside_clips_to_nothing() {
        let tri = [(2.0, 2.0), (3.0, 2.0), (2.5, 3.0)];
        assert!(clip_polygon(&unit_box(), &tri).is_empty());
    }
}
