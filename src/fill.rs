//! Polygon fill styles and hatch-line generation.
//!
//! A fill is either solid (one device polygon) or a hatch: one or two
//! families of parallel lines at a given angle and spacing, generated here
//! and emitted as ordinary clipped line segments. Patterns are selected by
//! preset index or supplied as custom families.
//!
//! Hatching works in device space so that line spacing is physical: the
//! polygon is rotated so the family becomes horizontal, scanned at the
//! family's spacing with even-odd pairing of edge crossings, and the
//! resulting segments are rotated back.

use crate::error::{PlotError, PlotResult};

/// One family of parallel hatch lines.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct HatchFamily {
    /// Line inclination in degrees, counter-clockwise from horizontal.
    pub angle_deg: f64,
    /// Distance between neighbouring lines in millimetres.
    pub spacing_mm: f64,
}

/// How polygons are filled.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum FillStyle {
    /// A single filled device polygon.
    #[default]
    Solid,
    /// One or two families of hatch lines.
    Hatch(Vec<HatchFamily>),
}

/// Default spacing of the preset hatch patterns, in millimetres.
const PRESET_SPACING_MM: f64 = 2.0;

impl FillStyle {
    /// Selects a fill pattern by preset index.
    ///
    /// Index 0 is solid fill; 1 through 8 are the classic hatch presets
    /// (horizontal, vertical, +-45 degrees, +-30 degrees, and the two
    /// cross-hatches).
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] for an index above 8.
    pub fn preset(op: &'static str, index: u8) -> PlotResult<Self> {
        let families: &[f64] = match index {
            0 => return Ok(Self::Solid),
            1 => &[0.0],
            2 => &[90.0],
            3 => &[45.0],
            4 => &[-45.0],
            5 => &[30.0],
            6 => &[-30.0],
            7 => &[0.0, 90.0],
            8 => &[45.0, -45.0],
            _ => {
                return Err(PlotError::invalid_argument(
                    op,
                    format!("fill pattern index {index} out of range 0..=8"),
                ));
            }
        };
        Ok(Self::Hatch(
            families
                .iter()
                .map(|&angle_deg| HatchFamily {
                    angle_deg,
                    spacing_mm: PRESET_SPACING_MM,
                })
                .collect(),
        ))
    }

    /// Builds a custom hatch from explicit line families.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] unless there are one or two
    /// families, every spacing is positive, and every angle is finite.
    pub fn custom(op: &'static str, families: Vec<HatchFamily>) -> PlotResult<Self> {
        if families.is_empty() || families.len() > 2 {
            return Err(PlotError::invalid_argument(
                op,
                format!("hatch needs 1 or 2 line families, got {}", families.len()),
            ));
        }
        for family in &families {
            if !family.angle_deg.is_finite() || !family.spacing_mm.is_finite() {
                return Err(PlotError::invalid_argument(
                    op,
                    "hatch family has non-finite angle or spacing",
                ));
            }
            if family.spacing_mm <= 0.0 {
                return Err(PlotError::invalid_argument(
                    op,
                    format!("hatch spacing must be positive, got {}", family.spacing_mm),
                ));
            }
        }
        Ok(Self::Hatch(families))
    }

    /// Whether this style fills with a solid polygon.
    #[inline]
    #[must_use]
    pub fn is_solid(&self) -> bool {
        matches!(self, Self::Solid)
    }
}

/// Generates the hatch segments of one line family across a polygon.
///
/// # Arguments
///
/// * `points` - Polygon vertices in device coordinates, treated as closed.
/// * `angle_deg` - Family inclination, counter-clockwise from horizontal.
/// * `spacing` - Distance between lines, in the same units as `points`.
///
/// # Returns
///
/// The visible hatch segments as point pairs in the input coordinate
/// space. Degenerate input (fewer than three vertices, non-positive
/// spacing) produces no segments.
#[must_use]
pub fn hatch_segments(
    points: &[(f64, f64)],
    angle_deg: f64,
    spacing: f64,
) -> Vec<((f64, f64), (f64, f64))> {
    if points.len() < 3 || spacing <= 0.0 || !spacing.is_finite() {
        return Vec::new();
    }

    let theta = angle_deg.to_radians();
    let (sin_t, cos_t) = theta.sin_cos();
    // Rotate by -theta so the family becomes horizontal scanlines.
    let rotated: Vec<(f64, f64)> = points
        .iter()
        .map(|&(x, y)| (x * cos_t + y * sin_t, y * cos_t - x * sin_t))
        .collect();

    let (mut y_lo, mut y_hi) = (f64::INFINITY, f64::NEG_INFINITY);
    for &(_, y) in &rotated {
        y_lo = y_lo.min(y);
        y_hi = y_hi.max(y);
    }
    if !y_lo.is_finite() || !y_hi.is_finite() {
        return Vec::new();
    }

    let mut segments = Vec::new();
    let mut crossings: Vec<f64> = Vec::new();
    // Align scanlines to the spacing grid so adjacent polygons hatch
    // consistently. A scanline exactly on the lower boundary would only
    // retrace the polygon edge, so start strictly above it.
    let mut scan_y = (y_lo / spacing).ceil() * spacing;
    if scan_y <= y_lo {
        scan_y += spacing;
    }
    while scan_y < y_hi {
        crossings.clear();
        let mut prev = rotated[rotated.len() - 1];
        for &cur in &rotated {
            // Half-open edge rule keeps a scanline through a vertex from
            // being counted twice.
            let crosses = (prev.1 <= scan_y && cur.1 > scan_y)
                || (cur.1 <= scan_y && prev.1 > scan_y);
            if crosses {
                let t = (scan_y - prev.1) / (cur.1 - prev.1);
                crossings.push(prev.0 + t * (cur.0 - prev.0));
            }
            prev = cur;
        }
        crossings.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        for pair in crossings.chunks_exact(2) {
            let (x_a, x_b) = (pair[0], pair[1]);
            // Rotate back by +theta.
            segments.push((
                (x_a * cos_t - scan_y * sin_t, x_a * sin_t + scan_y * cos_t),
                (x_b * cos_t - scan_y * sin_t, x_b * sin_t + scan_y * cos_t),
            ));
        }
        scan_y += spacing;
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx_eq::assert_approx_eq;

    #[test]
    fn test_preset_zero_is_solid_and_high_indices_fail() {
        assert!(FillStyle::preset("fill_style", 0).unwrap().is_solid());
        assert!(FillStyle::preset("fill_style", 9).is_err());
    }

    #[test]
    fn test_cross_hatch_presets_carry_two_families() {
        let FillStyle::Hatch(families) = FillStyle::preset("fill_style", 8).unwrap() else {
            panic!("preset 8 must be a hatch");
        };
        assert_eq!(families.len(), 2);
        assert_approx_eq!(families[0].angle_deg, 45.0);
        assert_approx_eq!(families[1].angle_deg, -45.0);
    }

    #[test]
    fn test_custom_hatch_validates_family_count_and_spacing() {
        let family = HatchFamily {
            angle_deg: 10.0,
            spacing_mm: 1.5,
        };
        assert!(FillStyle::custom("fill_style", vec![family]).is_ok());
        assert!(FillStyle::custom("fill_style", vec![]).is_err());
        assert!(FillStyle::custom("fill_style", vec![family; 3]).is_err());
        assert!(
            FillStyle::custom(
                "fill_style",
                vec![HatchFamily {
                    angle_deg: 0.0,
                    spacing_mm: 0.0,
                }]
            )
            .is_err()
        );
    }

    #[test]
    fn test_horizontal_hatch_spans_the_square() {
        // Offset square keeps scanlines off the polygon boundary.
        let square = [(0.1, 0.1), (1.1, 0.1), (1.1, 1.1), (0.1, 1.1)];
        let segments = hatch_segments(&square, 0.0, 0.4);
        assert_eq!(segments.len(), 2);
        for ((x1, y1), (x2, y2)) in segments {
            assert_approx_eq!(y1, y2);
            assert_approx_eq!((x2 - x1).abs(), 1.0);
        }
    }

    #[test]
    fn test_angled_hatch_segments_follow_the_family_angle() {
        let square = [(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0)];
        let segments = hatch_segments(&square, 45.0, 1.0);
        assert!(!segments.is_empty());
        for ((x1, y1), (x2, y2)) in segments {
            let run = x2 - x1;
            let rise = y2 - y1;
            assert!(run.abs() > 1e-12);
            assert_approx_eq!(rise / run, 1.0);
        }
    }

    #[test]
    fn test_concave_polygon_produces_split_scanlines() {
        // U shape: the scanline across the notch must yield two segments.
        let u_shape = [
            (0.0, 0.0),
            (3.0, 0.0),
            (3.0, 2.0),
            (2.0, 2.0),
            (2.0, 1.0),
            (1.0, 1.0),
            (1.0, 2.0),
            (0.0, 2.0),
        ];
        let segments = hatch_segments(&u_shape, 0.0, 1.5);
        // One grid-aligned scanline at y = 1.5, split by the notch.
        assert_eq!(segments.len(), 2);
        let mut spans: Vec<(f64, f64)> = segments
            .iter()
            .map(|&((x1, _), (x2, _))| (x1.min(x2), x1.max(x2)))
            .collect();
        spans.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        assert_approx_eq!(spans[0].0, 0.0);
        assert_approx_eq!(spans[0].1, 1.0);
        assert_approx_eq!(spans[1].0, 2.0);
        assert_approx_eq!(spans[1].1, 3.0);
    }

    #[test]
    fn test_degenerate_polygons_hatch_to_nothing() {
        assert!(hatch_segments(&[(0.0, 0.0), (1.0, 1.0)], 0.0, 1.0).is_empty());
        let square = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        assert!(hatch_segments(&square, 0.0, 0.0).is_empty());
    }
}
