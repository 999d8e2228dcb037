//! Pen line styles and font selection state.
//!
//! Line styles are mark/space dash patterns expanded in device space at
//! emission time, so dash lengths are physical regardless of the window
//! scale. Fonts are carried as an opaque font characterization integer
//! (FCI) that the core validates and passes through to the device's glyph
//! resolver without interpreting further.

use crate::error::{PlotError, PlotResult};

/// One mark/space element of a dash pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct DashPair {
    /// Pen-down length in millimetres. Zero draws a dot.
    pub mark_mm: f64,
    /// Pen-up length in millimetres.
    pub space_mm: f64,
}

/// How polylines are stroked.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum LineStyle {
    /// Continuous stroke.
    #[default]
    Solid,
    /// Repeating mark/space dash pattern.
    Dashed(Vec<DashPair>),
}

/// Longest accepted custom dash pattern.
const MAX_DASH_PAIRS: usize = 10;

impl LineStyle {
    /// Selects a line style by preset index.
    ///
    /// Index 1 is a continuous line; 2 through 8 are dash presets from
    /// fine dots up to long dash-dot patterns.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] for indices outside `1..=8`.
    pub fn preset(op: &'static str, index: u8) -> PlotResult<Self> {
        let pairs: &[(f64, f64)] = match index {
            1 => return Ok(Self::Solid),
            2 => &[(0.25, 0.75)],
            3 => &[(0.5, 0.5)],
            4 => &[(1.0, 1.0)],
            5 => &[(2.5, 2.5)],
            6 => &[(2.0, 1.0), (0.25, 1.0)],
            7 => &[(3.0, 1.5), (0.5, 1.5)],
            8 => &[(1.0, 0.5), (0.25, 0.5)],
            _ => {
                return Err(PlotError::invalid_argument(
                    op,
                    format!("line style index {index} out of range 1..=8"),
                ));
            }
        };
        Ok(Self::Dashed(
            pairs
                .iter()
                .map(|&(mark_mm, space_mm)| DashPair { mark_mm, space_mm })
                .collect(),
        ))
    }

    /// Builds a custom dash pattern.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] when the pattern is empty or
    /// longer than ten pairs, any length is negative or non-finite, or the
    /// whole pattern adds up to zero length.
    pub fn custom(op: &'static str, pairs: Vec<DashPair>) -> PlotResult<Self> {
        if pairs.is_empty() || pairs.len() > MAX_DASH_PAIRS {
            return Err(PlotError::invalid_argument(
                op,
                format!(
                    "dash pattern needs 1..={MAX_DASH_PAIRS} pairs, got {}",
                    pairs.len()
                ),
            ));
        }
        let mut total = 0.0;
        for pair in &pairs {
            if !pair.mark_mm.is_finite()
                || !pair.space_mm.is_finite()
                || pair.mark_mm < 0.0
                || pair.space_mm < 0.0
            {
                return Err(PlotError::invalid_argument(
                    op,
                    "dash pattern lengths must be finite and non-negative",
                ));
            }
            total += pair.mark_mm + pair.space_mm;
        }
        if total <= 0.0 {
            return Err(PlotError::invalid_argument(
                op,
                "dash pattern has zero total length",
            ));
        }
        Ok(Self::Dashed(pairs))
    }

    /// Whether this style strokes continuously.
    #[inline]
    #[must_use]
    pub fn is_solid(&self) -> bool {
        matches!(self, Self::Solid)
    }
}

/// Expands a polyline into pen-down runs according to a dash pattern.
///
/// The pattern phase carries across vertices, so a mark that spans a corner
/// produces one multi-point run rather than two broken ones. Zero-length
/// marks produce degenerate two-point runs the device may render as dots.
///
/// # Arguments
///
/// * `points` - Polyline vertices in device coordinates.
/// * `pattern` - Alternating `(mark, space)` lengths in device units; the
///   caller scales millimetre patterns by the device's pixel density.
///
/// # Returns
///
/// The pen-down runs in order. An all-zero pattern or a polyline with
/// fewer than two points returns the input as a single run (solid
/// fallback) or nothing, respectively.
#[must_use]
pub fn dash_runs(points: &[(f64, f64)], pattern: &[(f64, f64)]) -> Vec<Vec<(f64, f64)>> {
    if points.len() < 2 {
        return Vec::new();
    }
    // Flatten to alternating lengths; even indices are pen-down.
    let lengths: Vec<f64> = pattern
        .iter()
        .flat_map(|&(mark, space)| [mark, space])
        .collect();
    let total: f64 = lengths.iter().sum();
    if lengths.is_empty() || total <= 0.0 {
        return vec![points.to_vec()];
    }

    // Advances to the next pattern slot, emitting dot runs for zero-length
    // marks so the walk always makes progress.
    fn next_slot(
        lengths: &[f64],
        slot: &mut usize,
        rest: &mut f64,
        pen_down: &mut bool,
        runs: &mut Vec<Vec<(f64, f64)>>,
        at: (f64, f64),
    ) {
        loop {
            *slot = (*slot + 1) % lengths.len();
            *pen_down = !*pen_down;
            *rest = lengths[*slot];
            if *rest > 0.0 {
                break;
            }
            if *pen_down {
                runs.push(vec![at, at]);
            }
        }
    }

    let mut runs: Vec<Vec<(f64, f64)>> = Vec::new();
    let mut current: Vec<(f64, f64)> = vec![points[0]];
    let mut pen_down = true;
    let mut slot = 0usize;
    let mut rest = lengths[0];

    for pair in points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let edge_len = ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt();
        let mut walked = 0.0;

        while edge_len - walked > rest {
            walked += rest;
            let t = walked / edge_len;
            let cut = (a.0 + t * (b.0 - a.0), a.1 + t * (b.1 - a.1));
            if pen_down {
                current.push(cut);
                runs.push(std::mem::take(&mut current));
            } else {
                current = vec![cut];
            }
            next_slot(&lengths, &mut slot, &mut rest, &mut pen_down, &mut runs, cut);
            // A zero-length space lands pen-down again at the same cut.
            if pen_down && current.is_empty() {
                current.push(cut);
            }
        }
        rest -= edge_len - walked;
        if pen_down {
            current.push(b);
        }
    }
    if pen_down && current.len() >= 2 {
        runs.push(current);
    }
    runs
}

/// A font characterization integer.
///
/// Bit 31 marks the value as an FCI; the low three hex digits select the
/// font family, style, and weight. The core validates the digits and hands
/// the raw value through to the device's glyph resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Fci(u32);

impl Fci {
    /// The bit distinguishing an FCI from a legacy font index.
    pub const MARK: u32 = 0x8000_0000;

    const FAMILY_MAX: u32 = 4;
    const STYLE_MAX: u32 = 2;
    const WEIGHT_MAX: u32 = 1;

    /// Validates a raw FCI value.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] when the marker bit is
    /// missing, a digit exceeds its range (family `0..=4`, style `0..=2`,
    /// weight `0..=1`), or reserved digits are set.
    pub fn new(op: &'static str, raw: u32) -> PlotResult<Self> {
        if raw & Self::MARK == 0 {
            return Err(PlotError::invalid_argument(
                op,
                format!("value {raw:#010x} lacks the FCI marker bit"),
            ));
        }
        let payload = raw & !Self::MARK;
        if payload >> 12 != 0 {
            return Err(PlotError::invalid_argument(
                op,
                format!("FCI {raw:#010x} sets reserved digits"),
            ));
        }
        Self::from_parts(
            op,
            (payload & 0xf) as u8,
            ((payload >> 4) & 0xf) as u8,
            ((payload >> 8) & 0xf) as u8,
        )
    }

    /// Builds an FCI from its family, style, and weight digits.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] when a digit exceeds its
    /// range.
    pub fn from_parts(op: &'static str, family: u8, style: u8, weight: u8) -> PlotResult<Self> {
        if u32::from(family) > Self::FAMILY_MAX {
            return Err(PlotError::invalid_argument(
                op,
                format!("font family {family} out of range 0..={}", Self::FAMILY_MAX),
            ));
        }
        if u32::from(style) > Self::STYLE_MAX {
            return Err(PlotError::invalid_argument(
                op,
                format!("font style {style} out of range 0..={}", Self::STYLE_MAX),
            ));
        }
        if u32::from(weight) > Self::WEIGHT_MAX {
            return Err(PlotError::invalid_argument(
                op,
                format!("font weight {weight} out of range 0..={}", Self::WEIGHT_MAX),
            ));
        }
        Ok(Self(
            Self::MARK | u32::from(family) | (u32::from(style) << 4) | (u32::from(weight) << 8),
        ))
    }

    /// The raw 32-bit value passed to the glyph resolver.
    #[inline]
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Font family digit (0 sans, 1 serif, 2 mono, 3 script, 4 symbol).
    #[inline]
    #[must_use]
    pub fn family(self) -> u8 {
        (self.0 & 0xf) as u8
    }

    /// Font style digit (0 upright, 1 italic, 2 oblique).
    #[inline]
    #[must_use]
    pub fn style(self) -> u8 {
        ((self.0 >> 4) & 0xf) as u8
    }

    /// Font weight digit (0 medium, 1 bold).
    #[inline]
    #[must_use]
    pub fn weight(self) -> u8 {
        ((self.0 >> 8) & 0xf) as u8
    }
}

impl Default for Fci {
    /// Sans-serif, upright, medium.
    fn default() -> Self {
        Self(Self::MARK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx_eq::assert_approx_eq;

    #[test]
    fn test_preset_one_is_solid_and_bounds_are_enforced() {
        assert!(LineStyle::preset("line_style", 1).unwrap().is_solid());
        assert!(!LineStyle::preset("line_style", 4).unwrap().is_solid());
        assert!(LineStyle::preset("line_style", 0).is_err());
        assert!(LineStyle::preset("line_style", 9).is_err());
    }

    #[test]
    fn test_custom_pattern_rejects_degenerate_input() {
        let ok = DashPair {
            mark_mm: 1.0,
            space_mm: 0.5,
        };
        assert!(LineStyle::custom("dash_pattern", vec![ok]).is_ok());
        assert!(LineStyle::custom("dash_pattern", vec![]).is_err());
        assert!(
            LineStyle::custom(
                "dash_pattern",
                vec![DashPair {
                    mark_mm: 0.0,
                    space_mm: 0.0,
                }]
            )
            .is_err()
        );
        assert!(
            LineStyle::custom(
                "dash_pattern",
                vec![DashPair {
                    mark_mm: -1.0,
                    space_mm: 1.0,
                }]
            )
            .is_err()
        );
    }

    #[test]
    fn test_dash_runs_alternate_marks_and_spaces() {
        let line = [(0.0, 0.0), (10.0, 0.0)];
        let runs = dash_runs(&line, &[(2.0, 3.0)]);
        assert_eq!(runs.len(), 2);
        assert_approx_eq!(runs[0][0].0, 0.0);
        assert_approx_eq!(runs[0][1].0, 2.0);
        assert_approx_eq!(runs[1][0].0, 5.0);
        assert_approx_eq!(runs[1][1].0, 7.0);
    }

    #[test]
    fn test_mark_spanning_a_corner_stays_one_run() {
        let corner = [(0.0, 0.0), (4.0, 0.0), (4.0, 4.0)];
        let runs = dash_runs(&corner, &[(6.0, 2.0)]);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].len(), 3);
        assert_approx_eq!(runs[0][2].0, 4.0);
        assert_approx_eq!(runs[0][2].1, 2.0);
    }

    #[test]
    fn test_empty_pattern_falls_back_to_solid() {
        let line = [(0.0, 0.0), (1.0, 1.0)];
        let runs = dash_runs(&line, &[]);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].len(), 2);
    }

    #[test]
    fn test_fci_requires_marker_bit_and_valid_digits() {
        assert!(Fci::new("set_font", 0x0000_0001).is_err());
        assert!(Fci::new("set_font", 0x8000_0005).is_err());
        assert!(Fci::new("set_font", 0x8000_1000).is_err());
        let fci = Fci::new("set_font", 0x8000_0112).unwrap();
        assert_eq!(fci.family(), 2);
        assert_eq!(fci.style(), 1);
        assert_eq!(fci.weight(), 1);
    }

    #[test]
    fn test_fci_round_trips_through_parts() {
        let fci = Fci::from_parts("set_font", 3, 2, 1).unwrap();
        assert_eq!(Fci::new("set_font", fci.raw()).unwrap(), fci);
        assert!(Fci::from_parts("set_font", 5, 0, 0).is_err());
        assert_eq!(Fci::default().family(), 0);
    }
}
