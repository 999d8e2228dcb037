//! Page, subpage, viewport, and window geometry.
//!
//! A page is the whole device surface, addressed in normalized device
//! coordinates `[0,1] x [0,1]` with the origin at the lower left. Pages are
//! divided into an `nx x ny` grid of subpages, walked left to right and top
//! to bottom. Within the current subpage a viewport is placed (explicitly or
//! through the standard margin policy), and a world-coordinate window is
//! mapped onto that viewport.
//!
//! This module owns the geometry: rectangle types for the normalized and
//! world spaces, the subpage walker, viewport placement (including the
//! aspect-ratio fitting used by the standard environment), and the
//! window table consulted by the reverse device-to-world lookup.

use crate::device::DeviceCapabilities;
use crate::error::{PlotError, PlotResult};

/// Left margin of the standard viewport, in character heights. Wider than
/// the other margins to leave room for axis numbering.
const MARGIN_LEFT_CHARS: f64 = 8.0;
/// Right, top, and bottom margins of the standard viewport, in character
/// heights.
const MARGIN_CHARS: f64 = 5.0;

/// A rectangle in normalized device coordinates.
///
/// Both axes run over `[0,1]` across the full page, y increasing upward.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct NormRect {
    /// Left edge.
    pub x_min: f64,
    /// Right edge.
    pub x_max: f64,
    /// Bottom edge.
    pub y_min: f64,
    /// Top edge.
    pub y_max: f64,
}

impl NormRect {
    /// The full page.
    pub const FULL: Self = Self {
        x_min: 0.0,
        x_max: 1.0,
        y_min: 0.0,
        y_max: 1.0,
    };

    /// Creates a normalized rectangle, validating its bounds.
    ///
    /// # Arguments
    ///
    /// * `op` - Operation name used in error messages.
    /// * `x_min`, `x_max`, `y_min`, `y_max` - Edges, each in `[0,1]`, with
    ///   `min < max` on both axes.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] when an edge is non-finite,
    /// out of `[0,1]`, or the rectangle is empty or inverted.
    pub fn new(op: &'static str, x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> PlotResult<Self> {
        let edges = [x_min, x_max, y_min, y_max];
        if edges.iter().any(|v| !v.is_finite()) {
            return Err(PlotError::invalid_argument(
                op,
                format!("normalized rectangle has non-finite edge: [{x_min}, {x_max}] x [{y_min}, {y_max}]"),
            ));
        }
        if edges.iter().any(|&v| !(0.0..=1.0).contains(&v)) {
            return Err(PlotError::invalid_argument(
                op,
                format!("normalized rectangle exceeds [0,1]: [{x_min}, {x_max}] x [{y_min}, {y_max}]"),
            ));
        }
        if x_min >= x_max || y_min >= y_max {
            return Err(PlotError::invalid_argument(
                op,
                format!("normalized rectangle is empty or inverted: [{x_min}, {x_max}] x [{y_min}, {y_max}]"),
            ));
        }
        Ok(Self {
            x_min,
            x_max,
            y_min,
            y_max,
        })
    }

    /// Horizontal extent.
    #[inline]
    #[must_use]
    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    /// Vertical extent.
    #[inline]
    #[must_use]
    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    /// Returns `true` when the point lies inside the rectangle or on its
    /// boundary.
    #[inline]
    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }

    /// Places a fractional sub-rectangle inside this rectangle.
    ///
    /// The fractions are relative coordinates within `self`, so
    /// `place(0.0, 1.0, 0.0, 1.0)` returns `self` unchanged.
    #[must_use]
    pub fn place(&self, fx_min: f64, fx_max: f64, fy_min: f64, fy_max: f64) -> Self {
        Self {
            x_min: self.x_min + fx_min * self.width(),
            x_max: self.x_min + fx_max * self.width(),
            y_min: self.y_min + fy_min * self.height(),
            y_max: self.y_min + fy_max * self.height(),
        }
    }
}

/// A rectangle in world coordinates.
///
/// Axes may be mirrored: `x_min > x_max` is a legal window and flips the
/// horizontal axis (likewise for y). Spans are therefore signed.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct WorldRect {
    /// World coordinate mapped to the viewport's left edge.
    pub x_min: f64,
    /// World coordinate mapped to the viewport's right edge.
    pub x_max: f64,
    /// World coordinate mapped to the viewport's bottom edge.
    pub y_min: f64,
    /// World coordinate mapped to the viewport's top edge.
    pub y_max: f64,
}

impl WorldRect {
    /// Creates a world rectangle, validating its bounds.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] when an edge is non-finite or
    /// either axis has zero span. Mirrored axes are accepted.
    pub fn new(op: &'static str, x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> PlotResult<Self> {
        let edges = [x_min, x_max, y_min, y_max];
        if edges.iter().any(|v| !v.is_finite()) {
            return Err(PlotError::invalid_argument(
                op,
                format!("world rectangle has non-finite edge: [{x_min}, {x_max}] x [{y_min}, {y_max}]"),
            ));
        }
        if x_min == x_max || y_min == y_max {
            return Err(PlotError::invalid_argument(
                op,
                format!("world rectangle has zero span: [{x_min}, {x_max}] x [{y_min}, {y_max}]"),
            ));
        }
        Ok(Self {
            x_min,
            x_max,
            y_min,
            y_max,
        })
    }

    /// Signed horizontal span (negative for a mirrored x axis).
    #[inline]
    #[must_use]
    pub fn x_span(&self) -> f64 {
        self.x_max - self.x_min
    }

    /// Signed vertical span (negative for a mirrored y axis).
    #[inline]
    #[must_use]
    pub fn y_span(&self) -> f64 {
        self.y_max - self.y_min
    }

    /// Returns `true` when the world point lies inside the rectangle,
    /// regardless of axis orientation.
    #[must_use]
    pub fn contains(&self, wx: f64, wy: f64) -> bool {
        let (x_lo, x_hi) = if self.x_min <= self.x_max {
            (self.x_min, self.x_max)
        } else {
            (self.x_max, self.x_min)
        };
        let (y_lo, y_hi) = if self.y_min <= self.y_max {
            (self.y_min, self.y_max)
        } else {
            (self.y_max, self.y_min)
        };
        wx >= x_lo && wx <= x_hi && wy >= y_lo && wy <= y_hi
    }
}

/// How the standard environment fits the viewport to the window's aspect
/// ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum AxisScaling {
    /// The two axes scale independently; the viewport fills the area left
    /// by the standard margins.
    #[default]
    Independent,
    /// One world unit covers the same physical length on both axes; the
    /// slack axis is shrunk and centered.
    EqualScale,
    /// Equal scale on a square viewport: the largest centered square that
    /// fits within the standard margins.
    EqualScaleSquare,
}

/// Physical page size, used for margin and aspect computations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    /// Page width in millimetres.
    pub width_mm: f64,
    /// Page height in millimetres.
    pub height_mm: f64,
}

impl PageGeometry {
    /// Derives the physical page size from a device's capabilities.
    #[must_use]
    pub fn from_capabilities(caps: &DeviceCapabilities) -> Self {
        Self {
            width_mm: f64::from(caps.width_px) / caps.pixels_per_mm,
            height_mm: f64::from(caps.height_px) / caps.pixels_per_mm,
        }
    }
}

/// Walks the subpages of a page in reading order (left to right, top to
/// bottom).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct SubpageGrid {
    nx: usize,
    ny: usize,
    current: usize,
}

impl Default for SubpageGrid {
    /// A single full-page subpage.
    fn default() -> Self {
        Self {
            nx: 1,
            ny: 1,
            current: 0,
        }
    }
}

impl SubpageGrid {
    /// Creates a grid of `nx` columns by `ny` rows, positioned at the first
    /// subpage.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] when either count is zero.
    pub fn new(op: &'static str, nx: usize, ny: usize) -> PlotResult<Self> {
        if nx == 0 || ny == 0 {
            return Err(PlotError::invalid_argument(
                op,
                format!("subpage grid must be at least 1x1, got {nx}x{ny}"),
            ));
        }
        Ok(Self { nx, ny, current: 0 })
    }

    /// Number of subpages on a page.
    #[inline]
    #[must_use]
    pub fn count(&self) -> usize {
        self.nx * self.ny
    }

    /// Grid dimensions as `(nx, ny)`.
    #[inline]
    #[must_use]
    pub fn layout(&self) -> (usize, usize) {
        (self.nx, self.ny)
    }

    /// Zero-based index of the current subpage in reading order.
    #[inline]
    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Moves to the next subpage.
    ///
    /// Returns `true` when the walk wrapped past the last subpage back to
    /// the first, which means the caller must start a new page on the
    /// device.
    pub fn advance(&mut self) -> bool {
        if self.current + 1 < self.count() {
            self.current += 1;
            false
        } else {
            self.current = 0;
            true
        }
    }

    /// Jumps to a specific subpage by one-based index.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::Index`] when `one_based` is zero or exceeds the
    /// subpage count.
    pub fn select(&mut self, op: &'static str, one_based: usize) -> PlotResult<()> {
        if one_based == 0 || one_based > self.count() {
            return Err(PlotError::index(
                op,
                format!(
                    "subpage index {one_based} out of range 1..={}",
                    self.count()
                ),
            ));
        }
        self.current = one_based - 1;
        Ok(())
    }

    /// Repositions at the first subpage (begin-of-page).
    pub fn reset(&mut self) {
        self.current = 0;
    }

    /// The current subpage's rectangle in normalized device coordinates.
    #[must_use]
    pub fn rect(&self) -> NormRect {
        let col = self.current % self.nx;
        let row_from_top = self.current / self.nx;
        let row = self.ny - 1 - row_from_top;
        let w = 1.0 / self.nx as f64;
        let h = 1.0 / self.ny as f64;
        NormRect {
            x_min: col as f64 * w,
            x_max: (col + 1) as f64 * w,
            y_min: row as f64 * h,
            y_max: (row + 1) as f64 * h,
        }
    }
}

/// Places the standard viewport inside a subpage.
///
/// Reserves a left margin of [`MARGIN_LEFT_CHARS`] character heights and
/// [`MARGIN_CHARS`] character heights on the other three sides. When the
/// subpage is too small for the margins the full subpage is used instead.
#[must_use]
pub fn standard_viewport(page: &PageGeometry, subpage: NormRect, char_height_mm: f64) -> NormRect {
    let sub_w_mm = subpage.width() * page.width_mm;
    let sub_h_mm = subpage.height() * page.height_mm;
    let left_mm = MARGIN_LEFT_CHARS * char_height_mm;
    let other_mm = MARGIN_CHARS * char_height_mm;

    let fx_min = left_mm / sub_w_mm;
    let fx_max = 1.0 - other_mm / sub_w_mm;
    let fy_min = other_mm / sub_h_mm;
    let fy_max = 1.0 - other_mm / sub_h_mm;

    if fx_min >= fx_max || fy_min >= fy_max {
        tracing::warn!(
            sub_w_mm,
            sub_h_mm,
            char_height_mm,
            "subpage too small for standard margins, using full subpage"
        );
        return subpage;
    }
    subpage.place(fx_min, fx_max, fy_min, fy_max)
}

/// Places a viewport inside a subpage according to an aspect-ratio class.
///
/// Starts from the standard margins, then fits the largest viewport of the
/// requested class inside the remaining area:
///
/// - [`AxisScaling::Independent`] keeps the whole area.
/// - [`AxisScaling::EqualScale`] shrinks and centers the slack axis so one
///   world unit has the same physical length on both axes.
/// - [`AxisScaling::EqualScaleSquare`] takes the largest centered square.
#[must_use]
pub fn fitted_viewport(
    page: &PageGeometry,
    subpage: NormRect,
    window: &WorldRect,
    char_height_mm: f64,
    scaling: AxisScaling,
) -> NormRect {
    let standard = standard_viewport(page, subpage, char_height_mm);
    let avail_x_mm = standard.width() * page.width_mm;
    let avail_y_mm = standard.height() * page.height_mm;

    match scaling {
        AxisScaling::Independent => standard,
        AxisScaling::EqualScale => {
            let dx = window.x_span().abs();
            let dy = window.y_span().abs();
            // Compare world-units-per-mm across the axes; the denser axis
            // binds and the other is shrunk to match its scale.
            if dx * avail_y_mm < dy * avail_x_mm {
                let used_x_mm = dx * avail_y_mm / dy;
                let pad = 0.5 * (avail_x_mm - used_x_mm) / page.width_mm;
                NormRect {
                    x_min: standard.x_min + pad,
                    x_max: standard.x_max - pad,
                    ..standard
                }
            } else {
                let used_y_mm = dy * avail_x_mm / dx;
                let pad = 0.5 * (avail_y_mm - used_y_mm) / page.height_mm;
                NormRect {
                    y_min: standard.y_min + pad,
                    y_max: standard.y_max - pad,
                    ..standard
                }
            }
        }
        AxisScaling::EqualScaleSquare => {
            let side_mm = avail_x_mm.min(avail_y_mm);
            let pad_x = 0.5 * (avail_x_mm - side_mm) / page.width_mm;
            let pad_y = 0.5 * (avail_y_mm - side_mm) / page.height_mm;
            NormRect {
                x_min: standard.x_min + pad_x,
                x_max: standard.x_max - pad_x,
                y_min: standard.y_min + pad_y,
                y_max: standard.y_max - pad_y,
            }
        }
    }
}

/// One viewport/window pair defined on the current page.
///
/// The page keeps every pair in creation order; the reverse lookup in
/// [`device_to_world`] walks the list backwards so the most recently
/// defined window wins when viewports overlap.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct WindowEntry {
    /// The viewport rectangle in normalized device coordinates.
    pub viewport: NormRect,
    /// The world rectangle mapped onto that viewport.
    pub window: WorldRect,
}

impl WindowEntry {
    /// Maps a world point to normalized device coordinates.
    #[must_use]
    pub fn world_to_ndc(&self, wx: f64, wy: f64) -> (f64, f64) {
        let tx = (wx - self.window.x_min) / self.window.x_span();
        let ty = (wy - self.window.y_min) / self.window.y_span();
        (
            self.viewport.x_min + tx * self.viewport.width(),
            self.viewport.y_min + ty * self.viewport.height(),
        )
    }

    /// Maps a normalized device point to world coordinates.
    #[must_use]
    pub fn ndc_to_world(&self, rx: f64, ry: f64) -> (f64, f64) {
        let tx = (rx - self.viewport.x_min) / self.viewport.width();
        let ty = (ry - self.viewport.y_min) / self.viewport.height();
        (
            self.window.x_min + tx * self.window.x_span(),
            self.window.y_min + ty * self.window.y_span(),
        )
    }

    /// Whether the normalized device point falls inside this entry's
    /// viewport.
    #[inline]
    #[must_use]
    pub fn contains_ndc(&self, rx: f64, ry: f64) -> bool {
        self.viewport.contains(rx, ry)
    }
}

/// Reverse lookup from normalized device coordinates to world coordinates.
///
/// Searches the windows defined on the current page in reverse creation
/// order and returns the world point together with the zero-based index of
/// the first (most recently defined) entry whose viewport contains the
/// query point. Overlapping viewports are an expected use case for
/// multi-window overlays, so the last-match rule is part of the contract.
///
/// # Returns
///
/// `None` when no viewport on the page contains the point.
#[must_use]
pub fn device_to_world(entries: &[WindowEntry], rx: f64, ry: f64) -> Option<(f64, f64, usize)> {
    entries
        .iter()
        .enumerate()
        .rev()
        .find(|(_, entry)| entry.contains_ndc(rx, ry))
        .map(|(index, entry)| {
            let (wx, wy) = entry.ndc_to_world(rx, ry);
            (wx, wy, index)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx_eq::assert_approx_eq;

    fn page_a4ish() -> PageGeometry {
        PageGeometry {
            width_mm: 280.0,
            height_mm: 200.0,
        }
    }

    #[test]
    fn test_norm_rect_rejects_inverted_and_out_of_range() {
        assert!(NormRect::new("viewport", 0.4, 0.2, 0.0, 1.0).is_err());
        assert!(NormRect::new("viewport", -0.1, 0.5, 0.0, 1.0).is_err());
        assert!(NormRect::new("viewport", 0.0, 1.0, 0.3, 0.3).is_err());
        assert!(NormRect::new("viewport", 0.1, 0.9, 0.2, 0.8).is_ok());
    }

    #[test]
    fn test_world_rect_allows_mirrored_axes() {
        let w = WorldRect::new("window", 10.0, -10.0, 0.0, 5.0).unwrap();
        assert_approx_eq!(w.x_span(), -20.0);
        assert!(w.contains(-5.0, 2.5));
        assert!(WorldRect::new("window", 1.0, 1.0, 0.0, 5.0).is_err());
    }

    #[test]
    fn test_subpage_walk_is_reading_order() {
        let mut grid = SubpageGrid::new("subpages", 2, 2).unwrap();
        // First subpage is top-left.
        let first = grid.rect();
        assert_approx_eq!(first.x_min, 0.0);
        assert_approx_eq!(first.x_max, 0.5);
        assert_approx_eq!(first.y_min, 0.5);
        assert_approx_eq!(first.y_max, 1.0);

        assert!(!grid.advance());
        let second = grid.rect();
        assert_approx_eq!(second.x_min, 0.5);
        assert_approx_eq!(second.y_min, 0.5);

        assert!(!grid.advance());
        let third = grid.rect();
        assert_approx_eq!(third.x_min, 0.0);
        assert_approx_eq!(third.y_max, 0.5);

        assert!(!grid.advance());
        // Wrapping past the last subpage signals a new page.
        assert!(grid.advance());
        assert_eq!(grid.current_index(), 0);
    }

    #[test]
    fn test_subpage_select_is_one_based_and_bounded() {
        let mut grid = SubpageGrid::new("subpages", 3, 2).unwrap();
        grid.select("advance_page", 6).unwrap();
        assert_eq!(grid.current_index(), 5);
        assert!(grid.select("advance_page", 0).is_err());
        assert!(grid.select("advance_page", 7).is_err());
    }

    #[test]
    fn test_standard_viewport_reserves_wide_left_margin() {
        let page = page_a4ish();
        let vp = standard_viewport(&page, NormRect::FULL, 2.0);
        // 8 char heights of 2mm on a 280mm page.
        assert_approx_eq!(vp.x_min, 16.0 / 280.0);
        assert_approx_eq!(vp.x_max, 1.0 - 10.0 / 280.0);
        assert_approx_eq!(vp.y_min, 10.0 / 200.0);
        assert_approx_eq!(vp.y_max, 1.0 - 10.0 / 200.0);
    }

    #[test]
    fn test_standard_viewport_falls_back_when_margins_collapse() {
        let page = PageGeometry {
            width_mm: 20.0,
            height_mm: 20.0,
        };
        let sub = NormRect::FULL.place(0.0, 0.5, 0.0, 0.5);
        let vp = standard_viewport(&page, sub, 2.0);
        assert_eq!(vp, sub);
    }

    #[test]
    fn test_equal_scale_square_viewport_is_physically_square() {
        let page = page_a4ish();
        let window = WorldRect::new("window", 0.0, 1.0, 0.0, 1.0).unwrap();
        let vp = fitted_viewport(
            &page,
            NormRect::FULL,
            &window,
            2.0,
            AxisScaling::EqualScaleSquare,
        );
        let w_mm = vp.width() * page.width_mm;
        let h_mm = vp.height() * page.height_mm;
        assert_approx_eq!(w_mm, h_mm);
    }

    #[test]
    fn test_equal_scale_matches_world_units_per_mm() {
        let page = page_a4ish();
        // x spans 4 world units, y spans 1: x axis is denser and binds.
        let window = WorldRect::new("window", 0.0, 4.0, 0.0, 1.0).unwrap();
        let vp = fitted_viewport(&page, NormRect::FULL, &window, 2.0, AxisScaling::EqualScale);
        let per_mm_x = 4.0 / (vp.width() * page.width_mm);
        let per_mm_y = 1.0 / (vp.height() * page.height_mm);
        assert_approx_eq!(per_mm_x, per_mm_y, 1e-9);
    }

    #[test]
    fn test_window_mapping_round_trips() {
        let entry = WindowEntry {
            viewport: NormRect::new("viewport", 0.1, 0.9, 0.2, 0.8).unwrap(),
            window: WorldRect::new("window", -3.0, 7.0, 100.0, 50.0).unwrap(),
        };
        let (rx, ry) = entry.world_to_ndc(2.0, 75.0);
        let (wx, wy) = entry.ndc_to_world(rx, ry);
        assert_approx_eq!(wx, 2.0);
        assert_approx_eq!(wy, 75.0);
    }

    #[test]
    fn test_device_to_world_prefers_the_most_recent_window() {
        let first = WindowEntry {
            viewport: NormRect::new("viewport", 0.0, 0.6, 0.0, 1.0).unwrap(),
            window: WorldRect::new("window", 0.0, 1.0, 0.0, 1.0).unwrap(),
        };
        let second = WindowEntry {
            viewport: NormRect::new("viewport", 0.4, 1.0, 0.0, 1.0).unwrap(),
            window: WorldRect::new("window", 0.5, 1.5, 0.0, 1.0).unwrap(),
        };
        let entries = [first, second];

        // Point covered by both viewports resolves to the later window.
        let (wx, _wy, index) = device_to_world(&entries, 0.5, 0.5).unwrap();
        assert_eq!(index, 1);
        assert_approx_eq!(wx, 0.5 + (0.5 - 0.4) / 0.6);

        // Point covered by the first only.
        let (_, _, index) = device_to_world(&entries, 0.2, 0.5).unwrap();
        assert_eq!(index, 0);

        // Point covered by neither.
        assert!(device_to_world(&entries, 0.5, 1.5).is_none());
    }
}
