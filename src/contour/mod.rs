//! Contour lines and level-band shading for gridded scalar fields.
//!
//! The engine samples a 2-D field on an index grid, walks its cells with
//! a marching-squares table, and hands finished world-space geometry to
//! the stream's drawing pipeline. Index coordinates stay internal: every
//! emitted point first passes through the caller's [`CoordTransform`].
//!
//! ## Module Organization
//!
//! - [`marching`](self) (private) — segment extraction and chaining in
//!   index space.
//! - [`shade`](self) (private) — band fills between levels.
//!
//! All routines buffer their geometry completely before the first device
//! call, so a failed transform or an out-of-range index window emits
//! nothing at all.

mod marching;
mod shade;

pub use shade::{BoundaryPen, ShadeFill, ShadeParams, ShadesParams};

pub(crate) use shade::{draw_shade, draw_shades};

use ndarray::ArrayView2;

use crate::error::{PlotError, PlotResult};
use crate::stream::PlotStream;
use crate::transform::CoordTransform;

/// Zero-based, half-open index sub-range of a field, `[i_begin, i_end) x
/// [j_begin, j_end)`.
///
/// The legacy one-based inclusive convention is translated here, in one
/// place, by [`IndexWindow::from_one_based`]; everything downstream works
/// half-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct IndexWindow {
    /// First row index (along the field's first axis).
    pub i_begin: usize,
    /// Past-the-end row index.
    pub i_end: usize,
    /// First column index (along the field's second axis).
    pub j_begin: usize,
    /// Past-the-end column index.
    pub j_end: usize,
}

impl IndexWindow {
    /// The window covering a whole field of the given dimensions.
    #[must_use]
    pub fn full(dims: (usize, usize)) -> Self {
        Self {
            i_begin: 0,
            i_end: dims.0,
            j_begin: 0,
            j_end: dims.1,
        }
    }

    /// Translates a one-based inclusive range pair, `kx..=lx` by
    /// `ky..=ly`, into an index window.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] when an index is zero (the
    /// ranges are one-based) or a range is reversed.
    pub fn from_one_based(
        op: &'static str,
        kx: usize,
        lx: usize,
        ky: usize,
        ly: usize,
    ) -> PlotResult<Self> {
        if kx == 0 || ky == 0 {
            return Err(PlotError::invalid_argument(
                op,
                format!("index ranges are one-based, got {kx}..={lx}, {ky}..={ly}"),
            ));
        }
        if lx < kx || ly < ky {
            return Err(PlotError::invalid_argument(
                op,
                format!("index ranges are reversed: {kx}..={lx}, {ky}..={ly}"),
            ));
        }
        Ok(Self {
            i_begin: kx - 1,
            i_end: lx,
            j_begin: ky - 1,
            j_end: ly,
        })
    }

    /// Validates the window against a field's dimensions.
    ///
    /// An empty window (begin equal to end) is legal and scans nothing.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::Index`] when an edge exceeds the field or a
    /// range is reversed.
    pub fn check(&self, op: &'static str, dims: (usize, usize)) -> PlotResult<()> {
        if self.i_begin > self.i_end || self.j_begin > self.j_end {
            return Err(PlotError::index(
                op,
                format!(
                    "index window is reversed: [{}, {}) x [{}, {})",
                    self.i_begin, self.i_end, self.j_begin, self.j_end
                ),
            ));
        }
        if self.i_end > dims.0 || self.j_end > dims.1 {
            return Err(PlotError::index(
                op,
                format!(
                    "index window [{}, {}) x [{}, {}) exceeds field dimensions {dims:?}",
                    self.i_begin, self.i_end, self.j_begin, self.j_end
                ),
            ));
        }
        Ok(())
    }
}

/// Extracts the iso-lines of one level and maps them to world space.
pub(super) fn level_polylines(
    field: &ArrayView2<'_, f64>,
    window: &IndexWindow,
    level: f64,
    transform: &dyn CoordTransform,
) -> PlotResult<Vec<Vec<(f64, f64)>>> {
    let chains = marching::chain_segments(marching::extract_segments(field, window, level));
    let mut lines = Vec::with_capacity(chains.len());
    for chain in chains {
        let mut world = Vec::with_capacity(chain.points.len());
        for &(ci, cj) in &chain.points {
            world.push(transform.evaluate(ci, cj)?);
        }
        lines.push(world);
    }
    Ok(lines)
}

/// Draws the contour lines of a scalar field at each requested level.
///
/// Levels are contoured independently, so an unsorted level sequence
/// changes nothing but the stroke order. Non-finite levels are skipped
/// with a log entry.
pub(crate) fn draw_contour(
    stream: &mut PlotStream,
    field: ArrayView2<'_, f64>,
    window: &IndexWindow,
    levels: &[f64],
    transform: &dyn CoordTransform,
) -> PlotResult<()> {
    const OP: &str = "contour";
    window.check(OP, field.dim())?;
    let mut lines = Vec::new();
    for &level in levels {
        if !level.is_finite() {
            tracing::warn!(level, "skipping non-finite contour level");
            continue;
        }
        lines.extend(level_polylines(&field, window, level, transform)?);
    }
    for line in &lines {
        stream.emit_world_polyline(OP, line)?;
    }
    Ok(())
}
