//! Index-to-world coordinate transforms.
//!
//! Contouring, shading, image and vector routines all sample data on an
//! (i, j) index grid but draw in world coordinates. A [`CoordTransform`]
//! decouples "which matrix cell" from "where in world space": consumers call
//! it per point, treat it as opaque, and never assume linearity.
//!
//! Three canonical forms are provided:
//!
//! - [`IdentityTransform`] — indices already are world coordinates.
//! - [`GridTransform1d`] — two 1-D coordinate arrays give independent,
//!   possibly non-uniform per-axis mappings.
//! - [`GridTransform2d`] — two 2-D coordinate grids give a fully general
//!   curvilinear mapping (e.g. map projections).
//!
//! Any `Fn(f64, f64) -> (f64, f64)` closure also works as a transform, for
//! callers with their own mapping. Ownership of grid data stays with the
//! caller; transforms only borrow it for the duration of one operation.

use crate::error::{PlotError, PlotResult};
use crate::utils::math::lerp;
use ndarray::ArrayView2;

/// A pure mapping from fractional grid indices to world coordinates.
///
/// Implementations must be deterministic and side-effect-free. Fractional
/// indices are routine — contour crossings interpolate between cells — so
/// `evaluate` is defined over continuous (i, j), not just integer pairs.
/// Indices beyond the grid clamp to the grid edge; non-finite indices are
/// rejected with [`PlotError::Index`] before any geometry is produced.
pub trait CoordTransform {
    /// Map the fractional index pair `(i, j)` to world `(x, y)`.
    fn evaluate(&self, i: f64, j: f64) -> PlotResult<(f64, f64)>;
}

impl<F> CoordTransform for F
where
    F: Fn(f64, f64) -> (f64, f64),
{
    fn evaluate(&self, i: f64, j: f64) -> PlotResult<(f64, f64)> {
        Ok(self(i, j))
    }
}

/// Transform that returns indices unchanged, for data whose matrix indices
/// already are world coordinates.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl CoordTransform for IdentityTransform {
    fn evaluate(&self, i: f64, j: f64) -> PlotResult<(f64, f64)> {
        reject_non_finite("identity_transform", i, j)?;
        Ok((i, j))
    }
}

/// Separable transform backed by two 1-D coordinate arrays.
///
/// `xg[i]` and `yg[j]` give the world coordinate of each grid line; spacing
/// may be non-uniform but the axes remain independent. Fractional indices
/// interpolate linearly between neighbouring grid lines.
#[derive(Debug, Clone, Copy)]
pub struct GridTransform1d<'a> {
    xg: &'a [f64],
    yg: &'a [f64],
}

impl<'a> GridTransform1d<'a> {
    /// Borrow two per-axis coordinate arrays.
    ///
    /// # Errors
    /// [`PlotError::InvalidArgument`] if either array is empty.
    pub fn new(xg: &'a [f64], yg: &'a [f64]) -> PlotResult<Self> {
        if xg.is_empty() || yg.is_empty() {
            return Err(PlotError::invalid_argument(
                "grid_transform_1d",
                format!(
                    "coordinate arrays must be non-empty (got {} x, {} y)",
                    xg.len(),
                    yg.len()
                ),
            ));
        }
        Ok(Self { xg, yg })
    }

    /// Grid extent as (x count, y count).
    pub fn dims(&self) -> (usize, usize) {
        (self.xg.len(), self.yg.len())
    }
}

impl CoordTransform for GridTransform1d<'_> {
    fn evaluate(&self, i: f64, j: f64) -> PlotResult<(f64, f64)> {
        reject_non_finite("grid_transform_1d", i, j)?;
        Ok((interp_axis(self.xg, i), interp_axis(self.yg, j)))
    }
}

/// Fully general curvilinear transform backed by two 2-D coordinate grids.
///
/// `xg[[i, j]]` and `yg[[i, j]]` give the world position of every grid node;
/// fractional indices interpolate bilinearly within the containing cell.
#[derive(Debug, Clone, Copy)]
pub struct GridTransform2d<'a> {
    xg: ArrayView2<'a, f64>,
    yg: ArrayView2<'a, f64>,
}

impl<'a> GridTransform2d<'a> {
    /// Borrow two node-position grids of identical shape.
    ///
    /// # Errors
    /// [`PlotError::InvalidArgument`] if the shapes differ or either
    /// dimension is zero.
    pub fn new(xg: ArrayView2<'a, f64>, yg: ArrayView2<'a, f64>) -> PlotResult<Self> {
        if xg.dim() != yg.dim() {
            return Err(PlotError::invalid_argument(
                "grid_transform_2d",
                format!(
                    "coordinate grids must share a shape (got {:?} and {:?})",
                    xg.dim(),
                    yg.dim()
                ),
            ));
        }
        let (ni, nj) = xg.dim();
        if ni == 0 || nj == 0 {
            return Err(PlotError::invalid_argument(
                "grid_transform_2d",
                "coordinate grids must be non-empty",
            ));
        }
        Ok(Self { xg, yg })
    }

    /// Grid extent as (i count, j count).
    pub fn dims(&self) -> (usize, usize) {
        self.xg.dim()
    }
}

impl CoordTransform for GridTransform2d<'_> {
    fn evaluate(&self, i: f64, j: f64) -> PlotResult<(f64, f64)> {
        reject_non_finite("grid_transform_2d", i, j)?;
        Ok((
            bilinear(&self.xg, i, j),
            bilinear(&self.yg, i, j),
        ))
    }
}

/// Piecewise-linear interpolation along one coordinate array, clamped to its
/// ends.
fn interp_axis(grid: &[f64], u: f64) -> f64 {
    let max = (grid.len() - 1) as f64;
    let u = u.clamp(0.0, max);
    let lo = u.floor() as usize;
    let hi = (lo + 1).min(grid.len() - 1);
    lerp(grid[lo], grid[hi], u - lo as f64)
}

/// Bilinear interpolation within a node-position grid, clamped to its edges.
fn bilinear(grid: &ArrayView2<'_, f64>, i: f64, j: f64) -> f64 {
    let (ni, nj) = grid.dim();
    let i = i.clamp(0.0, (ni - 1) as f64);
    let j = j.clamp(0.0, (nj - 1) as f64);
    let i0 = i.floor() as usize;
    let j0 = j.floor() as usize;
    let i1 = (i0 + 1).min(ni - 1);
    let j1 = (j0 + 1).min(nj - 1);
    let fi = i - i0 as f64;
    let fj = j - j0 as f64;

    let top = lerp(grid[[i0, j0]], grid[[i1, j0]], fi);
    let bottom = lerp(grid[[i0, j1]], grid[[i1, j1]], fi);
    lerp(top, bottom, fj)
}

fn reject_non_finite(op: &'static str, i: f64, j: f64) -> PlotResult<()> {
    if i.is_finite() && j.is_finite() {
        Ok(())
    } else {
        Err(PlotError::index(
            op,
            format!("non-finite grid index ({i}, {j})"),
        ))
    }
}
