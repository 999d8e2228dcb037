//! Band fills between contour levels.
//!
//! A band is the region of the field where `shade_min <= f <= shade_max`.
//! Each grid cell contributes the part of its quad inside the band,
//! obtained by clipping the quad against both levels in value space with
//! the same linear interpolation the contour extractor uses, so band
//! edges and contour lines of the same level coincide. All geometry is
//! built and transformed before anything reaches the device.

use ndarray::ArrayView2;

use super::{level_polylines, IndexWindow};
use crate::color::Rgba;
use crate::error::{PlotError, PlotResult};
use crate::stream::PlotStream;
use crate::transform::CoordTransform;
use crate::utils::math::{lerp, unit_fraction};

/// Fill color selector for a shaded band.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum ShadeFill {
    /// A discrete color map 0 entry.
    Cmap0Index(usize),
    /// A continuous color map 1 position in `[0, 1]`.
    Cmap1Frac(f64),
}

/// Pen used to stroke one band boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundaryPen {
    /// Color map 0 index for the boundary stroke.
    pub color_index: usize,
    /// Stroke width in device pixels.
    pub width: f64,
}

/// Parameters for a single shaded band.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct ShadeParams {
    /// Lower band level (inclusive).
    pub shade_min: f64,
    /// Upper band level (inclusive). A band with `shade_max <= shade_min`
    /// draws nothing and is not an error.
    pub shade_max: f64,
    /// Fill color selector.
    pub fill: ShadeFill,
    /// Pen width used while filling.
    pub fill_width: f64,
    /// Optional contour stroked along the lower level.
    pub min_pen: Option<BoundaryPen>,
    /// Optional contour stroked along the upper level.
    pub max_pen: Option<BoundaryPen>,
}

impl Default for ShadeParams {
    fn default() -> Self {
        Self {
            shade_min: 0.0,
            shade_max: 1.0,
            fill: ShadeFill::Cmap1Frac(0.5),
            fill_width: 1.0,
            min_pen: None,
            max_pen: None,
        }
    }
}

/// Parameters for a ladder of consecutive bands.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct ShadesParams {
    /// Pen width used while filling every band.
    pub fill_width: f64,
    /// Optional pen for contour lines at the interior levels, drawn after
    /// all bands.
    pub contour_pen: Option<BoundaryPen>,
}

impl Default for ShadesParams {
    fn default() -> Self {
        Self {
            fill_width: 1.0,
            contour_pen: None,
        }
    }
}

/// Fills the band `[shade_min, shade_max]` of a scalar field.
pub(crate) fn draw_shade(
    stream: &mut PlotStream,
    field: ArrayView2<'_, f64>,
    window: &IndexWindow,
    params: &ShadeParams,
    defined: Option<&dyn Fn(f64, f64) -> bool>,
    transform: &dyn CoordTransform,
) -> PlotResult<()> {
    const OP: &str = "shade";
    if !params.shade_min.is_finite() || !params.shade_max.is_finite() {
        return Err(PlotError::invalid_argument(
            OP,
            format!(
                "band levels must be finite, got [{}, {}]",
                params.shade_min, params.shade_max
            ),
        ));
    }
    if params.shade_max <= params.shade_min {
        tracing::debug!(
            shade_min = params.shade_min,
            shade_max = params.shade_max,
            "empty shade band, nothing to draw"
        );
        return Ok(());
    }
    window.check(OP, field.dim())?;
    check_width(OP, params.fill_width)?;
    let fill = resolve_fill(stream, OP, params.fill)?;

    // Build and transform everything before the first device call.
    let polygons = band_polygons(
        &field,
        window,
        params.shade_min,
        params.shade_max,
        defined,
        transform,
    )?;
    let min_pen = boundary_geometry(stream, OP, params.min_pen, &field, window, params.shade_min, transform)?;
    let max_pen = boundary_geometry(stream, OP, params.max_pen, &field, window, params.shade_max, transform)?;

    stream.set_device_color(OP, fill)?;
    stream.set_device_width(OP, params.fill_width)?;
    for polygon in &polygons {
        stream.emit_world_fill_solid(OP, polygon)?;
    }
    for (color, width, lines) in [min_pen, max_pen].into_iter().flatten() {
        stream.set_device_color(OP, color)?;
        stream.set_device_width(OP, width)?;
        for line in &lines {
            stream.emit_world_polyline(OP, line)?;
        }
    }
    stream.restore_device_pen(OP)
}

/// Fills the bands between consecutive levels of a ladder, colored along
/// color map 1, then strokes the interior boundaries with the optional
/// contour pen.
///
/// Bands whose level pair is not strictly increasing are skipped with a
/// log entry; the remaining bands still draw.
pub(crate) fn draw_shades(
    stream: &mut PlotStream,
    field: ArrayView2<'_, f64>,
    window: &IndexWindow,
    levels: &[f64],
    params: &ShadesParams,
    defined: Option<&dyn Fn(f64, f64) -> bool>,
    transform: &dyn CoordTransform,
) -> PlotResult<()> {
    const OP: &str = "shades";
    if levels.len() < 2 {
        return Err(PlotError::invalid_argument(
            OP,
            format!("band ladder needs at least two levels, got {}", levels.len()),
        ));
    }
    window.check(OP, field.dim())?;
    check_width(OP, params.fill_width)?;

    let bands = levels.len() - 1;
    let mut built: Vec<(Rgba, Vec<Vec<(f64, f64)>>)> = Vec::with_capacity(bands);
    for k in 0..bands {
        let (lo, hi) = (levels[k], levels[k + 1]);
        if !lo.is_finite() || !hi.is_finite() || hi <= lo {
            tracing::warn!(band = k, lo, hi, "skipping band with non-increasing levels");
            continue;
        }
        let frac = if bands > 1 {
            k as f64 / (bands - 1) as f64
        } else {
            0.5
        };
        let color = stream.cmap1().lookup(frac);
        let polygons = band_polygons(&field, window, lo, hi, defined, transform)?;
        built.push((color, polygons));
    }
    let contour_pen = match params.contour_pen {
        Some(pen) => {
            check_width(OP, pen.width)?;
            let color = stream.cmap0_color(OP, pen.color_index)?;
            let mut lines = Vec::new();
            for &level in &levels[1..levels.len() - 1] {
                if level.is_finite() {
                    lines.extend(level_polylines(&field, window, level, transform)?);
                }
            }
            Some((color, pen.width, lines))
        }
        None => None,
    };

    stream.set_device_width(OP, params.fill_width)?;
    for (color, polygons) in &built {
        stream.set_device_color(OP, *color)?;
        for polygon in polygons {
            stream.emit_world_fill_solid(OP, polygon)?;
        }
    }
    if let Some((color, width, lines)) = contour_pen {
        stream.set_device_color(OP, color)?;
        stream.set_device_width(OP, width)?;
        for line in &lines {
            stream.emit_world_polyline(OP, line)?;
        }
    }
    stream.restore_device_pen(OP)
}

fn check_width(op: &'static str, width: f64) -> PlotResult<()> {
    if width.is_finite() && width > 0.0 {
        Ok(())
    } else {
        Err(PlotError::invalid_argument(
            op,
            format!("pen width must be positive and finite, got {width}"),
        ))
    }
}

fn resolve_fill(stream: &PlotStream, op: &'static str, fill: ShadeFill) -> PlotResult<Rgba> {
    match fill {
        ShadeFill::Cmap0Index(index) => stream.cmap0_color(op, index),
        ShadeFill::Cmap1Frac(frac) => {
            if !frac.is_finite() || !(0.0..=1.0).contains(&frac) {
                return Err(PlotError::invalid_argument(
                    op,
                    format!("color map 1 position must be in [0,1], got {frac}"),
                ));
            }
            Ok(stream.cmap1().lookup(frac))
        }
    }
}

type BoundaryGeometry = Option<(Rgba, f64, Vec<Vec<(f64, f64)>>)>;

fn boundary_geometry(
    stream: &PlotStream,
    op: &'static str,
    pen: Option<BoundaryPen>,
    field: &ArrayView2<'_, f64>,
    window: &IndexWindow,
    level: f64,
    transform: &dyn CoordTransform,
) -> PlotResult<BoundaryGeometry> {
    match pen {
        Some(pen) => {
            check_width(op, pen.width)?;
            let color = stream.cmap0_color(op, pen.color_index)?;
            let lines = level_polylines(field, window, level, transform)?;
            Ok(Some((color, pen.width, lines)))
        }
        None => Ok(None),
    }
}

/// Collects the in-band part of every cell as a world-space polygon.
///
/// Cells touching a non-finite sample are skipped, as are cells whose
/// centre the `defined` predicate rejects (the predicate sees world
/// coordinates).
fn band_polygons(
    field: &ArrayView2<'_, f64>,
    window: &IndexWindow,
    lo: f64,
    hi: f64,
    defined: Option<&dyn Fn(f64, f64) -> bool>,
    transform: &dyn CoordTransform,
) -> PlotResult<Vec<Vec<(f64, f64)>>> {
    let mut polygons = Vec::new();
    for i in window.i_begin..window.i_end.saturating_sub(1) {
        for j in window.j_begin..window.j_end.saturating_sub(1) {
            let fi = i as f64;
            let fj = j as f64;
            let corners = [
                (fi, fj, field[[i, j]]),
                (fi + 1.0, fj, field[[i + 1, j]]),
                (fi + 1.0, fj + 1.0, field[[i + 1, j + 1]]),
                (fi, fj + 1.0, field[[i, j + 1]]),
            ];
            if corners.iter().any(|&(_, _, v)| !v.is_finite()) {
                continue;
            }
            if corners.iter().all(|&(_, _, v)| v < lo) || corners.iter().all(|&(_, _, v)| v > hi) {
                continue;
            }
            let kept = clip_at_level(&corners, lo, true);
            let kept = clip_at_level(&kept, hi, false);
            if kept.len() < 3 {
                continue;
            }
            if let Some(defined) = defined {
                let (cx, cy) = transform.evaluate(fi + 0.5, fj + 0.5)?;
                if !defined(cx, cy) {
                    continue;
                }
            }
            let mut world = Vec::with_capacity(kept.len());
            for &(ci, cj, _) in &kept {
                world.push(transform.evaluate(ci, cj)?);
            }
            polygons.push(world);
        }
    }
    Ok(polygons)
}

/// Clips a polygon carried with per-vertex sample values against one
/// level, keeping the side selected by `keep_above`. Crossing points are
/// interpolated in value space, matching the contour extractor.
fn clip_at_level(
    poly: &[(f64, f64, f64)],
    level: f64,
    keep_above: bool,
) -> Vec<(f64, f64, f64)> {
    let inside = |v: f64| if keep_above { v >= level } else { v <= level };
    let mut out = Vec::with_capacity(poly.len() + 2);
    for k in 0..poly.len() {
        let p = poly[k];
        let q = poly[(k + 1) % poly.len()];
        let p_in = inside(p.2);
        if p_in {
            out.push(p);
        }
        if p_in != inside(q.2) {
            let t = unit_fraction(level, p.2, q.2);
            out.push((lerp(p.0, q.0, t), lerp(p.1, q.1, t), level));
        }
    }
    out
}
