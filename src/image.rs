//! Cell-fill images of a scalar field.
//!
//! Each grid cell becomes one filled quad colored from color map 1 by the
//! mean of its four corner samples, linearly mapped from a caller-supplied
//! value range (values outside the range saturate at the ends of the map).
//! All geometry is built and transformed before anything reaches the
//! device.

use ndarray::ArrayView2;

use crate::color::Rgba;
use crate::contour::IndexWindow;
use crate::error::{PlotError, PlotResult};
use crate::stream::PlotStream;
use crate::transform::CoordTransform;
use crate::utils::math::clamp_unit;

/// Fills one quad per grid cell, colored along color map 1.
pub(crate) fn draw_image(
    stream: &mut PlotStream,
    field: ArrayView2<'_, f64>,
    window: &IndexWindow,
    value_min: f64,
    value_max: f64,
    transform: &dyn CoordTransform,
) -> PlotResult<()> {
    const OP: &str = "image";
    if !value_min.is_finite() || !value_max.is_finite() || value_max <= value_min {
        return Err(PlotError::invalid_argument(
            OP,
            format!("value range must be finite and increasing, got [{value_min}, {value_max}]"),
        ));
    }
    window.check(OP, field.dim())?;

    // Build and transform everything before the first device call.
    let span = value_max - value_min;
    let mut cells: Vec<(Rgba, [(f64, f64); 4])> = Vec::new();
    for i in window.i_begin..window.i_end.saturating_sub(1) {
        for j in window.j_begin..window.j_end.saturating_sub(1) {
            let samples = [
                field[[i, j]],
                field[[i + 1, j]],
                field[[i + 1, j + 1]],
                field[[i, j + 1]],
            ];
            if samples.iter().any(|v| !v.is_finite()) {
                continue;
            }
            let mean = samples.iter().sum::<f64>() / 4.0;
            let color = stream.cmap1().lookup(clamp_unit((mean - value_min) / span));
            let fi = i as f64;
            let fj = j as f64;
            let quad = [
                transform.evaluate(fi, fj)?,
                transform.evaluate(fi + 1.0, fj)?,
                transform.evaluate(fi + 1.0, fj + 1.0)?,
                transform.evaluate(fi, fj + 1.0)?,
            ];
            cells.push((color, quad));
        }
    }

    for (color, quad) in &cells {
        stream.set_device_color(OP, *color)?;
        stream.emit_world_fill_solid(OP, quad)?;
    }
    stream.restore_device_pen(OP)
}
