//! Vector field plots: one arrow per grid node.
//!
//! Arrow shafts point along the local `(u, v)` components in world space,
//! scaled by a fixed factor or, when the factor is non-positive, by an
//! automatic scale that keeps the longest arrow at half the smallest cell
//! extent. Geometry is buffered completely before the first device call.

use ndarray::ArrayView2;

use crate::error::{PlotError, PlotResult};
use crate::stream::PlotStream;
use crate::transform::CoordTransform;

/// Arrow head proportions.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct ArrowStyle {
    /// Barb length as a fraction of the shaft length.
    pub head_length: f64,
    /// Angle between each barb and the shaft, in degrees.
    pub head_angle_deg: f64,
}

impl Default for ArrowStyle {
    fn default() -> Self {
        Self {
            head_length: 0.3,
            head_angle_deg: 27.0,
        }
    }
}

/// Parameters for [`crate::StreamHandle::vector_field`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct VectorParams {
    /// World units of shaft per unit of vector magnitude. Zero or
    /// negative selects the automatic scale.
    pub scale: f64,
    /// Arrow head proportions.
    pub style: ArrowStyle,
}

/// Draws one arrow per grid node of a two-component field.
pub(crate) fn draw_vectors(
    stream: &mut PlotStream,
    u: ArrayView2<'_, f64>,
    v: ArrayView2<'_, f64>,
    params: &VectorParams,
    transform: &dyn CoordTransform,
) -> PlotResult<()> {
    const OP: &str = "vector_field";
    if u.dim() != v.dim() {
        return Err(PlotError::invalid_argument(
            OP,
            format!(
                "vector components must share a shape (got {:?} and {:?})",
                u.dim(),
                v.dim()
            ),
        ));
    }
    let style = params.style;
    if !style.head_length.is_finite()
        || style.head_length < 0.0
        || !style.head_angle_deg.is_finite()
    {
        return Err(PlotError::invalid_argument(
            OP,
            format!(
                "arrow head must have finite proportions (length {}, angle {})",
                style.head_length, style.head_angle_deg
            ),
        ));
    }

    let max_magnitude = max_magnitude(&u, &v);
    if max_magnitude == 0.0 {
        tracing::debug!("all vectors are zero or undefined, nothing to draw");
        return Ok(());
    }
    let scale = if params.scale > 0.0 && params.scale.is_finite() {
        params.scale
    } else {
        0.5 * min_cell_extent(u.dim(), transform)? / max_magnitude
    };

    // Buffer every arrow before the first device call.
    let (ni, nj) = u.dim();
    let mut strokes: Vec<Vec<(f64, f64)>> = Vec::new();
    for i in 0..ni {
        for j in 0..nj {
            let (du, dv) = (u[[i, j]], v[[i, j]]);
            if !du.is_finite() || !dv.is_finite() {
                continue;
            }
            let (x, y) = transform.evaluate(i as f64, j as f64)?;
            let (sx, sy) = (du * scale, dv * scale);
            let length = sx.hypot(sy);
            if length == 0.0 {
                continue;
            }
            let tip = (x + sx, y + sy);
            strokes.push(vec![(x, y), tip]);

            let angle = sy.atan2(sx);
            let barb = style.head_angle_deg.to_radians();
            let reach = style.head_length * length;
            let left = (
                tip.0 - reach * (angle - barb).cos(),
                tip.1 - reach * (angle - barb).sin(),
            );
            let right = (
                tip.0 - reach * (angle + barb).cos(),
                tip.1 - reach * (angle + barb).sin(),
            );
            strokes.push(vec![left, tip, right]);
        }
    }
    for stroke in &strokes {
        stream.emit_world_polyline(OP, stroke)?;
    }
    Ok(())
}

/// Largest finite vector magnitude, or zero when none exists.
fn max_magnitude(u: &ArrayView2<'_, f64>, v: &ArrayView2<'_, f64>) -> f64 {
    u.iter()
        .zip(v.iter())
        .filter(|(du, dv)| du.is_finite() && dv.is_finite())
        .map(|(du, dv)| du.hypot(*dv))
        .fold(0.0, f64::max)
}

/// Smallest world-space distance between adjacent grid nodes, used by the
/// automatic arrow scale. Falls back to 1.0 for a grid without extent.
fn min_cell_extent(dims: (usize, usize), transform: &dyn CoordTransform) -> PlotResult<f64> {
    let (ni, nj) = dims;
    let mut min = f64::INFINITY;
    for i in 0..ni {
        for j in 0..nj {
            let (x, y) = transform.evaluate(i as f64, j as f64)?;
            if i + 1 < ni {
                let (nx, ny) = transform.evaluate((i + 1) as f64, j as f64)?;
                let d = (nx - x).hypot(ny - y);
                if d > 0.0 {
                    min = min.min(d);
                }
            }
            if j + 1 < nj {
                let (nx, ny) = transform.evaluate(i as f64, (j + 1) as f64)?;
                let d = (nx - x).hypot(ny - y);
                if d > 0.0 {
                    min = min.min(d);
                }
            }
        }
    }
    if min.is_finite() { Ok(min) } else { Ok(1.0) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlotConfig;
    use crate::device::{RecordedPrimitive, RecordingDevice, RecordingLog};
    use crate::session::StreamId;
    use crate::transform::IdentityTransform;
    use approx_eq::assert_approx_eq;
    use ndarray::array;

    fn vector_stream() -> (PlotStream, RecordingLog) {
        let mut stream = PlotStream::new(StreamId::new(0));
        stream.initialize("test", PlotConfig::default()).unwrap();
        let device = RecordingDevice::default();
        let log = device.log();
        stream.attach_device("test", Box::new(device)).unwrap();
        stream.set_viewport("test", 0.0, 1.0, 0.0, 1.0).unwrap();
        stream.set_window("test", -1.0, 3.0, -1.0, 3.0).unwrap();
        log.clear();
        (stream, log)
    }

    #[test]
    fn test_every_node_gets_a_shaft_and_a_head() {
        let (mut stream, log) = vector_stream();
        let u = array![[1.0, 1.0], [1.0, 1.0]];
        let v = array![[0.0, 0.0], [0.0, 0.0]];
        draw_vectors(
            &mut stream,
            u.view(),
            v.view(),
            &VectorParams::default(),
            &IdentityTransform,
        )
        .unwrap();
        // Four nodes, two strokes each.
        assert_eq!(
            log.count_matching(|c| matches!(c, RecordedPrimitive::MoveTo(_))),
            8
        );
    }

    #[test]
    fn test_mismatched_components_are_rejected() {
        let (mut stream, log) = vector_stream();
        let u = array![[1.0, 1.0]];
        let v = array![[1.0], [1.0]];
        let err = draw_vectors(
            &mut stream,
            u.view(),
            v.view(),
            &VectorParams::default(),
            &IdentityTransform,
        )
        .unwrap_err();
        assert!(matches!(err, PlotError::InvalidArgument { .. }));
        assert!(log.is_empty());
    }

    #[test]
    fn test_zero_field_draws_nothing() {
        let (mut stream, log) = vector_stream();
        let u = array![[0.0, 0.0], [0.0, 0.0]];
        let v = array![[0.0, 0.0], [0.0, 0.0]];
        draw_vectors(
            &mut stream,
            u.view(),
            v.view(),
            &VectorParams::default(),
            &IdentityTransform,
        )
        .unwrap();
        assert!(log.is_empty());
    }

    #[test]
    fn test_nan_nodes_are_skipped() {
        let (mut stream, log) = vector_stream();
        let u = array![[1.0, f64::NAN], [1.0, 1.0]];
        let v = array![[0.0, 0.0], [0.0, 0.0]];
        draw_vectors(
            &mut stream,
            u.view(),
            v.view(),
            &VectorParams::default(),
            &IdentityTransform,
        )
        .unwrap();
        // Three live nodes, two strokes each.
        assert_eq!(
            log.count_matching(|c| matches!(c, RecordedPrimitive::MoveTo(_))),
            6
        );
    }

    #[test]
    fn test_automatic_scale_caps_arrows_at_half_a_cell() {
        // Unit grid, uniform magnitude 4: the automatic scale must shrink
        // every shaft to 0.5 world units.
        let u = array![[4.0, 4.0], [4.0, 4.0]];
        let v = array![[0.0, 0.0], [0.0, 0.0]];
        let max = max_magnitude(&u.view(), &v.view());
        assert_approx_eq!(max, 4.0, 1e-12);
        let extent = min_cell_extent(u.dim(), &IdentityTransform).unwrap();
        assert_approx_eq!(extent, 1.0, 1e-12);
        assert_approx_eq!(0.5 * extent / max, 0.125, 1e-12);
    }

    #[test]
    fn test_explicit_scale_sets_the_shaft_length() {
        let (mut stream, log) = vector_stream();
        let u = array![[2.0]];
        let v = array![[0.0]];
        let params = VectorParams {
            scale: 0.25,
            ..VectorParams::default()
        };
        draw_vectors(
            &mut stream,
            u.view(),
            v.view(),
            &params,
            &IdentityTransform,
        )
        .unwrap();
        // Shaft from (0,0) to (0.5,0) on a 1024x768 page with the window
        // spanning [-1,3]: 4 world units across 1024 px.
        let calls = log.snapshot();
        let shaft_tip = calls.iter().find_map(|c| match c {
            RecordedPrimitive::LineTo(p) => Some(*p),
            _ => None,
        });
        let tip = shaft_tip.expect("shaft stroke recorded");
        assert_approx_eq!(tip.x, (0.5 + 1.0) / 4.0 * 1024.0, 1e-9);
        assert_approx_eq!(tip.y, (0.0 + 1.0) / 4.0 * 768.0, 1e-9);
    }
}
