//! Map overlays drawn from an external polyline source.
//!
//! The engine does not ship geographic data. A [`MapSource`] supplies
//! named polyline datasets (coastlines, borders, rivers) restricted to a
//! world-space bounding rectangle; the engine strokes them with the
//! current pen, optionally passing every vertex through a projection
//! first. Clipping to the current window happens in the normal polyline
//! pipeline.

use crate::error::{PlotError, PlotResult};
use crate::page::WorldRect;
use crate::stream::PlotStream;

/// Supplier of named polyline datasets for [`crate::StreamHandle::draw_map`].
///
/// Implementations typically wrap a shapefile reader or a bundled
/// coastline table. Returning `Err` with a description refuses the
/// request (unknown dataset, unreadable file); the engine reports it as
/// an invalid argument without touching the device.
pub trait MapSource {
    /// Returns the polylines of `dataset` that intersect `bounds`, in
    /// source coordinates (before any projection).
    fn polylines(
        &self,
        dataset: &str,
        bounds: &WorldRect,
    ) -> Result<Vec<Vec<(f64, f64)>>, String>;
}

/// Strokes every polyline of a dataset with the current pen.
pub(crate) fn draw_map(
    stream: &mut PlotStream,
    source: &dyn MapSource,
    dataset: &str,
    bounds: &WorldRect,
    projection: Option<&dyn Fn(f64, f64) -> (f64, f64)>,
) -> PlotResult<()> {
    const OP: &str = "draw_map";
    let mut lines = source
        .polylines(dataset, bounds)
        .map_err(|detail| PlotError::invalid_argument(OP, format!("dataset '{dataset}': {detail}")))?;
    if let Some(project) = projection {
        for line in &mut lines {
            for point in line.iter_mut() {
                *point = project(point.0, point.1);
            }
        }
    }
    if lines.is_empty() {
        tracing::trace!(dataset, "map source returned no polylines");
        return Ok(());
    }
    for line in &lines {
        stream.emit_world_polyline(OP, line)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlotConfig;
    use crate::device::{RecordedPrimitive, RecordingDevice, RecordingLog};
    use crate::session::StreamId;
    use approx_eq::assert_approx_eq;
    use std::cell::RefCell;

    fn map_stream() -> (PlotStream, RecordingLog) {
        let mut stream = PlotStream::new(StreamId::new(0));
        stream.initialize("test", PlotConfig::default()).unwrap();
        let device = RecordingDevice::default();
        let log = device.log();
        stream.attach_device("test", Box::new(device)).unwrap();
        stream.set_viewport("test", 0.0, 1.0, 0.0, 1.0).unwrap();
        stream.set_window("test", 0.0, 2.0, 0.0, 2.0).unwrap();
        log.clear();
        (stream, log)
    }

    struct FixedSource {
        lines: Vec<Vec<(f64, f64)>>,
        requests: RefCell<Vec<(String, WorldRect)>>,
    }

    impl FixedSource {
        fn new(lines: Vec<Vec<(f64, f64)>>) -> Self {
            Self {
                lines,
                requests: RefCell::new(Vec::new()),
            }
        }
    }

    impl MapSource for FixedSource {
        fn polylines(
            &self,
            dataset: &str,
            bounds: &WorldRect,
        ) -> Result<Vec<Vec<(f64, f64)>>, String> {
            self.requests.borrow_mut().push((dataset.to_owned(), *bounds));
            Ok(self.lines.clone())
        }
    }

    struct RefusingSource;

    impl MapSource for RefusingSource {
        fn polylines(
            &self,
            dataset: &str,
            _bounds: &WorldRect,
        ) -> Result<Vec<Vec<(f64, f64)>>, String> {
            Err(format!("no such dataset '{dataset}'"))
        }
    }

    fn world(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> WorldRect {
        WorldRect::new("test", x_min, x_max, y_min, y_max).unwrap()
    }

    #[test]
    fn test_strokes_every_source_polyline() {
        let (mut stream, log) = map_stream();
        let source = FixedSource::new(vec![
            vec![(0.0, 0.0), (1.0, 1.0), (2.0, 1.0)],
            vec![(0.5, 1.5), (1.5, 1.5)],
        ]);
        draw_map(&mut stream, &source, "coast", &world(0.0, 2.0, 0.0, 2.0), None).unwrap();
        assert_eq!(
            log.count_matching(|c| matches!(c, RecordedPrimitive::MoveTo(_))),
            2
        );
        assert_eq!(
            log.count_matching(|c| matches!(c, RecordedPrimitive::LineTo(_))),
            3
        );
    }

    #[test]
    fn test_dataset_and_bounds_reach_the_source() {
        let (mut stream, _log) = map_stream();
        let source = FixedSource::new(Vec::new());
        let bounds = world(-30.0, 60.0, -10.0, 80.0);
        draw_map(&mut stream, &source, "rivers", &bounds, None).unwrap();
        let requests = source.requests.borrow();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "rivers");
        assert_eq!(requests[0].1, bounds);
    }

    #[test]
    fn test_refusing_source_is_an_invalid_argument() {
        let (mut stream, log) = map_stream();
        let err = draw_map(
            &mut stream,
            &RefusingSource,
            "nowhere",
            &world(0.0, 1.0, 0.0, 1.0),
            None,
        )
        .unwrap_err();
        match err {
            PlotError::InvalidArgument { detail, .. } => {
                assert!(detail.contains("nowhere"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(log.is_empty());
    }

    #[test]
    fn test_projection_is_applied_before_drawing() {
        let (mut stream, log) = map_stream();
        let source = FixedSource::new(vec![vec![(0.0, 0.0), (1.0, 1.0)]]);
        let double_x = |x: f64, y: f64| (2.0 * x, y);
        draw_map(
            &mut stream,
            &source,
            "coast",
            &world(0.0, 2.0, 0.0, 2.0),
            Some(&double_x),
        )
        .unwrap();
        // (1,1) projects to (2,1): the far right of the window, half up.
        let calls = log.snapshot();
        let end = calls
            .iter()
            .find_map(|c| match c {
                RecordedPrimitive::LineTo(p) => Some(*p),
                _ => None,
            })
            .expect("stroke recorded");
        assert_approx_eq!(end.x, 1024.0, 1e-9);
        assert_approx_eq!(end.y, 384.0, 1e-9);
    }

    #[test]
    fn test_empty_source_result_draws_nothing() {
        let (mut stream, log) = map_stream();
        let source = FixedSource::new(vec![]);
        draw_map(&mut stream, &source, "coast", &world(0.0, 2.0, 0.0, 2.0), None).unwrap();
        assert!(log.is_empty());
    }
}
