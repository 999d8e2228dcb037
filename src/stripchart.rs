//! Strip charts: incrementally updated multi-pen time-series plots.
//!
//! A strip chart owns up to four pens, each an append-only sequence of
//! `(x, y)` samples. Appending is cheap: the new segment is stroked
//! directly. When a sample crosses the right edge the visible window is
//! extended by the configured jump factor (growing in accumulate mode,
//! sliding in slide mode) and the whole chart is redrawn; the same happens
//! when y-autoscaling moves a bound. The extend-and-redraw sequence runs
//! under the session lock as one operation, so concurrent appenders never
//! observe a torn window.

use std::fmt;

use crate::error::{PlotError, PlotResult};
use crate::page::WorldRect;
use crate::stream::PlotStream;
use crate::style::LineStyle;

/// Upper bound on pens per chart.
pub const MAX_PENS: usize = 4;

/// Fraction of the y-range added beyond a sample that violates a bound
/// when y-autoscaling is on.
const AUTOSCALE_PAD: f64 = 0.3;

/// Identifier of a strip chart within its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct ChartId(u32);

impl ChartId {
    pub(crate) fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The id's numeric value.
    #[inline]
    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ChartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Appearance of one strip chart pen.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct PenStyle {
    /// Color map 0 index used for this pen's strokes.
    pub color_index: usize,
    /// Line style used for this pen's strokes.
    pub line_style: LineStyle,
    /// Legend text; an empty string suppresses this pen's legend row.
    pub legend: String,
}

impl Default for PenStyle {
    fn default() -> Self {
        Self {
            color_index: 1,
            line_style: LineStyle::Solid,
            legend: String::new(),
        }
    }
}

/// Configuration for [`crate::StreamHandle::strip_create`].
///
/// The bounds are the initial plot box; the right edge and, with
/// autoscaling, the y bounds move as data streams in. Legend coordinates
/// are fractions of the viewport, measured from its lower-left corner.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct StripChartConfig {
    /// Initial left edge of the plot box.
    pub x_min: f64,
    /// Initial right edge of the plot box.
    pub x_max: f64,
    /// Initial lower edge of the plot box.
    pub y_min: f64,
    /// Initial upper edge of the plot box.
    pub y_max: f64,
    /// Jump factor: each extension grows the window by this fraction of
    /// the current x-span. Must be positive.
    pub x_jump: f64,
    /// Whether a sample outside the y bounds rescales the violated bound.
    pub autoscale_y: bool,
    /// `true` keeps every sample visible (the window only grows);
    /// `false` slides the window and drops samples left of the new edge.
    pub accumulate: bool,
    /// Legend anchor, as a fraction of the x-span from the left edge.
    pub legend_x: f64,
    /// First legend row, as a fraction of the y-span above the lower edge.
    pub legend_y: f64,
    /// Color map 0 index for the plot box frame.
    pub frame_color_index: usize,
    /// Color map 0 index for legend text.
    pub label_color_index: usize,
    /// One entry per pen, at most [`MAX_PENS`].
    pub pens: Vec<PenStyle>,
}

impl Default for StripChartConfig {
    fn default() -> Self {
        Self {
            x_min: 0.0,
            x_max: 10.0,
            y_min: 0.0,
            y_max: 1.0,
            x_jump: 0.1,
            autoscale_y: true,
            accumulate: false,
            legend_x: 0.0,
            legend_y: 1.0,
            frame_color_index: 1,
            label_color_index: 1,
            pens: vec![PenStyle::default()],
        }
    }
}

#[derive(Debug, Clone)]
struct Pen {
    style: PenStyle,
    samples: Vec<(f64, f64)>,
}

/// Live state of one strip chart. Stored by the owning stream and only
/// touched through the free functions below.
#[derive(Debug, Clone)]
pub(crate) struct StripChart {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
    x_jump: f64,
    autoscale_y: bool,
    accumulate: bool,
    legend_x: f64,
    legend_y: f64,
    frame_color_index: usize,
    label_color_index: usize,
    pens: Vec<Pen>,
}

impl StripChart {
    fn from_config(op: &'static str, config: StripChartConfig) -> PlotResult<Self> {
        if config.pens.is_empty() || config.pens.len() > MAX_PENS {
            return Err(PlotError::invalid_argument(
                op,
                format!("strip chart needs 1..={MAX_PENS} pens, got {}", config.pens.len()),
            ));
        }
        if !config.x_jump.is_finite() || config.x_jump <= 0.0 {
            return Err(PlotError::invalid_argument(
                op,
                format!("x jump factor must be positive and finite, got {}", config.x_jump),
            ));
        }
        let bounds = [config.x_min, config.x_max, config.y_min, config.y_max];
        if bounds.iter().any(|v| !v.is_finite())
            || config.x_min >= config.x_max
            || config.y_min >= config.y_max
        {
            return Err(PlotError::invalid_argument(
                op,
                format!(
                    "strip chart bounds must be finite and ordered: [{}, {}] x [{}, {}]",
                    config.x_min, config.x_max, config.y_min, config.y_max
                ),
            ));
        }
        if !config.legend_x.is_finite() || !config.legend_y.is_finite() {
            return Err(PlotError::invalid_argument(
                op,
                "legend position must be finite".to_string(),
            ));
        }
        Ok(Self {
            x_min: config.x_min,
            x_max: config.x_max,
            y_min: config.y_min,
            y_max: config.y_max,
            x_jump: config.x_jump,
            autoscale_y: config.autoscale_y,
            accumulate: config.accumulate,
            legend_x: config.legend_x,
            legend_y: config.legend_y,
            frame_color_index: config.frame_color_index,
            label_color_index: config.label_color_index,
            pens: config
                .pens
                .into_iter()
                .map(|style| Pen {
                    style,
                    samples: Vec::new(),
                })
                .collect(),
        })
    }

    /// Stores a sample and updates the plot box bounds. Returns `true`
    /// when the bounds moved and the chart needs a full redraw.
    ///
    /// The extension is applied repeatedly until the sample is inside, so
    /// a far-out sample never lands beyond the right edge; each step adds
    /// exactly `(x_max - x_min) * x_jump`. A jump too small to actually
    /// move the edge is refused, storing nothing.
    fn note_sample(&mut self, op: &'static str, pen: usize, x: f64, y: f64) -> PlotResult<bool> {
        let mut moved = false;
        let mut slid = false;
        while x > self.x_max {
            let shift = (self.x_max - self.x_min) * self.x_jump;
            // A shift below one ulp of the edge would loop forever.
            if self.x_max + shift == self.x_max {
                return Err(PlotError::invalid_argument(
                    op,
                    format!(
                        "x jump of {shift} cannot move the right edge past {}",
                        self.x_max
                    ),
                ));
            }
            if self.accumulate {
                self.x_max += shift;
            } else {
                self.x_min += shift;
                self.x_max += shift;
                slid = true;
            }
            moved = true;
        }
        if self.autoscale_y && (y < self.y_min || y > self.y_max) {
            let pad = AUTOSCALE_PAD * (self.y_max - self.y_min);
            if y < self.y_min {
                self.y_min = y - pad;
            } else {
                self.y_max = y + pad;
            }
            moved = true;
        }
        self.pens[pen].samples.push((x, y));
        if slid {
            let left = self.x_min;
            for pen in &mut self.pens {
                pen.samples.retain(|&(sx, _)| sx >= left);
            }
        }
        Ok(moved)
    }

    /// Re-establishes the chart's viewport and data window on the stream.
    /// Every draw goes through this, so appends survive the caller moving
    /// the stream's window between calls. An unchanged pair reuses the
    /// newest window-table entry, so steady-state appends do not grow the
    /// page's table.
    fn select_data_window(&self, stream: &mut PlotStream, op: &'static str) -> PlotResult<()> {
        stream.viewport_standard()?;
        let window = WorldRect::new(op, self.x_min, self.x_max, self.y_min, self.y_max)?;
        stream.reselect_window(op, window)
    }

    /// Full redraw: frame, every pen's polyline, legend rows.
    fn regenerate(&self, stream: &mut PlotStream, op: &'static str) -> PlotResult<()> {
        self.select_data_window(stream, op)?;
        let frame = stream.cmap0_color(op, self.frame_color_index)?;
        stream.set_device_color(op, frame)?;
        stream.emit_frame(op)?;
        for pen in &self.pens {
            if pen.samples.len() < 2 {
                continue;
            }
            let color = stream.cmap0_color(op, pen.style.color_index)?;
            stream.set_device_color(op, color)?;
            stream.emit_polyline_with_style(op, &pen.samples, &pen.style.line_style)?;
        }
        self.draw_legends(stream, op)?;
        stream.restore_device_pen(op)?;
        stream.flush(op)
    }

    /// Strokes only the newest segment of one pen.
    fn draw_increment(&self, stream: &mut PlotStream, op: &'static str, pen: usize) -> PlotResult<()> {
        let samples = &self.pens[pen].samples;
        let n = samples.len();
        if n < 2 {
            return Ok(());
        }
        self.select_data_window(stream, op)?;
        let color = stream.cmap0_color(op, self.pens[pen].style.color_index)?;
        stream.set_device_color(op, color)?;
        let segment = [samples[n - 2], samples[n - 1]];
        stream.emit_polyline_with_style(op, &segment, &self.pens[pen].style.line_style)?;
        stream.restore_device_pen(op)?;
        stream.flush(op)
    }

    /// Draws one legend row per pen with a non-empty legend: a short
    /// sample stroke in the pen's style, then the text.
    ///
    /// Rows are laid out in viewport-fraction space; a unit window is
    /// swapped in for the duration and the data window restored afterwards.
    fn draw_legends(&self, stream: &mut PlotStream, op: &'static str) -> PlotResult<()> {
        if self.pens.iter().all(|pen| pen.style.legend.is_empty()) {
            return Ok(());
        }
        let unit = WorldRect::new(op, -0.01, 1.01, -0.01, 1.01)?;
        stream.push_window(op, unit)?;
        let row_step = match stream.current_viewport() {
            Some(viewport) => {
                let viewport_mm = viewport.height() * stream.page_geometry().height_mm;
                if viewport_mm > 0.0 {
                    1.5 * stream.char_height_mm() / viewport_mm
                } else {
                    0.05
                }
            }
            None => 0.05,
        };
        let label = stream.cmap0_color(op, self.label_color_index)?;
        let mut y = self.legend_y;
        for pen in &self.pens {
            if pen.style.legend.is_empty() {
                continue;
            }
            let color = stream.cmap0_color(op, pen.style.color_index)?;
            stream.set_device_color(op, color)?;
            let stroke = [(self.legend_x, y), (self.legend_x + 0.1, y)];
            stream.emit_polyline_with_style(op, &stroke, &pen.style.line_style)?;
            stream.set_device_color(op, label)?;
            stream.text(op, self.legend_x + 0.12, y, 0.0, 0.0, &pen.style.legend)?;
            y -= row_step;
        }
        // Put the data window back for subsequent appends.
        let window = WorldRect::new(op, self.x_min, self.x_max, self.y_min, self.y_max)?;
        stream.push_window(op, window)
    }
}

/// Creates a strip chart on the stream and draws its empty frame and
/// legends.
pub(crate) fn create(stream: &mut PlotStream, config: StripChartConfig) -> PlotResult<ChartId> {
    const OP: &str = "strip_create";
    let chart = StripChart::from_config(OP, config)?;
    chart.regenerate(stream, OP)?;
    let id = stream.next_chart_id();
    stream.charts.insert(id, chart);
    tracing::debug!(chart = %id, "strip chart created");
    Ok(id)
}

/// Appends one sample to a pen, extending the window and redrawing when
/// the sample moves a plot box bound.
pub(crate) fn append(
    stream: &mut PlotStream,
    id: ChartId,
    pen: usize,
    x: f64,
    y: f64,
) -> PlotResult<()> {
    // The chart leaves the map while it borrows the stream for drawing.
    let Some(mut chart) = stream.charts.remove(&id) else {
        return Err(PlotError::UnknownChart(id));
    };
    let result = append_inner(stream, &mut chart, pen, x, y);
    stream.charts.insert(id, chart);
    result
}

fn append_inner(
    stream: &mut PlotStream,
    chart: &mut StripChart,
    pen: usize,
    x: f64,
    y: f64,
) -> PlotResult<()> {
    const OP: &str = "strip_append";
    if pen >= chart.pens.len() {
        return Err(PlotError::invalid_argument(
            OP,
            format!("pen index {pen} out of range 0..{}", chart.pens.len()),
        ));
    }
    if !x.is_finite() || !y.is_finite() {
        return Err(PlotError::invalid_argument(
            OP,
            format!("sample must be finite, got ({x}, {y})"),
        ));
    }
    if chart.note_sample(OP, pen, x, y)? {
        chart.regenerate(stream, OP)
    } else {
        chart.draw_increment(stream, OP, pen)
    }
}

/// Destroys a strip chart, releasing its pen buffers.
pub(crate) fn delete(stream: &mut PlotStream, id: ChartId) -> PlotResult<()> {
    if stream.charts.remove(&id).is_none() {
        return Err(PlotError::UnknownChart(id));
    }
    tracing::debug!(chart = %id, "strip chart deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)] // bound updates are specified exactly

    use super::*;
    use crate::config::PlotConfig;
    use crate::device::{RecordedPrimitive, RecordingDevice, RecordingLog};
    use crate::session::StreamId;

    fn chart(config: StripChartConfig) -> StripChart {
        StripChart::from_config("test", config).unwrap()
    }

    fn accumulate_config() -> StripChartConfig {
        StripChartConfig {
            accumulate: true,
            autoscale_y: false,
            ..StripChartConfig::default()
        }
    }

    fn chart_stream() -> (PlotStream, RecordingLog) {
        let mut stream = PlotStream::new(StreamId::new(0));
        stream.initialize("test", PlotConfig::default()).unwrap();
        let device = RecordingDevice::default();
        let log = device.log();
        stream.attach_device("test", Box::new(device)).unwrap();
        (stream, log)
    }

    #[test]
    fn test_jump_extends_the_right_edge_exactly() {
        let mut c = chart(accumulate_config());
        assert!(c.note_sample("test", 0, 10.5, 0.5).unwrap());
        assert_eq!(c.x_max, 11.0);
        assert_eq!(c.x_min, 0.0);

        // A far-out sample extends repeatedly until covered.
        let mut c = chart(StripChartConfig {
            x_jump: 1.0,
            ..accumulate_config()
        });
        assert!(c.note_sample("test", 0, 35.0, 0.5).unwrap());
        assert_eq!(c.x_max, 40.0);
    }

    #[test]
    fn test_slide_mode_shifts_the_window_and_drops_hidden_samples() {
        let mut c = chart(StripChartConfig {
            autoscale_y: false,
            ..StripChartConfig::default()
        });
        for &x in &[0.5, 5.0, 9.0] {
            assert!(!c.note_sample("test", 0, x, 0.5).unwrap());
        }
        assert!(c.note_sample("test", 0, 10.5, 0.5).unwrap());
        assert_eq!(c.x_min, 1.0);
        assert_eq!(c.x_max, 11.0);
        let xs: Vec<f64> = c.pens[0].samples.iter().map(|&(x, _)| x).collect();
        assert_eq!(xs, vec![5.0, 9.0, 10.5]);
    }

    #[test]
    fn test_autoscale_moves_only_the_violated_bound() {
        let mut c = chart(StripChartConfig::default());
        assert!(c.note_sample("test", 0, 1.0, 1.5).unwrap());
        assert_eq!(c.y_max, 1.5 + 0.3);
        assert_eq!(c.y_min, 0.0);

        let mut c = chart(StripChartConfig::default());
        assert!(c.note_sample("test", 0, 1.0, -0.5).unwrap());
        assert_eq!(c.y_min, -0.5 - 0.3);
        assert_eq!(c.y_max, 1.0);
    }

    #[test]
    fn test_exact_bound_samples_do_not_trigger_a_redraw() {
        let mut c = chart(StripChartConfig::default());
        assert!(!c.note_sample("test", 0, 10.0, 1.0).unwrap());
        assert_eq!(c.x_max, 10.0);
        assert_eq!(c.y_max, 1.0);
    }

    #[test]
    fn test_replay_reproduces_identical_bounds() {
        let samples = [
            (0usize, 2.0, 0.4),
            (0, 9.5, 1.2),
            (0, 10.6, -0.3),
            (0, 14.0, 2.0),
            (0, 30.0, 0.0),
        ];
        let mut a = chart(StripChartConfig::default());
        let mut b = chart(StripChartConfig::default());
        for &(pen, x, y) in &samples {
            a.note_sample("test", pen, x, y).unwrap();
        }
        for &(pen, x, y) in &samples {
            b.note_sample("test", pen, x, y).unwrap();
        }
        assert_eq!((a.x_min, a.x_max, a.y_min, a.y_max), (b.x_min, b.x_max, b.y_min, b.y_max));
    }

    #[test]
    fn test_create_rejects_malformed_configs() {
        let (mut stream, _log) = chart_stream();
        let bad = [
            StripChartConfig {
                pens: Vec::new(),
                ..StripChartConfig::default()
            },
            StripChartConfig {
                pens: vec![PenStyle::default(); 5],
                ..StripChartConfig::default()
            },
            StripChartConfig {
                x_jump: 0.0,
                ..StripChartConfig::default()
            },
            StripChartConfig {
                x_jump: f64::NAN,
                ..StripChartConfig::default()
            },
            StripChartConfig {
                y_min: 1.0,
                y_max: 1.0,
                ..StripChartConfig::default()
            },
        ];
        for config in bad {
            let err = create(&mut stream, config).unwrap_err();
            assert!(matches!(err, PlotError::InvalidArgument { .. }));
        }
        assert!(stream.charts.is_empty());
    }

    #[test]
    fn test_create_draws_frame_and_legend_rows() {
        let (mut stream, log) = chart_stream();
        let config = StripChartConfig {
            pens: vec![
                PenStyle {
                    color_index: 2,
                    legend: "sin".to_string(),
                    ..PenStyle::default()
                },
                PenStyle {
                    color_index: 3,
                    legend: "cos".to_string(),
                    ..PenStyle::default()
                },
            ],
            ..StripChartConfig::default()
        };
        let id = create(&mut stream, config).unwrap();
        assert_eq!(id.as_u32(), 0);

        let frame_strokes = log.count_matching(|c| matches!(c, RecordedPrimitive::LineTo(_)));
        assert!(frame_strokes >= 4, "expected a frame, got {frame_strokes} strokes");
        assert_eq!(
            log.count_matching(|c| matches!(c, RecordedPrimitive::Text(..))),
            2
        );
        assert_eq!(
            log.count_matching(|c| matches!(c, RecordedPrimitive::Flush)),
            1
        );

        let next = create(&mut stream, StripChartConfig::default()).unwrap();
        assert_eq!(next.as_u32(), 1);
    }

    #[test]
    fn test_append_draws_only_the_new_segment() {
        let (mut stream, log) = chart_stream();
        let id = create(&mut stream, accumulate_config()).unwrap();
        log.clear();

        append(&mut stream, id, 0, 1.0, 0.5).unwrap();
        assert!(log.is_empty(), "a single sample has nothing to stroke");

        append(&mut stream, id, 0, 2.0, 0.6).unwrap();
        assert_eq!(
            log.count_matching(|c| matches!(c, RecordedPrimitive::MoveTo(_))),
            1
        );
        assert_eq!(
            log.count_matching(|c| matches!(c, RecordedPrimitive::LineTo(_))),
            1
        );
        assert_eq!(
            log.count_matching(|c| matches!(c, RecordedPrimitive::Flush)),
            1
        );
    }

    #[test]
    fn test_crossing_the_right_edge_redraws_the_whole_chart() {
        let (mut stream, log) = chart_stream();
        let id = create(&mut stream, accumulate_config()).unwrap();
        for i in 0..5 {
            append(&mut stream, id, 0, f64::from(i) * 2.0, 0.5).unwrap();
        }
        log.clear();

        append(&mut stream, id, 0, 10.5, 0.5).unwrap();
        // Frame (4 strokes) plus the pen polyline segments.
        let strokes = log.count_matching(|c| matches!(c, RecordedPrimitive::LineTo(_)));
        assert!(strokes >= 9, "full redraw expected, got {strokes} strokes");
        assert_eq!(
            log.count_matching(|c| matches!(c, RecordedPrimitive::BeginPage)),
            0
        );
    }

    #[test]
    fn test_bad_pens_unknown_charts_and_double_delete_are_rejected() {
        let (mut stream, _log) = chart_stream();
        let err = append(&mut stream, ChartId::new(7), 0, 1.0, 1.0).unwrap_err();
        assert!(matches!(err, PlotError::UnknownChart(id) if id.as_u32() == 7));

        let id = create(&mut stream, StripChartConfig::default()).unwrap();
        let err = append(&mut stream, id, 1, 1.0, 1.0).unwrap_err();
        assert!(matches!(err, PlotError::InvalidArgument { .. }));
        let err = append(&mut stream, id, 0, 1.0, f64::NAN).unwrap_err();
        assert!(matches!(err, PlotError::InvalidArgument { .. }));
        assert!(
            stream.charts[&id].pens[0].samples.is_empty(),
            "rejected appends must not store samples"
        );

        delete(&mut stream, id).unwrap();
        assert!(matches!(
            delete(&mut stream, id),
            Err(PlotError::UnknownChart(_))
        ));
    }

    #[test]
    fn test_microscopic_jump_factor_is_rejected() {
        let (mut stream, _log) = chart_stream();
        let id = create(
            &mut stream,
            StripChartConfig {
                x_jump: 1e-18,
                autoscale_y: false,
                ..StripChartConfig::default()
            },
        )
        .unwrap();

        // The shift falls below one ulp of the right edge, so the append
        // must report instead of re-adding a no-op extension forever.
        let err = append(&mut stream, id, 0, 10.5, 0.3).unwrap_err();
        assert!(matches!(err, PlotError::InvalidArgument { .. }));
        assert!(
            stream.charts[&id].pens[0].samples.is_empty(),
            "rejected appends must not store samples"
        );

        // The chart itself survives; in-range samples still append.
        append(&mut stream, id, 0, 5.0, 0.3).unwrap();
        assert_eq!(stream.charts[&id].pens[0].samples.len(), 1);
    }

    #[test]
    fn test_steady_appends_reuse_the_window_table_entry() {
        let (mut stream, _log) = chart_stream();
        let id = create(
            &mut stream,
            StripChartConfig {
                autoscale_y: false,
                ..StripChartConfig::default()
            },
        )
        .unwrap();
        append(&mut stream, id, 0, 0.5, 0.5).unwrap();
        let table_size = stream.window_count();

        // Unchanged bounds re-select the same viewport/window pair, so a
        // long run of appends must not grow the page's window table.
        for i in 1..100 {
            append(&mut stream, id, 0, 0.5 + f64::from(i) * 0.05, 0.5).unwrap();
        }
        assert_eq!(stream.window_count(), table_size);

        // A bound move is a genuine redefinition and may add entries.
        append(&mut stream, id, 0, 10.5, 0.5).unwrap();
        assert!(stream.window_count() > table_size);
    }
}
