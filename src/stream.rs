//! Per-stream plotting state and the drawing pipeline.
//!
//! A [`PlotStream`] bundles everything one output surface needs: the device
//! backend, page and subpage geometry, the viewport/window mapping, palettes,
//! and pen attributes. Streams are owned by the session and only ever touched
//! under the session lock; the public entry points live on
//! [`StreamHandle`](crate::session::StreamHandle).
//!
//! Drawing follows one pipeline: world-space geometry is clipped against the
//! current window, mapped through the viewport to normalized device
//! coordinates, scaled to device pixels, expanded by the dash pattern where
//! one is active, and handed to the backend as `move_to`/`line_to`/
//! `fill_polygon` primitives.

use std::collections::HashMap;
use std::fmt;

use crate::clip::{clip_polygon, clip_polyline, ClipBox};
use crate::color::{Cmap1ControlPoint, Cmap1Space, ColorMap0, ColorMap1, Rgba};
use crate::config::{FamilySettings, PlotConfig};
use crate::device::{DeviceBackend, DeviceCapabilities, DevicePoint, DeviceResult};
use crate::error::{PlotError, PlotResult};
use crate::fill::{hatch_segments, FillStyle, HatchFamily};
use crate::page::{
    device_to_world, fitted_viewport, standard_viewport, AxisScaling, NormRect, PageGeometry,
    SubpageGrid, WindowEntry, WorldRect,
};
use crate::session::StreamId;
use crate::stripchart::{ChartId, StripChart};
use crate::style::{dash_runs, DashPair, Fci, LineStyle};

/// Default character height in millimetres, before the character scale
/// factor is applied. Margin policies are expressed in multiples of this.
pub const DEFAULT_CHAR_HEIGHT_MM: f64 = 2.0;

/// Default pen width in device pixels.
pub const DEFAULT_PEN_WIDTH: f64 = 1.0;

/// Color map 0 entry selected as the pen color when a stream starts.
const DEFAULT_PEN_INDEX: usize = 1;

/// Default escape character for in-string text directives.
const DEFAULT_ESCAPE_CHAR: char = '#';

/// Characters accepted as the text escape character.
const ESCAPE_CHARS: [char; 9] = ['!', '#', '$', '%', '&', '*', '@', '^', '~'];

/// How far a stream has progressed through its setup sequence.
///
/// The level only ever increases during normal use; re-running stream
/// initialization is the single sanctioned way back down, and it lands on
/// [`RunLevel::Initialized`] with fresh state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum RunLevel {
    /// Stream exists but has not been initialized.
    #[default]
    Uninitialized = 0,
    /// Initialization has run; pages may be advanced and attributes set.
    Initialized = 1,
    /// A viewport has been placed on the current subpage.
    ViewportDefined = 2,
    /// A world window is mapped onto the viewport; drawing is allowed.
    WindowDefined = 3,
}

impl fmt::Display for RunLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::ViewportDefined => "viewport-defined",
            Self::WindowDefined => "window-defined",
        };
        write!(f, "{name} ({})", *self as u8)
    }
}

/// All mutable state of one plotting stream.
///
/// Owned by the session registry; operations reach it through the session
/// lock. The struct itself does no locking and no dispatch-time validation
/// beyond what each operation needs.
pub struct PlotStream {
    id: StreamId,
    run_level: RunLevel,
    device: Option<Box<dyn DeviceBackend>>,
    caps: DeviceCapabilities,
    page_geometry: PageGeometry,
    config: PlotConfig,
    subpages: SubpageGrid,
    /// Set after initialization and after every device-side page begin; the
    /// next advance consumes the first subpage instead of moving past it.
    pending_first_subpage: bool,
    viewport: Option<NormRect>,
    window: Option<WorldRect>,
    /// Every viewport/window pair defined on the current page, in creation
    /// order. Cleared when a new page starts.
    windows: Vec<WindowEntry>,
    pages_completed: u64,
    cmap0: ColorMap0,
    cmap1: ColorMap1,
    pen_color: Rgba,
    pen_width: f64,
    line_style: LineStyle,
    fill_style: FillStyle,
    char_scale: f64,
    symbol_scale: f64,
    tick_scale: f64,
    fci: Fci,
    escape_char: char,
    pub(crate) charts: HashMap<ChartId, StripChart>,
    next_chart: u32,
}

impl fmt::Debug for PlotStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlotStream")
            .field("id", &self.id)
            .field("run_level", &self.run_level)
            .field("has_device", &self.device.is_some())
            .field("subpage", &self.subpages.current_index())
            .field("windows", &self.windows.len())
            .field("charts", &self.charts.len())
            .finish_non_exhaustive()
    }
}

impl PlotStream {
    pub(crate) fn new(id: StreamId) -> Self {
        let cmap0 = ColorMap0::default();
        let pen_color = cmap0.color(DEFAULT_PEN_INDEX).unwrap_or(Rgba::WHITE);
        Self {
            id,
            run_level: RunLevel::Uninitialized,
            device: None,
            caps: DeviceCapabilities::default(),
            page_geometry: PageGeometry::from_capabilities(&DeviceCapabilities::default()),
            config: PlotConfig::default(),
            subpages: SubpageGrid::default(),
            pending_first_subpage: true,
            viewport: None,
            window: None,
            windows: Vec::new(),
            pages_completed: 0,
            cmap0,
            cmap1: ColorMap1::default(),
            pen_color,
            pen_width: DEFAULT_PEN_WIDTH,
            line_style: LineStyle::default(),
            fill_style: FillStyle::default(),
            char_scale: 1.0,
            symbol_scale: 1.0,
            tick_scale: 1.0,
            fci: Fci::default(),
            escape_char: DEFAULT_ESCAPE_CHAR,
            charts: HashMap::new(),
            next_chart: 0,
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The stream's identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Current run level.
    #[inline]
    #[must_use]
    pub fn run_level(&self) -> RunLevel {
        self.run_level
    }

    /// Current pen color.
    #[inline]
    #[must_use]
    pub fn pen_color(&self) -> Rgba {
        self.pen_color
    }

    /// Current pen width in device pixels.
    #[inline]
    #[must_use]
    pub fn pen_width(&self) -> f64 {
        self.pen_width
    }

    /// Current line style.
    #[must_use]
    pub fn line_style(&self) -> &LineStyle {
        &self.line_style
    }

    /// Current fill style.
    #[must_use]
    pub fn fill_style(&self) -> &FillStyle {
        &self.fill_style
    }

    /// Current font characterization.
    #[inline]
    #[must_use]
    pub fn font(&self) -> Fci {
        self.fci
    }

    /// Current text escape character.
    #[inline]
    #[must_use]
    pub fn escape_char(&self) -> char {
        self.escape_char
    }

    /// Current symbol scale factor.
    #[inline]
    #[must_use]
    pub fn symbol_scale(&self) -> f64 {
        self.symbol_scale
    }

    /// Current tick scale factor.
    #[inline]
    #[must_use]
    pub fn tick_scale(&self) -> f64 {
        self.tick_scale
    }

    /// Family-file output settings.
    #[inline]
    #[must_use]
    pub fn family(&self) -> FamilySettings {
        self.config.family
    }

    /// Zero-based index of the current subpage.
    #[inline]
    #[must_use]
    pub fn subpage_index(&self) -> usize {
        self.subpages.current_index()
    }

    /// Subpage grid layout as `(nx, ny)`.
    #[inline]
    #[must_use]
    pub fn subpage_layout(&self) -> (usize, usize) {
        self.subpages.layout()
    }

    /// Number of windows defined on the current page.
    #[inline]
    #[must_use]
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// Number of device pages completed so far.
    #[inline]
    #[must_use]
    pub fn pages_completed(&self) -> u64 {
        self.pages_completed
    }

    /// The current world window, if one is defined.
    #[inline]
    #[must_use]
    pub fn current_window(&self) -> Option<WorldRect> {
        self.window
    }

    /// The current viewport in page-normalized coordinates, if defined.
    #[inline]
    #[must_use]
    pub fn current_viewport(&self) -> Option<NormRect> {
        self.viewport
    }

    /// Capabilities of the attached device (defaults before attachment).
    #[inline]
    #[must_use]
    pub fn capabilities(&self) -> DeviceCapabilities {
        self.caps
    }

    /// Character height in millimetres after scaling.
    #[must_use]
    pub fn char_height_mm(&self) -> f64 {
        DEFAULT_CHAR_HEIGHT_MM * self.char_scale
    }

    pub(crate) fn page_geometry(&self) -> PageGeometry {
        self.page_geometry
    }

    pub(crate) fn cmap1(&self) -> &ColorMap1 {
        &self.cmap1
    }

    /// Resolves a color map 0 index, failing on out-of-range indices.
    pub(crate) fn cmap0_color(&self, op: &'static str, index: usize) -> PlotResult<Rgba> {
        self.cmap0.color(index).ok_or_else(|| {
            PlotError::invalid_argument(
                op,
                format!("cmap0 index {index} out of range 0..{}", self.cmap0.len()),
            )
        })
    }

    /// Fails with [`PlotError::Precondition`] when the stream has not
    /// reached `required`.
    pub(crate) fn require_level(&self, op: &'static str, required: RunLevel) -> PlotResult<()> {
        if self.run_level < required {
            return Err(PlotError::precondition(self.id, op, required, self.run_level));
        }
        Ok(())
    }

    fn raise_level(&mut self, level: RunLevel) {
        if level > self.run_level {
            self.run_level = level;
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// (Re-)initializes the stream from a configuration snapshot.
    ///
    /// On a fresh stream this raises the run level to
    /// [`RunLevel::Initialized`]. On an already-initialized stream the open
    /// page is finished first, then all state except the attached device is
    /// rebuilt; this is the only sanctioned run-level decrease.
    pub(crate) fn initialize(&mut self, op: &'static str, config: PlotConfig) -> PlotResult<()> {
        let (nx, ny) = config.subpages();
        let subpages = SubpageGrid::new(op, nx, ny)?;
        if self.run_level > RunLevel::Uninitialized && self.device.is_some() {
            tracing::debug!(stream = %self.id, "reinitializing stream, finishing open page");
            self.dev_call(op, |d| d.end_page())?;
            self.dev_call(op, |d| d.flush())?;
        }
        self.subpages = subpages;
        self.config = config;
        self.viewport = None;
        self.window = None;
        self.windows.clear();
        self.charts.clear();
        self.next_chart = 0;
        self.cmap0 = ColorMap0::default();
        self.cmap1 = ColorMap1::default();
        self.pen_color = self.cmap0.color(DEFAULT_PEN_INDEX).unwrap_or(Rgba::WHITE);
        self.pen_width = DEFAULT_PEN_WIDTH;
        self.line_style = LineStyle::default();
        self.fill_style = FillStyle::default();
        self.char_scale = 1.0;
        self.symbol_scale = 1.0;
        self.tick_scale = 1.0;
        self.fci = Fci::default();
        self.escape_char = DEFAULT_ESCAPE_CHAR;
        self.run_level = RunLevel::Initialized;
        self.pending_first_subpage = true;
        if self.device.is_some() {
            self.begin_device_page(op)?;
        }
        Ok(())
    }

    /// Attaches the device backend and opens the first page on it.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] when a backend is already
    /// attached, or [`PlotError::Device`] when the backend fails to open
    /// its first page.
    pub(crate) fn attach_device(
        &mut self,
        op: &'static str,
        backend: Box<dyn DeviceBackend>,
    ) -> PlotResult<()> {
        if self.device.is_some() {
            return Err(PlotError::invalid_argument(
                op,
                "a device backend is already attached",
            ));
        }
        self.caps = backend.capabilities();
        self.page_geometry = PageGeometry::from_capabilities(&self.caps);
        self.device = Some(backend);
        self.pending_first_subpage = true;
        self.begin_device_page(op)?;
        tracing::debug!(
            stream = %self.id,
            width_px = self.caps.width_px,
            height_px = self.caps.height_px,
            "device attached"
        );
        Ok(())
    }

    /// Opens a page and replays the pen state so the backend starts from a
    /// known configuration.
    fn begin_device_page(&mut self, op: &'static str) -> PlotResult<()> {
        self.dev_call(op, |d| d.begin_page())?;
        let color = self.pen_color;
        self.dev_call(op, |d| d.set_pen_color(color))?;
        let width = self.pen_width;
        self.dev_call(op, |d| d.set_pen_width(width))?;
        Ok(())
    }

    /// Finishes the open page and flushes the backend. Called when the
    /// stream is destroyed.
    pub(crate) fn close(&mut self, op: &'static str) -> PlotResult<()> {
        if self.device.is_some() {
            self.dev_call(op, |d| d.end_page())?;
            self.dev_call(op, |d| d.flush())?;
        }
        self.run_level = RunLevel::Uninitialized;
        Ok(())
    }

    /// Flushes buffered backend output.
    pub(crate) fn flush(&mut self, op: &'static str) -> PlotResult<()> {
        self.dev_call(op, |d| d.flush())
    }

    // =========================================================================
    // Pages, viewports, windows
    // =========================================================================

    /// Advances to the next subpage (`subpage == 0`) or jumps to a specific
    /// one-based subpage on the current page.
    ///
    /// Moving past the last subpage finishes the device page and begins a
    /// new one; the page's window list is cleared at that point. The first
    /// advance after initialization occupies the first subpage rather than
    /// skipping it.
    pub(crate) fn advance_page(&mut self, op: &'static str, subpage: usize) -> PlotResult<()> {
        if subpage == 0 {
            if self.pending_first_subpage {
                self.pending_first_subpage = false;
            } else if self.subpages.current_index() + 1 >= self.subpages.count() {
                // Device transition first so a backend failure leaves the
                // subpage cursor and window table untouched.
                self.dev_call(op, |d| d.end_page())?;
                self.dev_call(op, |d| d.begin_page())?;
                self.subpages.advance();
                self.windows.clear();
                self.pages_completed += 1;
                tracing::debug!(stream = %self.id, pages = self.pages_completed, "new page");
            } else {
                self.subpages.advance();
            }
        } else {
            self.subpages.select(op, subpage)?;
            self.pending_first_subpage = false;
        }
        Ok(())
    }

    /// Places a viewport by fractional coordinates within the current
    /// subpage.
    pub(crate) fn set_viewport(
        &mut self,
        op: &'static str,
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
    ) -> PlotResult<()> {
        let rect = NormRect::new(op, x_min, x_max, y_min, y_max)?;
        let placed = self
            .subpages
            .rect()
            .place(rect.x_min, rect.x_max, rect.y_min, rect.y_max);
        self.viewport = Some(placed);
        self.raise_level(RunLevel::ViewportDefined);
        Ok(())
    }

    /// Places the standard viewport (margin policy) on the current subpage.
    pub(crate) fn viewport_standard(&mut self) -> PlotResult<()> {
        let vp = standard_viewport(
            &self.page_geometry,
            self.subpages.rect(),
            self.char_height_mm(),
        );
        self.viewport = Some(vp);
        self.raise_level(RunLevel::ViewportDefined);
        Ok(())
    }

    /// Maps a world window onto the current viewport.
    pub(crate) fn set_window(
        &mut self,
        op: &'static str,
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
    ) -> PlotResult<()> {
        let window = WorldRect::new(op, x_min, x_max, y_min, y_max)?;
        self.push_window(op, window)
    }

    /// Records a new viewport/window pair and makes it current.
    pub(crate) fn push_window(&mut self, op: &'static str, window: WorldRect) -> PlotResult<()> {
        let Some(viewport) = self.viewport else {
            return Err(PlotError::precondition(
                self.id,
                op,
                RunLevel::ViewportDefined,
                self.run_level,
            ));
        };
        self.windows.push(WindowEntry { viewport, window });
        self.window = Some(window);
        self.raise_level(RunLevel::WindowDefined);
        tracing::trace!(stream = %self.id, index = self.windows.len() - 1, "window defined");
        Ok(())
    }

    /// Like [`Self::push_window`], but reuses the newest table entry when
    /// it already holds this exact viewport/window pair. Callers that
    /// re-establish an unchanged pair before every draw (strip charts)
    /// then leave the page's window table alone instead of growing it.
    pub(crate) fn reselect_window(&mut self, op: &'static str, window: WorldRect) -> PlotResult<()> {
        if let (Some(viewport), Some(tail)) = (self.viewport, self.windows.last()) {
            if *tail == (WindowEntry { viewport, window }) {
                self.window = Some(window);
                return Ok(());
            }
        }
        self.push_window(op, window)
    }

    /// Advances the page, fits a viewport to the window's aspect-ratio
    /// class, maps the window, and draws the frame outline, all in one
    /// call.
    pub(crate) fn environment(
        &mut self,
        op: &'static str,
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
        scaling: AxisScaling,
    ) -> PlotResult<()> {
        let window = WorldRect::new(op, x_min, x_max, y_min, y_max)?;
        self.advance_page(op, 0)?;
        let viewport = fitted_viewport(
            &self.page_geometry,
            self.subpages.rect(),
            &window,
            self.char_height_mm(),
            scaling,
        );
        self.viewport = Some(viewport);
        self.raise_level(RunLevel::ViewportDefined);
        self.push_window(op, window)?;
        self.emit_frame(op)
    }

    /// Reverse lookup from page-normalized device coordinates to world
    /// coordinates, searching this page's windows most-recent-first.
    #[must_use]
    pub(crate) fn device_world_lookup(&self, rx: f64, ry: f64) -> Option<(f64, f64, usize)> {
        device_to_world(&self.windows, rx, ry)
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    /// Selects the pen color by color map 0 index.
    pub(crate) fn set_pen_color_index(&mut self, op: &'static str, index: usize) -> PlotResult<()> {
        let color = self.cmap0_color(op, index)?;
        self.set_pen_color(op, color)
    }

    /// Sets the pen color directly.
    pub(crate) fn set_pen_color(&mut self, op: &'static str, color: Rgba) -> PlotResult<()> {
        self.pen_color = color;
        if self.device.is_some() {
            self.dev_call(op, |d| d.set_pen_color(color))?;
        }
        Ok(())
    }

    /// Sets the pen width in device pixels.
    pub(crate) fn set_pen_width(&mut self, op: &'static str, width: f64) -> PlotResult<()> {
        if !width.is_finite() || width <= 0.0 {
            return Err(PlotError::invalid_argument(
                op,
                format!("pen width must be positive and finite, got {width}"),
            ));
        }
        self.pen_width = width;
        if self.device.is_some() {
            self.dev_call(op, |d| d.set_pen_width(width))?;
        }
        Ok(())
    }

    /// Replaces one color map 0 entry.
    pub(crate) fn set_cmap0_entry(
        &mut self,
        op: &'static str,
        index: usize,
        color: Rgba,
    ) -> PlotResult<()> {
        if !self.cmap0.set_color(index, color) {
            return Err(PlotError::invalid_argument(
                op,
                format!("cmap0 index {index} out of range 0..{}", self.cmap0.len()),
            ));
        }
        Ok(())
    }

    /// Grows or shrinks color map 0.
    pub(crate) fn resize_cmap0(&mut self, op: &'static str, len: usize) -> PlotResult<()> {
        if len == 0 {
            return Err(PlotError::invalid_argument(
                op,
                "cmap0 must keep at least one entry",
            ));
        }
        self.cmap0.resize(len);
        Ok(())
    }

    /// Replaces color map 0 wholesale.
    pub(crate) fn set_cmap0(&mut self, op: &'static str, colors: &[Rgba]) -> PlotResult<()> {
        if colors.is_empty() {
            return Err(PlotError::invalid_argument(
                op,
                "cmap0 must keep at least one entry",
            ));
        }
        self.cmap0.set_all(colors);
        Ok(())
    }

    /// Rebuilds color map 1 from evenly spaced samples.
    pub(crate) fn set_cmap1_samples(&mut self, op: &'static str, samples: &[Rgba]) -> PlotResult<()> {
        self.cmap1 = ColorMap1::from_samples(samples)
            .map_err(|detail| PlotError::invalid_argument(op, detail))?;
        Ok(())
    }

    /// Rebuilds color map 1 from piecewise-linear control points.
    pub(crate) fn set_cmap1_control_points(
        &mut self,
        op: &'static str,
        space: Cmap1Space,
        points: &[Cmap1ControlPoint],
    ) -> PlotResult<()> {
        self.cmap1 = ColorMap1::from_control_points(space, points)
            .map_err(|detail| PlotError::invalid_argument(op, detail))?;
        Ok(())
    }

    /// Restricts color map 1 lookups to a sub-range.
    pub(crate) fn set_cmap1_range(
        &mut self,
        op: &'static str,
        min_color: f64,
        max_color: f64,
    ) -> PlotResult<()> {
        if !self.cmap1.set_range(min_color, max_color) {
            return Err(PlotError::invalid_argument(
                op,
                format!("cmap1 range [{min_color}, {max_color}] is not an ordered sub-range of [0, 1]"),
            ));
        }
        Ok(())
    }

    /// Selects a preset line style.
    pub(crate) fn set_line_style_preset(&mut self, op: &'static str, index: u8) -> PlotResult<()> {
        self.line_style = LineStyle::preset(op, index)?;
        Ok(())
    }

    /// Installs a custom dash pattern.
    pub(crate) fn set_dash_pattern(
        &mut self,
        op: &'static str,
        pairs: Vec<DashPair>,
    ) -> PlotResult<()> {
        self.line_style = LineStyle::custom(op, pairs)?;
        Ok(())
    }

    /// Selects a preset fill pattern.
    pub(crate) fn set_fill_preset(&mut self, op: &'static str, index: u8) -> PlotResult<()> {
        self.fill_style = FillStyle::preset(op, index)?;
        Ok(())
    }

    /// Installs a custom hatch pattern.
    pub(crate) fn set_hatch(
        &mut self,
        op: &'static str,
        families: Vec<HatchFamily>,
    ) -> PlotResult<()> {
        self.fill_style = FillStyle::custom(op, families)?;
        Ok(())
    }

    /// Sets the character height scale factor.
    pub(crate) fn set_char_scale(&mut self, op: &'static str, scale: f64) -> PlotResult<()> {
        self.char_scale = checked_scale(op, "character", scale)?;
        Ok(())
    }

    /// Sets the symbol size scale factor.
    pub(crate) fn set_symbol_scale(&mut self, op: &'static str, scale: f64) -> PlotResult<()> {
        self.symbol_scale = checked_scale(op, "symbol", scale)?;
        Ok(())
    }

    /// Sets the tick length scale factor.
    pub(crate) fn set_tick_scale(&mut self, op: &'static str, scale: f64) -> PlotResult<()> {
        self.tick_scale = checked_scale(op, "tick", scale)?;
        Ok(())
    }

    /// Sets the font characterization passed through to the backend.
    pub(crate) fn set_font(&mut self, fci: Fci) {
        self.fci = fci;
    }

    /// Sets the text escape character.
    pub(crate) fn set_escape_char(&mut self, op: &'static str, c: char) -> PlotResult<()> {
        if !ESCAPE_CHARS.contains(&c) {
            return Err(PlotError::invalid_argument(
                op,
                format!("escape character {c:?} is not one of {ESCAPE_CHARS:?}"),
            ));
        }
        self.escape_char = c;
        Ok(())
    }

    /// Updates family-file output settings.
    pub(crate) fn set_family(&mut self, op: &'static str, family: FamilySettings) -> PlotResult<()> {
        if family.member == 0 {
            return Err(PlotError::invalid_argument(
                op,
                "family member numbers are one-based",
            ));
        }
        if family.bytes_max == 0 {
            return Err(PlotError::invalid_argument(
                op,
                "family member size cap must be positive",
            ));
        }
        self.config.family = family;
        Ok(())
    }

    // =========================================================================
    // Drawing
    // =========================================================================

    /// Draws a polyline given paired coordinate vectors.
    pub(crate) fn polyline(&mut self, op: &'static str, xs: &[f64], ys: &[f64]) -> PlotResult<()> {
        check_paired(op, xs, ys)?;
        let points: Vec<(f64, f64)> = xs.iter().copied().zip(ys.iter().copied()).collect();
        self.emit_world_polyline(op, &points)
    }

    /// Fills a polygon given paired coordinate vectors.
    pub(crate) fn fill(&mut self, op: &'static str, xs: &[f64], ys: &[f64]) -> PlotResult<()> {
        check_paired(op, xs, ys)?;
        if xs.len() < 3 {
            return Err(PlotError::invalid_argument(
                op,
                format!("a polygon needs at least 3 vertices, got {}", xs.len()),
            ));
        }
        let points: Vec<(f64, f64)> = xs.iter().copied().zip(ys.iter().copied()).collect();
        self.emit_world_fill(op, &points)
    }

    /// Draws one glyph at each world point inside the window.
    pub(crate) fn glyphs(
        &mut self,
        op: &'static str,
        xs: &[f64],
        ys: &[f64],
        code: u32,
    ) -> PlotResult<()> {
        check_paired(op, xs, ys)?;
        let entry = self.window_entry(op)?;
        let fci = self.fci.raw();
        for (&wx, &wy) in xs.iter().zip(ys) {
            if !wx.is_finite() || !wy.is_finite() {
                continue;
            }
            if !entry.window.contains(wx, wy) {
                continue;
            }
            let p = self.to_device(&entry, wx, wy);
            self.dev_call(op, |d| d.draw_glyph(fci, code, p))?;
        }
        Ok(())
    }

    /// Draws text anchored at a world point. Anchors outside the current
    /// window are skipped.
    pub(crate) fn text(
        &mut self,
        op: &'static str,
        wx: f64,
        wy: f64,
        angle_deg: f64,
        justification: f64,
        text: &str,
    ) -> PlotResult<()> {
        if !wx.is_finite() || !wy.is_finite() {
            return Err(PlotError::invalid_argument(
                op,
                format!("text anchor must be finite, got ({wx}, {wy})"),
            ));
        }
        let entry = self.window_entry(op)?;
        if !entry.window.contains(wx, wy) {
            tracing::trace!(stream = %self.id, wx, wy, "text anchor outside window, skipped");
            return Ok(());
        }
        let p = self.to_device(&entry, wx, wy);
        let fci = self.fci.raw();
        self.dev_call(op, |d| d.draw_text(fci, text, p, angle_deg, justification))
    }

    /// Clips, maps, dashes, and strokes a world-space polyline with the
    /// stream's current line style.
    pub(crate) fn emit_world_polyline(
        &mut self,
        op: &'static str,
        points: &[(f64, f64)],
    ) -> PlotResult<()> {
        let style = self.line_style.clone();
        self.emit_polyline_with_style(op, points, &style)
    }

    /// Like [`Self::emit_world_polyline`] but with an explicit line style;
    /// used where per-pen styles override the stream's (strip charts,
    /// frame outlines).
    pub(crate) fn emit_polyline_with_style(
        &mut self,
        op: &'static str,
        points: &[(f64, f64)],
        style: &LineStyle,
    ) -> PlotResult<()> {
        if points.len() < 2 {
            return Ok(());
        }
        let entry = self.window_entry(op)?;
        let clip = window_clip_box(&entry.window);
        let pattern = self.dash_pattern_px(style);
        for piece in finite_runs(points) {
            for run in clip_polyline(&clip, piece) {
                let device: Vec<(f64, f64)> = run
                    .iter()
                    .map(|&(wx, wy)| {
                        let p = self.to_device(&entry, wx, wy);
                        (p.x, p.y)
                    })
                    .collect();
                if pattern.is_empty() {
                    self.stroke_device(op, &device)?;
                } else {
                    for dashed in dash_runs(&device, &pattern) {
                        self.stroke_device(op, &dashed)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Clips, maps, and fills a world-space polygon with the stream's
    /// current fill style.
    pub(crate) fn emit_world_fill(
        &mut self,
        op: &'static str,
        vertices: &[(f64, f64)],
    ) -> PlotResult<()> {
        let finite: Vec<(f64, f64)> = vertices
            .iter()
            .copied()
            .filter(|&(x, y)| x.is_finite() && y.is_finite())
            .collect();
        if finite.len() < 3 {
            return Ok(());
        }
        let entry = self.window_entry(op)?;
        let clip = window_clip_box(&entry.window);
        let clipped = clip_polygon(&clip, &finite);
        if clipped.len() < 3 {
            return Ok(());
        }
        let device: Vec<DevicePoint> = clipped
            .iter()
            .map(|&(wx, wy)| self.to_device(&entry, wx, wy))
            .collect();
        match self.fill_style.clone() {
            FillStyle::Solid => self.dev_call(op, |d| d.fill_polygon(&device)),
            FillStyle::Hatch(families) => {
                let outline: Vec<(f64, f64)> = device.iter().map(|p| (p.x, p.y)).collect();
                for family in families {
                    let spacing_px = family.spacing_mm * self.caps.pixels_per_mm;
                    for (a, b) in hatch_segments(&outline, family.angle_deg, spacing_px) {
                        self.stroke_device(op, &[a, b])?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Fills a world-space polygon solidly, ignoring the configured fill
    /// pattern. Cell plots use this.
    pub(crate) fn emit_world_fill_solid(
        &mut self,
        op: &'static str,
        vertices: &[(f64, f64)],
    ) -> PlotResult<()> {
        let finite: Vec<(f64, f64)> = vertices
            .iter()
            .copied()
            .filter(|&(x, y)| x.is_finite() && y.is_finite())
            .collect();
        if finite.len() < 3 {
            return Ok(());
        }
        let entry = self.window_entry(op)?;
        let clip = window_clip_box(&entry.window);
        let clipped = clip_polygon(&clip, &finite);
        if clipped.len() < 3 {
            return Ok(());
        }
        let device: Vec<DevicePoint> = clipped
            .iter()
            .map(|&(wx, wy)| self.to_device(&entry, wx, wy))
            .collect();
        self.dev_call(op, |d| d.fill_polygon(&device))
    }

    /// Strokes the current window's outline (solid, regardless of line
    /// style).
    pub(crate) fn emit_frame(&mut self, op: &'static str) -> PlotResult<()> {
        let entry = self.window_entry(op)?;
        let w = entry.window;
        let corners = [
            (w.x_min, w.y_min),
            (w.x_max, w.y_min),
            (w.x_max, w.y_max),
            (w.x_min, w.y_max),
            (w.x_min, w.y_min),
        ];
        self.emit_polyline_with_style(op, &corners, &LineStyle::Solid)
    }

    /// Sets the backend pen color without touching stream state; callers
    /// pair this with [`Self::restore_device_pen`].
    pub(crate) fn set_device_color(&mut self, op: &'static str, color: Rgba) -> PlotResult<()> {
        self.dev_call(op, |d| d.set_pen_color(color))
    }

    /// Sets the backend pen width without touching stream state.
    pub(crate) fn set_device_width(&mut self, op: &'static str, width: f64) -> PlotResult<()> {
        self.dev_call(op, |d| d.set_pen_width(width))
    }

    /// Re-emits the stream's pen color and width after a temporary
    /// device-side override.
    pub(crate) fn restore_device_pen(&mut self, op: &'static str) -> PlotResult<()> {
        let color = self.pen_color;
        self.dev_call(op, |d| d.set_pen_color(color))?;
        let width = self.pen_width;
        self.dev_call(op, |d| d.set_pen_width(width))
    }

    /// Allocates the next strip chart id on this stream.
    pub(crate) fn next_chart_id(&mut self) -> ChartId {
        let id = ChartId::new(self.next_chart);
        self.next_chart += 1;
        id
    }

    // =========================================================================
    // Pipeline internals
    // =========================================================================

    /// The active viewport/window pair.
    pub(crate) fn window_entry(&self, op: &'static str) -> PlotResult<WindowEntry> {
        match (self.viewport, self.window) {
            (Some(viewport), Some(window)) => Ok(WindowEntry { viewport, window }),
            _ => Err(PlotError::precondition(
                self.id,
                op,
                RunLevel::WindowDefined,
                self.run_level,
            )),
        }
    }

    /// World point to device pixels through the active mapping.
    fn to_device(&self, entry: &WindowEntry, wx: f64, wy: f64) -> DevicePoint {
        let (rx, ry) = entry.world_to_ndc(wx, wy);
        DevicePoint::new(
            rx * f64::from(self.caps.width_px),
            ry * f64::from(self.caps.height_px),
        )
    }

    /// Dash pattern scaled from millimetres to device pixels. Empty means
    /// solid.
    fn dash_pattern_px(&self, style: &LineStyle) -> Vec<(f64, f64)> {
        match style {
            LineStyle::Solid => Vec::new(),
            LineStyle::Dashed(pairs) => pairs
                .iter()
                .map(|p| {
                    (
                        p.mark_mm * self.caps.pixels_per_mm,
                        p.space_mm * self.caps.pixels_per_mm,
                    )
                })
                .collect(),
        }
    }

    /// Strokes one pen-down run in device coordinates.
    fn stroke_device(&mut self, op: &'static str, run: &[(f64, f64)]) -> PlotResult<()> {
        let Some((&(x0, y0), rest)) = run.split_first() else {
            return Ok(());
        };
        if rest.is_empty() {
            return Ok(());
        }
        self.dev_call(op, |d| d.move_to(DevicePoint::new(x0, y0)))?;
        for &(x, y) in rest {
            self.dev_call(op, |d| d.line_to(DevicePoint::new(x, y)))?;
        }
        Ok(())
    }

    /// Runs one backend primitive, mapping the absence of a device to
    /// [`PlotError::DeviceNotReady`] and backend failures to
    /// [`PlotError::Device`].
    fn dev_call<T>(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&mut dyn DeviceBackend) -> DeviceResult<T>,
    ) -> PlotResult<T> {
        let id = self.id;
        match self.device.as_deref_mut() {
            Some(dev) => f(dev).map_err(|source| PlotError::device(id, op, source)),
            None => Err(PlotError::DeviceNotReady { stream: id, op }),
        }
    }
}

/// Clip box covering a window, regardless of axis orientation.
fn window_clip_box(window: &WorldRect) -> ClipBox {
    ClipBox::new(window.x_min, window.x_max, window.y_min, window.y_max)
}

/// Rejects paired coordinate vectors of differing length.
fn check_paired(op: &'static str, xs: &[f64], ys: &[f64]) -> PlotResult<()> {
    if xs.len() != ys.len() {
        return Err(PlotError::invalid_argument(
            op,
            format!(
                "paired coordinate vectors differ in length: {} vs {}",
                xs.len(),
                ys.len()
            ),
        ));
    }
    Ok(())
}

/// Validates a scale factor.
fn checked_scale(op: &'static str, what: &str, scale: f64) -> PlotResult<f64> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(PlotError::invalid_argument(
            op,
            format!("{what} scale must be positive and finite, got {scale}"),
        ));
    }
    Ok(scale)
}

/// Splits a polyline at non-finite vertices, treating them as pen-up.
fn finite_runs(points: &[(f64, f64)]) -> Vec<&[(f64, f64)]> {
    let mut runs = Vec::new();
    let mut start = 0;
    for (i, &(x, y)) in points.iter().enumerate() {
        if !x.is_finite() || !y.is_finite() {
            if i > start {
                runs.push(&points[start..i]);
            }
            start = i + 1;
        }
    }
    if points.len() > start {
        runs.push(&points[start..]);
    }
    runs
}
