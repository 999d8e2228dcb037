//! Session registry, stream dispatch, and the public operation surface.
//!
//! A [`PlotSession`] owns every stream behind one session-wide lock. All
//! operations funnel through a single dispatch path that takes the lock,
//! re-asserts the addressed stream as current, validates the stream's run
//! level against the operation's requirement, and only then runs it. The
//! coarse lock is deliberate: device backends are stateful and synchronous,
//! and per-call serialization is what makes interleaved multi-stream output
//! deterministic.
//!
//! Callbacks supplied to operations (coordinate transforms, definedness
//! predicates, map sources) run while the lock is held. A callback that
//! calls back into the engine from the same thread is refused with
//! [`PlotError::Reentrancy`] instead of deadlocking; a thread-local flag
//! makes that detection exact.

use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ndarray::ArrayView2;
use parking_lot::Mutex;

use crate::color::{Cmap1ControlPoint, Cmap1Space, Rgba};
use crate::config::{FamilySettings, PlotConfig};
use crate::contour::{IndexWindow, ShadeParams, ShadesParams};
use crate::device::DeviceBackend;
use crate::error::{PlotError, PlotResult};
use crate::fill::HatchFamily;
use crate::map::MapSource;
use crate::page::{AxisScaling, NormRect, WorldRect};
use crate::stream::{PlotStream, RunLevel};
use crate::stripchart::{ChartId, StripChartConfig};
use crate::style::{DashPair, Fci};
use crate::transform::CoordTransform;
use crate::vector::VectorParams;

/// Identifier of a plotting stream within its session.
///
/// Ids are allocated sequentially starting at zero and never reused within
/// a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct StreamId(u32);

impl StreamId {
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

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

thread_local! {
    /// Set while the current thread is inside an engine operation; used to
    /// refuse callback re-entry before it can deadlock on the session lock.
    static IN_ENGINE: Cell<bool> = const { Cell::new(false) };
}

/// RAII marker for the thread-local re-entrancy flag.
struct ReentrancyGuard;

impl ReentrancyGuard {
    fn enter(op: &'static str) -> PlotResult<Self> {
        IN_ENGINE.with(|flag| {
            if flag.get() {
                Err(PlotError::Reentrancy { op })
            } else {
                flag.set(true);
                Ok(Self)
            }
        })
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        IN_ENGINE.with(|flag| flag.set(false));
    }
}

#[derive(Debug, Default)]
struct SessionState {
    streams: HashMap<StreamId, PlotStream>,
    current: Option<StreamId>,
    next_id: u32,
}

/// A plotting session: the registry of streams and their shared lock.
///
/// Cloning is cheap and shares the underlying state, so a session can be
/// handed to as many threads as needed. Operations block while another
/// thread's operation is in flight and interleave at call granularity.
///
/// # Examples
///
/// ```
/// use plot_streams::{AxisScaling, PlotConfig, PlotSession, RecordingDevice};
///
/// let session = PlotSession::new();
/// let stream = session.create_stream()?;
/// stream.initialize(PlotConfig::default())?;
/// stream.attach_device(Box::new(RecordingDevice::default()))?;
/// stream.environment(0.0, 10.0, 0.0, 1.0, AxisScaling::Independent)?;
/// stream.polyline(&[0.0, 5.0, 10.0], &[0.0, 1.0, 0.0])?;
/// # Ok::<(), plot_streams::PlotError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct PlotSession {
    shared: Arc<Mutex<SessionState>>,
}

impl PlotSession {
    /// Creates an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new stream, makes it current, and returns its handle.
    ///
    /// The stream starts at [`RunLevel::Uninitialized`]; initialize it and
    /// attach a device backend before drawing.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::Reentrancy`] when called from inside another
    /// operation's callback.
    pub fn create_stream(&self) -> PlotResult<StreamHandle> {
        let _guard = ReentrancyGuard::enter("create_stream")?;
        let mut state = self.shared.lock();
        let id = StreamId::new(state.next_id);
        state.next_id += 1;
        state.streams.insert(id, PlotStream::new(id));
        state.current = Some(id);
        tracing::debug!(stream = %id, "stream created");
        Ok(StreamHandle {
            session: self.clone(),
            id,
        })
    }

    /// Makes a stream current.
    ///
    /// Selecting an id that does not exist is a logged no-op, so replayed
    /// call sequences survive missing streams. Note that every operation on
    /// a [`StreamHandle`] re-asserts its own stream as current anyway; this
    /// entry point exists for callers that track streams by id.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::Reentrancy`] when called from inside another
    /// operation's callback.
    pub fn select_stream(&self, id: StreamId) -> PlotResult<()> {
        let _guard = ReentrancyGuard::enter("select_stream")?;
        let mut state = self.shared.lock();
        if state.streams.contains_key(&id) {
            state.current = Some(id);
        } else {
            tracing::warn!(stream = %id, "select_stream: unknown stream id, ignoring");
        }
        Ok(())
    }

    /// The currently selected stream, if any.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::Reentrancy`] when called from inside another
    /// operation's callback.
    pub fn current_stream(&self) -> PlotResult<Option<StreamId>> {
        let _guard = ReentrancyGuard::enter("current_stream")?;
        Ok(self.shared.lock().current)
    }

    /// Number of live streams.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::Reentrancy`] when called from inside another
    /// operation's callback.
    pub fn stream_count(&self) -> PlotResult<usize> {
        let _guard = ReentrancyGuard::enter("stream_count")?;
        Ok(self.shared.lock().streams.len())
    }

    /// A handle bound to a stream id.
    ///
    /// The handle does not check liveness; operations on a destroyed stream
    /// fail with [`PlotError::UnknownStream`].
    #[must_use]
    pub fn handle(&self, id: StreamId) -> StreamHandle {
        StreamHandle {
            session: self.clone(),
            id,
        }
    }

    /// Destroys a stream, finishing its open page and flushing its device.
    ///
    /// The stream is removed even when the device fails during shutdown; the
    /// failure is still reported.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::UnknownStream`] for a dead id, or
    /// [`PlotError::Device`] when the backend fails while finishing.
    pub fn destroy_stream(&self, id: StreamId) -> PlotResult<()> {
        let _guard = ReentrancyGuard::enter("destroy_stream")?;
        let mut state = self.shared.lock();
        let Some(mut stream) = state.streams.remove(&id) else {
            return Err(PlotError::UnknownStream(id));
        };
        if state.current == Some(id) {
            state.current = None;
        }
        tracing::debug!(stream = %id, "stream destroyed");
        stream.close("destroy_stream")
    }

    /// The dispatch path every stream operation goes through: re-entrancy
    /// check, lock, defensive re-activation of the addressed stream, run
    /// level validation, then the operation itself.
    fn dispatch<T>(
        &self,
        id: StreamId,
        op: &'static str,
        required: RunLevel,
        f: impl FnOnce(&mut PlotStream) -> PlotResult<T>,
    ) -> PlotResult<T> {
        let _guard = ReentrancyGuard::enter(op)?;
        let mut state = self.shared.lock();
        if state.streams.contains_key(&id) && state.current != Some(id) {
            tracing::trace!(stream = %id, op, "re-activating stream");
            state.current = Some(id);
        }
        let Some(stream) = state.streams.get_mut(&id) else {
            return Err(PlotError::UnknownStream(id));
        };
        stream.require_level(op, required)?;
        f(stream)
    }
}

/// A cheap, cloneable handle bound to one stream of a session.
///
/// Every method takes the session lock for the duration of the call and
/// re-asserts this handle's stream as the session's current stream, so
/// handles from different threads can interleave without stepping on each
/// other's state.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    session: PlotSession,
    id: StreamId,
}

impl StreamHandle {
    /// The stream this handle addresses.
    #[inline]
    #[must_use]
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// The session this handle belongs to.
    #[must_use]
    pub fn session(&self) -> &PlotSession {
        &self.session
    }

    /// Destroys the stream. Equivalent to
    /// [`PlotSession::destroy_stream`].
    ///
    /// # Errors
    ///
    /// See [`PlotSession::destroy_stream`].
    pub fn destroy(self) -> PlotResult<()> {
        self.session.destroy_stream(self.id)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// (Re-)initializes the stream from a configuration snapshot, raising
    /// the run level to [`RunLevel::Initialized`].
    ///
    /// Re-running initialization on a live stream finishes its open page
    /// and rebuilds all state except the attached device; this is the only
    /// sanctioned run-level decrease.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] for a malformed
    /// configuration, or [`PlotError::Device`] when finishing the previous
    /// page fails.
    pub fn initialize(&self, config: PlotConfig) -> PlotResult<()> {
        const OP: &str = "initialize";
        self.session
            .dispatch(self.id, OP, RunLevel::Uninitialized, |s| {
                s.initialize(OP, config)
            })
    }

    /// Attaches the device backend that receives this stream's output.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::Precondition`] before initialization,
    /// [`PlotError::InvalidArgument`] when a backend is already attached,
    /// or [`PlotError::Device`] when the backend fails to open its first
    /// page.
    pub fn attach_device(&self, backend: Box<dyn DeviceBackend>) -> PlotResult<()> {
        const OP: &str = "attach_device";
        self.session
            .dispatch(self.id, OP, RunLevel::Initialized, |s| {
                s.attach_device(OP, backend)
            })
    }

    /// Flushes buffered device output.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::DeviceNotReady`] without a backend, or
    /// [`PlotError::Device`] when the backend fails.
    pub fn flush(&self) -> PlotResult<()> {
        const OP: &str = "flush";
        self.session
            .dispatch(self.id, OP, RunLevel::Initialized, |s| s.flush(OP))
    }

    /// Current run level.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::UnknownStream`] after the stream is destroyed.
    pub fn run_level(&self) -> PlotResult<RunLevel> {
        self.session
            .dispatch(self.id, "run_level", RunLevel::Uninitialized, |s| {
                Ok(s.run_level())
            })
    }

    // =========================================================================
    // Pages, viewports, windows
    // =========================================================================

    /// Advances to the next subpage (`subpage == 0`), starting a new device
    /// page when the grid wraps, or jumps to a one-based subpage.
    ///
    /// Starting a new page clears the page's window table.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::Index`] for an out-of-range subpage, or a
    /// device error when the page transition fails.
    pub fn advance_page(&self, subpage: usize) -> PlotResult<()> {
        const OP: &str = "advance_page";
        self.session
            .dispatch(self.id, OP, RunLevel::Initialized, |s| {
                s.advance_page(OP, subpage)
            })
    }

    /// Places a viewport by fractional coordinates within the current
    /// subpage, raising the run level to [`RunLevel::ViewportDefined`].
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] for edges outside `[0,1]` or
    /// an empty rectangle.
    pub fn set_viewport(&self, x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> PlotResult<()> {
        const OP: &str = "set_viewport";
        self.session
            .dispatch(self.id, OP, RunLevel::Initialized, |s| {
                s.set_viewport(OP, x_min, x_max, y_min, y_max)
            })
    }

    /// Places the standard viewport: margins of a few character heights,
    /// with a wider one on the left for axis numbering.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::Precondition`] before initialization.
    pub fn standard_viewport(&self) -> PlotResult<()> {
        self.session
            .dispatch(self.id, "standard_viewport", RunLevel::Initialized, |s| {
                s.viewport_standard()
            })
    }

    /// Maps a world window onto the current viewport, raising the run level
    /// to [`RunLevel::WindowDefined`]. Mirrored axes (`min > max`) are
    /// legal and flip the axis.
    ///
    /// Each call appends an entry to the page's window table consulted by
    /// [`Self::device_to_world`].
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::Precondition`] without a viewport, or
    /// [`PlotError::InvalidArgument`] for a zero-span or non-finite window.
    pub fn set_window(&self, x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> PlotResult<()> {
        const OP: &str = "set_window";
        self.session
            .dispatch(self.id, OP, RunLevel::ViewportDefined, |s| {
                s.set_window(OP, x_min, x_max, y_min, y_max)
            })
    }

    /// Sets up a complete drawing environment in one call: advances the
    /// page, fits a viewport to the window's aspect-ratio class, maps the
    /// window, and strokes the frame outline.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] for a malformed window, or a
    /// device error from the page transition or frame stroke.
    pub fn environment(
        &self,
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
        scaling: AxisScaling,
    ) -> PlotResult<()> {
        const OP: &str = "environment";
        self.session
            .dispatch(self.id, OP, RunLevel::Initialized, |s| {
                s.environment(OP, x_min, x_max, y_min, y_max, scaling)
            })
    }

    /// Reverse lookup from page-normalized device coordinates to world
    /// coordinates.
    ///
    /// Searches the windows defined on the current page newest-first and
    /// returns the world point plus the zero-based index of the matching
    /// window, or `None` when no viewport contains the point.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::Precondition`] before initialization.
    pub fn device_to_world(&self, rx: f64, ry: f64) -> PlotResult<Option<(f64, f64, usize)>> {
        self.session
            .dispatch(self.id, "device_to_world", RunLevel::Initialized, |s| {
                Ok(s.device_world_lookup(rx, ry))
            })
    }

    /// The current viewport in page-normalized coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::UnknownStream`] after the stream is destroyed.
    pub fn current_viewport(&self) -> PlotResult<Option<NormRect>> {
        self.session
            .dispatch(self.id, "current_viewport", RunLevel::Uninitialized, |s| {
                Ok(s.current_viewport())
            })
    }

    /// The current world window.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::UnknownStream`] after the stream is destroyed.
    pub fn current_window(&self) -> PlotResult<Option<WorldRect>> {
        self.session
            .dispatch(self.id, "current_window", RunLevel::Uninitialized, |s| {
                Ok(s.current_window())
            })
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    /// Selects the pen color by color map 0 index.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] for an out-of-range index.
    pub fn set_pen_color_index(&self, index: usize) -> PlotResult<()> {
        const OP: &str = "set_pen_color";
        self.session
            .dispatch(self.id, OP, RunLevel::Initialized, |s| {
                s.set_pen_color_index(OP, index)
            })
    }

    /// Sets the pen color directly from an RGBA value.
    ///
    /// # Errors
    ///
    /// Propagates device failures when the stream has a backend attached.
    pub fn set_pen_color(&self, color: Rgba) -> PlotResult<()> {
        const OP: &str = "set_pen_color";
        self.session
            .dispatch(self.id, OP, RunLevel::Initialized, |s| {
                s.set_pen_color(OP, color)
            })
    }

    /// Sets the pen width in device pixels.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] for a non-positive or
    /// non-finite width.
    pub fn set_pen_width(&self, width: f64) -> PlotResult<()> {
        const OP: &str = "set_pen_width";
        self.session
            .dispatch(self.id, OP, RunLevel::Initialized, |s| {
                s.set_pen_width(OP, width)
            })
    }

    /// Replaces one color map 0 entry. The palette may also be grown or
    /// shrunk with [`Self::resize_cmap0`].
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] for an out-of-range index.
    pub fn set_cmap0_entry(&self, index: usize, color: Rgba) -> PlotResult<()> {
        const OP: &str = "set_cmap0_entry";
        self.session
            .dispatch(self.id, OP, RunLevel::Uninitialized, |s| {
                s.set_cmap0_entry(OP, index, color)
            })
    }

    /// Resizes color map 0, padding new entries with opaque black.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] when `len` is zero.
    pub fn resize_cmap0(&self, len: usize) -> PlotResult<()> {
        const OP: &str = "resize_cmap0";
        self.session
            .dispatch(self.id, OP, RunLevel::Uninitialized, |s| {
                s.resize_cmap0(OP, len)
            })
    }

    /// Replaces color map 0 wholesale.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] for an empty palette.
    pub fn set_cmap0(&self, colors: &[Rgba]) -> PlotResult<()> {
        const OP: &str = "set_cmap0";
        self.session
            .dispatch(self.id, OP, RunLevel::Uninitialized, |s| {
                s.set_cmap0(OP, colors)
            })
    }

    /// Rebuilds color map 1 from evenly spaced RGBA samples.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] with fewer than two samples.
    pub fn set_cmap1_samples(&self, samples: &[Rgba]) -> PlotResult<()> {
        const OP: &str = "set_cmap1_samples";
        self.session
            .dispatch(self.id, OP, RunLevel::Uninitialized, |s| {
                s.set_cmap1_samples(OP, samples)
            })
    }

    /// Rebuilds color map 1 from piecewise-linear control points in RGB or
    /// HLS space.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] for malformed control points
    /// (unsorted intensities, endpoints away from 0 and 1, coordinates out
    /// of range).
    pub fn set_cmap1_control_points(
        &self,
        space: Cmap1Space,
        points: &[Cmap1ControlPoint],
    ) -> PlotResult<()> {
        const OP: &str = "set_cmap1_control_points";
        self.session
            .dispatch(self.id, OP, RunLevel::Uninitialized, |s| {
                s.set_cmap1_control_points(OP, space, points)
            })
    }

    /// Restricts color map 1 lookups to `[min_color, max_color]`.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] for an unordered or
    /// out-of-range pair.
    pub fn set_cmap1_range(&self, min_color: f64, max_color: f64) -> PlotResult<()> {
        const OP: &str = "set_cmap1_range";
        self.session
            .dispatch(self.id, OP, RunLevel::Uninitialized, |s| {
                s.set_cmap1_range(OP, min_color, max_color)
            })
    }

    /// Selects a preset line style (1 = solid, 2..=8 dashed).
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] outside `1..=8`.
    pub fn set_line_style(&self, index: u8) -> PlotResult<()> {
        const OP: &str = "set_line_style";
        self.session
            .dispatch(self.id, OP, RunLevel::Initialized, |s| {
                s.set_line_style_preset(OP, index)
            })
    }

    /// Installs a custom mark/space dash pattern in millimetres.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] for an empty, oversized, or
    /// zero-length pattern.
    pub fn set_dash_pattern(&self, pairs: Vec<DashPair>) -> PlotResult<()> {
        const OP: &str = "set_dash_pattern";
        self.session
            .dispatch(self.id, OP, RunLevel::Initialized, |s| {
                s.set_dash_pattern(OP, pairs)
            })
    }

    /// Selects a preset fill pattern (0 = solid, 1..=8 hatched).
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] above 8.
    pub fn set_fill_pattern(&self, index: u8) -> PlotResult<()> {
        const OP: &str = "set_fill_pattern";
        self.session
            .dispatch(self.id, OP, RunLevel::Initialized, |s| {
                s.set_fill_preset(OP, index)
            })
    }

    /// Installs a custom hatch of one or two line families.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] for zero or more than two
    /// families, or non-positive spacings.
    pub fn set_hatch(&self, families: Vec<HatchFamily>) -> PlotResult<()> {
        const OP: &str = "set_hatch";
        self.session
            .dispatch(self.id, OP, RunLevel::Initialized, |s| {
                s.set_hatch(OP, families)
            })
    }

    /// Sets the character height scale factor.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] for non-positive factors.
    pub fn set_char_scale(&self, scale: f64) -> PlotResult<()> {
        const OP: &str = "set_char_scale";
        self.session
            .dispatch(self.id, OP, RunLevel::Initialized, |s| {
                s.set_char_scale(OP, scale)
            })
    }

    /// Sets the symbol size scale factor.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] for non-positive factors.
    pub fn set_symbol_scale(&self, scale: f64) -> PlotResult<()> {
        const OP: &str = "set_symbol_scale";
        self.session
            .dispatch(self.id, OP, RunLevel::Initialized, |s| {
                s.set_symbol_scale(OP, scale)
            })
    }

    /// Sets the tick length scale factor.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] for non-positive factors.
    pub fn set_tick_scale(&self, scale: f64) -> PlotResult<()> {
        const OP: &str = "set_tick_scale";
        self.session
            .dispatch(self.id, OP, RunLevel::Initialized, |s| {
                s.set_tick_scale(OP, scale)
            })
    }

    /// Sets the font characterization passed through to the backend with
    /// every text and glyph call.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::UnknownStream`] after the stream is destroyed.
    pub fn set_font(&self, fci: Fci) -> PlotResult<()> {
        self.session
            .dispatch(self.id, "set_font", RunLevel::Uninitialized, |s| {
                s.set_font(fci);
                Ok(())
            })
    }

    /// Current font characterization.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::UnknownStream`] after the stream is destroyed.
    pub fn font(&self) -> PlotResult<Fci> {
        self.session
            .dispatch(self.id, "font", RunLevel::Uninitialized, |s| Ok(s.font()))
    }

    /// Sets the escape character recognized inside text strings.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] for characters outside the
    /// accepted punctuation set.
    pub fn set_escape_char(&self, c: char) -> PlotResult<()> {
        const OP: &str = "set_escape_char";
        self.session
            .dispatch(self.id, OP, RunLevel::Uninitialized, |s| {
                s.set_escape_char(OP, c)
            })
    }

    /// Current text escape character.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::UnknownStream`] after the stream is destroyed.
    pub fn escape_char(&self) -> PlotResult<char> {
        self.session
            .dispatch(self.id, "escape_char", RunLevel::Uninitialized, |s| {
                Ok(s.escape_char())
            })
    }

    /// Family-file output settings.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::UnknownStream`] after the stream is destroyed.
    pub fn family(&self) -> PlotResult<FamilySettings> {
        self.session
            .dispatch(self.id, "family", RunLevel::Uninitialized, |s| {
                Ok(s.family())
            })
    }

    /// Updates family-file output settings.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] for a zero member number or
    /// size cap.
    pub fn set_family(&self, family: FamilySettings) -> PlotResult<()> {
        const OP: &str = "set_family";
        self.session
            .dispatch(self.id, OP, RunLevel::Uninitialized, |s| {
                s.set_family(OP, family)
            })
    }

    // =========================================================================
    // Drawing
    // =========================================================================

    /// Draws a polyline through world points, clipped to the window and
    /// stroked with the current line style.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::Precondition`] below
    /// [`RunLevel::WindowDefined`], [`PlotError::InvalidArgument`] for
    /// mismatched vector lengths, or a device error.
    pub fn polyline(&self, xs: &[f64], ys: &[f64]) -> PlotResult<()> {
        const OP: &str = "polyline";
        self.session
            .dispatch(self.id, OP, RunLevel::WindowDefined, |s| {
                s.polyline(OP, xs, ys)
            })
    }

    /// Draws one line segment in world coordinates.
    ///
    /// # Errors
    ///
    /// As for [`Self::polyline`].
    pub fn line(&self, x0: f64, y0: f64, x1: f64, y1: f64) -> PlotResult<()> {
        const OP: &str = "line";
        self.session
            .dispatch(self.id, OP, RunLevel::WindowDefined, |s| {
                s.polyline(OP, &[x0, x1], &[y0, y1])
            })
    }

    /// Fills a polygon given in world coordinates, clipped to the window,
    /// using the current fill style (solid or hatched).
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] for fewer than three
    /// vertices or mismatched vector lengths, or a device error.
    pub fn fill(&self, xs: &[f64], ys: &[f64]) -> PlotResult<()> {
        const OP: &str = "fill";
        self.session
            .dispatch(self.id, OP, RunLevel::WindowDefined, |s| s.fill(OP, xs, ys))
    }

    /// Draws one glyph at each world point; points outside the window are
    /// skipped.
    ///
    /// # Errors
    ///
    /// As for [`Self::polyline`].
    pub fn glyphs(&self, xs: &[f64], ys: &[f64], code: u32) -> PlotResult<()> {
        const OP: &str = "glyphs";
        self.session
            .dispatch(self.id, OP, RunLevel::WindowDefined, |s| {
                s.glyphs(OP, xs, ys, code)
            })
    }

    /// Draws text anchored at a world point, rotated by `angle_deg` and
    /// justified horizontally (0 = left, 0.5 = centered, 1 = right). The
    /// justification is handed to the backend untouched.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] for a non-finite anchor, or
    /// a device error.
    pub fn text(
        &self,
        x: f64,
        y: f64,
        angle_deg: f64,
        justification: f64,
        text: &str,
    ) -> PlotResult<()> {
        const OP: &str = "text";
        self.session
            .dispatch(self.id, OP, RunLevel::WindowDefined, |s| {
                s.text(OP, x, y, angle_deg, justification, text)
            })
    }

    // =========================================================================
    // Field plots
    // =========================================================================

    /// Draws contour lines of a scalar field at the given levels.
    ///
    /// Cell corners are mapped to world coordinates through `transform`;
    /// the index window restricts which part of the field is contoured.
    /// All geometry is computed before anything is sent to the device, so
    /// an error leaves no partial output.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::Index`] when the window exceeds the field,
    /// [`PlotError::Reentrancy`] when a callback re-enters the engine, or
    /// a device error during commit.
    pub fn contour(
        &self,
        field: ArrayView2<'_, f64>,
        window: &IndexWindow,
        levels: &[f64],
        transform: &dyn CoordTransform,
    ) -> PlotResult<()> {
        self.session
            .dispatch(self.id, "contour", RunLevel::WindowDefined, |s| {
                crate::contour::draw_contour(s, field, window, levels, transform)
            })
    }

    /// Fills the region of a scalar field between two levels.
    ///
    /// A degenerate band (`shade_max <= shade_min`) is a silent no-op by
    /// contract. The optional `defined` predicate excludes regions from
    /// the fill.
    ///
    /// # Errors
    ///
    /// As for [`Self::contour`], plus [`PlotError::InvalidArgument`] for a
    /// bad fill selector.
    pub fn shade(
        &self,
        field: ArrayView2<'_, f64>,
        window: &IndexWindow,
        params: &ShadeParams,
        defined: Option<&dyn Fn(f64, f64) -> bool>,
        transform: &dyn CoordTransform,
    ) -> PlotResult<()> {
        self.session
            .dispatch(self.id, "shade", RunLevel::WindowDefined, |s| {
                crate::contour::draw_shade(s, field, window, params, defined, transform)
            })
    }

    /// Fills consecutive bands between a ladder of levels, colored through
    /// color map 1.
    ///
    /// Bands whose level pair is not increasing are skipped with a log
    /// entry; the remaining bands still draw.
    ///
    /// # Errors
    ///
    /// As for [`Self::shade`].
    pub fn shades(
        &self,
        field: ArrayView2<'_, f64>,
        window: &IndexWindow,
        levels: &[f64],
        params: &ShadesParams,
        defined: Option<&dyn Fn(f64, f64) -> bool>,
        transform: &dyn CoordTransform,
    ) -> PlotResult<()> {
        self.session
            .dispatch(self.id, "shades", RunLevel::WindowDefined, |s| {
                crate::contour::draw_shades(s, field, window, levels, params, defined, transform)
            })
    }

    /// Draws a vector field as arrows anchored at grid nodes.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] when the component arrays
    /// differ in shape, or as for [`Self::contour`].
    pub fn vector_field(
        &self,
        u: ArrayView2<'_, f64>,
        v: ArrayView2<'_, f64>,
        params: &VectorParams,
        transform: &dyn CoordTransform,
    ) -> PlotResult<()> {
        self.session
            .dispatch(self.id, "vector_field", RunLevel::WindowDefined, |s| {
                crate::vector::draw_vectors(s, u, v, params, transform)
            })
    }

    /// Draws a scalar field as filled cells colored through color map 1,
    /// clamping values to `[value_min, value_max]`.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] for an empty value range, or
    /// as for [`Self::contour`].
    pub fn image(
        &self,
        field: ArrayView2<'_, f64>,
        window: &IndexWindow,
        value_min: f64,
        value_max: f64,
        transform: &dyn CoordTransform,
    ) -> PlotResult<()> {
        self.session
            .dispatch(self.id, "image", RunLevel::WindowDefined, |s| {
                crate::image::draw_image(s, field, window, value_min, value_max, transform)
            })
    }

    /// Draws polylines fetched from an external map source, optionally
    /// passed through a projection.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] when the source rejects the
    /// request, or a device error.
    pub fn draw_map(
        &self,
        source: &dyn MapSource,
        dataset: &str,
        bounds: &WorldRect,
        projection: Option<&dyn Fn(f64, f64) -> (f64, f64)>,
    ) -> PlotResult<()> {
        self.session
            .dispatch(self.id, "draw_map", RunLevel::WindowDefined, |s| {
                crate::map::draw_map(s, source, dataset, bounds, projection)
            })
    }

    // =========================================================================
    // Strip charts
    // =========================================================================

    /// Creates a strip chart on this stream and draws its initial frame
    /// and legends.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] for a malformed
    /// configuration (no pens, more than four, non-positive jump factor,
    /// unordered bounds), or a device error.
    pub fn strip_create(&self, config: StripChartConfig) -> PlotResult<ChartId> {
        self.session
            .dispatch(self.id, "strip_create", RunLevel::Initialized, |s| {
                crate::stripchart::create(s, config)
            })
    }

    /// Appends one sample to a strip chart pen, extending and redrawing
    /// the chart when the sample crosses the right edge.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::UnknownChart`] for a dead chart id,
    /// [`PlotError::InvalidArgument`] for a bad pen index or non-finite
    /// sample, or a device error.
    pub fn strip_append(&self, chart: ChartId, pen: usize, x: f64, y: f64) -> PlotResult<()> {
        self.session
            .dispatch(self.id, "strip_append", RunLevel::Initialized, |s| {
                crate::stripchart::append(s, chart, pen, x, y)
            })
    }

    /// Destroys a strip chart, releasing its sample buffers.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::UnknownChart`] for a dead chart id.
    pub fn strip_delete(&self, chart: ChartId) -> PlotResult<()> {
        self.session
            .dispatch(self.id, "strip_delete", RunLevel::Initialized, |s| {
                crate::stripchart::delete(s, chart)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{FailingDevice, RecordedPrimitive, RecordingDevice, RecordingLog};
    use ndarray::array;

    fn ready_stream(session: &PlotSession) -> (StreamHandle, RecordingLog) {
        let stream = session.create_stream().unwrap();
        stream.initialize(PlotConfig::default()).unwrap();
        let device = RecordingDevice::default();
        let log = device.log();
        stream.attach_device(Box::new(device)).unwrap();
        (stream, log)
    }

    #[test]
    fn test_stream_ids_are_sequential_and_current_follows_creation() {
        let session = PlotSession::new();
        let a = session.create_stream().unwrap();
        let b = session.create_stream().unwrap();
        assert_eq!(a.id().as_u32(), 0);
        assert_eq!(b.id().as_u32(), 1);
        assert_eq!(session.current_stream().unwrap(), Some(b.id()));
        assert_eq!(session.stream_count().unwrap(), 2);
    }

    #[test]
    fn test_operations_reassert_their_own_stream_as_current() {
        let session = PlotSession::new();
        let (a, _log_a) = ready_stream(&session);
        let (b, _log_b) = ready_stream(&session);
        assert_eq!(session.current_stream().unwrap(), Some(b.id()));

        a.set_pen_width(2.0).unwrap();
        assert_eq!(session.current_stream().unwrap(), Some(a.id()));

        b.advance_page(0).unwrap();
        assert_eq!(session.current_stream().unwrap(), Some(b.id()));
    }

    #[test]
    fn test_select_stream_ignores_unknown_ids() {
        let session = PlotSession::new();
        let a = session.create_stream().unwrap();
        session.select_stream(StreamId::new(99)).unwrap();
        // The bogus selection changed nothing.
        assert_eq!(session.current_stream().unwrap(), Some(a.id()));
    }

    #[test]
    fn test_destroyed_streams_report_unknown_stream() {
        let session = PlotSession::new();
        let (stream, _log) = ready_stream(&session);
        let id = stream.id();
        session.destroy_stream(id).unwrap();
        assert_eq!(session.stream_count().unwrap(), 0);
        assert_eq!(session.current_stream().unwrap(), None);

        let err = session.handle(id).set_pen_width(2.0).unwrap_err();
        assert!(matches!(err, PlotError::UnknownStream(bad) if bad == id));
        assert!(
            matches!(session.destroy_stream(id), Err(PlotError::UnknownStream(_))),
            "double destroy must fail"
        );
    }

    #[test]
    fn test_destroy_finishes_the_device_page() {
        let session = PlotSession::new();
        let (stream, log) = ready_stream(&session);
        log.clear();
        stream.destroy().unwrap();
        let calls = log.snapshot();
        assert_eq!(calls[0], RecordedPrimitive::EndPage);
        assert_eq!(calls[1], RecordedPrimitive::Flush);
    }

    #[test]
    fn test_run_level_gating_applies_through_the_handle() {
        let session = PlotSession::new();
        let stream = session.create_stream().unwrap();

        // Drawing on an uninitialized stream is a precondition error.
        let err = stream.polyline(&[0.0, 1.0], &[0.0, 1.0]).unwrap_err();
        assert!(matches!(
            err,
            PlotError::Precondition { required, actual, .. }
                if required == RunLevel::WindowDefined && actual == RunLevel::Uninitialized
        ));

        stream.initialize(PlotConfig::default()).unwrap();
        assert_eq!(stream.run_level().unwrap(), RunLevel::Initialized);
        let err = stream.set_window(0.0, 1.0, 0.0, 1.0).unwrap_err();
        assert!(matches!(err, PlotError::Precondition { .. }));
    }

    #[test]
    fn test_full_setup_and_draw_through_the_handle() {
        let session = PlotSession::new();
        let (stream, log) = ready_stream(&session);
        stream.set_viewport(0.1, 0.9, 0.1, 0.9).unwrap();
        stream.set_window(0.0, 100.0, 0.0, 100.0).unwrap();
        log.clear();

        stream.polyline(&[10.0, 90.0], &[10.0, 90.0]).unwrap();
        stream.glyphs(&[50.0], &[50.0], '+' as u32).unwrap();
        stream.text(50.0, 95.0, 0.0, 0.5, "title").unwrap();

        assert!(log.count_matching(|c| matches!(c, RecordedPrimitive::LineTo(_))) > 0);
        assert_eq!(
            log.count_matching(|c| matches!(c, RecordedPrimitive::Glyph(..))),
            1
        );
        assert_eq!(
            log.count_matching(|c| matches!(c, RecordedPrimitive::Text(..))),
            1
        );
    }

    #[test]
    fn test_device_to_world_resolves_through_the_window_table() {
        let session = PlotSession::new();
        let (stream, _log) = ready_stream(&session);
        stream.set_viewport(0.0, 1.0, 0.0, 1.0).unwrap();
        stream.set_window(0.0, 10.0, 0.0, 10.0).unwrap();

        let (wx, wy, index) = stream.device_to_world(0.5, 0.5).unwrap().unwrap();
        assert!((wx - 5.0).abs() < 1e-9);
        assert!((wy - 5.0).abs() < 1e-9);
        assert_eq!(index, 0);

        assert!(stream.device_to_world(2.0, 2.0).unwrap().is_none());
    }

    #[test]
    fn test_handles_are_usable_from_multiple_threads() {
        let session = PlotSession::new();
        let (a, log_a) = ready_stream(&session);
        let (b, log_b) = ready_stream(&session);
        for handle in [&a, &b] {
            handle.set_viewport(0.0, 1.0, 0.0, 1.0).unwrap();
            handle.set_window(0.0, 1.0, 0.0, 1.0).unwrap();
        }
        log_a.clear();
        log_b.clear();

        let threads: Vec<_> = [a, b]
            .into_iter()
            .map(|handle| {
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let t = f64::from(i) / 50.0;
                        handle.line(t, 0.0, t, 1.0).unwrap();
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        // Every stroke went to its own stream's device, and none were lost.
        assert_eq!(
            log_a.count_matching(|c| matches!(c, RecordedPrimitive::MoveTo(_))),
            50
        );
        assert_eq!(
            log_b.count_matching(|c| matches!(c, RecordedPrimitive::MoveTo(_))),
            50
        );
    }

    #[test]
    fn test_failed_operations_leave_geometry_state_unchanged() {
        let session = PlotSession::new();
        let (stream, _log) = ready_stream(&session);
        stream.set_viewport(0.2, 0.8, 0.2, 0.8).unwrap();
        stream.set_window(0.0, 1.0, 0.0, 1.0).unwrap();
        let viewport_before = stream.current_viewport().unwrap();
        let window_before = stream.current_window().unwrap();

        assert!(stream.set_window(0.0, 0.0, 0.0, 1.0).is_err());
        assert!(stream.set_viewport(0.9, 0.1, 0.0, 1.0).is_err());

        assert_eq!(stream.current_viewport().unwrap(), viewport_before);
        assert_eq!(stream.current_window().unwrap(), window_before);
        assert_eq!(stream.run_level().unwrap(), RunLevel::WindowDefined);
    }

    #[test]
    fn test_session_queries_are_refused_inside_callbacks() {
        struct QueryingTransform {
            session: PlotSession,
            queried: Cell<bool>,
        }
        impl CoordTransform for QueryingTransform {
            fn evaluate(&self, i: f64, j: f64) -> PlotResult<(f64, f64)> {
                // Read-only session queries must fail fast here too, not
                // block on the lock the engine already holds.
                assert!(matches!(
                    self.session.current_stream(),
                    Err(PlotError::Reentrancy { .. })
                ));
                assert!(matches!(
                    self.session.stream_count(),
                    Err(PlotError::Reentrancy { .. })
                ));
                self.queried.set(true);
                Ok((i, j))
            }
        }

        let session = PlotSession::new();
        let (stream, _log) = ready_stream(&session);
        stream.set_viewport(0.0, 1.0, 0.0, 1.0).unwrap();
        stream.set_window(0.0, 2.0, 0.0, 2.0).unwrap();

        let field = array![[0.0, 1.0], [1.0, 2.0]];
        let transform = QueryingTransform {
            session: session.clone(),
            queried: Cell::new(false),
        };
        stream
            .contour(
                field.view(),
                &IndexWindow::full(field.dim()),
                &[0.5],
                &transform,
            )
            .unwrap();
        assert!(transform.queried.get(), "the transform never ran");
    }

    #[test]
    fn test_backend_failures_propagate_and_leave_the_stream_usable() {
        let session = PlotSession::new();
        let stream = session.create_stream().unwrap();
        stream.initialize(PlotConfig::default()).unwrap();

        // The backend refuses its first page at attach time.
        let err = stream.attach_device(Box::new(FailingDevice)).unwrap_err();
        assert!(matches!(err, PlotError::Device { .. }));

        // Geometry setup never touches the backend and still works.
        stream.set_viewport(0.1, 0.9, 0.1, 0.9).unwrap();
        stream.set_window(0.0, 1.0, 0.0, 1.0).unwrap();
        let window_before = stream.current_window().unwrap();

        let err = stream.polyline(&[0.2, 0.8], &[0.2, 0.8]).unwrap_err();
        assert!(matches!(err, PlotError::Device { .. }));
        assert!(!err.is_usage_error());

        // The failure is reported, not sticky: state is intact, state-only
        // calls succeed, and the next device call reports again.
        assert_eq!(stream.current_window().unwrap(), window_before);
        assert_eq!(stream.run_level().unwrap(), RunLevel::WindowDefined);
        stream.set_line_style(2).unwrap();
        let err = stream.line(0.0, 0.0, 1.0, 1.0).unwrap_err();
        assert!(matches!(err, PlotError::Device { .. }));
    }
}
