//! Device backend interface and the recording backend used for tests.
//!
//! Concrete drivers (file, window, raster) are external collaborators; the
//! engine only talks to them through [`DeviceBackend`], a narrow synchronous
//! trait carrying device-space primitives. Every call happens under the
//! session lock, so backends never see concurrent calls and may keep
//! unsynchronized internal state.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

/// Device-side failure reported by a backend primitive.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Underlying I/O failure (file drivers, sockets, pipes).
    #[error("device I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// The backend rejected a primitive it cannot represent.
    #[error("device rejected '{primitive}': {detail}")]
    Rejected {
        /// Which primitive was rejected.
        primitive: &'static str,
        /// Why the backend rejected it.
        detail: String,
    },

    /// Any other backend-specific failure.
    #[error("device backend failure: {0}")]
    Backend(String),
}

impl DeviceError {
    /// Create a [`DeviceError::Rejected`].
    pub fn rejected(primitive: &'static str, detail: impl Into<String>) -> Self {
        Self::Rejected {
            primitive,
            detail: detail.into(),
        }
    }
}

/// Result alias for backend primitives.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Static description of a backend's surface.
///
/// Queried once at stream initialization; page geometry and the margin
/// policy are derived from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceCapabilities {
    /// Page width in device pixels.
    pub width_px: u32,
    /// Page height in device pixels.
    pub height_px: u32,
    /// Pixel density, pixels per millimetre (same for both axes).
    pub pixels_per_mm: f64,
    /// Whether the device supports xor drawing mode.
    pub supports_xor: bool,
    /// Whether the device compresses its output.
    pub supports_compression: bool,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            width_px: 1024,
            height_px: 768,
            pixels_per_mm: 4.0,
            supports_xor: false,
            supports_compression: false,
        }
    }
}

/// A point in device pixels. The origin is the lower-left page corner, y
/// growing upward; raster backends flip internally.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DevicePoint {
    /// Horizontal device coordinate in pixels.
    pub x: f64,
    /// Vertical device coordinate in pixels.
    pub y: f64,
}

impl DevicePoint {
    /// Create a device point.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Horizontal text justification passed through to the backend:
/// 0 = left edge at the anchor, 0.5 = centered, 1 = right edge.
pub type Justification = f64;

/// The primitive surface a registered device driver must expose.
///
/// The engine emits fully mapped device coordinates; backends perform no
/// coordinate math of their own. Text and glyph rendering stay external —
/// the backend receives the font characterization integer (FCI) and the
/// character codes untouched and resolves them however it likes.
pub trait DeviceBackend: Send {
    /// Called at the start of every page, including the first.
    fn begin_page(&mut self) -> DeviceResult<()>;

    /// Called when a page is complete, before the next `begin_page` and at
    /// stream close.
    fn end_page(&mut self) -> DeviceResult<()>;

    /// Move the pen without drawing.
    fn move_to(&mut self, p: DevicePoint) -> DeviceResult<()>;

    /// Draw from the current pen position.
    fn line_to(&mut self, p: DevicePoint) -> DeviceResult<()>;

    /// Fill a polygon given its vertices (implicitly closed).
    fn fill_polygon(&mut self, vertices: &[DevicePoint]) -> DeviceResult<()>;

    /// Set the pen color for subsequent strokes and fills.
    fn set_pen_color(&mut self, color: crate::color::Rgba) -> DeviceResult<()>;

    /// Set the pen width in device pixels.
    fn set_pen_width(&mut self, width: f64) -> DeviceResult<()>;

    /// Draw a single glyph. `fci` and `code` pass through to the external
    /// font resolver.
    fn draw_glyph(&mut self, fci: u32, code: u32, at: DevicePoint) -> DeviceResult<()>;

    /// Draw a text string at a baseline anchor with a rotation in degrees.
    fn draw_text(
        &mut self,
        fci: u32,
        text: &str,
        at: DevicePoint,
        angle_deg: f64,
        justification: Justification,
    ) -> DeviceResult<()>;

    /// Flush buffered output to the underlying sink.
    fn flush(&mut self) -> DeviceResult<()>;

    /// Static capability description.
    fn capabilities(&self) -> DeviceCapabilities;
}

// =============================================================================
// Recording backend
// =============================================================================

/// One recorded primitive call, in the order the engine issued it.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedPrimitive {
    /// `begin_page` was called.
    BeginPage,
    /// `end_page` was called.
    EndPage,
    /// Pen moved without drawing.
    MoveTo(DevicePoint),
    /// Stroke from the previous pen position.
    LineTo(DevicePoint),
    /// Filled polygon with its vertices.
    FillPolygon(Vec<DevicePoint>),
    /// Pen color change.
    PenColor(crate::color::Rgba),
    /// Pen width change.
    PenWidth(f64),
    /// Glyph draw with (fci, code, position).
    Glyph(u32, u32, DevicePoint),
    /// Text draw with (fci, text, position, angle, justification).
    Text(u32, String, DevicePoint, f64, f64),
    /// `flush` was called.
    Flush,
}

/// Cloneable handle onto a [`RecordingDevice`]'s call log.
///
/// The device is boxed away inside a stream once attached; callers keep a
/// handle from [`RecordingDevice::log`] and inspect the log afterwards.
#[derive(Debug, Clone, Default)]
pub struct RecordingLog {
    calls: Arc<Mutex<Vec<RecordedPrimitive>>>,
}

impl RecordingLog {
    fn push(&self, call: RecordedPrimitive) {
        self.calls.lock().push(call);
    }

    /// Everything recorded so far, in call order.
    pub fn snapshot(&self) -> Vec<RecordedPrimitive> {
        self.calls.lock().clone()
    }

    /// Drop all recorded calls.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    /// Number of recorded calls.
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    /// Count of recorded calls matching a predicate.
    pub fn count_matching(&self, pred: impl Fn(&RecordedPrimitive) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }
}

/// In-memory backend that records every primitive it receives.
///
/// Used throughout the test suite and useful for headless runs: the
/// recorded sequence *is* the observable output of the engine.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    capabilities: DeviceCapabilities,
    log: RecordingLog,
}

impl RecordingDevice {
    /// Create a recording backend advertising the given capabilities.
    pub fn new(capabilities: DeviceCapabilities) -> Self {
        Self {
            capabilities,
            log: RecordingLog::default(),
        }
    }

    /// A handle onto this device's call log, valid after the device has
    /// been attached to a stream.
    pub fn log(&self) -> RecordingLog {
        self.log.clone()
    }
}

impl DeviceBackend for RecordingDevice {
    fn begin_page(&mut self) -> DeviceResult<()> {
        self.log.push(RecordedPrimitive::BeginPage);
        Ok(())
    }

    fn end_page(&mut self) -> DeviceResult<()> {
        self.log.push(RecordedPrimitive::EndPage);
        Ok(())
    }

    fn move_to(&mut self, p: DevicePoint) -> DeviceResult<()> {
        self.log.push(RecordedPrimitive::MoveTo(p));
        Ok(())
    }

    fn line_to(&mut self, p: DevicePoint) -> DeviceResult<()> {
        self.log.push(RecordedPrimitive::LineTo(p));
        Ok(())
    }

    fn fill_polygon(&mut self, vertices: &[DevicePoint]) -> DeviceResult<()> {
        self.log.push(RecordedPrimitive::FillPolygon(vertices.to_vec()));
        Ok(())
    }

    fn set_pen_color(&mut self, color: crate::color::Rgba) -> DeviceResult<()> {
        self.log.push(RecordedPrimitive::PenColor(color));
        Ok(())
    }

    fn set_pen_width(&mut self, width: f64) -> DeviceResult<()> {
        self.log.push(RecordedPrimitive::PenWidth(width));
        Ok(())
    }

    fn draw_glyph(&mut self, fci: u32, code: u32, at: DevicePoint) -> DeviceResult<()> {
        self.log.push(RecordedPrimitive::Glyph(fci, code, at));
        Ok(())
    }

    fn draw_text(
        &mut self,
        fci: u32,
        text: &str,
        at: DevicePoint,
        angle_deg: f64,
        justification: Justification,
    ) -> DeviceResult<()> {
        self.log.push(RecordedPrimitive::Text(
            fci,
            text.to_string(),
            at,
            angle_deg,
            justification,
        ));
        Ok(())
    }

    fn flush(&mut self) -> DeviceResult<()> {
        self.log.push(RecordedPrimitive::Flush);
        Ok(())
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }
}

/// Backend whose primitives all fail, for exercising device-error paths.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct FailingDevice;

#[cfg(test)]
impl DeviceBackend for FailingDevice {
    fn begin_page(&mut self) -> DeviceResult<()> {
        Err(DeviceError::Backend("begin_page always fails".into()))
    }

    fn end_page(&mut self) -> DeviceResult<()> {
        Err(DeviceError::Backend("end_page always fails".into()))
    }

    fn move_to(&mut self, _p: DevicePoint) -> DeviceResult<()> {
        Err(DeviceError::Backend("move_to always fails".into()))
    }

    fn line_to(&mut self, _p: DevicePoint) -> DeviceResult<()> {
        Err(DeviceError::Backend("line_to always fails".into()))
    }

    fn fill_polygon(&mut self, _vertices: &[DevicePoint]) -> DeviceResult<()> {
        Err(DeviceError::Backend("fill_polygon always fails".into()))
    }

    fn set_pen_color(&mut self, _color: crate::color::Rgba) -> DeviceResult<()> {
        Err(DeviceError::Backend("set_pen_color always fails".into()))
    }

    fn set_pen_width(&mut self, _width: f64) -> DeviceResult<()> {
        Err(DeviceError::Backend("set_pen_width always fails".into()))
    }

    fn draw_glyph(&mut self, _fci: u32, _code: u32, _at: DevicePoint) -> DeviceResult<()> {
        Err(DeviceError::Backend("draw_glyph always fails".into()))
    }

    fn draw_text(
        &mut self,
        _fci: u32,
        _text: &str,
        _at: DevicePoint,
        _angle_deg: f64,
        _justification: Justification,
    ) -> DeviceResult<()> {
        Err(DeviceError::Backend("draw_text always fails".into()))
    }

    fn flush(&mut self) -> DeviceResult<()> {
        Err(DeviceError::Backend("flush always fails".into()))
    }

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgba;

    #[test]
    fn test_recording_device_preserves_call_order() {
        let mut dev = RecordingDevice::default();
        let log = dev.log();
        dev.begin_page().unwrap();
        dev.set_pen_color(Rgba::RED).unwrap();
        dev.move_to(DevicePoint::new(0.0, 0.0)).unwrap();
        dev.line_to(DevicePoint::new(10.0, 10.0)).unwrap();
        dev.end_page().unwrap();

        assert_eq!(log.len(), 5);
        let calls = log.snapshot();
        assert_eq!(calls[0], RecordedPrimitive::BeginPage);
        assert_eq!(calls[1], RecordedPrimitive::PenColor(Rgba::RED));
        assert_eq!(calls[4], RecordedPrimitive::EndPage);
    }

    #[test]
    fn test_capabilities_roundtrip() {
        let caps = DeviceCapabilities {
            width_px: 640,
            height_px: 480,
            pixels_per_mm: 2.0,
            supports_xor: true,
            supports_compression: false,
        };
        let dev = RecordingDevice::new(caps);
        assert_eq!(dev.capabilities(), caps);
    }
}
