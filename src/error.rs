//! Error types and result utilities for plotting operations.

use crate::device::DeviceError;
use crate::session::StreamId;
use crate::stream::RunLevel;
use crate::stripchart::ChartId;
use thiserror::Error;

/// Convenience type alias for results that may contain a [`PlotError`].
pub type PlotResult<T> = Result<T, PlotError>;

/// Error types that can occur during plotting operations.
///
/// Every failed operation leaves the stream's run level and geometry state
/// exactly as they were before the call. Geometry-producing operations
/// (contouring, shading) buffer their output and commit it to the device only
/// on full success, so a returned error never means partially drawn output.
#[derive(Error, Debug)]
pub enum PlotError {
    /// Operation invoked below its required run level.
    ///
    /// Recovered by the caller re-ordering calls (e.g. defining a viewport
    /// before a window); the engine does not auto-correct.
    #[error(
        "'{op}' on stream {stream} requires run level {required} (stream is at {actual})"
    )]
    Precondition {
        /// Stream the operation was dispatched to.
        stream: StreamId,
        /// Name of the rejected operation.
        op: &'static str,
        /// Minimum run level the operation needs.
        required: RunLevel,
        /// Run level the stream was actually at.
        actual: RunLevel,
    },

    /// No device backend is attached to the stream.
    ///
    /// Fatal to the stream's drawing calls until a backend is attached.
    #[error("'{op}' on stream {stream} requires an attached device backend")]
    DeviceNotReady {
        /// Stream the operation was dispatched to.
        stream: StreamId,
        /// Name of the rejected operation.
        op: &'static str,
    },

    /// A device backend primitive failed.
    ///
    /// Propagated to the caller; the stream remains usable for subsequent
    /// calls.
    #[error("device backend failed during '{op}' on stream {stream}: {source}")]
    Device {
        /// Stream whose backend failed.
        stream: StreamId,
        /// Operation that was driving the backend.
        op: &'static str,
        /// The underlying backend failure.
        #[source]
        source: DeviceError,
    },

    /// Out-of-range matrix/vector index supplied to a transform or data
    /// routine. Surfaced before any partial geometry is emitted.
    #[error("index out of range in '{op}': {detail}")]
    Index {
        /// Operation that received the bad index.
        op: &'static str,
        /// Human-readable description of the offending index.
        detail: String,
    },

    /// A user callback attempted to re-enter the engine while the session
    /// lock was held. Failing fast here is what prevents a deadlock.
    #[error("'{op}' re-entered the engine from a callback while an operation is in progress")]
    Reentrancy {
        /// Operation attempted from inside the callback.
        op: &'static str,
    },

    /// Malformed configuration or argument.
    ///
    /// Note that a degenerate shade range (`shade_max <= shade_min`) is
    /// explicitly *not* an error — it is a silent no-op. Negative dimension
    /// counts, mismatched paired-vector lengths and malformed color-space
    /// selectors are errors.
    #[error("invalid argument to '{op}': {detail}")]
    InvalidArgument {
        /// Operation that received the bad argument.
        op: &'static str,
        /// Human-readable description of the problem.
        detail: String,
    },

    /// Operation addressed a stream id that does not exist (never created,
    /// or already destroyed).
    #[error("stream {0} does not exist")]
    UnknownStream(StreamId),

    /// Operation addressed a strip chart id that does not exist on the
    /// current stream.
    #[error("strip chart {0} does not exist on the current stream")]
    UnknownChart(ChartId),
}

impl PlotError {
    /// Create a [`PlotError::InvalidArgument`].
    pub fn invalid_argument(op: &'static str, detail: impl Into<String>) -> Self {
        Self::InvalidArgument {
            op,
            detail: detail.into(),
        }
    }

    /// Create a [`PlotError::Index`].
    pub fn index(op: &'static str, detail: impl Into<String>) -> Self {
        Self::Index {
            op,
            detail: detail.into(),
        }
    }

    /// Create a [`PlotError::Precondition`].
    pub(crate) fn precondition(
        stream: StreamId,
        op: &'static str,
        required: RunLevel,
        actual: RunLevel,
    ) -> Self {
        Self::Precondition {
            stream,
            op,
            required,
            actual,
        }
    }

    /// Create a [`PlotError::Device`] wrapping a backend failure.
    pub(crate) fn device(stream: StreamId, op: &'static str, source: DeviceError) -> Self {
        Self::Device { stream, op, source }
    }

    /// Whether this error was caused by how the caller used the API
    /// (ordering, arguments, indices) as opposed to a device-side failure.
    pub fn is_usage_error(&self) -> bool {
        match self {
            Self::Precondition { .. }
            | Self::Index { .. }
            | Self::Reentrancy { .. }
            | Self::InvalidArgument { .. }
            | Self::UnknownStream(_)
            | Self::UnknownChart(_) => true,
            Self::DeviceNotReady { .. } | Self::Device { .. } => false,
        }
    }

    /// Whether the stream that produced this error remains usable.
    ///
    /// Only [`PlotError::DeviceNotReady`] blocks further drawing (until a
    /// backend is attached); everything else leaves the stream ready for
    /// subsequent calls.
    pub fn stream_remains_usable(&self) -> bool {
        !matches!(self, Self::DeviceNotReady { .. })
    }
}
