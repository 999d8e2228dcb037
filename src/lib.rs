// Correctness and logic
#![warn(clippy::unit_cmp)] // Detects comparing unit types
#![warn(clippy::match_same_arms)]
// Duplicate match arms

// Performance-focused
#![warn(clippy::inefficient_to_string)] // `format!("{}", x)` vs `x.to_string()`
#![warn(clippy::map_clone)] // Cloning inside `map()` unnecessarily
#![warn(clippy::unnecessary_to_owned)] // Detects redundant `.to_owned()` or `.clone()`
#![warn(clippy::large_stack_arrays)] // Helps avoid stack overflows
#![warn(clippy::box_collection)] // Warns on boxed `Vec`, `String`, etc.
#![warn(clippy::vec_box)] // Avoids using `Vec<Box<T>>` when unnecessary
#![warn(clippy::needless_collect)] // Avoids `.collect().iter()` chains

// Style and idiomatic Rust
#![warn(clippy::redundant_clone)] // Detects unnecessary `.clone()`
#![warn(clippy::identity_op)] // e.g., `x + 0`, `x * 1`
#![warn(clippy::needless_return)] // Avoids `return` at the end of functions
#![warn(clippy::let_unit_value)] // Avoids binding `()` to variables
#![warn(clippy::manual_map)] // Use `.map()` instead of manual `match`
#![warn(clippy::unwrap_used)] // Avoids using `unwrap()`

// Maintainability
#![warn(clippy::missing_panics_doc)] // Docs for functions that might panic
#![warn(clippy::missing_safety_doc)] // Docs for `unsafe` functions
#![warn(clippy::missing_const_for_fn)] // Suggests making eligible functions `const`
#![allow(clippy::too_many_arguments)]
// Allow functions with many parameters (very few and far between)
#![deny(missing_docs)] // Documentation is a must for release

//! # PlotStreams
//!
//! A multi-stream 2D plotting core for Rust: sessions of independently
//! configured plot streams, each with its own viewport/window state machine,
//! pen and color state, and device backend, sharing one engine lock so
//! threads can interleave drawing calls safely.
//!
//! ## Overview
//!
//! The crate separates *what* is drawn from *where* it lands:
//!
//! - World coordinates are mapped through a window onto a viewport, which is
//!   itself a normalized rectangle on a device page (see [`page`]).
//! - Drawing primitives are clipped to the window, mapped to device pixels,
//!   dashed if the pen asks for it, and handed to a [`DeviceBackend`]
//!   implementation (see [`device`]).
//! - Field plots (contour lines, shaded bands, vector arrows, cell images)
//!   accept a grid of samples plus a [`CoordTransform`] that places grid
//!   indices in world space (see [`contour`], [`vector`]).
//! - Strip charts maintain their own sample buffers and redraw themselves as
//!   data scrolls past the window edge (see [`stripchart`]).
//!
//! Every operation goes through the owning [`PlotSession`], which holds the
//! stream registry behind a single lock and refuses re-entrant calls from
//! user callbacks instead of deadlocking.
//!
//! ## Installation
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! plot_streams = "0.1.0"
//! ```
//!
//! or more easily with:
//! ```bash
//! cargo add plot_streams
//! ```
//!
//! ## Features
//!
//! - `serialization`: `serde` derives on the plain-data types (colors,
//!   rectangles, styles, chart configurations) for persisting plot setups.
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`PlotResult`]. Errors distinguish
//! misuse of the API (calling out of order, bad arguments, dead ids) from
//! device-side failures:
//!
//! ```rust
//! use plot_streams::{PlotError, PlotResult};
//!
//! let result: PlotResult<()> = Err(PlotError::invalid_argument(
//!     "set_pen_width",
//!     "width must be positive",
//! ));
//!
//! match result {
//!     Ok(()) => {}
//!     Err(err) if err.is_usage_error() => eprintln!("bad call: {err}"),
//!     Err(err) => eprintln!("device trouble: {err}"),
//! }
//! ```
//!
//! ## Quick Start
//!
//! ### Sessions and Streams
//!
//! ```rust
//! use plot_streams::{PlotConfig, PlotSession, RecordingDevice};
//!
//! let session = PlotSession::new();
//! let stream = session.create_stream()?;
//! stream.initialize(PlotConfig::default())?;
//! stream.attach_device(Box::new(RecordingDevice::default()))?;
//!
//! // Standard viewport, then a world window mapped onto it.
//! stream.standard_viewport()?;
//! stream.set_window(0.0, 10.0, -1.5, 1.5)?;
//!
//! let xs: Vec<f64> = (0..=100).map(|k| f64::from(k) * 0.1).collect();
//! let ys: Vec<f64> = xs.iter().map(|x| x.sin()).collect();
//! stream.polyline(&xs, &ys)?;
//! stream.flush()?;
//! # Ok::<(), plot_streams::PlotError>(())
//! ```
//!
//! ### Field Plots
//!
//! ```rust
//! use ndarray::array;
//! use plot_streams::{IdentityTransform, IndexWindow, PlotConfig, PlotSession, RecordingDevice};
//!
//! let session = PlotSession::new();
//! let stream = session.create_stream()?;
//! stream.initialize(PlotConfig::default())?;
//! stream.attach_device(Box::new(RecordingDevice::default()))?;
//! stream.standard_viewport()?;
//! stream.set_window(0.0, 2.0, 0.0, 2.0)?;
//!
//! let field = array![
//!     [0.0, 0.0, 0.0],
//!     [0.0, 1.0, 0.0],
//!     [0.0, 0.0, 0.0],
//! ];
//! let window = IndexWindow::full(field.dim());
//! stream.contour(field.view(), &window, &[0.25, 0.5, 0.75], &IdentityTransform)?;
//! # Ok::<(), plot_streams::PlotError>(())
//! ```
//!
//! ### Strip Charts
//!
//! ```rust
//! use plot_streams::{PlotConfig, PlotSession, RecordingDevice, StripChartConfig};
//!
//! let session = PlotSession::new();
//! let stream = session.create_stream()?;
//! stream.initialize(PlotConfig::default())?;
//! stream.attach_device(Box::new(RecordingDevice::default()))?;
//!
//! let chart = stream.strip_create(StripChartConfig::default())?;
//! for k in 0..100 {
//!     let t = f64::from(k) * 0.05;
//!     stream.strip_append(chart, 0, t, t.sin())?;
//! }
//! stream.strip_delete(chart)?;
//! # Ok::<(), plot_streams::PlotError>(())
//! ```
//!
//! ## Device Backends
//!
//! Output targets implement [`DeviceBackend`]: a small trait of pixel-space
//! primitives (move/line, filled polygons, glyphs, text, pen state). The
//! crate ships [`RecordingDevice`], which records every primitive for
//! inspection; file and screen backends live in separate crates.
//!
//! ## Documentation
//!
//! Full API documentation is available at
//! [docs.rs/plot_streams](https://docs.rs/plot_streams).
//!
//! ## License
//!
//! MIT License
//!
//! ## Contributing
//!
//! Contributions are welcome! Please feel free to submit a Pull Request.

mod error;
mod image;

pub mod clip;
pub mod color;
pub mod config;
pub mod contour;
pub mod device;
pub mod fill;
pub mod map;
pub mod page;
pub mod session;
pub mod stream;
pub mod stripchart;
pub mod style;
pub mod transform;
pub mod utils;
pub mod vector;

pub use crate::clip::{ClipBox, clip_polygon, clip_polyline, clip_segment};
pub use crate::color::{Cmap1ControlPoint, Cmap1Space, ColorMap0, ColorMap1, Rgba};
pub use crate::config::{FamilySettings, PlotConfig};
pub use crate::contour::{BoundaryPen, IndexWindow, ShadeFill, ShadeParams, ShadesParams};
pub use crate::device::{
    DeviceBackend, DeviceCapabilities, DeviceError, DevicePoint, DeviceResult, Justification,
    RecordedPrimitive, RecordingDevice, RecordingLog,
};
pub use crate::error::{PlotError, PlotResult};
pub use crate::fill::{FillStyle, HatchFamily};
pub use crate::map::MapSource;
pub use crate::page::{
    AxisScaling, NormRect, PageGeometry, SubpageGrid, WindowEntry, WorldRect, device_to_world,
};
pub use crate::session::{PlotSession, StreamHandle, StreamId};
pub use crate::stream::{DEFAULT_CHAR_HEIGHT_MM, DEFAULT_PEN_WIDTH, PlotStream, RunLevel};
pub use crate::stripchart::{ChartId, MAX_PENS, PenStyle, StripChartConfig};
pub use crate::style::{DashPair, Fci, LineStyle};
pub use crate::transform::{CoordTransform, GridTransform1d, GridTransform2d, IdentityTransform};
pub use crate::vector::{ArrowStyle, VectorParams};
