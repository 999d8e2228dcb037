//! Shared numeric helpers used across the plotting pipeline.
//!
//! Everything in here is deliberately small and generic: interpolation and
//! clamping primitives that the transform, clipping, and contour modules all
//! lean on.

pub mod math;

pub use math::{clamp_unit, lerp, nearly_equal, unit_fraction};
