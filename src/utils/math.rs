//! Interpolation and range helpers shared across the engine.
//!
//! These are the small numeric building blocks used by the coordinate
//! transforms, the color maps and the contour engine. They are generic over
//! [`num_traits::Float`] so the same helpers serve `f32` fields and the
//! `f64` world-coordinate pipeline.

use num_traits::Float;

/// Linear interpolation between `a` and `b` at parameter `t`.
///
/// `t` is not clamped; callers that need clamping combine this with
/// [`clamp_unit`].
#[inline]
pub fn lerp<F: Float>(a: F, b: F, t: F) -> F {
    a + (b - a) * t
}

/// Inverse linear interpolation: the parameter at which `value` sits between
/// `lo` and `hi`.
///
/// Returns `0.5` when the span is degenerate (`hi == lo`), which keeps level
/// crossings on a flat edge at the midpoint instead of producing a NaN.
#[inline]
pub fn unit_fraction<F: Float>(value: F, lo: F, hi: F) -> F {
    let span = hi - lo;
    if span == F::zero() {
        F::from(0.5).unwrap_or_else(F::zero)
    } else {
        (value - lo) / span
    }
}

/// Clamp `t` to the closed unit interval [0, 1].
#[inline]
pub fn clamp_unit<F: Float>(t: F) -> F {
    if t < F::zero() {
        F::zero()
    } else if t > F::one() {
        F::one()
    } else {
        t
    }
}

/// Absolute tolerance for coordinate coincidence checks.
///
/// Coordinates compared with this live in normalized or fractional-index
/// space, where magnitudes stay small enough for an absolute epsilon.
pub const COORD_EPS: f64 = 1.0e-9;

/// Whether two coordinates coincide within [`COORD_EPS`].
///
/// Used for chaining contour segments whose endpoints were produced by
/// independent interpolations of the same edge.
#[inline]
pub fn nearly_equal<F: Float>(a: F, b: F) -> bool {
    let eps = F::from(COORD_EPS).unwrap_or_else(F::epsilon);
    (a - b).abs() <= eps
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx_eq::assert_approx_eq;

    #[test]
    fn test_lerp_endpoints() {
        assert_approx_eq!(lerp(2.0, 6.0, 0.0), 2.0, 1e-12);
        assert_approx_eq!(lerp(2.0, 6.0, 1.0), 6.0, 1e-12);
        assert_approx_eq!(lerp(2.0, 6.0, 0.25), 3.0, 1e-12);
    }

    #[test]
    fn test_unit_fraction_degenerate_span() {
        // Flat edge: crossing reported at the midpoint, not NaN.
        let t: f64 = unit_fraction(1.0, 3.0, 3.0);
        assert_approx_eq!(t, 0.5, 1e-12);
    }

    #[test]
    fn test_unit_fraction_roundtrip() {
        let t = unit_fraction(4.0, 2.0, 6.0);
        assert_approx_eq!(lerp(2.0, 6.0, t), 4.0, 1e-12);
    }

    #[test]
    fn test_clamp_unit() {
        assert_approx_eq!(clamp_unit(-0.5), 0.0, 1e-12);
        assert_approx_eq!(clamp_unit(0.5), 0.5, 1e-12);
        assert_approx_eq!(clamp_unit(1.5), 1.0, 1e-12);
    }
}
