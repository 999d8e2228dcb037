//! Color types and the two palette models used by plot streams.
//!
//! Streams carry two independent palettes:
//!
//! - [`ColorMap0`] (cmap0) — a discrete indexed palette used for pens, text
//!   and annotations; mutable in place or by bulk reallocation.
//! - [`ColorMap1`] (cmap1) — a continuous palette addressed by a real-valued
//!   argument in [0, 1], used for shading, images and filled contour bands.
//!   It is defined either by direct RGBA samples or by piecewise-linear
//!   control points in HLS or RGB space, and is always resampled to a
//!   discrete lookup table.

use crate::utils::math::{clamp_unit, lerp};

// =============================================================================
// RGBA
// =============================================================================

/// RGBA color with 8-bit components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Rgba {
    /// Red component.
    pub r: u8,
    /// Green component.
    pub g: u8,
    /// Blue component.
    pub b: u8,
    /// Alpha component (255 = opaque).
    pub a: u8,
}

impl Rgba {
    /// Create a new color with explicit RGBA components.
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Create an opaque color (alpha = 255).
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Unpack a 32-bit RGBA value (0xRRGGBBAA format).
    pub const fn from_packed(rgba: u32) -> Self {
        Self {
            r: ((rgba >> 24) & 0xFF) as u8,
            g: ((rgba >> 16) & 0xFF) as u8,
            b: ((rgba >> 8) & 0xFF) as u8,
            a: (rgba & 0xFF) as u8,
        }
    }

    /// Pack into a 32-bit RGBA value (0xRRGGBBAA format).
    pub const fn to_packed(self) -> u32 {
        ((self.r as u32) << 24) | ((self.g as u32) << 16) | ((self.b as u32) << 8) | (self.a as u32)
    }

    /// Build a color from unit-interval channels, clamping each to [0, 1].
    pub fn from_unit(r: f64, g: f64, b: f64, a: f64) -> Self {
        let quantize = |v: f64| (clamp_unit(v) * 255.0).round() as u8;
        Self {
            r: quantize(r),
            g: quantize(g),
            b: quantize(b),
            a: quantize(a),
        }
    }

    /// Opaque black.
    pub const BLACK: Rgba = Rgba::rgb(0, 0, 0);
    /// Opaque white.
    pub const WHITE: Rgba = Rgba::rgb(255, 255, 255);
    /// Opaque red.
    pub const RED: Rgba = Rgba::rgb(255, 0, 0);
    /// Fully transparent black.
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);
}

// =============================================================================
// HLS <-> RGB
// =============================================================================

/// Convert hue (degrees), lightness and saturation (both in [0, 1]) to RGB
/// unit-interval channels.
pub fn hls_to_rgb(hue: f64, lightness: f64, saturation: f64) -> (f64, f64, f64) {
    let l = clamp_unit(lightness);
    let s = clamp_unit(saturation);
    let m2 = if l <= 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let m1 = 2.0 * l - m2;

    let channel = |h: f64| -> f64 {
        let h = h.rem_euclid(360.0);
        if h < 60.0 {
            m1 + (m2 - m1) * h / 60.0
        } else if h < 180.0 {
            m2
        } else if h < 240.0 {
            m1 + (m2 - m1) * (240.0 - h) / 60.0
        } else {
            m1
        }
    };

    (channel(hue + 120.0), channel(hue), channel(hue - 120.0))
}

/// Convert RGB unit-interval channels to (hue degrees, lightness, saturation).
pub fn rgb_to_hls(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    let (r, g, b) = (clamp_unit(r), clamp_unit(g), clamp_unit(b));
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;

    if max == min {
        return (0.0, l, 0.0);
    }

    let delta = max - min;
    let s = if l <= 0.5 {
        delta / (max + min)
    } else {
        delta / (2.0 - max - min)
    };

    let h = if max == r {
        (g - b) / delta
    } else if max == g {
        2.0 + (b - r) / delta
    } else {
        4.0 + (r - g) / delta
    };

    ((h * 60.0).rem_euclid(360.0), l, s)
}

// =============================================================================
// ColorMap0 — discrete indexed palette
// =============================================================================

/// The sixteen standard cmap0 entries, index 0 being the page background.
const DEFAULT_CMAP0: [Rgba; 16] = [
    Rgba::rgb(0, 0, 0),       // background
    Rgba::rgb(255, 0, 0),     // red
    Rgba::rgb(255, 255, 0),   // yellow
    Rgba::rgb(0, 255, 0),     // green
    Rgba::rgb(127, 255, 212), // aquamarine
    Rgba::rgb(255, 192, 203), // pink
    Rgba::rgb(245, 222, 179), // wheat
    Rgba::rgb(190, 190, 190), // grey
    Rgba::rgb(165, 42, 42),   // brown
    Rgba::rgb(0, 0, 255),     // blue
    Rgba::rgb(138, 43, 226),  // blue violet
    Rgba::rgb(0, 255, 255),   // cyan
    Rgba::rgb(64, 224, 208),  // turquoise
    Rgba::rgb(255, 0, 255),   // magenta
    Rgba::rgb(250, 128, 114), // salmon
    Rgba::rgb(255, 255, 255), // white
];

/// Discrete indexed color palette (cmap0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorMap0 {
    entries: Vec<Rgba>,
}

impl Default for ColorMap0 {
    fn default() -> Self {
        Self {
            entries: DEFAULT_CMAP0.to_vec(),
        }
    }
}

impl ColorMap0 {
    /// Create a palette with `len` entries, filled by cycling the standard
    /// sixteen defaults. `len` must be nonzero (callers validate).
    pub fn with_len(len: usize) -> Self {
        let entries = (0..len)
            .map(|i| DEFAULT_CMAP0[i % DEFAULT_CMAP0.len()])
            .collect();
        Self { entries }
    }

    /// Number of palette entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the palette has no entries. Streams never shrink cmap0 to
    /// zero, but the type itself does not forbid it.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry; `None` if the index is out of range.
    pub fn color(&self, index: usize) -> Option<Rgba> {
        self.entries.get(index).copied()
    }

    /// Replace an entry in place. Returns `false` if the index is out of
    /// range (the palette is not grown implicitly).
    pub fn set_color(&mut self, index: usize, color: Rgba) -> bool {
        match self.entries.get_mut(index) {
            Some(slot) => {
                *slot = color;
                true
            }
            None => false,
        }
    }

    /// Bulk reallocation: grow or shrink to `len` entries, preserving the
    /// existing prefix and filling new slots from the standard defaults.
    pub fn resize(&mut self, len: usize) {
        let old = self.entries.len();
        self.entries.resize_with(len, Default::default);
        for i in old..len {
            self.entries[i] = DEFAULT_CMAP0[i % DEFAULT_CMAP0.len()];
        }
    }

    /// Replace the whole palette from a slice.
    pub fn set_all(&mut self, colors: &[Rgba]) {
        self.entries.clear();
        self.entries.extend_from_slice(colors);
    }

    /// All entries in index order.
    pub fn entries(&self) -> &[Rgba] {
        &self.entries
    }
}

// =============================================================================
// ColorMap1 — continuous palette
// =============================================================================

/// Coordinate space a cmap1 control point is given in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum Cmap1Space {
    /// Control coordinates are (red, green, blue), each in [0, 1].
    Rgb,
    /// Control coordinates are (hue degrees, lightness, saturation), with
    /// lightness and saturation in [0, 1].
    Hls,
}

/// One control point of a piecewise-linear cmap1 definition.
///
/// `alt_hue_path` selects the long way around the hue wheel for the segment
/// that *ends* at this point; it has no effect on the first point.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Cmap1ControlPoint {
    /// Position along the palette, in [0, 1]. The first point must sit at
    /// 0, the last at 1, and positions must be non-decreasing.
    pub intensity: f64,
    /// First coordinate (red or hue, depending on the space).
    pub coord0: f64,
    /// Second coordinate (green or lightness).
    pub coord1: f64,
    /// Third coordinate (blue or saturation).
    pub coord2: f64,
    /// Interpolate hue the long way around the wheel into this point.
    pub alt_hue_path: bool,
}

/// Stored control point, always in HLS space.
#[derive(Debug, Clone, Copy)]
struct HlsControlPoint {
    intensity: f64,
    hue: f64,
    lightness: f64,
    saturation: f64,
    alt_hue_path: bool,
}

/// Continuous color palette (cmap1), resampled to a discrete lookup table.
///
/// Lookups clamp the argument to [0, 1] and then to the configured
/// `[min_color, max_color]` sub-range.
#[derive(Debug, Clone)]
pub struct ColorMap1 {
    table: Vec<Rgba>,
    min_color: f64,
    max_color: f64,
}

impl Default for ColorMap1 {
    /// The default palette sweeps the hue wheel from blue to red at constant
    /// lightness and saturation, passing through green and yellow.
    fn default() -> Self {
        let points = [
            Cmap1ControlPoint {
                intensity: 0.0,
                coord0: 240.0,
                coord1: 0.5,
                coord2: 1.0,
                alt_hue_path: false,
            },
            Cmap1ControlPoint {
                intensity: 1.0,
                coord0: 0.0,
                coord1: 0.5,
                coord2: 1.0,
                alt_hue_path: false,
            },
        ];
        // The default control points are well formed, so this cannot fail.
        match Self::from_control_points(Cmap1Space::Hls, &points) {
            Ok(map) => map,
            Err(_) => Self {
                table: vec![Rgba::BLACK, Rgba::WHITE],
                min_color: 0.0,
                max_color: 1.0,
            },
        }
    }
}

impl ColorMap1 {
    /// Length of the resampled lookup table built from control points.
    pub const TABLE_LEN: usize = 256;

    /// Build a palette directly from RGBA samples.
    ///
    /// Returns a description of the problem if `samples` is empty.
    pub fn from_samples(samples: &[Rgba]) -> Result<Self, String> {
        if samples.is_empty() {
            return Err("cmap1 sample table must not be empty".to_string());
        }
        Ok(Self {
            table: samples.to_vec(),
            min_color: 0.0,
            max_color: 1.0,
        })
    }

    /// Build a palette from piecewise-linear control points.
    ///
    /// Validates the control-point sequence (positions anchored at 0 and 1,
    /// non-decreasing, coordinates within their space's ranges) and
    /// resamples it to a [`ColorMap1::TABLE_LEN`]-entry table. Errors are
    /// returned as plain descriptions; callers attach operation context.
    pub fn from_control_points(
        space: Cmap1Space,
        points: &[Cmap1ControlPoint],
    ) -> Result<Self, String> {
        if points.len() < 2 {
            return Err(format!(
                "cmap1 needs at least two control points, got {}",
                points.len()
            ));
        }
        let first = points[0].intensity;
        let last = points[points.len() - 1].intensity;
        if first != 0.0 || last != 1.0 {
            return Err(format!(
                "cmap1 control points must span [0, 1], got [{first}, {last}]"
            ));
        }
        let mut prev = f64::NEG_INFINITY;
        for (i, point) in points.iter().enumerate() {
            if !point.intensity.is_finite() || point.intensity < prev {
                return Err(format!(
                    "cmap1 control point {i} is out of order (position {})",
                    point.intensity
                ));
            }
            prev = point.intensity;
            let (c1_ok, c2_ok) = (
                (0.0..=1.0).contains(&point.coord1),
                (0.0..=1.0).contains(&point.coord2),
            );
            let c0_ok = match space {
                Cmap1Space::Rgb => (0.0..=1.0).contains(&point.coord0),
                Cmap1Space::Hls => point.coord0.is_finite(),
            };
            if !(c0_ok && c1_ok && c2_ok) {
                return Err(format!(
                    "cmap1 control point {i} has coordinates outside the {space:?} ranges"
                ));
            }
        }

        // Interpolation always runs in HLS so hue can take either path
        // around the wheel; RGB control points are converted up front.
        let hls: Vec<HlsControlPoint> = points
            .iter()
            .map(|p| {
                let (hue, lightness, saturation) = match space {
                    Cmap1Space::Hls => (p.coord0, p.coord1, p.coord2),
                    Cmap1Space::Rgb => rgb_to_hls(p.coord0, p.coord1, p.coord2),
                };
                HlsControlPoint {
                    intensity: p.intensity,
                    hue,
                    lightness,
                    saturation,
                    alt_hue_path: p.alt_hue_path,
                }
            })
            .collect();

        let mut table = Vec::with_capacity(Self::TABLE_LEN);
        for i in 0..Self::TABLE_LEN {
            let t = i as f64 / (Self::TABLE_LEN - 1) as f64;
            table.push(sample_hls_points(&hls, t));
        }

        Ok(Self {
            table,
            min_color: 0.0,
            max_color: 1.0,
        })
    }

    /// Restrict lookups to a sub-range of the palette.
    ///
    /// Returns `false` (leaving the range unchanged) unless
    /// `0 <= min < max <= 1`.
    pub fn set_range(&mut self, min_color: f64, max_color: f64) -> bool {
        let valid = (0.0..=1.0).contains(&min_color)
            && (0.0..=1.0).contains(&max_color)
            && min_color < max_color;
        if valid {
            self.min_color = min_color;
            self.max_color = max_color;
        }
        valid
    }

    /// The configured `[min_color, max_color]` sub-range.
    pub fn range(&self) -> (f64, f64) {
        (self.min_color, self.max_color)
    }

    /// Look up the palette at `t`.
    ///
    /// `t` is clamped to [0, 1] (NaN maps to 0) and then remapped into the
    /// configured sub-range before indexing the table.
    pub fn lookup(&self, t: f64) -> Rgba {
        let t = if t.is_nan() { 0.0 } else { clamp_unit(t) };
        let mapped = lerp(self.min_color, self.max_color, t);
        let idx = (mapped * (self.table.len() - 1) as f64).round() as usize;
        self.table[idx.min(self.table.len() - 1)]
    }

    /// Number of entries in the discrete lookup table.
    pub fn table_len(&self) -> usize {
        self.table.len()
    }
}

/// Sample a piecewise-linear HLS control-point sequence at position `t`.
fn sample_hls_points(points: &[HlsControlPoint], t: f64) -> Rgba {
    let t = clamp_unit(t);
    // Find the segment containing t. Duplicate positions define a step; an
    // exact hit on the step resolves to the earlier point.
    let mut hi = points.len() - 1;
    for (i, p) in points.iter().enumerate().skip(1) {
        if t <= p.intensity {
            hi = i;
            break;
        }
    }
    let lo = hi - 1;
    let (a, b) = (points[lo], points[hi]);

    let span = b.intensity - a.intensity;
    let f = if span == 0.0 {
        1.0
    } else {
        (t - a.intensity) / span
    };

    // Hue wraps: normally take the shorter way around the wheel; the
    // segment's alt_hue_path flag requests the longer way.
    let mut dh = (b.hue - a.hue).rem_euclid(360.0);
    if dh > 180.0 {
        dh -= 360.0;
    }
    if b.alt_hue_path {
        dh = if dh >= 0.0 { dh - 360.0 } else { dh + 360.0 };
    }
    let hue = a.hue + dh * f;
    let lightness = lerp(a.lightness, b.lightness, f);
    let saturation = lerp(a.saturation, b.saturation, f);

    let (r, g, bl) = hls_to_rgb(hue, lightness, saturation);
    Rgba::from_unit(r, g, bl, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack_roundtrip() {
        let colors = [
            Rgba::WHITE,
            Rgba::BLACK,
            Rgba::TRANSPARENT,
            Rgba::new(0x12, 0x34, 0x56, 0x78),
        ];
        for color in colors {
            assert_eq!(color, Rgba::from_packed(color.to_packed()));
        }
    }

    #[test]
    fn test_default_cmap0_has_sixteen_entries() {
        let map = ColorMap0::default();
        assert_eq!(map.len(), 16);
        assert_eq!(map.color(0), Some(Rgba::BLACK));
        assert_eq!(map.color(15), Some(Rgba::WHITE));
        assert_eq!(map.color(16), None);
    }

    #[test]
    fn test_cmap0_resize_preserves_prefix() {
        let mut map = ColorMap0::default();
        map.set_color(1, Rgba::rgb(1, 2, 3));
        map.resize(20);
        assert_eq!(map.len(), 20);
        assert_eq!(map.color(1), Some(Rgba::rgb(1, 2, 3)));
        // New slots cycle the standard defaults.
        assert_eq!(map.color(16), Some(Rgba::BLACK));
    }

    #[test]
    fn test_hls_rgb_roundtrip() {
        for &(h, l, s) in &[(0.0, 0.5, 1.0), (120.0, 0.4, 0.7), (240.0, 0.5, 1.0)] {
            let (r, g, b) = hls_to_rgb(h, l, s);
            let (h2, l2, s2) = rgb_to_hls(r, g, b);
            assert!((h - h2).abs() < 1.0, "hue {h} -> {h2}");
            assert!((l - l2).abs() < 0.01);
            assert!((s - s2).abs() < 0.01);
        }
    }

    #[test]
    fn test_cmap1_lookup_clamps_argument() {
        let map = ColorMap1::default();
        assert_eq!(map.lookup(-2.0), map.lookup(0.0));
        assert_eq!(map.lookup(42.0), map.lookup(1.0));
        assert_eq!(map.lookup(f64::NAN), map.lookup(0.0));
    }

    #[test]
    fn test_cmap1_subrange_lookup() {
        let samples: Vec<Rgba> = (0..=255).map(|v| Rgba::rgb(v as u8, 0, 0)).collect();
        let mut map = ColorMap1::from_samples(&samples).unwrap();
        assert!(map.set_range(0.5, 1.0));
        // t = 0 now lands halfway up the table.
        assert_eq!(map.lookup(0.0).r, 128);
        assert_eq!(map.lookup(1.0).r, 255);
        // An inverted range is rejected and leaves the old one in place.
        assert!(!map.set_range(0.9, 0.1));
        assert_eq!(map.range(), (0.5, 1.0));
    }

    #[test]
    fn test_cmap1_control_point_validation() {
        let bad = [
            Cmap1ControlPoint {
                intensity: 0.2,
                coord0: 0.0,
                coord1: 0.5,
                coord2: 0.5,
                alt_hue_path: false,
            },
            Cmap1ControlPoint {
                intensity: 1.0,
                coord0: 0.0,
                coord1: 0.5,
                coord2: 0.5,
                alt_hue_path: false,
            },
        ];
        assert!(ColorMap1::from_control_points(Cmap1Space::Hls, &bad).is_err());
    }

    #[test]
    fn test_cmap1_alt_hue_path_changes_midpoint() {
        let mk = |alt| {
            [
                Cmap1ControlPoint {
                    intensity: 0.0,
                    coord0: 0.0,
                    coord1: 0.5,
                    coord2: 1.0,
                    alt_hue_path: false,
                },
                Cmap1ControlPoint {
                    intensity: 1.0,
                    coord0: 90.0,
                    coord1: 0.5,
                    coord2: 1.0,
                    alt_hue_path: alt,
                },
            ]
        };
        let short = ColorMap1::from_control_points(Cmap1Space::Hls, &mk(false)).unwrap();
        let long = ColorMap1::from_control_points(Cmap1Space::Hls, &mk(true)).unwrap();
        // Same endpoints, different paths around the wheel.
        assert_eq!(short.lookup(0.0), long.lookup(0.0));
        assert_ne!(short.lookup(0.5), long.lookup(0.5));
    }
}
