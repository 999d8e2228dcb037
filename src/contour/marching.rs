//! Marching-squares segment extraction and chaining, in index space.
//!
//! Everything here works on fractional (i, j) grid coordinates; the caller
//! applies the coordinate transform afterwards. A corner is *inside* when
//! its sample is `>= level` (exact equality counts as inside, the closed
//! lower bound), so a level touching a flat plateau produces no spurious
//! crossings.

use ndarray::ArrayView2;

use super::IndexWindow;
use crate::utils::math::{nearly_equal, unit_fraction};

/// One iso-line segment between two edge crossings of a single cell.
pub(crate) type Segment = ((f64, f64), (f64, f64));

/// A maximal run of chained segments.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ChainedLine {
    /// Crossing points in order; a closed line repeats its first point at
    /// the end.
    pub(crate) points: Vec<(f64, f64)>,
    /// Whether the line closes on itself.
    pub(crate) closed: bool,
}

/// Extracts all iso-line segments of `level` from the cells of `window`.
///
/// Cells touching a non-finite sample are skipped. Corner labelling per
/// cell (i, j), with the case index built from the *inside* bits:
///
/// ```text
///   d(i,j+1) --- dc --- c(i+1,j+1)        bit 0: a   bit 2: c
///      |                   |              bit 1: b   bit 3: d
///      ad                  bc
///      |                   |
///   a(i,j)   --- ab --- b(i+1,j)
/// ```
///
/// The two ambiguous saddle cases (5 and 10: opposite corners inside)
/// are resolved by the cell's centre average: a centre at or above the
/// level joins the inside corners, below it separates them.
pub(crate) fn extract_segments(
    field: &ArrayView2<'_, f64>,
    window: &IndexWindow,
    level: f64,
) -> Vec<Segment> {
    let mut segments = Vec::new();
    for i in window.i_begin..window.i_end.saturating_sub(1) {
        for j in window.j_begin..window.j_end.saturating_sub(1) {
            let fa = field[[i, j]];
            let fb = field[[i + 1, j]];
            let fc = field[[i + 1, j + 1]];
            let fd = field[[i, j + 1]];
            if !(fa.is_finite() && fb.is_finite() && fc.is_finite() && fd.is_finite()) {
                continue;
            }
            let case = u8::from(fa >= level)
                | u8::from(fb >= level) << 1
                | u8::from(fc >= level) << 2
                | u8::from(fd >= level) << 3;
            if case == 0 || case == 15 {
                continue;
            }

            let fi = i as f64;
            let fj = j as f64;
            let ab = (fi + unit_fraction(level, fa, fb), fj);
            let bc = (fi + 1.0, fj + unit_fraction(level, fb, fc));
            let dc = (fi + unit_fraction(level, fd, fc), fj + 1.0);
            let ad = (fi, fj + unit_fraction(level, fa, fd));

            match case {
                1 => segments.push((ad, ab)),
                2 => segments.push((ab, bc)),
                3 => segments.push((ad, bc)),
                4 => segments.push((bc, dc)),
                6 => segments.push((ab, dc)),
                7 | 8 => segments.push((ad, dc)),
                9 => segments.push((ab, dc)),
                11 => segments.push((bc, dc)),
                12 => segments.push((ad, bc)),
                13 => segments.push((ab, bc)),
                14 => segments.push((ad, ab)),
                5 => {
                    if (fa + fb + fc + fd) / 4.0 >= level {
                        segments.push((ab, bc));
                        segments.push((ad, dc));
                    } else {
                        segments.push((ad, ab));
                        segments.push((bc, dc));
                    }
                }
                10 => {
                    if (fa + fb + fc + fd) / 4.0 >= level {
                        segments.push((ad, ab));
                        segments.push((bc, dc));
                    } else {
                        segments.push((ab, bc));
                        segments.push((ad, dc));
                    }
                }
                _ => {}
            }
        }
    }
    segments
}

fn points_match(a: (f64, f64), b: (f64, f64)) -> bool {
    nearly_equal(a.0, b.0) && nearly_equal(a.1, b.1)
}

/// Removes one segment adjacent to `at` and returns its far endpoint.
fn take_adjacent(segments: &mut Vec<Segment>, at: (f64, f64)) -> Option<(f64, f64)> {
    let k = segments
        .iter()
        .position(|&(p, q)| points_match(p, at) || points_match(q, at))?;
    let (p, q) = segments.swap_remove(k);
    Some(if points_match(p, at) { q } else { p })
}

/// Joins per-cell segments into maximal polylines.
///
/// Adjacent cells interpolate the shared edge independently, so endpoints
/// coincide only up to rounding; matching is tolerance-based. Each chain
/// grows from both ends until no segment attaches, which leaves every
/// line either closed or terminated on the window boundary.
pub(crate) fn chain_segments(mut segments: Vec<Segment>) -> Vec<ChainedLine> {
    let mut chains = Vec::new();
    while let Some((start, end)) = segments.pop() {
        let mut chain = std::collections::VecDeque::with_capacity(8);
        chain.push_back(start);
        chain.push_back(end);
        loop {
            let Some(&tail) = chain.back() else { break };
            match take_adjacent(&mut segments, tail) {
                Some(next) => chain.push_back(next),
                None => break,
            }
        }
        loop {
            let Some(&head) = chain.front() else { break };
            match take_adjacent(&mut segments, head) {
                Some(next) => chain.push_front(next),
                None => break,
            }
        }
        let closed = chain.len() >= 3
            && points_match(*chain.front().unwrap_or(&start), *chain.back().unwrap_or(&end));
        chains.push(ChainedLine {
            points: chain.into(),
            closed,
        });
    }
    chains
}
