//! # Scorer Module
//!
//! Level selection and the arithmetic behind a grade: quarter-point rounding
//! of totals and the percentage shown to students.

use crate::rubric::{Criterion, Level};
use crate::types::Measurement;

const EPSILON: f64 = 1e-9;

/// Rounds half-up to the nearest 0.25.
///
/// Midpoints between two quarters (`.125`, `.375`, `.625`, `.875`) round up.
/// A tiny epsilon absorbs binary representation error from summing points,
/// so a sum that should be exactly `7.125` but is stored as `7.1249999…`
/// still rounds to `7.25`.
///
/// # Example
///
/// ```
/// use marker::scorer::round_to_quarter;
///
/// assert_eq!(round_to_quarter(7.125), 7.25);
/// assert_eq!(round_to_quarter(7.12), 7.0);
/// assert_eq!(round_to_quarter(7.876), 8.0);
/// ```
pub fn round_to_quarter(x: f64) -> f64 {
    ((x * 4.0) + 0.5 + EPSILON).floor() / 4.0
}

/// Round a float to two decimal places.
#[inline]
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// `total / max * 100`, unrounded. Zero when `max` is zero.
pub fn percentage(total: f64, max: f64) -> f64 {
    if max <= 0.0 {
        return 0.0;
    }
    total / max * 100.0
}

/// Whether `level` accepts the measurement.
///
/// With a requirement the measured value must fall inside its bounds.
/// Without one the measurement's fraction must reach the level's share of
/// the criterion maximum, so zero-point levels always match.
pub fn level_matches(level: &Level, max_points: f64, m: &Measurement) -> bool {
    match &level.requirement {
        Some(req) => req.matches(m.value),
        None => {
            let needed = if max_points > 0.0 {
                level.points / max_points
            } else {
                0.0
            };
            m.fraction + EPSILON >= needed
        }
    }
}

/// Picks the highest-scoring level the measurement satisfies.
///
/// Levels are scanned by points descending; among levels with equal points
/// the one declared first wins. When nothing matches, the first declared
/// zero-point level is the fallback even if its own requirement rejects the
/// value. Returns `None` only for rubrics without any zero level.
pub fn select_level<'a>(criterion: &'a Criterion, m: &Measurement) -> Option<&'a Level> {
    criterion
        .levels_by_points()
        .into_iter()
        .find(|level| level_matches(level, criterion.max_points, m))
        .or_else(|| criterion.levels.iter().find(|level| level.points == 0.0))
}

/// Clamps awarded points into `[0, max]`.
pub fn clamp_points(points: f64, max: f64) -> f64 {
    if !points.is_finite() {
        return 0.0;
    }
    points.clamp(0.0, max.max(0.0))
}
