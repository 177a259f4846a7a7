//! Automatic distance-threshold selection.
//!
//! When no merge threshold is supplied, one is derived from the
//! distribution of each node's minimum neighbor distance. On a normalized
//! rank-versus-distance curve, the interesting break sits where the curve
//! stops falling at 45 degrees or steeper: the scan starts near the
//! largest distances and walks backward, probing a local slope over the
//! configured neighborhood radius, and reports the last distance at which
//! the slope was still at least 0.5.

use std::num::NonZeroUsize;

use thiserror::Error;

/// Errors raised while selecting a threshold.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ThresholdError {
    /// No distances were available to analyze.
    #[error("cannot select a threshold from an empty distance distribution")]
    EmptyDistribution,
    /// The slope probe stepped past an end of the distribution.
    #[error("threshold scan ran off the {end} end of the distance distribution")]
    RanOffEnd {
        /// Which end of the array the scan escaped.
        end: &'static str,
    },
    /// The scan reached the smallest distance with the slope still steep.
    #[error("no threshold found before reaching the smallest distance")]
    NoThreshold,
}

/// Selects a distance threshold from `min_distances`, the ascending-sorted
/// minimum neighbor distances of every node, probing slopes over
/// `neighborhood` entries.
///
/// The probe at a position climbs `neighborhood` entries, descends twice
/// that, and normalizes the value difference by
/// `len / (max_distance * 2 * steps_descended)`. While the slope stays at
/// or above 0.5 the scan records the probe position's distance and steps
/// down; the first probe below 0.5 ends the scan, returning the last
/// recorded distance. The candidate starts at the initial probe position
/// so an immediately-shallow curve still yields a defined value.
///
/// # Errors
/// Returns [`ThresholdError`] when the distribution is empty, when a probe
/// escapes either end of the array, or when the scan walks all the way to
/// the smallest distance without the slope flattening — all signs of a
/// degenerate distance distribution.
pub fn select_threshold(
    min_distances: &[f32],
    neighborhood: NonZeroUsize,
) -> Result<f32, ThresholdError> {
    let len = min_distances.len();
    if len == 0 {
        return Err(ThresholdError::EmptyDistribution);
    }
    let radius = neighborhood.get();
    let max_distance = min_distances.iter().copied().fold(0.0_f32, f32::max);

    // Back off one neighborhood from the largest distance.
    let mut position = len - 1;
    let mut taken = 0;
    while taken < radius && position > 0 {
        position -= 1;
        taken += 1;
    }

    let mut candidate = min_distances[position];
    while position > 0 {
        let mut climbed = 0;
        while climbed < radius && position < len {
            position += 1;
            climbed += 1;
        }
        let Some(&uphill) = min_distances.get(position) else {
            return Err(ThresholdError::RanOffEnd { end: "upper" });
        };

        let mut descended = 0;
        while descended < 2 * radius && position > 0 {
            position -= 1;
            descended += 1;
        }
        if position == 0 {
            return Err(ThresholdError::RanOffEnd { end: "lower" });
        }
        let downhill = min_distances[position];

        let slope = (len as f32 / (max_distance * (2 * descended) as f32)) * (uphill - downhill);

        // Return to the probe position; the bounds checks above guarantee
        // both loops ran their full length.
        position += radius;

        if slope >= 0.5 {
            candidate = min_distances[position];
            position -= 1;
        } else {
            return Ok(candidate);
        }
    }

    Err(ThresholdError::NoThreshold)
}
