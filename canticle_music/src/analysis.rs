// Zipf analysis of pitch distributions.
//
// Count how often each pitch occurs, sort the counts from most to least
// frequent, and fit log(count) against log(rank) by least squares. Music
// that "sounds natural" tends to land near slope -1 with a high R²; random
// pitches flatten the slope toward 0, a single repeated pitch has no slope
// at all.

use crate::event::EventSequence;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Occurrences of each pitch.
pub fn pitch_histogram(seq: &EventSequence) -> BTreeMap<u8, usize> {
    let mut histogram = BTreeMap::new();
    for e in seq {
        *histogram.entry(e.pitch).or_insert(0) += 1;
    }
    histogram
}

/// A least-squares line `y = slope * x + intercept` with its R².
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ZipfFit {
    pub slope: f64,
    pub r_squared: f64,
    pub intercept: f64,
}

/// Least-squares fit. Mismatched or empty inputs give an all-zero fit; a
/// vertical or flat cloud gives slope (or R²) 0 instead of dividing by zero.
pub fn linear_regression(x: &[f64], y: &[f64]) -> ZipfFit {
    let n = x.len();
    if n == 0 || n != y.len() {
        return ZipfFit::default();
    }
    let nf = n as f64;
    let sum_x: f64 = x.iter().sum();
    let sum_y: f64 = y.iter().sum();
    let sum_xy: f64 = x.iter().zip(y).map(|(a, b)| a * b).sum();
    let sum_x2: f64 = x.iter().map(|a| a * a).sum();
    let sum_y2: f64 = y.iter().map(|b| b * b).sum();

    let numerator = nf * sum_xy - sum_x * sum_y;
    let var_x = nf * sum_x2 - sum_x * sum_x;
    let var_y = nf * sum_y2 - sum_y * sum_y;

    let slope = if var_x == 0.0 { 0.0 } else { numerator / var_x };
    let intercept = (sum_y - slope * sum_x) / nf;
    let r_squared = if var_x * var_y == 0.0 {
        0.0
    } else {
        let r = numerator / (var_x * var_y).sqrt();
        r * r
    };
    ZipfFit {
        slope,
        r_squared,
        intercept,
    }
}

/// Rank/frequency fit of a histogram's counts.
pub fn zipf_fit<K>(histogram: &BTreeMap<K, usize>) -> ZipfFit {
    let mut counts: Vec<usize> = histogram.values().copied().filter(|&c| c > 0).collect();
    counts.sort_unstable_by(|a, b| b.cmp(a));
    let log_ranks: Vec<f64> = (1..=counts.len()).map(|r| (r as f64).ln()).collect();
    let log_freqs: Vec<f64> = counts.iter().map(|&c| (c as f64).ln()).collect();
    linear_regression(&log_ranks, &log_freqs)
}

/// Zipf fit of a sequence's pitch distribution.
pub fn pitch_zipf(seq: &EventSequence) -> ZipfFit {
    zipf_fit(&pitch_histogram(seq))
}
