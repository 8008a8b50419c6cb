//! Least-squares line fitting over caller-selected sub-ranges of the
//! time-lag axis, with chi-square and goodness-of-fit reporting.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use std::ops::Range;

/// One `[begin, end]` interval on the time-lag axis, in physical units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitRange {
    pub begin: f64,
    pub end: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitRangeError {
    #[error("fit range [{begin}, {end}] has end <= begin")]
    EmptyRange { begin: f64, end: f64 },
    #[error(
        "fit range [{begin}, {end}] lies outside the axis extent [{axis_begin}, {axis_end}]"
    )]
    OutOfAxis {
        begin: f64,
        end: f64,
        axis_begin: f64,
        axis_end: f64,
    },
    #[error("fit range [{begin}, {end}] selects only {points} points, need at least 2")]
    TooFewPoints { begin: f64, end: f64, points: usize },
    #[error("axis needs at least 2 points to resolve fit ranges, got {actual}")]
    AxisTooShort { actual: usize },
}

/// Straight-line fit `y = a + b*x` with propagated uncertainties.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    pub intercept: f64,
    pub slope: f64,
    pub sigma_intercept: f64,
    pub sigma_slope: f64,
    pub chi_square: f64,
    /// Probability of a chi-square at least this large under the assumed
    /// noise model; 1 when no per-point deviations were supplied.
    pub goodness: f64,
}

/// Resolve physical fit ranges into index selections on a uniform axis.
/// Each selection excludes the end point, mirroring half-open indexing.
pub fn ranges_to_selections(
    ranges: &[FitRange],
    axis: &[f64],
) -> Result<Vec<Range<usize>>, FitRangeError> {
    if axis.len() < 2 {
        return Err(FitRangeError::AxisTooShort { actual: axis.len() });
    }
    let step = axis[1] - axis[0];
    let axis_begin = axis[0];
    let axis_end = axis[axis.len() - 1];

    let mut selections = Vec::with_capacity(ranges.len());
    for range in ranges {
        if range.end <= range.begin {
            return Err(FitRangeError::EmptyRange {
                begin: range.begin,
                end: range.end,
            });
        }
        if range.begin < axis_begin || range.end > axis_end {
            return Err(FitRangeError::OutOfAxis {
                begin: range.begin,
                end: range.end,
                axis_begin,
                axis_end,
            });
        }
        let begin_index = ((range.begin - axis_begin) / step) as usize;
        let end_index = ((range.end - axis_begin) / step) as usize;
        if end_index - begin_index < 2 {
            return Err(FitRangeError::TooFewPoints {
                begin: range.begin,
                end: range.end,
                points: end_index - begin_index,
            });
        }
        selections.push(begin_index..end_index);
    }
    Ok(selections)
}

/// Fit a straight line by minimizing chi-square.
///
/// With `sig` supplied, points are weighted by their inverse variance;
/// zero deviations map to a NaN weight (statistically undefined) instead
/// of faulting, and the goodness-of-fit probability is the regularized
/// lower incomplete gamma `P((m-2)/2, chi2/2)` for more than two points.
/// Without `sig`, points weigh equally, chi-square is normalized to unit
/// deviation and the goodness is reported as 1 (undefined).
pub fn fit_linear(x: &[f64], y: &[f64], sig: Option<&[f64]>) -> LineFit {
    assert_eq!(x.len(), y.len(), "fit input length mismatch");
    assert!(x.len() >= 2, "fit needs at least 2 points");
    if let Some(sig) = sig {
        assert_eq!(x.len(), sig.len(), "fit sigma length mismatch");
    }

    let point_count = x.len();
    match sig {
        Some(sig) => {
            let weights: Vec<f64> = sig
                .iter()
                .map(|deviation| {
                    let variance = deviation * deviation;
                    if variance == 0.0 { f64::NAN } else { 1.0 / variance }
                })
                .collect();
            let ss: f64 = weights.iter().sum();
            let sx: f64 = x.iter().zip(&weights).map(|(x, w)| x * w).sum();
            let sy: f64 = y.iter().zip(&weights).map(|(y, w)| y * w).sum();
            let sxoss = sx / ss;

            let mut st2 = 0.0;
            let mut slope = 0.0;
            for index in 0..point_count {
                let t = (x[index] - sxoss) / sig[index];
                st2 += t * t;
                slope += t * y[index] / sig[index];
            }
            slope /= st2;
            let intercept = (sy - sx * slope) / ss;
            let sigma_intercept = ((1.0 + sx * sx / (ss * st2)) / ss).sqrt();
            let sigma_slope = (1.0 / st2).sqrt();

            let chi_square: f64 = (0..point_count)
                .map(|index| {
                    let residual = (y[index] - intercept - slope * x[index]) / sig[index];
                    residual * residual
                })
                .sum();
            let goodness = if point_count > 2 {
                goodness_of_fit(point_count, chi_square)
            } else {
                1.0
            };

            LineFit {
                intercept,
                slope,
                sigma_intercept,
                sigma_slope,
                chi_square,
                goodness,
            }
        }
        None => {
            let ss = point_count as f64;
            let sx: f64 = x.iter().sum();
            let sy: f64 = y.iter().sum();
            let sxoss = sx / ss;

            let mut st2 = 0.0;
            let mut slope = 0.0;
            for index in 0..point_count {
                let t = x[index] - sxoss;
                st2 += t * t;
                slope += t * y[index];
            }
            slope /= st2;
            let intercept = (sy - sx * slope) / ss;

            let chi_square: f64 = (0..point_count)
                .map(|index| {
                    let residual = y[index] - intercept - slope * x[index];
                    residual * residual
                })
                .sum();
            // chi-square normalized to unit standard deviation on all points
            let sigdat = (chi_square / (point_count as f64 - 2.0)).sqrt();
            let sigma_intercept = ((1.0 + sx * sx / (ss * st2)) / ss).sqrt() * sigdat;
            let sigma_slope = (1.0 / st2).sqrt() * sigdat;

            LineFit {
                intercept,
                slope,
                sigma_intercept,
                sigma_slope,
                chi_square,
                goodness: 1.0,
            }
        }
    }
}

fn goodness_of_fit(point_count: usize, chi_square: f64) -> f64 {
    let degrees_of_freedom = (point_count - 2) as f64;
    match ChiSquared::new(degrees_of_freedom) {
        Ok(distribution) => distribution.cdf(chi_square),
        Err(_) => f64::NAN,
    }
}
