//! Incremental mean/variance accumulation (Welford's algorithm) in
//! unweighted and pair-count-weighted forms, plus the lossless
//! conversions between the `(mean, M2, n)` accumulation encoding and the
//! `(mean, standard error, n)` persistence encoding.
//!
//! Every update is a pure function from the previous state to a new one,
//! so a merge that fails partway cannot leave torn state behind.

/// One unweighted Welford step over a slice, `count_after` being the
/// sample count including the new observation.
pub fn welford_step(
    mean: &[f64],
    m2: &[f64],
    count_after: u64,
    values: &[f64],
) -> (Vec<f64>, Vec<f64>) {
    assert_eq!(mean.len(), values.len(), "welford shape mismatch");
    assert_eq!(mean.len(), m2.len(), "welford shape mismatch");
    assert!(count_after >= 1, "count must include the new observation");

    let count = count_after as f64;
    let mut next_mean = Vec::with_capacity(mean.len());
    let mut next_m2 = Vec::with_capacity(m2.len());
    for index in 0..mean.len() {
        let delta = values[index] - mean[index];
        let updated_mean = mean[index] + delta / count;
        next_mean.push(updated_mean);
        next_m2.push(m2[index] + delta * (values[index] - updated_mean));
    }
    (next_mean, next_m2)
}

pub fn welford_step_scalar(mean: f64, m2: f64, count_after: u64, value: f64) -> (f64, f64) {
    let (next_mean, next_m2) = welford_step(&[mean], &[m2], count_after, &[value]);
    (next_mean[0], next_m2[0])
}

/// Result of one weighted accumulation step.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedUpdate {
    pub mean: Vec<f64>,
    pub m2: Vec<f64>,
    /// Cumulative weight after the step, per weight element.
    pub weight_sum: Vec<f64>,
}

/// One pair-count-weighted step. The weight array covers `inner`
/// consecutive trailing elements of the value arrays (a weight per
/// (pair, bin) slot broadcast over the time-lag axis).
///
/// `prior_weight_sum` must be the cumulative weight *before* this
/// observation; the weight's own running mean is accumulated separately
/// with the unweighted rule, strictly after every quantity that depends
/// on the prior value.
pub fn weighted_step(
    mean: &[f64],
    m2: &[f64],
    prior_weight_sum: &[f64],
    values: &[f64],
    new_weight: &[f64],
    inner: usize,
) -> WeightedUpdate {
    assert_eq!(mean.len(), values.len(), "weighted shape mismatch");
    assert_eq!(mean.len(), m2.len(), "weighted shape mismatch");
    assert_eq!(
        prior_weight_sum.len(),
        new_weight.len(),
        "weight shape mismatch"
    );
    assert!(inner > 0 && mean.len() == new_weight.len() * inner, "broadcast shape mismatch");

    let mut next_mean = Vec::with_capacity(mean.len());
    let mut next_m2 = Vec::with_capacity(m2.len());
    let mut weight_sum = Vec::with_capacity(new_weight.len());
    for weight_index in 0..new_weight.len() {
        let total = new_weight[weight_index] + prior_weight_sum[weight_index];
        weight_sum.push(total);
        for offset in 0..inner {
            let index = weight_index * inner + offset;
            let delta = values[index] - mean[index];
            let ratio = delta * new_weight[weight_index] / total;
            next_mean.push(mean[index] + ratio);
            next_m2.push(m2[index] + prior_weight_sum[weight_index] * delta * ratio);
        }
    }
    WeightedUpdate {
        mean: next_mean,
        m2: next_m2,
        weight_sum,
    }
}

/// Standard error of the mean from `(M2, n)`: `sqrt(M2 / (n*(n-1)))`,
/// NaN when the variance is undefined (`n <= 1`).
pub fn m2_to_err(m2: &[f64], count: u64) -> Vec<f64> {
    if count > 1 {
        let denominator = (count * (count - 1)) as f64;
        m2.iter().map(|value| (value / denominator).sqrt()).collect()
    } else {
        vec![f64::NAN; m2.len()]
    }
}

/// Weighted form: the denominator additionally carries the running mean
/// of the weight, broadcast over `inner` trailing elements.
pub fn m2_to_err_weighted(m2: &[f64], count: u64, weight_mean: &[f64], inner: usize) -> Vec<f64> {
    assert!(inner > 0 && m2.len() == weight_mean.len() * inner, "broadcast shape mismatch");
    if count <= 1 {
        return vec![f64::NAN; m2.len()];
    }
    let count_factor = (count * (count - 1)) as f64;
    let mut err = Vec::with_capacity(m2.len());
    for weight_index in 0..weight_mean.len() {
        let denominator = count_factor * weight_mean[weight_index];
        for offset in 0..inner {
            err.push((m2[weight_index * inner + offset] / denominator).sqrt());
        }
    }
    err
}

/// Exact inverse of [`m2_to_err`]; `n <= 1` reconstructs zero `M2`.
pub fn err_to_m2(err: &[f64], count: u64) -> Vec<f64> {
    if count > 1 {
        let factor = (count * (count - 1)) as f64;
        err.iter().map(|value| value * value * factor).collect()
    } else {
        vec![0.0; err.len()]
    }
}

/// Exact inverse of [`m2_to_err_weighted`].
pub fn err_to_m2_weighted(err: &[f64], count: u64, weight_mean: &[f64], inner: usize) -> Vec<f64> {
    assert!(inner > 0 && err.len() == weight_mean.len() * inner, "broadcast shape mismatch");
    if count <= 1 {
        return vec![0.0; err.len()];
    }
    let count_factor = (count * (count - 1)) as f64;
    let mut m2 = Vec::with_capacity(err.len());
    for weight_index in 0..weight_mean.len() {
        let factor = count_factor * weight_mean[weight_index];
        for offset in 0..inner {
            let value = err[weight_index * inner + offset];
            m2.push(value * value * factor);
        }
    }
    m2
}

pub fn m2_to_err_scalar(m2: f64, count: u64) -> f64 {
    m2_to_err(&[m2], count)[0]
}

pub fn err_to_m2_scalar(err: f64, count: u64) -> f64 {
    err_to_m2(&[err], count)[0]
}

/// Standard deviation from the standard error of the mean.
pub fn err_to_std(err: &[f64], count: u64) -> Vec<f64> {
    if count > 1 {
        let factor = (count as f64).sqrt();
        err.iter().map(|value| value * factor).collect()
    } else {
        vec![f64::NAN; err.len()]
    }
}

/// Standard error of the mean from a standard deviation.
pub fn std_to_err(std: &[f64], count: u64) -> Vec<f64> {
    if count > 1 {
        let factor = (count as f64).sqrt();
        std.iter().map(|value| value / factor).collect()
    } else {
        vec![f64::NAN; std.len()]
    }
}
