//! Running statistical aggregate over an arbitrary number of correlation
//! samples, with on-demand transport-coefficient extraction.
//!
//! Every operation is a pure function from the previous aggregate to a
//! new one; a merge that fails (incompatible grid, wrong shape, missing
//! decomposition) returns an error and leaves the input aggregate
//! untouched.

use crate::analysis::sample::{CorrSample, DecSample, ShapeError};
use crate::domain::{DecType, DecondError, DecondResult};
use crate::numerics::cesaro::{cesaro_rows, cesaro_unit};
use crate::numerics::fitting::{FitRange, fit_linear, ranges_to_selections};
use crate::numerics::grid::inner_selection;
use crate::numerics::moments::{
    self, err_to_std, m2_to_err, m2_to_err_weighted, std_to_err, weighted_step, welford_step,
    welford_step_scalar,
};
use crate::numerics::pairtype;
use std::ops::Range;

/// Running `(mean, M2)` pair for one scalar quantity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarMoments {
    pub mean: f64,
    pub m2: f64,
}

impl ScalarMoments {
    fn first(value: f64) -> Self {
        Self { mean: value, m2: 0.0 }
    }

    pub fn err(&self, count: u64) -> f64 {
        moments::m2_to_err_scalar(self.m2, count)
    }
}

/// Running `(mean, M2)` pair for one flattened array quantity.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayMoments {
    pub mean: Vec<f64>,
    pub m2: Vec<f64>,
}

impl ArrayMoments {
    fn first(values: Vec<f64>) -> Self {
        let m2 = vec![0.0; values.len()];
        Self { mean: values, m2 }
    }

    pub fn err(&self, count: u64) -> Vec<f64> {
        m2_to_err(&self.m2, count)
    }

    pub fn err_weighted(&self, count: u64, weight_mean: &[f64], inner: usize) -> Vec<f64> {
        m2_to_err_weighted(&self.m2, count, weight_mean, inner)
    }
}

/// A fitted quantity with its standard error, one value per fit range
/// and component slot (range-major).
#[derive(Debug, Clone, PartialEq)]
pub struct TransportEstimate {
    pub value: Vec<f64>,
    pub err: Vec<f64>,
    pub unit: String,
}

/// Fitted transport coefficients of the undecomposed channels.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportFit {
    /// Per all-type component, `(range, component)` flattened.
    pub per_component: TransportEstimate,
    /// zz*ww-weighted total, one value per range.
    pub total: TransportEstimate,
}

/// Aggregated state of one decomposition kind.
#[derive(Debug, Clone, PartialEq)]
pub struct DecAggregate {
    pub bins: Vec<f64>,
    pub bins_unit: String,
    /// `(pair, bin, lag)`, weighted by the per-(pair, bin) pair count.
    pub corr: ArrayMoments,
    pub corr_unit: String,
    /// Cesaro transform of `corr`, same shape and weighting.
    pub cesaro: ArrayMoments,
    pub cesaro_unit: String,
    /// `(pair, bin)` pair counts, accumulated unweighted.
    pub pair_count: ArrayMoments,
    /// Fitted decomposed transport, `(range, pair, bin)` flattened.
    pub transport: Option<TransportEstimate>,
}

/// The running aggregate across `sample_count` merged samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub sample_count: u64,
    pub num_mol: Vec<u64>,
    pub charge: Vec<i64>,
    pub charge_unit: String,
    pub volume: ScalarMoments,
    pub volume_unit: String,
    pub temperature: ScalarMoments,
    pub temperature_unit: String,
    pub time_lags: Vec<f64>,
    pub time_lags_unit: String,
    /// `(all-type, lag)` correlation means.
    pub corr: ArrayMoments,
    pub corr_unit: String,
    /// `(all-type, lag)` Cesaro means; each sample is Cesaro-transformed
    /// before accumulation, never re-averaged afterwards.
    pub cesaro: ArrayMoments,
    pub cesaro_unit: String,
    /// Charge-product/multiplicity-weighted sum over components, `(lag)`.
    pub total_cesaro: ArrayMoments,
    pub total_cesaro_unit: String,
    pub spatial: Option<DecAggregate>,
    pub energy: Option<DecAggregate>,
    pub fit_ranges: Option<Vec<FitRange>>,
    pub transport: Option<TransportFit>,
}

impl Aggregate {
    /// Initialize the aggregate from its first sample: means are the
    /// sample's own values, `M2` is zero, `n = 1`.
    pub fn from_sample(sample: CorrSample) -> DecondResult<Self> {
        sample.validate()?;

        let lag_count = sample.time_lags.len();
        let cesaro_values = cesaro_rows(&sample.corr, &sample.time_lags);
        let total = total_cesaro_of(&cesaro_values, lag_count, &sample);
        let cesaro_label = cesaro_unit(&sample.corr_unit);

        let mut spatial = None;
        let mut energy = None;
        for dectype in DecType::ALL {
            if let Some(dec) = sample.dec(dectype) {
                let aggregate = first_dec_aggregate(dec, &sample.time_lags);
                match dectype {
                    DecType::Spatial => spatial = Some(aggregate),
                    DecType::Energy => energy = Some(aggregate),
                }
            }
        }

        Ok(Self {
            sample_count: 1,
            num_mol: sample.num_mol,
            charge: sample.charge,
            charge_unit: sample.charge_unit,
            volume: ScalarMoments::first(sample.volume),
            volume_unit: sample.volume_unit,
            temperature: ScalarMoments::first(sample.temperature),
            temperature_unit: sample.temperature_unit,
            time_lags: sample.time_lags,
            time_lags_unit: sample.time_lags_unit,
            corr: ArrayMoments::first(sample.corr),
            corr_unit: sample.corr_unit,
            cesaro: ArrayMoments::first(cesaro_values),
            cesaro_unit: cesaro_label.clone(),
            total_cesaro: ArrayMoments::first(total),
            total_cesaro_unit: cesaro_label,
            spatial,
            energy,
            fit_ranges: None,
            transport: None,
        })
    }

    /// Merge one further sample, aligning grids first. Fit results are
    /// invalidated; stored fit ranges survive for a later [`Self::fit`].
    pub fn merge(&self, mut sample: CorrSample) -> DecondResult<Self> {
        sample.validate()?;
        if sample.num_mol != self.num_mol || sample.charge != self.charge {
            return Err(ShapeError::ComponentMismatch {
                expected_num_mol: self.num_mol.clone(),
                actual_num_mol: sample.num_mol.clone(),
            }
            .into());
        }

        // resolve every alignment before touching any state
        let (self_lag_sel, sample_lag_sel) = inner_selection(&self.time_lags, &sample.time_lags)?;
        let mut dec_selections: Vec<(DecType, Range<usize>, Range<usize>)> = Vec::new();
        for dectype in DecType::ALL {
            if let Some(dec) = self.dec(dectype) {
                let Some(sample_dec) = sample.dec(dectype) else {
                    return Err(DecondError::SampleMissingDecomposition { dectype });
                };
                let (self_bin_sel, sample_bin_sel) =
                    inner_selection(&dec.bins, &sample_dec.bins)?;
                dec_selections.push((dectype, self_bin_sel, sample_bin_sel));
            }
        }

        let mut merged = self.clone();
        merged.shrink_lags(&self_lag_sel);
        shrink_sample_lags(&mut sample, &sample_lag_sel);
        for (dectype, self_bin_sel, sample_bin_sel) in &dec_selections {
            let lag_count = merged.time_lags.len();
            if let Some(dec) = merged.dec_mut(*dectype) {
                shrink_dec_aggregate(dec, self_bin_sel, lag_count);
            }
            if let Some(dec) = sample_dec_mut(&mut sample, *dectype) {
                shrink_dec_sample(dec, sample_bin_sel, lag_count);
            }
        }

        let lag_count = merged.time_lags.len();
        let sample_cesaro = cesaro_rows(&sample.corr, &sample.time_lags);
        let sample_total = total_cesaro_of(&sample_cesaro, lag_count, &sample);

        let count_after = self.sample_count + 1;
        merged.sample_count = count_after;
        (merged.volume.mean, merged.volume.m2) = welford_step_scalar(
            merged.volume.mean,
            merged.volume.m2,
            count_after,
            sample.volume,
        );
        (merged.temperature.mean, merged.temperature.m2) = welford_step_scalar(
            merged.temperature.mean,
            merged.temperature.m2,
            count_after,
            sample.temperature,
        );
        (merged.corr.mean, merged.corr.m2) =
            welford_step(&merged.corr.mean, &merged.corr.m2, count_after, &sample.corr);
        (merged.cesaro.mean, merged.cesaro.m2) = welford_step(
            &merged.cesaro.mean,
            &merged.cesaro.m2,
            count_after,
            &sample_cesaro,
        );
        (merged.total_cesaro.mean, merged.total_cesaro.m2) = welford_step(
            &merged.total_cesaro.mean,
            &merged.total_cesaro.m2,
            count_after,
            &sample_total,
        );

        for (dectype, _, _) in &dec_selections {
            if let Some(sample_dec) = sample.dec(*dectype).cloned()
                && let Some(dec) = merged.dec_mut(*dectype)
            {
                merge_dec_aggregate(dec, &sample_dec, count_after, lag_count, &sample.time_lags);
            }
        }

        merged.transport = None;
        if let Some(dec) = merged.spatial.as_mut() {
            dec.transport = None;
        }
        if let Some(dec) = merged.energy.as_mut() {
            dec.transport = None;
        }
        Ok(merged)
    }

    /// Fit the Cesaro curves over the given ranges (or the stored ones)
    /// and attach the resulting transport coefficients. Results are
    /// derived state, recomputed in full on every call.
    pub fn fit(&self, ranges: Option<&[FitRange]>) -> DecondResult<Self> {
        let mut sorted: Vec<FitRange> = match ranges {
            Some(ranges) => ranges.to_vec(),
            None => self.fit_ranges.clone().ok_or(DecondError::NoFitRanges)?,
        };
        if sorted.is_empty() {
            return Err(DecondError::NoFitRanges);
        }
        sorted.sort_by(|left, right| left.begin.total_cmp(&right.begin));
        let selections = ranges_to_selections(&sorted, &self.time_lags)?;

        let count = self.sample_count;
        let fit_label = fit_unit(&self.corr_unit);

        let per_component = fit_estimate(
            &self.cesaro.mean,
            &err_to_std(&self.cesaro.err(count), count),
            &self.time_lags,
            &selections,
            count,
            fit_label.clone(),
        );
        let total = fit_estimate(
            &self.total_cesaro.mean,
            &err_to_std(&self.total_cesaro.err(count), count),
            &self.time_lags,
            &selections,
            count,
            fit_label,
        );

        let mut fitted = self.clone();
        for dectype in DecType::ALL {
            if let Some(dec) = fitted.dec_mut(dectype) {
                let lag_count = self.time_lags.len();
                let weighted_err =
                    dec.cesaro
                        .err_weighted(count, &dec.pair_count.mean, lag_count);
                dec.transport = Some(fit_estimate(
                    &dec.cesaro.mean,
                    &err_to_std(&weighted_err, count),
                    &self.time_lags,
                    &selections,
                    count,
                    fit_unit(&dec.corr_unit),
                ));
            }
        }
        fitted.fit_ranges = Some(sorted);
        fitted.transport = Some(TransportFit {
            per_component,
            total,
        });
        Ok(fitted)
    }

    pub fn type_counts(&self) -> pairtype::TypeCounts {
        pairtype::type_counts(self.num_mol.len())
    }

    pub fn charge_products(&self) -> Vec<f64> {
        pairtype::charge_products(&self.charge)
    }

    pub fn dec(&self, dectype: DecType) -> Option<&DecAggregate> {
        match dectype {
            DecType::Spatial => self.spatial.as_ref(),
            DecType::Energy => self.energy.as_ref(),
        }
    }

    pub fn dec_mut(&mut self, dectype: DecType) -> Option<&mut DecAggregate> {
        match dectype {
            DecType::Spatial => self.spatial.as_mut(),
            DecType::Energy => self.energy.as_mut(),
        }
    }

    fn shrink_lags(&mut self, selection: &Range<usize>) {
        let lag_count = self.time_lags.len();
        self.time_lags = self.time_lags[selection.clone()].to_vec();
        self.corr.mean = select_columns(&self.corr.mean, lag_count, selection);
        self.corr.m2 = select_columns(&self.corr.m2, lag_count, selection);
        self.cesaro.mean = select_columns(&self.cesaro.mean, lag_count, selection);
        self.cesaro.m2 = select_columns(&self.cesaro.m2, lag_count, selection);
        self.total_cesaro.mean = select_columns(&self.total_cesaro.mean, lag_count, selection);
        self.total_cesaro.m2 = select_columns(&self.total_cesaro.m2, lag_count, selection);
        for dectype in DecType::ALL {
            if let Some(dec) = self.dec_mut(dectype) {
                dec.corr.mean = select_columns(&dec.corr.mean, lag_count, selection);
                dec.corr.m2 = select_columns(&dec.corr.m2, lag_count, selection);
                dec.cesaro.mean = select_columns(&dec.cesaro.mean, lag_count, selection);
                dec.cesaro.m2 = select_columns(&dec.cesaro.m2, lag_count, selection);
            }
        }
    }
}

fn first_dec_aggregate(dec: &DecSample, time_lags: &[f64]) -> DecAggregate {
    let cesaro_values = cesaro_rows(&dec.corr, time_lags);
    DecAggregate {
        bins: dec.bins.clone(),
        bins_unit: dec.bins_unit.clone(),
        corr: ArrayMoments::first(dec.corr.clone()),
        corr_unit: dec.corr_unit.clone(),
        cesaro: ArrayMoments::first(cesaro_values),
        cesaro_unit: cesaro_unit(&dec.corr_unit),
        pair_count: ArrayMoments::first(dec.pair_count.clone()),
        transport: None,
    }
}

fn merge_dec_aggregate(
    dec: &mut DecAggregate,
    sample_dec: &DecSample,
    count_after: u64,
    lag_count: usize,
    time_lags: &[f64],
) {
    let sample_cesaro = cesaro_rows(&sample_dec.corr, time_lags);
    // quantities weighted by the pair count must consume the cumulative
    // weight from before this sample; the pair count itself is updated
    // strictly afterwards
    let prior_count = (count_after - 1) as f64;
    let prior_weight_sum: Vec<f64> = dec
        .pair_count
        .mean
        .iter()
        .map(|mean| prior_count * mean)
        .collect();

    let corr_update = weighted_step(
        &dec.corr.mean,
        &dec.corr.m2,
        &prior_weight_sum,
        &sample_dec.corr,
        &sample_dec.pair_count,
        lag_count,
    );
    dec.corr.mean = corr_update.mean;
    dec.corr.m2 = corr_update.m2;

    let cesaro_update = weighted_step(
        &dec.cesaro.mean,
        &dec.cesaro.m2,
        &prior_weight_sum,
        &sample_cesaro,
        &sample_dec.pair_count,
        lag_count,
    );
    dec.cesaro.mean = cesaro_update.mean;
    dec.cesaro.m2 = cesaro_update.m2;

    (dec.pair_count.mean, dec.pair_count.m2) = welford_step(
        &dec.pair_count.mean,
        &dec.pair_count.m2,
        count_after,
        &sample_dec.pair_count,
    );
}

fn total_cesaro_of(cesaro_values: &[f64], lag_count: usize, sample: &CorrSample) -> Vec<f64> {
    let products = sample.charge_products();
    let weights = sample.cross_weights();
    let mut total = vec![0.0; lag_count];
    for (row, chunk) in cesaro_values.chunks_exact(lag_count).enumerate() {
        let factor = products[row] * weights[row];
        for (slot, value) in total.iter_mut().zip(chunk) {
            *slot += factor * value;
        }
    }
    total
}

fn shrink_sample_lags(sample: &mut CorrSample, selection: &Range<usize>) {
    let lag_count = sample.time_lags.len();
    sample.time_lags = sample.time_lags[selection.clone()].to_vec();
    sample.corr = select_columns(&sample.corr, lag_count, selection);
    for dectype in DecType::ALL {
        if let Some(dec) = sample_dec_mut(sample, dectype) {
            dec.corr = select_columns(&dec.corr, lag_count, selection);
        }
    }
}

fn sample_dec_mut(sample: &mut CorrSample, dectype: DecType) -> Option<&mut DecSample> {
    match dectype {
        DecType::Spatial => sample.spatial.as_mut(),
        DecType::Energy => sample.energy.as_mut(),
    }
}

fn shrink_dec_aggregate(dec: &mut DecAggregate, bin_selection: &Range<usize>, lag_count: usize) {
    let bin_count = dec.bins.len();
    dec.bins = dec.bins[bin_selection.clone()].to_vec();
    dec.corr.mean = select_middle(&dec.corr.mean, bin_count, lag_count, bin_selection);
    dec.corr.m2 = select_middle(&dec.corr.m2, bin_count, lag_count, bin_selection);
    dec.cesaro.mean = select_middle(&dec.cesaro.mean, bin_count, lag_count, bin_selection);
    dec.cesaro.m2 = select_middle(&dec.cesaro.m2, bin_count, lag_count, bin_selection);
    dec.pair_count.mean = select_columns(&dec.pair_count.mean, bin_count, bin_selection);
    dec.pair_count.m2 = select_columns(&dec.pair_count.m2, bin_count, bin_selection);
}

fn shrink_dec_sample(dec: &mut DecSample, bin_selection: &Range<usize>, lag_count: usize) {
    let bin_count = dec.bins.len();
    dec.bins = dec.bins[bin_selection.clone()].to_vec();
    dec.corr = select_middle(&dec.corr, bin_count, lag_count, bin_selection);
    dec.pair_count = select_columns(&dec.pair_count, bin_count, bin_selection);
}

/// Select a column range from a flattened `(rows, columns)` array.
fn select_columns(values: &[f64], column_count: usize, selection: &Range<usize>) -> Vec<f64> {
    let row_count = values.len() / column_count;
    let mut selected = Vec::with_capacity(row_count * selection.len());
    for row in 0..row_count {
        let base = row * column_count;
        selected.extend_from_slice(&values[base + selection.start..base + selection.end]);
    }
    selected
}

/// Select a middle-axis range from a flattened `(outer, middle, inner)`
/// array, keeping the inner axis whole.
fn select_middle(
    values: &[f64],
    middle_count: usize,
    inner_count: usize,
    selection: &Range<usize>,
) -> Vec<f64> {
    let outer_count = values.len() / (middle_count * inner_count);
    let mut selected =
        Vec::with_capacity(outer_count * selection.len() * inner_count);
    for outer in 0..outer_count {
        let base = outer * middle_count * inner_count;
        for middle in selection.clone() {
            let start = base + middle * inner_count;
            selected.extend_from_slice(&values[start..start + inner_count]);
        }
    }
    selected
}

/// Fit each row of a flattened `(rows, lag)` curve over every selection,
/// producing `(range, row)`-flattened values and errors.
fn fit_estimate(
    curve: &[f64],
    std: &[f64],
    time_lags: &[f64],
    selections: &[Range<usize>],
    count: u64,
    unit: String,
) -> TransportEstimate {
    let lag_count = time_lags.len();
    let row_count = curve.len() / lag_count;
    let mut slopes = Vec::with_capacity(selections.len() * row_count);
    let mut sigma_slopes = Vec::with_capacity(selections.len() * row_count);
    for selection in selections {
        let x = &time_lags[selection.clone()];
        for row in 0..row_count {
            let base = row * lag_count;
            let y = &curve[base + selection.start..base + selection.end];
            let fit = if count > 1 {
                let sig = &std[base + selection.start..base + selection.end];
                fit_linear(x, y, Some(sig))
            } else {
                fit_linear(x, y, None)
            };
            slopes.push(fit.slope);
            sigma_slopes.push(fit.sigma_slope);
        }
    }
    let err = std_to_err(&sigma_slopes, count);
    TransportEstimate {
        value: slopes,
        err,
        unit,
    }
}

/// Unit label of a fitted slope: the Cesaro length token over one power
/// of the correlation time token, e.g. `nm$^2$ ps$^{-2}$` -> `nm$^2$
/// ps$^{-1}$`.
fn fit_unit(corr_unit: &str) -> String {
    let mut tokens = corr_unit.split_whitespace();
    match (tokens.next(), tokens.next()) {
        (Some(length), Some(time)) => {
            let time_base = time.split('$').next().unwrap_or(time);
            format!("{length} {time_base}$^{{-1}}$")
        }
        _ => corr_unit.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{Aggregate, fit_unit};
    use crate::analysis::sample::{CorrSample, DecSample};
    use crate::domain::{DecType, DecondError};
    use crate::numerics::fitting::FitRange;
    use crate::numerics::grid::GridError;

    fn sample_with_constant_corr(values: [f64; 5]) -> CorrSample {
        let time_lags = vec![0.0, 1.0, 2.0, 3.0];
        let mut corr = Vec::new();
        for value in values {
            corr.extend(std::iter::repeat_n(value, time_lags.len()));
        }
        CorrSample {
            num_mol: vec![8, 8],
            charge: vec![1, -1],
            charge_unit: "e".to_string(),
            volume: 64.0,
            volume_unit: "nm$^3$".to_string(),
            temperature: 300.0,
            temperature_unit: "K".to_string(),
            time_lags,
            time_lags_unit: "ps".to_string(),
            corr,
            corr_unit: "nm$^2$ ps$^{-2}$".to_string(),
            spatial: None,
            energy: None,
        }
    }

    fn spatial_sample(corr_value: f64, pair_counts: [f64; 9]) -> CorrSample {
        let mut sample = sample_with_constant_corr([corr_value; 5]);
        let bins = vec![0.25, 0.75, 1.25];
        let lag_count = sample.time_lags.len();
        sample.spatial = Some(DecSample {
            bins: bins.clone(),
            bins_unit: "nm".to_string(),
            corr: vec![corr_value; 3 * bins.len() * lag_count],
            corr_unit: "nm$^2$ ps$^{-2}$".to_string(),
            pair_count: pair_counts.to_vec(),
        });
        sample
    }

    #[test]
    fn three_identical_samples_average_exactly_with_zero_error() {
        let values = [1.0, 2.0, 0.5, -0.25, 0.75];
        let aggregate = Aggregate::from_sample(sample_with_constant_corr(values))
            .expect("first sample");
        let aggregate = aggregate
            .merge(sample_with_constant_corr(values))
            .expect("second sample");
        let aggregate = aggregate
            .merge(sample_with_constant_corr(values))
            .expect("third sample");

        assert_eq!(aggregate.sample_count, 3);
        for (row, expected) in values.iter().enumerate() {
            for lag in 0..aggregate.time_lags.len() {
                let mean = aggregate.corr.mean[row * aggregate.time_lags.len() + lag];
                assert_eq!(mean, *expected, "mean at row {row}");
            }
        }
        // identical samples: variance is exactly zero, and with n = 3 the
        // standard error must be zero, not NaN
        let err = aggregate.corr.err(aggregate.sample_count);
        assert!(err.iter().all(|value| *value == 0.0));
        assert_eq!(aggregate.volume.err(3), 0.0);
        let cesaro_err = aggregate.cesaro.err(3);
        assert!(cesaro_err.iter().all(|value| *value == 0.0));
    }

    #[test]
    fn first_sample_reports_nan_errors() {
        let aggregate = Aggregate::from_sample(sample_with_constant_corr([1.0; 5]))
            .expect("first sample");
        assert_eq!(aggregate.sample_count, 1);
        assert!(aggregate.volume.err(1).is_nan());
        assert!(aggregate.corr.err(1).iter().all(|value| value.is_nan()));
    }

    #[test]
    fn mismatched_step_width_aborts_and_preserves_the_aggregate() {
        let aggregate = Aggregate::from_sample(sample_with_constant_corr([1.0; 5]))
            .expect("first sample");
        let pristine = aggregate.clone();

        let mut bad = sample_with_constant_corr([2.0; 5]);
        bad.time_lags = vec![0.0, 0.5, 1.0, 1.5];
        let error = aggregate.merge(bad).expect_err("step mismatch should fail");
        assert!(matches!(
            error,
            DecondError::Grid(GridError::StepMismatch { .. })
        ));
        assert_eq!(aggregate, pristine);
        assert_eq!(aggregate.sample_count, 1);
    }

    #[test]
    fn merging_a_shorter_sample_shrinks_to_the_overlap() {
        let aggregate = Aggregate::from_sample(sample_with_constant_corr([1.0; 5]))
            .expect("first sample");
        let mut short = sample_with_constant_corr([3.0; 5]);
        short.time_lags = vec![0.0, 1.0, 2.0];
        short.corr = short
            .corr
            .chunks_exact(4)
            .flat_map(|row| row[..3].to_vec())
            .collect();

        let merged = aggregate.merge(short).expect("merge");
        assert_eq!(merged.time_lags, vec![0.0, 1.0, 2.0]);
        assert_eq!(merged.corr.mean.len(), 5 * 3);
        assert_eq!(merged.cesaro.mean.len(), 5 * 3);
        assert_eq!(merged.total_cesaro.mean.len(), 3);
        assert_eq!(merged.corr.mean[0], 2.0);
    }

    #[test]
    fn total_cesaro_weighs_components_by_charge_product_and_multiplicity() {
        // all-type rows: autos [+1, -1], pairs (+,+), (+,-), (-,-)
        // zz = [1, 1, 1, -1, 1], ww = [1, 1, 1, 2, 1]
        let aggregate =
            Aggregate::from_sample(sample_with_constant_corr([1.0, 1.0, 1.0, 1.0, 1.0]))
                .expect("first sample");
        let lag_count = aggregate.time_lags.len();
        // per-component cesaro values are equal, so the total collapses to
        // the sum of zz*ww = 1 + 1 + 1 - 2 + 1 = 2 times one component
        for lag in 0..lag_count {
            let component = aggregate.cesaro.mean[lag];
            assert!(
                (aggregate.total_cesaro.mean[lag] - 2.0 * component).abs() <= 1.0e-12,
                "lag {lag}"
            );
        }
    }

    #[test]
    fn impulse_correlation_fits_to_the_exact_cesaro_slope() {
        // corr = [c, 0, 0, ...] gives a Cesaro curve that is exactly
        // linear with slope c/2 from the second lag onwards
        let c = 4.0;
        let mut sample = sample_with_constant_corr([0.0; 5]);
        let lag_count = sample.time_lags.len();
        for row in 0..5 {
            sample.corr[row * lag_count] = c;
        }
        let aggregate = Aggregate::from_sample(sample).expect("first sample");
        let fitted = aggregate
            .fit(Some(&[FitRange { begin: 1.0, end: 3.0 }]))
            .expect("fit");

        let transport = fitted.transport.as_ref().expect("transport");
        for component in 0..5 {
            assert!(
                (transport.per_component.value[component] - c / 2.0).abs() < 1.0e-12,
                "component {component}"
            );
        }
        assert_eq!(transport.per_component.unit, "nm$^2$ ps$^{-1}$");
        // single sample: slope errors are statistically undefined
        assert!(transport.per_component.err.iter().all(|value| value.is_nan()));
    }

    #[test]
    fn merge_invalidates_fit_results_but_keeps_the_ranges() {
        let aggregate = Aggregate::from_sample(sample_with_constant_corr([1.0; 5]))
            .expect("first sample");
        let fitted = aggregate
            .fit(Some(&[FitRange { begin: 0.0, end: 3.0 }]))
            .expect("fit");
        assert!(fitted.transport.is_some());

        let merged = fitted
            .merge(sample_with_constant_corr([2.0; 5]))
            .expect("merge");
        assert!(merged.transport.is_none());
        assert_eq!(
            merged.fit_ranges,
            Some(vec![FitRange { begin: 0.0, end: 3.0 }])
        );
        let refitted = merged.fit(None).expect("refit from stored ranges");
        assert!(refitted.transport.is_some());
    }

    #[test]
    fn weighted_decomposition_mean_matches_the_direct_pair_count_average() {
        let aggregate = Aggregate::from_sample(spatial_sample(2.0, [4.0; 9]))
            .expect("first sample");
        let merged = aggregate
            .merge(spatial_sample(5.0, [1.0; 9]))
            .expect("second sample");

        let dec = merged.spatial.as_ref().expect("spatial aggregate");
        let expected = (2.0 * 4.0 + 5.0 * 1.0) / 5.0;
        for value in &dec.corr.mean {
            assert!((value - expected).abs() < 1.0e-12);
        }
        // the weight itself averages unweighted
        for value in &dec.pair_count.mean {
            assert!((value - 2.5).abs() < 1.0e-12);
        }
    }

    #[test]
    fn sample_without_the_aggregated_decomposition_is_rejected_atomically() {
        let aggregate = Aggregate::from_sample(spatial_sample(2.0, [4.0; 9]))
            .expect("first sample");
        let pristine = aggregate.clone();
        let error = aggregate
            .merge(sample_with_constant_corr([1.0; 5]))
            .expect_err("missing decomposition should fail");
        assert!(matches!(
            error,
            DecondError::SampleMissingDecomposition {
                dectype: DecType::Spatial
            }
        ));
        assert_eq!(aggregate, pristine);
    }

    #[test]
    fn fit_unit_drops_one_time_power() {
        assert_eq!(fit_unit("nm$^2$ ps$^{-2}$"), "nm$^2$ ps$^{-1}$");
        assert_eq!(fit_unit("nm$^2$"), "nm$^2$");
    }
}
