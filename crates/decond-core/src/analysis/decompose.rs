//! Physically decomposed quantities derived from a fitted aggregate:
//! radial distribution functions, per-type self-diffusion, and the
//! local/nonlocal conductivity split. Pure computation over aggregated
//! data; nothing here mutates the aggregate.

use crate::analysis::aggregate::Aggregate;
use crate::common::constants::{
    BOLTZMANN, ELEMENTARY_CHARGE, NANO, PICO, diffusion_to_si, nd_to_conductivity,
};
use crate::domain::{DecType, DecondError, DecondResult};
use crate::numerics::cesaro::cumtrapz_unit_spacing;
use crate::numerics::fitting::FitRange;
use crate::numerics::pairtype::{pack, pair_populations};
use std::f64::consts::PI;

/// Radial distribution function per packed pair type, `(pair, bin)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RadialDistribution {
    pub bins: Vec<f64>,
    pub bins_unit: String,
    pub values: Vec<f64>,
}

/// Options for the local/nonlocal conductivity split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NonlocalOptions {
    /// Reference distance anchoring the nonlocal window, in bin-axis
    /// units. Defaults to the cube-diagonal bin `num_bins / sqrt(3)`.
    pub reference: Option<f64>,
    /// Averaging half-width around the reference, in bin-axis units.
    pub half_width: Option<f64>,
    /// Disable to fold everything into the local term.
    pub separate_nonlocal: bool,
    pub si_unit: bool,
}

impl Default for NonlocalOptions {
    fn default() -> Self {
        Self {
            reference: None,
            half_width: None,
            separate_nonlocal: true,
            si_unit: true,
        }
    }
}

const DEFAULT_AVERAGE_HALF_WIDTH: f64 = 0.25;

/// Conductivity decomposed along the spatial coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct ConductivityDecomposition {
    pub bins: Vec<f64>,
    pub bins_unit: String,
    /// Per molecule type, `(range, type, bin)` flattened: the auto term
    /// plus every cross contribution the type participates in.
    pub values: Vec<f64>,
    pub unit: String,
    /// Cumulative local contribution per packed pair, `(range, pair, bin)`.
    pub local: Vec<f64>,
    /// Distance-independent contribution per packed pair, `(range, pair)`.
    pub nonlocal: Vec<f64>,
}

/// Per-type self-diffusion coefficients, `(range, type)` flattened.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffusionReport {
    pub ranges: Vec<FitRange>,
    pub values: Vec<f64>,
    pub err: Vec<f64>,
    pub unit: String,
}

/// Radial distribution function from the aggregated spatial pair counts.
///
/// The shell volume is corrected for the finite cubic cell: spherical up
/// to half the cell length, truncated between `l/2` and `sqrt(2)*l/2`,
/// and undefined (NaN) beyond, where no valid density estimate exists.
pub fn radial_distribution(aggregate: &Aggregate) -> DecondResult<RadialDistribution> {
    let dec = aggregate
        .dec(DecType::Spatial)
        .ok_or(DecondError::MissingDecomposition {
            dectype: DecType::Spatial,
        })?;

    let volume = aggregate.volume.mean;
    let half_cell = volume.cbrt() / 2.0;
    let bins = &dec.bins;
    let bin_width = bins[1] - bins[0];
    let populations = pair_populations(&aggregate.num_mol);
    let pair_density: Vec<f64> = populations
        .iter()
        .map(|population| population / (volume * volume))
        .collect();

    let shell_volumes: Vec<f64> = bins
        .iter()
        .map(|radius| {
            if *radius >= f64::sqrt(2.0) * half_cell {
                f64::NAN
            } else if *radius > half_cell {
                4.0 * PI * bin_width * radius * (3.0 * half_cell - 2.0 * radius)
            } else {
                let spherical = 4.0 * PI * bin_width * radius * radius;
                if spherical == 0.0 { f64::NAN } else { spherical }
            }
        })
        .collect();

    let bin_count = bins.len();
    let mut values = Vec::with_capacity(dec.pair_count.mean.len());
    for (pair, counts) in dec.pair_count.mean.chunks_exact(bin_count).enumerate() {
        for (count, shell_volume) in counts.iter().zip(&shell_volumes) {
            values.push(count / shell_volume / volume / pair_density[pair]);
        }
    }

    Ok(RadialDistribution {
        bins: bins.clone(),
        bins_unit: dec.bins_unit.clone(),
        values,
    })
}

/// Per-type self-diffusion from the fitted per-component transport:
/// `D = nD / num_mol` over the auto components.
pub fn diffusion_coefficients(
    aggregate: &Aggregate,
    si_unit: bool,
) -> DecondResult<DiffusionReport> {
    let transport = aggregate.transport.as_ref().ok_or(DecondError::NotFitted)?;
    let ranges = aggregate
        .fit_ranges
        .clone()
        .ok_or(DecondError::NoFitRanges)?;
    let counts = aggregate.type_counts();
    let all_count = counts.all;

    let mut values = Vec::with_capacity(ranges.len() * counts.molecule);
    let mut err = Vec::with_capacity(ranges.len() * counts.molecule);
    for range_index in 0..ranges.len() {
        for moltype in 0..counts.molecule {
            let population = aggregate.num_mol[moltype] as f64;
            let index = range_index * all_count + moltype;
            let mut value = transport.per_component.value[index] / population;
            let mut error = transport.per_component.err[index] / population;
            if si_unit {
                value = diffusion_to_si(value);
                error = diffusion_to_si(error);
            }
            values.push(value);
            err.push(error);
        }
    }

    let unit = if si_unit {
        "m$^2$ s$^{-1}$".to_string()
    } else {
        transport.per_component.unit.clone()
    };
    Ok(DiffusionReport {
        ranges,
        values,
        err,
        unit,
    })
}

/// Split the conductivity field along the spatial decomposition into a
/// local (cumulative-integral) and a nonlocal (reference-window average)
/// part, and assemble the per-type decomposed conductivity.
pub fn conductivity_decomposition(
    aggregate: &Aggregate,
    dectype: DecType,
    options: &NonlocalOptions,
) -> DecondResult<ConductivityDecomposition> {
    if options.separate_nonlocal && dectype != DecType::Spatial {
        return Err(DecondError::UnsupportedDecomposition {
            dectype,
            operation: "local/nonlocal conductivity split",
        });
    }
    let dec = aggregate
        .dec(dectype)
        .ok_or(DecondError::MissingDecomposition { dectype })?;
    let transport = aggregate.transport.as_ref().ok_or(DecondError::NotFitted)?;
    let dec_transport = dec.transport.as_ref().ok_or(DecondError::NotFitted)?;

    let counts = aggregate.type_counts();
    let bin_count = dec.bins.len();
    let bin_width = dec.bins[1] - dec.bins[0];
    let range_count = dec_transport.value.len() / (counts.pair * bin_count);
    let products = aggregate.charge_products();
    let populations = pair_populations(&aggregate.num_mol);
    let volume = aggregate.volume.mean;
    let beta = 1.0 / (BOLTZMANN * aggregate.temperature.mean);
    let dec_diffusion = &dec_transport.value;

    // nonlocal part: window average of the decomposed diffusion anchored
    // at the reference bin
    let mut nonlocal_diffusion = vec![0.0; range_count * counts.pair];
    let mut nonlocal = vec![0.0; range_count * counts.pair];
    if options.separate_nonlocal {
        let reference_index = match options.reference {
            Some(reference) => reference / bin_width,
            None => bin_count as f64 / f64::sqrt(3.0),
        };
        let half_width_index =
            options.half_width.unwrap_or(DEFAULT_AVERAGE_HALF_WIDTH) / bin_width;
        let window = window_indices(reference_index, half_width_index, bin_count);

        for range_index in 0..range_count {
            for pair in 0..counts.pair {
                let base = (range_index * counts.pair + pair) * bin_count;
                let window_sum: f64 = dec_diffusion[base + window.0..base + window.1].iter().sum();
                let window_mean = window_sum / (window.1 - window.0) as f64;
                let slot = range_index * counts.pair + pair;
                nonlocal_diffusion[slot] = window_mean;
                nonlocal[slot] = populations[pair] / volume
                    * window_mean
                    * products[counts.molecule + pair]
                    * beta;
            }
        }
    }

    // local part: the spatially resolved term, cumulatively integrated
    // over the bins; undefined bins contribute nothing
    let mut local = Vec::with_capacity(range_count * counts.pair * bin_count);
    for range_index in 0..range_count {
        for pair in 0..counts.pair {
            let base = (range_index * counts.pair + pair) * bin_count;
            let slot = range_index * counts.pair + pair;
            let integrand: Vec<f64> = (0..bin_count)
                .map(|bin| {
                    let term = dec.pair_count.mean[pair * bin_count + bin] / volume
                        * (dec_diffusion[base + bin] - nonlocal_diffusion[slot])
                        * products[counts.molecule + pair]
                        * beta;
                    if term.is_nan() { 0.0 } else { term }
                })
                .collect();
            local.extend(cumtrapz_unit_spacing(&integrand));
        }
    }

    if options.si_unit {
        let conversion = ELEMENTARY_CHARGE * ELEMENTARY_CHARGE / NANO.powi(3) * (NANO * NANO / PICO);
        for value in local.iter_mut().chain(nonlocal.iter_mut()) {
            *value *= conversion;
        }
    }

    // ideal (auto) term per molecule type, constant over the bins
    let conductivity_factor =
        nd_to_conductivity(aggregate.temperature.mean, volume, options.si_unit);
    let mut values = Vec::with_capacity(range_count * counts.molecule * bin_count);
    for range_index in 0..range_count {
        for moltype in 0..counts.molecule {
            let auto = transport.per_component.value[range_index * counts.all + moltype]
                * products[moltype]
                * conductivity_factor;
            let row_base = values.len();
            values.extend(std::iter::repeat_n(auto, bin_count));
            for other in 0..counts.molecule {
                let pair = pack(moltype, other, counts.molecule);
                let slot = range_index * counts.pair + pair;
                let local_base = slot * bin_count;
                for bin in 0..bin_count {
                    values[row_base + bin] += local[local_base + bin] + nonlocal[slot];
                }
            }
        }
    }

    let unit = if options.si_unit {
        "S m$^{-1}$".to_string()
    } else {
        "non-SI unit".to_string()
    };
    Ok(ConductivityDecomposition {
        bins: dec.bins.clone(),
        bins_unit: dec.bins_unit.clone(),
        values,
        unit,
        local,
        nonlocal,
    })
}

fn window_indices(reference: f64, half_width: f64, bin_count: usize) -> (usize, usize) {
    let begin = ((reference - half_width).round().max(0.0) as usize).min(bin_count - 1);
    let end = (((reference + half_width).round()) as usize).clamp(begin + 1, bin_count);
    (begin, end)
}
