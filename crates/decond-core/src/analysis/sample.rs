//! One simulation run's correlation data, the unit of ingestion.

use crate::domain::DecType;
use crate::numerics::pairtype::{self, TypeCounts};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ShapeError {
    #[error("charge has {charge} entries but numMol has {num_mol}")]
    ChargeLength { charge: usize, num_mol: usize },
    #[error("time-lag axis needs at least 2 points, got {actual}")]
    TimeLagsTooShort { actual: usize },
    #[error("correlation array has {actual} values, expected {rows} rows x {lags} lags")]
    CorrShape {
        actual: usize,
        rows: usize,
        lags: usize,
    },
    #[error("{dectype} bin axis needs at least 2 points, got {actual}")]
    DecBinsTooShort { dectype: DecType, actual: usize },
    #[error(
        "{dectype} correlation array has {actual} values, expected {pairs} pairs x {bins} bins x {lags} lags"
    )]
    DecCorrShape {
        dectype: DecType,
        actual: usize,
        pairs: usize,
        bins: usize,
        lags: usize,
    },
    #[error("{dectype} pair counts have {actual} values, expected {pairs} pairs x {bins} bins")]
    PairCountShape {
        dectype: DecType,
        actual: usize,
        pairs: usize,
        bins: usize,
    },
    #[error(
        "sample component counts {actual_num_mol:?} do not match the aggregate's {expected_num_mol:?}"
    )]
    ComponentMismatch {
        expected_num_mol: Vec<u64>,
        actual_num_mol: Vec<u64>,
    },
}

/// Correlation data resolved along an auxiliary decomposition coordinate.
/// `corr` is a flattened `(pair, bin, lag)` array; `pair_count` holds the
/// number of observed pairs per `(pair, bin)` slot for this sample.
#[derive(Debug, Clone, PartialEq)]
pub struct DecSample {
    pub bins: Vec<f64>,
    pub bins_unit: String,
    pub corr: Vec<f64>,
    pub corr_unit: String,
    pub pair_count: Vec<f64>,
}

/// One run's correlation sample. Immutable once loaded; consumed whole by
/// the accumulation step.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrSample {
    pub num_mol: Vec<u64>,
    pub charge: Vec<i64>,
    pub charge_unit: String,
    pub volume: f64,
    pub volume_unit: String,
    pub temperature: f64,
    pub temperature_unit: String,
    pub time_lags: Vec<f64>,
    pub time_lags_unit: String,
    /// Flattened `(all-type, lag)` correlation array: auto components
    /// first, packed cross components after.
    pub corr: Vec<f64>,
    pub corr_unit: String,
    pub spatial: Option<DecSample>,
    pub energy: Option<DecSample>,
}

impl CorrSample {
    pub fn type_counts(&self) -> TypeCounts {
        pairtype::type_counts(self.num_mol.len())
    }

    pub fn charge_products(&self) -> Vec<f64> {
        pairtype::charge_products(&self.charge)
    }

    pub fn cross_weights(&self) -> Vec<f64> {
        pairtype::cross_weights(self.num_mol.len())
    }

    pub fn dec(&self, dectype: DecType) -> Option<&DecSample> {
        match dectype {
            DecType::Spatial => self.spatial.as_ref(),
            DecType::Energy => self.energy.as_ref(),
        }
    }

    pub fn validate(&self) -> Result<(), ShapeError> {
        if self.charge.len() != self.num_mol.len() {
            return Err(ShapeError::ChargeLength {
                charge: self.charge.len(),
                num_mol: self.num_mol.len(),
            });
        }
        if self.time_lags.len() < 2 {
            return Err(ShapeError::TimeLagsTooShort {
                actual: self.time_lags.len(),
            });
        }
        let counts = self.type_counts();
        let lag_count = self.time_lags.len();
        if self.corr.len() != counts.all * lag_count {
            return Err(ShapeError::CorrShape {
                actual: self.corr.len(),
                rows: counts.all,
                lags: lag_count,
            });
        }
        for dectype in DecType::ALL {
            if let Some(dec) = self.dec(dectype) {
                validate_dec(dec, dectype, counts.pair, lag_count)?;
            }
        }
        Ok(())
    }
}

fn validate_dec(
    dec: &DecSample,
    dectype: DecType,
    pair_count: usize,
    lag_count: usize,
) -> Result<(), ShapeError> {
    if dec.bins.len() < 2 {
        return Err(ShapeError::DecBinsTooShort {
            dectype,
            actual: dec.bins.len(),
        });
    }
    let bin_count = dec.bins.len();
    if dec.corr.len() != pair_count * bin_count * lag_count {
        return Err(ShapeError::DecCorrShape {
            dectype,
            actual: dec.corr.len(),
            pairs: pair_count,
            bins: bin_count,
            lags: lag_count,
        });
    }
    if dec.pair_count.len() != pair_count * bin_count {
        return Err(ShapeError::PairCountShape {
            dectype,
            actual: dec.pair_count.len(),
            pairs: pair_count,
            bins: bin_count,
        });
    }
    Ok(())
}
