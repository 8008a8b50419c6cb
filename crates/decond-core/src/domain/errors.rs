use crate::analysis::sample::ShapeError;
use crate::domain::DecType;
use crate::numerics::fitting::FitRangeError;
use crate::numerics::grid::GridError;
use crate::store::StoreError;

pub type DecondResult<T> = Result<T, DecondError>;

/// Engine-wide error type. Every variant is fatal to the operation that
/// raised it and is reported to the immediate caller; a failed sample
/// merge leaves the aggregate in its pre-merge state.
#[derive(Debug, thiserror::Error)]
pub enum DecondError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    FitRange(#[from] FitRangeError),
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{operation} is not defined for the {dectype} decomposition")]
    UnsupportedDecomposition {
        dectype: DecType,
        operation: &'static str,
    },
    #[error("aggregate has no {dectype} decomposition")]
    MissingDecomposition { dectype: DecType },
    #[error("sample lacks the {dectype} decomposition carried by the aggregate")]
    SampleMissingDecomposition { dectype: DecType },
    #[error("no fit ranges have been provided")]
    NoFitRanges,
    #[error("transport coefficients have not been fitted yet")]
    NotFitted,
}
