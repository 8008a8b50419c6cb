pub mod aggregate;
pub mod decompose;
pub mod sample;

pub use aggregate::{Aggregate, ArrayMoments, DecAggregate, ScalarMoments, TransportEstimate};
pub use decompose::{
    ConductivityDecomposition, DiffusionReport, NonlocalOptions, RadialDistribution,
    conductivity_decomposition, diffusion_coefficients, radial_distribution,
};
pub use sample::{CorrSample, DecSample, ShapeError};
