//! Physical constants and unit-conversion factors.
//!
//! Native engine units are the simulation units of the correlation files:
//! nm for length, ps for time, elementary charges for charge, K for
//! temperature. SI conversion happens only at reporting boundaries.

/// Boltzmann constant in J K^-1 (2019 SI exact value).
pub const BOLTZMANN: f64 = 1.380_649e-23;

/// Elementary charge in C (2019 SI exact value).
pub const ELEMENTARY_CHARGE: f64 = 1.602_176_634e-19;

pub const NANO: f64 = 1.0e-9;
pub const PICO: f64 = 1.0e-12;

/// Conversion from a fitted `nD` value (nm^2 ps^-1) to electrical
/// conductivity: `beta / volume`, optionally scaled into S m^-1.
pub fn nd_to_conductivity(temperature: f64, volume: f64, si_unit: bool) -> f64 {
    let beta = 1.0 / (BOLTZMANN * temperature);
    let mut factor = beta / volume;
    if si_unit {
        factor *= ELEMENTARY_CHARGE * ELEMENTARY_CHARGE / NANO.powi(3) * (NANO * NANO / PICO);
    }
    factor
}

/// Conversion of a diffusion value from nm^2 ps^-1 to m^2 s^-1.
pub fn diffusion_to_si(value: f64) -> f64 {
    value * NANO * NANO / PICO
}
