//! Cesaro transform: cumulative trapezoidal integration applied twice
//! over the time-lag axis, turning a velocity-correlation function into a
//! mean-square-displacement-like quantity whose long-time slope is a
//! transport coefficient.

/// Cumulative trapezoid of `values` over `axis`, zero at the first point.
pub fn cumtrapz(values: &[f64], axis: &[f64]) -> Vec<f64> {
    assert_eq!(values.len(), axis.len(), "cumtrapz shape mismatch");
    let mut integral = Vec::with_capacity(values.len());
    let mut running = 0.0;
    for index in 0..values.len() {
        if index > 0 {
            running += 0.5 * (values[index] + values[index - 1]) * (axis[index] - axis[index - 1]);
        }
        integral.push(running);
    }
    integral
}

/// Cumulative trapezoid with implicit unit spacing.
pub fn cumtrapz_unit_spacing(values: &[f64]) -> Vec<f64> {
    let mut integral = Vec::with_capacity(values.len());
    let mut running = 0.0;
    for index in 0..values.len() {
        if index > 0 {
            running += 0.5 * (values[index] + values[index - 1]);
        }
        integral.push(running);
    }
    integral
}

/// Double cumulative trapezoid over one row.
pub fn cesaro_integrate(values: &[f64], axis: &[f64]) -> Vec<f64> {
    cumtrapz(&cumtrapz(values, axis), axis)
}

/// Double cumulative trapezoid applied row-wise to a flattened
/// `(rows, axis)` array.
pub fn cesaro_rows(values: &[f64], axis: &[f64]) -> Vec<f64> {
    assert!(
        !axis.is_empty() && values.len() % axis.len() == 0,
        "row length does not divide the array"
    );
    let mut transformed = Vec::with_capacity(values.len());
    for row in values.chunks_exact(axis.len()) {
        transformed.extend(cesaro_integrate(row, axis));
    }
    transformed
}

/// Unit label of the Cesaro quantity: integrating `L^2 T^-2` twice over
/// time leaves `L^2`, so the leading token of the correlation unit label
/// survives. Labels are opaque; no dimensional checking happens here.
pub fn cesaro_unit(corr_unit: &str) -> String {
    corr_unit
        .split_whitespace()
        .next()
        .unwrap_or(corr_unit)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::{cesaro_integrate, cesaro_rows, cesaro_unit, cumtrapz, cumtrapz_unit_spacing};

    #[test]
    fn cumtrapz_starts_at_zero_and_matches_linear_ramp() {
        let axis = [0.0, 1.0, 2.0, 3.0];
        let values = [0.0, 1.0, 2.0, 3.0];
        let integral = cumtrapz(&values, &axis);
        assert_eq!(integral, vec![0.0, 0.5, 2.0, 4.5]);
    }

    #[test]
    fn constant_correlation_yields_quadratic_cesaro_growth() {
        let c0 = 2.5;
        let axis: Vec<f64> = (0..200).map(|index| 0.05 * index as f64).collect();
        let values = vec![c0; axis.len()];
        let cesaro = cesaro_integrate(&values, &axis);
        for (index, time) in axis.iter().copied().enumerate() {
            let expected = 0.5 * c0 * time * time;
            // trapezoidal rule is exact for the inner (linear) integrand,
            // so only accumulated round-off separates the two
            assert!(
                (cesaro[index] - expected).abs() <= 1.0e-9 * expected.max(1.0),
                "at t={time}: {} vs {}",
                cesaro[index],
                expected
            );
        }
    }

    #[test]
    fn rows_are_transformed_independently() {
        let axis = [0.0, 1.0, 2.0];
        let values = [1.0, 1.0, 1.0, 2.0, 2.0, 2.0];
        let transformed = cesaro_rows(&values, &axis);
        let first = cesaro_integrate(&values[..3], &axis);
        let second = cesaro_integrate(&values[3..], &axis);
        assert_eq!(&transformed[..3], first.as_slice());
        assert_eq!(&transformed[3..], second.as_slice());
    }

    #[test]
    fn unit_spacing_variant_matches_explicit_unit_axis() {
        let axis = [0.0, 1.0, 2.0, 3.0];
        let values = [1.0, 3.0, 2.0, 5.0];
        assert_eq!(cumtrapz_unit_spacing(&values), cumtrapz(&values, &axis));
    }

    #[test]
    fn cesaro_unit_keeps_the_leading_length_token() {
        assert_eq!(cesaro_unit("nm$^2$ ps$^{-2}$"), "nm$^2$");
        assert_eq!(cesaro_unit("nm$^2$"), "nm$^2$");
    }
}
