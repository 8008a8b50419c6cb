use decond_core::numerics::fitting::FitRange;

/// Parse a `begin:end` pair in time-lag units into a fit range.
pub(super) fn parse_fit_range(value: &str) -> Result<FitRange, String> {
    let (begin, end) = value
        .split_once(':')
        .ok_or_else(|| format!("expected begin:end, got '{value}'"))?;
    let begin: f64 = begin
        .trim()
        .parse()
        .map_err(|_| format!("'{begin}' is not a number"))?;
    let end: f64 = end
        .trim()
        .parse()
        .map_err(|_| format!("'{end}' is not a number"))?;
    if end <= begin {
        return Err(format!("fit range '{value}' has end <= begin"));
    }
    Ok(FitRange { begin, end })
}

pub(super) fn format_value_with_error(value: f64, err: f64) -> String {
    if err.is_finite() {
        format!("{value:14.6e} +/- {err:12.6e}")
    } else {
        format!("{value:14.6e} +/- (undefined)")
    }
}
