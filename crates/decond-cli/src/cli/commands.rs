use super::helpers::{format_value_with_error, parse_fit_range};
use anyhow::Context;
use decond_core::analysis::aggregate::Aggregate;
use decond_core::analysis::decompose::diffusion_coefficients;
use decond_core::common::constants::nd_to_conductivity;
use decond_core::numerics::fitting::FitRange;
use decond_core::store::{load_aggregate, load_sample, save_aggregate};
use std::path::{Path, PathBuf};

#[derive(clap::Args)]
pub(super) struct NewArgs {
    /// Output aggregate record path
    #[arg(long, short = 'o')]
    output: PathBuf,

    /// Fit range as begin:end in time-lag units (repeatable)
    #[arg(long = "fit", value_parser = parse_fit_range, required = true)]
    fit: Vec<FitRange>,

    /// Correlation sample record paths
    #[arg(required = true)]
    samples: Vec<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct ExtendArgs {
    /// Existing aggregate record to resume from
    #[arg(long)]
    aggregate: PathBuf,

    /// Output aggregate record path
    #[arg(long, short = 'o')]
    output: PathBuf,

    /// Replacement fit range as begin:end (repeatable); the stored
    /// ranges are reused when omitted
    #[arg(long = "fit", value_parser = parse_fit_range)]
    fit: Vec<FitRange>,

    /// Correlation sample record paths
    #[arg(required = true)]
    samples: Vec<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct FitArgs {
    /// Existing aggregate record
    #[arg(long)]
    aggregate: PathBuf,

    /// Output aggregate record path
    #[arg(long, short = 'o')]
    output: PathBuf,

    /// Fit range as begin:end in time-lag units (repeatable)
    #[arg(long = "fit", value_parser = parse_fit_range, required = true)]
    fit: Vec<FitRange>,
}

#[derive(clap::Args)]
pub(super) struct ReportArgs {
    /// Fitted aggregate record
    aggregate: PathBuf,

    /// Report in simulation units instead of SI
    #[arg(long)]
    native_units: bool,

    /// Emit the report as JSON instead of text
    #[arg(long)]
    json: bool,
}

pub(super) fn run_new(args: NewArgs) -> anyhow::Result<()> {
    let mut samples = args.samples.iter();
    let first = samples.next().context("at least one sample is required")?;
    let mut aggregate = Aggregate::from_sample(load_sample_at(first)?)
        .with_context(|| format!("failed to seed the aggregate from '{}'", first.display()))?;
    tracing::info!(sample = %first.display(), "seeded aggregate");

    for path in samples {
        aggregate = merge_sample(aggregate, path)?;
    }
    let aggregate = aggregate
        .fit(Some(&args.fit))
        .context("failed to fit the Cesaro curves")?;
    write_aggregate(&args.output, &aggregate)
}

pub(super) fn run_extend(args: ExtendArgs) -> anyhow::Result<()> {
    let mut aggregate = load_aggregate(&args.aggregate).with_context(|| {
        format!("failed to load aggregate '{}'", args.aggregate.display())
    })?;
    tracing::info!(
        aggregate = %args.aggregate.display(),
        num_sample = aggregate.sample_count,
        "resuming accumulation"
    );

    for path in &args.samples {
        aggregate = merge_sample(aggregate, path)?;
    }
    let ranges = if args.fit.is_empty() {
        None
    } else {
        Some(args.fit.as_slice())
    };
    let aggregate = aggregate
        .fit(ranges)
        .context("failed to fit the Cesaro curves")?;
    write_aggregate(&args.output, &aggregate)
}

pub(super) fn run_fit(args: FitArgs) -> anyhow::Result<()> {
    let aggregate = load_aggregate(&args.aggregate).with_context(|| {
        format!("failed to load aggregate '{}'", args.aggregate.display())
    })?;
    let aggregate = aggregate
        .fit(Some(&args.fit))
        .context("failed to fit the Cesaro curves")?;
    write_aggregate(&args.output, &aggregate)
}

pub(super) fn run_report(args: ReportArgs) -> anyhow::Result<()> {
    let aggregate = load_aggregate(&args.aggregate).with_context(|| {
        format!("failed to load aggregate '{}'", args.aggregate.display())
    })?;
    let si_unit = !args.native_units;
    let diffusion = diffusion_coefficients(&aggregate, si_unit)
        .context("aggregate has no fitted transport coefficients")?;
    let transport = aggregate
        .transport
        .as_ref()
        .context("aggregate has no fitted transport coefficients")?;

    let conductivity_factor = nd_to_conductivity(
        aggregate.temperature.mean,
        aggregate.volume.mean,
        si_unit,
    );
    let conductivity_unit = if si_unit { "S m$^{-1}$" } else { "non-SI unit" };
    let molecule_count = aggregate.num_mol.len();

    if args.json {
        let ranges: Vec<_> = diffusion
            .ranges
            .iter()
            .enumerate()
            .map(|(range_index, range)| {
                let diffusion_rows: Vec<_> = (0..molecule_count)
                    .map(|moltype| {
                        let index = range_index * molecule_count + moltype;
                        serde_json::json!({
                            "type": moltype,
                            "value": nullable(diffusion.values[index]),
                            "err": nullable(diffusion.err[index]),
                        })
                    })
                    .collect();
                serde_json::json!({
                    "begin": range.begin,
                    "end": range.end,
                    "diffusion": diffusion_rows,
                    "conductivity": nullable(
                        transport.total.value[range_index] * conductivity_factor
                    ),
                })
            })
            .collect();
        let report = serde_json::json!({
            "numSample": aggregate.sample_count,
            "diffusionUnit": diffusion.unit,
            "conductivityUnit": conductivity_unit,
            "ranges": ranges,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("samples merged: {}", aggregate.sample_count);
    for (range_index, range) in diffusion.ranges.iter().enumerate() {
        println!(
            "fit range [{}, {}] {}",
            range.begin, range.end, aggregate.time_lags_unit
        );
        for moltype in 0..molecule_count {
            let index = range_index * molecule_count + moltype;
            println!(
                "  D[{moltype}]     = {}  {}",
                format_value_with_error(diffusion.values[index], diffusion.err[index]),
                diffusion.unit
            );
        }
        let total = transport.total.value[range_index] * conductivity_factor;
        let total_err = transport.total.err[range_index] * conductivity_factor;
        println!(
            "  sigma    = {}  {}",
            format_value_with_error(total, total_err),
            conductivity_unit
        );
    }
    Ok(())
}

fn nullable(value: f64) -> serde_json::Value {
    if value.is_finite() {
        serde_json::json!(value)
    } else {
        serde_json::Value::Null
    }
}

fn load_sample_at(path: &Path) -> anyhow::Result<decond_core::analysis::sample::CorrSample> {
    load_sample(path).with_context(|| format!("failed to load sample '{}'", path.display()))
}

fn merge_sample(aggregate: Aggregate, path: &Path) -> anyhow::Result<Aggregate> {
    let merged = aggregate
        .merge(load_sample_at(path)?)
        .with_context(|| format!("failed to merge sample '{}'", path.display()))?;
    tracing::info!(
        sample = %path.display(),
        num_sample = merged.sample_count,
        "merged sample"
    );
    Ok(merged)
}

fn write_aggregate(path: &Path, aggregate: &Aggregate) -> anyhow::Result<()> {
    save_aggregate(path, aggregate)
        .with_context(|| format!("failed to write aggregate '{}'", path.display()))?;
    tracing::info!(
        aggregate = %path.display(),
        num_sample = aggregate.sample_count,
        "wrote aggregate"
    );
    Ok(())
}
