//! Persisted-record contract: versioned, kind-tagged JSON records for
//! raw correlation samples and averaged aggregates.
//!
//! Aggregates persist in the `(mean, standard error, n)` encoding;
//! loading reconstructs the internal `(mean, M2, n)` encoding exactly,
//! so accumulation can resume as if it had never been interrupted.
//! Non-finite floats (NaN standard errors at `n = 1`, zero-weight bins)
//! serialize as JSON nulls and come back as NaN.

use crate::analysis::aggregate::{
    Aggregate, ArrayMoments, DecAggregate, ScalarMoments, TransportEstimate, TransportFit,
};
use crate::analysis::sample::{CorrSample, DecSample};
use crate::domain::{DecType, DecondResult};
use crate::numerics::fitting::FitRange;
use crate::numerics::moments::{err_to_m2, err_to_m2_scalar, err_to_m2_weighted};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Version of the persisted record format. The major component gates
/// loading: records from an older major are rejected.
pub const FORMAT_VERSION: &str = "1.0.0";
pub const REQUIRED_MAJOR: u64 = 1;

pub const CORR_KIND: &str = "correlation-sample";
pub const AGGREGATE_KIND: &str = "averaged-aggregate";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to write '{path}': {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse record '{path}': {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("failed to serialize record '{path}': {source}")]
    Serialize {
        path: String,
        source: serde_json::Error,
    },
    #[error(
        "record '{path}' is of version {found}, while this engine requires at least {required}.x.x"
    )]
    UnsupportedVersion {
        path: String,
        found: String,
        required: u64,
    },
    #[error("record '{path}' carries a malformed version '{found}'")]
    MalformedVersion { path: String, found: String },
    #[error("expecting a '{expected}' record at '{path}' but '{found}' was encountered")]
    UnsupportedKind {
        path: String,
        expected: String,
        found: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecRecord {
    pub bins: Vec<f64>,
    pub bins_unit: String,
    pub corr: Vec<f64>,
    pub corr_unit: String,
    pub pair_count: Vec<f64>,
}

/// On-disk form of one raw correlation sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrRecord {
    pub version: String,
    pub kind: String,
    pub num_mol: Vec<u64>,
    pub charge: Vec<i64>,
    pub charge_unit: String,
    pub volume: f64,
    pub volume_unit: String,
    pub temperature: f64,
    pub temperature_unit: String,
    pub time_lags: Vec<f64>,
    pub time_lags_unit: String,
    pub corr: Vec<f64>,
    pub corr_unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial_dec: Option<DecRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_dec: Option<DecRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportRecord {
    #[serde(with = "nullable_floats")]
    pub value: Vec<f64>,
    #[serde(with = "nullable_floats")]
    pub value_err: Vec<f64>,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecAggregateRecord {
    pub bins: Vec<f64>,
    pub bins_unit: String,
    #[serde(with = "nullable_floats")]
    pub corr: Vec<f64>,
    #[serde(with = "nullable_floats")]
    pub corr_err: Vec<f64>,
    pub corr_unit: String,
    #[serde(with = "nullable_floats")]
    pub cesaro: Vec<f64>,
    #[serde(with = "nullable_floats")]
    pub cesaro_err: Vec<f64>,
    pub cesaro_unit: String,
    pub pair_count: Vec<f64>,
    #[serde(with = "nullable_floats")]
    pub pair_count_err: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FitRecord {
    pub ranges: Vec<FitRange>,
    pub ranges_unit: String,
    pub transport: TransportRecord,
    pub total: TransportRecord,
}

/// On-disk form of the running aggregate, in the
/// `(mean, standard error, n)` encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRecord {
    pub version: String,
    pub kind: String,
    pub num_sample: u64,
    pub num_mol: Vec<u64>,
    pub charge: Vec<i64>,
    pub charge_unit: String,
    pub volume: f64,
    #[serde(with = "nullable_float")]
    pub volume_err: f64,
    pub volume_unit: String,
    pub temperature: f64,
    #[serde(with = "nullable_float")]
    pub temperature_err: f64,
    pub temperature_unit: String,
    pub time_lags: Vec<f64>,
    pub time_lags_unit: String,
    pub corr: Vec<f64>,
    #[serde(with = "nullable_floats")]
    pub corr_err: Vec<f64>,
    pub corr_unit: String,
    pub cesaro: Vec<f64>,
    #[serde(with = "nullable_floats")]
    pub cesaro_err: Vec<f64>,
    pub cesaro_unit: String,
    pub total_cesaro: Vec<f64>,
    #[serde(with = "nullable_floats")]
    pub total_cesaro_err: Vec<f64>,
    pub total_cesaro_unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial_dec: Option<DecAggregateRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_dec: Option<DecAggregateRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit: Option<FitRecord>,
}

pub fn load_sample(path: &Path) -> DecondResult<CorrSample> {
    let record: CorrRecord = read_record(path)?;
    check_version(&record.version, path)?;
    check_kind(&record.kind, CORR_KIND, path)?;
    let sample = sample_from_record(record);
    sample.validate()?;
    Ok(sample)
}

pub fn save_sample(path: &Path, sample: &CorrSample) -> Result<(), StoreError> {
    write_record(path, &record_from_sample(sample))
}

pub fn load_aggregate(path: &Path) -> DecondResult<Aggregate> {
    let record: AggregateRecord = read_record(path)?;
    check_version(&record.version, path)?;
    check_kind(&record.kind, AGGREGATE_KIND, path)?;
    Ok(aggregate_from_record(record))
}

pub fn save_aggregate(path: &Path, aggregate: &Aggregate) -> Result<(), StoreError> {
    write_record(path, &record_from_aggregate(aggregate))
}

fn read_record<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let content = fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| StoreError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn write_record<T: Serialize>(path: &Path, record: &T) -> Result<(), StoreError> {
    let rendered = serde_json::to_string_pretty(record).map_err(|source| StoreError::Serialize {
        path: path.display().to_string(),
        source,
    })?;
    fs::write(path, rendered).map_err(|source| StoreError::Write {
        path: path.display().to_string(),
        source,
    })
}

fn check_version(version: &str, path: &Path) -> Result<(), StoreError> {
    let major = version
        .split('.')
        .next()
        .and_then(|major| major.parse::<u64>().ok())
        .ok_or_else(|| StoreError::MalformedVersion {
            path: path.display().to_string(),
            found: version.to_string(),
        })?;
    if major < REQUIRED_MAJOR {
        return Err(StoreError::UnsupportedVersion {
            path: path.display().to_string(),
            found: version.to_string(),
            required: REQUIRED_MAJOR,
        });
    }
    Ok(())
}

fn check_kind(found: &str, expected: &str, path: &Path) -> Result<(), StoreError> {
    if found != expected {
        return Err(StoreError::UnsupportedKind {
            path: path.display().to_string(),
            expected: expected.to_string(),
            found: found.to_string(),
        });
    }
    Ok(())
}

fn sample_from_record(record: CorrRecord) -> CorrSample {
    CorrSample {
        num_mol: record.num_mol,
        charge: record.charge,
        charge_unit: record.charge_unit,
        volume: record.volume,
        volume_unit: record.volume_unit,
        temperature: record.temperature,
        temperature_unit: record.temperature_unit,
        time_lags: record.time_lags,
        time_lags_unit: record.time_lags_unit,
        corr: record.corr,
        corr_unit: record.corr_unit,
        spatial: record.spatial_dec.map(dec_sample_from_record),
        energy: record.energy_dec.map(dec_sample_from_record),
    }
}

fn dec_sample_from_record(record: DecRecord) -> DecSample {
    DecSample {
        bins: record.bins,
        bins_unit: record.bins_unit,
        corr: record.corr,
        corr_unit: record.corr_unit,
        pair_count: record.pair_count,
    }
}

fn record_from_sample(sample: &CorrSample) -> CorrRecord {
    CorrRecord {
        version: FORMAT_VERSION.to_string(),
        kind: CORR_KIND.to_string(),
        num_mol: sample.num_mol.clone(),
        charge: sample.charge.clone(),
        charge_unit: sample.charge_unit.clone(),
        volume: sample.volume,
        volume_unit: sample.volume_unit.clone(),
        temperature: sample.temperature,
        temperature_unit: sample.temperature_unit.clone(),
        time_lags: sample.time_lags.clone(),
        time_lags_unit: sample.time_lags_unit.clone(),
        corr: sample.corr.clone(),
        corr_unit: sample.corr_unit.clone(),
        spatial_dec: sample.spatial.as_ref().map(record_from_dec_sample),
        energy_dec: sample.energy.as_ref().map(record_from_dec_sample),
    }
}

fn record_from_dec_sample(dec: &DecSample) -> DecRecord {
    DecRecord {
        bins: dec.bins.clone(),
        bins_unit: dec.bins_unit.clone(),
        corr: dec.corr.clone(),
        corr_unit: dec.corr_unit.clone(),
        pair_count: dec.pair_count.clone(),
    }
}

fn record_from_aggregate(aggregate: &Aggregate) -> AggregateRecord {
    let count = aggregate.sample_count;
    let lag_count = aggregate.time_lags.len();
    AggregateRecord {
        version: FORMAT_VERSION.to_string(),
        kind: AGGREGATE_KIND.to_string(),
        num_sample: count,
        num_mol: aggregate.num_mol.clone(),
        charge: aggregate.charge.clone(),
        charge_unit: aggregate.charge_unit.clone(),
        volume: aggregate.volume.mean,
        volume_err: aggregate.volume.err(count),
        volume_unit: aggregate.volume_unit.clone(),
        temperature: aggregate.temperature.mean,
        temperature_err: aggregate.temperature.err(count),
        temperature_unit: aggregate.temperature_unit.clone(),
        time_lags: aggregate.time_lags.clone(),
        time_lags_unit: aggregate.time_lags_unit.clone(),
        corr: aggregate.corr.mean.clone(),
        corr_err: aggregate.corr.err(count),
        corr_unit: aggregate.corr_unit.clone(),
        cesaro: aggregate.cesaro.mean.clone(),
        cesaro_err: aggregate.cesaro.err(count),
        cesaro_unit: aggregate.cesaro_unit.clone(),
        total_cesaro: aggregate.total_cesaro.mean.clone(),
        total_cesaro_err: aggregate.total_cesaro.err(count),
        total_cesaro_unit: aggregate.total_cesaro_unit.clone(),
        spatial_dec: aggregate
            .dec(DecType::Spatial)
            .map(|dec| record_from_dec_aggregate(dec, count, lag_count)),
        energy_dec: aggregate
            .dec(DecType::Energy)
            .map(|dec| record_from_dec_aggregate(dec, count, lag_count)),
        fit: fit_record_from_aggregate(aggregate),
    }
}

fn record_from_dec_aggregate(
    dec: &DecAggregate,
    count: u64,
    lag_count: usize,
) -> DecAggregateRecord {
    DecAggregateRecord {
        bins: dec.bins.clone(),
        bins_unit: dec.bins_unit.clone(),
        corr: dec.corr.mean.clone(),
        corr_err: dec.corr.err_weighted(count, &dec.pair_count.mean, lag_count),
        corr_unit: dec.corr_unit.clone(),
        cesaro: dec.cesaro.mean.clone(),
        cesaro_err: dec
            .cesaro
            .err_weighted(count, &dec.pair_count.mean, lag_count),
        cesaro_unit: dec.cesaro_unit.clone(),
        pair_count: dec.pair_count.mean.clone(),
        pair_count_err: dec.pair_count.err(count),
        transport: dec.transport.as_ref().map(transport_record),
    }
}

fn fit_record_from_aggregate(aggregate: &Aggregate) -> Option<FitRecord> {
    let ranges = aggregate.fit_ranges.clone()?;
    let transport = aggregate.transport.as_ref()?;
    Some(FitRecord {
        ranges,
        ranges_unit: aggregate.time_lags_unit.clone(),
        transport: transport_record(&transport.per_component),
        total: transport_record(&transport.total),
    })
}

fn transport_record(estimate: &TransportEstimate) -> TransportRecord {
    TransportRecord {
        value: estimate.value.clone(),
        value_err: estimate.err.clone(),
        unit: estimate.unit.clone(),
    }
}

fn aggregate_from_record(record: AggregateRecord) -> Aggregate {
    let count = record.num_sample;
    let lag_count = record.time_lags.len();
    let transport = record.fit.as_ref().map(|fit| TransportFit {
        per_component: estimate_from_record(&fit.transport),
        total: estimate_from_record(&fit.total),
    });
    Aggregate {
        sample_count: count,
        num_mol: record.num_mol,
        charge: record.charge,
        charge_unit: record.charge_unit,
        volume: ScalarMoments {
            mean: record.volume,
            m2: err_to_m2_scalar(record.volume_err, count),
        },
        volume_unit: record.volume_unit,
        temperature: ScalarMoments {
            mean: record.temperature,
            m2: err_to_m2_scalar(record.temperature_err, count),
        },
        temperature_unit: record.temperature_unit,
        time_lags: record.time_lags,
        time_lags_unit: record.time_lags_unit,
        corr: ArrayMoments {
            m2: err_to_m2(&record.corr_err, count),
            mean: record.corr,
        },
        corr_unit: record.corr_unit,
        cesaro: ArrayMoments {
            m2: err_to_m2(&record.cesaro_err, count),
            mean: record.cesaro,
        },
        cesaro_unit: record.cesaro_unit,
        total_cesaro: ArrayMoments {
            m2: err_to_m2(&record.total_cesaro_err, count),
            mean: record.total_cesaro,
        },
        total_cesaro_unit: record.total_cesaro_unit,
        spatial: record
            .spatial_dec
            .map(|dec| dec_aggregate_from_record(dec, count, lag_count)),
        energy: record
            .energy_dec
            .map(|dec| dec_aggregate_from_record(dec, count, lag_count)),
        fit_ranges: record.fit.as_ref().map(|fit| fit.ranges.clone()),
        transport,
    }
}

fn dec_aggregate_from_record(
    record: DecAggregateRecord,
    count: u64,
    lag_count: usize,
) -> DecAggregate {
    DecAggregate {
        bins: record.bins,
        bins_unit: record.bins_unit,
        corr: ArrayMoments {
            m2: err_to_m2_weighted(&record.corr_err, count, &record.pair_count, lag_count),
            mean: record.corr,
        },
        corr_unit: record.corr_unit,
        cesaro: ArrayMoments {
            m2: err_to_m2_weighted(&record.cesaro_err, count, &record.pair_count, lag_count),
            mean: record.cesaro,
        },
        cesaro_unit: record.cesaro_unit,
        pair_count: ArrayMoments {
            m2: err_to_m2(&record.pair_count_err, count),
            mean: record.pair_count,
        },
        transport: record.transport.as_ref().map(estimate_from_record),
    }
}

fn estimate_from_record(record: &TransportRecord) -> TransportEstimate {
    TransportEstimate {
        value: record.value.clone(),
        err: record.value_err.clone(),
        unit: record.unit.clone(),
    }
}

/// Non-finite floats have no JSON literal; persist them as nulls.
mod nullable_float {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_some(value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        let value = Option::<f64>::deserialize(deserializer)?;
        Ok(value.unwrap_or(f64::NAN))
    }
}

mod nullable_floats {
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        let mut sequence = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            if value.is_finite() {
                sequence.serialize_element(value)?;
            } else {
                sequence.serialize_element(&Option::<f64>::None)?;
            }
        }
        sequence.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let values = Vec::<Option<f64>>::deserialize(deserializer)?;
        Ok(values
            .into_iter()
            .map(|value| value.unwrap_or(f64::NAN))
            .collect())
    }
}
