use decond_core::analysis::sample::CorrSample;
use decond_core::store::save_sample;
use serde_json::Value;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn sample(shift: f64, volume: f64) -> CorrSample {
    let time_lags = vec![0.0, 1.0, 2.0, 3.0];
    let base = [1.0, 2.0, 0.5, -0.25, 0.75];
    let corr: Vec<f64> = base
        .iter()
        .flat_map(|value| std::iter::repeat_n(value + shift, time_lags.len()))
        .collect();
    CorrSample {
        num_mol: vec![4, 4],
        charge: vec![1, -1],
        charge_unit: "e".to_string(),
        volume,
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

fn write_samples(dir: &Path) -> Vec<String> {
    let shifts = [0.0, 0.3, -0.3];
    shifts
        .iter()
        .enumerate()
        .map(|(index, shift)| {
            let path = dir.join(format!("sample-{index}.json"));
            save_sample(&path, &sample(*shift, 30.0 + index as f64))
                .expect("sample should be writable");
            path.display().to_string()
        })
        .collect()
}

fn binary() -> Command {
    Command::new(env!("CARGO_BIN_EXE_decond-rs"))
}

#[test]
fn new_then_report_produces_transport_coefficients() {
    let temp = TempDir::new().expect("tempdir should be created");
    let samples = write_samples(temp.path());
    let aggregate_path = temp.path().join("aggregate.json");

    let output = binary()
        .arg("new")
        .arg("-o")
        .arg(&aggregate_path)
        .arg("--fit")
        .arg("1:3")
        .args(&samples)
        .output()
        .expect("binary should run");
    assert!(
        output.status.success(),
        "new failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(aggregate_path.exists());

    let output = binary()
        .arg("report")
        .arg(&aggregate_path)
        .arg("--native-units")
        .output()
        .expect("binary should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("samples merged: 3"), "stdout: {stdout}");
    assert!(stdout.contains("D[0]"));
    assert!(stdout.contains("D[1]"));
    assert!(stdout.contains("sigma"));
    assert!(stdout.contains("nm$^2$ ps$^{-1}$"));
}

#[test]
fn json_report_is_machine_readable() {
    let temp = TempDir::new().expect("tempdir should be created");
    let samples = write_samples(temp.path());
    let aggregate_path = temp.path().join("aggregate.json");

    let status = binary()
        .arg("new")
        .arg("-o")
        .arg(&aggregate_path)
        .arg("--fit")
        .arg("1:3")
        .args(&samples)
        .status()
        .expect("binary should run");
    assert!(status.success());

    let output = binary()
        .arg("report")
        .arg(&aggregate_path)
        .arg("--json")
        .output()
        .expect("binary should run");
    assert!(output.status.success());
    let report: Value =
        serde_json::from_slice(&output.stdout).expect("report should be valid JSON");
    assert_eq!(report["numSample"], 3);
    assert_eq!(report["ranges"].as_array().expect("ranges").len(), 1);
    assert_eq!(report["ranges"][0]["begin"], 1.0);
    assert!(report["ranges"][0]["diffusion"][0]["value"].is_number());
}

#[test]
fn extend_resumes_a_persisted_aggregate() {
    let temp = TempDir::new().expect("tempdir should be created");
    let samples = write_samples(temp.path());
    let aggregate_path = temp.path().join("aggregate.json");
    let extended_path = temp.path().join("extended.json");

    let status = binary()
        .arg("new")
        .arg("-o")
        .arg(&aggregate_path)
        .arg("--fit")
        .arg("1:3")
        .args(&samples)
        .status()
        .expect("binary should run");
    assert!(status.success());

    let extra = temp.path().join("sample-extra.json");
    save_sample(&extra, &sample(0.15, 35.0)).expect("sample should be writable");
    let status = binary()
        .arg("extend")
        .arg("--aggregate")
        .arg(&aggregate_path)
        .arg("-o")
        .arg(&extended_path)
        .arg(&extra)
        .status()
        .expect("binary should run");
    assert!(status.success());

    let output = binary()
        .arg("report")
        .arg(&extended_path)
        .output()
        .expect("binary should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("samples merged: 4"), "stdout: {stdout}");
}

#[test]
fn reporting_a_sample_record_fails_with_a_kind_error() {
    let temp = TempDir::new().expect("tempdir should be created");
    let sample_path = temp.path().join("sample.json");
    save_sample(&sample_path, &sample(0.0, 30.0)).expect("sample should be writable");

    let output = binary()
        .arg("report")
        .arg(&sample_path)
        .output()
        .expect("binary should run");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("averaged-aggregate"), "stderr: {stderr}");
    assert!(stderr.contains("correlation-sample"));
}

#[test]
fn refit_overwrites_the_stored_ranges() {
    let temp = TempDir::new().expect("tempdir should be created");
    let samples = write_samples(temp.path());
    let aggregate_path = temp.path().join("aggregate.json");
    let refitted_path = temp.path().join("refitted.json");

    let status = binary()
        .arg("new")
        .arg("-o")
        .arg(&aggregate_path)
        .arg("--fit")
        .arg("1:3")
        .args(&samples)
        .status()
        .expect("binary should run");
    assert!(status.success());

    let status = binary()
        .arg("fit")
        .arg("--aggregate")
        .arg(&aggregate_path)
        .arg("-o")
        .arg(&refitted_path)
        .arg("--fit")
        .arg("0:2")
        .status()
        .expect("binary should run");
    assert!(status.success());

    let output = binary()
        .arg("report")
        .arg(&refitted_path)
        .arg("--json")
        .output()
        .expect("binary should run");
    assert!(output.status.success());
    let report: Value =
        serde_json::from_slice(&output.stdout).expect("report should be valid JSON");
    assert_eq!(report["ranges"][0]["begin"], 0.0);
    assert_eq!(report["ranges"][0]["end"], 2.0);
}
