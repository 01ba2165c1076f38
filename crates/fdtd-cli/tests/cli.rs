//! CLI command integration tests.
//! Each test uses a temp directory via FDTD_DATA_DIR for full isolation.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use fdtd_core::testing::RecordingEngine;
use fdtd_core::{Footprint, Simulation, StructureId};
use fdtd_store::{DataLayout, SimulationCache};

fn fdtd_cmd(data_dir: &TempDir) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("fdtd").unwrap();
    cmd.env("FDTD_DATA_DIR", data_dir.path());
    cmd
}

/// Run and cache one simulation per polarization angle, returning the
/// fingerprints in insertion order.
fn seed(dir: &TempDir, polarizations: &[f32]) -> Vec<String> {
    let layout = DataLayout::open(Some(dir.path()), None).unwrap();
    let cache = SimulationCache::open(&layout).unwrap();
    polarizations
        .iter()
        .map(|&angle| {
            let mut sim =
                Simulation::with_default_layout(RecordingEngine::new(), format!("pol-{angle}"))
                    .unwrap();
            sim.add_structure(
                StructureId::new(1).unwrap(),
                Footprint::Rectangle {
                    x_span: 120.0,
                    y_span: 80.0,
                },
                40.0,
                "Au (Gold) - Palik",
            )
            .unwrap();
            sim.set_polarization_angle(angle, true).unwrap();
            cache.run_and_save(&mut sim).unwrap();
            sim.fingerprint().unwrap().to_string()
        })
        .collect()
}

#[test]
fn stats_fresh_db() {
    let dir = TempDir::new().unwrap();
    fdtd_cmd(&dir)
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("database:   results"))
        .stdout(predicate::str::contains("records:    0"))
        .stdout(predicate::str::contains("last_id:    -"));
}

#[test]
fn stats_after_runs() {
    let dir = TempDir::new().unwrap();
    seed(&dir, &[0.0, 90.0]);
    fdtd_cmd(&dir)
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("records:    2"))
        .stdout(predicate::str::contains("last_id:    2"));
}

#[test]
fn database_flag_selects_file() {
    let dir = TempDir::new().unwrap();
    seed(&dir, &[0.0]);
    fdtd_cmd(&dir)
        .args(["stats", "--database", "other"])
        .assert()
        .success()
        .stdout(predicate::str::contains("database:   other"))
        .stdout(predicate::str::contains("records:    0"));
    assert!(dir.path().join("other.db").exists());
}

#[test]
fn list_and_filter() {
    let dir = TempDir::new().unwrap();
    seed(&dir, &[0.0, 90.0]);

    fdtd_cmd(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("pol-0"))
        .stdout(predicate::str::contains("pol-90"));

    fdtd_cmd(&dir)
        .args(["list", "--ids-only", "--filter", "polarization_angle=90"])
        .assert()
        .success()
        .stdout("2\n");

    fdtd_cmd(&dir)
        .args(["list", "--filter", "polarization_angle>180"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(no records)"));
}

#[test]
fn list_rejects_unknown_column() {
    let dir = TempDir::new().unwrap();
    fdtd_cmd(&dir)
        .args(["list", "--filter", "lambdas=3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("bad filter"));
}

#[test]
fn show_text_and_json() {
    let dir = TempDir::new().unwrap();
    let fingerprints = seed(&dir, &[0.0]);

    fdtd_cmd(&dir)
        .args(["show", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains(fingerprints[0].as_str()))
        .stdout(predicate::str::contains("structure 1:  Au (Gold) - Palik"));

    let output = fdtd_cmd(&dir).args(["show", "1", "--json"]).output().unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["id"], 1);
    assert_eq!(value["name"], "pol-0");
    assert_eq!(value["fingerprint"], fingerprints[0].as_str());
    assert!(value["monitors"]["ref_power_monitor"]["resonance"].is_object());
}

#[test]
fn show_missing_record_fails() {
    let dir = TempDir::new().unwrap();
    fdtd_cmd(&dir)
        .args(["show", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no record with id 42"));
}

#[test]
fn delete_then_stats() {
    let dir = TempDir::new().unwrap();
    seed(&dir, &[0.0, 90.0]);

    fdtd_cmd(&dir)
        .args(["delete", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("deleted 1"));
    fdtd_cmd(&dir)
        .args(["delete", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no record with id 1"));
    fdtd_cmd(&dir)
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("records:    1"));
}

#[test]
fn fingerprint_of_parameter_file() {
    let dir = TempDir::new().unwrap();
    let params = dir.path().join("params.toml");
    std::fs::write(&params, "polarization_angle = 45.0\n").unwrap();

    let output = fdtd_cmd(&dir)
        .arg("fingerprint")
        .arg(&params)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut lines = stdout.lines();
    let fingerprint = lines.next().unwrap();
    assert_eq!(fingerprint.len(), 64);
    assert!(fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(lines.next(), Some("not cached"));
}

#[test]
fn fingerprint_bad_file_fails() {
    let dir = TempDir::new().unwrap();
    let params = dir.path().join("params.toml");
    std::fs::write(&params, "polarization_angle = \"sideways\"\n").unwrap();
    fdtd_cmd(&dir)
        .arg("fingerprint")
        .arg(&params)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse"));
}

#[test]
fn export_writes_json() {
    let dir = TempDir::new().unwrap();
    seed(&dir, &[0.0]);
    let path = dir.path().join("record.json");

    fdtd_cmd(&dir)
        .arg("export")
        .arg("1")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("exported to"));

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(
        value["active_monitors"],
        "ref_power_monitor,ref_profile_monitor,trans_power_monitor,trans_profile_monitor"
    );
}

#[test]
fn index_whitelisted_columns() {
    let dir = TempDir::new().unwrap();
    fdtd_cmd(&dir)
        .args(["index", "polarization_angle"])
        .assert()
        .success()
        .stdout(predicate::str::contains("idx_results_polarization_angle"));
    fdtd_cmd(&dir)
        .args(["index", "lambdas"])
        .assert()
        .failure();
}

#[test]
fn missing_required_args() {
    let dir = TempDir::new().unwrap();
    fdtd_cmd(&dir).arg("show").assert().failure();
    fdtd_cmd(&dir).args(["export", "1"]).assert().failure();
    fdtd_cmd(&dir).arg("index").assert().failure();
}
