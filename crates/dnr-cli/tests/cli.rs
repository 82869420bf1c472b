use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

/// Five-bus switchable chain fed from bus 1 with a 1.5 MW DG at bus 5.
fn write_network(dir: &Path) -> PathBuf {
    let net = dir.join("network");
    fs::create_dir_all(&net).unwrap();
    fs::write(
        net.join("buses.csv"),
        "bus_id,name,domain,load_mw,load_weight,gen_min_mw,gen_max_mw\n\
         1,substation,ac,0,1,0,10\n\
         2,b2,ac,1.0,1,0,0\n\
         3,b3,ac,0.5,1,0,0\n\
         4,b4,ac,0.5,1,0,0\n\
         5,b5,ac,0.4,1,0,0\n",
    )
    .unwrap();
    fs::write(
        net.join("branches.csv"),
        "branch_id,from_bus,to_bus,kind,resistance,reactance,capacity_mw,switchable,normally_open,efficiency\n\
         1,1,2,line,0.01,0.02,5,1,0,1\n\
         2,2,3,line,0.01,0.02,5,1,0,1\n\
         3,3,4,line,0.01,0.02,5,1,0,1\n\
         4,4,5,line,0.01,0.02,5,1,0,1\n",
    )
    .unwrap();
    fs::write(
        net.join("resources.csv"),
        "resource_id,kind,bus_id,p_min_mw,p_max_mw\n1,dg,5,0,1.5\n",
    )
    .unwrap();
    net
}

fn write_scenarios(dir: &Path, branch: usize) -> PathBuf {
    let path = dir.join("scenarios.yaml");
    fs::write(
        &path,
        format!(
            "scenarios:\n  - scenario_id: s1\n    weight: 0.6\n    horizon: 8\n    events:\n      - {{ component: branch, id: {branch}, fail_step: 3, repair_step: 5 }}\n  - scenario_id: quiet\n    weight: 0.4\n    horizon: 4\n"
        ),
    )
    .unwrap();
    path
}

fn dnr() -> Command {
    Command::cargo_bin("dnr").unwrap()
}

#[test]
fn run_writes_tables_and_manifests() {
    let dir = tempdir().unwrap();
    let net = write_network(dir.path());
    let scenarios = write_scenarios(dir.path(), 2);
    let out = dir.path().join("out");

    dnr()
        .args(["run", "--network"])
        .arg(&net)
        .arg("--scenarios")
        .arg(&scenarios)
        .arg("--out")
        .arg(&out)
        .args(["--format", "csv", "--threads", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("s1"))
        .stdout(predicate::str::contains("OK"))
        .stdout(predicate::str::contains("Expected unserved energy"));

    for table in [
        "phase_classification.csv",
        "reconfiguration_results.csv",
        "reconfiguration_status.csv",
        "dispatch_results.csv",
        "scenario_summary.csv",
        "batch_manifest.json",
    ] {
        assert!(out.join(table).exists(), "{table} missing");
    }
    let run_manifests: Vec<_> = fs::read_dir(&out)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("run-"))
        .collect();
    assert_eq!(run_manifests.len(), 1);
    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(run_manifests[0].path()).unwrap()).unwrap();
    assert_eq!(manifest["status"], "success");
    assert_eq!(manifest["command"], "run");
    assert!(manifest["inputs"][0]["sha256"].as_str().unwrap().len() == 64);

    let batch: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("batch_manifest.json")).unwrap()).unwrap();
    assert_eq!(batch["counts"]["ok"], 2);
    assert_eq!(batch["num_scenarios"], 2);
}

#[test]
fn classify_only_writes_phase_rows() {
    let dir = tempdir().unwrap();
    let net = write_network(dir.path());
    let scenarios = write_scenarios(dir.path(), 2);
    let out = dir.path().join("out");

    dnr()
        .arg("classify")
        .arg("--network")
        .arg(&net)
        .arg("--scenarios")
        .arg(&scenarios)
        .arg("-o")
        .arg(&out)
        .args(["--format", "csv"])
        .assert()
        .success();

    let phases = fs::read_to_string(out.join("phase_classification.csv")).unwrap();
    assert!(phases.contains("FAULT_PROPAGATION"));
    let batch: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("batch_manifest.json")).unwrap()).unwrap();
    assert_eq!(batch["stages"], "classify");
}

#[test]
fn unknown_component_is_malformed_input() {
    let dir = tempdir().unwrap();
    let net = write_network(dir.path());
    let scenarios = write_scenarios(dir.path(), 42);
    let out = dir.path().join("out");

    dnr()
        .arg("run")
        .arg("--network")
        .arg(&net)
        .arg("--scenarios")
        .arg(&scenarios)
        .arg("--out")
        .arg(&out)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("malformed input"));
    assert!(!out.join("batch_manifest.json").exists());
}

#[test]
fn unknown_solver_is_backend_unavailable() {
    let dir = tempdir().unwrap();
    let net = write_network(dir.path());
    let scenarios = write_scenarios(dir.path(), 2);

    dnr()
        .arg("run")
        .arg("--network")
        .arg(&net)
        .arg("--scenarios")
        .arg(&scenarios)
        .arg("--out")
        .arg(dir.path().join("out"))
        .args(["--solver", "cplex"])
        .assert()
        .code(3);
}

#[test]
fn status_lists_artifacts() {
    let dir = tempdir().unwrap();
    let net = write_network(dir.path());
    let scenarios = write_scenarios(dir.path(), 2);
    let out = dir.path().join("out");

    dnr()
        .arg("reconfigure")
        .arg("--network")
        .arg(&net)
        .arg("--scenarios")
        .arg(&scenarios)
        .arg("--out")
        .arg(&out)
        .assert()
        .success();

    dnr()
        .arg("status")
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("scenario_summary"))
        .stdout(predicate::str::contains("Last batch: 2 scenarios"))
        .stdout(predicate::str::contains("missing").not());
}

#[test]
fn status_json_reports_missing_artifacts() {
    let dir = tempdir().unwrap();
    dnr()
        .args(["status", "--json", "--out"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"present\": false"));
}

#[test]
fn solvers_lists_microlp() {
    dnr()
        .args(["solvers", "--probe"])
        .assert()
        .success()
        .stdout(predicate::str::contains("microlp"))
        .stdout(predicate::str::contains("ok"));
}

#[test]
fn validate_prints_network_summary() {
    let dir = tempdir().unwrap();
    let net = write_network(dir.path());
    let scenarios = write_scenarios(dir.path(), 2);

    dnr()
        .arg("validate")
        .arg("--network")
        .arg(&net)
        .arg("--scenarios")
        .arg(&scenarios)
        .assert()
        .success()
        .stdout(predicate::str::contains("Network: 5 buses"))
        .stdout(predicate::str::contains("Scenarios: 2"))
        .stdout(predicate::str::contains("0 error(s)"));
}
