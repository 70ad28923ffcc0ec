use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;

fn scenario(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../scenarios")
        .join(name)
}

fn msim() -> Command {
    Command::cargo_bin("msim").expect("msim bin")
}

#[test]
fn tle_prints_two_checksummed_lines() {
    let output = msim()
        .args([
            "tle",
            "--altitude-km",
            "500",
            "--inclination-deg",
            "97.4",
            "--epoch",
            "2025-01-01T00:00:00Z",
        ])
        .output()
        .expect("run msim tle");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|line| line.len() == 69));
    assert!(lines[0].starts_with("1 99999U"));
    assert!(lines[1].starts_with("2 99999"));
}

#[test]
fn check_accepts_bundled_scenarios() {
    for name in ["orbit_lowering.yaml", "imaging_day.yaml", "safe_mode_recovery.toml"] {
        msim()
            .args(["check"])
            .arg(scenario(name))
            .assert()
            .success()
            .stdout(predicate::str::contains("Scenario OK"));
    }
}

#[test]
fn run_writes_output_bundle() {
    let dir = tempfile::tempdir().expect("tempdir");
    msim()
        .arg("run")
        .arg(scenario("orbit_lowering.yaml"))
        .arg("--output-dir")
        .arg(dir.path())
        .args(["--fidelity", "low"])
        .assert()
        .success()
        .stdout(predicate::str::contains("=== Simulation Summary ==="))
        .stdout(predicate::str::contains("lower-1"));

    for file in [
        "run_manifest.json",
        "summary.json",
        "events.json",
        "ephemeris.csv",
        "profile.csv",
        "access_windows.json",
        "eclipse_windows.json",
    ] {
        assert!(dir.path().join(file).exists(), "missing {file}");
    }
}

#[test]
fn run_json_is_stable_across_invocations() {
    let run = || {
        msim()
            .arg("run")
            .arg(scenario("safe_mode_recovery.toml"))
            .args(["--json", "--seed", "11"])
            .output()
            .expect("run msim")
    };
    let first = run();
    let second = run();
    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout);
    let text = String::from_utf8(first.stdout).expect("utf8");
    assert!(text.contains("\"state_changes\""));
}

#[test]
fn missing_scenario_fails_with_context() {
    msim()
        .arg("run")
        .arg(scenario("does_not_exist.yaml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("loading scenario"));
}

#[test]
fn verbose_run_logs_to_stderr() {
    msim()
        .args(["-v", "run"])
        .arg(scenario("safe_mode_recovery.toml"))
        .env_remove("RUST_LOG")
        .assert()
        .success()
        .stdout(predicate::str::contains("=== Simulation Summary ==="))
        .stderr(predicate::str::contains("starting run"));
}
