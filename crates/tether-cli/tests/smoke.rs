//! Smoke tests for the `tether` binary.
//!
//! Everything runs against temp directories with a detached runtime, so no
//! .NET install is needed.

use std::fs;
use std::path::Path;
use std::process::Command;

fn tether(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_tether"));
    // Keep ~/.tether/config.toml out of the picture.
    cmd.env("HOME", home).env_remove("TETHER_LOG");
    cmd
}

fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    fs::write(&path, body).unwrap();
    path
}

// ── Help / basic CLI ──────────────────────────────────────────────────────────

#[test]
fn binary_responds_to_help() {
    let home = tempfile::tempdir().unwrap();
    let output = tether(home.path()).arg("--help").output().expect("failed to execute tether");
    assert!(output.status.success(), "tether --help should exit 0");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("inspect"));
    assert!(stdout.contains("host-check"));
    assert!(stdout.contains("watch"));
}

// ── inspect ───────────────────────────────────────────────────────────────────

#[test]
fn inspect_lists_types_and_pending_classes() {
    let home = tempfile::tempdir().unwrap();
    let modules = tempfile::tempdir().unwrap();
    fs::write(
        modules.path().join("Gameplay.metadata.json"),
        r#"{
            "ClassMetaData": [ { "Name": "Hero", "ParentClass": { "Name": "Character" } } ],
            "EnumMetaData": [ { "Name": "Team", "Items": [ "Red", "Blue" ] } ]
        }"#,
    )
    .unwrap();

    let output = tether(home.path())
        .arg("inspect")
        .arg("--dir")
        .arg(modules.path())
        .output()
        .expect("failed to execute tether inspect");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("modules: Gameplay"));
    assert!(stdout.contains("Team"));
    assert!(stdout.contains("Hero waits on Character"));
}

#[test]
fn inspect_json_is_machine_readable() {
    let home = tempfile::tempdir().unwrap();
    let modules = tempfile::tempdir().unwrap();
    fs::write(
        modules.path().join("Core.metadata.json"),
        r#"{ "StructMetaData": [ { "Name": "Stats" } ], "ClassMetaData": [ { "Name": "Actor" } ] }"#,
    )
    .unwrap();

    let output = tether(home.path())
        .args(["inspect", "--json", "--dir"])
        .arg(modules.path())
        .output()
        .expect("failed to execute tether inspect --json");
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["modules"], serde_json::json!(["Core"]));
    let names: Vec<&str> = report["types"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Actor", "Stats"]);
    assert!(report["pending"].as_array().unwrap().is_empty());
}

// ── host-check ────────────────────────────────────────────────────────────────

#[test]
fn host_check_reports_missing_runtime() {
    let home = tempfile::tempdir().unwrap();
    let dotnet = tempfile::tempdir().unwrap();
    let config = write_config(
        home.path(),
        &format!("[host]\ndotnet_root = {:?}\n", dotnet.path().display().to_string()),
    );

    let output = tether(home.path())
        .arg("--config")
        .arg(&config)
        .arg("host-check")
        .output()
        .expect("failed to execute tether host-check");
    assert!(!output.status.success(), "host-check must fail without hostfxr");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("hostfxr not found"), "stderr: {stderr}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("dotnet root"));
}

// ── watch ─────────────────────────────────────────────────────────────────────

#[test]
fn watch_exits_when_hot_reload_is_off() {
    let home = tempfile::tempdir().unwrap();
    let modules = tempfile::tempdir().unwrap();
    let config = write_config(home.path(), "[hot_reload]\nmethod = \"off\"\n");

    let output = tether(home.path())
        .arg("--config")
        .arg(&config)
        .args(["watch", "--detached", "--dir"])
        .arg(modules.path())
        .output()
        .expect("failed to execute tether watch");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
}
