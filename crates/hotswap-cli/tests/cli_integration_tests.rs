//! Integration tests for the `hotswap` binary.

#![cfg(test)]
#![allow(deprecated)]

use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use std::fs;
use tempfile::tempdir;

fn hotswap() -> Command {
    let mut cmd = Command::cargo_bin("hotswap").expect("hotswap bin");
    cmd.env_remove("HOTSWAP_CONFIG")
        .env_remove("HOTSWAP__DIRECTORY")
        .env_remove("HOTSWAP__EXTENSION");
    cmd
}

fn scan_json(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("valid json output")
}

#[test]
fn scan_missing_directory_succeeds() {
    let root = tempdir().expect("tempdir");

    hotswap()
        .arg("scan")
        .arg(root.path().join("absent"))
        .assert()
        .success()
        .stdout(contains("Plugins directory does not exist"))
        .stdout(contains("No modules found."));
}

#[test]
fn scan_reports_corrupt_module_as_failed() {
    let root = tempdir().expect("tempdir");
    let module = root
        .path()
        .join(format!("corrupt.{}", std::env::consts::DLL_EXTENSION));
    fs::write(&module, b"this is not a shared library").expect("write module");
    fs::write(root.path().join("notes.txt"), b"ignored").expect("write notes");

    let value = scan_json(hotswap().arg("scan").arg(root.path()).arg("--json"));

    let modules = value["modules"].as_array().expect("modules array");
    assert_eq!(modules.len(), 1);
    assert_eq!(modules[0]["status"], "failed");
    assert_eq!(modules[0]["plugins"], 0);
    assert!(modules[0]["reason"].as_str().is_some());
    assert!(modules[0]["digest"].as_str().is_some_and(|d| d.len() == 64));
    assert!(value["plugins"].as_array().expect("plugins array").is_empty());
}

#[test]
fn scan_table_lists_modules() {
    let root = tempdir().expect("tempdir");
    let name = format!("broken.{}", std::env::consts::DLL_EXTENSION);
    fs::write(root.path().join(&name), b"garbage").expect("write module");

    hotswap()
        .arg("scan")
        .arg(root.path())
        .assert()
        .success()
        .stdout(contains("Found module:"))
        .stdout(contains("Module failed to load:"))
        .stdout(contains(name));
}

#[test]
fn scan_reads_config_file_and_env_overrides() {
    let root = tempdir().expect("tempdir");
    let plugins = root.path().join("mods");
    fs::create_dir(&plugins).expect("mods dir");
    fs::write(plugins.join("one.plugin"), b"garbage").expect("write module");
    fs::write(
        plugins.join(format!("two.{}", std::env::consts::DLL_EXTENSION)),
        b"garbage",
    )
    .expect("write module");

    let config = root.path().join("hotswap.toml");
    fs::write(
        &config,
        format!(
            "directory = {:?}\nshadow_dir = {:?}\n",
            plugins.to_string_lossy(),
            root.path().join("shadow").to_string_lossy()
        ),
    )
    .expect("write config");

    let value = scan_json(
        hotswap()
            .arg("--config")
            .arg(&config)
            .arg("scan")
            .arg("--json")
            .env("HOTSWAP__EXTENSION", "plugin"),
    );

    let modules = value["modules"].as_array().expect("modules array");
    assert_eq!(modules.len(), 1);
    assert!(
        modules[0]["path"]
            .as_str()
            .is_some_and(|p| p.ends_with("one.plugin"))
    );
}

#[test]
fn invalid_config_file_fails() {
    let root = tempdir().expect("tempdir");
    let config = root.path().join("hotswap.ini");
    fs::write(&config, "directory=plugins").expect("write config");

    hotswap()
        .arg("-c")
        .arg(&config)
        .arg("scan")
        .assert()
        .failure()
        .stderr(contains("Failed to load configuration"));
}
