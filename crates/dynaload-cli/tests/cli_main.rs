//! Basic CLI tests for the dynaload command-line interface.

use std::env::consts::{DLL_EXTENSION, DLL_PREFIX, DLL_SUFFIX};
use std::path::{Path, PathBuf};
use std::process;

use assert_cmd::Command;
use once_cell::sync::Lazy;
use predicates::prelude::*;

/// The sample fixture plugin from dynaload-core, built once per test run.
static SAMPLE_PLUGIN: Lazy<PathBuf> = Lazy::new(|| {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let target_dir = manifest_dir.join("../../target/fixtures");
    let status = process::Command::new(env!("CARGO"))
        .args(["build", "--quiet", "--offline", "--manifest-path"])
        .arg(manifest_dir.join("../dynaload-core/tests/fixtures/sample-plugin/Cargo.toml"))
        .arg("--target-dir")
        .arg(&target_dir)
        .status()
        .expect("failed to run cargo for fixture");
    assert!(status.success(), "building the sample plugin failed");
    target_dir
        .join("debug")
        .join(format!("{}dynaload_sample_plugin{}", DLL_PREFIX, DLL_SUFFIX))
});

fn dynaload() -> Command {
    Command::cargo_bin("dynaload").unwrap()
}

/// Test that the CLI binary exists and shows help.
#[test]
fn test_cli_help() {
    dynaload()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("load and call native plugin modules"))
        .stdout(predicate::str::contains("info"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("call"));
}

#[test]
fn test_cli_version() {
    dynaload()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("dynaload"));
}

#[test]
fn test_no_subcommand_shows_error() {
    dynaload().assert().failure();
}

#[test]
fn test_validate_missing_file() {
    dynaload()
        .args(["validate", "/nonexistent/libnothing.so"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load module"));
}

#[test]
fn test_list_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(format!("libone.{}", DLL_EXTENSION)), b"").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

    dynaload()
        .arg("list")
        .arg("--dir")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("libone.{}", DLL_EXTENSION)))
        .stdout(predicate::str::contains("notes.txt").not());
}

#[test]
fn test_list_empty_directory() {
    let dir = tempfile::tempdir().unwrap();
    dynaload()
        .arg("list")
        .arg("--dir")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("No plugins found."));
}

#[test]
fn test_bad_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, b"max_functions = \"many\"\n").unwrap();

    dynaload()
        .arg("--config")
        .arg(file.path())
        .args(["list", "--dir", "."])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[cfg(not(feature = "underscore-symbols"))]
mod native {
    use super::*;

    #[test]
    fn test_info_lists_functions() {
        dynaload()
            .arg("info")
            .arg(&*SAMPLE_PLUGIN)
            .assert()
            .success()
            .stdout(predicate::str::contains("sample plugin: arithmetic"))
            .stdout(predicate::str::is_match(r"LoadOnce: (yes|no)").unwrap())
            .stdout(predicate::str::contains("[0] add  (a:int b:int -> sum:int)"))
            .stdout(predicate::str::contains("[5] log"));
    }

    #[test]
    fn test_validate_sample_plugin() {
        dynaload()
            .arg("validate")
            .arg(&*SAMPLE_PLUGIN)
            .assert()
            .success()
            .stdout(predicate::str::contains("OK:"))
            .stdout(predicate::str::contains("(6 functions)"));
    }

    #[test]
    fn test_call_by_name() {
        dynaload()
            .arg("call")
            .arg(&*SAMPLE_PLUGIN)
            .args(["add", "-a", "a=int:2", "-a", "b=int:3"])
            .assert()
            .success()
            .stdout(predicate::str::contains("sum = int:5"));
    }

    #[test]
    fn test_call_by_index_as_json() {
        let output = dynaload()
            .arg("call")
            .arg(&*SAMPLE_PLUGIN)
            .args(["1", "-a", "x=double:1.5", "-a", "factor=double:2", "--json"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json["x"], serde_json::json!(3.0));
        assert_eq!(json["factor"], serde_json::json!(2.0));
    }

    #[test]
    fn test_call_out_of_range() {
        dynaload()
            .arg("call")
            .arg(&*SAMPLE_PLUGIN)
            .arg("6")
            .assert()
            .failure()
            .stderr(predicate::str::contains("out of range"));
    }

    #[test]
    fn test_call_rejects_bad_argument() {
        dynaload()
            .arg("call")
            .arg(&*SAMPLE_PLUGIN)
            .args(["add", "-a", "a=five"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid argument"));
    }
}
