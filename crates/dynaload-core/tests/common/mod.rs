//! Builds the fixture plugins under `tests/fixtures` on first use.

#![allow(dead_code)]

use std::collections::HashMap;
use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::{Path, PathBuf};
use std::process::Command;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

static BUILT: Lazy<Mutex<HashMap<&'static str, PathBuf>>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn workspace_target() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../target/fixtures")
}

/// Path to the built fixture `name` (the directory name under `tests/fixtures`).
pub fn fixture(name: &'static str) -> PathBuf {
    let mut built = BUILT.lock();
    if let Some(path) = built.get(name) {
        return path.clone();
    }

    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
        .join("Cargo.toml");
    let target_dir = workspace_target();
    let status = Command::new(env!("CARGO"))
        .args(["build", "--quiet", "--offline", "--manifest-path"])
        .arg(&manifest)
        .arg("--target-dir")
        .arg(&target_dir)
        .status()
        .expect("failed to run cargo for fixture");
    assert!(status.success(), "building fixture {} failed", name);

    let file = format!("{}dynaload_{}{}", DLL_PREFIX, name.replace('-', "_"), DLL_SUFFIX);
    let path = target_dir.join("debug").join(file);
    assert!(path.exists(), "fixture library not found at {}", path.display());
    built.insert(name, path.clone());
    path
}

pub fn sample_plugin() -> PathBuf {
    fixture("sample-plugin")
}

pub fn partial_plugin() -> PathBuf {
    fixture("partial-plugin")
}

/// Copies the sample plugin to `dir` under `file_name`.
pub fn sample_plugin_copy(dir: &Path, file_name: &str) -> PathBuf {
    let dest = dir.join(file_name);
    std::fs::copy(sample_plugin(), &dest).expect("failed to copy fixture");
    dest
}
