//! Loader configuration.
//!
//! Values come from, in increasing priority: the built-in defaults, a TOML
//! file, and the `DYNALOAD_*` environment variables.

use std::env::consts::DLL_EXTENSION;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default values.
pub mod defaults {
    /// Upper bound on entries read from a `function_list`.
    pub const MAX_FUNCTIONS: usize = 1024;
    pub const VERIFY_INSTALL: bool = true;
    /// Per-user plugin directory, relative to the home directory.
    pub const USER_PLUGIN_DIR: &str = ".dynaload/plugins";
    #[cfg(unix)]
    pub const SYSTEM_PLUGIN_DIR: &str = "/usr/lib/dynaload/plugins";
}

/// Environment variable names.
pub mod env_vars {
    /// Extra plugin directories, in the platform's path list syntax.
    pub const PLUGIN_PATH: &str = "DYNALOAD_PLUGIN_PATH";
    pub const MAX_FUNCTIONS: &str = "DYNALOAD_MAX_FUNCTIONS";
    pub const VERIFY_INSTALL: &str = "DYNALOAD_VERIFY_INSTALL";
    /// `true` switches CLI logs to JSON.
    pub const LOG_JSON: &str = "DYNALOAD_LOG_JSON";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Directories searched by plugin discovery, in order.
    pub search_paths: Vec<PathBuf>,
    pub max_functions: usize,
    /// Check the module's table slots after `install_tables` returns.
    pub verify_install: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            search_paths: default_search_paths(),
            max_functions: defaults::MAX_FUNCTIONS,
            verify_install: defaults::VERIFY_INSTALL,
        }
    }
}

fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(defaults::USER_PLUGIN_DIR));
    }
    #[cfg(unix)]
    paths.push(PathBuf::from(defaults::SYSTEM_PLUGIN_DIR));
    paths
}

impl LoaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_vars(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Applies the `DYNALOAD_*` variables returned by `lookup`.
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(env_vars::PLUGIN_PATH) {
            let mut extra: Vec<PathBuf> = std::env::split_paths(&value)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            extra.append(&mut self.search_paths);
            self.search_paths = extra;
        }
        if let Some(value) = lookup(env_vars::MAX_FUNCTIONS) {
            self.max_functions = value.trim().parse().map_err(|_| {
                Error::Config(format!("{} must be a number, got `{}`", env_vars::MAX_FUNCTIONS, value))
            })?;
        }
        if let Some(value) = lookup(env_vars::VERIFY_INSTALL) {
            self.verify_install = parse_bool(&value).ok_or_else(|| {
                Error::Config(format!("{} must be true or false, got `{}`", env_vars::VERIFY_INSTALL, value))
            })?;
        }
        self.validate()
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML file, then applies the environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_vars(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    pub fn with_search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.search_paths = paths;
        self
    }

    pub fn with_max_functions(mut self, max: usize) -> Self {
        self.max_functions = max;
        self
    }

    pub fn with_verify_install(mut self, verify: bool) -> Self {
        self.verify_install = verify;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_functions == 0 {
            return Err(Error::Config("max_functions must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Whether `path` has this platform's shared library extension.
pub fn is_plugin_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(DLL_EXTENSION))
}
