/// Host environment snapshot.
///
/// The sandbox never reads `std::env` on its own: the variables and the
/// working directory of the parent process are captured once into a
/// `HostEnv` and handed to the config loader, the module locator and the
/// command runner. Tests build one from scratch to stay deterministic.
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct HostEnv {
    vars: BTreeMap<String, String>,
    cwd: PathBuf,
}

impl HostEnv {
    /// Creates an environment with the given working directory and no variables.
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            vars: BTreeMap::new(),
            cwd: cwd.into(),
        }
    }

    /// Captures the variables and working directory of the current process.
    ///
    /// Variables that are not valid UTF-8 are skipped with a warning; the
    /// sandbox commands will not see them.
    pub fn from_process() -> std::io::Result<Self> {
        let cwd = std::env::current_dir()?;
        Ok(Self::from_vars_os(std::env::vars_os(), cwd))
    }

    /// Builds an environment from raw OS pairs, dropping the ones that are
    /// not valid UTF-8.
    pub fn from_vars_os(
        vars: impl IntoIterator<Item = (OsString, OsString)>,
        cwd: impl Into<PathBuf>,
    ) -> Self {
        let mut kept = BTreeMap::new();
        for (k, v) in vars {
            match (k.into_string(), v.into_string()) {
                (Ok(k), Ok(v)) => {
                    kept.insert(k, v);
                }
                (Ok(k), Err(_)) => {
                    warn!("Skipping environment variable {k}: value is not valid UTF-8")
                }
                (Err(k), _) => warn!(
                    "Skipping environment variable {}: name is not valid UTF-8",
                    k.to_string_lossy()
                ),
            }
        }
        Self {
            vars: kept,
            cwd: cwd.into(),
        }
    }

    /// Builder-style variable setter.
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Makes `path` absolute against the host working directory.
    pub fn absolutize(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }

    /// Splits a colon-separated variable (PATH, NODE_PATH) into entries,
    /// dropping empty segments. Missing variables yield no entries.
    pub fn path_list(&self, key: &str) -> Vec<String> {
        self.var(key)
            .map(|v| {
                v.split(':')
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}
