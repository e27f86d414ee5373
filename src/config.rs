use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SandboxError};
use crate::host::HostEnv;
use crate::placeholder::PlaceholderResolver;

/// Default name of the per-scenario config file.
pub const DEFAULT_CONFIG_FILE_NAME: &str = "alliage-sandbox-config.json";

/// Host variable overriding the interpreter used to run framework scripts.
pub const COMMAND_ENV_VAR: &str = "ALLIAGE_SANDBOX_COMMAND";

/// Interpreter used when `COMMAND_ENV_VAR` is not set.
pub const DEFAULT_COMMAND: &str = "node";

/// Default base directory for sandboxes, relative to the host working directory.
pub const DEFAULT_SANDBOXES_ROOT: &str = ".alliage-sandboxes";

/// Resolved scenario configuration.
///
/// Every path-bearing value has already gone through the
/// [`PlaceholderResolver`] when this is returned by [`SandboxConfig::load`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxConfig {
    pub command: String,
    pub copy_files: Vec<String>,
    pub link_modules: BTreeMap<String, String>,
    pub alliage_modules: Vec<String>,
}

/// On-disk shape: every field optional, unknown keys ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    command: Option<String>,
    #[serde(default)]
    copy_files: Vec<String>,
    #[serde(default)]
    link_modules: BTreeMap<String, String>,
    #[serde(default)]
    alliage_modules: Vec<String>,
}

impl SandboxConfig {
    /// Built-in defaults: command from the host environment, everything else empty.
    pub fn defaults(env: &HostEnv) -> Self {
        Self {
            command: default_command(env),
            copy_files: Vec::new(),
            link_modules: BTreeMap::new(),
            alliage_modules: Vec::new(),
        }
    }

    /// Reads `<scenario_root>/<file_name>`, merges it over the defaults and
    /// resolves placeholders. A missing or malformed file is an error.
    pub async fn load(
        scenario_root: &Path,
        file_name: &str,
        env: &HostEnv,
        resolver: &PlaceholderResolver,
    ) -> Result<Self> {
        let path = scenario_root.join(file_name);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| config_error(&path, e))?;
        let raw: RawConfig = serde_json::from_str(&content).map_err(|e| config_error(&path, e))?;

        Ok(Self::from_raw(raw, env).resolved(resolver))
    }

    fn from_raw(raw: RawConfig, env: &HostEnv) -> Self {
        let defaults = Self::defaults(env);
        Self {
            command: raw.command.unwrap_or(defaults.command),
            copy_files: raw.copy_files,
            link_modules: raw.link_modules,
            alliage_modules: raw.alliage_modules,
        }
    }

    /// Applies placeholder substitution to every path-bearing field.
    /// `linkModules` keys are module names and stay untouched.
    fn resolved(self, resolver: &PlaceholderResolver) -> Self {
        Self {
            command: resolver.resolve(&self.command),
            copy_files: self.copy_files.iter().map(|p| resolver.resolve(p)).collect(),
            link_modules: self
                .link_modules
                .into_iter()
                .map(|(name, path)| {
                    let path = resolver.resolve(&path);
                    (name, path)
                })
                .collect(),
            alliage_modules: self
                .alliage_modules
                .iter()
                .map(|m| resolver.resolve(m))
                .collect(),
        }
    }
}

fn default_command(env: &HostEnv) -> String {
    env.var(COMMAND_ENV_VAR)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_COMMAND)
        .to_string()
}

fn config_error(
    path: &Path,
    source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> SandboxError {
    SandboxError::Config {
        path: path.to_path_buf(),
        source: source.into(),
    }
}

/// Construction options of a [`crate::sandbox::Sandbox`].
#[derive(Debug, Clone)]
pub struct SandboxOptions {
    /// Directory of the scenario (holds the config file and fixtures).
    pub scenario_path: PathBuf,
    /// Project whose `node_modules` is linked into the sandbox.
    /// Defaults to the host working directory.
    pub project_path: Option<PathBuf>,
    /// Base directory under which sandboxes are created.
    /// Defaults to `./.alliage-sandboxes`.
    pub root_path: Option<PathBuf>,
    /// Config file name inside the scenario directory.
    pub config_file_name: Option<String>,
}

impl SandboxOptions {
    pub fn new(scenario_path: impl Into<PathBuf>) -> Self {
        Self {
            scenario_path: scenario_path.into(),
            project_path: None,
            root_path: None,
            config_file_name: None,
        }
    }

    pub fn project_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_path = Some(path.into());
        self
    }

    pub fn root_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.root_path = Some(path.into());
        self
    }

    pub fn config_file_name(mut self, name: impl Into<String>) -> Self {
        self.config_file_name = Some(name.into());
        self
    }
}
