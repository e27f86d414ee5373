//! Scenario sandbox lifecycle.
//!
//! A [`Sandbox`] owns one uniquely named directory under the sandboxes
//! root. `init()` wipes it, recreates it from the scenario config and
//! writes the module registry; `install()`, `build()` and `run()` launch
//! the framework script inside it.
//!
//! ```text
//!  Uninitialized ──init()──▶ Initialized ──clear()──▶ Uninitialized
//!                              │    ▲
//!                              └────┘ init() (clears first)
//! ```
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{SandboxConfig, SandboxOptions, DEFAULT_CONFIG_FILE_NAME, DEFAULT_SANDBOXES_ROOT};
use crate::error::{Result, SandboxError};
use crate::host::HostEnv;
use crate::layout::SandboxLayout;
use crate::manifest::{build_modules_manifest, ModuleLocator, ModulesManifest, NodeModuleLocator};
use crate::placeholder::PlaceholderResolver;
use crate::provision::provision;
use crate::runner::{
    CommandHandle, CommandRunner, EnvOverlay, ProcessSpawner, ShellSpawner, SubCommand,
};

/// State that only exists between a successful `init()` and the next
/// `clear()`.
#[derive(Debug, Clone)]
struct Initialized {
    config: SandboxConfig,
    modules: ModulesManifest,
}

pub struct Sandbox {
    id: String,
    scenario_root: PathBuf,
    project_root: PathBuf,
    config_file_name: String,
    layout: SandboxLayout,
    env: HostEnv,
    locator: Arc<dyn ModuleLocator>,
    runner: CommandRunner,
    state: Option<Initialized>,
}

impl Sandbox {
    /// Creates a sandbox with Node-style module resolution and shell
    /// spawning. Nothing touches the disk until `init()`.
    ///
    /// Relative paths in `options` are resolved against the host working
    /// directory.
    pub fn new(options: SandboxOptions, env: HostEnv) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let scenario_root = env.absolutize(&options.scenario_path);
        let project_root = options
            .project_path
            .as_deref()
            .map(|p| env.absolutize(p))
            .unwrap_or_else(|| env.cwd().to_path_buf());
        let sandboxes_root = env.absolutize(
            options
                .root_path
                .as_deref()
                .unwrap_or_else(|| Path::new(DEFAULT_SANDBOXES_ROOT)),
        );
        let layout = SandboxLayout::new(sandboxes_root.join(&id));

        Self {
            id,
            scenario_root,
            project_root,
            config_file_name: options
                .config_file_name
                .unwrap_or_else(|| DEFAULT_CONFIG_FILE_NAME.to_string()),
            layout,
            locator: Arc::new(NodeModuleLocator::new(env.cwd())),
            runner: CommandRunner::new(env.clone(), Arc::new(ShellSpawner)),
            env,
            state: None,
        }
    }

    /// Replaces the module locator used while building the registry.
    pub fn with_locator(mut self, locator: Arc<dyn ModuleLocator>) -> Self {
        self.locator = locator;
        self
    }

    /// Replaces the process spawner used by the commands.
    pub fn with_spawner(mut self, spawner: Arc<dyn ProcessSpawner>) -> Self {
        self.runner = CommandRunner::new(self.env.clone(), spawner);
        self
    }

    /// Random token naming the sandbox directory.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Absolute path of the sandbox directory.
    pub fn path(&self) -> &Path {
        self.layout.root()
    }

    pub fn layout(&self) -> &SandboxLayout {
        &self.layout
    }

    pub fn scenario_root(&self) -> &Path {
        &self.scenario_root
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// (Re)creates the sandbox from the scenario config.
    ///
    /// On failure the sandbox stays uninitialized and whatever was already
    /// written stays on disk until the next `init()` or `clear()`.
    pub async fn init(&mut self) -> Result<()> {
        self.clear().await?;

        let root = self.layout.root().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| SandboxError::io(&root, e))?;

        let resolver = PlaceholderResolver::new(&self.project_root, &self.scenario_root);
        let config =
            SandboxConfig::load(&self.scenario_root, &self.config_file_name, &self.env, &resolver)
                .await?;
        debug!("Loaded sandbox config: {config:?}");

        provision(&self.layout, &config, &self.project_root, &self.env).await?;

        let search_paths = self
            .layout
            .module_search_paths(&self.env.path_list("NODE_PATH"));
        let modules = build_modules_manifest(
            &self.layout.modules_manifest(),
            &config.alliage_modules,
            self.locator.as_ref(),
            &search_paths,
        )
        .await?;

        info!(
            "Sandbox {} ready at {} ({} module(s))",
            self.id,
            root.display(),
            modules.len()
        );
        self.state = Some(Initialized { config, modules });
        Ok(())
    }

    /// Removes the sandbox directory. Succeeds if it does not exist.
    pub async fn clear(&mut self) -> Result<()> {
        self.state = None;
        let root = self.layout.root();
        match tokio::fs::remove_dir_all(root).await {
            Ok(()) => {
                debug!("Removed sandbox {}", root.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SandboxError::io(root, e)),
        }
    }

    fn initialized(&self) -> Result<&Initialized> {
        self.state.as_ref().ok_or(SandboxError::NotInitialized)
    }

    /// Resolved scenario config of the current initialization.
    pub fn config(&self) -> Result<&SandboxConfig> {
        Ok(&self.initialized()?.config)
    }

    /// Module registry written by the current initialization.
    pub fn modules(&self) -> Result<&ModulesManifest> {
        Ok(&self.initialized()?.modules)
    }

    pub fn install<S: AsRef<str>>(&self, args: &[S], env: &EnvOverlay) -> Result<CommandHandle> {
        self.exec(SubCommand::Install, args, env)
    }

    pub fn build<S: AsRef<str>>(&self, args: &[S], env: &EnvOverlay) -> Result<CommandHandle> {
        self.exec(SubCommand::Build, args, env)
    }

    pub fn run<S: AsRef<str>>(&self, args: &[S], env: &EnvOverlay) -> Result<CommandHandle> {
        self.exec(SubCommand::Run, args, env)
    }

    /// Launches `<command> <sandbox>/node_modules/.bin/alliage-scripts <sub> <args...>`.
    ///
    /// Returns as soon as the process is launched; await the handle for
    /// its termination. Must be called from within a tokio runtime.
    pub fn exec<S: AsRef<str>>(
        &self,
        sub: SubCommand,
        args: &[S],
        env: &EnvOverlay,
    ) -> Result<CommandHandle> {
        let state = self.initialized()?;
        Ok(self
            .runner
            .spawn(&self.layout, &state.config.command, sub, args, env))
    }
}
