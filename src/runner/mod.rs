pub mod completion;
pub mod process;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::host::HostEnv;
use crate::layout::SandboxLayout;

pub use completion::{CommandHandle, Completion, CompletionSignal, ProcessEvent};
pub use process::{ChildProcess, CommandSpec, ProcessSpawner, ShellSpawner};

/// Caller-supplied variables added to a command's environment.
pub type EnvOverlay = BTreeMap<String, String>;

/// Framework script sub-commands exposed by the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubCommand {
    Install,
    Build,
    Run,
}

impl SubCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubCommand::Install => "install",
            SubCommand::Build => "build",
            SubCommand::Run => "run",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "install" => Some(SubCommand::Install),
            "build" => Some(SubCommand::Build),
            "run" => Some(SubCommand::Run),
            _ => None,
        }
    }
}

impl fmt::Display for SubCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the environment and command line of sandbox commands and
/// launches them.
#[derive(Clone)]
pub struct CommandRunner {
    env: HostEnv,
    spawner: Arc<dyn ProcessSpawner>,
}

impl CommandRunner {
    pub fn new(env: HostEnv, spawner: Arc<dyn ProcessSpawner>) -> Self {
        Self { env, spawner }
    }

    /// `NODE_PATH`: sandbox linked modules, sandbox dependencies, then the
    /// inherited entries.
    pub fn node_path(&self, layout: &SandboxLayout) -> String {
        layout
            .module_search_paths(&self.env.path_list("NODE_PATH"))
            .join(":")
    }

    /// `PATH`: inherited entries, then the sandbox's `node_modules/.bin`.
    pub fn path(&self, layout: &SandboxLayout) -> String {
        let mut entries = self.env.path_list("PATH");
        entries.push(layout.bin_dir().to_string_lossy().into_owned());
        entries.join(":")
    }

    /// Describes the process `spawn` would launch, without launching it.
    pub fn command_spec<S: AsRef<str>>(
        &self,
        layout: &SandboxLayout,
        command: &str,
        sub: SubCommand,
        args: &[S],
        overlay: &EnvOverlay,
    ) -> CommandSpec {
        let mut command_line = format!(
            "{command} {} {sub}",
            layout.framework_script().to_string_lossy()
        );
        for arg in args {
            command_line.push(' ');
            command_line.push_str(arg.as_ref());
        }

        let mut env = self.env.vars().clone();
        env.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
        env.insert("NODE_PATH".to_string(), self.node_path(layout));
        env.insert("PATH".to_string(), self.path(layout));

        CommandSpec {
            command_line,
            cwd: layout.root().to_path_buf(),
            env,
        }
    }

    /// Launches the command. Never fails: a launch error resolves the
    /// handle's completion instead.
    pub fn spawn<S: AsRef<str>>(
        &self,
        layout: &SandboxLayout,
        command: &str,
        sub: SubCommand,
        args: &[S],
        overlay: &EnvOverlay,
    ) -> CommandHandle {
        let spec = self.command_spec(layout, command, sub, args, overlay);
        info!("Running `{}`", spec.command_line);
        match self.spawner.spawn(&spec) {
            Ok(child) => CommandHandle::supervise(child),
            Err(e) => CommandHandle::failed(&e),
        }
    }
}
