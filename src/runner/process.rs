/// Process spawning seam.
///
/// The command runner only knows about [`ProcessSpawner`] and
/// [`ChildProcess`]; [`ShellSpawner`] is the real implementation backed by
/// `tokio::process`.
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::debug;

/// Everything needed to launch one sandbox command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Full command line, run through the platform shell.
    pub command_line: String,
    /// Working directory (the sandbox root).
    pub cwd: PathBuf,
    /// Complete environment of the child; nothing else is inherited.
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }
}

pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, spec: &CommandSpec) -> io::Result<Box<dyn ChildProcess>>;
}

/// A launched process as seen by the completion supervisor.
#[async_trait]
pub trait ChildProcess: Send {
    fn id(&self) -> Option<u32>;

    /// Whether the process can report its termination. When false the
    /// completion resolves as soon as the process is spawned.
    fn observable(&self) -> bool {
        true
    }

    /// Waits for termination and returns the exit code, `None` when the
    /// process was ended by a signal.
    async fn wait(&mut self) -> io::Result<Option<i32>>;

    async fn kill(&mut self) -> io::Result<()>;
}

/// Runs command lines through `sh -c` (or `cmd /C` on Windows).
///
/// Standard streams are inherited so scenario output shows up in the
/// caller's terminal.
#[derive(Debug, Default, Clone)]
pub struct ShellSpawner;

impl ProcessSpawner for ShellSpawner {
    fn spawn(&self, spec: &CommandSpec) -> io::Result<Box<dyn ChildProcess>> {
        #[cfg(unix)]
        let mut cmd = {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(&spec.command_line);
            cmd
        };
        #[cfg(windows)]
        let mut cmd = {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(&spec.command_line);
            cmd
        };

        cmd.current_dir(&spec.cwd).env_clear().envs(&spec.env);

        debug!("Spawning `{}` in {}", spec.command_line, spec.cwd.display());
        let child = cmd.spawn()?;
        Ok(Box::new(ShellChild { child }))
    }
}

struct ShellChild {
    child: Child,
}

#[async_trait]
impl ChildProcess for ShellChild {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> io::Result<Option<i32>> {
        let status = self.child.wait().await?;
        Ok(status.code())
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.child.kill().await
    }
}
