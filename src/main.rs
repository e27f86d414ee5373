use std::convert::Infallible;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use alliage_sandbox::{EnvOverlay, HostEnv, ProcessEvent, Sandbox, SandboxOptions, SubCommand};

/// Runs an Alliage integration scenario inside a disposable sandbox.
#[derive(Debug, Parser)]
#[command(
    name = "alliage-sandbox",
    version,
    after_help = "\
ENVIRONMENT VARIABLES:
    RUST_LOG                  Log level filter for tracing
                              (e.g. debug, alliage_sandbox=debug,warn)
    ALLIAGE_SANDBOX_COMMAND   Interpreter used when the config has no
                              \"command\" [default: node]

EXAMPLES:
    alliage-sandbox scenarios/basic install
    alliage-sandbox -e PORT=8080 scenarios/webserver run --env test
    alliage-sandbox --keep scenarios/basic build
    RUST_LOG=debug alliage-sandbox scenarios/basic prepare"
)]
struct Cli {
    /// Project root holding node_modules [default: .]
    #[arg(short, long, value_name = "DIR", value_parser = expand_path)]
    project: Option<PathBuf>,

    /// Directory for sandboxes [default: ./.alliage-sandboxes]
    #[arg(short, long, value_name = "DIR", value_parser = expand_path)]
    root: Option<PathBuf>,

    /// Config file name in the scenario [default: alliage-sandbox-config.json]
    #[arg(short, long = "config", value_name = "NAME")]
    config_file_name: Option<String>,

    /// Extra environment variable (repeatable)
    #[arg(short, long, value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    env: Vec<(String, String)>,

    /// Kill the command after SECS seconds
    #[arg(short, long, value_name = "SECS", value_parser = parse_timeout)]
    timeout: Option<Duration>,

    /// Keep the sandbox directory afterwards
    #[arg(short, long)]
    keep: bool,

    /// Scenario directory holding the sandbox config
    #[arg(value_name = "SCENARIO_DIR", value_parser = expand_path)]
    scenario: PathBuf,

    #[command(subcommand)]
    action: Action,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
enum Action {
    /// Provision the sandbox, then run `alliage-scripts install`
    #[command(disable_help_flag = true)]
    Install(ScriptArgs),
    /// Provision the sandbox, then run `alliage-scripts build`
    #[command(disable_help_flag = true)]
    Build(ScriptArgs),
    /// Provision the sandbox, then run `alliage-scripts run`
    #[command(disable_help_flag = true)]
    Run(ScriptArgs),
    /// Provision the sandbox and print its path (implies --keep)
    Prepare,
}

/// Arguments handed to the framework script untouched.
#[derive(Debug, Clone, PartialEq, Args)]
struct ScriptArgs {
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl Action {
    fn script(&self) -> Option<(SubCommand, &[String])> {
        match self {
            Self::Install(a) => Some((SubCommand::Install, &a.args)),
            Self::Build(a) => Some((SubCommand::Build, &a.args)),
            Self::Run(a) => Some((SubCommand::Run, &a.args)),
            Self::Prepare => None,
        }
    }
}

impl Cli {
    fn keep(&self) -> bool {
        self.keep || self.action == Action::Prepare
    }

    fn env_overlay(&self) -> EnvOverlay {
        self.env.iter().cloned().collect()
    }
}

fn expand_path(raw: &str) -> std::result::Result<PathBuf, Infallible> {
    Ok(PathBuf::from(shellexpand::tilde(raw).into_owned()))
}

fn parse_env_pair(raw: &str) -> std::result::Result<(String, String), String> {
    let (k, v) = raw
        .split_once('=')
        .ok_or_else(|| format!("invalid value '{raw}', expected KEY=VALUE"))?;
    Ok((k.to_string(), v.to_string()))
}

fn parse_timeout(raw: &str) -> std::result::Result<Duration, String> {
    raw.parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| format!("invalid timeout '{raw}': {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let keep = cli.keep();

    // Initialize logging (RUST_LOG=debug for debug mode)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("alliage_sandbox=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let host = HostEnv::from_process().context("Cannot read the current directory")?;
    let mut options = SandboxOptions::new(&cli.scenario);
    options.project_path = cli.project.clone();
    options.root_path = cli.root.clone();
    options.config_file_name = cli.config_file_name.clone();

    let mut sandbox = Sandbox::new(options, host);
    info!("Scenario: {}", sandbox.scenario_root().display());
    info!("Sandbox: {}", sandbox.path().display());

    if let Err(e) = sandbox.init().await {
        error!("Sandbox initialization failed: {e}");
        if !keep {
            sandbox.clear().await?;
        }
        return Err(e.into());
    }

    let Some((sub, args)) = cli.action.script() else {
        println!("{}", sandbox.path().display());
        return Ok(());
    };

    let mut handle = sandbox.exec(sub, args, &cli.env_overlay())?;
    let deadline = async {
        match cli.timeout {
            Some(t) => tokio::time::sleep(t).await,
            None => std::future::pending().await,
        }
    };
    let event = tokio::select! {
        event = handle.completion_mut() => event,
        _ = deadline => {
            warn!("`{sub}` timed out, killing it");
            handle.kill();
            handle.wait().await
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, stopping `{sub}`");
            handle.kill();
            handle.wait().await
        }
    };

    let code = match &event {
        ProcessEvent::Exit { code: Some(code) } => *code,
        ProcessEvent::Exit { code: None } => {
            warn!("`{sub}` was terminated by a signal");
            1
        }
        ProcessEvent::Error { message, .. } => {
            error!("`{sub}` failed to start: {message}");
            1
        }
        ProcessEvent::Detached => 0,
    };
    info!("`{sub}` finished with exit code {code}");

    if keep {
        info!("Keeping sandbox at {}", sandbox.path().display());
    } else {
        sandbox.clear().await?;
    }

    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use clap::error::ErrorKind;

    use super::*;

    fn parse(args: &[&str]) -> std::result::Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("alliage-sandbox").chain(args.iter().copied()))
    }

    #[test]
    fn test_parse_minimal() {
        let cli = parse(&["scenarios/basic", "run"]).unwrap();
        assert_eq!(cli.scenario, PathBuf::from("scenarios/basic"));
        assert_eq!(cli.action, Action::Run(ScriptArgs { args: vec![] }));
        assert!(!cli.keep());
        assert!(cli.timeout.is_none());
        assert!(cli.env_overlay().is_empty());
    }

    #[test]
    fn test_parse_passes_trailing_args_through() {
        let cli = parse(&["s", "run", "--env", "test", "-k"]).unwrap();
        let (sub, args) = cli.action.script().unwrap();
        assert_eq!(sub, SubCommand::Run);
        assert_eq!(args, ["--env", "test", "-k"]);
        assert!(!cli.keep());
        assert!(cli.env_overlay().is_empty());
    }

    #[test]
    fn test_parse_options() {
        let cli = parse(&[
            "-p",
            "/project",
            "--root=/tmp/sb",
            "--config",
            "other.json",
            "-e",
            "X=y",
            "--env=PORT=8080",
            "-t",
            "30",
            "--keep",
            "s",
            "build",
        ])
        .unwrap();
        assert_eq!(cli.project, Some(PathBuf::from("/project")));
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/sb")));
        assert_eq!(cli.config_file_name.as_deref(), Some("other.json"));
        let env = cli.env_overlay();
        assert_eq!(env.get("X").map(String::as_str), Some("y"));
        assert_eq!(env.get("PORT").map(String::as_str), Some("8080"));
        assert_eq!(cli.timeout, Some(Duration::from_secs(30)));
        assert!(cli.keep());
        assert_eq!(cli.action.script().map(|(sub, _)| sub), Some(SubCommand::Build));
    }

    #[test]
    fn test_parse_prepare_implies_keep() {
        let cli = parse(&["s", "prepare"]).unwrap();
        assert_eq!(cli.action, Action::Prepare);
        assert!(cli.action.script().is_none());
        assert!(cli.keep());
    }

    #[test]
    fn test_parse_help_and_version() {
        assert_eq!(parse(&["--help"]).unwrap_err().kind(), ErrorKind::DisplayHelp);
        assert_eq!(parse(&["-V"]).unwrap_err().kind(), ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["s"]).is_err());
        assert!(parse(&["s", "deploy"]).unwrap_err().to_string().contains("deploy"));
        assert!(parse(&["--bogus", "s", "run"]).is_err());
        assert!(parse(&["-e", "NOEQUALS", "s", "run"]).is_err());
        assert!(parse(&["-t", "soon", "s", "run"]).is_err());
        assert!(parse(&["-p"]).is_err());
    }

    #[test]
    fn test_expand_path_tilde() {
        if let Ok(home) = std::env::var("HOME") {
            assert_eq!(
                expand_path("~/sandboxes").unwrap(),
                PathBuf::from(home).join("sandboxes")
            );
        }
        assert_eq!(expand_path("/abs").unwrap(), PathBuf::from("/abs"));
    }
}
