//! Disposable filesystem sandboxes for Alliage integration scenarios.
//!
//! ```no_run
//! use alliage_sandbox::{EnvOverlay, HostEnv, Sandbox, SandboxOptions};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let env = HostEnv::from_process()?;
//! let mut sandbox = Sandbox::new(SandboxOptions::new("scenarios/basic"), env);
//! sandbox.init().await?;
//! let event = sandbox.run(&["--env", "test"], &EnvOverlay::new())?.wait().await;
//! println!("scenario finished: {event:?}");
//! sandbox.clear().await?;
//! # Ok(())
//! # }
//! ```
pub mod config;
pub mod error;
pub mod host;
pub mod layout;
pub mod manifest;
pub mod placeholder;
pub mod provision;
pub mod runner;
pub mod sandbox;

pub use config::{SandboxConfig, SandboxOptions};
pub use error::{Result, SandboxError};
pub use host::HostEnv;
pub use layout::SandboxLayout;
pub use manifest::{ModuleEntry, ModuleLocator, ModulesManifest, NodeModuleLocator};
pub use placeholder::PlaceholderResolver;
pub use runner::{CommandHandle, EnvOverlay, ProcessEvent, ProcessSpawner, SubCommand};
pub use sandbox::Sandbox;
