/// Locating the `package.json` of a declared Alliage module.
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{Result, SandboxError};

/// Finds the package manifest of a module identifier.
///
/// `search_paths` is the sandbox's composed module search list
/// (`linked_modules`, `node_modules`, inherited `NODE_PATH`).
#[async_trait]
pub trait ModuleLocator: Send + Sync {
    async fn locate(&self, identifier: &str, search_paths: &[String]) -> Result<PathBuf>;
}

/// Node-style resolution.
///
/// Path-shaped identifiers (`/x`, `./x`, `../x`, `.`, `..`) are resolved
/// against the host working directory. Package names are looked up in
/// each search path, then in the `node_modules` directory of the working
/// directory and each of its ancestors.
#[derive(Debug, Clone)]
pub struct NodeModuleLocator {
    cwd: PathBuf,
}

impl NodeModuleLocator {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into() }
    }

    fn candidate_roots(&self, search_paths: &[String]) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = search_paths.iter().map(PathBuf::from).collect();
        roots.extend(self.cwd.ancestors().map(|dir| dir.join("node_modules")));
        roots
    }
}

/// True for identifiers that name a filesystem location rather than a package.
pub fn is_path_identifier(identifier: &str) -> bool {
    let rest = identifier
        .strip_prefix("..")
        .or_else(|| identifier.strip_prefix('.'))
        .unwrap_or(identifier);
    (rest.is_empty() && identifier.starts_with('.')) || rest.starts_with('/')
}

#[async_trait]
impl ModuleLocator for NodeModuleLocator {
    async fn locate(&self, identifier: &str, search_paths: &[String]) -> Result<PathBuf> {
        if is_path_identifier(identifier) {
            let candidate = self.cwd.join(identifier).join("package.json");
            if is_file(&candidate).await {
                return Ok(candidate);
            }
            return Err(SandboxError::ModuleNotFound {
                module: identifier.to_string(),
                searched: vec![candidate.to_string_lossy().into_owned()],
            });
        }

        let roots = self.candidate_roots(search_paths);
        for root in &roots {
            let candidate = root.join(identifier).join("package.json");
            if is_file(&candidate).await {
                return Ok(candidate);
            }
        }

        Err(SandboxError::ModuleNotFound {
            module: identifier.to_string(),
            searched: roots
                .iter()
                .map(|r| r.to_string_lossy().into_owned())
                .collect(),
        })
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
