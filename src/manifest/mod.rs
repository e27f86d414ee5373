//! Alliage module registry of a sandbox (`alliage-modules.json`).
//!
//! The registry maps a module's package name to the identifier it was
//! declared with in `alliageModules` and the framework dependencies its
//! `package.json` lists. Only packages whose `alliageManifest.type` is
//! `"module"` are registered.
pub mod locator;

use std::collections::BTreeMap;
use std::path::Path;

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, SandboxError};

pub use locator::{ModuleLocator, NodeModuleLocator};

/// Manifest type that registers a package as a framework module.
pub const MODULE_MANIFEST_TYPE: &str = "module";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleEntry {
    /// Identifier exactly as declared in `alliageModules`.
    pub module: String,
    pub deps: Vec<String>,
}

pub type ModulesManifest = BTreeMap<String, ModuleEntry>;

/// The two `package.json` fields the sandbox cares about.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageManifest {
    name: Option<String>,
    alliage_manifest: Option<AlliageManifest>,
}

#[derive(Debug, Deserialize)]
struct AlliageManifest {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
}

/// Builds the module registry and writes it to `manifest_path`.
///
/// The existing file (if any) and every declared module's `package.json`
/// are read concurrently. Fresh entries are applied on top of the existing
/// ones in declaration order, so the last declaration wins when two
/// modules share a package name.
pub async fn build_modules_manifest(
    manifest_path: &Path,
    alliage_modules: &[String],
    locator: &dyn ModuleLocator,
    search_paths: &[String],
) -> Result<ModulesManifest> {
    let (mut manifest, entries) = tokio::try_join!(
        load_manifest(manifest_path),
        try_join_all(
            alliage_modules
                .iter()
                .map(|module| describe_module(module, locator, search_paths)),
        ),
    )?;

    for (name, entry) in entries.into_iter().flatten() {
        manifest.insert(name, entry);
    }

    write_manifest(manifest_path, &manifest).await?;
    info!(
        "Registered {} Alliage module(s) in {}",
        manifest.len(),
        manifest_path.display()
    );
    Ok(manifest)
}

/// Reads a persisted registry. A missing file is an empty registry.
pub async fn load_manifest(path: &Path) -> Result<ModulesManifest> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => serde_json::from_str(&content).map_err(|e| SandboxError::Json {
            path: path.to_path_buf(),
            source: e,
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ModulesManifest::new()),
        Err(e) => Err(SandboxError::io(path, e)),
    }
}

async fn write_manifest(path: &Path, manifest: &ModulesManifest) -> Result<()> {
    let json = serde_json::to_string_pretty(manifest).map_err(|e| SandboxError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| SandboxError::io(path, e))
}

/// Returns the registry entry contributed by one declared module, if any.
async fn describe_module(
    module: &str,
    locator: &dyn ModuleLocator,
    search_paths: &[String],
) -> Result<Option<(String, ModuleEntry)>> {
    let package_json = locator.locate(module, search_paths).await?;
    let content = tokio::fs::read_to_string(&package_json)
        .await
        .map_err(|e| SandboxError::io(&package_json, e))?;
    let package: PackageManifest =
        serde_json::from_str(&content).map_err(|e| SandboxError::Json {
            path: package_json.clone(),
            source: e,
        })?;

    let Some(alliage) = package.alliage_manifest else {
        debug!("{module} has no alliageManifest, skipping");
        return Ok(None);
    };
    if alliage.kind.as_deref() != Some(MODULE_MANIFEST_TYPE) {
        debug!("{module} is not an Alliage module, skipping");
        return Ok(None);
    }
    let Some(name) = package.name else {
        warn!(
            "{} declares an Alliage module without a name, skipping",
            package_json.display()
        );
        return Ok(None);
    };

    Ok(Some((
        name,
        ModuleEntry {
            module: module.to_string(),
            deps: alliage.dependencies,
        },
    )))
}
