/// Well-known paths inside a sandbox directory.
use std::path::{Path, PathBuf};

/// Directory holding the `linkModules` symlinks.
pub const LINKED_MODULES_DIR: &str = "linked_modules";

/// Symlink to the project's dependency tree.
pub const NODE_MODULES_DIR: &str = "node_modules";

/// Persisted module registry.
pub const MODULES_MANIFEST_FILE: &str = "alliage-modules.json";

/// Framework script invoked by `install`, `build` and `run`.
pub const FRAMEWORK_SCRIPT: &str = "alliage-scripts";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxLayout {
    root: PathBuf,
}

impl SandboxLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn linked_modules(&self) -> PathBuf {
        self.root.join(LINKED_MODULES_DIR)
    }

    pub fn node_modules(&self) -> PathBuf {
        self.root.join(NODE_MODULES_DIR)
    }

    /// `<sandbox>/node_modules/.bin`
    pub fn bin_dir(&self) -> PathBuf {
        self.node_modules().join(".bin")
    }

    pub fn framework_script(&self) -> PathBuf {
        self.bin_dir().join(FRAMEWORK_SCRIPT)
    }

    pub fn modules_manifest(&self) -> PathBuf {
        self.root.join(MODULES_MANIFEST_FILE)
    }

    /// Module search list seen by processes and the module locator:
    /// linked modules first, then the sandbox's dependency tree, then the
    /// inherited entries.
    pub fn module_search_paths(&self, inherited: &[String]) -> Vec<String> {
        let mut paths = vec![
            self.linked_modules().to_string_lossy().into_owned(),
            self.node_modules().to_string_lossy().into_owned(),
        ];
        paths.extend(inherited.iter().cloned());
        paths
    }
}
