/// `<token>` substitution for path-bearing config values.
///
/// Only `<projectRoot>` and `<scenarioRoot>` are known. Anything else
/// between angle brackets is left exactly as written.
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([A-Za-z0-9_]+)>").expect("placeholder pattern is valid"));

#[derive(Debug, Clone)]
pub struct PlaceholderResolver {
    project_root: PathBuf,
    scenario_root: PathBuf,
}

impl PlaceholderResolver {
    pub fn new(project_root: impl Into<PathBuf>, scenario_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            scenario_root: scenario_root.into(),
        }
    }

    fn lookup(&self, name: &str) -> Option<&Path> {
        match name {
            "projectRoot" => Some(&self.project_root),
            "scenarioRoot" => Some(&self.scenario_root),
            _ => None,
        }
    }

    /// Replaces every known token in a single pass. Substituted values are
    /// never re-scanned.
    pub fn resolve(&self, input: &str) -> String {
        TOKEN
            .replace_all(input, |caps: &Captures| match self.lookup(&caps[1]) {
                Some(path) => path.to_string_lossy().into_owned(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}
