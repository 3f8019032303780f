use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use super::{ManifestParser, declared, file_name_is};
use crate::dependency::{Dependency, Ecosystem};

/// npm lock file (`package-lock.json`), lockfile versions 1 to 3.
pub struct NpmLockParser;

impl ManifestParser for NpmLockParser {
    fn is_supported(&self, path: &Path) -> bool {
        file_name_is(path, "package-lock.json")
    }

    fn get_dependencies(&self, path: &Path, ignore: &BTreeSet<String>) -> Result<Vec<Dependency>> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        parse_npm_lock(&content, ignore)
    }

    fn name(&self) -> &'static str {
        "package-lock.json"
    }
}

fn parse_npm_lock(content: &str, ignore: &BTreeSet<String>) -> Result<Vec<Dependency>> {
    let lock: Value = serde_json::from_str(content).context("failed to parse package-lock.json")?;
    let lock = lock.as_object().context("package-lock.json is not a JSON object")?;

    let names: Vec<String> = if let Some(packages) = lock.get("packages").and_then(Value::as_object) {
        packages
            .iter()
            .filter(|(_, entry)| !entry.get("link").and_then(Value::as_bool).unwrap_or(false))
            .filter_map(|(key, _)| package_name_from_path(key))
            .collect()
    } else if let Some(deps) = lock.get("dependencies").and_then(Value::as_object) {
        deps.keys().cloned().collect()
    } else {
        vec![]
    };

    Ok(declared(names, Ecosystem::Npm, ignore))
}

/// `node_modules/a/node_modules/@scope/b` names `@scope/b`. The root entry
/// (`""`) and workspace paths outside `node_modules` name nothing.
fn package_name_from_path(key: &str) -> Option<String> {
    let (_, name) = key.rsplit_once("node_modules/")?;
    (!name.is_empty()).then(|| name.to_string())
}
