use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::{ManifestParser, declared, file_name_is};
use crate::dependency::{Dependency, Ecosystem};

/// Cargo lock file (`Cargo.lock`).
pub struct CargoLockParser;

#[derive(Debug, Deserialize)]
struct CargoLock {
    #[serde(default, rename = "package")]
    packages: Vec<LockedPackage>,
}

#[derive(Debug, Deserialize)]
struct LockedPackage {
    name: String,
    // Workspace members and path dependencies carry no source.
    #[serde(default)]
    source: Option<String>,
}

impl ManifestParser for CargoLockParser {
    fn is_supported(&self, path: &Path) -> bool {
        file_name_is(path, "Cargo.lock")
    }

    fn get_dependencies(&self, path: &Path, ignore: &BTreeSet<String>) -> Result<Vec<Dependency>> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        parse_cargo_lock(&content, ignore)
    }

    fn name(&self) -> &'static str {
        "Cargo.lock"
    }
}

fn parse_cargo_lock(content: &str, ignore: &BTreeSet<String>) -> Result<Vec<Dependency>> {
    let lock: CargoLock = toml::from_str(content).context("invalid Cargo.lock")?;
    let names = lock
        .packages
        .into_iter()
        .filter(|p| p.source.is_some())
        .map(|p| p.name);
    Ok(declared(names, Ecosystem::Cargo, ignore))
}
