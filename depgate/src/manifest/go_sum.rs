use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result, bail};

use super::{ManifestParser, declared, file_name_is};
use crate::dependency::{Dependency, Ecosystem};

/// Go module checksum database (`go.sum`).
pub struct GoSumParser;

impl ManifestParser for GoSumParser {
    fn is_supported(&self, path: &Path) -> bool {
        file_name_is(path, "go.sum")
    }

    fn get_dependencies(&self, path: &Path, ignore: &BTreeSet<String>) -> Result<Vec<Dependency>> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        parse_go_sum(&content, ignore)
    }

    fn name(&self) -> &'static str {
        "go.sum"
    }
}

/// Each non-blank line is `module version hash`; a module appears once per
/// version and again for its `/go.mod` hash.
fn parse_go_sum(content: &str, ignore: &BTreeSet<String>) -> Result<Vec<Dependency>> {
    let mut modules = Vec::new();
    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [module, version, hash] = fields.as_slice() else {
            bail!("line {}: expected `module version hash`, found {} fields", i + 1, fields.len());
        };
        if !hash.starts_with("h1:") {
            bail!("line {}: unrecognised hash {hash:?} for {module}", i + 1);
        }
        if !version.starts_with('v') {
            bail!("line {}: invalid version {version:?} for {module}", i + 1);
        }
        modules.push(module.to_string());
    }
    Ok(declared(modules, Ecosystem::Go, ignore))
}
