mod cargo_lock;
mod go_sum;
mod npm_lock;

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use tracing::{debug, warn};

use crate::context::{Diagnostic, DiagnosticKind};
use crate::dependency::{Dependency, Ecosystem};
use crate::error::GateError;

pub use cargo_lock::CargoLockParser;
pub use go_sum::GoSumParser;
pub use npm_lock::NpmLockParser;

/// One implementation per lock file format.
pub trait ManifestParser: Send + Sync {
    fn is_supported(&self, path: &Path) -> bool;
    fn get_dependencies(&self, path: &Path, ignore: &BTreeSet<String>) -> anyhow::Result<Vec<Dependency>>;
    fn name(&self) -> &'static str;
}

pub fn default_parsers() -> Vec<Box<dyn ManifestParser>> {
    vec![
        Box::new(GoSumParser),
        Box::new(CargoLockParser),
        Box::new(NpmLockParser),
    ]
}

/// Read the declared dependencies of `path` with the first parser that
/// supports it.
///
/// An unsupported manifest yields no dependencies and a diagnostic. A
/// malformed one fails the run.
pub fn read_manifest(
    parsers: &[Box<dyn ManifestParser>],
    path: &Path,
    ignore: &BTreeSet<String>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Vec<Dependency>, GateError> {
    let Some(parser) = parsers.iter().find(|p| p.is_supported(path)) else {
        warn!(manifest = %path.display(), "no parser supports this manifest");
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::UnsupportedManifest,
            path.display().to_string(),
            "no parser supports this manifest; nothing to evaluate",
        ));
        return Ok(vec![]);
    };

    let deps = parser
        .get_dependencies(path, ignore)
        .map_err(|e| GateError::parse(path, e))?;
    debug!(parser = parser.name(), count = deps.len(), "read manifest");
    Ok(deps)
}

fn file_name_is(path: &Path, expected: &str) -> bool {
    path.file_name().is_some_and(|name| name == expected)
}

/// Build the dependency list from raw names: first appearance wins, ignored
/// names are dropped.
fn declared(
    names: impl IntoIterator<Item = String>,
    ecosystem: Ecosystem,
    ignore: &BTreeSet<String>,
) -> Vec<Dependency> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|name| {
            if ignore.contains(name) {
                debug!(dependency = %name, "ignoring dependency");
                return false;
            }
            seen.insert(name.clone())
        })
        .map(|name| Dependency::new(name, ecosystem))
        .collect()
}
