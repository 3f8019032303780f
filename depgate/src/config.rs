use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::checks::{CheckRegistry, MAX_CONFIDENCE, MAX_SCORE};
use crate::error::GateError;

/// A check that must pass for every evaluated dependency, enforced only when
/// the check reports at least `confidence`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequiredCheck {
    pub name: String,
    pub confidence: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    #[serde(default)]
    pub min_score: u8,
    #[serde(default)]
    pub required_checks: Vec<RequiredCheck>,
    #[serde(default, rename = "ignore_dependencies")]
    pub ignore: BTreeSet<String>,
}

impl FromStr for PolicyConfig {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // An empty document is a policy with every default.
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: PolicyConfig =
            serde_yaml::from_str(s).map_err(|e| GateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

impl PolicyConfig {
    pub fn load(path: &Path) -> Result<Self, GateError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GateError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        content.parse()
    }

    fn validate(&self) -> Result<(), GateError> {
        if self.min_score > MAX_SCORE {
            return Err(GateError::Config(format!(
                "min_score {} is out of range 0..={MAX_SCORE}",
                self.min_score
            )));
        }
        for required in &self.required_checks {
            if required.confidence > MAX_CONFIDENCE {
                return Err(GateError::Config(format!(
                    "confidence {} for required check {:?} is out of range 0..={MAX_CONFIDENCE}",
                    required.confidence, required.name
                )));
            }
        }
        Ok(())
    }

    /// Every required check must name a registered check.
    pub fn validate_against(&self, registry: &CheckRegistry) -> Result<(), GateError> {
        for required in &self.required_checks {
            if !registry.contains(&required.name) {
                return Err(GateError::Config(format!(
                    "required check {:?} is not a registered check (known: {})",
                    required.name,
                    registry.names().collect::<Vec<_>>().join(", ")
                )));
            }
        }
        Ok(())
    }
}
