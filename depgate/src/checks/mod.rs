pub mod job_match;
pub mod packaging;
pub mod security_policy;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::GateError;
use crate::github::RepoClient;
use crate::repo_ref::RepositoryHandle;

pub use packaging::PackagingCheck;
pub use security_policy::SecurityPolicyCheck;

pub const MAX_SCORE: u8 = 10;
pub const MIN_SCORE: u8 = 0;
pub const MAX_CONFIDENCE: u8 = 10;
pub const MIN_CONFIDENCE: u8 = 0;

/// A check's score: a value in `0..=10`, or no evidence either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Score {
    Value(u8),
    Inconclusive,
}

impl Score {
    pub fn value(self) -> Option<u8> {
        match self {
            Score::Value(v) => Some(v),
            Score::Inconclusive => None,
        }
    }

    pub fn is_inconclusive(self) -> bool {
        self == Score::Inconclusive
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Value(v) => write!(f, "{v}"),
            Score::Inconclusive => write!(f, "inconclusive"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub check: String,
    pub score: Score,
    pub confidence: u8,
    pub pass: bool,
    pub reason: String,
}

impl CheckResult {
    pub fn max_score(check: &str, reason: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            score: Score::Value(MAX_SCORE),
            confidence: MAX_CONFIDENCE,
            pass: true,
            reason: reason.into(),
        }
    }

    pub fn min_score(check: &str, reason: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            score: Score::Value(MIN_SCORE),
            confidence: MAX_CONFIDENCE,
            pass: false,
            reason: reason.into(),
        }
    }

    /// Scores and confidences must lie in `0..=10`.
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(v) = self.score.value().filter(|v| *v > MAX_SCORE) {
            anyhow::bail!("{} reported score {v} outside {MIN_SCORE}..={MAX_SCORE}", self.check);
        }
        if self.confidence > MAX_CONFIDENCE {
            anyhow::bail!(
                "{} reported confidence {} outside {MIN_CONFIDENCE}..={MAX_CONFIDENCE}",
                self.check,
                self.confidence
            );
        }
        Ok(())
    }

    /// No evidence was found. Never enforceable by a confidence threshold
    /// above zero.
    pub fn inconclusive(check: &str, reason: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            score: Score::Inconclusive,
            confidence: MIN_CONFIDENCE,
            pass: false,
            reason: reason.into(),
        }
    }
}

/// A pluggable security-posture check over one repository.
///
/// An `Err` means the repository could not be evaluated; it must never be
/// reported as a low score.
#[async_trait]
pub trait Check: Send + Sync {
    async fn run(&self, repo: &RepositoryHandle) -> anyhow::Result<CheckResult>;
    fn name(&self) -> &'static str;
}

/// The named set of checks run against every evaluated repository. Built once
/// at startup and shared read-only.
#[derive(Clone, Default)]
pub struct CheckRegistry {
    checks: BTreeMap<&'static str, Arc<dyn Check>>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in check reading through `client`.
    pub fn with_defaults(client: Arc<dyn RepoClient>) -> Result<Self, GateError> {
        let mut registry = Self::new();
        registry.register(PackagingCheck::new(client.clone()))?;
        registry.register(SecurityPolicyCheck::new(client))?;
        Ok(registry)
    }

    pub fn register(&mut self, check: impl Check + 'static) -> Result<(), GateError> {
        self.register_arc(Arc::new(check))
    }

    pub fn register_arc(&mut self, check: Arc<dyn Check>) -> Result<(), GateError> {
        let name = check.name();
        if self.checks.contains_key(name) {
            return Err(GateError::Registry(name.to_string()));
        }
        self.checks.insert(name, check);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.checks.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.checks.keys().copied()
    }

    /// Checks in name order.
    pub fn checks(&self) -> impl Iterator<Item = &Arc<dyn Check>> {
        self.checks.values()
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}
