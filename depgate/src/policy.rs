use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::checks::Score;
use crate::config::PolicyConfig;
use crate::evaluator::AggregateResult;

/// A dependency that does not meet the configured policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    BelowMinimumScore {
        dependency: String,
        score: u8,
        min_score: u8,
    },
    RequiredCheckFailed {
        dependency: String,
        check: String,
        confidence: u8,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::BelowMinimumScore {
                dependency,
                score,
                min_score,
            } => write!(
                f,
                "Score of {score} for {dependency} is below the minimum score of {min_score}."
            ),
            Violation::RequiredCheckFailed {
                dependency,
                check,
                confidence,
            } => write!(
                f,
                "Required check {check} did not pass for {dependency} (confidence {confidence})."
            ),
        }
    }
}

/// Applies a policy's thresholds to evaluated repositories.
pub struct PolicyEngine<'a> {
    config: &'a PolicyConfig,
}

impl<'a> PolicyEngine<'a> {
    pub fn new(config: &'a PolicyConfig) -> Self {
        Self { config }
    }

    /// Violations of every repository, in input order. The gate fails iff
    /// this is non-empty.
    pub fn evaluate(&self, aggregates: &[AggregateResult]) -> Vec<Violation> {
        aggregates
            .iter()
            .flat_map(|aggregate| self.evaluate_one(aggregate))
            .collect()
    }

    fn evaluate_one(&self, aggregate: &AggregateResult) -> Vec<Violation> {
        let dependency = &aggregate.dependency.name;
        let mut violations = Vec::new();

        match aggregate.score {
            Score::Value(score) if score < self.config.min_score => {
                violations.push(Violation::BelowMinimumScore {
                    dependency: dependency.clone(),
                    score,
                    min_score: self.config.min_score,
                });
            }
            Score::Value(_) => {}
            Score::Inconclusive => {
                debug!(dependency = %dependency, "aggregate score inconclusive; minimum score not applied");
            }
        }

        for required in &self.config.required_checks {
            let Some(result) = aggregate.check(&required.name) else {
                debug!(dependency = %dependency, check = %required.name, "required check has no result");
                continue;
            };
            // A low-confidence measurement cannot fail a dependency.
            if result.confidence < required.confidence {
                debug!(
                    dependency = %dependency,
                    check = %required.name,
                    confidence = result.confidence,
                    required = required.confidence,
                    "required check below confidence threshold; skipped"
                );
                continue;
            }
            if !result.pass {
                violations.push(Violation::RequiredCheckFailed {
                    dependency: dependency.clone(),
                    check: result.check.clone(),
                    confidence: result.confidence,
                });
            }
        }

        violations
    }
}
