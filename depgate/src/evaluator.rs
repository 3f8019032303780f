use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, instrument, warn};

use crate::checks::{CheckRegistry, CheckResult, Score};
use crate::context::{Diagnostic, DiagnosticKind};
use crate::dependency::Dependency;
use crate::repo_ref::RepositoryHandle;
use crate::resolve::ResolvedDependency;

/// Shared abort flag. Tasks consult it before starting work; a check that
/// has started always runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Every check result for one repository.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateResult {
    pub dependency: Dependency,
    pub repository: RepositoryHandle,
    pub score: Score,
    pub checks: Vec<CheckResult>,
}

impl AggregateResult {
    pub fn new(dependency: Dependency, repository: RepositoryHandle, checks: Vec<CheckResult>) -> Self {
        Self {
            dependency,
            repository,
            score: aggregate_score(&checks),
            checks,
        }
    }

    pub fn check(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.check == name)
    }
}

/// Floor of the mean of the conclusive scores; inconclusive when there are
/// none.
pub fn aggregate_score(checks: &[CheckResult]) -> Score {
    let values: Vec<u32> = checks
        .iter()
        .filter_map(|c| c.score.value())
        .map(u32::from)
        .collect();
    if values.is_empty() {
        return Score::Inconclusive;
    }
    let mean = values.iter().sum::<u32>() / values.len() as u32;
    // The mean of values in 0..=10 fits.
    Score::Value(u8::try_from(mean).unwrap_or(u8::MAX))
}

#[derive(Debug, Default)]
pub struct Evaluation {
    /// In input order.
    pub aggregates: Vec<AggregateResult>,
    pub diagnostics: Vec<Diagnostic>,
}

struct UnitOutcome {
    index: usize,
    aggregate: Option<AggregateResult>,
    diagnostics: Vec<Diagnostic>,
}

/// Runs the full check set against each repository on a bounded worker pool.
#[derive(Clone)]
pub struct ConcurrentEvaluator {
    registry: Arc<CheckRegistry>,
    max_concurrency: usize,
    cancel: CancelSignal,
}

impl ConcurrentEvaluator {
    pub fn new(registry: Arc<CheckRegistry>, max_concurrency: usize, cancel: CancelSignal) -> Self {
        Self {
            registry,
            max_concurrency: max_concurrency.max(1),
            cancel,
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Evaluate every repository. Returns only after every dispatched task has
    /// reported back.
    #[instrument(skip(self, repos), fields(repo_count = repos.len(), max_concurrency = self.max_concurrency))]
    pub async fn evaluate(&self, repos: Vec<ResolvedDependency>) -> Evaluation {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let (tx, mut rx) = mpsc::channel::<UnitOutcome>(self.max_concurrency);

        let mut handles = Vec::with_capacity(repos.len());
        for (index, resolved) in repos.into_iter().enumerate() {
            let sem = Arc::clone(&semaphore);
            let registry = Arc::clone(&self.registry);
            let cancel = self.cancel.clone();
            let tx = tx.clone();
            handles.push((
                resolved.dependency.name.clone(),
                tokio::spawn(async move {
                    // The semaphore is never closed.
                    let Ok(_permit) = sem.acquire_owned().await else {
                        return;
                    };
                    let outcome = evaluate_unit(index, resolved, &registry, &cancel).await;
                    // The receiver outlives every sender.
                    let _ = tx.send(outcome).await;
                }),
            ));
        }
        // The channel closes once the last task drops its sender.
        drop(tx);

        let mut outcomes = Vec::with_capacity(handles.len());
        while let Some(outcome) = rx.recv().await {
            outcomes.push(outcome);
        }

        let mut evaluation = Evaluation::default();
        for (name, result) in join_all(handles.into_iter().map(|(name, handle)| async move {
            (name, handle.await)
        }))
        .await
        {
            if let Err(e) = result {
                warn!(dependency = %name, error = %e, "evaluation task failed");
                evaluation.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::CheckRuntime,
                    name,
                    format!("evaluation task failed: {e}"),
                ));
            }
        }

        outcomes.sort_by_key(|o| o.index);
        for outcome in outcomes {
            evaluation.diagnostics.extend(outcome.diagnostics);
            evaluation.aggregates.extend(outcome.aggregate);
        }
        evaluation
    }
}

async fn evaluate_unit(
    index: usize,
    resolved: ResolvedDependency,
    registry: &CheckRegistry,
    cancel: &CancelSignal,
) -> UnitOutcome {
    let ResolvedDependency {
        dependency,
        repository,
    } = resolved;

    if cancel.is_cancelled() {
        debug!(dependency = %dependency.name, "cancelled before evaluation");
        return UnitOutcome {
            index,
            aggregate: None,
            diagnostics: vec![Diagnostic::new(
                DiagnosticKind::Cancelled,
                dependency.name,
                "evaluation not started",
            )],
        };
    }

    // One task per check: a panicking check loses only its own result.
    let handles: Vec<_> = registry
        .checks()
        .map(|check| {
            let check = Arc::clone(check);
            let repository = repository.clone();
            (check.name(), tokio::spawn(async move { check.run(&repository).await }))
        })
        .collect();
    let results = join_all(
        handles
            .into_iter()
            .map(|(name, handle)| async move { (name, handle.await) }),
    )
    .await;

    let mut checks = Vec::with_capacity(results.len());
    let mut diagnostics = Vec::new();
    for (name, joined) in results {
        let outcome = match joined {
            Ok(Ok(result)) => result.validate().map(|()| result),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(anyhow::anyhow!("check task failed: {e}")),
        };
        match outcome {
            Ok(result) => {
                debug!(dependency = %dependency.name, check = name, score = %result.score, "check complete");
                checks.push(result);
            }
            Err(e) => {
                let message = format!("{e:#}");
                warn!(dependency = %dependency.name, check = name, error = %message, "check failed");
                diagnostics.push(Diagnostic::for_check(dependency.name.clone(), name, message));
            }
        }
    }

    UnitOutcome {
        index,
        aggregate: Some(AggregateResult::new(dependency, repository, checks)),
        diagnostics,
    }
}
