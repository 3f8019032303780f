use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::checks::CheckRegistry;
use crate::config::PolicyConfig;
use crate::context::Diagnostic;
use crate::error::GateError;
use crate::evaluator::{AggregateResult, CancelSignal, ConcurrentEvaluator};
use crate::manifest::{self, ManifestParser};
use crate::metadata::MetadataSource;
use crate::policy::{PolicyEngine, Violation};
use crate::resolve::RepositoryResolver;

pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Everything one gate run produced.
#[derive(Debug, Default, Serialize)]
pub struct GateOutcome {
    pub aggregates: Vec<AggregateResult>,
    pub violations: Vec<Violation>,
    pub diagnostics: Vec<Diagnostic>,
}

impl GateOutcome {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Manifest in, verdict out: parse, resolve, evaluate, then apply policy.
#[derive(Clone)]
pub struct Gate {
    parsers: Arc<Vec<Box<dyn ManifestParser>>>,
    registry: Arc<CheckRegistry>,
    resolver: RepositoryResolver,
    evaluator: ConcurrentEvaluator,
    cancel: CancelSignal,
}

impl Gate {
    #[instrument(skip(self, manifest_path, config), fields(manifest = %manifest_path.display()))]
    pub async fn run(&self, manifest_path: &Path, config: &PolicyConfig) -> Result<GateOutcome, GateError> {
        config.validate_against(&self.registry)?;

        let mut diagnostics = Vec::new();
        let dependencies =
            manifest::read_manifest(&self.parsers, manifest_path, &config.ignore, &mut diagnostics)?;
        info!(count = dependencies.len(), "dependencies declared");

        let resolved = self.resolver.resolve_all(dependencies, &mut diagnostics).await;
        info!(count = resolved.len(), "dependencies resolved");

        let evaluation = self.evaluator.evaluate(resolved).await;
        diagnostics.extend(evaluation.diagnostics);
        if self.cancel.is_cancelled() {
            warn!("run cancelled; no verdict");
            return Err(GateError::Cancelled);
        }

        let violations = PolicyEngine::new(config).evaluate(&evaluation.aggregates);
        info!(
            evaluated = evaluation.aggregates.len(),
            violations = violations.len(),
            diagnostics = diagnostics.len(),
            "gate complete"
        );
        Ok(GateOutcome {
            aggregates: evaluation.aggregates,
            violations,
            diagnostics,
        })
    }

    pub fn registry(&self) -> &CheckRegistry {
        &self.registry
    }

    pub fn max_concurrency(&self) -> usize {
        self.evaluator.max_concurrency()
    }
}

pub struct GateBuilder {
    parsers: Vec<Box<dyn ManifestParser>>,
    registry: CheckRegistry,
    metadata: Arc<dyn MetadataSource>,
    max_concurrency: usize,
    cancel: CancelSignal,
}

impl GateBuilder {
    pub fn new(metadata: Arc<dyn MetadataSource>, registry: CheckRegistry) -> Self {
        Self {
            parsers: manifest::default_parsers(),
            registry,
            metadata,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            cancel: CancelSignal::new(),
        }
    }

    /// Replace the default lock file parsers.
    pub fn parsers(mut self, parsers: Vec<Box<dyn ManifestParser>>) -> Self {
        self.parsers = parsers;
        self
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n;
        self
    }

    pub fn cancel_signal(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> Gate {
        let registry = Arc::new(self.registry);
        Gate {
            parsers: Arc::new(self.parsers),
            resolver: RepositoryResolver::new(self.metadata, self.max_concurrency),
            evaluator: ConcurrentEvaluator::new(Arc::clone(&registry), self.max_concurrency, self.cancel.clone()),
            registry,
            cancel: self.cancel,
        }
    }
}
