pub mod checks;
pub mod config;
pub mod context;
pub mod dependency;
pub mod error;
pub mod evaluator;
pub mod gate;
pub mod github;
pub mod manifest;
pub mod metadata;
pub mod output;
pub mod policy;
pub mod repo_ref;
pub mod resolve;
pub mod workflow;

pub use checks::{Check, CheckRegistry, CheckResult, Score};
pub use config::PolicyConfig;
pub use context::{Diagnostic, DiagnosticKind};
pub use dependency::{Dependency, Ecosystem};
pub use error::{GateError, ResolutionFailure};
pub use evaluator::{AggregateResult, CancelSignal, ConcurrentEvaluator};
pub use gate::{Gate, GateBuilder, GateOutcome};
pub use policy::{PolicyEngine, Violation};
pub use repo_ref::RepositoryHandle;
