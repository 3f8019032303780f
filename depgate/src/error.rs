use std::path::PathBuf;

use thiserror::Error;

/// Fatal pipeline errors. Any of these aborts the run before a decision is made.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("failed to parse manifest {}: {source:#}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid policy configuration: {0}")]
    Config(String),

    #[error("check {0:?} is registered more than once")]
    Registry(String),

    #[error("evaluation cancelled before every dependency was evaluated")]
    Cancelled,
}

impl GateError {
    pub fn parse(path: impl Into<PathBuf>, source: anyhow::Error) -> Self {
        Self::Parse {
            path: path.into(),
            source,
        }
    }
}

/// Why a dependency could not be mapped to a supported source repository.
///
/// Never fatal: the dependency is dropped from evaluation and the failure is
/// recorded as a diagnostic.
#[derive(Debug, Error)]
pub enum ResolutionFailure {
    #[error("package not found in {ecosystem} metadata")]
    NotFound { ecosystem: String },

    #[error("package metadata declares no source repository")]
    NoRepository,

    #[error("repository host {0} is not supported")]
    UnsupportedHost(String),

    #[error("invalid repository url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("metadata lookup failed: {0:#}")]
    Transport(anyhow::Error),
}
