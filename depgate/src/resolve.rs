use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::context::{Diagnostic, DiagnosticKind};
use crate::dependency::Dependency;
use crate::error::ResolutionFailure;
use crate::metadata::{Lookup, MetadataSource};
use crate::repo_ref::RepositoryHandle;

/// A dependency whose source repository is on the supported host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedDependency {
    pub dependency: Dependency,
    pub repository: RepositoryHandle,
}

/// Maps dependency names to canonical repository handles through a
/// package-metadata source.
#[derive(Clone)]
pub struct RepositoryResolver {
    source: Arc<dyn MetadataSource>,
    max_concurrency: usize,
}

impl RepositoryResolver {
    pub fn new(source: Arc<dyn MetadataSource>, max_concurrency: usize) -> Self {
        Self {
            source,
            max_concurrency: max_concurrency.max(1),
        }
    }

    #[instrument(skip(self), fields(dependency = %dependency.name))]
    pub async fn resolve(&self, dependency: &Dependency) -> Result<RepositoryHandle, ResolutionFailure> {
        let lookup = self
            .source
            .source_repository(dependency)
            .await
            .map_err(ResolutionFailure::Transport)?;

        let url = match lookup {
            Lookup::Repository(url) => url,
            Lookup::NoRepository => return Err(ResolutionFailure::NoRepository),
            Lookup::NotFound => {
                return Err(ResolutionFailure::NotFound {
                    ecosystem: dependency.ecosystem.to_string(),
                });
            }
        };

        let handle = RepositoryHandle::from_url(&url)?;
        if !handle.is_supported() {
            return Err(ResolutionFailure::UnsupportedHost(handle.host));
        }
        Ok(handle)
    }

    /// Resolve every dependency, keeping manifest order. Failures drop the
    /// dependency and are recorded in `diagnostics`.
    pub async fn resolve_all(
        &self,
        dependencies: Vec<Dependency>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<ResolvedDependency> {
        let outcomes: Vec<(Dependency, Result<RepositoryHandle, ResolutionFailure>)> =
            stream::iter(dependencies)
                .map(|dependency| async move {
                    let result = self.resolve(&dependency).await;
                    (dependency, result)
                })
                .buffered(self.max_concurrency)
                .collect()
                .await;

        let mut resolved = Vec::with_capacity(outcomes.len());
        for (dependency, result) in outcomes {
            match result {
                Ok(repository) => {
                    debug!(dependency = %dependency.name, repository = %repository, "resolved");
                    resolved.push(ResolvedDependency {
                        dependency,
                        repository,
                    });
                }
                Err(e) => {
                    warn!(dependency = %dependency.name, error = %e, "dropping unresolvable dependency");
                    diagnostics.push(Diagnostic::new(
                        DiagnosticKind::Resolution,
                        dependency.name,
                        e.to_string(),
                    ));
                }
            }
        }
        resolved
    }
}
