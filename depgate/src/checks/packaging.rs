use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use super::job_match::{self, Classification};
use super::{Check, CheckResult};
use crate::github::RepoClient;
use crate::repo_ref::RepositoryHandle;
use crate::workflow;

pub const CHECK_PACKAGING: &str = "Packaging";

const WORKFLOW_DIR: &str = ".github/workflows/";

/// Whether the repository publishes its packages from a CI workflow that
/// has actually run successfully.
pub struct PackagingCheck {
    client: Arc<dyn RepoClient>,
}

impl PackagingCheck {
    pub fn new(client: Arc<dyn RepoClient>) -> Self {
        Self { client }
    }
}

fn is_workflow_file(path: &str) -> bool {
    let lower = path.to_lowercase();
    lower.starts_with(WORKFLOW_DIR) && (lower.ends_with(".yml") || lower.ends_with(".yaml"))
}

fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

#[async_trait]
impl Check for PackagingCheck {
    #[instrument(skip(self), fields(repo = %repo))]
    async fn run(&self, repo: &RepositoryHandle) -> Result<CheckResult> {
        let files = self
            .client
            .list_files(repo, &is_workflow_file)
            .await
            .context("failed to list workflow files")?;

        let mut unused: Option<(String, Classification)> = None;

        for path in files {
            let content = self
                .client
                .get_file_content(repo, &path)
                .await
                .with_context(|| format!("failed to read {path}"))?;
            // A workflow we cannot read makes the whole check unevaluable.
            let parsed = workflow::parse_workflow(&content)
                .with_context(|| format!("failed to parse {path}"))?;

            let Some(classification) = job_match::classify(&parsed) else {
                debug!(path = %path, "not a publishing workflow");
                continue;
            };
            debug!(
                path = %path,
                job = %classification.job,
                label = classification.label,
                "{}",
                classification.description
            );

            let runs = self
                .client
                .list_successful_workflow_runs(repo, file_name(&path))
                .await
                .with_context(|| format!("failed to list runs of {path}"))?;

            if let Some(run) = runs.first() {
                info!(path = %path, run = %run.url, "publishing workflow used in a successful run");
                return Ok(CheckResult::max_score(
                    CHECK_PACKAGING,
                    format!(
                        "{} publishing workflow {path} succeeded in run {}",
                        classification.label, run.url
                    ),
                ));
            }

            debug!(path = %path, "publishing workflow never succeeded");
            unused.get_or_insert((path, classification));
        }

        if let Some((path, classification)) = unused {
            warn!(path = %path, "publishing workflow present but unused");
            return Ok(CheckResult::min_score(
                CHECK_PACKAGING,
                format!(
                    "{} publishing workflow {path} present but unused",
                    classification.label
                ),
            ));
        }

        debug!("no publishing workflow detected");
        Ok(CheckResult::inconclusive(
            CHECK_PACKAGING,
            "no publishing workflow detected",
        ))
    }

    fn name(&self) -> &'static str {
        CHECK_PACKAGING
    }
}
