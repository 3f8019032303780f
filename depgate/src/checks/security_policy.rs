use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{Check, CheckResult};
use crate::github::RepoClient;
use crate::repo_ref::RepositoryHandle;

pub const CHECK_SECURITY_POLICY: &str = "Security-Policy";

const POLICY_LOCATIONS: &[&str] = &["security.md", ".github/security.md", "docs/security.md"];

/// Whether the repository tells reporters how to disclose vulnerabilities.
pub struct SecurityPolicyCheck {
    client: Arc<dyn RepoClient>,
}

impl SecurityPolicyCheck {
    pub fn new(client: Arc<dyn RepoClient>) -> Self {
        Self { client }
    }
}

fn is_security_policy(path: &str) -> bool {
    let lower = path.to_lowercase();
    POLICY_LOCATIONS.contains(&lower.as_str())
}

#[async_trait]
impl Check for SecurityPolicyCheck {
    #[instrument(skip(self), fields(repo = %repo))]
    async fn run(&self, repo: &RepositoryHandle) -> Result<CheckResult> {
        let files = self
            .client
            .list_files(repo, &is_security_policy)
            .await
            .context("failed to list repository files")?;

        match files.first() {
            Some(path) => {
                debug!(path = %path, "security policy found");
                Ok(CheckResult::max_score(
                    CHECK_SECURITY_POLICY,
                    format!("security policy file detected: {path}"),
                ))
            }
            None => Ok(CheckResult::min_score(
                CHECK_SECURITY_POLICY,
                "security policy file not detected",
            )),
        }
    }

    fn name(&self) -> &'static str {
        CHECK_SECURITY_POLICY
    }
}
