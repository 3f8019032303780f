use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::repo_ref::RepositoryHandle;

pub const GITHUB_API_BASE: &str = "https://api.github.com";
pub const GITHUB_RAW_BASE: &str = "https://raw.githubusercontent.com";

const RUNS_PER_PAGE: u32 = 10;

/// One historical run of a workflow file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowRun {
    pub url: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// Read access to a repository's contents and CI history. Every check reads
/// repositories only through this.
#[async_trait]
pub trait RepoClient: Send + Sync {
    /// Paths of every file in the default branch accepted by `predicate`.
    async fn list_files(
        &self,
        repo: &RepositoryHandle,
        predicate: &(dyn for<'p> Fn(&'p str) -> bool + Send + Sync),
    ) -> Result<Vec<String>>;

    async fn get_file_content(&self, repo: &RepositoryHandle, path: &str) -> Result<Vec<u8>>;

    /// Successful runs of `.github/workflows/<workflow_file_name>`, newest first.
    async fn list_successful_workflow_runs(
        &self,
        repo: &RepositoryHandle,
        workflow_file_name: &str,
    ) -> Result<Vec<WorkflowRun>>;
}

#[derive(Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct RunsResponse {
    #[serde(default)]
    workflow_runs: Vec<RunEntry>,
}

#[derive(Deserialize)]
struct RunEntry {
    html_url: String,
    #[serde(default)]
    conclusion: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    token: Option<String>,
    api_base: String,
    raw_base: String,
}

impl GitHubClient {
    pub fn new(token: Option<String>) -> Result<Self> {
        Self::with_base_urls(token, GITHUB_API_BASE, GITHUB_RAW_BASE)
    }

    pub fn with_base_urls(
        token: Option<String>,
        api_base: impl Into<String>,
        raw_base: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("depgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            token,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            raw_base: raw_base.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        request
    }

    #[instrument(skip(self))]
    async fn api_get_optional(&self, url: &str) -> Result<Option<Value>> {
        let response = self
            .request(url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            bail!("{url} returned HTTP {status}");
        }

        let json = response
            .json()
            .await
            .with_context(|| format!("failed to parse JSON from {url}"))?;
        Ok(Some(json))
    }

    #[instrument(skip(self))]
    async fn api_get(&self, url: &str) -> Result<Value> {
        self.api_get_optional(url)
            .await?
            .ok_or_else(|| anyhow::anyhow!("{url} returned HTTP 404"))
    }
}

#[async_trait]
impl RepoClient for GitHubClient {
    #[instrument(skip(self, predicate), fields(repo = %repo))]
    async fn list_files(
        &self,
        repo: &RepositoryHandle,
        predicate: &(dyn for<'p> Fn(&'p str) -> bool + Send + Sync),
    ) -> Result<Vec<String>> {
        let url = format!(
            "{}/repos/{}/{}/git/trees/HEAD?recursive=1",
            self.api_base, repo.owner, repo.name
        );
        let json = self.api_get(&url).await?;
        let tree: TreeResponse =
            serde_json::from_value(json).context("failed to deserialize git tree")?;
        if tree.truncated {
            tracing::warn!(repo = %repo, "git tree listing truncated; some files are not visible");
        }

        Ok(tree
            .tree
            .into_iter()
            .filter(|entry| entry.kind == "blob" && predicate(entry.path.as_str()))
            .map(|entry| entry.path)
            .collect())
    }

    #[instrument(skip(self), fields(repo = %repo))]
    async fn get_file_content(&self, repo: &RepositoryHandle, path: &str) -> Result<Vec<u8>> {
        let url = format!("{}/{}/{}/HEAD/{path}", self.raw_base, repo.owner, repo.name);
        let response = self
            .request(&url)
            .send()
            .await
            .with_context(|| format!("failed to fetch {url}"))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            bail!("{path} not found in {repo}");
        }
        if !status.is_success() {
            bail!("{url} returned HTTP {status}");
        }

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("failed to read body from {url}"))?;
        Ok(bytes.to_vec())
    }

    #[instrument(skip(self), fields(repo = %repo))]
    async fn list_successful_workflow_runs(
        &self,
        repo: &RepositoryHandle,
        workflow_file_name: &str,
    ) -> Result<Vec<WorkflowRun>> {
        let url = format!(
            "{}/repos/{}/{}/actions/workflows/{workflow_file_name}/runs?status=success&per_page={RUNS_PER_PAGE}",
            self.api_base, repo.owner, repo.name
        );
        // Unknown to Actions: the file exists but was never registered as a workflow.
        let Some(json) = self.api_get_optional(&url).await? else {
            return Ok(vec![]);
        };
        let runs: RunsResponse =
            serde_json::from_value(json).context("failed to deserialize workflow runs")?;

        Ok(runs
            .workflow_runs
            .into_iter()
            .filter(|run| run.conclusion.as_deref() == Some("success"))
            .map(|run| WorkflowRun {
                url: run.html_url,
                status: run.status,
                timestamp: run.created_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn repo() -> RepositoryHandle {
        RepositoryHandle::new("github.com", "octo", "widget")
    }

    fn client_for(server: &MockServer, token: Option<&str>) -> GitHubClient {
        GitHubClient::with_base_urls(token.map(String::from), server.uri(), server.uri()).unwrap()
    }

    #[test]
    fn has_token_reflects_construction() {
        assert!(GitHubClient::new(Some("tok".into())).unwrap().has_token());
        assert!(!GitHubClient::new(None).unwrap().has_token());
    }

    #[tokio::test]
    async fn list_files_filters_blobs_by_predicate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/widget/git/trees/HEAD"))
            .and(query_param("recursive", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tree": [
                    {"path": ".github", "type": "tree"},
                    {"path": ".github/workflows", "type": "tree"},
                    {"path": ".github/workflows/release.yml", "type": "blob"},
                    {"path": "README.md", "type": "blob"}
                ],
                "truncated": false
            })))
            .mount(&server)
            .await;

        let files = client_for(&server, None)
            .list_files(&repo(), &|p: &str| p.starts_with(".github/"))
            .await
            .unwrap();
        assert_eq!(files, vec![".github/workflows/release.yml".to_string()]);
    }

    #[tokio::test]
    async fn list_files_missing_repo_is_error() {
        let server = MockServer::start().await;
        let result = client_for(&server, None).list_files(&repo(), &|_: &str| true).await;
        assert!(result.unwrap_err().to_string().contains("404"));
    }

    #[tokio::test]
    async fn get_file_content_sends_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/octo/widget/HEAD/SECURITY.md"))
            .and(header("Authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string("# Security"))
            .mount(&server)
            .await;

        let content = client_for(&server, Some("secret"))
            .get_file_content(&repo(), "SECURITY.md")
            .await
            .unwrap();
        assert_eq!(content, b"# Security");
    }

    #[tokio::test]
    async fn get_file_content_not_found() {
        let server = MockServer::start().await;
        let err = client_for(&server, None)
            .get_file_content(&repo(), "missing.yml")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing.yml not found"));
    }

    #[tokio::test]
    async fn workflow_runs_keep_only_successes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/widget/actions/workflows/release.yml/runs"))
            .and(query_param("status", "success"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_count": 2,
                "workflow_runs": [
                    {
                        "html_url": "https://github.com/octo/widget/actions/runs/2",
                        "status": "completed",
                        "conclusion": "success",
                        "created_at": "2024-05-01T12:00:00Z"
                    },
                    {
                        "html_url": "https://github.com/octo/widget/actions/runs/1",
                        "status": "completed",
                        "conclusion": "failure",
                        "created_at": "2024-04-01T12:00:00Z"
                    }
                ]
            })))
            .mount(&server)
            .await;

        let runs = client_for(&server, None)
            .list_successful_workflow_runs(&repo(), "release.yml")
            .await
            .unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].url, "https://github.com/octo/widget/actions/runs/2");
        assert_eq!(runs[0].status, "completed");
        assert_eq!(runs[0].timestamp.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[tokio::test]
    async fn unregistered_workflow_has_no_runs() {
        let server = MockServer::start().await;
        let runs = client_for(&server, None)
            .list_successful_workflow_runs(&repo(), "publish.yml")
            .await
            .unwrap();
        assert!(runs.is_empty());
    }

    #[tokio::test]
    async fn rate_limited_runs_query_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/widget/actions/workflows/release.yml/runs"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let result = client_for(&server, None)
            .list_successful_workflow_runs(&repo(), "release.yml")
            .await;
        assert!(result.unwrap_err().to_string().contains("403"));
    }
}
