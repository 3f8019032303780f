use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::dependency::{Dependency, Ecosystem};

pub const CRATES_API_BASE: &str = "https://crates.io";
pub const NPM_REGISTRY_BASE: &str = "https://registry.npmjs.org";

/// What the ecosystem's package metadata says about a package's source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    NotFound,
    NoRepository,
    Repository(String),
}

/// Read-only query from dependency name to declared repository URL.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn source_repository(&self, dependency: &Dependency) -> Result<Lookup>;
}

/// Queries the public registries of every supported ecosystem.
#[derive(Clone)]
pub struct PackageMetadataClient {
    client: reqwest::Client,
    crates_base: String,
    npm_base: String,
    /// Replaces `https://` in front of the module path for the go-get
    /// lookup.
    go_base: Option<String>,
}

impl PackageMetadataClient {
    pub fn new() -> Result<Self> {
        Self::with_base_urls(CRATES_API_BASE, NPM_REGISTRY_BASE)
    }

    pub fn with_base_urls(crates_base: impl Into<String>, npm_base: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("depgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            crates_base: crates_base.into().trim_end_matches('/').to_string(),
            npm_base: npm_base.into().trim_end_matches('/').to_string(),
            go_base: None,
        })
    }

    pub fn with_go_base_url(mut self, go_base: impl Into<String>) -> Self {
        self.go_base = Some(go_base.into().trim_end_matches('/').to_string());
        self
    }

    async fn get_optional(&self, url: &str) -> Result<Option<reqwest::Response>> {
        let response = self
            .client
            .get(url)
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
        Ok(Some(response))
    }

    async fn get_json_optional(&self, url: &str) -> Result<Option<Value>> {
        let Some(response) = self.get_optional(url).await? else {
            return Ok(None);
        };
        let json = response
            .json()
            .await
            .with_context(|| format!("failed to parse JSON from {url}"))?;
        Ok(Some(json))
    }

    async fn crate_repository(&self, name: &str) -> Result<Lookup> {
        let url = format!("{}/api/v1/crates/{name}", self.crates_base);
        let Some(json) = self.get_json_optional(&url).await? else {
            return Ok(Lookup::NotFound);
        };
        Ok(non_empty(json.pointer("/crate/repository").and_then(Value::as_str)))
    }

    async fn npm_repository(&self, name: &str) -> Result<Lookup> {
        // Scoped packages keep their `@` but escape the separator.
        let url = format!("{}/{}", self.npm_base, name.replace('/', "%2F"));
        let Some(json) = self.get_json_optional(&url).await? else {
            return Ok(Lookup::NotFound);
        };
        let repository = json.get("repository");
        let url = repository
            .and_then(Value::as_str)
            .or_else(|| repository.and_then(|r| r.get("url")).and_then(Value::as_str));
        Ok(non_empty(url))
    }

    async fn go_repository(&self, module: &str) -> Result<Lookup> {
        if let Some(url) = github_module_url(module) {
            return Ok(Lookup::Repository(url));
        }

        let url = match &self.go_base {
            Some(base) => format!("{base}/{module}?go-get=1"),
            None => format!("https://{module}?go-get=1"),
        };
        let Some(response) = self.get_optional(&url).await? else {
            return Ok(Lookup::NotFound);
        };
        let html = response
            .text()
            .await
            .with_context(|| format!("failed to read body from {url}"))?;
        Ok(go_import_repository(&html, module).map_or(Lookup::NoRepository, Lookup::Repository))
    }
}

#[async_trait]
impl MetadataSource for PackageMetadataClient {
    #[instrument(skip(self), fields(dependency = %dependency.name, ecosystem = %dependency.ecosystem))]
    async fn source_repository(&self, dependency: &Dependency) -> Result<Lookup> {
        let lookup = match dependency.ecosystem {
            Ecosystem::Go => self.go_repository(&dependency.name).await?,
            Ecosystem::Cargo => self.crate_repository(&dependency.name).await?,
            Ecosystem::Npm => self.npm_repository(&dependency.name).await?,
        };
        debug!(?lookup, "metadata lookup complete");
        Ok(lookup)
    }
}

fn non_empty(url: Option<&str>) -> Lookup {
    match url.map(str::trim) {
        Some(url) if !url.is_empty() => Lookup::Repository(url.to_string()),
        _ => Lookup::NoRepository,
    }
}

/// `github.com/owner/repo/v2/sub` is hosted at `https://github.com/owner/repo`.
fn github_module_url(module: &str) -> Option<String> {
    let rest = module.strip_prefix("github.com/")?;
    let mut segments = rest.split('/');
    let (Some(owner), Some(repo)) = (segments.next(), segments.next()) else {
        return None;
    };
    Some(format!("https://github.com/{owner}/{repo}"))
}

static GO_IMPORT_META: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<meta\s+name="go-import"\s+content="([^"]+)""#).expect("valid go-import regex")
});

/// Pick the repository root from the `go-import` meta tags whose import
/// prefix covers `module`.
fn go_import_repository(html: &str, module: &str) -> Option<String> {
    GO_IMPORT_META
        .captures_iter(html)
        .filter_map(|caps| {
            let content = caps.get(1)?.as_str();
            let mut fields = content.split_whitespace();
            let (prefix, vcs, repo) = (fields.next()?, fields.next()?, fields.next()?);
            let covers = module == prefix || module.starts_with(&format!("{prefix}/"));
            (covers && vcs == "git").then(|| repo.to_string())
        })
        .next()
}
