use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ResolutionFailure;

/// The only host downstream checks can read.
pub const SUPPORTED_HOST: &str = "github.com";

/// Canonical `(host, owner, name)` of a source repository.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RepositoryHandle {
    pub host: String,
    pub owner: String,
    pub name: String,
}

impl RepositoryHandle {
    pub fn new(host: impl Into<String>, owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Normalise a repository URL as published in package metadata.
    ///
    /// Accepts `https://`, `http://`, `git+https://`, `git://`, `ssh://git@`
    /// and scp-like `git@host:owner/name` forms; a `.git` suffix and any path
    /// below the repository (`/tree/main/sub`) are dropped.
    pub fn from_url(url: &str) -> Result<Self, ResolutionFailure> {
        let invalid = |reason: &str| ResolutionFailure::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = url.trim();
        let rest = trimmed.strip_prefix("git+").unwrap_or(trimmed);
        let rest = if let Some((scheme, after)) = rest.split_once("://") {
            if !matches!(scheme, "https" | "http" | "git" | "ssh") {
                return Err(invalid("unsupported scheme"));
            }
            after.to_string()
        } else if let Some(scp) = rest.strip_prefix("git@") {
            // git@github.com:owner/name.git
            scp.replacen(':', "/", 1)
        } else {
            return Err(invalid("missing scheme"));
        };

        // Drop credentials (`git@`, `user:token@`) ahead of the host.
        let rest = match rest.split_once('/') {
            Some((authority, path)) if authority.contains('@') => {
                let host = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
                format!("{host}/{path}")
            }
            _ => rest,
        };

        let rest = rest.split(['?', '#']).next().unwrap_or_default();
        let mut segments = rest.split('/').filter(|s| !s.is_empty());
        let (Some(host), Some(owner), Some(name)) = (segments.next(), segments.next(), segments.next())
        else {
            return Err(invalid("expected host/owner/name"));
        };

        let host = host.split(':').next().unwrap_or(host).to_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
        let name = name.strip_suffix(".git").unwrap_or(name);
        if name.is_empty() {
            return Err(invalid("empty repository name"));
        }

        Ok(Self::new(host, owner, name))
    }

    pub fn is_supported(&self) -> bool {
        self.host == SUPPORTED_HOST
    }
}

impl FromStr for RepositoryHandle {
    type Err = ResolutionFailure;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_url(s)
    }
}

impl fmt::Display for RepositoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.host, self.owner, self.name)
    }
}
