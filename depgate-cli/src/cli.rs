use std::path::PathBuf;

use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use depgate::github::{GITHUB_API_BASE, GITHUB_RAW_BASE};
use depgate::metadata::{CRATES_API_BASE, NPM_REGISTRY_BASE};

/// Gate a project's dependencies on the security posture of their source repositories
#[derive(Parser)]
#[command(name = "depgate", version)]
pub struct Cli {
    /// Dependency lock file to evaluate (go.sum, Cargo.lock, package-lock.json)
    #[arg(short, long)]
    pub manifest: PathBuf,

    /// Policy file (YAML); every threshold defaults to zero when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// GitHub token for API requests
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Maximum number of repositories evaluated at once
    #[arg(long, env = "DEPGATE_MAX_CONCURRENCY", default_value_t = depgate::gate::DEFAULT_MAX_CONCURRENCY)]
    pub max_concurrency: usize,

    /// Write the outcome as JSON
    #[arg(long)]
    pub json: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    pub log_json: bool,

    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    #[arg(long, env = "DEPGATE_API_BASE_URL", default_value = GITHUB_API_BASE, hide = true)]
    pub api_base_url: String,

    #[arg(long, env = "DEPGATE_RAW_BASE_URL", default_value = GITHUB_RAW_BASE, hide = true)]
    pub raw_base_url: String,

    #[arg(long, env = "DEPGATE_CRATES_BASE_URL", default_value = CRATES_API_BASE, hide = true)]
    pub crates_base_url: String,

    #[arg(long, env = "DEPGATE_NPM_BASE_URL", default_value = NPM_REGISTRY_BASE, hide = true)]
    pub npm_base_url: String,

    /// Go vanity import lookups go to `https://<module>` unless set
    #[arg(long, env = "DEPGATE_GO_BASE_URL", hide = true)]
    pub go_base_url: Option<String>,
}
