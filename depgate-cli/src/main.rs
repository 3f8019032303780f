mod cli;

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use depgate::github::GitHubClient;
use depgate::metadata::PackageMetadataClient;
use depgate::output::formatter;
use depgate::{CancelSignal, CheckRegistry, GateBuilder, PolicyConfig};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use cli::Cli;

const EXIT_FAIL: u8 = 1;
const EXIT_ERROR: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    init_tracing(&args);

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_FAIL),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn init_tracing(args: &Cli) {
    let filter = EnvFilter::builder()
        .with_default_directive(args.verbosity.tracing_level_filter().into())
        .from_env_lossy();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if args.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Ok(true) when the gate passes.
async fn run(args: Cli) -> anyhow::Result<bool> {
    let config = match &args.config {
        Some(path) => PolicyConfig::load(path)?,
        None => PolicyConfig::default(),
    };

    let repo_client = GitHubClient::with_base_urls(
        args.github_token.clone(),
        args.api_base_url.as_str(),
        args.raw_base_url.as_str(),
    )?;
    if !repo_client.has_token() {
        warn!("no GitHub token; API requests are heavily rate limited");
    }
    let registry = CheckRegistry::with_defaults(Arc::new(repo_client))?;
    let mut metadata =
        PackageMetadataClient::with_base_urls(args.crates_base_url.as_str(), args.npm_base_url.as_str())?;
    if let Some(go_base) = &args.go_base_url {
        metadata = metadata.with_go_base_url(go_base.as_str());
    }

    let cancel = CancelSignal::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted; finishing in-flight checks");
                cancel.cancel();
            }
        });
    }

    let gate = GateBuilder::new(Arc::new(metadata), registry)
        .max_concurrency(args.max_concurrency)
        .cancel_signal(cancel)
        .build();
    debug!(checks = ?gate.registry().names().collect::<Vec<_>>(), "gate ready");

    let outcome = gate.run(&args.manifest, &config).await?;

    let mut stdout = std::io::stdout().lock();
    formatter(args.json)
        .write_outcome(&outcome, &mut stdout)
        .context("failed to write outcome")?;
    stdout.flush().context("failed to write outcome")?;
    Ok(outcome.passed())
}
