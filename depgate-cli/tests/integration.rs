use std::process::{Command, Output};

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fixture(name: &str) -> String {
    let dir = env!("CARGO_MANIFEST_DIR");
    format!("{dir}/tests/fixtures/{name}")
}

fn depgate() -> Command {
    Command::new(env!("CARGO_BIN_EXE_depgate"))
}

const RELEASE_WORKFLOW: &str = "\
name: release
on:
  push:
    tags: ['v*']
jobs:
  publish:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - run: cargo publish --locked
        env:
          CARGO_REGISTRY_TOKEN: ${{ secrets.CRATES_TOKEN }}
";

/// Registry and GitHub responses for the `Cargo.lock` fixture.
///
/// ```text
/// alpha -> github.com/acme/alpha  (used release workflow, SECURITY.md)
/// beta  -> github.com/acme/beta   (no workflows, no policy)
/// gamma -> not on the registry
/// ```
async fn setup_mock_server() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/crates/alpha"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "crate": {"name": "alpha", "repository": "https://github.com/acme/alpha.git"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/crates/beta"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "crate": {"name": "beta", "repository": "https://github.com/acme/beta"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/crates/gamma"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/alpha/git/trees/HEAD"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tree": [
                {"path": ".github", "type": "tree"},
                {"path": ".github/workflows", "type": "tree"},
                {"path": ".github/workflows/release.yml", "type": "blob"},
                {"path": "SECURITY.md", "type": "blob"},
                {"path": "src/lib.rs", "type": "blob"}
            ],
            "truncated": false
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/acme/alpha/HEAD/.github/workflows/release.yml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RELEASE_WORKFLOW))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/alpha/actions/workflows/release.yml/runs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": 1,
            "workflow_runs": [{
                "html_url": "https://github.com/acme/alpha/actions/runs/1",
                "status": "completed",
                "conclusion": "success",
                "created_at": "2024-05-01T12:00:00Z"
            }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repos/acme/beta/git/trees/HEAD"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tree": [
                {"path": "README.md", "type": "blob"},
                {"path": "src/main.rs", "type": "blob"}
            ],
            "truncated": false
        })))
        .mount(&server)
        .await;

    server
}

fn run_with_mock(server: &MockServer, args: &[&str]) -> Output {
    depgate()
        .args(args)
        .env("DEPGATE_API_BASE_URL", server.uri())
        .env("DEPGATE_RAW_BASE_URL", server.uri())
        .env("DEPGATE_CRATES_BASE_URL", server.uri())
        .env("DEPGATE_NPM_BASE_URL", server.uri())
        .env("GITHUB_TOKEN", "fake-token")
        .env_remove("DEPGATE_MAX_CONCURRENCY")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to execute")
}

fn exit_code(output: &Output) -> i32 {
    output.status.code().expect("terminated by signal")
}

fn stdout(output: &Output) -> String {
    String::from_utf8(output.stdout.clone()).unwrap()
}

fn stderr(output: &Output) -> String {
    String::from_utf8(output.stderr.clone()).unwrap()
}

#[tokio::test]
async fn default_policy_passes() {
    let server = setup_mock_server().await;
    let output = run_with_mock(&server, &["--manifest", &fixture("Cargo.lock")]);

    assert_eq!(exit_code(&output), 0, "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("alpha (github.com/acme/alpha): score 10"), "{out}");
    assert!(out.contains("beta (github.com/acme/beta): score 0"), "{out}");
    assert!(out.contains("Packaging: 10"), "{out}");
    assert!(out.contains("gamma"), "unresolvable dependency should be reported: {out}");
    assert!(out.contains("PASS: 2 evaluated, 0 violation(s)"), "{out}");
}

#[tokio::test]
async fn low_score_fails_the_gate() {
    let server = setup_mock_server().await;
    let output = run_with_mock(
        &server,
        &[
            "--manifest",
            &fixture("Cargo.lock"),
            "--config",
            &fixture("policy-min-score.yml"),
        ],
    );

    assert_eq!(exit_code(&output), 1, "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert_eq!(
        out.lines().next(),
        Some("Score of 0 for beta is below the minimum score of 5.")
    );
    assert!(!out.contains("for alpha is below"));
}

#[tokio::test]
async fn ignored_dependency_is_not_evaluated() {
    let server = setup_mock_server().await;
    let output = run_with_mock(
        &server,
        &[
            "--manifest",
            &fixture("Cargo.lock"),
            "--config",
            &fixture("policy-ignore-beta.yml"),
        ],
    );

    assert_eq!(exit_code(&output), 0, "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(!out.contains("beta"), "{out}");

    let requests = server.received_requests().await.unwrap();
    assert!(
        requests.iter().all(|r| !r.url.path().contains("beta")),
        "ignored dependency was looked up"
    );
}

#[tokio::test]
async fn failed_required_check_fails_the_gate() {
    let server = setup_mock_server().await;
    let output = run_with_mock(
        &server,
        &[
            "--manifest",
            &fixture("Cargo.lock"),
            "--config",
            &fixture("policy-security-required.yml"),
        ],
    );

    assert_eq!(exit_code(&output), 1, "stderr: {}", stderr(&output));
    assert!(
        stdout(&output)
            .contains("Required check Security-Policy did not pass for beta (confidence 10).")
    );
}

#[tokio::test]
async fn inconclusive_required_check_is_not_enforced() {
    let server = setup_mock_server().await;
    let output = run_with_mock(
        &server,
        &[
            "--manifest",
            &fixture("Cargo.lock"),
            "--config",
            &fixture("policy-packaging-required.yml"),
        ],
    );

    assert_eq!(exit_code(&output), 0, "stderr: {}", stderr(&output));
}

#[tokio::test]
async fn json_output_lists_violations() {
    let server = setup_mock_server().await;
    let output = run_with_mock(
        &server,
        &[
            "--manifest",
            &fixture("Cargo.lock"),
            "--config",
            &fixture("policy-min-score.yml"),
            "--json",
        ],
    );

    assert_eq!(exit_code(&output), 1, "stderr: {}", stderr(&output));
    let value: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let violations = value["violations"].as_array().unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0]["dependency"], "beta");
    assert_eq!(violations[0]["kind"], "below_minimum_score");

    let aggregates = value["aggregates"].as_array().unwrap();
    let names: Vec<_> = aggregates
        .iter()
        .map(|a| a["dependency"]["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["alpha", "beta"]);

    let diagnostics = value["diagnostics"].as_array().unwrap();
    assert_eq!(diagnostics[0]["kind"], "resolution");
    assert_eq!(diagnostics[0]["subject"], "gamma");
}

#[tokio::test]
async fn serial_evaluation_gives_the_same_verdict() {
    let server = setup_mock_server().await;
    let output = run_with_mock(
        &server,
        &[
            "--manifest",
            &fixture("Cargo.lock"),
            "--config",
            &fixture("policy-min-score.yml"),
            "--max-concurrency",
            "1",
        ],
    );

    assert_eq!(exit_code(&output), 1, "stderr: {}", stderr(&output));
}

#[tokio::test]
async fn unknown_required_check_is_a_configuration_error() {
    let server = setup_mock_server().await;
    let output = run_with_mock(
        &server,
        &[
            "--manifest",
            &fixture("Cargo.lock"),
            "--config",
            &fixture("policy-unknown-check.yml"),
        ],
    );

    assert_eq!(exit_code(&output), 2);
    let err = stderr(&output);
    assert!(err.contains("error:"), "{err}");
    assert!(err.contains("Code-Review"), "{err}");
    assert!(stdout(&output).is_empty());
}

#[test]
fn out_of_range_policy_is_a_configuration_error() {
    let output = depgate()
        .args([
            "--manifest",
            &fixture("Cargo.lock"),
            "--config",
            &fixture("policy-out-of-range.yml"),
        ])
        .output()
        .expect("failed to execute");

    assert_eq!(exit_code(&output), 2);
    assert!(stderr(&output).contains("invalid policy configuration"));
}

#[test]
fn malformed_manifest_is_fatal() {
    let output = depgate()
        .args(["--manifest", &fixture("broken/Cargo.lock")])
        .output()
        .expect("failed to execute");

    assert_eq!(exit_code(&output), 2);
    assert!(stderr(&output).contains("failed to parse manifest"));
}

#[test]
fn unsupported_manifest_passes_with_nothing_evaluated() {
    let output = depgate()
        .args(["--manifest", &fixture("requirements.txt")])
        .output()
        .expect("failed to execute");

    assert_eq!(exit_code(&output), 0, "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("unsupported manifest"), "{out}");
    assert!(out.contains("PASS: 0 evaluated, 0 violation(s)"), "{out}");
}

#[test]
fn missing_manifest_argument_is_a_usage_error() {
    let output = depgate().output().expect("failed to execute");
    assert_eq!(exit_code(&output), 2);
    assert!(stderr(&output).contains("--manifest"));
}

#[test]
fn missing_token_is_warned_on_stderr() {
    let output = depgate()
        .args(["--manifest", &fixture("requirements.txt")])
        .env_remove("GITHUB_TOKEN")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to execute");

    assert_eq!(exit_code(&output), 0);
    assert!(stderr(&output).contains("no GitHub token"));
    assert!(!stdout(&output).contains("no GitHub token"));
}

#[tokio::test]
async fn token_silences_rate_limit_warning() {
    let server = setup_mock_server().await;
    let output = run_with_mock(&server, &["--manifest", &fixture("requirements.txt")]);

    assert_eq!(exit_code(&output), 0);
    assert!(!stderr(&output).contains("no GitHub token"));
}
