//! End-to-end CLI tests for the napkin binary.

mod support;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{SVG_BODY, TEST_TOKEN, job_body};

/// Binary with a clean `NAPKIN_*` environment.
fn napkin() -> Command {
    let mut cmd = Command::cargo_bin("napkin").unwrap();
    for key in [
        "NAPKIN_API_TOKEN",
        "NAPKIN_API_BASE_URL",
        "NAPKIN_API_VERSION",
        "NAPKIN_TIMEOUT_SECONDS",
        "NAPKIN_MAX_RETRIES",
        "NAPKIN_POLL_INTERVAL_SECONDS",
        "NAPKIN_MAX_POLL_ATTEMPTS",
        "NAPKIN_DOWNLOAD_CHUNK_SIZE",
        "NAPKIN_DOWNLOAD_OVERWRITE",
        "RUST_LOG",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

/// Binary configured against a mock server with fast polling.
fn napkin_against(server: &MockServer) -> Command {
    let mut cmd = napkin();
    cmd.env("NAPKIN_API_TOKEN", TEST_TOKEN)
        .env("NAPKIN_API_BASE_URL", server.uri())
        .env("NAPKIN_POLL_INTERVAL_SECONDS", "0.01")
        .env("NAPKIN_MAX_POLL_ATTEMPTS", "5")
        .env("NAPKIN_MAX_RETRIES", "1");
    cmd
}

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    napkin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Napkin"))
        .stdout(predicate::str::contains("generate"))
        .stdout(predicate::str::contains("status"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    napkin()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("napkin"));
}

#[test]
fn test_binary_without_subcommand_fails() {
    napkin().assert().failure();
}

#[test]
fn test_generate_help_lists_format_option() {
    napkin()
        .args(["generate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--format"))
        .stdout(predicate::str::contains("--output"));
}

#[test]
fn test_missing_token_exits_with_invalid_status() {
    napkin()
        .args(["status", "abc123"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("NAPKIN_API_TOKEN"));
}

#[test]
fn test_width_with_svg_is_rejected_before_any_call() {
    napkin()
        .env("NAPKIN_API_TOKEN", TEST_TOKEN)
        .env("NAPKIN_API_BASE_URL", "http://127.0.0.1:9")
        .args(["generate", "hello", "--width", "800"])
        .assert()
        .code(2);
}

#[test]
fn test_unknown_format_is_usage_error() {
    napkin()
        .env("NAPKIN_API_TOKEN", TEST_TOKEN)
        .args(["generate", "hello", "--format", "gif"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("gif"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_status_prints_job_summary() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/visual/abc123/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "abc123",
            "status": "pending",
            "progress": 40.0,
        })))
        .mount(&server)
        .await;

    napkin_against(&server)
        .args(["status", "abc123"])
        .assert()
        .success()
        .stdout(predicate::str::contains("abc123\tpending\t40%"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_status_of_unknown_job_exits_with_job_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/visual/nope/status"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    napkin_against(&server)
        .args(["status", "nope"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("not found"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_token_exits_with_auth_status_and_hides_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/visual/abc123/status"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "bad token" })))
        .mount(&server)
        .await;

    napkin_against(&server)
        .args(["-v", "status", "abc123"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains(TEST_TOKEN).not())
        .stdout(predicate::str::contains(TEST_TOKEN).not());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_generate_downloads_files() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    Mock::given(method("POST"))
        .and(path("/v1/visual"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "id": "abc123", "status": "pending" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/visual/abc123/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_body(
            "abc123",
            "completed",
            json!([{ "id": "f1", "format": "svg" }]),
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/visual/abc123/file/f1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(SVG_BODY, "image/svg+xml"))
        .mount(&server)
        .await;

    napkin_against(&server)
        .args(["--quiet", "generate", "Pipeline: ingest, clean, publish", "-o"])
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("abc123_f1.svg\timage/svg+xml"));

    let written = std::fs::read(temp_dir.path().join("abc123_f1.svg")).expect("file written");
    assert_eq!(written, SVG_BODY);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_generate_no_download_prints_job() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    Mock::given(method("POST"))
        .and(path("/v1/visual"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "id": "abc123", "status": "pending" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/visual/abc123/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_body(
            "abc123",
            "completed",
            json!([{ "id": "f1" }, { "id": "f2" }]),
        )))
        .mount(&server)
        .await;

    napkin_against(&server)
        .args(["generate", "hello", "--no-download", "-o"])
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("abc123\tcompleted\t2 file(s)"));

    assert!(support::file_names(temp_dir.path()).is_empty());
}
