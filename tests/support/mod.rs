//! Shared helpers for integration tests against a mock Napkin service.

#![allow(dead_code)]

use std::time::Duration;

use napkin_core::{
    ApiToken, ClientConfig, DownloadSettings, NapkinClient, PollSchedule, PollSettings, RetryPolicy,
};
use serde_json::{Value, json};
use wiremock::MockServer;

/// Credential used by every test client.
pub const TEST_TOKEN: &str = "sk-test-0123456789";

/// Client configuration pointed at the mock server, with millisecond delays.
pub fn fast_config(server: &MockServer) -> ClientConfig {
    ClientConfig::new(ApiToken::new(TEST_TOKEN).expect("token is not blank"))
        .with_base_url(&server.uri())
        .expect("mock server uri is a valid base url")
        .with_retry_policy(
            RetryPolicy::new(
                3,
                Duration::from_millis(10),
                Duration::from_millis(50),
                2.0,
            )
            .with_jitter(Duration::ZERO),
        )
        .with_poll_settings(PollSettings {
            schedule: PollSchedule::Fixed(Duration::from_millis(10)),
            max_attempts: 5,
        })
}

/// Client built from [`fast_config`].
pub fn fast_client(server: &MockServer) -> NapkinClient {
    NapkinClient::new(fast_config(server)).expect("client builds")
}

/// Client built from [`fast_config`] with overwrite enabled for downloads.
pub fn overwriting_client(server: &MockServer) -> NapkinClient {
    let config = fast_config(server).with_download_settings(DownloadSettings {
        overwrite: true,
        ..DownloadSettings::default()
    });
    NapkinClient::new(config).expect("client builds")
}

/// Job envelope as the service returns it.
pub fn job_body(id: &str, status: &str, generated_files: Value) -> Value {
    json!({
        "id": id,
        "status": status,
        "request": { "format": "svg" },
        "generated_files": generated_files,
    })
}

/// Small SVG document served as a generated file.
pub const SVG_BODY: &[u8] =
    b"<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"10\" height=\"10\"></svg>";

/// Lists file names in `dir`, sorted.
pub fn file_names(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read dir")
        .map(|entry| {
            entry
                .expect("dir entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}
