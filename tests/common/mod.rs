#![allow(deprecated)]

use std::path::PathBuf;

use assert_cmd::Command;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[allow(dead_code)]
pub const SHEET_ID: &str = "sheet123";
#[allow(dead_code)]
pub const WORKSHEET: &str = "Scripts";

const SETTINGS_VARS: [&str; 12] = [
    "GOOGLE_APPLICATION_CREDENTIALS",
    "SHEET_ID",
    "WORKSHEET_NAME",
    "SHEETS_SCOPE",
    "REQUEST_TIMEOUT",
    "RETRY_MAX_ATTEMPTS",
    "RETRY_INITIAL_DELAY",
    "WATCH_INTERVAL",
    "JITTER_PERCENT",
    "SHEETS_API_BASE",
    "SHEETS_TOKEN_URI",
    "RUST_LOG",
];

#[allow(dead_code)]
pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// The binary with every settings variable cleared
#[allow(dead_code)]
pub fn bare_command() -> Command {
    let mut cmd = Command::cargo_bin("sheets-reader").unwrap();
    for var in SETTINGS_VARS {
        cmd.env_remove(var);
    }
    cmd
}

/// The binary configured against `api_base`, with the token endpoint at
/// `{api_base}/token`
#[allow(dead_code)]
pub fn sheets_command(api_base: &str) -> Command {
    let mut cmd = bare_command();
    cmd.env("GOOGLE_APPLICATION_CREDENTIALS", fixture("service_account.json"))
        .env("SHEET_ID", SHEET_ID)
        .env("WORKSHEET_NAME", WORKSHEET)
        .env("SHEETS_API_BASE", api_base)
        .env("SHEETS_TOKEN_URI", format!("{}/token", api_base))
        .env("REQUEST_TIMEOUT", "5");
    cmd
}

/// Serve a valid access token from `/token`
#[allow(dead_code)]
pub async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "ya29.cli",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .mount(server)
        .await;
}

#[allow(dead_code)]
pub fn values_body() -> serde_json::Value {
    serde_json::json!({
        "range": "Scripts!A1:D5",
        "majorDimension": "ROWS",
        "values": [
            ["id", "title", "status", "date"],
            ["1", "Opening", "ACTIVE", "2023-01-02"],
            ["2", "Middle", "DONE", "2022-12-31"],
            ["3", "Finale", "PENDING", "2023-05-01"],
            ["4", "Epilogue", "ACTIVE", "2023-06-01"]
        ]
    })
}

/// Run the command on a blocking thread so the mock server keeps serving
#[allow(dead_code)]
pub async fn output(mut cmd: Command) -> std::process::Output {
    tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap()
}
