//! Configuration management for sheets-reader
//!
//! This module reads environment variables once at startup into an
//! immutable [`Settings`] value that is passed by reference to every
//! command. Nothing else in the crate looks at the process environment.

use crate::error::{Result, SheetsError};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Service account key file path
pub const ENV_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";
/// Spreadsheet document id
pub const ENV_SHEET_ID: &str = "SHEET_ID";
/// Worksheet (tab) name within the spreadsheet
pub const ENV_WORKSHEET_NAME: &str = "WORKSHEET_NAME";
/// OAuth scope requested for the access token
pub const ENV_SCOPE: &str = "SHEETS_SCOPE";
/// Request timeout in seconds
pub const ENV_REQUEST_TIMEOUT: &str = "REQUEST_TIMEOUT";
/// Fetch attempts per watch cycle
pub const ENV_RETRY_MAX_ATTEMPTS: &str = "RETRY_MAX_ATTEMPTS";
/// First backoff delay in seconds
pub const ENV_RETRY_INITIAL_DELAY: &str = "RETRY_INITIAL_DELAY";
/// Default watch interval in seconds
pub const ENV_WATCH_INTERVAL: &str = "WATCH_INTERVAL";
/// Jitter applied to the watch interval, in percent
pub const ENV_JITTER_PERCENT: &str = "JITTER_PERCENT";
/// Sheets API base URL override
pub const ENV_API_BASE: &str = "SHEETS_API_BASE";
/// OAuth token endpoint override
pub const ENV_TOKEN_URI: &str = "SHEETS_TOKEN_URI";

/// Read-only spreadsheet scope
pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets.readonly";
/// Public Sheets API endpoint
pub const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com";

const REQUIRED_VARS: [(&str, &str); 3] = [
    (ENV_CREDENTIALS, "Path to service account JSON file"),
    (ENV_SHEET_ID, "Google Sheets document ID"),
    (ENV_WORKSHEET_NAME, "Worksheet name within the spreadsheet"),
];

/// Validated runtime settings
///
/// Created once per process by [`Settings::from_env`] (or
/// [`Settings::from_lookup`] in tests) and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Path to the service account JSON key
    pub credentials_path: PathBuf,
    /// Spreadsheet document id
    pub sheet_id: String,
    /// Worksheet title
    pub worksheet_name: String,
    /// OAuth scope
    pub scope: String,
    /// Timeout applied to every HTTP request
    pub request_timeout: Duration,
    /// Total fetch attempts per watch cycle
    pub retry_max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry
    pub retry_initial_delay: Duration,
    /// Default watch interval
    pub watch_interval: Duration,
    /// Interval jitter in percent (0 disables jitter)
    pub jitter_percent: u8,
    /// Sheets API base URL
    pub api_base: String,
    /// Token endpoint override; `None` uses the key file's `token_uri`
    pub token_uri: Option<String>,
}

impl Settings {
    /// Load settings from the process environment
    ///
    /// # Errors
    ///
    /// Returns `SheetsError::Config` when a required variable is missing,
    /// a numeric value is malformed or out of range, or the credentials
    /// file does not exist.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup
    ///
    /// # Arguments
    ///
    /// * `lookup` - Returns the value of a variable, or `None` when unset
    ///
    /// # Examples
    ///
    /// ```
    /// use sheets_reader::config::Settings;
    ///
    /// let result = Settings::from_lookup(|_| None);
    /// assert!(result.is_err());
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let missing: Vec<String> = REQUIRED_VARS
            .iter()
            .filter(|entry| get(entry.0).is_none())
            .map(|(name, description)| format!("{} ({})", name, description))
            .collect();

        if !missing.is_empty() {
            return Err(SheetsError::Config(format!(
                "Missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let credentials_path = PathBuf::from(get(ENV_CREDENTIALS).unwrap_or_default());
        validate_credentials_file(&credentials_path)?;

        let number = |key: &str, default: u64, min: u64, max: u64| -> Result<u64> {
            let raw = get(key).unwrap_or_else(|| default.to_string());
            let value: u64 = raw.trim().parse().map_err(|_| {
                SheetsError::Config(format!("{} must be a valid integer, got: {}", key, raw))
            })?;
            if !(min..=max).contains(&value) {
                return Err(SheetsError::Config(format!(
                    "{} must be between {} and {}, got: {}",
                    key, min, max, value
                )));
            }
            Ok(value)
        };

        let request_timeout = number(ENV_REQUEST_TIMEOUT, 10, 1, 300)?;
        let retry_max_attempts = number(ENV_RETRY_MAX_ATTEMPTS, 3, 1, 10)?;
        let retry_initial_delay = number(ENV_RETRY_INITIAL_DELAY, 5, 1, 60)?;
        let watch_interval = number(ENV_WATCH_INTERVAL, 300, 30, 3600)?;
        let jitter_percent = number(ENV_JITTER_PERCENT, 10, 0, 50)?;

        let api_base = get(ENV_API_BASE)
            .map(|base| base.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        url::Url::parse(&api_base).map_err(|e| {
            SheetsError::Config(format!("{} is not a valid URL: {}", ENV_API_BASE, e))
        })?;

        let settings = Self {
            credentials_path,
            sheet_id: get(ENV_SHEET_ID).unwrap_or_default().trim().to_string(),
            worksheet_name: get(ENV_WORKSHEET_NAME).unwrap_or_default(),
            scope: get(ENV_SCOPE).unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
            request_timeout: Duration::from_secs(request_timeout),
            retry_max_attempts: retry_max_attempts as u32,
            retry_initial_delay: Duration::from_secs(retry_initial_delay),
            watch_interval: Duration::from_secs(watch_interval),
            jitter_percent: jitter_percent as u8,
            api_base,
            token_uri: get(ENV_TOKEN_URI),
        };

        tracing::debug!(settings = %settings.summary(), "Settings loaded");
        Ok(settings)
    }

    /// Sanitized one-line description for logging
    ///
    /// Only a short prefix of the sheet id is shown; the credentials path
    /// is never included.
    pub fn summary(&self) -> String {
        let prefix: String = self.sheet_id.chars().take(8).collect();
        format!(
            "sheet_id={}..., worksheet={}, scope={}, timeout={}s, retry_attempts={}",
            prefix,
            self.worksheet_name,
            self.scope,
            self.request_timeout.as_secs(),
            self.retry_max_attempts
        )
    }
}

fn validate_credentials_file(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(SheetsError::Config(format!(
            "Service account credentials file not found. Ensure {} points to an existing file",
            ENV_CREDENTIALS
        )));
    }

    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if !is_json {
        return Err(SheetsError::Config(
            "Service account credentials file must be a JSON file".to_string(),
        ));
    }

    Ok(())
}
