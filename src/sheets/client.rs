//! Sheets API v4 client
//!
//! A thin reqwest wrapper over the two read-only endpoints the commands
//! need: the values of one worksheet and the spreadsheet's sheet properties.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use super::auth::{ServiceAccountTokenSource, TokenSource};
use super::{SheetSource, WorksheetMetadata};
use crate::config::Settings;
use crate::error::{Result, SheetsError};

/// Response body of `spreadsheets.values.get`
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// Response body of `spreadsheets.get?fields=sheets.properties`
#[derive(Debug, Deserialize)]
struct SpreadsheetProperties {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    #[serde(default)]
    sheet_id: i64,
    title: String,
    #[serde(default)]
    grid_properties: Option<GridProperties>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    #[serde(default)]
    row_count: u64,
    #[serde(default)]
    column_count: u64,
}

/// Which endpoint produced a failed response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Values,
    Metadata,
}

/// Read-only client for one worksheet
pub struct SheetsClient {
    http: Client,
    api_base: Url,
    sheet_id: String,
    worksheet_name: String,
    tokens: Arc<dyn TokenSource>,
}

impl SheetsClient {
    /// Create a client with an explicit token source
    ///
    /// # Arguments
    ///
    /// * `api_base` - Base URL of the Sheets API
    /// * `sheet_id` - Spreadsheet document id
    /// * `worksheet_name` - Worksheet title
    /// * `timeout` - Timeout applied to each request
    /// * `tokens` - Source of bearer tokens
    ///
    /// # Errors
    ///
    /// Returns `SheetsError::Config` if the base URL is invalid or the HTTP
    /// client cannot be built.
    pub fn new(
        api_base: &str,
        sheet_id: impl Into<String>,
        worksheet_name: impl Into<String>,
        timeout: Duration,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self> {
        let api_base = Url::parse(api_base)
            .map_err(|e| SheetsError::Config(format!("Invalid API base URL: {}", e)))?;
        if api_base.cannot_be_a_base() {
            return Err(SheetsError::Config(format!(
                "Invalid API base URL: {}",
                api_base
            )));
        }

        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sheets-reader/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SheetsError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base,
            sheet_id: sheet_id.into(),
            worksheet_name: worksheet_name.into(),
            tokens,
        })
    }

    /// Create a client authenticated with the configured service account
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let tokens = ServiceAccountTokenSource::from_key_file(
            &settings.credentials_path,
            &settings.scope,
            settings.token_uri.as_deref(),
            settings.request_timeout,
        )?;

        Self::new(
            &settings.api_base,
            settings.sheet_id.clone(),
            settings.worksheet_name.clone(),
            settings.request_timeout,
            Arc::new(tokens),
        )
    }

    /// Worksheet this client reads
    pub fn worksheet_name(&self) -> &str {
        &self.worksheet_name
    }

    fn endpoint(&self, tail: &[&str]) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| SheetsError::Config("Invalid API base URL".to_string()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.sheet_id.as_str()])
            .extend(tail);
        Ok(url)
    }

    fn values_url(&self) -> Result<Url> {
        let range = quote_worksheet(&self.worksheet_name);
        let mut url = self.endpoint(&["values", range.as_str()])?;
        url.query_pairs_mut().append_pair("majorDimension", "ROWS");
        Ok(url)
    }

    fn metadata_url(&self) -> Result<Url> {
        let mut url = self.endpoint(&[])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties");
        Ok(url)
    }

    async fn get(&self, url: Url, call: Call) -> Result<reqwest::Response> {
        let token = self.tokens.access_token().await?;

        tracing::debug!(path = %url.path(), "Sheets API request");
        let resp = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(request_error)?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        Err(format_api_error(status, &body, call))
    }
}

impl std::fmt::Debug for SheetsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetsClient")
            .field("api_base", &self.api_base.as_str())
            .field("worksheet_name", &self.worksheet_name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SheetSource for SheetsClient {
    async fn fetch_values(&self) -> Result<Vec<Vec<String>>> {
        let resp = self.get(self.values_url()?, Call::Values).await?;
        let body: ValueRange = resp
            .json()
            .await
            .map_err(|e| SheetsError::Data(format!("Unexpected values response: {}", e)))?;

        let values: Vec<Vec<String>> = body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect();

        tracing::debug!(rows = values.len(), "Fetched worksheet values");
        Ok(values)
    }

    async fn worksheet_metadata(&self) -> Result<WorksheetMetadata> {
        let resp = self.get(self.metadata_url()?, Call::Metadata).await?;
        let body: SpreadsheetProperties = resp
            .json()
            .await
            .map_err(|e| SheetsError::Data(format!("Unexpected metadata response: {}", e)))?;

        let sheet = body
            .sheets
            .into_iter()
            .map(|entry| entry.properties)
            .find(|props| props.title == self.worksheet_name)
            .ok_or_else(|| {
                SheetsError::Data(format!("Worksheet '{}' not found", self.worksheet_name))
            })?;

        let grid = sheet.grid_properties.unwrap_or_default();
        Ok(WorksheetMetadata {
            title: sheet.title,
            sheet_id: sheet.sheet_id,
            row_count: grid.row_count,
            column_count: grid.column_count,
        })
    }
}

/// A1 range naming a whole worksheet: the title in single quotes, with
/// embedded quotes doubled
fn quote_worksheet(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

fn cell_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn request_error(err: reqwest::Error) -> SheetsError {
    if err.is_timeout() {
        SheetsError::Transient(format!("Request timed out: {}", err))
    } else if err.is_connect() {
        SheetsError::Transient(format!("Connection failed: {}", err))
    } else {
        SheetsError::Transient(format!("Request failed: {}", err))
    }
}

fn format_api_error(status: StatusCode, body: &str, call: Call) -> SheetsError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SheetsError::Authentication(format!(
            "Sheets API returned {}: {}. Check that the service account has access to the spreadsheet",
            status, body
        )),
        StatusCode::NOT_FOUND => {
            SheetsError::Data("Spreadsheet not found or access denied".to_string())
        }
        StatusCode::BAD_REQUEST if call == Call::Values => SheetsError::Data(format!(
            "Sheets API rejected the worksheet range ({}): {}",
            status, body
        )),
        StatusCode::TOO_MANY_REQUESTS => {
            SheetsError::Transient(format!("Sheets API quota exceeded ({})", status))
        }
        s if s.is_server_error() => {
            SheetsError::Transient(format!("Sheets API returned {}: {}", status, body))
        }
        _ => SheetsError::Data(format!("Sheets API returned {}: {}", status, body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::StaticTokenSource;

    fn client(api_base: &str, worksheet: &str) -> SheetsClient {
        SheetsClient::new(
            api_base,
            "sheet123",
            worksheet,
            Duration::from_secs(5),
            Arc::new(StaticTokenSource::new("tok")),
        )
        .unwrap()
    }

    #[test]
    fn test_quote_worksheet_doubles_quotes() {
        assert_eq!(quote_worksheet("Scripts"), "'Scripts'");
        assert_eq!(quote_worksheet("Bob's tab"), "'Bob''s tab'");
    }

    #[test]
    fn test_values_url_encodes_worksheet() {
        let c = client("https://sheets.googleapis.com", "Dialogue Scripts");
        let url = c.values_url().unwrap();
        assert_eq!(
            url.path(),
            "/v4/spreadsheets/sheet123/values/'Dialogue%20Scripts'"
        );
        assert_eq!(url.query(), Some("majorDimension=ROWS"));
    }

    #[test]
    fn test_values_url_escapes_slash_in_worksheet() {
        let c = client("https://sheets.googleapis.com", "Q1/Q2");
        let url = c.values_url().unwrap();
        assert!(url.path().ends_with("/values/'Q1%2FQ2'"));
    }

    #[test]
    fn test_metadata_url_with_base_path() {
        let c = client("http://localhost:8080/proxy/", "Scripts");
        let url = c.metadata_url().unwrap();
        assert_eq!(url.path(), "/proxy/v4/spreadsheets/sheet123");
        assert_eq!(url.query(), Some("fields=sheets.properties"));
    }

    #[test]
    fn test_invalid_api_base_is_config_error() {
        let err = SheetsClient::new(
            "not a url",
            "id",
            "ws",
            Duration::from_secs(1),
            Arc::new(StaticTokenSource::new("tok")),
        )
        .unwrap_err();
        assert!(matches!(err, SheetsError::Config(_)));
    }

    #[test]
    fn test_cell_to_string() {
        assert_eq!(cell_to_string(serde_json::json!("abc")), "abc");
        assert_eq!(cell_to_string(serde_json::json!(42)), "42");
        assert_eq!(cell_to_string(serde_json::json!(true)), "true");
        assert_eq!(cell_to_string(serde_json::Value::Null), "");
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            format_api_error(StatusCode::UNAUTHORIZED, "", Call::Values),
            SheetsError::Authentication(_)
        ));
        assert!(matches!(
            format_api_error(StatusCode::FORBIDDEN, "PERMISSION_DENIED", Call::Metadata),
            SheetsError::Authentication(_)
        ));
        assert!(matches!(
            format_api_error(StatusCode::NOT_FOUND, "", Call::Values),
            SheetsError::Data(_)
        ));
        assert!(matches!(
            format_api_error(StatusCode::BAD_REQUEST, "", Call::Values),
            SheetsError::Data(_)
        ));
        assert!(matches!(
            format_api_error(StatusCode::TOO_MANY_REQUESTS, "", Call::Values),
            SheetsError::Transient(_)
        ));
        assert!(matches!(
            format_api_error(StatusCode::SERVICE_UNAVAILABLE, "", Call::Metadata),
            SheetsError::Transient(_)
        ));
    }

    #[test]
    fn test_not_found_message() {
        let err = format_api_error(StatusCode::NOT_FOUND, "{}", Call::Metadata);
        assert!(err
            .to_string()
            .contains("Spreadsheet not found or access denied"));
    }
}
