//! Service-account access tokens
//!
//! Google service accounts authenticate with the OAuth 2.0 JWT bearer grant
//! (RFC 7523): the client signs a short-lived RS256 assertion with the
//! account's private key and exchanges it at the token endpoint for an
//! access token. Tokens are cached until shortly before they expire.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{Result, SheetsError};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const EXPIRY_BUFFER_SECS: i64 = 60;

/// Supplies bearer tokens for Sheets API requests
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Return a currently valid access token
    async fn access_token(&self) -> Result<String>;
}

/// Serves one fixed token
///
/// Useful for pre-issued tokens and for tests against mock servers.
///
/// # Examples
///
/// ```
/// use sheets_reader::sheets::{StaticTokenSource, TokenSource};
///
/// # #[tokio::main]
/// # async fn main() {
/// let source = StaticTokenSource::new("ya29.test");
/// assert_eq!(source.access_token().await.unwrap(), "ya29.test");
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    /// Create a source that always returns `token`
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn access_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// The fields of a service-account JSON key that the token flow needs
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    /// Key type; `service_account` for valid keys
    #[serde(rename = "type", default)]
    pub key_type: Option<String>,
    /// Service account e-mail, used as the assertion issuer
    pub client_email: String,
    /// PEM-encoded RSA private key
    pub private_key: String,
    /// Key id, sent as the JWT `kid` header
    #[serde(default)]
    pub private_key_id: Option<String>,
    /// Token endpoint declared by the key
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl ServiceAccountKey {
    /// Read and parse a key file
    ///
    /// # Errors
    ///
    /// Returns `SheetsError::Authentication` when the file cannot be read,
    /// is not valid JSON, or is not a service-account key.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SheetsError::Authentication("Service account credentials file not found".to_string())
            } else {
                SheetsError::Authentication(format!("Failed to load credentials: {}", e))
            }
        })?;
        Self::from_json(&contents)
    }

    /// Parse a key from its JSON text
    pub fn from_json(contents: &str) -> Result<Self> {
        let key: Self = serde_json::from_str(contents).map_err(|e| {
            SheetsError::Authentication(format!("Failed to load credentials: {}", e))
        })?;

        if let Some(key_type) = &key.key_type {
            if key_type != "service_account" {
                return Err(SheetsError::Authentication(format!(
                    "Credentials are of type '{}', expected 'service_account'",
                    key_type
                )));
            }
        }

        Ok(key)
    }
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

/// JWT bearer assertion claims
#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Raw JSON response from the token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// A cached access token
#[derive(Debug, Clone)]
struct AccessToken {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    fn from_response(raw: TokenResponse) -> Self {
        // Tokens never outlive the assertion that minted them.
        let expires_at = raw.expires_in.map(|secs| {
            let secs = i64::try_from(secs)
                .unwrap_or(ASSERTION_LIFETIME_SECS)
                .min(ASSERTION_LIFETIME_SECS);
            Utc::now() + chrono::Duration::seconds(secs)
        });
        Self {
            token: raw.access_token,
            expires_at,
        }
    }

    /// Expired or within the refresh buffer of expiring
    fn is_expired(&self) -> bool {
        match self.expires_at {
            None => false,
            Some(expires_at) => {
                Utc::now() >= expires_at - chrono::Duration::seconds(EXPIRY_BUFFER_SECS)
            }
        }
    }
}

/// Exchanges signed service-account assertions for access tokens
pub struct ServiceAccountTokenSource {
    client_email: String,
    key_id: Option<String>,
    signing_key: EncodingKey,
    scope: String,
    token_uri: String,
    http: reqwest::Client,
    cached: Mutex<Option<AccessToken>>,
}

impl ServiceAccountTokenSource {
    /// Build a token source from a parsed key
    ///
    /// # Arguments
    ///
    /// * `key` - Service-account key
    /// * `scope` - OAuth scope to request
    /// * `token_uri` - Endpoint override; falls back to the key's `token_uri`
    /// * `timeout` - Timeout for token requests
    ///
    /// # Errors
    ///
    /// Returns `SheetsError::Authentication` when the private key is not a
    /// valid RSA PEM key, and `SheetsError::Config` when the HTTP client
    /// cannot be built.
    pub fn new(
        key: ServiceAccountKey,
        scope: &str,
        token_uri: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
            SheetsError::Authentication(format!("Invalid service account private key: {}", e))
        })?;

        let token_uri = token_uri
            .map(str::to_string)
            .or(key.token_uri)
            .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string());

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SheetsError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client_email: key.client_email,
            key_id: key.private_key_id,
            signing_key,
            scope: scope.to_string(),
            token_uri,
            http,
            cached: Mutex::new(None),
        })
    }

    /// Load the key file and build a token source
    pub fn from_key_file(
        path: &Path,
        scope: &str,
        token_uri: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        let key = ServiceAccountKey::from_file(path)?;
        Self::new(key, scope, token_uri, timeout)
    }

    fn signed_assertion(&self) -> Result<String> {
        let iat = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: &self.scope,
            aud: &self.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key_id.clone();

        encode(&header, &claims, &self.signing_key).map_err(|e| {
            SheetsError::Authentication(format!("Failed to sign token assertion: {}", e))
        })
    }

    async fn exchange(&self) -> Result<AccessToken> {
        let assertion = self.signed_assertion()?;
        let params = [("grant_type", JWT_BEARER_GRANT), ("assertion", &assertion)];

        let resp = self
            .http
            .post(&self.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| SheetsError::Transient(format!("token request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = format!("token endpoint returned {}: {}", status, body);
            return Err(if status.is_server_error()
                || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            {
                SheetsError::Transient(message)
            } else {
                SheetsError::Authentication(message)
            });
        }

        let raw: TokenResponse = resp.json().await.map_err(|e| {
            SheetsError::Authentication(format!("failed to parse token response: {}", e))
        })?;

        tracing::debug!(expires_in = ?raw.expires_in, "Obtained service account access token");
        Ok(AccessToken::from_response(raw))
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if !token.is_expired() {
                return Ok(token.token.clone());
            }
        }

        let token = self.exchange().await?;
        let value = token.token.clone();
        *cached = Some(token);
        Ok(value)
    }
}

impl std::fmt::Debug for ServiceAccountTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountTokenSource")
            .field("scope", &self.scope)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}
