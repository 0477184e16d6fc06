//! Google OAuth 2.0: authorization URL, code exchange, token refresh.
//!
//! Tokens live in the assistant's user storage as a JSON string, so
//! `GoogleToken` round-trips through `to_param`/`from_param` with the same
//! field names Google's token endpoint returns (plus `created`).

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use handsfree_core::BackendError;
use serde::{Deserialize, Serialize};

use crate::client::build_http;

pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Seconds shaved off a token's lifetime so it is refreshed before Google
/// starts rejecting it.
const EXPIRY_SKEW_SECS: i64 = 30;

const TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

// ── Client secret ───────────────────────────────────────────────────

/// OAuth client registration, as downloaded from the Google console.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

/// The downloaded file wraps the registration in `web` or `installed`.
#[derive(Deserialize)]
struct ClientSecretFile {
    web: Option<ClientSecret>,
    installed: Option<ClientSecret>,
}

impl ClientSecret {
    /// Parse a client secret document. Accepts the console's wrapped form
    /// (`{"web": {...}}` / `{"installed": {...}}`) or a bare registration.
    pub fn from_json(json: &str) -> Result<Self, BackendError> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| BackendError::Parse(format!("client secret: {}", e)))?;

        if value.get("web").is_some() || value.get("installed").is_some() {
            let file: ClientSecretFile = serde_json::from_value(value)
                .map_err(|e| BackendError::Parse(format!("client secret: {}", e)))?;
            return file
                .web
                .or(file.installed)
                .ok_or_else(|| BackendError::Parse("client secret: empty section".into()));
        }

        serde_json::from_value(value)
            .map_err(|e| BackendError::Parse(format!("client secret: {}", e)))
    }

    pub fn from_file(path: &Path) -> Result<Self, BackendError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BackendError::Parse(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }
}

// ── Token ───────────────────────────────────────────────────────────

/// An OAuth token as stored in user params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds from `created`
    #[serde(default)]
    pub expires_in: i64,
    /// Unix seconds when the token was issued
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl GoogleToken {
    /// Expired when `created + expires_in - 30 < now`. A token without a
    /// creation time is always expired.
    pub fn is_expired_at(&self, now: i64) -> bool {
        match self.created {
            Some(created) => {
                created
                    .saturating_add(self.expires_in)
                    .saturating_sub(EXPIRY_SKEW_SECS)
                    < now
            }
            None => true,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp())
    }

    /// Decode the JSON string kept in `user.params.access_token`.
    pub fn from_param(param: &str) -> Result<Self, BackendError> {
        serde_json::from_str(param).map_err(|e| BackendError::Parse(format!("stored token: {}", e)))
    }

    /// Encode for `user.params.access_token`.
    pub fn to_param(&self) -> String {
        // Plain struct of strings and integers; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Body of a successful token endpoint response.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
    refresh_token: Option<String>,
    token_type: Option<String>,
    scope: Option<String>,
    id_token: Option<String>,
}

// ── OAuth client ────────────────────────────────────────────────────

/// OAuth client (blocking).
#[derive(Clone)]
pub struct OAuthClient {
    http: reqwest::blocking::Client,
    secret: ClientSecret,
}

impl OAuthClient {
    pub fn new(secret: ClientSecret) -> Result<Self, BackendError> {
        Ok(Self { http: build_http(TOKEN_TIMEOUT)?, secret })
    }

    /// Consent page URL. Offline access so a refresh token is issued, and
    /// forced consent so it is issued again on re-linking.
    pub fn authorization_url(&self) -> String {
        let redirect_uri = self.secret.redirect_uris.first().map(String::as_str).unwrap_or("");
        let params = [
            ("response_type", "code"),
            ("access_type", "offline"),
            ("client_id", self.secret.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", SHEETS_SCOPE),
            ("prompt", "select_account consent"),
        ];
        match url::Url::parse_with_params(&self.secret.auth_uri, &params) {
            Ok(url) => url.to_string(),
            Err(e) => {
                log::error!("Invalid auth_uri {:?}: {}", self.secret.auth_uri, e);
                String::new()
            }
        }
    }

    /// Exchange a verification code for a token.
    pub fn exchange_code(&self, code: &str) -> Result<GoogleToken, BackendError> {
        let redirect_uri = self.secret.redirect_uris.first().map(String::as_str).unwrap_or("");
        let response = self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
        ])?;
        Ok(token_from_response(response, None))
    }

    /// Obtain a fresh access token. The old refresh token is kept when
    /// Google does not rotate it.
    pub fn refresh(&self, token: &GoogleToken) -> Result<GoogleToken, BackendError> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .ok_or(BackendError::NotAuthenticated)?;
        let response = self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.as_str()),
        ])?;
        Ok(token_from_response(response, Some(refresh_token)))
    }

    fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, BackendError> {
        let response = self
            .http
            .post(&self.secret.token_uri)
            .form(form)
            .send()
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body: serde_json::Value = response.json().unwrap_or(serde_json::Value::Null);
            let msg = body["error"]
                .as_str()
                .or_else(|| body["error_description"].as_str())
                .map(String::from)
                .unwrap_or_else(|| format!("HTTP {}", status));
            return Err(BackendError::OAuth(msg));
        }

        response
            .json::<TokenResponse>()
            .map_err(|e| BackendError::Parse(format!("token response: {}", e)))
    }
}

fn token_from_response(response: TokenResponse, previous_refresh: Option<&str>) -> GoogleToken {
    GoogleToken {
        access_token: response.access_token,
        refresh_token: response
            .refresh_token
            .or_else(|| previous_refresh.map(String::from)),
        expires_in: response.expires_in,
        created: Some(Utc::now().timestamp()),
        token_type: response.token_type,
        scope: response.scope,
        id_token: response.id_token,
    }
}
