//! Google account access for the command handlers.
//!
//! Handlers never talk to Google directly; they go through
//! `AccountProvider`, so tests can swap in an in-memory backend.

use handsfree_core::{BackendError, SheetsBackend};
use handsfree_sheets_client::{ClientSecret, GoogleToken, OAuthClient, SheetsClient};

/// Account linking and per-user Sheets access.
pub trait AccountProvider: Send + Sync {
    /// Consent page the user opens to link an account.
    fn authorization_url(&self) -> String;

    /// Exchange the code the user read back for a token.
    fn link_account(&self, code: &str) -> Result<GoogleToken, BackendError>;

    /// Fresh token for an expired one.
    fn refresh(&self, token: &GoogleToken) -> Result<GoogleToken, BackendError>;

    /// Sheets backend acting as the token's owner.
    fn sheets(&self, token: &GoogleToken) -> Result<Box<dyn SheetsBackend>, BackendError>;
}

/// `AccountProvider` backed by Google's OAuth and Sheets REST endpoints.
pub struct GoogleAccounts {
    oauth: OAuthClient,
    sheets_api_base: String,
}

impl GoogleAccounts {
    pub fn new(secret: ClientSecret, sheets_api_base: impl Into<String>) -> Result<Self, BackendError> {
        Ok(Self {
            oauth: OAuthClient::new(secret)?,
            sheets_api_base: sheets_api_base.into(),
        })
    }
}

impl AccountProvider for GoogleAccounts {
    fn authorization_url(&self) -> String {
        self.oauth.authorization_url()
    }

    fn link_account(&self, code: &str) -> Result<GoogleToken, BackendError> {
        self.oauth.exchange_code(code)
    }

    fn refresh(&self, token: &GoogleToken) -> Result<GoogleToken, BackendError> {
        self.oauth.refresh(token)
    }

    fn sheets(&self, token: &GoogleToken) -> Result<Box<dyn SheetsBackend>, BackendError> {
        let client = SheetsClient::with_base_url(token.access_token.clone(), self.sheets_api_base.clone())?;
        Ok(Box::new(client))
    }
}
