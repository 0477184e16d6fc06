//! Google API client for the handsfree webhook.
//!
//! Blocking reqwest (no Tokio runtime required). Two halves:
//! OAuth (authorization URL, code exchange, refresh) and the Sheets v4
//! REST calls behind `handsfree_core::SheetsBackend`.
//!
//! No retries. Failures surface as `BackendError` immediately.

mod auth;
mod client;

pub use auth::{ClientSecret, GoogleToken, OAuthClient, SHEETS_SCOPE};
pub use client::{SheetsClient, SHEETS_API_BASE};
