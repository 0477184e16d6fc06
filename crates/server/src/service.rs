//! Webhook endpoint: request checks in front of the command handlers.
//!
//! Order: method, then token, then body. Each failure is answered in
//! plain text and never reaches a handler.

use std::sync::Arc;

use handsfree_protocol::WebhookRequest;
use subtle::ConstantTimeEq;

use crate::accounts::AccountProvider;
use crate::commands;
use crate::http::{HttpRequest, HttpResponse};

pub struct WebhookService {
    token: String,
    log_requests: bool,
    accounts: Arc<dyn AccountProvider>,
}

impl WebhookService {
    pub fn new(token: impl Into<String>, accounts: Arc<dyn AccountProvider>) -> Self {
        Self {
            token: token.into(),
            log_requests: false,
            accounts,
        }
    }

    /// Log every accepted request body, pretty-printed.
    pub fn with_request_logging(mut self, enabled: bool) -> Self {
        self.log_requests = enabled;
        self
    }

    /// Constant-time token comparison.
    fn token_matches(&self, provided: &str) -> bool {
        self.token.as_bytes().ct_eq(provided.as_bytes()).into()
    }

    pub fn handle_http(&self, request: &HttpRequest) -> HttpResponse {
        if request.method != "POST" {
            return HttpResponse::text(405, "Method not allowed.");
        }

        if !self.token_matches(request.query_param("token").unwrap_or("")) {
            return HttpResponse::text(403, "Incorrect webhook token.");
        }

        let body: serde_json::Value = match serde_json::from_slice(&request.body) {
            Ok(value) => value,
            Err(_) => return HttpResponse::text(400, "Invalid JSON."),
        };
        // An empty object is as useless as no object.
        if !body.as_object().is_some_and(|o| !o.is_empty()) {
            return HttpResponse::text(400, "Invalid JSON.");
        }

        if self.log_requests {
            match serde_json::to_string_pretty(&body) {
                Ok(pretty) => log::info!("Webhook request:\n{}", pretty),
                Err(e) => log::warn!("Cannot print webhook request: {}", e),
            }
        }

        let webhook_request: WebhookRequest = match serde_json::from_value(body) {
            Ok(r) => r,
            Err(e) => {
                log::debug!("Rejected webhook body: {}", e);
                return HttpResponse::text(400, "Invalid JSON.");
            }
        };

        let response = commands::handle(&webhook_request, self.accounts.as_ref());

        match serde_json::to_string_pretty(&response) {
            Ok(json) => HttpResponse::json(json),
            Err(e) => {
                log::error!("Cannot encode webhook response: {}", e);
                HttpResponse::text(500, "Internal server error.")
            }
        }
    }
}
