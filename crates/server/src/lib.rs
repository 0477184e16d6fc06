//! Voice assistant webhook: conversational commands over a Google Sheet.
//!
//! Layers, outermost first:
//! - `server`: TCP listener, one thread per connection
//! - `http`: minimal HTTP/1.1 request parsing and response writing
//! - `service`: method/token/body checks, request logging, dispatch
//! - `commands`: the conversational handlers
//! - `accounts`: Google account linking behind a trait seam

pub mod accounts;
pub mod commands;
pub mod http;
pub mod links;
pub mod server;
pub mod service;
pub mod session;

pub use accounts::{AccountProvider, GoogleAccounts};
pub use commands::{handle, Command};
pub use server::{WebhookServer, WebhookServerConfig};
pub use service::WebhookService;
