// Webhook settings
// Loaded from ~/.config/handsfree/config.toml (or --config), then environment

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
pub const DEFAULT_MAX_CONNECTIONS: usize = 16;
pub const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com";

const ENV_LISTEN: &str = "HANDSFREE_LISTEN";
const ENV_WEBHOOK_TOKEN: &str = "HANDSFREE_WEBHOOK_TOKEN";
const ENV_CLIENT_SECRET: &str = "HANDSFREE_GOOGLE_CLIENT_SECRET";
const ENV_CLIENT_SECRET_FILE: &str = "HANDSFREE_GOOGLE_CLIENT_SECRET_FILE";
const ENV_LOG_REQUESTS: &str = "HANDSFREE_LOG_REQUESTS";

/// Error loading or validating settings.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Config or client secret file could not be read
    Io { path: PathBuf, message: String },
    /// Config file is not valid TOML for `Settings`
    Parse { path: PathBuf, message: String },
    /// No webhook token configured
    MissingWebhookToken,
    /// Neither an inline client secret nor a client secret file
    MissingClientSecret,
    /// A value is present but unusable
    Invalid { key: &'static str, message: String },
}

impl ConfigError {
    /// One-line remedy for the CLI's `hint:` line.
    pub fn hint(&self) -> Option<String> {
        match self {
            ConfigError::MissingWebhookToken => Some(format!(
                "set webhook_token in the config file or {}",
                ENV_WEBHOOK_TOKEN
            )),
            ConfigError::MissingClientSecret => Some(format!(
                "set google_client_secret_file (or {}) to the JSON downloaded from the Google console",
                ENV_CLIENT_SECRET_FILE
            )),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, message } => {
                write!(f, "cannot read {}: {}", path.display(), message)
            }
            ConfigError::Parse { path, message } => {
                write!(f, "invalid config {}: {}", path.display(), message)
            }
            ConfigError::MissingWebhookToken => write!(f, "no webhook token configured"),
            ConfigError::MissingClientSecret => write!(f, "no Google client secret configured"),
            ConfigError::Invalid { key, message } => write!(f, "invalid {}: {}", key, message),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Socket address the webhook listens on
    pub listen: String,

    /// Shared secret expected in the `?token=` query parameter
    pub webhook_token: String,

    /// Google client secret JSON, inline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_client_secret: Option<String>,

    /// Path to the Google client secret JSON (used when no inline secret)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_client_secret_file: Option<PathBuf>,

    /// Log every webhook request body at info level
    pub log_requests: bool,

    /// Concurrent connections accepted before new ones are refused
    pub max_connections: usize,

    /// Sheets REST root
    pub sheets_api_base: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            webhook_token: String::new(),
            google_client_secret: None,
            google_client_secret_file: None,
            log_requests: false,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            sheets_api_base: DEFAULT_SHEETS_API_BASE.to_string(),
        }
    }
}

impl Settings {
    /// Default config file location
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("handsfree")
            .join("config.toml")
    }

    /// Load settings from `path` (must exist) or from the default location
    /// (may be absent), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Self::config_path();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    log::debug!("No config file at {}, using defaults", path.display());
                    Self::default()
                }
            }
        };
        settings.apply_env_from(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Override fields from environment-style lookups. Empty values are
    /// ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(listen) = get(ENV_LISTEN) {
            self.listen = listen;
        }
        if let Some(token) = get(ENV_WEBHOOK_TOKEN) {
            self.webhook_token = token;
        }
        if let Some(secret) = get(ENV_CLIENT_SECRET) {
            self.google_client_secret = Some(secret);
        }
        if let Some(file) = get(ENV_CLIENT_SECRET_FILE) {
            self.google_client_secret_file = Some(PathBuf::from(file));
        }
        if let Some(flag) = get(ENV_LOG_REQUESTS) {
            self.log_requests = matches!(flag.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
    }

    /// Parsed listen address
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
            key: "listen",
            message: format!("{:?}: {}", self.listen, e),
        })
    }

    /// Check everything `serve` needs before binding.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.webhook_token.trim().is_empty() {
            return Err(ConfigError::MissingWebhookToken);
        }
        if self.google_client_secret.is_none() && self.google_client_secret_file.is_none() {
            return Err(ConfigError::MissingClientSecret);
        }
        self.listen_addr()?;
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "max_connections",
                message: "must be at least 1".into(),
            });
        }
        if !self.sheets_api_base.starts_with("http://") && !self.sheets_api_base.starts_with("https://") {
            return Err(ConfigError::Invalid {
                key: "sheets_api_base",
                message: format!("{:?} is not an http(s) URL", self.sheets_api_base),
            });
        }
        Ok(())
    }

    /// Client secret JSON: the inline value, else the file's contents.
    pub fn client_secret_json(&self) -> Result<String, ConfigError> {
        if let Some(secret) = &self.google_client_secret {
            return Ok(secret.clone());
        }
        let path = self
            .google_client_secret_file
            .as_ref()
            .ok_or(ConfigError::MissingClientSecret)?;
        fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.clone(),
            message: e.to_string(),
        })
    }
}
