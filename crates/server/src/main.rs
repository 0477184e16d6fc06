// handsfree - voice assistant webhook for item indices in Google Sheets

mod exit_codes;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use handsfree_config::{ConfigError, Settings};
use handsfree_core::BackendError;
use handsfree_server::{GoogleAccounts, WebhookServer, WebhookServerConfig, WebhookService};
use handsfree_sheets_client::{ClientSecret, OAuthClient};

use exit_codes::{EXIT_ERROR, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "handsfree")]
#[command(about = "Voice assistant webhook for editing item indices in Google Sheets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook server
    #[command(after_help = "\
Examples:
  handsfree serve
  handsfree serve --listen 0.0.0.0:8080
  HANDSFREE_WEBHOOK_TOKEN=s3cret handsfree serve --config ./handsfree.toml")]
    Serve {
        /// Config file (default: ~/.config/handsfree/config.toml)
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Listen address, overrides the config file
        #[arg(long)]
        listen: Option<String>,
    },

    /// Print the Google consent URL used for account linking
    AuthUrl {
        /// Config file (default: ~/.config/handsfree/config.toml)
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { config, listen } => cmd_serve(config, listen),
        Commands::AuthUrl { config } => cmd_auth_url(config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self { code: EXIT_USAGE, message: err.to_string(), hint: err.hint() }
    }
}

impl From<BackendError> for CliError {
    fn from(err: BackendError) -> Self {
        let hint = match &err {
            BackendError::Parse(_) => {
                Some("download the OAuth client JSON again from the Google Cloud console".to_string())
            }
            _ => None,
        };
        Self { code: EXIT_ERROR, message: err.to_string(), hint }
    }
}

// ============================================================================
// serve
// ============================================================================

fn cmd_serve(config: Option<PathBuf>, listen: Option<String>) -> Result<(), CliError> {
    let mut settings = Settings::load(config.as_deref())?;
    if let Some(listen) = listen {
        settings.listen = listen;
    }
    settings.validate()?;

    let secret = load_client_secret(&settings)?;
    let accounts = GoogleAccounts::new(secret, settings.sheets_api_base.clone())?;
    let service = WebhookService::new(settings.webhook_token.clone(), Arc::new(accounts))
        .with_request_logging(settings.log_requests);

    let server_config = WebhookServerConfig {
        listen: settings.listen_addr()?,
        max_connections: settings.max_connections,
    };

    let mut server = WebhookServer::new();
    server
        .start(server_config, Arc::new(service))
        .map_err(|e| {
            CliError::runtime(format!("cannot listen on {}: {}", settings.listen, e))
                .with_hint("is another process using the port? try --listen")
        })?;

    server.wait();
    Ok(())
}

// ============================================================================
// auth-url
// ============================================================================

fn cmd_auth_url(config: Option<PathBuf>) -> Result<(), CliError> {
    let settings = Settings::load(config.as_deref())?;
    let secret = load_client_secret(&settings)?;
    let oauth = OAuthClient::new(secret)?;
    println!("{}", oauth.authorization_url());
    Ok(())
}

fn load_client_secret(settings: &Settings) -> Result<ClientSecret, CliError> {
    let json = settings.client_secret_json()?;
    Ok(ClientSecret::from_json(&json)?)
}
