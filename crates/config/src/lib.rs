// Configuration loading

pub mod settings;

pub use settings::{ConfigError, Settings, DEFAULT_LISTEN, DEFAULT_MAX_CONNECTIONS};
