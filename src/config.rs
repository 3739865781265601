// Client configuration
// Loaded from the environment (optionally seeded from a .env file)

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use validator::Validate;

/// Default location of the durable session document
pub const DEFAULT_SESSION_FILE: &str = ".dive-auth/session.json";
/// Default sign-in page
pub const DEFAULT_SIGN_IN_PATH: &str = "/auth/sign-in";
/// Default forbidden page
pub const DEFAULT_FORBIDDEN_PATH: &str = "/forbidden";
/// Default sign-in endpoint on the REST API
pub const DEFAULT_LOGIN_ENDPOINT: &str = "/api/auth/login";
/// Default current-user endpoint on the REST API
pub const DEFAULT_CURRENT_USER_ENDPOINT: &str = "/api/auth/me";
/// Default request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set in environment")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Navigation targets used by the route guards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationConfig {
    pub sign_in_path: String,
    pub forbidden_path: String,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            sign_in_path: DEFAULT_SIGN_IN_PATH.to_string(),
            forbidden_path: DEFAULT_FORBIDDEN_PATH.to_string(),
        }
    }
}

/// Full client configuration
#[derive(Debug, Clone, Validate)]
pub struct AppConfig {
    /// Base URL of the REST API
    #[validate(url)]
    pub server_url: String,

    pub session_file: PathBuf,

    #[validate(custom = "validate_absolute_path")]
    pub login_endpoint: String,

    #[validate(custom = "validate_absolute_path")]
    pub current_user_endpoint: String,

    #[validate(range(min = 1, max = 600))]
    pub request_timeout_secs: u64,

    /// Confirm stored sessions against the current-user endpoint
    pub validate_session: bool,

    pub navigation: NavigationConfig,
}

impl AppConfig {
    /// Configuration with defaults for everything except the server URL
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            session_file: PathBuf::from(DEFAULT_SESSION_FILE),
            login_endpoint: DEFAULT_LOGIN_ENDPOINT.to_string(),
            current_user_endpoint: DEFAULT_CURRENT_USER_ENDPOINT.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            validate_session: true,
            navigation: NavigationConfig::default(),
        }
    }

    /// Read configuration from environment variables
    ///
    /// `SERVER_URL` is required; everything else falls back to a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server_url = lookup("SERVER_URL").ok_or(ConfigError::Missing("SERVER_URL"))?;
        let mut config = Self::new(server_url.trim_end_matches('/'));

        if let Some(path) = lookup("SESSION_FILE") {
            config.session_file = PathBuf::from(path);
        }
        if let Some(endpoint) = lookup("LOGIN_ENDPOINT") {
            config.login_endpoint = endpoint;
        }
        if let Some(endpoint) = lookup("CURRENT_USER_ENDPOINT") {
            config.current_user_endpoint = endpoint;
        }
        if let Some(path) = lookup("SIGN_IN_PATH") {
            config.navigation.sign_in_path = path;
        }
        if let Some(path) = lookup("FORBIDDEN_PATH") {
            config.navigation.forbidden_path = path;
        }
        if let Some(raw) = lookup("REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs =
                raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    name: "REQUEST_TIMEOUT_SECS",
                    value: raw.clone(),
                })?;
        }
        if let Some(raw) = lookup("VALIDATE_SESSION") {
            config.validate_session = parse_flag(&raw).ok_or(ConfigError::InvalidValue {
                name: "VALIDATE_SESSION",
                value: raw.clone(),
            })?;
        }

        config.validate()?;
        tracing::debug!("Loaded configuration for {}", config.server_url);
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Endpoint paths are joined onto the base URL and must start with '/'
fn validate_absolute_path(path: &str) -> Result<(), validator::ValidationError> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(validator::ValidationError::new("path_must_start_with_slash"))
    }
}
