//! Configuration management
//!
//! Configuration is read once at startup from `config.yml` (missing file or
//! missing keys fall back to defaults) and then overridden by `MYFLIX_*`
//! environment variables. The resulting [`Config`] is passed down by value or
//! behind an `Arc`; nothing else in the crate reads the environment.
//!
//! The session signing secret has no default. [`Config::validate`] rejects a
//! configuration without one, which makes the process refuse to start.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::path::Path;

/// Minimum accepted length of a signing secret
pub const MIN_SECRET_LENGTH: usize = 32;

/// Longest accepted session lifetime, one year
pub const MAX_TTL_HOURS: i64 = 24 * 365;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Session cookie and token configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// OAuth provider session configuration
    #[serde(default)]
    pub oauth: OAuthConfig,
    /// Route classification for the authorizer
    #[serde(default)]
    pub routes: RoutesConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (cookies are sent cross-origin only to this origin)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/myflix.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Session cookie and token configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// HS256 signing secret. Required.
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub secret: Option<SecretString>,
    /// Name of the session cookie
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Token and cookie lifetime in hours
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: i64,
    /// Whether cookies carry the `Secure` attribute
    #[serde(default = "default_true")]
    pub secure_cookies: bool,
    /// Keep a denylist of logged-out token ids
    #[serde(default)]
    pub revocation_enabled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: None,
            cookie_name: default_cookie_name(),
            ttl_hours: default_ttl_hours(),
            secure_cookies: true,
            revocation_enabled: false,
        }
    }
}

impl SessionConfig {
    /// Session lifetime as a duration, clamped to `0..=MAX_TTL_HOURS`
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.ttl_hours.clamp(0, MAX_TTL_HOURS))
    }
}

fn default_cookie_name() -> String {
    "session".to_string()
}

fn default_ttl_hours() -> i64 {
    24
}

fn default_true() -> bool {
    true
}

/// OAuth provider session configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuthConfig {
    /// Secret the provider signs its session token with. Falls back to the
    /// session secret when unset.
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub secret: Option<SecretString>,
    /// Emails that receive the `admin` role when signing in through a provider
    #[serde(default)]
    pub admin_emails: Vec<String>,
}

/// Route classification used by the authorizer
#[derive(Debug, Clone, Deserialize)]
pub struct RoutesConfig {
    /// Route roots that require authentication (exact match or sub-path)
    #[serde(default = "default_protected_roots")]
    pub protected_roots: Vec<String>,
    /// Exact paths reserved for anonymous visitors
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
    /// Path prefixes the authorizer never runs on
    #[serde(default = "default_excluded_prefixes")]
    pub excluded_prefixes: Vec<String>,
    /// File extensions the authorizer never runs on
    #[serde(default = "default_excluded_extensions")]
    pub excluded_extensions: Vec<String>,
    /// Where anonymous visitors of protected routes are sent
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Where signed-in visitors of public routes are sent
    #[serde(default = "default_home_path")]
    pub home_path: String,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            protected_roots: default_protected_roots(),
            public_paths: default_public_paths(),
            excluded_prefixes: default_excluded_prefixes(),
            excluded_extensions: default_excluded_extensions(),
            login_path: default_login_path(),
            home_path: default_home_path(),
        }
    }
}

fn default_protected_roots() -> Vec<String> {
    vec!["/content".to_string(), "/user".to_string()]
}

fn default_public_paths() -> Vec<String> {
    vec!["/login".to_string(), "/signup".to_string(), "/".to_string()]
}

fn default_excluded_prefixes() -> Vec<String> {
    vec!["/api".to_string(), "/static".to_string(), "/images".to_string()]
}

fn default_excluded_extensions() -> Vec<String> {
    [".png", ".jpg", ".svg", ".ico", ".css", ".js"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_login_path() -> String {
    "/login".to_string()
}

fn default_home_path() -> String {
    "/content".to_string()
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()).map(SecretString::from))
}

/// Error type for configuration loading and validation
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Missing session secret: set MYFLIX_SESSION_SECRET or session.secret")]
    MissingSecret,
    #[error("Insecure secret in {0}: must be at least {} characters", MIN_SECRET_LENGTH)]
    InsecureSecret(&'static str),
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// A missing or empty file yields the defaults. Invalid YAML is an error
    /// that names the line and column.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: format_yaml_error(&e),
        })
    }

    /// Load configuration from file, apply `MYFLIX_*` overrides and validate
    ///
    /// Recognised variables:
    /// - MYFLIX_SERVER_HOST, MYFLIX_SERVER_PORT, MYFLIX_SERVER_CORS_ORIGIN
    /// - MYFLIX_DATABASE_DRIVER, MYFLIX_DATABASE_URL
    /// - MYFLIX_SESSION_SECRET, MYFLIX_SESSION_TTL_HOURS,
    ///   MYFLIX_SESSION_SECURE_COOKIES, MYFLIX_SESSION_REVOCATION
    /// - MYFLIX_OAUTH_SECRET, MYFLIX_OAUTH_ADMIN_EMAILS (comma separated)
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("MYFLIX_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("MYFLIX_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("MYFLIX_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        if let Ok(driver) = std::env::var("MYFLIX_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {}
            }
        }
        if let Ok(url) = std::env::var("MYFLIX_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(secret) = std::env::var("MYFLIX_SESSION_SECRET") {
            if !secret.is_empty() {
                self.session.secret = Some(SecretString::from(secret));
            }
        }
        if let Ok(ttl) = std::env::var("MYFLIX_SESSION_TTL_HOURS") {
            if let Ok(ttl) = ttl.parse::<i64>() {
                self.session.ttl_hours = ttl;
            }
        }
        if let Ok(secure) = std::env::var("MYFLIX_SESSION_SECURE_COOKIES") {
            if let Ok(secure) = secure.parse::<bool>() {
                self.session.secure_cookies = secure;
            }
        }
        if let Ok(revocation) = std::env::var("MYFLIX_SESSION_REVOCATION") {
            if let Ok(revocation) = revocation.parse::<bool>() {
                self.session.revocation_enabled = revocation;
            }
        }

        if let Ok(secret) = std::env::var("MYFLIX_OAUTH_SECRET") {
            if !secret.is_empty() {
                self.oauth.secret = Some(SecretString::from(secret));
            }
        }
        if let Ok(emails) = std::env::var("MYFLIX_OAUTH_ADMIN_EMAILS") {
            self.oauth.admin_emails = emails
                .split(',')
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect();
        }
    }

    /// Reject configurations the server must not start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let secret = self.session.secret.as_ref().ok_or(ConfigError::MissingSecret)?;
        if secret.expose_secret().len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::InsecureSecret("session.secret"));
        }
        if let Some(oauth_secret) = &self.oauth.secret {
            if oauth_secret.expose_secret().len() < MIN_SECRET_LENGTH {
                return Err(ConfigError::InsecureSecret("oauth.secret"));
            }
        }
        if self.session.ttl_hours <= 0 {
            return Err(ConfigError::ValidationError(
                "session.ttl_hours must be positive".to_string(),
            ));
        }
        if self.session.ttl_hours > MAX_TTL_HOURS {
            return Err(ConfigError::ValidationError(format!(
                "session.ttl_hours must be at most {}",
                MAX_TTL_HOURS
            )));
        }
        if self.session.cookie_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "session.cookie_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Secret the OAuth provider session token is verified with
    pub fn oauth_secret(&self) -> Option<&SecretString> {
        self.oauth.secret.as_ref().or(self.session.secret.as_ref())
    }
}

fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Env-mutating tests share this lock.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn short_secrets_are_rejected(len in 1usize..MIN_SECRET_LENGTH) {
            let mut config = Config::default();
            config.session.secret = Some(SecretString::from("s".repeat(len)));
            prop_assert!(config.validate().is_err());
        }

        #[test]
        fn long_secrets_are_accepted(len in MIN_SECRET_LENGTH..256usize) {
            let mut config = Config::default();
            config.session.secret = Some(SecretString::from("s".repeat(len)));
            prop_assert!(config.validate().is_ok());
        }

        #[test]
        fn partial_session_section_keeps_other_defaults(ttl in 1i64..=720) {
            let mut file = NamedTempFile::new().unwrap();
            write!(file, "session:\n  ttl_hours: {}\n", ttl).unwrap();

            let config = Config::load(file.path()).unwrap();
            prop_assert_eq!(config.session.ttl_hours, ttl);
            prop_assert_eq!(config.session.cookie_name.as_str(), "session");
            prop_assert_eq!(config.routes.login_path.as_str(), "/login");
        }
    }
}
