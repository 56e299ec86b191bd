use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_REGISTRY_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_GATEWAY_URL: &str = "https://gateway.pinata.cloud/ipfs";
pub const DEFAULT_UPLOAD_URL: &str = "http://127.0.0.1:5000/upload";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_DB_PATH: &str = "notary.db";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is not a valid URL: {value:?}")]
    InvalidUrl { name: &'static str, value: String },

    #[error("Invalid request timeout: {0:?}")]
    InvalidTimeout(String),
}

/// Endpoints and transport settings for the registry and content gateway.
///
/// Built once at startup and handed to each client; there is no process-wide
/// configuration state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotaryConfig {
    /// Base URL of the registry API (`/issue`, `/verify/<hash>`, `/certificates`)
    pub registry_url: String,
    /// Gateway prefix; content is fetched from `<gateway_url>/<content id>`
    pub gateway_url: String,
    /// Endpoint accepting multipart uploads of document snapshots
    pub upload_url: String,
    /// Upper bound on a single request, including reading the body
    pub request_timeout: Duration,
}

impl Default for NotaryConfig {
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl NotaryConfig {
    /// Read `NOTARY_REGISTRY_URL`, `NOTARY_GATEWAY_URL`, `NOTARY_UPLOAD_URL`
    /// and `NOTARY_REQUEST_TIMEOUT_SECS`, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let request_timeout = match lookup("NOTARY_REQUEST_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(ConfigError::InvalidTimeout(raw)),
            },
            None => defaults.request_timeout,
        };

        Self {
            registry_url: lookup("NOTARY_REGISTRY_URL").unwrap_or(defaults.registry_url),
            gateway_url: lookup("NOTARY_GATEWAY_URL").unwrap_or(defaults.gateway_url),
            upload_url: lookup("NOTARY_UPLOAD_URL").unwrap_or(defaults.upload_url),
            request_timeout,
        }
        .validate()
    }

    /// Check every URL and strip trailing slashes.
    pub fn validate(self) -> Result<Self, ConfigError> {
        Ok(Self {
            registry_url: normalize_url("registry_url", &self.registry_url)?,
            gateway_url: normalize_url("gateway_url", &self.gateway_url)?,
            upload_url: normalize_url("upload_url", &self.upload_url)?,
            request_timeout: self.request_timeout,
        })
    }

    pub fn with_registry_url(mut self, url: &str) -> Self {
        self.registry_url = url.to_string();
        self
    }

    pub fn with_gateway_url(mut self, url: &str) -> Self {
        self.gateway_url = url.to_string();
        self
    }

    pub fn with_upload_url(mut self, url: &str) -> Self {
        self.upload_url = url.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Local registry database path, overridable via `NOTARY_DB_PATH`
pub fn database_path_from_env() -> String {
    std::env::var("NOTARY_DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string())
}

fn normalize_url(name: &'static str, value: &str) -> Result<String, ConfigError> {
    let trimmed = value.trim().trim_end_matches('/');
    let invalid = || ConfigError::InvalidUrl {
        name,
        value: value.to_string(),
    };

    let url = reqwest::Url::parse(trimmed).map_err(|_| invalid())?;
    let has_host = url.host_str().map_or(false, |host| !host.is_empty());
    if !matches!(url.scheme(), "http" | "https") || !has_host {
        return Err(invalid());
    }

    Ok(trimmed.to_string())
}
