use crate::backend::BackendKind;
use crate::error::DisstatError;
use crate::logging::redact_api_key;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl From<ConfigValidationError> for DisstatError {
    fn from(err: ConfigValidationError) -> Self {
        DisstatError::Config(err.to_string())
    }
}

/// Statistics client configuration
#[derive(Serialize, Deserialize, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    #[serde(default)]
    pub backend: BackendKind,
    /// Overrides the backend's default service origin
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(with = "duration_serde", default = "default_report_interval")]
    pub report_interval: Duration,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_report_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_user_agent() -> String {
    format!("disstat.rs/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            backend: BackendKind::default(),
            base_url: None,
            report_interval: default_report_interval(),
            request_timeout_ms: default_request_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &redact_api_key(&self.api_key))
            .field("backend", &self.backend)
            .field("base_url", &self.base_url)
            .field("report_interval", &self.report_interval)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>, backend: BackendKind) -> Self {
        Self {
            api_key: api_key.into(),
            backend,
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    /// Layer defaults, an optional TOML file and `DISSTAT_*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self, DisstatError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = path {
            info!("Loading disstat configuration from: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("DISSTAT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: ClientConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Service origin without a trailing slash
    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(self.backend.backend().default_base_url)
            .trim_end_matches('/')
            .to_string()
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigValidationError::MissingField(
                "api_key cannot be empty".to_string(),
            ));
        }
        if self.report_interval.as_secs() < 1 {
            return Err(ConfigValidationError::InvalidValue(
                "report_interval must be >= 1 second".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "request_timeout_ms must be > 0".to_string(),
            ));
        }
        if let Some(base_url) = &self.base_url {
            if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "base_url must start with http:// or https://: got '{base_url}'"
                )));
            }
        }
        Ok(())
    }
}
