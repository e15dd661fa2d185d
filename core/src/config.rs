//! Client configuration.
//!
//! `ClientConfig` is a plain struct validated once when the client is built.
//! It can also be loaded from `WEEBSH_*` environment variables, e.g.
//! `WEEBSH_TOKEN`, `WEEBSH_TOKEN_TYPE=wolke`, `WEEBSH_ENVIRONMENT=staging`,
//! `WEEBSH_BOT_ID`.

use std::time::Duration;

use serde::Deserialize;

const ENV_PREFIX: &str = "WEEBSH";
const ENV_SEPARATOR: &str = "__";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Deployment the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Staging,
}

impl Environment {
    pub fn api_base(self) -> &'static str {
        match self {
            Environment::Production => "https://api.weeb.sh",
            Environment::Staging => "https://staging.weeb.sh",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Staging => "staging",
        }
    }
}

/// Scheme of the `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    #[default]
    Bearer,
    Wolke,
}

impl TokenType {
    pub fn prefix(self) -> &'static str {
        match self {
            TokenType::Bearer => "Bearer",
            TokenType::Wolke => "Wolke",
        }
    }

    /// `Authorization` header value for `token`.
    pub fn format(self, token: &str) -> String {
        format!("{} {token}", self.prefix())
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub token: String,
    #[serde(default)]
    pub token_type: TokenType,
    #[serde(default)]
    pub environment: Environment,
    /// Overrides the environment's base URL (mock servers, proxies).
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Required by the reputation endpoints.
    #[serde(default)]
    pub bot_id: Option<u64>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(token_type: TokenType, token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            token_type,
            environment: Environment::default(),
            api_base: None,
            user_agent: None,
            bot_id: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Load from `WEEBSH_*` environment variables and validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        let source = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?;
        let config: ClientConfig = source.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::Invalid("token must not be empty".into()));
        }
        let base = self.api_base();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "api base must be an http(s) URL, got {base}"
            )));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout must be positive".into()));
        }
        Ok(())
    }

    /// Base URL without a trailing slash.
    pub fn api_base(&self) -> &str {
        self.api_base
            .as_deref()
            .unwrap_or_else(|| self.environment.api_base())
            .trim_end_matches('/')
    }

    pub fn user_agent(&self) -> String {
        self.user_agent.clone().unwrap_or_else(|| {
            format!(
                "weebsh-rs/{}/{}",
                env!("CARGO_PKG_VERSION"),
                self.environment.as_str()
            )
        })
    }

    pub fn authorization(&self) -> String {
        self.token_type.format(&self.token)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
