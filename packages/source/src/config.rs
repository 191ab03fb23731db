//! Backend endpoint selection.
//!
//! `ROADWATCH_ENV` picks one of the known deployments and
//! `ROADWATCH_API_URL` overrides the base URL outright.

use std::str::FromStr;

/// Environment variable naming the deployment.
pub const ENV_VAR: &str = "ROADWATCH_ENV";

/// Environment variable overriding the API base URL.
pub const API_URL_VAR: &str = "ROADWATCH_API_URL";

/// Known backend deployments.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Environment {
    /// Local backend on the development network.
    #[default]
    Development,
    /// Pre-production deployment.
    Staging,
    /// Public deployment.
    Production,
}

impl Environment {
    /// Base URL of this deployment's API.
    #[must_use]
    pub const fn base_url(self) -> &'static str {
        match self {
            Self::Development => "http://192.168.1.100:5000",
            Self::Staging => "https://staging.roaport.com/api",
            Self::Production => "https://api.roaport.com",
        }
    }
}

/// Resolved API location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Deployment the base URL was derived from.
    pub environment: Environment,
    /// API base URL without a trailing slash.
    pub base_url: String,
}

impl ApiConfig {
    /// Config for a known deployment.
    #[must_use]
    pub fn for_environment(environment: Environment) -> Self {
        Self {
            environment,
            base_url: environment.base_url().to_string(),
        }
    }

    /// Config pointing at an arbitrary base URL.
    #[must_use]
    pub fn with_base_url(environment: Environment, base_url: &str) -> Self {
        Self {
            environment,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Reads [`ENV_VAR`] and [`API_URL_VAR`].
    ///
    /// An unknown environment name falls back to development with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_values(
            std::env::var(ENV_VAR).ok().as_deref(),
            std::env::var(API_URL_VAR).ok().as_deref(),
        )
    }

    fn from_values(env: Option<&str>, api_url: Option<&str>) -> Self {
        let environment = match env.map(str::trim).filter(|s| !s.is_empty()) {
            None => Environment::default(),
            Some(raw) => Environment::from_str(raw).unwrap_or_else(|_| {
                log::warn!("Unknown {ENV_VAR} value {raw:?}, using development");
                Environment::default()
            }),
        };

        match api_url.map(str::trim).filter(|s| !s.is_empty()) {
            Some(url) => Self::with_base_url(environment, url),
            None => Self::for_environment(environment),
        }
    }

    /// URL of the hazard listing endpoint.
    #[must_use]
    pub fn hazards_endpoint(&self) -> String {
        format!("{}/posts", self.base_url)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::for_environment(Environment::default())
    }
}
