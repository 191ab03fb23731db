//! Live hazard source backed by the reporting API.
//!
//! Issues `GET <base>/posts?lat=..&lon=..&verified=..&maxDistance=..` and
//! hands the body to [`crate::catalog::parse_catalog`].

use std::time::Duration;

use async_trait::async_trait;
use roadwatch_hazard_models::HazardPoint;

use crate::config::ApiConfig;
use crate::retry::{self, RetryPolicy};
use crate::{CatalogQuery, HazardSource, SourceError};

const USER_AGENT: &str = concat!("roadwatch/", env!("CARGO_PKG_VERSION"));

/// Network tuning for [`HttpHazardSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConfig {
    /// Whole-request timeout.
    pub timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Retry budget for transient failures.
    pub retry: RetryPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

/// [`HazardSource`] that queries the reporting backend over HTTP.
#[derive(Debug, Clone)]
pub struct HttpHazardSource {
    client: reqwest::Client,
    endpoint: String,
    retry: RetryPolicy,
}

impl HttpHazardSource {
    /// Builds a source for `api` using `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn new(api: &ApiConfig, config: FetchConfig) -> Result<Self, SourceError> {
        Self::with_endpoint(api.hazards_endpoint(), config)
    }

    /// Builds a source for an explicit endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn with_endpoint(endpoint: String, config: FetchConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            retry: config.retry,
        })
    }

    /// The URL requests are sent to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn query_params(query: &CatalogQuery) -> [(&'static str, String); 4] {
    [
        ("lat", query.center.latitude.to_string()),
        ("lon", query.center.longitude.to_string()),
        ("verified", query.verified_only.to_string()),
        ("maxDistance", query.radius_km.to_string()),
    ]
}

#[async_trait]
impl HazardSource for HttpHazardSource {
    fn id(&self) -> &str {
        &self.endpoint
    }

    async fn fetch(&self, query: &CatalogQuery) -> Result<Vec<HazardPoint>, SourceError> {
        let params = query_params(query);
        log::debug!("GET {} {params:?}", self.endpoint);

        let body = retry::send_json(
            || self.client.get(&self.endpoint).query(&params),
            &self.retry,
        )
        .await?;

        let hazards = crate::catalog::parse_catalog(&body, chrono::Utc::now())?;
        log::debug!("{} returned {} hazards", self.endpoint, hazards.len());
        Ok(hazards)
    }
}
