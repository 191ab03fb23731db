#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Hazard catalog fetching.
//!
//! A [`HazardSource`] returns the hazards reported around a coordinate.
//! The live implementation ([`http::HttpHazardSource`]) talks to the
//! reporting backend; [`fixtures::FixtureSource`] serves the embedded
//! fixture set.
//!
//! Callers that must keep working while the backend is down use
//! [`fetch_catalog`], which never fails: any fetch error degrades to the
//! fixture set so proximity alerting keeps running on stale data rather than
//! silently stopping.

pub mod catalog;
pub mod config;
pub mod fixtures;
pub mod http;
pub mod retry;

use async_trait::async_trait;
use roadwatch_hazard_models::{Coordinate, HazardPoint};

/// Errors that can occur while fetching a hazard catalog.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status}")]
    Status {
        /// Status code returned by the server.
        status: u16,
    },

    /// The response body parsed but did not look like a catalog.
    #[error("Unexpected catalog shape: {message}")]
    Shape {
        /// Description of what was wrong.
        message: String,
    },

    /// The embedded fixture set could not be parsed.
    #[error("Fixture error: {message}")]
    Fixture {
        /// Parser error message.
        message: String,
    },
}

/// Parameters of a catalog fetch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatalogQuery {
    /// Center of the search area.
    pub center: Coordinate,
    /// Search radius in kilometers.
    pub radius_km: f64,
    /// Only return verified hazards.
    pub verified_only: bool,
}

/// Where the hazards of a [`CatalogFetch`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum CatalogOrigin {
    /// Fresh data from the hazard source.
    Live,
    /// Embedded fixture data used after a failed fetch.
    Fixture,
}

/// Outcome of [`fetch_catalog`].
#[derive(Debug, Clone)]
pub struct CatalogFetch {
    /// The hazards to use as the new catalog.
    pub hazards: Vec<HazardPoint>,
    /// Whether the hazards are live or fixture data.
    pub origin: CatalogOrigin,
}

/// Trait that all hazard catalog providers implement.
#[async_trait]
pub trait HazardSource: Send + Sync {
    /// Returns a short identifier for this source, used in logs.
    fn id(&self) -> &str;

    /// Fetches the hazards around `query.center`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the request, the response status, or the
    /// response body is unusable.
    async fn fetch(&self, query: &CatalogQuery) -> Result<Vec<HazardPoint>, SourceError>;
}

/// Fetches a catalog, falling back to the fixture set on any failure.
///
/// When `query.verified_only` is set, unverified hazards are removed from
/// whatever the source returned, since the server-side filter is not
/// relied upon.
pub async fn fetch_catalog(source: &dyn HazardSource, query: &CatalogQuery) -> CatalogFetch {
    log::info!(
        "Fetching hazard catalog from {} around {} (radius {} km, verified_only={})",
        source.id(),
        query.center,
        query.radius_km,
        query.verified_only,
    );

    let (hazards, origin) = match source.fetch(query).await {
        Ok(hazards) => (hazards, CatalogOrigin::Live),
        Err(e) => {
            log::warn!(
                "Hazard fetch from {} failed, falling back to fixtures: {e}",
                source.id()
            );
            (fixtures::fixture_hazards(), CatalogOrigin::Fixture)
        }
    };

    let hazards = if query.verified_only {
        hazards.into_iter().filter(|h| h.verified).collect()
    } else {
        hazards
    };

    log::info!("Hazard catalog ready: {} hazards ({origin})", hazards.len());

    CatalogFetch { hazards, origin }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSource;

    #[async_trait]
    impl HazardSource for FailingSource {
        fn id(&self) -> &'static str {
            "failing"
        }

        async fn fetch(&self, _query: &CatalogQuery) -> Result<Vec<HazardPoint>, SourceError> {
            Err(SourceError::Status { status: 503 })
        }
    }

    struct StaticSource(Vec<HazardPoint>);

    #[async_trait]
    impl HazardSource for StaticSource {
        fn id(&self) -> &'static str {
            "static"
        }

        async fn fetch(&self, _query: &CatalogQuery) -> Result<Vec<HazardPoint>, SourceError> {
            Ok(self.0.clone())
        }
    }

    fn query(verified_only: bool) -> CatalogQuery {
        CatalogQuery {
            center: Coordinate::new(38.4546, 27.2012),
            radius_km: 3.0,
            verified_only,
        }
    }

    #[tokio::test]
    async fn failure_falls_back_to_fixtures() {
        let fetch = fetch_catalog(&FailingSource, &query(true)).await;
        assert_eq!(fetch.origin, CatalogOrigin::Fixture);
        assert!(!fetch.hazards.is_empty());
    }

    #[tokio::test]
    async fn verified_only_filters_live_results() {
        let mut unverified = fixtures::fixture_hazards()[0].clone();
        unverified.id = "unverified".to_string();
        unverified.verified = false;
        let mut verified = unverified.clone();
        verified.id = "verified".to_string();
        verified.verified = true;

        let source = StaticSource(vec![unverified, verified]);

        let fetch = fetch_catalog(&source, &query(true)).await;
        assert_eq!(fetch.origin, CatalogOrigin::Live);
        let ids: Vec<&str> = fetch.hazards.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, ["verified"]);

        let fetch = fetch_catalog(&source, &query(false)).await;
        assert_eq!(fetch.hazards.len(), 2);
    }

    #[tokio::test]
    async fn empty_live_catalog_is_not_replaced() {
        let fetch = fetch_catalog(&StaticSource(Vec::new()), &query(true)).await;
        assert_eq!(fetch.origin, CatalogOrigin::Live);
        assert!(fetch.hazards.is_empty());
    }
}
