//! Embedded fixture catalog.
//!
//! `fixtures/hazards.toml` is baked into the binary at compile time via
//! [`include_str!`]. It is what [`crate::fetch_catalog`] falls back to when
//! the live source is unreachable, and what [`FixtureSource`] serves for
//! offline use.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roadwatch_hazard_models::{Coordinate, HazardCategory, HazardPoint};
use serde::Deserialize;

use crate::{CatalogQuery, HazardSource, SourceError};

const FIXTURE_TOML: &str = include_str!("../fixtures/hazards.toml");

#[derive(Debug, Deserialize)]
struct FixtureFile {
    hazards: Vec<FixtureHazard>,
}

#[derive(Debug, Deserialize)]
struct FixtureHazard {
    id: String,
    latitude: f64,
    longitude: f64,
    category: HazardCategory,
    reporter_name: String,
    #[serde(default)]
    description: String,
    verified: bool,
    created_at: DateTime<Utc>,
}

impl From<FixtureHazard> for HazardPoint {
    fn from(f: FixtureHazard) -> Self {
        Self {
            id: f.id,
            coordinate: Coordinate::new(f.latitude, f.longitude),
            category: f.category,
            reporter_name: f.reporter_name,
            description: f.description,
            verified: f.verified,
            created_at: f.created_at,
            image_url: None,
            status: None,
        }
    }
}

/// Parses a fixture TOML document.
///
/// # Errors
///
/// Returns [`SourceError::Fixture`] if the document is malformed.
pub fn parse_fixtures(toml_str: &str) -> Result<Vec<HazardPoint>, SourceError> {
    let file: FixtureFile = toml::de::from_str(toml_str).map_err(|e| SourceError::Fixture {
        message: e.to_string(),
    })?;
    Ok(file.hazards.into_iter().map(Into::into).collect())
}

/// Returns the embedded fixture hazards.
///
/// # Panics
///
/// Panics if the embedded TOML is malformed (this is a compile-time
/// guarantee since the file is embedded and covered by tests).
#[must_use]
pub fn fixture_hazards() -> Vec<HazardPoint> {
    parse_fixtures(FIXTURE_TOML)
        .unwrap_or_else(|e| panic!("Failed to parse fixtures/hazards.toml: {e}"))
}

/// A [`HazardSource`] that always answers with the fixture set.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureSource;

#[async_trait]
impl HazardSource for FixtureSource {
    fn id(&self) -> &'static str {
        "fixtures"
    }

    async fn fetch(&self, _query: &CatalogQuery) -> Result<Vec<HazardPoint>, SourceError> {
        Ok(fixture_hazards())
    }
}
