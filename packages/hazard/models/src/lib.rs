#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Hazard report taxonomy and coordinate value types.
//!
//! Every crate in the roadwatch workspace speaks in terms of the types
//! defined here: a WGS84 [`Coordinate`], the [`HazardCategory`] a reporter
//! picked when submitting, and the immutable [`HazardPoint`] produced by a
//! catalog fetch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinate {
    /// Latitude in degrees, `-90..=90`.
    pub latitude: f64,
    /// Longitude in degrees, `-180..=180`.
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a coordinate from latitude and longitude in degrees.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Returns `true` if both components are finite and inside the WGS84
    /// latitude/longitude ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6},{:.6}", self.latitude, self.longitude)
    }
}

/// The kind of road issue a hazard report describes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum HazardCategory {
    /// Hole or depression in the road surface
    Pothole,
    /// Missing, damaged or obscured traffic sign
    Sign,
    /// Broken or obstructed pedestrian walkway
    Sidewalk,
    /// Anything that doesn't fit the other categories
    #[serde(alias = "none")]
    #[strum(to_string = "other", serialize = "none")]
    Other,
}

impl HazardCategory {
    /// Maps a raw `type` string from the backend to a category.
    ///
    /// Matching is case-insensitive. Unknown values (including the
    /// backend's `"none"`) become [`HazardCategory::Other`].
    #[must_use]
    pub fn from_raw(raw: &str) -> Self {
        raw.trim().parse().unwrap_or(Self::Other)
    }
}

/// Moderation state of a submitted report.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ReportStatus {
    /// Awaiting moderation
    Pending,
    /// Rejected by a moderator
    Rejected,
    /// Repair scheduled or in progress
    Provision,
    /// Repaired
    Fixed,
}

impl ReportStatus {
    /// Human-readable label for display.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Rejected => "Rejected",
            Self::Provision => "In Progress",
            Self::Fixed => "Fixed",
        }
    }
}

/// One reported road issue as received from the hazard catalog.
///
/// Hazard points are immutable once received. A catalog refresh replaces
/// the whole set; `id` is stable across fetches so alert suppression can
/// match the same report in successive catalogs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HazardPoint {
    /// Backend identifier of the report.
    pub id: String,
    /// Where the issue was reported.
    pub coordinate: Coordinate,
    /// What kind of issue it is.
    pub category: HazardCategory,
    /// Display name of the reporter.
    pub reporter_name: String,
    /// Free-text description, may be empty.
    pub description: String,
    /// Whether a moderator has verified the report.
    pub verified: bool,
    /// When the report was submitted.
    pub created_at: DateTime<Utc>,
    /// Photo URL, if the backend sent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Moderation state, if the backend sent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ReportStatus>,
}
