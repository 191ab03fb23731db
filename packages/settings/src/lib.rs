#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! User-configured alert settings.
//!
//! [`AlertSettings`] is the single source of truth for how the proximity
//! engine behaves. Values coming from the UI or from disk are never trusted:
//! every read path goes through [`AlertSettings::sanitized`], which clamps
//! out-of-range numbers instead of rejecting them.
//!
//! Persistence is a plain key-value contract ([`KeyValueStore`]); the
//! settings blob lives as JSON under [`SETTINGS_KEY`].

pub mod store;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use store::{FileStore, KeyValueStore, MemoryStore, SettingsStore};

/// Key the serialized settings blob is stored under.
pub const SETTINGS_KEY: &str = "alert_settings";

/// Allowed catalog search radius, in kilometers.
pub const SEARCH_RADIUS_KM_RANGE: (f64, f64) = (1.0, 10.0);

/// Allowed alert threshold, in meters.
pub const ALERT_DISTANCE_M_RANGE: (f64, f64) = (5.0, 50.0);

/// Errors from settings persistence.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Reading or writing the backing storage failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The settings blob could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The key contains characters the store cannot represent.
    #[error("Invalid key: {key}")]
    InvalidKey {
        /// The rejected key.
        key: String,
    },
}

/// Sound played when a hazard alert fires.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum AlertTone {
    /// Soft two-note chime
    #[default]
    Chime,
    /// Short electronic beep
    Beep,
    /// Rising siren, for noisy environments
    Siren,
    /// Single bell strike
    Bell,
}

/// Proximity alert configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertSettings {
    /// Master switch for the proximity engine.
    pub is_active: bool,
    /// Radius of the catalog fetch around the user, in kilometers.
    pub search_radius_km: f64,
    /// Distance at which a hazard triggers an alert, in meters.
    pub alert_distance_meters: f64,
    /// Sound used for alerts.
    pub tone_id: AlertTone,
    /// Only fetch verified hazards.
    pub verified_only: bool,
    /// Alert volume, `0.0..=1.0`.
    pub volume: f64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            is_active: false,
            search_radius_km: 3.0,
            alert_distance_meters: 20.0,
            tone_id: AlertTone::Chime,
            verified_only: true,
            volume: 0.8,
        }
    }
}

impl AlertSettings {
    /// Returns a copy with every numeric field clamped into its valid
    /// range. Non-finite values fall back to the default for that field.
    #[must_use]
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();

        let sanitized = Self {
            search_radius_km: clamp_or(
                self.search_radius_km,
                SEARCH_RADIUS_KM_RANGE,
                defaults.search_radius_km,
            ),
            alert_distance_meters: clamp_or(
                self.alert_distance_meters,
                ALERT_DISTANCE_M_RANGE,
                defaults.alert_distance_meters,
            ),
            volume: clamp_or(self.volume, (0.0, 1.0), defaults.volume),
            ..self
        };

        if sanitized != self {
            log::debug!("Clamped alert settings {self:?} -> {sanitized:?}");
        }

        sanitized
    }

    /// Returns settings with `patch` merged in and re-sanitized.
    #[must_use]
    pub fn with_patch(self, patch: &SettingsPatch) -> Self {
        Self {
            is_active: patch.is_active.unwrap_or(self.is_active),
            search_radius_km: patch.search_radius_km.unwrap_or(self.search_radius_km),
            alert_distance_meters: patch
                .alert_distance_meters
                .unwrap_or(self.alert_distance_meters),
            tone_id: patch.tone_id.unwrap_or(self.tone_id),
            verified_only: patch.verified_only.unwrap_or(self.verified_only),
            volume: patch.volume.unwrap_or(self.volume),
        }
        .sanitized()
    }
}

fn clamp_or(value: f64, (min, max): (f64, f64), fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

/// A partial update to [`AlertSettings`]. `None` fields are left as-is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    /// New master switch state.
    pub is_active: Option<bool>,
    /// New search radius in kilometers.
    pub search_radius_km: Option<f64>,
    /// New alert threshold in meters.
    pub alert_distance_meters: Option<f64>,
    /// New alert tone.
    pub tone_id: Option<AlertTone>,
    /// New verified-only filter.
    pub verified_only: Option<bool>,
    /// New volume.
    pub volume: Option<f64>,
}

impl SettingsPatch {
    /// Returns `true` if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
