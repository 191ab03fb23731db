#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geodesic helpers shared by the proximity engine and the map view.
//!
//! Distances use the haversine formula on a spherical Earth. That is
//! accurate to well under a percent at the tens-of-meters to
//! tens-of-kilometers scales alerting cares about, and it never fails for
//! valid coordinates.

pub mod cluster;

use roadwatch_hazard_models::{Coordinate, HazardPoint};

/// Spherical Earth radius used by [`distance_meters`].
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates, in meters.
///
/// Symmetric, zero for identical inputs, and never negative.
#[must_use]
pub fn distance_meters(a: Coordinate, b: Coordinate) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push h a hair outside [0, 1] for antipodal points
    let h = h.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Finds the hazard closest to `position`.
///
/// Returns the hazard together with its distance in meters, or `None` for
/// an empty slice. Ties keep the first minimum in iteration order.
#[must_use]
pub fn nearest(position: Coordinate, hazards: &[HazardPoint]) -> Option<(&HazardPoint, f64)> {
    let mut best: Option<(&HazardPoint, f64)> = None;

    for hazard in hazards {
        let d = distance_meters(position, hazard.coordinate);
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((hazard, d)),
        }
    }

    best
}

/// Returns every hazard within `max_meters` of `position`, closest first.
#[must_use]
pub fn within(
    position: Coordinate,
    hazards: &[HazardPoint],
    max_meters: f64,
) -> Vec<(&HazardPoint, f64)> {
    let mut hits: Vec<(&HazardPoint, f64)> = hazards
        .iter()
        .map(|h| (h, distance_meters(position, h.coordinate)))
        .filter(|(_, d)| *d <= max_meters)
        .collect();
    hits.sort_by(|a, b| a.1.total_cmp(&b.1));
    hits
}
