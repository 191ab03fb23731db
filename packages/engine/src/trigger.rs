//! Catalog staleness rule.
//!
//! The catalog is refreshed once the user has covered half the search
//! radius since the last fetch. The boundary is inclusive.

use roadwatch_hazard_models::Coordinate;
use roadwatch_spatial::distance_meters;

/// Returns `true` if the catalog must be refetched for `current`.
///
/// Always `true` when no fetch has completed yet.
#[must_use]
pub fn should_refetch(current: Coordinate, last_fetch: Option<Coordinate>, radius_km: f64) -> bool {
    last_fetch.is_none_or(|last| is_stale(distance_meters(current, last), radius_km))
}

/// Returns `true` if having moved `distance_m` from the last fetch point
/// makes a catalog of radius `radius_km` stale.
#[must_use]
pub fn is_stale(distance_m: f64, radius_km: f64) -> bool {
    distance_m >= refetch_distance_meters(radius_km)
}

/// Distance from the last fetch point at which the catalog goes stale.
#[must_use]
pub fn refetch_distance_meters(radius_km: f64) -> f64 {
    radius_km * 1000.0 / 2.0
}
