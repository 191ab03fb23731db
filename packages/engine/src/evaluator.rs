//! Proximity evaluation with per-epoch suppression.

use std::collections::BTreeSet;

use roadwatch_hazard_models::{Coordinate, HazardPoint};
use roadwatch_spatial::distance_meters;

/// Finds hazards that newly crossed the alert threshold and marks them
/// alerted.
///
/// Hazards whose id is already in `already_alerted` are skipped regardless
/// of distance. Every returned hazard has been inserted into
/// `already_alerted`. A non-finite threshold flags nothing.
pub fn newly_alerted<'a>(
    position: Coordinate,
    catalog: &'a [HazardPoint],
    alert_distance_m: f64,
    already_alerted: &mut BTreeSet<String>,
) -> Vec<(&'a HazardPoint, f64)> {
    if !alert_distance_m.is_finite() {
        return Vec::new();
    }

    let mut flagged = Vec::new();

    for hazard in catalog {
        if already_alerted.contains(&hazard.id) {
            continue;
        }
        let d = distance_meters(position, hazard.coordinate);
        if d <= alert_distance_m {
            already_alerted.insert(hazard.id.clone());
            flagged.push((hazard, d));
        }
    }

    flagged
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use roadwatch_hazard_models::HazardCategory;
    use roadwatch_spatial::EARTH_RADIUS_M;

    use super::*;

    const HERE: Coordinate = Coordinate::new(38.4546, 27.2012);

    fn hazard_north(id: &str, meters: f64) -> HazardPoint {
        let degrees = meters / (EARTH_RADIUS_M * std::f64::consts::PI / 180.0);
        HazardPoint {
            id: id.to_string(),
            coordinate: Coordinate::new(HERE.latitude + degrees, HERE.longitude),
            category: HazardCategory::Pothole,
            reporter_name: String::new(),
            description: String::new(),
            verified: true,
            created_at: Utc::now(),
            image_url: None,
            status: None,
        }
    }

    #[test]
    fn flags_hazards_within_threshold_once() {
        let catalog = vec![hazard_north("near", 8.0), hazard_north("far", 80.0)];
        let mut alerted = BTreeSet::new();

        let first = newly_alerted(HERE, &catalog, 10.0, &mut alerted);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].0.id, "near");
        assert!((first[0].1 - 8.0).abs() < 0.01);

        let second = newly_alerted(HERE, &catalog, 10.0, &mut alerted);
        assert!(second.is_empty());
        assert!(alerted.contains("near"));
    }

    #[test]
    fn threshold_is_inclusive() {
        let catalog = vec![hazard_north("edge", 10.0)];
        let mut alerted = BTreeSet::new();
        assert_eq!(newly_alerted(HERE, &catalog, 10.001, &mut alerted).len(), 1);
    }

    #[test]
    fn simultaneous_hazards_each_alert() {
        let catalog = vec![
            hazard_north("a", 3.0),
            hazard_north("b", 6.0),
            hazard_north("c", 9.0),
        ];
        let mut alerted = BTreeSet::new();

        let flagged = newly_alerted(HERE, &catalog, 10.0, &mut alerted);
        let ids: Vec<&str> = flagged.iter().map(|(h, _)| h.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn non_finite_threshold_is_a_no_op() {
        let catalog = vec![hazard_north("a", 0.0)];
        let mut alerted = BTreeSet::new();
        assert!(newly_alerted(HERE, &catalog, f64::NAN, &mut alerted).is_empty());
        assert!(newly_alerted(HERE, &catalog, f64::INFINITY, &mut alerted).is_empty());
        assert!(alerted.is_empty());
    }
}
