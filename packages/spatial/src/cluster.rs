//! Fixed-grid marker clustering for the hazard map.
//!
//! The world is cut into a `g × g` grid where `g` doubles with every zoom
//! level (derived from the visible latitude span). Hazards falling into the
//! same cell are merged into one marker placed at their centroid.

use std::collections::{BTreeMap, BTreeSet};

use geo::{Centroid, MultiPoint, Point};
use roadwatch_hazard_models::{Coordinate, HazardCategory, HazardPoint};

/// Smallest latitude span considered when deriving the grid size.
pub const MIN_LATITUDE_DELTA: f64 = 1e-6;

/// Grid cell index: `x` counts longitude cells from -180, `y` latitude
/// cells from -90.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellKey {
    /// Longitude cell.
    pub x: i64,
    /// Latitude cell.
    pub y: i64,
}

impl std::fmt::Display for CellKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// A group of hazards sharing one grid cell.
#[derive(Debug, Clone)]
pub struct HazardCluster {
    /// Cell the members fall into.
    pub key: CellKey,
    /// Centroid of the member coordinates.
    pub center: Coordinate,
    /// Hazards in this cell, in input order.
    pub members: Vec<HazardPoint>,
}

impl HazardCluster {
    /// Number of hazards in the cluster.
    #[must_use]
    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// Returns the lone member when the cluster holds exactly one hazard.
    #[must_use]
    pub fn single(&self) -> Option<&HazardPoint> {
        match self.members.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}

/// Number of grid cells per axis for a map showing `latitude_delta` degrees
/// of latitude.
#[must_use]
pub fn grid_size(latitude_delta: f64) -> f64 {
    let delta = if latitude_delta.is_finite() && latitude_delta > 0.0 {
        latitude_delta.max(MIN_LATITUDE_DELTA)
    } else {
        MIN_LATITUDE_DELTA
    };

    (360.0 / delta).log2().floor().exp2().max(1.0)
}

/// Grid cell for a coordinate at the given grid size.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn cell_for(coordinate: Coordinate, grid: f64) -> CellKey {
    CellKey {
        x: ((coordinate.longitude + 180.0) * grid / 360.0).floor() as i64,
        y: ((coordinate.latitude + 90.0) * grid / 180.0).floor() as i64,
    }
}

/// Buckets hazards into grid clusters for display.
///
/// When `categories` is given, hazards of other categories are left out.
/// Clusters come back ordered by cell key.
#[must_use]
pub fn cluster_hazards(
    hazards: &[HazardPoint],
    latitude_delta: f64,
    categories: Option<&BTreeSet<HazardCategory>>,
) -> Vec<HazardCluster> {
    let grid = grid_size(latitude_delta);
    let mut cells: BTreeMap<CellKey, Vec<HazardPoint>> = BTreeMap::new();

    for hazard in hazards {
        if categories.is_some_and(|set| !set.contains(&hazard.category)) {
            continue;
        }
        cells
            .entry(cell_for(hazard.coordinate, grid))
            .or_default()
            .push(hazard.clone());
    }

    log::debug!(
        "Clustered {} hazards into {} cells (grid {grid})",
        hazards.len(),
        cells.len()
    );

    cells
        .into_iter()
        .map(|(key, members)| HazardCluster {
            key,
            center: centroid(&members),
            members,
        })
        .collect()
}

fn centroid(members: &[HazardPoint]) -> Coordinate {
    let points: MultiPoint<f64> = members
        .iter()
        .map(|h| Point::new(h.coordinate.longitude, h.coordinate.latitude))
        .collect();

    points.centroid().map_or_else(
        || members[0].coordinate,
        |c| Coordinate::new(c.y(), c.x()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::hazard;

    #[test]
    fn grid_size_doubles_per_zoom_level() {
        assert!((grid_size(0.0922) - 2048.0).abs() < f64::EPSILON);
        assert!((grid_size(0.0922 / 2.0) - 4096.0).abs() < f64::EPSILON);
    }

    #[test]
    fn grid_size_handles_degenerate_deltas() {
        assert!(grid_size(0.0) > 1e8);
        assert!(grid_size(f64::NAN) > 1e8);
        assert!((grid_size(10_000.0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn nearby_hazards_share_a_cluster() {
        let hazards = vec![
            hazard("1", 38.4546, 27.2012),
            hazard("2", 38.4547, 27.2013),
            hazard("3", 41.0082, 28.9784),
        ];

        let clusters = cluster_hazards(&hazards, 0.0922, None);
        assert_eq!(clusters.len(), 2);

        let big = clusters.iter().find(|c| c.count() == 2).unwrap();
        assert!((big.center.latitude - 38.45465).abs() < 1e-9);
        assert!((big.center.longitude - 27.20125).abs() < 1e-9);

        let lone = clusters.iter().find(|c| c.count() == 1).unwrap();
        assert_eq!(lone.single().unwrap().id, "3");
    }

    #[test]
    fn category_filter_excludes_hazards() {
        let mut sign = hazard("sign", 38.4546, 27.2012);
        sign.category = HazardCategory::Sign;
        let hazards = vec![sign, hazard("pothole", 38.4546, 27.2012)];

        let only_potholes = BTreeSet::from([HazardCategory::Pothole]);
        let clusters = cluster_hazards(&hazards, 0.0922, Some(&only_potholes));

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].single().unwrap().id, "pothole");
    }

    #[test]
    fn clusters_are_ordered_by_cell() {
        let hazards = vec![hazard("east", 0.0, 10.0), hazard("west", 0.0, -10.0)];
        let clusters = cluster_hazards(&hazards, 1.0, None);
        assert_eq!(clusters[0].members[0].id, "west");
        assert_eq!(clusters[1].members[0].id, "east");
    }

    #[test]
    fn cell_key_displays_like_marker_id() {
        assert_eq!(CellKey { x: 12, y: -3 }.to_string(), "12,-3");
    }
}
