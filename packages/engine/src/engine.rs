//! The proximity engine state machine.
//!
//! [`ProximityEngine`] is synchronous and owns all runtime state. It never
//! performs I/O itself: a position update that finds the catalog stale hands
//! back a [`FetchRequest`], and the host (normally
//! [`crate::session::AlertSession`]) runs the fetch and reports the result
//! through [`ProximityEngine::on_catalog_fetched`].
//!
//! ```text
//! Inactive --activate--> AcquiringFix --first fix--> Active
//!     ^                        |                        |
//!     +-------deactivate-------+------------------------+
//! ```

use std::collections::BTreeSet;

use roadwatch_hazard_models::{Coordinate, HazardPoint};
use roadwatch_settings::{AlertSettings, SettingsPatch};
use roadwatch_source::{CatalogFetch, CatalogQuery};
use serde::Serialize;
use strum_macros::{AsRefStr, Display};

use crate::alert::{AlertEvent, AlertPresenter};
use crate::{evaluator, trigger};

/// Lifecycle phase of an engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EnginePhase {
    /// Alerting is switched off. No position stream, empty catalog.
    #[default]
    Inactive,
    /// Switched on, waiting for the first position fix.
    AcquiringFix,
    /// Switched on with a known position.
    Active,
}

/// Closest hazard to the current position, for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearestHazard {
    /// The hazard.
    pub hazard: HazardPoint,
    /// Its distance from the current position, in meters.
    pub distance_meters: f64,
}

/// A catalog fetch the host should run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchRequest {
    /// Engine generation that issued the request. Results from an older
    /// generation are discarded.
    pub generation: u64,
    /// What to fetch.
    pub query: CatalogQuery,
}

/// What a position update produced.
#[derive(Debug, Default)]
pub struct PositionOutcome {
    /// Alerts fired by this update, in catalog order.
    pub alerts: Vec<AlertEvent>,
    /// A fetch to start, if the catalog went stale and none is in flight.
    pub fetch: Option<FetchRequest>,
}

/// Read-only view of the engine for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    /// Current lifecycle phase.
    pub phase: EnginePhase,
    /// Closest hazard, if any.
    pub nearest: Option<NearestHazard>,
    /// Number of hazards in the catalog.
    pub catalog_len: usize,
    /// Number of hazards alerted in the current epoch.
    pub alerted_count: usize,
    /// Center of the last completed fetch.
    pub last_fetch: Option<Coordinate>,
    /// Last known position.
    pub position: Option<Coordinate>,
    /// Whether a catalog fetch is outstanding.
    pub fetch_in_flight: bool,
}

#[derive(Debug, Default)]
struct EngineState {
    current_position: Option<Coordinate>,
    last_fetch_position: Option<Coordinate>,
    catalog: Vec<HazardPoint>,
    already_alerted: BTreeSet<String>,
    nearest: Option<NearestHazard>,
}

impl EngineState {
    fn refresh_nearest(&mut self) {
        self.nearest = self.current_position.and_then(|position| {
            roadwatch_spatial::nearest(position, &self.catalog).map(|(hazard, d)| NearestHazard {
                hazard: hazard.clone(),
                distance_meters: d,
            })
        });
    }
}

/// Proximity alerting state machine.
#[derive(Debug)]
pub struct ProximityEngine<P> {
    settings: AlertSettings,
    phase: EnginePhase,
    state: EngineState,
    generation: u64,
    in_flight: Option<u64>,
    presenter: P,
}

impl<P: AlertPresenter> ProximityEngine<P> {
    /// Creates an inactive engine. Call [`Self::activate`] to start it.
    #[must_use]
    pub fn new(settings: AlertSettings, presenter: P) -> Self {
        Self {
            settings: settings.sanitized(),
            phase: EnginePhase::Inactive,
            state: EngineState::default(),
            generation: 0,
            in_flight: None,
            presenter,
        }
    }

    /// Current settings.
    #[must_use]
    pub const fn settings(&self) -> &AlertSettings {
        &self.settings
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> EnginePhase {
        self.phase
    }

    /// The current catalog.
    #[must_use]
    pub fn catalog(&self) -> &[HazardPoint] {
        &self.state.catalog
    }

    /// The presenter alerts are delivered to.
    #[must_use]
    pub const fn presenter(&self) -> &P {
        &self.presenter
    }

    /// Switches the engine on with `settings`, starting a fresh session.
    ///
    /// Returns `false` (and only updates the settings) if it was already on.
    pub fn activate(&mut self, settings: AlertSettings) -> bool {
        self.settings = AlertSettings {
            is_active: true,
            ..settings.sanitized()
        };

        if self.phase != EnginePhase::Inactive {
            return false;
        }

        self.generation += 1;
        self.state = EngineState::default();
        self.in_flight = None;
        self.transition(EnginePhase::AcquiringFix);
        true
    }

    /// Switches the engine off and drops all runtime state.
    ///
    /// Any fetch still in flight is orphaned: its result will be ignored.
    /// Returns `false` if the engine was already off.
    pub fn deactivate(&mut self) -> bool {
        self.settings.is_active = false;

        if self.phase == EnginePhase::Inactive {
            return false;
        }

        self.generation += 1;
        self.state = EngineState::default();
        self.in_flight = None;
        self.transition(EnginePhase::Inactive);
        true
    }

    /// Applies a settings change.
    ///
    /// Switching `is_active` activates or deactivates the engine. Other
    /// changes take effect on the next update; they never clear the
    /// suppression set or force a refetch.
    pub fn update_settings(&mut self, patch: &SettingsPatch) {
        let updated = self.settings.with_patch(patch);
        log::debug!("Settings updated: {updated:?}");

        match (self.phase, updated.is_active) {
            (EnginePhase::Inactive, true) => {
                self.activate(updated);
            }
            (EnginePhase::AcquiringFix | EnginePhase::Active, false) => {
                self.settings = updated;
                self.deactivate();
            }
            _ => self.settings = updated,
        }
    }

    /// Handles one position sample.
    ///
    /// Runs the refetch check, fires alerts for hazards that newly crossed
    /// the threshold, and recomputes the nearest hazard. A no-op while
    /// inactive.
    pub fn on_position_update(&mut self, position: Coordinate) -> PositionOutcome {
        if self.phase == EnginePhase::Inactive {
            log::trace!("Ignoring position {position} while inactive");
            return PositionOutcome::default();
        }

        self.state.current_position = Some(position);
        if self.phase == EnginePhase::AcquiringFix {
            self.transition(EnginePhase::Active);
        }

        let fetch = self.next_fetch(position);

        let flagged = evaluator::newly_alerted(
            position,
            &self.state.catalog,
            self.settings.alert_distance_meters,
            &mut self.state.already_alerted,
        );
        let alerts: Vec<AlertEvent> = flagged
            .into_iter()
            .map(|(hazard, d)| AlertEvent {
                hazard: hazard.clone(),
                distance_meters: d,
                tone: self.settings.tone_id,
                volume: self.settings.volume,
            })
            .collect();

        for alert in &alerts {
            log::info!(
                "Hazard {} ({}) within {:.1} m",
                alert.hazard.id,
                alert.hazard.category,
                alert.distance_meters
            );
            if let Err(e) = self.presenter.present(alert) {
                log::error!("Failed to present alert for {}: {e}", alert.hazard.id);
            }
        }

        self.state.refresh_nearest();

        PositionOutcome { alerts, fetch }
    }

    fn next_fetch(&mut self, position: Coordinate) -> Option<FetchRequest> {
        if self.in_flight.is_some() {
            return None;
        }
        if !trigger::should_refetch(
            position,
            self.state.last_fetch_position,
            self.settings.search_radius_km,
        ) {
            return None;
        }

        self.in_flight = Some(self.generation);
        Some(FetchRequest {
            generation: self.generation,
            query: CatalogQuery {
                center: position,
                radius_km: self.settings.search_radius_km,
                verified_only: self.settings.verified_only,
            },
        })
    }

    /// Installs the result of `request` as the new catalog.
    ///
    /// Starts a new epoch: the suppression set is cleared and the fetch
    /// center becomes the last fetch position. Results from an older
    /// generation are discarded. Returns whether the result was applied.
    pub fn on_catalog_fetched(&mut self, request: &FetchRequest, fetch: CatalogFetch) -> bool {
        if request.generation != self.generation || self.phase == EnginePhase::Inactive {
            log::debug!(
                "Discarding stale catalog from generation {} (now {})",
                request.generation,
                self.generation
            );
            return false;
        }

        self.in_flight = None;

        let mut seen = BTreeSet::new();
        let catalog: Vec<HazardPoint> = fetch
            .hazards
            .into_iter()
            .filter(|h| seen.insert(h.id.clone()))
            .collect();

        log::info!(
            "Catalog replaced: {} hazards ({}) around {}, resetting {} suppressed",
            catalog.len(),
            fetch.origin,
            request.query.center,
            self.state.already_alerted.len(),
        );

        self.state.catalog = catalog;
        self.state.last_fetch_position = Some(request.query.center);
        self.state.already_alerted.clear();
        self.state.refresh_nearest();
        true
    }

    /// Forgets an in-flight fetch that will never report back, so the next
    /// stale position can issue a new one.
    pub fn fetch_abandoned(&mut self, request: &FetchRequest) {
        if self.in_flight == Some(request.generation) {
            log::warn!("Catalog fetch abandoned");
            self.in_flight = None;
        }
    }

    /// Returns a display snapshot.
    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            phase: self.phase,
            nearest: self.state.nearest.clone(),
            catalog_len: self.state.catalog.len(),
            alerted_count: self.state.already_alerted.len(),
            last_fetch: self.state.last_fetch_position,
            position: self.state.current_position,
            fetch_in_flight: self.in_flight.is_some(),
        }
    }

    fn transition(&mut self, to: EnginePhase) {
        log::info!("Proximity engine {} -> {to}", self.phase);
        self.phase = to;
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use roadwatch_hazard_models::HazardCategory;
    use roadwatch_source::CatalogOrigin;
    use roadwatch_spatial::EARTH_RADIUS_M;

    use super::*;
    use crate::alert::test_support::{BrokenPresenter, RecordingPresenter};

    const HERE: Coordinate = Coordinate::new(38.4546, 27.2012);

    fn degrees(meters: f64) -> f64 {
        meters / (EARTH_RADIUS_M * std::f64::consts::PI / 180.0)
    }

    fn north(meters: f64) -> Coordinate {
        Coordinate::new(HERE.latitude + degrees(meters), HERE.longitude)
    }

    fn hazard_north(id: &str, meters: f64) -> HazardPoint {
        HazardPoint {
            id: id.to_string(),
            coordinate: north(meters),
            category: HazardCategory::Pothole,
            reporter_name: "tester".to_string(),
            description: String::new(),
            verified: true,
            created_at: Utc::now(),
            image_url: None,
            status: None,
        }
    }

    fn live(hazards: Vec<HazardPoint>) -> CatalogFetch {
        CatalogFetch {
            hazards,
            origin: CatalogOrigin::Live,
        }
    }

    fn settings(alert_distance_meters: f64) -> AlertSettings {
        AlertSettings {
            is_active: true,
            search_radius_km: 3.0,
            alert_distance_meters,
            ..AlertSettings::default()
        }
    }

    /// An active engine at `HERE` whose first fetch returned `hazards`.
    fn loaded(hazards: Vec<HazardPoint>, alert_distance: f64) -> ProximityEngine<RecordingPresenter> {
        let mut engine = ProximityEngine::new(settings(alert_distance), RecordingPresenter::default());
        engine.activate(settings(alert_distance));
        let outcome = engine.on_position_update(HERE);
        let request = outcome.fetch.expect("first fix should fetch");
        assert!(engine.on_catalog_fetched(&request, live(hazards)));
        engine
    }

    #[test]
    fn lifecycle_transitions() {
        let mut engine = ProximityEngine::new(settings(10.0), RecordingPresenter::default());
        assert_eq!(engine.phase(), EnginePhase::Inactive);

        assert!(engine.activate(settings(10.0)));
        assert_eq!(engine.phase(), EnginePhase::AcquiringFix);
        assert!(!engine.activate(settings(10.0)));

        engine.on_position_update(HERE);
        assert_eq!(engine.phase(), EnginePhase::Active);

        assert!(engine.deactivate());
        assert_eq!(engine.phase(), EnginePhase::Inactive);
        assert!(!engine.settings().is_active);
        assert!(!engine.deactivate());
    }

    #[test]
    fn first_fix_requests_a_fetch_with_settings() {
        let mut engine = ProximityEngine::new(settings(10.0), RecordingPresenter::default());
        engine.activate(AlertSettings {
            verified_only: false,
            ..settings(10.0)
        });

        let request = engine.on_position_update(HERE).fetch.unwrap();
        assert_eq!(request.query.center, HERE);
        assert!((request.query.radius_km - 3.0).abs() < f64::EPSILON);
        assert!(!request.query.verified_only);
        assert!(engine.snapshot().fetch_in_flight);
    }

    #[test]
    fn suppression_is_idempotent_within_epoch() {
        let mut engine = loaded(vec![hazard_north("h", 8.0)], 10.0);

        let first = engine.on_position_update(HERE);
        assert_eq!(first.alerts.len(), 1);
        assert!((first.alerts[0].distance_meters - 8.0).abs() < 0.01);

        // Same spot, then closer
        assert!(engine.on_position_update(HERE).alerts.is_empty());
        assert!(engine.on_position_update(north(7.0)).alerts.is_empty());

        assert_eq!(engine.presenter().ids(), ["h"]);
        assert_eq!(engine.snapshot().alerted_count, 1);
    }

    #[test]
    fn leaving_and_reentering_does_not_realert() {
        let mut engine = loaded(vec![hazard_north("h", 8.0)], 10.0);

        assert_eq!(engine.on_position_update(HERE).alerts.len(), 1);
        assert!(engine.on_position_update(north(500.0)).alerts.is_empty());
        assert!(engine.on_position_update(HERE).alerts.is_empty());
    }

    #[test]
    fn catalog_replacement_starts_new_epoch() {
        let mut engine = loaded(vec![hazard_north("h", 8.0)], 10.0);
        assert_eq!(engine.on_position_update(HERE).alerts.len(), 1);

        // Walk past half the radius, collect the refetch, come back
        let far = north(1600.0);
        let request = engine.on_position_update(far).fetch.expect("stale catalog");
        assert!(engine.on_catalog_fetched(&request, live(vec![hazard_north("h", 8.0)])));
        assert_eq!(engine.snapshot().alerted_count, 0);
        assert_eq!(engine.snapshot().last_fetch, Some(far));

        assert_eq!(engine.on_position_update(HERE).alerts.len(), 1);
        assert_eq!(engine.presenter().ids(), ["h", "h"]);
    }

    #[test]
    fn nearest_ignores_suppression() {
        let mut engine = loaded(
            vec![
                hazard_north("1", 50.0),
                hazard_north("2", 12.0),
                hazard_north("3", 200.0),
            ],
            20.0,
        );
        assert_eq!(engine.snapshot().nearest.unwrap().hazard.id, "2");

        let outcome = engine.on_position_update(HERE);
        assert_eq!(outcome.alerts.len(), 1);

        let nearest = engine.snapshot().nearest.unwrap();
        assert_eq!(nearest.hazard.id, "2");
        assert!((nearest.distance_meters - 12.0).abs() < 0.01);
    }

    #[test]
    fn empty_catalog_has_no_nearest() {
        let engine = loaded(Vec::new(), 10.0);
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.catalog_len, 0);
        assert!(snapshot.nearest.is_none());
    }

    #[test]
    fn simultaneous_alerts_fire_independently() {
        let mut engine = loaded(
            vec![
                hazard_north("a", 2.0),
                hazard_north("b", 4.0),
                hazard_north("c", 40.0),
            ],
            10.0,
        );

        let outcome = engine.on_position_update(HERE);
        assert_eq!(outcome.alerts.len(), 2);
        assert_eq!(engine.presenter().ids(), ["a", "b"]);
    }

    #[test]
    fn deactivation_clears_state_and_ignores_updates() {
        let mut engine = loaded(vec![hazard_north("h", 8.0)], 10.0);
        engine.on_position_update(HERE);

        engine.deactivate();
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.phase, EnginePhase::Inactive);
        assert_eq!(snapshot.catalog_len, 0);
        assert_eq!(snapshot.alerted_count, 0);
        assert!(snapshot.nearest.is_none());
        assert!(snapshot.last_fetch.is_none());
        assert!(snapshot.position.is_none());

        let outcome = engine.on_position_update(HERE);
        assert!(outcome.alerts.is_empty());
        assert!(outcome.fetch.is_none());
        assert_eq!(engine.presenter().alerts.len(), 1);
    }

    #[test]
    fn fetch_resolving_after_deactivation_is_discarded() {
        let mut engine = ProximityEngine::new(settings(10.0), RecordingPresenter::default());
        engine.activate(settings(10.0));
        let request = engine.on_position_update(HERE).fetch.unwrap();

        engine.deactivate();
        assert!(!engine.on_catalog_fetched(&request, live(vec![hazard_north("h", 1.0)])));
        assert_eq!(engine.snapshot().catalog_len, 0);

        // A fresh session must not accept the old generation either
        engine.activate(settings(10.0));
        assert!(!engine.on_catalog_fetched(&request, live(vec![hazard_north("h", 1.0)])));
        assert!(engine.on_position_update(HERE).alerts.is_empty());
        assert!(engine.presenter().alerts.is_empty());
    }

    #[test]
    fn at_most_one_fetch_in_flight() {
        let mut engine = ProximityEngine::new(settings(10.0), RecordingPresenter::default());
        engine.activate(settings(10.0));

        let request = engine.on_position_update(HERE).fetch.unwrap();
        assert!(engine.on_position_update(north(10.0)).fetch.is_none());
        assert!(engine.on_position_update(north(2000.0)).fetch.is_none());

        engine.on_catalog_fetched(&request, live(Vec::new()));
        assert!(!engine.snapshot().fetch_in_flight);
        assert!(engine.on_position_update(north(2000.0)).fetch.is_some());
    }

    #[test]
    fn abandoned_fetch_can_be_reissued() {
        let mut engine = ProximityEngine::new(settings(10.0), RecordingPresenter::default());
        engine.activate(settings(10.0));

        let request = engine.on_position_update(HERE).fetch.unwrap();
        engine.fetch_abandoned(&request);
        assert!(engine.on_position_update(HERE).fetch.is_some());
    }

    #[test]
    fn stale_catalog_is_still_evaluated_while_fetch_runs() {
        let mut engine = loaded(vec![hazard_north("h", 1605.0)], 10.0);

        let outcome = engine.on_position_update(north(1600.0));
        assert!(outcome.fetch.is_some());
        assert_eq!(outcome.alerts.len(), 1);
    }

    #[test]
    fn settings_change_keeps_suppression_and_catalog() {
        let mut engine = loaded(vec![hazard_north("h", 8.0)], 10.0);
        engine.on_position_update(HERE);

        engine.update_settings(&SettingsPatch {
            alert_distance_meters: Some(30.0),
            search_radius_km: Some(1.0),
            verified_only: Some(false),
            ..SettingsPatch::default()
        });

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.phase, EnginePhase::Active);
        assert_eq!(snapshot.alerted_count, 1);
        assert_eq!(snapshot.catalog_len, 1);
        assert!(!snapshot.fetch_in_flight);
        assert!((engine.settings().alert_distance_meters - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn settings_switch_toggles_engine() {
        let mut engine = loaded(vec![hazard_north("h", 8.0)], 10.0);

        engine.update_settings(&SettingsPatch {
            is_active: Some(false),
            ..SettingsPatch::default()
        });
        assert_eq!(engine.phase(), EnginePhase::Inactive);
        assert_eq!(engine.snapshot().catalog_len, 0);

        engine.update_settings(&SettingsPatch {
            is_active: Some(true),
            ..SettingsPatch::default()
        });
        assert_eq!(engine.phase(), EnginePhase::AcquiringFix);
    }

    #[test]
    fn malformed_settings_are_clamped() {
        let mut engine = ProximityEngine::new(AlertSettings::default(), RecordingPresenter::default());
        engine.activate(AlertSettings {
            alert_distance_meters: f64::NAN,
            search_radius_km: 0.0,
            ..settings(10.0)
        });

        assert!((engine.settings().alert_distance_meters - 20.0).abs() < f64::EPSILON);
        assert!((engine.settings().search_radius_km - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn presentation_failure_keeps_suppression() {
        let mut engine = ProximityEngine::new(settings(10.0), BrokenPresenter::default());
        engine.activate(settings(10.0));
        let request = engine.on_position_update(north(100.0)).fetch.unwrap();
        engine.on_catalog_fetched(&request, live(vec![hazard_north("h", 8.0)]));

        assert_eq!(engine.on_position_update(HERE).alerts.len(), 1);
        assert!(engine.on_position_update(HERE).alerts.is_empty());
        assert_eq!(engine.presenter().attempts, 1);
        assert_eq!(engine.snapshot().alerted_count, 1);
    }

    #[test]
    fn duplicate_ids_in_fetch_are_collapsed() {
        let engine = loaded(vec![hazard_north("h", 8.0), hazard_north("h", 80.0)], 10.0);
        assert_eq!(engine.catalog().len(), 1);
        assert!((engine.snapshot().nearest.unwrap().distance_meters - 8.0).abs() < 0.01);
    }
}
