//! Drives a recorded track through a live [`AlertSession`].

use std::path::Path;
use std::sync::Arc;

use roadwatch_engine::{
    AlertEvent, AlertSession, ChannelPresenter, EnginePhase, EngineSnapshot, ManualLocation,
    SessionError,
};
use roadwatch_hazard_models::Coordinate;
use roadwatch_settings::{AlertSettings, MemoryStore, SettingsStore};
use roadwatch_source::HazardSource;

/// Result of a replay.
#[derive(Debug)]
pub struct ReplayReport {
    /// Alerts in the order they fired.
    pub alerts: Vec<AlertEvent>,
    /// Engine state after the last point.
    pub snapshot: EngineSnapshot,
}

/// Reads a track file: a JSON array of `{"latitude": .., "longitude": ..}`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_track(path: &Path) -> Result<Vec<Coordinate>, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    let track: Vec<Coordinate> = serde_json::from_str(&raw)?;
    if let Some(bad) = track.iter().find(|c| !c.is_valid()) {
        return Err(format!("invalid coordinate in track: {bad}").into());
    }
    Ok(track)
}

/// Feeds `track` through a fresh session one point at a time.
///
/// Each point is fully processed, including any catalog fetch it
/// triggered, before the next one is sent, so runs are reproducible.
///
/// # Errors
///
/// Returns [`SessionError`] if the session stops unexpectedly.
pub async fn replay(
    track: &[Coordinate],
    settings: AlertSettings,
    source: Arc<dyn HazardSource>,
) -> Result<ReplayReport, SessionError> {
    let (presenter, mut alerts_rx) = ChannelPresenter::new();
    // Scratch store; replays never write the user's settings
    let store = SettingsStore::new(MemoryStore::new());
    if let Err(e) = store.save(&AlertSettings {
        is_active: true,
        ..settings
    }) {
        log::warn!("Failed to seed replay settings: {e}");
    }
    let session = AlertSession::spawn(store, source, Arc::new(ManualLocation), presenter);
    session.wait_for(|s| s.phase != EnginePhase::Inactive).await?;
    let mut snapshots = session.watch();

    for (i, point) in track.iter().enumerate() {
        log::debug!("Replaying point {i}: {point}");
        snapshots.mark_unchanged();
        session.push_position(*point)?;

        loop {
            snapshots.changed().await.map_err(|_| SessionError::Closed)?;
            if !snapshots.borrow_and_update().fetch_in_flight {
                break;
            }
        }
    }

    let snapshot = session.snapshot();
    session.shutdown().await?;

    let mut alerts = Vec::new();
    while let Some(alert) = alerts_rx.recv().await {
        alerts.push(alert);
    }

    Ok(ReplayReport { alerts, snapshot })
}
