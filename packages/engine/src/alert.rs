//! Alert presentation hook.
//!
//! The engine calls [`AlertPresenter::present`] exactly once per newly
//! alerted hazard, synchronously inside position handling. What the
//! presenter does with it (sound, vibration, a banner) is its own business;
//! failures are logged by the engine and never undo the suppression entry.

use roadwatch_hazard_models::HazardPoint;
use roadwatch_settings::AlertTone;
use serde::Serialize;
use tokio::sync::mpsc;

/// Errors a presenter can report.
#[derive(Debug, thiserror::Error)]
pub enum PresentError {
    /// The output device refused the alert.
    #[error("Alert output unavailable: {message}")]
    Unavailable {
        /// Device-specific reason.
        message: String,
    },

    /// Nobody is listening for alerts anymore.
    #[error("Alert receiver closed")]
    Closed,
}

/// One hazard crossing the alert threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    /// The hazard being approached.
    pub hazard: HazardPoint,
    /// Distance to the hazard when the alert fired, in meters.
    pub distance_meters: f64,
    /// Tone configured at alert time.
    pub tone: AlertTone,
    /// Volume configured at alert time.
    pub volume: f64,
}

/// Receives alerts from the engine.
pub trait AlertPresenter: Send {
    /// Presents one alert.
    ///
    /// # Errors
    ///
    /// Returns [`PresentError`] if the alert could not be delivered.
    fn present(&mut self, alert: &AlertEvent) -> Result<(), PresentError>;
}

/// Presenter that only writes alerts to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPresenter;

impl AlertPresenter for LogPresenter {
    fn present(&mut self, alert: &AlertEvent) -> Result<(), PresentError> {
        log::info!(
            "ALERT {} {} at {:.1} m ({} @ {:.0}%)",
            alert.hazard.category,
            alert.hazard.id,
            alert.distance_meters,
            alert.tone,
            alert.volume * 100.0,
        );
        Ok(())
    }
}

/// Presenter that forwards alerts over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelPresenter {
    tx: mpsc::UnboundedSender<AlertEvent>,
}

impl ChannelPresenter {
    /// Creates a presenter and the receiving end of its channel.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AlertEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AlertPresenter for ChannelPresenter {
    fn present(&mut self, alert: &AlertEvent) -> Result<(), PresentError> {
        self.tx
            .send(alert.clone())
            .map_err(|_| PresentError::Closed)
    }
}

impl<P: AlertPresenter + ?Sized> AlertPresenter for Box<P> {
    fn present(&mut self, alert: &AlertEvent) -> Result<(), PresentError> {
        (**self).present(alert)
    }
}
