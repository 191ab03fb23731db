//! Async driver for a [`ProximityEngine`].
//!
//! An [`AlertSession`] runs the engine on its own tokio task and serializes
//! everything that touches it: commands from the caller, samples from the
//! location stream, and completion of the single in-flight catalog fetch.
//! Observers read [`EngineSnapshot`]s from a `watch` channel and one-off
//! notices from [`AlertSession::next_event`].
//!
//! The session owns the [`SettingsStore`]: it starts from the persisted
//! settings and writes every change made through it back.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use roadwatch_hazard_models::Coordinate;
use roadwatch_settings::{AlertSettings, KeyValueStore, SettingsPatch, SettingsStore};
use roadwatch_source::{CatalogFetch, CatalogOrigin, HazardSource};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};

use crate::alert::AlertPresenter;
use crate::engine::{EnginePhase, EngineSnapshot, FetchRequest, ProximityEngine};
use crate::location::LocationProvider;

/// Errors surfaced by a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The user refused location access.
    #[error("Location permission denied")]
    PermissionDenied,

    /// The location service could not be started.
    #[error("Location unavailable: {message}")]
    LocationUnavailable {
        /// Provider-specific reason.
        message: String,
    },

    /// The session task has stopped.
    #[error("Alert session closed")]
    Closed,

    /// The session task panicked.
    #[error("Alert session task failed: {0}")]
    Task(#[from] JoinError),
}

/// Notices emitted by a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Alerting is switched on but no location stream could be opened. The
    /// engine stays in [`EnginePhase::AcquiringFix`].
    CannotActivate {
        /// Why the location provider refused.
        reason: String,
    },
    /// A fetch completed and replaced the catalog.
    CatalogReplaced {
        /// Size of the new catalog.
        hazards: usize,
        /// Where the hazards came from.
        origin: CatalogOrigin,
    },
}

#[derive(Debug)]
enum Command {
    UpdateSettings(SettingsPatch),
    Position(Coordinate),
    Deactivate,
    Shutdown,
}

/// Handle to a running alert session.
#[derive(Debug)]
pub struct AlertSession {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<EngineSnapshot>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    task: JoinHandle<()>,
}

impl AlertSession {
    /// Starts a session on the current tokio runtime, seeded from the
    /// settings persisted in `store`.
    ///
    /// If the stored `is_active` is set the engine is activated immediately
    /// and subscribes to `location`.
    #[must_use]
    pub fn spawn<P, S>(
        store: SettingsStore<S>,
        source: Arc<dyn HazardSource>,
        location: Arc<dyn LocationProvider>,
        presenter: P,
    ) -> Self
    where
        P: AlertPresenter + 'static,
        S: KeyValueStore + 'static,
    {
        let settings = store.load();
        let engine = ProximityEngine::new(settings, presenter);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (snapshots_tx, snapshots_rx) = watch::channel(engine.snapshot());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            engine,
            store,
            source,
            location,
            positions: None,
            fetch: None,
            snapshots: snapshots_tx,
            events: events_tx,
        };
        let task = tokio::spawn(driver.run(settings, commands_rx));

        Self {
            commands: commands_tx,
            snapshots: snapshots_rx,
            events: events_rx,
            task,
        }
    }

    fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands.send(command).map_err(|_| SessionError::Closed)
    }

    /// Applies a settings change and persists the merged settings.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session has stopped.
    pub fn update_settings(&self, patch: SettingsPatch) -> Result<(), SessionError> {
        self.send(Command::UpdateSettings(patch))
    }

    /// Feeds one position sample, as if it came from the location stream.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session has stopped.
    pub fn push_position(&self, position: Coordinate) -> Result<(), SessionError> {
        self.send(Command::Position(position))
    }

    /// Switches alerting off, cancelling any in-flight fetch. The stored
    /// `is_active` flag is cleared too.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session has stopped.
    pub fn deactivate(&self) -> Result<(), SessionError> {
        self.send(Command::Deactivate)
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver that observes every published snapshot.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<EngineSnapshot> {
        self.snapshots.clone()
    }

    /// Waits until a published snapshot satisfies `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session stops first.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&EngineSnapshot) -> bool + Send,
    ) -> Result<EngineSnapshot, SessionError> {
        let mut rx = self.snapshots.clone();
        let snapshot = rx
            .wait_for(predicate)
            .await
            .map_err(|_| SessionError::Closed)?
            .clone();
        Ok(snapshot)
    }

    /// Receives the next session event.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Stops the session and waits for its task to finish.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Task`] if the session task panicked.
    pub async fn shutdown(self) -> Result<(), SessionError> {
        let _ = self.commands.send(Command::Shutdown);
        self.task.await?;
        Ok(())
    }
}

struct InFlightFetch {
    request: FetchRequest,
    handle: JoinHandle<CatalogFetch>,
}

struct Driver<P, S> {
    engine: ProximityEngine<P>,
    store: SettingsStore<S>,
    source: Arc<dyn HazardSource>,
    location: Arc<dyn LocationProvider>,
    positions: Option<BoxStream<'static, Coordinate>>,
    fetch: Option<InFlightFetch>,
    snapshots: watch::Sender<EngineSnapshot>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl<P: AlertPresenter, S: KeyValueStore> Driver<P, S> {
    async fn run(mut self, settings: AlertSettings, mut commands: mpsc::UnboundedReceiver<Command>) {
        if settings.is_active && self.engine.activate(settings) {
            self.start_location().await;
        }
        self.publish();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Position(position)) => self.handle_position(position),
                    Some(Command::UpdateSettings(patch)) => self.handle_settings(&patch).await,
                    Some(Command::Deactivate) => {
                        if self.engine.deactivate() {
                            self.stop();
                        }
                        self.persist();
                    }
                    Some(Command::Shutdown) | None => {
                        self.stop();
                        break;
                    }
                },
                position = next_position(&mut self.positions) => match position {
                    Some(position) => self.handle_position(position),
                    None => {
                        log::debug!("Location stream ended");
                        self.positions = None;
                    }
                },
                (request, result) = join_fetch(&mut self.fetch) => {
                    self.handle_fetch(&request, result);
                }
            }

            self.publish();
        }

        log::debug!("Alert session stopped");
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(self.engine.settings()) {
            log::warn!("Failed to persist alert settings: {e}");
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.engine.snapshot());
    }

    async fn start_location(&mut self) {
        match self.location.subscribe().await {
            Ok(stream) => self.positions = Some(stream),
            Err(e) => {
                log::warn!("Cannot activate proximity alerts: {e}");
                let _ = self.events.send(SessionEvent::CannotActivate {
                    reason: e.to_string(),
                });
            }
        }
    }

    fn stop(&mut self) {
        self.positions = None;
        if let Some(fetch) = self.fetch.take() {
            log::debug!(
                "Cancelling catalog fetch from generation {}",
                fetch.request.generation
            );
            fetch.handle.abort();
        }
    }

    async fn handle_settings(&mut self, patch: &SettingsPatch) {
        let before = self.engine.phase();
        self.engine.update_settings(patch);
        let after = self.engine.phase();

        if before == EnginePhase::Inactive && after != EnginePhase::Inactive {
            self.start_location().await;
        } else if before != EnginePhase::Inactive && after == EnginePhase::Inactive {
            self.stop();
        }
        self.persist();
    }

    fn handle_position(&mut self, position: Coordinate) {
        let outcome = self.engine.on_position_update(position);
        if let Some(request) = outcome.fetch {
            self.start_fetch(request);
        }
    }

    fn start_fetch(&mut self, request: FetchRequest) {
        let source = Arc::clone(&self.source);
        let query = request.query;
        let handle =
            tokio::spawn(async move { roadwatch_source::fetch_catalog(source.as_ref(), &query).await });
        self.fetch = Some(InFlightFetch { request, handle });
    }

    fn handle_fetch(&mut self, request: &FetchRequest, result: Result<CatalogFetch, JoinError>) {
        match result {
            Ok(fetch) => {
                let hazards = fetch.hazards.len();
                let origin = fetch.origin;
                if self.engine.on_catalog_fetched(request, fetch) {
                    let _ = self
                        .events
                        .send(SessionEvent::CatalogReplaced { hazards, origin });
                }
            }
            Err(e) => {
                log::error!("Catalog fetch task failed: {e}");
                self.engine.fetch_abandoned(request);
            }
        }
    }
}

async fn next_position(positions: &mut Option<BoxStream<'static, Coordinate>>) -> Option<Coordinate> {
    match positions {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn join_fetch(
    fetch: &mut Option<InFlightFetch>,
) -> (FetchRequest, Result<CatalogFetch, JoinError>) {
    let Some(in_flight) = fetch.as_mut() else {
        return std::future::pending().await;
    };
    let result = (&mut in_flight.handle).await;
    let request = in_flight.request;
    *fetch = None;
    (request, result)
}
