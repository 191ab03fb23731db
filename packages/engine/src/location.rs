//! Position sources for an [`crate::session::AlertSession`].

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use roadwatch_hazard_models::Coordinate;

use crate::session::SessionError;

/// Device location service.
///
/// A session subscribes when alerting is switched on and drops the stream
/// when it is switched off.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Starts delivering positions.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::PermissionDenied`] or
    /// [`SessionError::LocationUnavailable`] if no stream can be opened.
    async fn subscribe(&self) -> Result<BoxStream<'static, Coordinate>, SessionError>;
}

/// Provider that never yields. Positions reach the session only through
/// [`crate::session::AlertSession::push_position`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualLocation;

#[async_trait]
impl LocationProvider for ManualLocation {
    async fn subscribe(&self) -> Result<BoxStream<'static, Coordinate>, SessionError> {
        Ok(futures::stream::pending().boxed())
    }
}

/// Provider that replays a fixed track, one point per `interval`.
#[derive(Debug, Clone)]
pub struct TrackLocation {
    points: Vec<Coordinate>,
    interval: Duration,
}

impl TrackLocation {
    /// Creates a provider replaying `points`.
    #[must_use]
    pub const fn new(points: Vec<Coordinate>, interval: Duration) -> Self {
        Self { points, interval }
    }
}

#[async_trait]
impl LocationProvider for TrackLocation {
    async fn subscribe(&self) -> Result<BoxStream<'static, Coordinate>, SessionError> {
        let interval = self.interval;
        Ok(futures::stream::iter(self.points.clone())
            .then(move |point| async move {
                tokio::time::sleep(interval).await;
                point
            })
            .boxed())
    }
}
