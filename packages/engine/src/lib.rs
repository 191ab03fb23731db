#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Proximity alerting for reported road hazards.
//!
//! The engine keeps a catalog of hazards fetched around the user, refreshes
//! it once the user has moved half the search radius away from the last
//! fetch point, and alerts once per hazard per catalog epoch when the user
//! comes within the alert distance.
//!
//! [`engine::ProximityEngine`] is the synchronous core;
//! [`session::AlertSession`] drives it on tokio with a location stream, a
//! hazard source and an alert presenter.

pub mod alert;
pub mod engine;
pub mod evaluator;
pub mod location;
pub mod session;
pub mod trigger;

pub use alert::{AlertEvent, AlertPresenter, ChannelPresenter, LogPresenter, PresentError};
pub use engine::{EnginePhase, EngineSnapshot, NearestHazard, ProximityEngine};
pub use location::{LocationProvider, ManualLocation, TrackLocation};
pub use session::{AlertSession, SessionError, SessionEvent};
