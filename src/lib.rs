//! Live telemetry hub for a fleet of water tankers
//!
//! Telemetry arrives over MQTT on `<unitId>/gps` and `<unitId>/distance`, is merged
//! into a per-unit store, feeds a liveness monitor that raises a single-shot alert
//! when a unit goes silent, and is fanned out to every stream subscriber.
//!
//! [`hub::Hub`] owns and wires every component.

#[cfg(feature = "api")]
pub mod api;

pub mod alerts;
pub mod broadcast;
pub mod clock;
pub mod config;
pub mod events;
pub mod hub;
pub mod ingress;
pub mod liveness;
pub mod telemetry;
pub mod util;
