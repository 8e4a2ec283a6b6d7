//! Route handlers, one module per resource

pub mod alerts;
pub mod health;
pub mod stream;
pub mod tamper;
pub mod telemetry;
