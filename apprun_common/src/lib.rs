//! Shared startup primitives for the application runner.
//!
//! - [`readiness`]: the two-condition gate that fires the entry point once.
//! - [`lifecycle`]: observable session lifecycle backed by a `watch` channel.

pub mod lifecycle;
pub mod readiness;

pub use lifecycle::{LifecycleState, SessionLifecycle};
pub use readiness::{GateState, ReadinessGate};
