//! # Utility Modules
//!
//! - **`logging`**: one-time setup of the `tracing` subscriber used by the
//!   `apprun` binary and by embedding hosts that have no subscriber of their
//!   own.

pub mod logging;
