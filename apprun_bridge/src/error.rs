//! Error types for the script bridge

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Request handler error: {0}")]
    Handler(String),

    #[error("Script host root object is not available; a blocking evaluation cannot be deferred")]
    HostUnavailable,

    #[error("Timed out after {timeout:?} waiting for response to script request {request_id}")]
    Timeout { request_id: u32, timeout: Duration },

    #[error("Response channel closed for script request {0}")]
    ResponseChannelClosed(u32),

    #[error("No such script method: {0}")]
    UnknownMethod(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
