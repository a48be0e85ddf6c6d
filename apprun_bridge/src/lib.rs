//! # Script Bridge
//!
//! Request/response channel between the running application and the external
//! scripting host (typically the page that embeds the application).
//!
//! ## Architecture
//!
//! *   **Requests**: every core-to-host call is a [`HostRequest`] delivered through a
//!     pluggable [`RequestHandler`]. Until the host installs one, the
//!     [`DefaultRequestHandler`] drops notifications and logs everything else.
//! *   **Round trips**: [`ScriptBridge::script_request`] allocates a request id and, when a
//!     response is needed, waits for exactly one matching response. The response either
//!     comes back from the handler's `wait_script_response` call or is delivered later by
//!     the host's response thread through [`ScriptBridge::deliver_response`].
//! *   **Deferred evaluation**: expressions submitted before the host supplied its root
//!     object are queued and evaluated, in order, once the root arrives.
//!
//! ## Deadlock warning
//!
//! A blocking request suspends the caller until the response arrives. The task that
//! processes incoming host responses must never be the one that issues a blocking
//! request, or neither makes progress. A response timeout is applied when configured.

pub mod bridge;
pub mod error;
pub mod handler;
pub mod request;
pub mod script_root;

pub use bridge::{BridgeConfig, ScriptBridge};
pub use error::{BridgeError, Result};
pub use handler::{
    ChannelRequestHandler, DefaultRequestHandler, FnRequestHandler, HostEnvelope, RequestHandler,
};
pub use request::{HostRequest, InstanceId, ObjectId, ScriptObject, ScriptOperation};
pub use script_root::{ScriptAttributes, ScriptMethod};
