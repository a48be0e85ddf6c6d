//! Request handlers: where core-to-host requests end up.

use crate::error::{BridgeError, Result};
use crate::request::{HostRequest, InstanceId};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// Delivers requests to the scripting host.
///
/// Returning `Ok(Some(value))` for a `WaitScriptResponse` request resolves the
/// round trip immediately. Returning `Ok(None)` means the response will be
/// delivered asynchronously through `ScriptBridge::deliver_response`.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(
        &self,
        instance_id: Option<InstanceId>,
        request: HostRequest,
    ) -> Result<Option<Value>>;
}

/// Installed until the host supplies its own handler.
///
/// Notifications are dropped silently; every other request is logged and
/// ignored. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRequestHandler;

#[async_trait]
impl RequestHandler for DefaultRequestHandler {
    async fn handle(
        &self,
        instance_id: Option<InstanceId>,
        request: HostRequest,
    ) -> Result<Option<Value>> {
        if let HostRequest::Notify { message } = &request {
            trace!(notification = %message, "No request handler installed, dropping notify");
            return Ok(None);
        }
        warn!(instance_id = ?instance_id, kind = request.kind(), request = ?request, "Ignoring request");
        Ok(None)
    }
}

/// Adapts a plain synchronous closure into a handler.
pub struct FnRequestHandler<F>(F);

impl<F> FnRequestHandler<F>
where
    F: Fn(Option<InstanceId>, HostRequest) -> Result<Option<Value>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> RequestHandler for FnRequestHandler<F>
where
    F: Fn(Option<InstanceId>, HostRequest) -> Result<Option<Value>> + Send + Sync,
{
    async fn handle(
        &self,
        instance_id: Option<InstanceId>,
        request: HostRequest,
    ) -> Result<Option<Value>> {
        (self.0)(instance_id, request)
    }
}

/// A request as it travels to the host over a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct HostEnvelope {
    pub instance_id: Option<InstanceId>,
    pub request: HostRequest,
}

/// Forwards every request over a bounded channel to a host-side consumer.
///
/// Responses are never returned inline; the consumer answers script requests
/// by calling `ScriptBridge::deliver_response` from its own task.
#[derive(Debug, Clone)]
pub struct ChannelRequestHandler {
    sender: mpsc::Sender<HostEnvelope>,
}

impl ChannelRequestHandler {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<HostEnvelope>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl RequestHandler for ChannelRequestHandler {
    async fn handle(
        &self,
        instance_id: Option<InstanceId>,
        request: HostRequest,
    ) -> Result<Option<Value>> {
        self.sender
            .send(HostEnvelope {
                instance_id,
                request,
            })
            .await
            .map_err(|e| BridgeError::Handler(format!("Failed to forward request to host: {}", e)))?;
        Ok(None)
    }
}
