//! The script bridge proper: request ids, round trips and deferred evaluation.

use crate::error::{BridgeError, Result};
use crate::handler::{DefaultRequestHandler, RequestHandler};
use crate::request::{HostRequest, InstanceId, ObjectId, ScriptObject, ScriptOperation};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock,
    atomic::{AtomicU32, Ordering},
};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Request ids wrap modulo this value, so `u32::MAX` itself is never issued.
const REQUEST_ID_MODULUS: u32 = 0xffff_ffff;

/// Configuration for the `ScriptBridge`.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// How long a blocking script request waits for its response.
    /// `None` waits indefinitely.
    pub response_timeout: Option<Duration>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            response_timeout: Some(Duration::from_secs(60)),
        }
    }
}

/// Whether the host has supplied its root object yet.
enum ScriptHost {
    /// Expressions submitted so far, in submission order.
    Pending(Vec<String>),
    Ready(ScriptObject),
}

/// Synchronous request/response channel to the scripting host.
///
/// The request handler can be swapped at any time (`setRequestFunc`); the
/// deferred-expression queue is drained exactly once when the host root object
/// arrives.
pub struct ScriptBridge {
    handler: RwLock<Arc<dyn RequestHandler>>,
    instance_id: RwLock<Option<InstanceId>>,
    next_request_id: AtomicU32,
    /// Blocking requests awaiting a response delivered out of band.
    pending: DashMap<u32, oneshot::Sender<Value>>,
    host: Mutex<ScriptHost>,
    // Held for writing while deferred expressions are flushed, so a
    // concurrent evaluation cannot overtake them.
    flush_order: tokio::sync::RwLock<()>,
    config: BridgeConfig,
}

impl std::fmt::Debug for ScriptBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptBridge")
            .field("instance_id", &self.instance_id())
            .field("next_request_id", &self.next_request_id.load(Ordering::SeqCst))
            .field("pending", &self.pending.len())
            .field("host_ready", &self.has_host_root())
            .finish()
    }
}

impl Default for ScriptBridge {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}

impl ScriptBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            handler: RwLock::new(Arc::new(DefaultRequestHandler)),
            instance_id: RwLock::new(None),
            next_request_id: AtomicU32::new(0),
            pending: DashMap::new(),
            host: Mutex::new(ScriptHost::Pending(Vec::new())),
            flush_order: tokio::sync::RwLock::new(()),
            config,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Install the host's request handler, replacing the previous one.
    pub fn set_request_handler(&self, handler: Arc<dyn RequestHandler>) {
        *self
            .handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = handler;
        debug!("Request handler installed");
    }

    pub fn set_instance_id(&self, instance_id: Option<InstanceId>) {
        *self
            .instance_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = instance_id;
    }

    pub fn instance_id(&self) -> Option<InstanceId> {
        *self.instance_id.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed the request counter from the session id.
    pub fn seed_request_ids(&self, session_id: i64) {
        let seed = (i128::from(session_id) * 1000 + 10_000)
            .rem_euclid(i128::from(REQUEST_ID_MODULUS)) as u32;
        self.next_request_id.store(seed, Ordering::SeqCst);
        debug!(session_id, first_request_id = seed, "Seeded script request ids");
    }

    fn allocate_request_id(&self) -> u32 {
        match self
            .next_request_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| {
                Some(((u64::from(id) + 1) % u64::from(REQUEST_ID_MODULUS)) as u32)
            }) {
            Ok(id) | Err(id) => id,
        }
    }

    fn lock_host(&self) -> MutexGuard<'_, ScriptHost> {
        self.host.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn has_host_root(&self) -> bool {
        matches!(*self.lock_host(), ScriptHost::Ready(_))
    }

    pub fn host_root(&self) -> Option<ScriptObject> {
        match &*self.lock_host() {
            ScriptHost::Ready(root) => Some(root.clone()),
            ScriptHost::Pending(_) => None,
        }
    }

    /// Number of expressions waiting for the host root.
    pub fn deferred_len(&self) -> usize {
        match &*self.lock_host() {
            ScriptHost::Pending(queue) => queue.len(),
            ScriptHost::Ready(_) => 0,
        }
    }

    /// Number of blocking requests still waiting for a response.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Forward a request to the current handler.
    pub async fn send_request(&self, request: HostRequest) -> Result<Option<Value>> {
        let handler = self
            .handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        handler.handle(self.instance_id(), request).await
    }

    /// One-way lifecycle notification.
    pub async fn notify(&self, message: &str) -> Result<()> {
        debug!(notification = message, "Notifying host");
        self.send_request(HostRequest::notify(message)).await?;
        Ok(())
    }

    /// Evaluate an expression in the host's global scope.
    ///
    /// Before the host root exists, expressions that need no response are
    /// queued; asking for a response at that point is a caller error because
    /// the wait could never be satisfied.
    pub async fn eval_script(
        &self,
        expression: impl Into<String>,
        needs_response: bool,
    ) -> Result<Option<Value>> {
        let expression = expression.into();
        let order = self.flush_order.read().await;
        let root = {
            let mut host = self.lock_host();
            match &mut *host {
                ScriptHost::Pending(queue) => {
                    if needs_response {
                        return Err(BridgeError::HostUnavailable);
                    }
                    queue.push(expression);
                    debug!(queued = queue.len(), "Deferring script expression until host root is set");
                    return Ok(None);
                }
                ScriptHost::Ready(root) => root.clone(),
            }
        };
        drop(order);

        self.script_request(
            ScriptOperation::Evaluate,
            root,
            None,
            Value::String(expression),
            needs_response,
        )
        .await
    }

    /// Receive the host's root object and flush deferred expressions.
    ///
    /// Every queued expression is evaluated once, in submission order, and the
    /// queue is gone for good afterwards. Returns how many were flushed.
    pub async fn set_browser_script_object(&self, root: ScriptObject) -> Result<usize> {
        let _order = self.flush_order.write().await;
        let deferred = {
            let mut host = self.lock_host();
            match std::mem::replace(&mut *host, ScriptHost::Ready(root.clone())) {
                ScriptHost::Pending(queue) => queue,
                ScriptHost::Ready(_) => Vec::new(),
            }
        };

        info!(deferred = deferred.len(), "Host root object received");
        let count = deferred.len();
        for expression in deferred {
            if let Err(e) = self
                .script_request(
                    ScriptOperation::Evaluate,
                    root.clone(),
                    None,
                    Value::String(expression),
                    false,
                )
                .await
            {
                warn!(error = %e, "Failed to deliver deferred script expression");
            }
        }
        Ok(count)
    }

    /// Issue a script request to the host.
    ///
    /// Without `needs_response` this returns `Ok(None)` as soon as the request
    /// is handed to the handler. With it, the caller is suspended until exactly
    /// one response for the allocated id arrives, or the configured timeout
    /// expires. Responses delivered through [`deliver_response`](Self::deliver_response)
    /// must come from a different task than the one awaiting here.
    pub async fn script_request(
        &self,
        operation: ScriptOperation,
        object: ScriptObject,
        property_name: Option<String>,
        value: Value,
        needs_response: bool,
    ) -> Result<Option<Value>> {
        let request_id = self.allocate_request_id();

        // Register before sending so a fast response cannot be missed.
        let response_rx = if needs_response {
            let (tx, rx) = oneshot::channel();
            self.pending.insert(request_id, tx);
            Some(rx)
        } else {
            None
        };

        debug!(request_id, operation = %operation, needs_response, "Sending script request");
        let sent = self
            .send_request(HostRequest::Script {
                operation,
                object,
                property_name,
                value,
                needs_response,
                request_id,
            })
            .await;
        if let Err(e) = sent {
            self.pending.remove(&request_id);
            return Err(e);
        }

        let Some(rx) = response_rx else {
            return Ok(None);
        };

        let inline = match self
            .send_request(HostRequest::WaitScriptResponse { request_id })
            .await
        {
            Ok(inline) => inline,
            Err(e) => {
                self.pending.remove(&request_id);
                return Err(e);
            }
        };
        if let Some(response) = inline {
            self.pending.remove(&request_id);
            return Ok(Some(response));
        }

        let outcome = match self.config.response_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.pending.remove(&request_id);
                    warn!(request_id, timeout = ?limit, "Script request timed out");
                    return Err(BridgeError::Timeout {
                        request_id,
                        timeout: limit,
                    });
                }
            },
            None => rx.await,
        };

        outcome
            .map(Some)
            .map_err(|_| BridgeError::ResponseChannelClosed(request_id))
    }

    /// Route a response from the host to the request waiting on it.
    ///
    /// Returns false if nobody is waiting for `request_id` (already answered,
    /// timed out, or never blocking).
    pub fn deliver_response(&self, request_id: u32, value: Value) -> bool {
        match self.pending.remove(&request_id) {
            Some((_, sender)) => sender.send(value).is_ok(),
            None => {
                debug!(request_id, "Dropping response with no waiting request");
                false
            }
        }
    }

    /// Tell the host the application no longer references `object_id`.
    pub async fn drop_object(&self, object_id: ObjectId) {
        if let Err(e) = self
            .send_request(HostRequest::DropObject { object_id })
            .await
        {
            debug!(object_id, error = %e, "drop_p3dobj could not be delivered");
        }
    }
}
