//! Observable session lifecycle.
//!
//! The runner publishes its coarse lifecycle through a `tokio::sync::watch`
//! channel so the embedding host (and tests) can wait for the application to
//! start, or learn why it failed, without polling.
//!
//! # Example
//!
//! ```rust,ignore
//! use apprun_common::lifecycle::SessionLifecycle;
//!
//! let lifecycle = SessionLifecycle::new();
//! lifecycle.transition_to_started("main".to_string()).unwrap();
//! let module = lifecycle.wait_for_started().await?;
//! ```

use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle states of a runner session.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleState {
    /// Waiting for the window and archive readiness conditions.
    AwaitingReadiness,

    /// The entry module was loaded and its entry function has been invoked.
    Started { entry_module: String },

    /// Startup failed (for example the entry module does not exist).
    Failed { error: String },

    /// The main loop has exited.
    Stopped,
}

impl LifecycleState {
    pub fn is_started(&self) -> bool {
        matches!(self, LifecycleState::Started { .. })
    }

    /// Failed and Stopped are terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Failed { .. } | LifecycleState::Stopped)
    }
}

#[derive(Clone)]
pub struct SessionLifecycle {
    sender: Arc<watch::Sender<LifecycleState>>,
    // Keeps the channel open even when nobody subscribed yet.
    _receiver: watch::Receiver<LifecycleState>,
}

impl std::fmt::Debug for SessionLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SessionLifecycle")
            .field(&*self.sender.borrow())
            .finish()
    }
}

impl SessionLifecycle {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(LifecycleState::AwaitingReadiness);
        Self {
            sender: Arc::new(sender),
            _receiver: receiver,
        }
    }

    pub fn current(&self) -> LifecycleState {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.sender.subscribe()
    }

    /// AwaitingReadiness -> Started
    pub fn transition_to_started(&self, entry_module: String) -> Result<(), &'static str> {
        let mut transitioned = false;
        self.sender.send_if_modified(|state| {
            if matches!(state, LifecycleState::AwaitingReadiness) {
                *state = LifecycleState::Started {
                    entry_module: entry_module.clone(),
                };
                transitioned = true;
                true
            } else {
                false
            }
        });
        if transitioned {
            Ok(())
        } else {
            Err("Can only transition to Started from AwaitingReadiness")
        }
    }

    /// Any non-terminal state -> Failed
    pub fn transition_to_failed(&self, error: String) -> Result<(), &'static str> {
        let mut transitioned = false;
        self.sender.send_if_modified(|state| {
            if !state.is_terminal() {
                *state = LifecycleState::Failed {
                    error: error.clone(),
                };
                transitioned = true;
                true
            } else {
                false
            }
        });
        if transitioned {
            Ok(())
        } else {
            Err("Cannot transition from terminal state")
        }
    }

    /// Any non-terminal state -> Stopped
    pub fn transition_to_stopped(&self) -> Result<(), &'static str> {
        let mut transitioned = false;
        self.sender.send_if_modified(|state| {
            if !state.is_terminal() {
                *state = LifecycleState::Stopped;
                transitioned = true;
                true
            } else {
                false
            }
        });
        if transitioned {
            Ok(())
        } else {
            Err("Cannot transition from terminal state")
        }
    }

    /// Wait until the session has started.
    ///
    /// Returns the entry module name, or the failure reason if the session
    /// failed or stopped before starting.
    pub async fn wait_for_started(&self) -> Result<String, String> {
        let mut rx = self.sender.subscribe();
        loop {
            {
                let state = rx.borrow_and_update();
                match &*state {
                    LifecycleState::Started { entry_module } => return Ok(entry_module.clone()),
                    LifecycleState::Failed { error } => return Err(error.clone()),
                    LifecycleState::Stopped => {
                        return Err("Session stopped before start".to_string());
                    }
                    LifecycleState::AwaitingReadiness => {}
                }
            }
            if rx.changed().await.is_err() {
                return Err("Lifecycle dropped".to_string());
            }
        }
    }

    pub fn is_started(&self) -> bool {
        self.sender.borrow().is_started()
    }
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
