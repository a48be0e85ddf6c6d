//! The handle application code receives.
//!
//! Entry functions get an [`AppContext`] as their only argument and reach the
//! virtual filesystem, the script bridge and the session through it instead of
//! through process-wide state.
//!
//! [`global_runner`] remains for code that cannot be handed a context. The
//! first runner built registers itself there; nothing writes it afterwards.

use crate::prc::ConfigPageManager;
use crate::runner::AppRunner;
use crate::session::SessionInfo;
use crate::vfs::{VirtualFileSystem, VirtualPath};
use apprun_bridge::{ScriptAttributes, ScriptBridge};
use std::sync::{Arc, OnceLock, Weak};
use tokio::sync::watch;

static GLOBAL_RUNNER: OnceLock<Weak<AppRunner>> = OnceLock::new();

/// Register `runner` as the process-wide runner unless one already is.
pub(crate) fn register_global(runner: &Arc<AppRunner>) -> bool {
    GLOBAL_RUNNER.set(Arc::downgrade(runner)).is_ok()
}

/// The first runner created in this process, while it is alive.
pub fn global_runner() -> Option<Arc<AppRunner>> {
    GLOBAL_RUNNER.get().and_then(Weak::upgrade)
}

#[derive(Clone)]
pub struct AppContext {
    runner: Arc<AppRunner>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("cwd", &self.runner.vfs().cwd())
            .finish_non_exhaustive()
    }
}

impl AppContext {
    pub(crate) fn new(runner: Arc<AppRunner>) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &Arc<AppRunner> {
        &self.runner
    }

    /// The sandboxed filesystem. Use it for all file access.
    pub fn vfs(&self) -> &Arc<VirtualFileSystem> {
        self.runner.vfs()
    }

    pub fn bridge(&self) -> &Arc<ScriptBridge> {
        self.runner.bridge()
    }

    pub fn config_pages(&self) -> &Arc<ConfigPageManager> {
        self.runner.config_pages()
    }

    pub fn script_root(&self) -> &Arc<ScriptAttributes> {
        self.runner.script_root()
    }

    pub fn session(&self) -> SessionInfo {
        self.runner.session()
    }

    pub fn module_search_path(&self) -> Vec<VirtualPath> {
        self.runner.sandbox().module_search_path()
    }

    pub fn asset_path(&self) -> Vec<VirtualPath> {
        self.runner.sandbox().asset_path()
    }

    /// Schedule application exit.
    pub fn stop(&self) {
        self.runner.stop();
    }

    /// Turns `true` once a stop has been requested by the host or the
    /// application.
    pub fn stop_signal(&self) -> watch::Receiver<bool> {
        self.runner.stop_signal()
    }

    /// Resolves once a stop has been requested. Long-running entry functions
    /// select on this to wind down before the main loop exits.
    pub async fn stopped(&self) {
        let mut signal = self.stop_signal();
        let _ = signal.wait_for(|stopping| *stopping).await;
    }
}
