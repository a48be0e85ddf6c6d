//! # Application Runner
//!
//! [`AppRunner`] is the surface the embedding host drives. Host calls may
//! arrive on any task and in any order; the ones that can start the
//! application only record their readiness condition and post
//! [`MainMessage::StartIfReady`] to a bounded queue. The main loop
//! ([`AppRunner::run_main_loop`]) is the single consumer of that queue and
//! the only place the entry module is started, claimed through the
//! [`ReadinessGate`] so it happens exactly once.
//!
//! The entry function runs on its own task. The main loop keeps draining the
//! queue while it runs, so window events and [`AppRunner::stop`] are handled
//! for applications that never return from their entry function.
//!
//! ```rust,ignore
//! let runner = AppRunner::builder(RunnerConfig::from_env()?)
//!     .importer(registry)
//!     .build();
//! let main_loop = tokio::spawn({
//!     let runner = runner.clone();
//!     async move { runner.run_main_loop().await }
//! });
//! runner.setup_window(WindowSetup::new(WindowType::Onscreen)).await?;
//! runner.set_archive("/apps/demo.p3d", vec![], vec![], Some(1)).await?;
//! ```

use crate::archive::ArchiveHandle;
use crate::config::RunnerConfig;
use crate::context::{self, AppContext};
use crate::error::{Result, RunnerError};
use crate::importer::{ModuleImporter, ModuleRegistry, import_root};
use futures::future::BoxFuture;
use crate::prc::{ConfigPageManager, PageId};
use crate::sandbox::{SandboxEnvironment, SandboxLayout};
use crate::session::{PackageRecord, SessionInfo};
use crate::vfs::VirtualFileSystem;
use crate::window::{WINDOW_PAGE_NAME, WindowHandle, WindowSetup};
use apprun_bridge::{
    BridgeError, InstanceId, ObjectId, RequestHandler, ScriptAttributes, ScriptBridge,
    ScriptObject, ScriptOperation,
};
use apprun_common::{ReadinessGate, SessionLifecycle};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Messages consumed by the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainMessage {
    /// Re-check both readiness conditions.
    StartIfReady,
    /// The windowing layer reported an event on the application window.
    WindowEvent,
    /// Leave the main loop.
    Exit,
}

pub struct AppRunnerBuilder {
    config: RunnerConfig,
    vfs: Option<Arc<VirtualFileSystem>>,
    layout: Option<SandboxLayout>,
    importer: Option<Arc<dyn ModuleImporter>>,
}

impl AppRunnerBuilder {
    /// Use `vfs` instead of a fresh unsandboxed namespace.
    pub fn vfs(mut self, vfs: Arc<VirtualFileSystem>) -> Self {
        self.vfs = Some(vfs);
        self
    }

    /// Override the host directories the sandbox mounts.
    pub fn sandbox_layout(mut self, layout: SandboxLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn importer(mut self, importer: Arc<dyn ModuleImporter>) -> Self {
        self.importer = Some(importer);
        self
    }

    pub fn build(self) -> Arc<AppRunner> {
        let config = self.config;
        let (main_tx, main_rx) = mpsc::channel(config.main_queue_capacity.max(1));
        let (stop_signal, _) = watch::channel(false);
        let layout = self
            .layout
            .unwrap_or_else(|| SandboxLayout::from_platform(&config.module_search_path));

        let runner = Arc::new(AppRunner {
            vfs: self
                .vfs
                .unwrap_or_else(|| Arc::new(VirtualFileSystem::with_host_root())),
            bridge: Arc::new(ScriptBridge::new(config.bridge_config())),
            sandbox: SandboxEnvironment::new(&config.mount_point, &config.module_search_path),
            layout,
            pages: Arc::new(ConfigPageManager::new()),
            importer: self
                .importer
                .unwrap_or_else(|| Arc::new(ModuleRegistry::new())),
            script_root: Arc::new(ScriptAttributes::new()),
            gate: ReadinessGate::new(),
            lifecycle: SessionLifecycle::new(),
            session: RwLock::new(SessionInfo::default()),
            archive_loaded: tokio::sync::Mutex::new(false),
            window_page: Mutex::new(None),
            window: RwLock::new(None),
            window_opened: AtomicBool::new(false),
            start_check_pending: AtomicBool::new(false),
            stop_signal,
            main_tx,
            main_rx: Mutex::new(Some(main_rx)),
            config,
        });

        let weak = Arc::downgrade(&runner);
        runner.script_root.set_method("stop", move |_args| {
            match weak.upgrade() {
                Some(runner) if runner.request_stop() => Ok(Value::Null),
                Some(_) => Err(BridgeError::Handler(
                    "no async runtime to schedule exit".to_string(),
                )),
                None => Err(BridgeError::Handler("runner dropped".to_string())),
            }
        });

        if context::register_global(&runner) {
            debug!("Registered process-wide runner");
        }
        runner
    }
}

/// Session state and the host-to-core call surface.
pub struct AppRunner {
    config: RunnerConfig,
    vfs: Arc<VirtualFileSystem>,
    bridge: Arc<ScriptBridge>,
    sandbox: SandboxEnvironment,
    layout: SandboxLayout,
    pages: Arc<ConfigPageManager>,
    importer: Arc<dyn ModuleImporter>,
    script_root: Arc<ScriptAttributes>,
    gate: ReadinessGate,
    lifecycle: SessionLifecycle,
    session: RwLock<SessionInfo>,
    // Serializes archive loading; true once an archive is mounted.
    archive_loaded: tokio::sync::Mutex<bool>,
    window_page: Mutex<Option<PageId>>,
    window: RwLock<Option<Arc<dyn WindowHandle>>>,
    window_opened: AtomicBool,
    // Set while a StartIfReady message is queued and not yet consumed.
    start_check_pending: AtomicBool,
    stop_signal: watch::Sender<bool>,
    main_tx: mpsc::Sender<MainMessage>,
    main_rx: Mutex<Option<mpsc::Receiver<MainMessage>>>,
}

impl std::fmt::Debug for AppRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppRunner")
            .field("gate", &self.gate.state())
            .field("lifecycle", &self.lifecycle.current())
            .field("mount_point", self.sandbox.mount_point())
            .finish_non_exhaustive()
    }
}

impl AppRunner {
    pub fn builder(config: RunnerConfig) -> AppRunnerBuilder {
        AppRunnerBuilder {
            config,
            vfs: None,
            layout: None,
            importer: None,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn vfs(&self) -> &Arc<VirtualFileSystem> {
        &self.vfs
    }

    pub fn bridge(&self) -> &Arc<ScriptBridge> {
        &self.bridge
    }

    pub fn config_pages(&self) -> &Arc<ConfigPageManager> {
        &self.pages
    }

    pub fn sandbox(&self) -> &SandboxEnvironment {
        &self.sandbox
    }

    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }

    pub fn lifecycle(&self) -> &SessionLifecycle {
        &self.lifecycle
    }

    /// The application's root script object (`getPandaScriptObject`).
    pub fn script_root(&self) -> &Arc<ScriptAttributes> {
        &self.script_root
    }

    pub fn session(&self) -> SessionInfo {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update_session<R>(&self, f: impl FnOnce(&mut SessionInfo) -> R) -> R {
        f(&mut self.session.write().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn set_session_id(&self, session_id: i64) {
        self.update_session(|session| session.session_id = Some(session_id));
        self.bridge.seed_request_ids(session_id);
        debug!(session_id, "Session id set");
    }

    pub fn set_instance_info(&self, root_dir: impl Into<PathBuf>) {
        let root_dir = root_dir.into();
        debug!(root_dir = %root_dir.display(), "Instance info set");
        self.update_session(|session| session.root_dir = Some(root_dir));
    }

    pub fn add_package_info(
        &self,
        name: &str,
        platform: &str,
        version: &str,
        host: &str,
        install_dir: impl Into<PathBuf>,
    ) {
        let record = PackageRecord {
            name: name.to_string(),
            platform: platform.to_string(),
            version: version.to_string(),
            host: host.to_string(),
            install_dir: install_dir.into(),
        };
        debug!(package = %record.name, version = %record.version, "Package registered");
        self.update_session(|session| session.packages.push(record));
    }

    /// Install directory for packages served from `host_url`.
    pub fn determine_host_dir(&self, host_url: &str) -> Result<PathBuf> {
        let hasher = self
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .host_dir_hasher()
            .ok_or(RunnerError::InstanceInfoMissing)?;
        Ok(hasher.host_dir(host_url))
    }

    pub fn set_request_handler(&self, handler: Arc<dyn RequestHandler>) {
        self.bridge.set_request_handler(handler);
    }

    pub async fn set_browser_script_object(&self, root: ScriptObject) -> Result<usize> {
        Ok(self.bridge.set_browser_script_object(root).await?)
    }

    pub async fn eval_script(&self, expression: &str, needs_response: bool) -> Result<Option<Value>> {
        Ok(self.bridge.eval_script(expression, needs_response).await?)
    }

    pub async fn script_request(
        &self,
        operation: ScriptOperation,
        object: ScriptObject,
        property_name: Option<String>,
        value: Value,
        needs_response: bool,
    ) -> Result<Option<Value>> {
        Ok(self
            .bridge
            .script_request(operation, object, property_name, value, needs_response)
            .await?)
    }

    pub async fn drop_object(&self, object_id: ObjectId) {
        self.bridge.drop_object(object_id).await;
    }

    /// Load, sandbox and mount the application archive (`setP3DFilename`).
    ///
    /// Fails with [`RunnerError::Argument`] when `path` does not exist in the
    /// current namespace or is not an archive. Once an archive is mounted,
    /// further calls do nothing.
    pub async fn set_archive(
        &self,
        path: &str,
        tokens: Vec<(String, String)>,
        argv: Vec<String>,
        instance_id: Option<InstanceId>,
    ) -> Result<()> {
        let mut loaded = self.archive_loaded.lock().await;
        if *loaded {
            debug!(path, "Archive already mounted, ignoring");
            return Ok(());
        }

        self.update_session(|session| {
            session.instance_id = instance_id;
            session.tokens = tokens;
            session.argv = argv;
        });
        self.bridge.set_instance_id(instance_id);
        self.bridge.notify("onpythonload").await?;

        let handle = ArchiveHandle::load(&self.vfs, path)?;
        let package = handle.package().cloned();
        let full_disk_access = self.update_session(|session| {
            if let Some(package) = &package {
                session.full_disk_access = package.apply_full_disk_access(session.full_disk_access);
            }
            session.package = package.clone();
            session.full_disk_access
        });

        self.sandbox
            .initialize(&self.vfs, &self.layout, full_disk_access)?;
        let record = handle.mount(
            &self.vfs,
            self.sandbox.mount_point().as_str(),
            &self.pages,
        );
        self.update_session(|session| session.archive = Some(record));

        *loaded = true;
        drop(loaded);

        self.gate.mark_archive_ready();
        self.request_start_check().await
    }

    /// Configure the application window (`setupWindow`).
    ///
    /// Before start the settings become the window configuration page; once
    /// started with a window attached they are applied to it directly.
    pub async fn setup_window(&self, setup: WindowSetup) -> Result<()> {
        if self.gate.is_started() {
            let window = self
                .window
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(window) = window {
                debug!(window_type = setup.window_type.as_str(), "Applying live window properties");
                window.request_properties(setup.live_properties());
                return Ok(());
            }
        }

        let data = setup.prc_data();
        {
            let mut page = self.window_page.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(old) = page.take() {
                self.pages.unload_page(old);
            }
            *page = Some(self.pages.load_page(WINDOW_PAGE_NAME, &data));
        }

        if self.gate.is_started() {
            return Ok(());
        }
        self.gate.mark_window_ready();
        self.request_start_check().await
    }

    /// Attach the open window so later `setup_window` calls reach it.
    pub fn attach_window(&self, window: Arc<dyn WindowHandle>) {
        *self.window.write().unwrap_or_else(PoisonError::into_inner) = Some(window);
    }

    /// Report a window event from the windowing layer.
    pub async fn notify_window_event(&self) -> Result<()> {
        self.post(MainMessage::WindowEvent).await
    }

    /// Schedule main-loop exit after the configured delay.
    ///
    /// The stop signal handed to the application through
    /// [`AppContext::stop_signal`] is raised immediately.
    pub fn stop(&self) {
        self.request_stop();
    }

    /// Receiver that turns `true` once [`stop`](Self::stop) has been called.
    pub fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop_signal.subscribe()
    }

    fn request_stop(&self) -> bool {
        let delay = self.config.stop_delay();
        info!(delay = ?delay, "Stop requested");
        self.stop_signal.send_replace(true);
        schedule_exit(self.main_tx.clone(), delay)
    }

    async fn post(&self, message: MainMessage) -> Result<()> {
        self.main_tx
            .send(message)
            .await
            .map_err(|_| RunnerError::MainLoopClosed)
    }

    /// Queue a readiness check unless one is already waiting to be consumed.
    async fn request_start_check(&self) -> Result<()> {
        if self.start_check_pending.swap(true, Ordering::SeqCst) {
            debug!("Start check already queued");
            return Ok(());
        }
        let posted = self.post(MainMessage::StartIfReady).await;
        if posted.is_err() {
            self.start_check_pending.store(false, Ordering::SeqCst);
        }
        posted
    }

    /// Consume the main queue until [`MainMessage::Exit`].
    ///
    /// Returns an error when the entry module cannot be found or the entry
    /// function fails; the lifecycle is then `Failed`. An entry function still
    /// running at exit is cancelled. Only one main loop can run per runner.
    pub async fn run_main_loop(self: &Arc<Self>) -> Result<()> {
        let mut rx = self
            .main_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(RunnerError::MainLoopClosed)?;
        let mut app: JoinSet<anyhow::Result<()>> = JoinSet::new();

        info!("Main loop started");
        loop {
            tokio::select! {
                message = rx.recv() => match message {
                    Some(MainMessage::StartIfReady) => {
                        self.start_check_pending.store(false, Ordering::SeqCst);
                        match self.start_if_ready() {
                            Ok(Some(entry)) => {
                                app.spawn(entry);
                            }
                            Ok(None) => {}
                            Err(e) => {
                                error!(error = %e, "Application failed to start");
                                return Err(e);
                            }
                        }
                    }
                    Some(MainMessage::WindowEvent) => self.window_event().await,
                    Some(MainMessage::Exit) | None => break,
                },
                Some(finished) = app.join_next() => {
                    let outcome = finished
                        .unwrap_or_else(|e| Err(anyhow::anyhow!("entry task did not complete: {e}")));
                    if let Err(e) = outcome {
                        let err = RunnerError::Application(e);
                        error!(error = %err, "Application entry failed");
                        let _ = self.lifecycle.transition_to_failed(err.to_string());
                        return Err(err);
                    }
                    debug!("Entry function returned");
                }
            }
        }

        if !app.is_empty() {
            debug!("Cancelling running entry function");
            app.shutdown().await;
        }
        if self.lifecycle.transition_to_stopped().is_ok() {
            info!("Main loop stopped");
        }
        Ok(())
    }

    /// Claim the start if both conditions hold and it has not happened yet,
    /// and resolve the entry module. Returns the entry future to run, if the
    /// module has one.
    fn start_if_ready(
        self: &Arc<Self>,
    ) -> Result<Option<BoxFuture<'static, anyhow::Result<()>>>> {
        if !self.gate.try_start() {
            debug!(state = ?self.gate.state(), "Not ready to start");
            return Ok(None);
        }

        let module_name = self
            .session()
            .package
            .and_then(|package| package.main_module)
            .unwrap_or_else(|| self.config.default_entry_module.clone());
        let root = import_root(self.sandbox.mount_point(), &module_name);

        let Some(module) = self.importer.find_module(&self.vfs, &root, &module_name) else {
            let err = RunnerError::EntryPointNotFound {
                module: module_name,
            };
            let _ = self.lifecycle.transition_to_failed(err.to_string());
            return Err(err);
        };

        info!(module = %module.name(), path = %module.path(), "Starting application");
        let entry = module
            .entry()
            .map(|entry| entry(AppContext::new(self.clone())));

        if let Err(reason) = self.lifecycle.transition_to_started(module_name) {
            warn!(reason, "Lifecycle not updated after start");
        }
        Ok(entry)
    }

    async fn window_event(&self) {
        if !self.gate.is_started() {
            debug!("Window event before start, ignoring");
            return;
        }
        if self.window_opened.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(page) = self
            .window_page
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            self.pages.unload_page(page);
        }
        self.update_session(|session| session.window_opened = true);

        if let Err(e) = self.bridge.notify("onwindowopen").await {
            warn!(error = %e, "Failed to notify host that the window opened");
        }
    }
}

/// Post [`MainMessage::Exit`] after `delay`. False when there is no runtime to
/// run the timer on.
fn schedule_exit(tx: mpsc::Sender<MainMessage>, delay: Duration) -> bool {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(MainMessage::Exit).await;
            });
            true
        }
        Err(_) => {
            warn!("Stop requested outside an async runtime, ignoring");
            false
        }
    }
}
