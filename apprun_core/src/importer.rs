//! Entry module lookup.
//!
//! The runner resolves the entry module through a [`ModuleImporter`]. A
//! dotted name `pkg.sub.start` is looked up as leaf `start` under import root
//! `<mount point>/pkg/sub`.

use crate::context::AppContext;
use crate::vfs::{VirtualFileSystem, VirtualPath};
use dashmap::DashMap;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::debug;

/// An application entry function. Receives the session context as its only
/// argument.
pub type EntryFn = Arc<dyn Fn(AppContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// A module found by an importer.
#[derive(Clone)]
pub struct LoadedModule {
    name: String,
    path: VirtualPath,
    entry: Option<EntryFn>,
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("has_entry", &self.entry.is_some())
            .finish()
    }
}

impl LoadedModule {
    pub fn new(name: impl Into<String>, path: VirtualPath, entry: Option<EntryFn>) -> Self {
        Self {
            name: name.into(),
            path,
            entry,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &VirtualPath {
        &self.path
    }

    pub fn entry(&self) -> Option<&EntryFn> {
        self.entry.as_ref()
    }
}

/// Locates modules below an import root.
pub trait ModuleImporter: Send + Sync {
    /// Find `name` (possibly dotted) under `root`. Importers may consult `vfs`
    /// to check what the archive actually ships.
    fn find_module(
        &self,
        vfs: &VirtualFileSystem,
        root: &VirtualPath,
        name: &str,
    ) -> Option<LoadedModule>;
}

/// Last component of a dotted module name.
pub fn module_leaf(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Import root for `name`: `mount_point` plus every dotted component but the
/// last, as directories.
pub fn import_root(mount_point: &VirtualPath, name: &str) -> VirtualPath {
    match name.rsplit_once('.') {
        Some((package, _)) => mount_point.join(&package.replace('.', "/")),
        None => mount_point.clone(),
    }
}

/// Modules compiled into the host, keyed by virtual module path
/// (`<root>/<leaf>`, for example `/mf/main`).
///
/// A registration can require a marker file in the namespace, so the module is
/// only found when the mounted archive actually ships it.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: DashMap<VirtualPath, Registration>,
}

#[derive(Clone)]
struct Registration {
    entry: Option<EntryFn>,
    marker: Option<String>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module at `module_path` with an optional entry function.
    pub fn register(&self, module_path: &str, entry: Option<EntryFn>) {
        self.modules.insert(
            VirtualPath::new(module_path),
            Registration {
                entry,
                marker: None,
            },
        );
    }

    /// Like [`register`](Self::register), but the module is only found when
    /// `<module_path>.<marker_extension>` exists in the virtual filesystem.
    pub fn register_with_marker(
        &self,
        module_path: &str,
        marker_extension: &str,
        entry: Option<EntryFn>,
    ) {
        self.modules.insert(
            VirtualPath::new(module_path),
            Registration {
                entry,
                marker: Some(marker_extension.to_string()),
            },
        );
    }

    /// Register an entry function from an async closure.
    pub fn register_entry<F, Fut>(&self, module_path: &str, entry: F)
    where
        F: Fn(AppContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let entry: EntryFn = Arc::new(move |ctx| Box::pin(entry(ctx)));
        self.register(module_path, Some(entry));
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl ModuleImporter for ModuleRegistry {
    fn find_module(
        &self,
        vfs: &VirtualFileSystem,
        root: &VirtualPath,
        name: &str,
    ) -> Option<LoadedModule> {
        let path = root.join(module_leaf(name));
        let registration = self.modules.get(&path)?.clone();

        if let Some(ext) = &registration.marker {
            let marker = format!("{path}.{ext}");
            if !vfs.exists(&marker) {
                debug!(module = name, marker = %marker, "Module marker missing");
                return None;
            }
        }

        Some(LoadedModule::new(name, path, registration.entry))
    }
}
