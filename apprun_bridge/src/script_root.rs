//! The application's root script object, as seen by the host.
//!
//! Application code stores values and methods here for the host to inspect
//! and call. The runner publishes a `stop` method by default.

use crate::error::{BridgeError, Result};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

pub type ScriptMethod = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

#[derive(Clone)]
enum ScriptProperty {
    Value(Value),
    Method(ScriptMethod),
}

#[derive(Default)]
pub struct ScriptAttributes {
    properties: DashMap<String, ScriptProperty>,
}

impl std::fmt::Debug for ScriptAttributes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptAttributes")
            .field("properties", &self.property_names())
            .finish()
    }
}

impl ScriptAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_property(&self, name: impl Into<String>, value: Value) {
        self.properties
            .insert(name.into(), ScriptProperty::Value(value));
    }

    /// Plain values only; methods are reached through [`ScriptAttributes::call`].
    pub fn get_property(&self, name: &str) -> Option<Value> {
        match self.properties.get(name)?.value() {
            ScriptProperty::Value(value) => Some(value.clone()),
            ScriptProperty::Method(_) => None,
        }
    }

    pub fn set_method<F>(&self, name: impl Into<String>, method: F)
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.properties
            .insert(name.into(), ScriptProperty::Method(Arc::new(method)));
    }

    pub fn has_method(&self, name: &str) -> bool {
        matches!(
            self.properties.get(name).as_deref(),
            Some(ScriptProperty::Method(_))
        )
    }

    pub fn remove(&self, name: &str) -> bool {
        self.properties.remove(name).is_some()
    }

    /// Invoke a published method.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        // Clone the method out so the map shard is not locked while it runs.
        let method = match self.properties.get(name).as_deref() {
            Some(ScriptProperty::Method(method)) => method.clone(),
            _ => return Err(BridgeError::UnknownMethod(name.to_string())),
        };
        method(args)
    }

    /// Sorted names of everything published.
    pub fn property_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.properties.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
