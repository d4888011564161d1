//! Plugin envelopes and the shared extension namespace.
//!
//! A plugin is a named, optionally versioned executor. At startup the
//! registry calls every executor once and merges the returned extension
//! functions into one immutable [`Extensions`] map that every context sees
//! as `ctx.app()`.

use crate::error::JetError;
use crate::runtime::{JetConfig, RuntimeKind};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// An extension function exposed on the app namespace.
pub type ExtensionFn = Arc<dyn Fn(Value) -> Result<Value, JetError> + Send + Sync>;

/// Plugin executor. Receives the envelope itself and the init payload.
pub type Executor = Arc<dyn Fn(&Plugin, &PluginInit) -> Result<Extensions, JetError> + Send + Sync>;

/// Extension functions by name.
#[derive(Clone, Default)]
pub struct Extensions {
    functions: HashMap<String, ExtensionFn>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an extension function.
    pub fn with<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(Value) -> Result<Value, JetError> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    pub fn get(&self, name: &str) -> Option<&ExtensionFn> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Invoke an extension by name.
    pub fn call(&self, name: &str, args: Value) -> Result<Value, JetError> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| JetError::UnknownExtension(name.to_string()))?;
        function(args)
    }

    /// Extension names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Merge `other` in; its entries replace existing names.
    pub fn merge(&mut self, other: Extensions) -> Vec<String> {
        let mut replaced = Vec::new();
        for (name, function) in other.functions {
            if self.functions.insert(name.clone(), function).is_some() {
                replaced.push(name);
            }
        }
        replaced
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions").field("names", &self.names()).finish()
    }
}

/// Payload handed to every executor during setup.
#[derive(Debug, Clone)]
pub struct PluginInit {
    pub config: JetConfig,
    pub runtime: RuntimeKind,
}

/// A named capability bundle.
#[derive(Clone)]
pub struct Plugin {
    pub name: Option<String>,
    pub version: Option<String>,
    /// The plugin serves requests itself; the host skips its own listener.
    pub has_server: bool,
    executor: Executor,
}

impl Plugin {
    /// Create a plugin from its executor.
    pub fn new<F>(executor: F) -> Self
    where
        F: Fn(&Plugin, &PluginInit) -> Result<Extensions, JetError> + Send + Sync + 'static,
    {
        Self {
            name: None,
            version: None,
            has_server: false,
            executor: Arc::new(executor),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Declare that the plugin provides its own server.
    pub fn with_server(mut self, has_server: bool) -> Self {
        self.has_server = has_server;
        self
    }

    /// Display label: the name, or `"anonymous"`.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("anonymous")
    }

    /// Run the executor with this envelope as receiver.
    pub fn setup(&self, init: &PluginInit) -> Result<Extensions, JetError> {
        (self.executor)(self, init)
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("has_server", &self.has_server)
            .finish()
    }
}

/// Result of running every plugin once.
#[derive(Debug, Clone, Default)]
pub struct PluginSetup {
    pub extensions: Arc<Extensions>,
    /// Some plugin serves requests itself.
    pub has_server: bool,
}

/// Plugins registered before startup.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: Vec<Plugin>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin.
    pub fn register(&mut self, plugin: Plugin) {
        info!("Registered plugin: {}", plugin.label());
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Run every executor in registration order and freeze the merged
    /// namespace. Later plugins win on name clashes.
    pub fn build(&self, init: &PluginInit) -> Result<PluginSetup, JetError> {
        let mut extensions = Extensions::new();
        let mut has_server = false;

        for plugin in &self.plugins {
            let provided = plugin.setup(init)?;
            for name in extensions.merge(provided) {
                warn!(
                    "Plugin '{}' replaced extension '{}'",
                    plugin.label(),
                    name
                );
            }
            has_server |= plugin.has_server;
            info!(
                "Loaded plugin: {}{}",
                plugin.label(),
                plugin
                    .version
                    .as_deref()
                    .map(|v| format!(" v{}", v))
                    .unwrap_or_default()
            );
        }

        Ok(PluginSetup {
            extensions: Arc::new(extensions),
            has_server,
        })
    }
}
