//! Server configuration.

use crate::error::JetError;
use crate::runtime::capability::{Capabilities, RuntimeKind, RUNTIME_ENV};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Configuration for the Jetpath server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JetConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Host I/O model. `None` probes the process once at startup.
    pub runtime: Option<RuntimeKind>,
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
    /// How long a deferred responder may take to finalize, in seconds.
    pub offload_timeout: u64,
    /// Idle contexts kept for reuse.
    pub pool_size: usize,
    /// Headers added to every response unless the handler staged its own.
    pub global_headers: HashMap<String, String>,
}

impl Default for JetConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            runtime: None,
            max_body_size: 10 * 1024 * 1024, // 10MB
            offload_timeout: 30,
            pool_size: 64,
            global_headers: HashMap::new(),
        }
    }
}

impl JetConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `JETPATH_HOST`, `JETPATH_PORT` and
    /// `JETPATH_RUNTIME`.
    pub fn from_env() -> Result<Self, JetError> {
        let mut config = Self::default();
        if let Ok(host) = std::env::var("JETPATH_HOST") {
            config.host = host;
        }
        if let Ok(port) = std::env::var("JETPATH_PORT") {
            config.port = port
                .parse()
                .map_err(|_| JetError::Config(format!("JETPATH_PORT '{}' is not a port", port)))?;
        }
        if let Ok(runtime) = std::env::var(RUNTIME_ENV) {
            let kind = RuntimeKind::parse(&runtime).ok_or_else(|| {
                JetError::Config(format!("{} '{}' is not a known runtime", RUNTIME_ENV, runtime))
            })?;
            config.runtime = Some(kind);
        }
        Ok(config)
    }

    /// Set the host address.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Pin the host I/O model instead of probing.
    pub fn runtime(mut self, runtime: RuntimeKind) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Set the request body limit.
    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    /// Set the deferred-response timeout in seconds.
    pub fn offload_timeout(mut self, seconds: u64) -> Self {
        self.offload_timeout = seconds;
        self
    }

    /// Set the number of idle contexts kept for reuse.
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Add a header sent with every response.
    pub fn global_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.global_headers.insert(key.into(), value.into());
        self
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Capabilities selected by this config.
    pub fn capabilities(&self) -> Capabilities {
        match self.runtime {
            Some(kind) => Capabilities::of(kind),
            None => Capabilities::probe(),
        }
    }

    pub fn offload_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.offload_timeout)
    }
}
