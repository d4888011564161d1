//! Runtime capability switch.
//!
//! Two host I/O models are supported. The fetch model exposes headers
//! through an accessor and reads the body in a single shot. The stream model
//! exposes headers as a plain lower-cased object and accumulates the body
//! frame by frame. The model is chosen once per process and injected into
//! every context as a [`HostIo`] implementation, so context methods never
//! branch on the runtime themselves.

use crate::error::JetError;
use crate::http::{HostRequest, ResponseStream};
use async_trait::async_trait;
use bytes::BytesMut;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Environment variable consulted by [`Capabilities::probe`].
pub const RUNTIME_ENV: &str = "JETPATH_RUNTIME";

/// The host I/O model in use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// Promise-style accessors.
    #[default]
    Fetch,
    /// Event-emitting incoming messages.
    Stream,
}

impl RuntimeKind {
    /// Parse a runtime name. `node` is accepted as an alias for `stream`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "fetch" | "bun" | "deno" => Some(RuntimeKind::Fetch),
            "stream" | "node" => Some(RuntimeKind::Stream),
            _ => None,
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeKind::Fetch => write!(f, "fetch"),
            RuntimeKind::Stream => write!(f, "stream"),
        }
    }
}

/// Which host I/O primitives are active. Exactly one flag is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub fetch: bool,
    pub stream: bool,
}

static PROBED: OnceLock<Capabilities> = OnceLock::new();

impl Capabilities {
    /// Capabilities for a known runtime.
    pub fn of(kind: RuntimeKind) -> Self {
        Self {
            fetch: kind == RuntimeKind::Fetch,
            stream: kind == RuntimeKind::Stream,
        }
    }

    /// Probe the process once and cache the answer.
    pub fn probe() -> Self {
        *PROBED.get_or_init(|| {
            let kind = std::env::var(RUNTIME_ENV)
                .ok()
                .and_then(|name| RuntimeKind::parse(&name))
                .unwrap_or_default();
            debug!("Probed host runtime: {}", kind);
            Self::of(kind)
        })
    }

    /// The active runtime.
    pub fn active(&self) -> RuntimeKind {
        if self.stream {
            RuntimeKind::Stream
        } else {
            RuntimeKind::Fetch
        }
    }

    /// Build the host I/O implementation for the active runtime.
    pub fn host_io(&self, max_body_size: usize) -> Arc<dyn HostIo> {
        match self.active() {
            RuntimeKind::Fetch => Arc::new(FetchIo::new(max_body_size)),
            RuntimeKind::Stream => Arc::new(StreamIo::new(max_body_size)),
        }
    }
}

/// Header, body and file access for one host I/O model.
#[async_trait]
pub trait HostIo: Send + Sync + fmt::Debug {
    /// Which runtime this implements.
    fn kind(&self) -> RuntimeKind;

    /// Look a request header up by name.
    fn header(&self, request: &HostRequest, field: &str) -> Option<String>;

    /// Read the whole request body and parse it as JSON.
    async fn read_json(&self, request: &mut HostRequest) -> Result<Value, JetError>;

    /// Open a lazy readable handle for a file.
    fn open_file(&self, path: &Path) -> ResponseStream;
}

fn parse_json(bytes: &[u8]) -> Result<Value, JetError> {
    serde_json::from_slice(bytes).map_err(JetError::BodyParse)
}

/// Promise-style host I/O.
#[derive(Debug, Clone)]
pub struct FetchIo {
    max_body_size: usize,
}

impl FetchIo {
    pub fn new(max_body_size: usize) -> Self {
        Self { max_body_size }
    }
}

#[async_trait]
impl HostIo for FetchIo {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Fetch
    }

    fn header(&self, request: &HostRequest, field: &str) -> Option<String> {
        let values: Vec<&str> = request
            .headers()
            .get_all(field)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }

    async fn read_json(&self, request: &mut HostRequest) -> Result<Value, JetError> {
        let body = request.take_body().ok_or(JetError::BodyConsumed)?;
        let collected = Limited::new(body, self.max_body_size)
            .collect()
            .await
            .map_err(|err| {
                if err.is::<LengthLimitError>() {
                    JetError::PayloadTooLarge {
                        limit: self.max_body_size,
                    }
                } else {
                    JetError::Body(err.to_string())
                }
            })?;
        parse_json(&collected.to_bytes())
    }

    fn open_file(&self, path: &Path) -> ResponseStream {
        ResponseStream::file(path)
    }
}

/// Event-stream host I/O.
#[derive(Debug, Clone)]
pub struct StreamIo {
    max_body_size: usize,
}

impl StreamIo {
    pub fn new(max_body_size: usize) -> Self {
        Self { max_body_size }
    }
}

#[async_trait]
impl HostIo for StreamIo {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Stream
    }

    fn header(&self, request: &HostRequest, field: &str) -> Option<String> {
        request
            .header_object()
            .get(&field.to_ascii_lowercase())
            .cloned()
    }

    async fn read_json(&self, request: &mut HostRequest) -> Result<Value, JetError> {
        let mut body = request.take_body().ok_or(JetError::BodyConsumed)?;
        let mut chunks = BytesMut::new();
        while let Some(frame) = body.frame().await {
            let Ok(data) = frame?.into_data() else {
                continue;
            };
            if chunks.len() + data.len() > self.max_body_size {
                return Err(JetError::PayloadTooLarge {
                    limit: self.max_body_size,
                });
            }
            chunks.extend_from_slice(&data);
        }
        parse_json(&chunks)
    }

    fn open_file(&self, path: &Path) -> ResponseStream {
        ResponseStream::reader(path)
    }
}
