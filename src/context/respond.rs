//! Response staging and the finalization contract.
//!
//! Every finalization method stages a payload, marks the response finalized
//! and then settles: with no offload armed it returns
//! `Err(Interrupt::DONE)` so `?` unwinds out of the handler; with an offload
//! armed it hands the staged response to the offload and returns `Ok(())`.
//! Once finalized, later calls never touch the staged response again; they
//! only settle.

use crate::error::JetError;
use crate::http::{ResponseBody, ResponseStream, StagedResponse};
use crate::runtime::HostIo;
use crate::signal::{Flow, Interrupt};
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const TEXT_PLAIN: &str = "text/plain";
pub const APPLICATION_JSON: &str = "application/json";
/// Filename used when a streamed path has no final segment.
pub const FALLBACK_FILENAME: &str = "unnamed.bin";

/// Delivers a finalized response outside the handler's return path.
pub type OffloadFn = Box<dyn FnOnce(StagedResponse) + Send + Sync>;

#[derive(Default)]
enum Offload {
    #[default]
    Unset,
    Armed(OffloadFn),
    Fired,
}

/// The staged, not yet written, response.
#[derive(Default)]
pub struct Reply {
    payload: Option<Bytes>,
    headers: HashMap<String, String>,
    stream: Option<ResponseStream>,
    finalized: bool,
    offload: Offload,
}

impl Reply {
    pub(crate) fn with_headers(headers: HashMap<String, String>) -> Self {
        Self {
            headers,
            ..Self::default()
        }
    }

    pub(crate) fn arm(&mut self, offload: OffloadFn) {
        self.offload = Offload::Armed(offload);
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn has_offload(&self) -> bool {
        !matches!(self.offload, Offload::Unset)
    }

    /// Whether the armed offload already received the response.
    pub fn is_delivered(&self) -> bool {
        matches!(self.offload, Offload::Fired)
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }

    pub fn stream(&self) -> Option<&ResponseStream> {
        self.stream.as_ref()
    }

    /// Insert a header, replacing any name that differs only in case.
    pub(crate) fn put_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
        self.headers.insert(name.to_string(), value.into());
    }

    fn stage_payload(&mut self, payload: Bytes, content_type: Option<&str>) {
        if let Some(content_type) = content_type {
            self.put_header("Content-Type", content_type);
        }
        self.payload = Some(payload);
        self.stream = None;
    }

    fn stage_stream(&mut self, stream: ResponseStream, content_type: &str) {
        self.put_header("Content-Type", content_type);
        self.stream = Some(stream);
        self.payload = None;
    }

    /// Move the staged response out.
    pub(crate) fn take(&mut self, code: u16) -> StagedResponse {
        let body = match self.stream.take() {
            Some(stream) => ResponseBody::Stream(stream),
            None => ResponseBody::Full(self.payload.take().unwrap_or_default()),
        };
        StagedResponse {
            status: code,
            headers: mem::take(&mut self.headers),
            body,
        }
    }

    fn settle(&mut self, code: u16) -> Flow {
        match mem::take(&mut self.offload) {
            Offload::Unset => Err(Interrupt::DONE),
            Offload::Armed(deliver) => {
                let response = self.take(code);
                self.offload = Offload::Fired;
                deliver(response);
                Ok(())
            }
            Offload::Fired => {
                self.offload = Offload::Fired;
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply")
            .field("payload", &self.payload)
            .field("headers", &self.headers)
            .field("stream", &self.stream)
            .field("finalized", &self.finalized)
            .field("offload", &self.has_offload())
            .finish()
    }
}

/// Disjoint borrows of what a finalization method needs.
pub struct Staging<'a> {
    pub(crate) code: &'a mut u16,
    pub(crate) reply: &'a mut Reply,
    pub(crate) io: &'a dyn HostIo,
}

impl Staging<'_> {
    /// Stage once, then settle. `repeat` names the operation to warn about
    /// when the response was already finalized.
    fn finalize(
        self,
        repeat: Option<&str>,
        stage: impl FnOnce(&mut u16, &mut Reply, &dyn HostIo),
    ) -> Flow {
        if self.reply.finalized {
            if let Some(operation) = repeat {
                warn!(
                    "{} called after the response was finalized; staged response kept",
                    operation
                );
            }
        } else {
            stage(&mut *self.code, &mut *self.reply, self.io);
            self.reply.finalized = true;
        }
        self.reply.settle(*self.code)
    }
}

/// What `throw` responds with.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// A status code with a text (string) or JSON (object/array) message.
    /// Other message values stage no payload.
    Status { code: u16, message: Value },
    /// A payload answered with status 400.
    Payload(Value),
}

impl Fault {
    pub fn new(code: u16, message: impl Into<Value>) -> Self {
        Fault::Status {
            code,
            message: message.into(),
        }
    }
}

impl Default for Fault {
    fn default() -> Self {
        Fault::new(404, "Not Found")
    }
}

impl From<()> for Fault {
    fn from(_: ()) -> Self {
        Fault::default()
    }
}

fn status_code<C: TryInto<u16>>(code: C) -> u16 {
    code.try_into().unwrap_or(500)
}

// Integer literals fall back to i32, so status impls exist for both widths.
macro_rules! status_faults {
    ($($int:ty),*) => {$(
        impl From<$int> for Fault {
            fn from(code: $int) -> Self {
                Fault::new(status_code(code), "Not Found")
            }
        }

        impl From<($int, &str)> for Fault {
            fn from((code, message): ($int, &str)) -> Self {
                Fault::new(status_code(code), message)
            }
        }

        impl From<($int, String)> for Fault {
            fn from((code, message): ($int, String)) -> Self {
                Fault::new(status_code(code), message)
            }
        }

        impl From<($int, Value)> for Fault {
            fn from((code, message): ($int, Value)) -> Self {
                Fault::new(status_code(code), message)
            }
        }
    )*};
}

status_faults!(u16, i32);

impl From<&str> for Fault {
    fn from(payload: &str) -> Self {
        Fault::Payload(payload.into())
    }
}

impl From<String> for Fault {
    fn from(payload: String) -> Self {
        Fault::Payload(payload.into())
    }
}

impl From<Value> for Fault {
    fn from(value: Value) -> Self {
        match value.as_u64().and_then(|code| u16::try_from(code).ok()) {
            Some(code) => Fault::from(code),
            None => Fault::Payload(value),
        }
    }
}

/// Where `send_stream` reads from.
#[derive(Debug)]
pub enum StreamSource {
    Path(PathBuf),
    Stream(ResponseStream),
}

impl From<&str> for StreamSource {
    fn from(path: &str) -> Self {
        StreamSource::Path(PathBuf::from(path))
    }
}

impl From<String> for StreamSource {
    fn from(path: String) -> Self {
        StreamSource::Path(PathBuf::from(path))
    }
}

impl From<&Path> for StreamSource {
    fn from(path: &Path) -> Self {
        StreamSource::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for StreamSource {
    fn from(path: PathBuf) -> Self {
        StreamSource::Path(path)
    }
}

impl From<ResponseStream> for StreamSource {
    fn from(stream: ResponseStream) -> Self {
        StreamSource::Stream(stream)
    }
}

/// Final segment of a path, or the fallback filename.
pub fn inline_filename(path: &Path) -> String {
    let text = path.to_string_lossy();
    match text.rsplit('/').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => FALLBACK_FILENAME.to_string(),
    }
}

fn classify<T: Serialize>(data: &T) -> Result<(Bytes, &'static str), JetError> {
    let value = serde_json::to_value(data)?;
    let classified = match value {
        Value::String(text) => (Bytes::from(text), TEXT_PLAIN),
        Value::Object(_) | Value::Array(_) => (Bytes::from(serde_json::to_vec(&value)?), APPLICATION_JSON),
        Value::Null | Value::Bool(false) => (Bytes::new(), TEXT_PLAIN),
        Value::Number(ref number) if number.as_f64() == Some(0.0) => (Bytes::new(), TEXT_PLAIN),
        other => (Bytes::from(other.to_string()), TEXT_PLAIN),
    };
    Ok(classified)
}

fn message_payload(message: Value) -> Option<(Bytes, &'static str)> {
    match message {
        Value::String(text) => Some((Bytes::from(text), TEXT_PLAIN)),
        Value::Object(_) | Value::Array(_) => Some((Bytes::from(message.to_string()), APPLICATION_JSON)),
        _ => None,
    }
}

/// The finalization contract, shared by [`Context`](crate::Context) and
/// [`Deferred`](crate::Deferred).
pub trait Respond {
    /// Borrow the staging area.
    fn staging(&mut self) -> Staging<'_>;

    /// Send `data`, inferring the content type: strings are `text/plain`,
    /// objects and arrays are JSON, anything else is its text form.
    fn send<T: Serialize>(&mut self, data: T) -> Flow {
        let (payload, content_type) = classify(&data)?;
        self.staging().finalize(Some("send"), |_, reply, _| {
            reply.stage_payload(payload, Some(content_type));
        })
    }

    /// Like [`send`](Self::send) with an explicit content type.
    fn send_as<T: Serialize>(&mut self, data: T, content_type: &str) -> Flow {
        let (payload, _) = classify(&data)?;
        self.staging().finalize(Some("send"), |_, reply, _| {
            reply.stage_payload(payload, Some(content_type));
        })
    }

    /// Send raw bytes.
    fn send_bytes(&mut self, bytes: impl Into<Bytes>, content_type: &str) -> Flow {
        let payload = bytes.into();
        self.staging().finalize(Some("send"), |_, reply, _| {
            reply.stage_payload(payload, Some(content_type));
        })
    }

    /// Redirect permanently to `url`.
    fn redirect(&mut self, url: &str) -> Flow {
        self.staging().finalize(Some("redirect"), |code, reply, _| {
            *code = 301;
            reply.put_header("Location", url);
            reply.stage_payload(Bytes::new(), None);
        })
    }

    /// Respond with an error. Stages nothing if the response was already
    /// finalized, but always settles.
    fn throw(&mut self, fault: impl Into<Fault>) -> Flow {
        let fault = fault.into();
        self.staging().finalize(None, |code, reply, _| {
            let (status, message) = match fault {
                Fault::Status { code, message } => (code, message),
                Fault::Payload(payload) => (400, payload),
            };
            *code = status;
            match message_payload(message) {
                Some((payload, content_type)) => reply.stage_payload(payload, Some(content_type)),
                None => reply.stage_payload(Bytes::new(), None),
            }
        })
    }

    /// Stream a file or a body without buffering it. A path is opened lazily
    /// through the active host I/O and named inline in `Content-Disposition`.
    fn send_stream(&mut self, source: impl Into<StreamSource>, content_type: &str) -> Flow {
        let source = source.into();
        self.staging().finalize(Some("send_stream"), |_, reply, io| {
            let stream = match source {
                StreamSource::Path(path) => {
                    reply.put_header(
                        "Content-Disposition",
                        format!("inline; filename=\"{}\"", inline_filename(&path)),
                    );
                    io.open_file(&path)
                }
                StreamSource::Stream(stream) => stream,
            };
            reply.stage_stream(stream, content_type);
        })
    }

    /// Stage a response header. Ignored when either argument is empty or the
    /// response is already finalized.
    fn set(&mut self, field: &str, value: &str) {
        if field.is_empty() || value.is_empty() {
            return;
        }
        let staging = self.staging();
        if staging.reply.finalized {
            warn!("Header '{}' set after the response was finalized; ignored", field);
            return;
        }
        staging.reply.put_header(field, value);
    }
}
