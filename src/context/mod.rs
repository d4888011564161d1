//! The per-request context.
//!
//! A [`Context`] carries the request facts a handler reads (params, query,
//! body, headers) and the response it stages. Contexts are pooled by the
//! runtime and fully reset before every request.

mod deferred;
mod respond;

pub use deferred::Deferred;
pub use respond::{
    inline_filename, Fault, OffloadFn, Reply, Respond, Staging, StreamSource, APPLICATION_JSON,
    FALLBACK_FILENAME, TEXT_PLAIN,
};

use crate::error::JetError;
use crate::http::{HostRequest, ResponseStream, StagedResponse};
use crate::plugin::Extensions;
use crate::router::{Params, RouteTable, SchemaLookup};
use crate::runtime::{Capabilities, HostIo, RuntimeKind};
use crate::signal::{Flow, Interrupt};
use bytes::Bytes;
use hyper::Method;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

const DEFAULT_MAX_BODY: usize = 10 * 1024 * 1024;

/// Process-wide collaborators every context sees.
#[derive(Clone)]
pub struct Shared {
    pub io: Arc<dyn HostIo>,
    pub app: Arc<Extensions>,
    pub schemas: Arc<dyn SchemaLookup>,
}

impl Shared {
    pub fn new(io: Arc<dyn HostIo>, app: Arc<Extensions>, schemas: Arc<dyn SchemaLookup>) -> Self {
        Self { io, app, schemas }
    }

    /// Collaborators for a context used outside a server: no plugins, no
    /// schemas.
    pub fn detached(kind: RuntimeKind) -> Self {
        Self {
            io: Capabilities::of(kind).host_io(DEFAULT_MAX_BODY),
            app: Arc::default(),
            schemas: Arc::new(RouteTable::new()),
        }
    }
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("io", &self.io)
            .field("app", &self.app)
            .finish()
    }
}

/// Per-request record handed to handlers.
pub struct Context {
    /// Status code that will be sent. Defaults to 200.
    pub code: u16,
    request: Option<HostRequest>,
    params: Params,
    search: Params,
    body: Option<Value>,
    path: String,
    method: Method,
    shared: Shared,
    reply: Reply,
    ejected: bool,
    deferred: Option<oneshot::Receiver<StagedResponse>>,
}

impl Context {
    pub fn new(shared: Shared) -> Self {
        Self {
            code: 200,
            request: None,
            params: Params::new(),
            search: Params::new(),
            body: None,
            path: String::new(),
            method: Method::GET,
            shared,
            reply: Reply::default(),
            ejected: false,
            deferred: None,
        }
    }

    /// Reinitialize every field for a new request. `path` is the matched
    /// route template.
    pub fn reset(
        &mut self,
        request: HostRequest,
        path: impl Into<String>,
        params: Option<Params>,
        search: Option<Params>,
    ) {
        self.code = 200;
        self.method = request.method().clone();
        self.request = Some(request);
        self.path = path.into();
        self.params = params.unwrap_or_default();
        self.search = search.unwrap_or_default();
        self.body = None;
        self.reply = Reply::default();
        self.ejected = false;
        self.deferred = None;
    }

    /// Drop request-scoped resources while keeping the slot.
    pub(crate) fn clear(&mut self) {
        self.request = None;
        self.body = None;
        self.reply = Reply::default();
        self.deferred = None;
        self.params.clear();
        self.search.clear();
    }

    pub fn request(&self) -> Option<&HostRequest> {
        self.request.as_ref()
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// A route parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn search(&self) -> &Params {
        &self.search
    }

    /// A query value by name.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.search.get(name).map(String::as_str)
    }

    /// The materialized body, if [`json`](Self::json) already ran.
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// The matched route template.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Plugin-provided extension functions.
    pub fn app(&self) -> &Extensions {
        &self.shared.app
    }

    pub fn runtime(&self) -> RuntimeKind {
        self.shared.io.kind()
    }

    /// A request header by name.
    pub fn get(&self, field: &str) -> Option<String> {
        if field.is_empty() {
            return None;
        }
        let request = self.request.as_ref()?;
        self.shared.io.header(request, field)
    }

    /// Abandon the synchronous completion path. Always returns
    /// `Err(Interrupt::EJECT)`.
    pub fn eject<T>(&mut self) -> Flow<T> {
        self.ejected = true;
        Err(Interrupt::EJECT)
    }

    /// Read and parse the request body once; later calls return the cached
    /// value without touching the transport.
    pub async fn json(&mut self) -> Result<&Value, JetError> {
        if self.body.is_none() {
            let request = self.request.as_mut().ok_or(JetError::NoRequest)?;
            let value = self.shared.io.read_json(request).await?;
            self.body = Some(value);
        }
        self.body.as_ref().ok_or(JetError::BodyConsumed)
    }

    /// Parse the body into `T`.
    pub async fn json_as<T: DeserializeOwned>(&mut self) -> Result<T, JetError> {
        let value = self.json().await?.clone();
        Ok(serde_json::from_value(value)?)
    }

    /// Validate the materialized body, or an empty object when the body was
    /// never read, against the schema of the current route.
    pub fn validate(&self) -> Result<Value, JetError> {
        match &self.body {
            Some(body) => self.validate_value(body),
            None => self.validate_value(&Value::Object(Map::new())),
        }
    }

    /// Validate `data` against the schema of the current route.
    pub fn validate_value(&self, data: &Value) -> Result<Value, JetError> {
        let schema = self
            .shared
            .schemas
            .schema(&self.method, &self.path)
            .ok_or_else(|| JetError::MissingSchema {
                method: self.method.to_string(),
                path: self.path.clone(),
            })?;
        Ok(schema.validate(data)?)
    }

    /// Validate and deserialize in one step.
    pub fn validate_as<T: DeserializeOwned>(&self) -> Result<T, JetError> {
        Ok(serde_json::from_value(self.validate()?)?)
    }

    /// Hand response delivery to an owned responder. The handler should
    /// [`eject`](Self::eject) afterwards. Staged status and headers carry
    /// over; calling `defer` again replaces the earlier responder.
    pub fn defer(&mut self) -> Deferred {
        let (sender, receiver) = oneshot::channel();
        self.deferred = Some(receiver);
        Deferred::new(
            self.code,
            self.reply.headers().clone(),
            self.shared.io.clone(),
            sender,
        )
    }

    /// Arm a callback that sees the response once it is finalized. The
    /// response is then handed to the host, which writes it as it would a
    /// deferred one. Finalization methods return `Ok(())` instead of
    /// unwinding.
    pub fn set_offload<F>(&mut self, offload: F)
    where
        F: FnOnce(&StagedResponse) + Send + Sync + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        self.deferred = Some(receiver);
        self.reply.arm(Box::new(move |response| {
            offload(&response);
            if sender.send(response).is_err() {
                debug!("Offloaded response dropped; request already gone");
            }
        }));
    }

    pub fn is_finalized(&self) -> bool {
        self.reply.is_finalized()
    }

    pub fn is_ejected(&self) -> bool {
        self.ejected
    }

    /// Whether an armed offload already received the response.
    pub fn is_offloaded(&self) -> bool {
        self.reply.is_delivered()
    }

    pub fn response_headers(&self) -> &HashMap<String, String> {
        self.reply.headers()
    }

    pub fn payload(&self) -> Option<&Bytes> {
        self.reply.payload()
    }

    pub fn stream(&self) -> Option<&ResponseStream> {
        self.reply.stream()
    }

    /// Move the staged response out of the context.
    pub fn take_response(&mut self) -> StagedResponse {
        self.reply.take(self.code)
    }

    pub(crate) fn take_deferred(&mut self) -> Option<oneshot::Receiver<StagedResponse>> {
        self.deferred.take()
    }
}

impl Respond for Context {
    fn staging(&mut self) -> Staging<'_> {
        Staging {
            code: &mut self.code,
            reply: &mut self.reply,
            io: self.shared.io.as_ref(),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("code", &self.code)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("params", &self.params)
            .field("search", &self.search)
            .field("reply", &self.reply)
            .field("ejected", &self.ejected)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{handler, HandlerFuture};
    use crate::router::{FieldSchema, FieldType, Route, Schema};
    use crate::signal::Signal;
    use serde_json::json;
    use std::sync::Mutex;

    fn context(kind: RuntimeKind) -> Context {
        Context::new(Shared::detached(kind))
    }

    fn noop(_ctx: &mut Context) -> HandlerFuture<'_> {
        Box::pin(async { Ok(()) })
    }

    fn with_schema(method: Method, path: &str, schema: Schema) -> Context {
        let mut table = RouteTable::new();
        table.add(Route::new(method, path, handler(noop)).schema(schema));
        let shared = Shared::new(
            Capabilities::of(RuntimeKind::Fetch).host_io(1024),
            Arc::default(),
            Arc::new(table),
        );
        Context::new(shared)
    }

    #[test]
    fn test_reset_defaults() {
        let mut ctx = context(RuntimeKind::Fetch);
        ctx.reset(HostRequest::new(Method::GET, "/pets"), "/pets", None, None);

        assert_eq!(ctx.code, 200);
        assert!(ctx.params().is_empty());
        assert!(ctx.search().is_empty());
        assert!(ctx.body().is_none());
        assert!(!ctx.is_finalized());
        assert_eq!(ctx.method(), &Method::GET);
        assert_eq!(ctx.path(), "/pets");
    }

    #[test]
    fn test_reset_clears_previous_request() {
        let mut ctx = context(RuntimeKind::Fetch);
        let mut params = Params::new();
        params.insert("id".to_string(), "7".to_string());
        ctx.reset(HostRequest::new(Method::PUT, "/petBy/7"), "/petBy/:id", Some(params), None);
        ctx.set("X-Old", "1");
        ctx.set_offload(|_| {});
        let _ = ctx.throw(418);
        let _ = ctx.eject::<()>();

        ctx.reset(HostRequest::new(Method::GET, "/pets"), "/pets", None, None);
        assert_eq!(ctx.code, 200);
        assert!(ctx.params().is_empty());
        assert!(ctx.response_headers().is_empty());
        assert!(!ctx.is_finalized());
        assert!(!ctx.is_ejected());
        assert!(ctx.payload().is_none());
        assert!(matches!(ctx.send("fresh"), Err(Interrupt::Signal(Signal::Done))));
    }

    #[test]
    fn test_get_header_under_both_runtimes() {
        for kind in [RuntimeKind::Fetch, RuntimeKind::Stream] {
            let mut ctx = context(kind);
            let request = HostRequest::new(Method::GET, "/").header("X-Pet-Token", "abc");
            ctx.reset(request, "/", None, None);

            assert_eq!(ctx.get("x-pet-token").as_deref(), Some("abc"));
            assert_eq!(ctx.get("X-Pet-Token").as_deref(), Some("abc"));
            assert_eq!(ctx.get("X-Missing"), None);
            assert_eq!(ctx.get(""), None);
        }
    }

    #[test]
    fn test_eject_does_not_finalize() {
        let mut ctx = context(RuntimeKind::Fetch);
        ctx.reset(HostRequest::new(Method::GET, "/"), "/", None, None);
        let result: Flow<u8> = ctx.eject();
        assert!(matches!(result, Err(Interrupt::Signal(Signal::Eject))));
        assert!(ctx.is_ejected());
        assert!(!ctx.is_finalized());
    }

    #[tokio::test]
    async fn test_json_is_read_once_and_cached() {
        for kind in [RuntimeKind::Fetch, RuntimeKind::Stream] {
            let mut ctx = context(kind);
            let request = HostRequest::new(Method::POST, "/pets").body(r#"{"name":"Rex"}"#);
            ctx.reset(request, "/pets", None, None);

            let first = ctx.json().await.unwrap().clone();
            let second = ctx.json().await.unwrap().clone();
            assert_eq!(first, json!({"name": "Rex"}));
            assert_eq!(first, second);
            assert!(!ctx.request().unwrap().has_body());
        }
    }

    #[tokio::test]
    async fn test_json_parse_failure_rejects() {
        let mut ctx = context(RuntimeKind::Stream);
        ctx.reset(HostRequest::new(Method::POST, "/").body("{oops"), "/", None, None);
        assert!(matches!(ctx.json().await, Err(JetError::BodyParse(_))));
        assert!(ctx.body().is_none());
    }

    #[tokio::test]
    async fn test_json_as_typed() {
        #[derive(serde::Deserialize)]
        struct Pet {
            name: String,
        }
        let mut ctx = context(RuntimeKind::Fetch);
        ctx.reset(HostRequest::new(Method::POST, "/").body(r#"{"name":"Rex"}"#), "/", None, None);
        let pet: Pet = ctx.json_as().await.unwrap();
        assert_eq!(pet.name, "Rex");
    }

    #[tokio::test]
    async fn test_validate_round_trip() {
        let schema = Schema::new().field("name", FieldSchema::new(FieldType::String));
        let mut ctx = with_schema(Method::POST, "/pets", schema);

        ctx.reset(HostRequest::new(Method::POST, "/pets").body(r#"{"name":"Rex"}"#), "/pets", None, None);
        ctx.json().await.unwrap();
        assert_eq!(ctx.validate().unwrap(), json!({"name": "Rex"}));

        ctx.reset(HostRequest::new(Method::POST, "/pets").body("{}"), "/pets", None, None);
        ctx.json().await.unwrap();
        match ctx.validate() {
            Err(JetError::Validation(err)) => assert!(err.has_field("name")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_without_body_uses_empty_object() {
        let schema = Schema::new().field("q", FieldSchema::new(FieldType::String).optional());
        let mut ctx = with_schema(Method::GET, "/pets/search", schema);
        ctx.reset(HostRequest::new(Method::GET, "/pets/search"), "/pets/search", None, None);
        assert_eq!(ctx.validate().unwrap(), json!({}));
    }

    #[test]
    fn test_validate_missing_schema() {
        let mut ctx = context(RuntimeKind::Fetch);
        ctx.reset(HostRequest::new(Method::GET, "/pets"), "/pets", None, None);
        assert!(matches!(ctx.validate(), Err(JetError::MissingSchema { .. })));
    }

    #[test]
    fn test_offload_returns_normally() {
        let delivered: Arc<Mutex<Option<String>>> = Arc::default();
        let sink = delivered.clone();
        let mut ctx = context(RuntimeKind::Fetch);
        ctx.reset(HostRequest::new(Method::GET, "/"), "/", None, None);
        ctx.set_offload(move |response| {
            *sink.lock().unwrap() = response.get_header("content-type").map(str::to_string);
        });

        assert!(ctx.send(json!({"ok": true})).is_ok());
        assert!(ctx.is_offloaded());
        assert_eq!(delivered.lock().unwrap().as_deref(), Some(APPLICATION_JSON));

        let mut receiver = ctx.take_deferred().unwrap();
        let response = receiver.try_recv().unwrap();
        assert_eq!(response.get_header("content-type"), Some(APPLICATION_JSON));
    }

    #[tokio::test]
    async fn test_defer_carries_staged_state() {
        let mut ctx = context(RuntimeKind::Fetch);
        ctx.reset(HostRequest::new(Method::GET, "/"), "/", None, None);
        ctx.code = 201;
        ctx.set("X-Request", "42");
        let mut responder = ctx.defer();
        assert!(ctx.eject::<()>().is_err());

        let receiver = ctx.take_deferred().unwrap();
        tokio::spawn(async move {
            let _ = responder.send("later");
        });
        let response = receiver.await.unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.get_header("X-Request"), Some("42"));
        assert_eq!(response.text_body().as_deref(), Some("later"));
    }

    #[test]
    fn test_app_extensions_are_shared() {
        let app = Arc::new(Extensions::new().with("ping", |_| Ok(json!("pong"))));
        let shared = Shared::new(
            Capabilities::of(RuntimeKind::Fetch).host_io(1024),
            app,
            Arc::new(RouteTable::new()),
        );
        let ctx = Context::new(shared);
        assert_eq!(ctx.app().call("ping", Value::Null).unwrap(), json!("pong"));
    }
}
