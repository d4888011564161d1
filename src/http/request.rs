//! The raw host request handle a context is bound to.

use crate::error::JetError;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Method, Request, Uri};
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// Body type carried by a [`HostRequest`].
pub type RequestBody = BoxBody<Bytes, JetError>;

/// Incoming request as seen by the runtime.
///
/// The body is read at most once; after a host I/O implementation takes it,
/// further reads fail with [`JetError::BodyConsumed`].
pub struct HostRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Option<RequestBody>,
    /// Lower-cased header object, built on first use by the stream runtime.
    header_object: OnceLock<HashMap<String, String>>,
}

impl HostRequest {
    /// Create a request with an empty body.
    pub fn new(method: Method, uri: &str) -> Self {
        Self {
            method,
            uri: Uri::try_from(uri).unwrap_or_default(),
            headers: HeaderMap::new(),
            body: Some(Empty::new().map_err(|never| match never {}).boxed()),
            header_object: OnceLock::new(),
        }
    }

    /// Wrap any `http` request whose body yields `Bytes`.
    pub fn from_http<B>(request: Request<B>) -> Self
    where
        B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<JetError>,
    {
        let (parts, body) = request.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body: Some(body.map_err(Into::<JetError>::into).boxed()),
            header_object: OnceLock::new(),
        }
    }

    /// Wrap a request accepted by the hyper transport.
    pub fn from_hyper(request: Request<Incoming>) -> Self {
        Self::from_http(request)
    }

    /// Add a header. Invalid names or values are ignored.
    pub fn header(mut self, key: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Replace the body with a fixed payload.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(
            Full::new(body.into())
                .map_err(|never| match never {})
                .boxed(),
        );
        self
    }

    /// Replace the body with an arbitrary (possibly streaming) body.
    pub fn streaming_body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Request path without the query string.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Raw query string, if present.
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Headers as a plain object with lower-cased names. Repeated headers are
    /// joined with `", "`; values that are not visible ASCII are skipped.
    pub fn header_object(&self) -> &HashMap<String, String> {
        self.header_object.get_or_init(|| {
            let mut object: HashMap<String, String> = HashMap::new();
            for (name, value) in &self.headers {
                let Ok(value) = value.to_str() else { continue };
                object
                    .entry(name.as_str().to_string())
                    .and_modify(|existing| {
                        existing.push_str(", ");
                        existing.push_str(value);
                    })
                    .or_insert_with(|| value.to_string());
            }
            object
        })
    }

    /// Whether the body is still available to read.
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Take the body out of the request. Returns `None` once consumed.
    pub fn take_body(&mut self) -> Option<RequestBody> {
        self.body.take()
    }
}

impl fmt::Debug for HostRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostRequest")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("headers", &self.headers)
            .field("body_consumed", &self.body.is_none())
            .finish()
    }
}

impl Default for HostRequest {
    fn default() -> Self {
        Self::new(Method::GET, "/")
    }
}
