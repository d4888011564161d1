//! The finalized response descriptor handed to the host transport.

use crate::http::stream::{ResponseStream, StreamBody};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderName, HeaderValue, CONTENT_LENGTH};
use hyper::Response;
use std::collections::HashMap;
use std::io;
use tracing::warn;

/// Response payload: a buffered body or a stream.
#[derive(Debug)]
pub enum ResponseBody {
    Full(Bytes),
    Stream(ResponseStream),
}

impl Default for ResponseBody {
    fn default() -> Self {
        ResponseBody::Full(Bytes::new())
    }
}

/// Status, headers and payload staged by a context.
#[derive(Debug, Default)]
pub struct StagedResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response payload.
    pub body: ResponseBody,
}

impl StagedResponse {
    /// Create an empty response with the given status code.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: ResponseBody::default(),
        }
    }

    /// Create a `text/plain` response.
    pub fn text(status: u16, content: impl Into<String>) -> Self {
        Self::new(status)
            .header("Content-Type", "text/plain")
            .body(content.into())
    }

    /// Add a header to the response.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set a buffered body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = ResponseBody::Full(body.into());
        self
    }

    /// Look a header up ignoring ASCII case.
    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    /// The buffered body as text, if this is not a stream.
    pub fn text_body(&self) -> Option<String> {
        match &self.body {
            ResponseBody::Full(bytes) => Some(String::from_utf8_lossy(bytes).to_string()),
            ResponseBody::Stream(_) => None,
        }
    }

    /// Whether the payload is a stream.
    pub fn is_stream(&self) -> bool {
        matches!(self.body, ResponseBody::Stream(_))
    }

    /// Build the transport response. `defaults` are added for names the
    /// response did not stage itself. Streams are opened here and piped
    /// without buffering.
    pub async fn into_http(
        self,
        defaults: &HashMap<String, String>,
    ) -> io::Result<Response<StreamBody>> {
        let status = hyper::StatusCode::from_u16(self.status).unwrap_or_else(|_| {
            warn!(
                "Invalid status code {}, falling back to 500 Internal Server Error",
                self.status
            );
            hyper::StatusCode::INTERNAL_SERVER_ERROR
        });

        let (body, len) = match self.body {
            ResponseBody::Full(bytes) => (
                Full::new(bytes).map_err(|never| match never {}).boxed(),
                None,
            ),
            ResponseBody::Stream(stream) => {
                let opened = stream.open().await?;
                (opened.body, opened.len)
            }
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        let headers = response.headers_mut();
        for (name, value) in defaults.iter().chain(self.headers.iter()) {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!("Dropping invalid response header {:?}", name),
            }
        }
        if let Some(len) = len {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_into_http_staged_headers_win_over_defaults() {
        let mut defaults = HashMap::new();
        defaults.insert("X-Pet-Token".to_string(), "global".to_string());
        defaults.insert("X-Powered-By".to_string(), "jetpath".to_string());

        let staged = StagedResponse::text(201, "created").header("X-Pet-Token", "local");
        let response = staged.into_http(&defaults).await.unwrap();

        assert_eq!(response.status(), 201);
        assert_eq!(response.headers()["x-pet-token"], "local");
        assert_eq!(response.headers()["x-powered-by"], "jetpath");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"created");
    }

    #[tokio::test]
    async fn test_invalid_status_falls_back_to_500() {
        let response = StagedResponse::new(42).into_http(&HashMap::new()).await.unwrap();
        assert_eq!(response.status(), 500);
    }

    #[test]
    fn test_get_header_ignores_case() {
        let staged = StagedResponse::new(200).header("Content-Type", "text/plain");
        assert_eq!(staged.get_header("content-type"), Some("text/plain"));
        assert_eq!(staged.text_body(), Some(String::new()));
    }
}
