//! # Jetpath - Per-request Context Runtime
//!
//! Jetpath runs HTTP handlers against a pooled, per-request [`Context`].
//! A handler reads the request through the context and finalizes the
//! response exactly once, whether it answers inline, later through a
//! [`Deferred`] responder, or with a streamed file.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                    JetServer (hyper HTTP/1)                         │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                   │
//!                                   ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                           Dispatcher                                │
//! │  ┌────────────┐  ┌─────────────┐  ┌───────────┐  ┌──────────────┐   │
//! │  │ RouteTable │  │ ContextPool │  │  HostIo   │  │  Extensions  │   │
//! │  │  + Schema  │  │  (reset)    │  │ Fetch/Str │  │  (plugins)   │   │
//! │  └────────────┘  └─────────────┘  └───────────┘  └──────────────┘   │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use jetpath::prelude::*;
//!
//! fn hello(ctx: &mut Context) -> HandlerFuture<'_> {
//!     Box::pin(async move {
//!         let name = ctx.query("name").unwrap_or("world").to_string();
//!         ctx.send(format!("hello {}", name))
//!     })
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), JetError> {
//!     JetServer::with_defaults()
//!         .route(Method::GET, "/", handler(hello))
//!         .run()
//!         .await
//! }
//! ```
//!
//! ## Finalization
//!
//! `send`, `send_as`, `redirect`, `throw` and `send_stream` stage the
//! response and return `Err(Interrupt::DONE)`, so `?` stops the handler from
//! any helper depth. A second finalization never overwrites the first.
//! `eject` leaves the response to a [`Deferred`] responder obtained from
//! [`Context::defer`]; without one the request is abandoned and nothing is
//! written.
//!
//! ## Host I/O
//!
//! Headers, bodies and file streams go through a [`HostIo`](runtime::HostIo)
//! chosen once per process: the promise-style `fetch` model or the
//! event-stream `stream` model. Set `JETPATH_RUNTIME` or
//! [`JetConfig::runtime`] to pick one.

pub mod context;
pub mod error;
pub mod handler;
pub mod http;
pub mod log;
pub mod plugin;
pub mod router;
pub mod runtime;
pub mod signal;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::context::{Context, Deferred, Fault, Respond, StreamSource};
    pub use crate::error::{JetError, JetResult};
    pub use crate::handler::{handler, Handler, HandlerFuture};
    pub use crate::http::{HostRequest, ResponseStream, StagedResponse};
    pub use crate::log::Log;
    pub use crate::plugin::{Extensions, Plugin, PluginInit};
    pub use crate::router::{FieldSchema, FieldType, Schema};
    pub use crate::runtime::{JetConfig, JetServer, RuntimeKind};
    pub use crate::signal::{Flow, Interrupt, Signal};
    pub use async_trait::async_trait;
    pub use hyper::Method;
}

// Re-export for convenience
pub use context::{Context, Deferred, Fault, Respond};
pub use error::{JetError, JetResult};
pub use handler::{handler, Handler};
pub use plugin::{Extensions, Plugin};
pub use runtime::{Dispatcher, JetConfig, JetServer};
pub use signal::{Flow, Interrupt, Signal};
