//! Host runtime: host I/O selection, configuration, context pooling,
//! dispatch and the HTTP transport.

mod capability;
mod config;
mod dispatch;
mod pool;
mod server;

pub use capability::{Capabilities, FetchIo, HostIo, RuntimeKind, StreamIo, RUNTIME_ENV};
pub use config::JetConfig;
pub use dispatch::{parse_query, Dispatcher, Settled};
pub use pool::ContextPool;
pub use server::JetServer;
