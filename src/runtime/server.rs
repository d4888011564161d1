//! Jetpath HTTP server.

use crate::context::Context;
use crate::error::JetError;
use crate::handler::{ErrorHook, Handler};
use crate::http::HostRequest;
use crate::log::Log;
use crate::plugin::{Plugin, PluginInit, PluginRegistry};
use crate::router::{Route, RouteTable, Schema};
use crate::runtime::{Dispatcher, JetConfig};
use crate::signal::Flow;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request};
use hyper_util::rt::TokioIo;
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Jetpath server.
///
/// Collects routes, plugins and the error hook, then serves HTTP/1 with one
/// pooled [`Context`] per in-flight request.
pub struct JetServer {
    /// Server configuration.
    config: JetConfig,
    routes: RouteTable,
    plugins: PluginRegistry,
    on_error: Option<ErrorHook>,
}

impl JetServer {
    /// Create a new server.
    pub fn new(config: JetConfig) -> Self {
        Self {
            config,
            routes: RouteTable::new(),
            plugins: PluginRegistry::new(),
            on_error: None,
        }
    }

    /// Create a new server with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(JetConfig::default())
    }

    pub fn config(&self) -> &JetConfig {
        &self.config
    }

    /// Register a handler for `method` and a path template.
    pub fn route(self, method: Method, path: &str, handler: impl Handler + 'static) -> Self {
        self.add_route(Route::new(method, path, handler))
    }

    /// Register a handler whose body is validated against `schema`.
    pub fn route_with_schema(
        self,
        method: Method,
        path: &str,
        schema: Schema,
        handler: impl Handler + 'static,
    ) -> Self {
        self.add_route(Route::new(method, path, handler).schema(schema))
    }

    pub fn add_route(mut self, route: Route) -> Self {
        debug!("Registered route: {} {}", route.method, route.path);
        self.routes.add(route);
        self
    }

    pub fn plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.register(plugin);
        self
    }

    /// Install the hook that answers handler errors.
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Context, &JetError) -> Flow + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Run plugin setup and build the dispatcher. The flag reports whether a
    /// plugin serves requests itself.
    pub fn prepare(self) -> Result<(Dispatcher, bool), JetError> {
        let init = PluginInit {
            runtime: self.config.capabilities().active(),
            config: self.config.clone(),
        };
        let setup = self.plugins.build(&init)?;
        info!(
            "Prepared {} routes under the {} runtime",
            self.routes.len(),
            init.runtime
        );
        let dispatcher = Dispatcher::new(&self.config, self.routes, setup.extensions, self.on_error);
        Ok((dispatcher, setup.has_server))
    }

    /// Start the HTTP server.
    pub async fn run(self) -> Result<(), JetError> {
        let addr: SocketAddr = self.config.bind_addr().parse()?;
        let (dispatcher, has_server) = self.prepare()?;
        if has_server {
            Log::info("A plugin provides its own server; default listener not started");
            return Ok(());
        }

        let listener = TcpListener::bind(addr).await?;
        Log::success(format!("Listening on http://{}", addr));

        let dispatcher = Arc::new(dispatcher);

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);

            let dispatcher = dispatcher.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let dispatcher = dispatcher.clone();
                    async move {
                        debug!(
                            "Handling request: {} {} from {}",
                            req.method(),
                            req.uri().path(),
                            remote_addr
                        );
                        dispatcher.handle(HostRequest::from_hyper(req)).await
                    }
                });

                if let Err(err) = http1::Builder::new()
                    .serve_connection(io, service)
                    .await
                {
                    if is_abandoned(&err) {
                        debug!("Closed connection from {} for an abandoned request", remote_addr);
                    } else {
                        error!("Error serving connection: {:?}", err);
                    }
                }
            });
        }
    }
}

fn is_abandoned(err: &hyper::Error) -> bool {
    err.source()
        .and_then(|source| source.downcast_ref::<JetError>())
        .is_some_and(|err| matches!(err, JetError::Abandoned))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Respond;
    use crate::handler::{handler, HandlerFuture};
    use crate::plugin::Extensions;
    use crate::runtime::RuntimeKind;
    use serde_json::{json, Value};

    fn ping(ctx: &mut Context) -> HandlerFuture<'_> {
        Box::pin(async move {
            let answer = ctx.app().call("ping", Value::Null)?;
            ctx.send(answer)
        })
    }

    #[tokio::test]
    async fn test_prepare_exposes_plugin_extensions() {
        let server = JetServer::new(JetConfig::default().runtime(RuntimeKind::Stream))
            .plugin(Plugin::new(|_, _| Ok(Extensions::new().with("ping", |_| Ok(json!("pong"))))))
            .route(Method::GET, "/ping", handler(ping));

        let (dispatcher, has_server) = server.prepare().unwrap();
        assert!(!has_server);
        assert_eq!(dispatcher.runtime(), RuntimeKind::Stream);

        let response = dispatcher
            .handle(HostRequest::new(Method::GET, "/ping"))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_plugin_with_own_server_skips_listener() {
        let server = JetServer::new(JetConfig::default().port(0))
            .plugin(Plugin::new(|_, _| Ok(Extensions::new())).with_server(true));
        assert!(server.run().await.is_ok());
    }

    #[test]
    fn test_failing_plugin_fails_prepare() {
        let server = JetServer::with_defaults().plugin(Plugin::new(|_, _| {
            Err(JetError::plugin("db", "unreachable"))
        }));
        assert!(matches!(server.prepare(), Err(JetError::Plugin { .. })));
    }
}
