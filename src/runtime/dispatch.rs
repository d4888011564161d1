//! Request dispatch: route lookup, handler invocation and settlement.

use crate::context::{Context, Respond, Shared};
use crate::error::JetError;
use crate::handler::ErrorHook;
use crate::http::{HostRequest, StagedResponse, StreamBody};
use crate::plugin::Extensions;
use crate::router::{Params, RouteTable};
use crate::runtime::{ContextPool, JetConfig, RuntimeKind};
use crate::signal::{Flow, Interrupt, Signal};
use hyper::Response;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

/// How a handler left its context.
#[derive(Debug)]
pub enum Settled {
    /// The staged response, ready to write.
    Complete(StagedResponse),
    /// The response arrives later, from a deferred responder or an armed
    /// offload.
    Deferred(oneshot::Receiver<StagedResponse>),
    /// The handler ejected and nothing will answer.
    Abandoned,
}

/// Runs one request end to end. Shared by every connection.
pub struct Dispatcher {
    routes: Arc<RouteTable>,
    pool: ContextPool,
    on_error: Option<ErrorHook>,
    global_headers: HashMap<String, String>,
    offload_timeout: Duration,
    runtime: RuntimeKind,
}

impl Dispatcher {
    pub fn new(
        config: &JetConfig,
        routes: RouteTable,
        app: Arc<Extensions>,
        on_error: Option<ErrorHook>,
    ) -> Self {
        let capabilities = config.capabilities();
        let routes = Arc::new(routes);
        let shared = Shared::new(
            capabilities.host_io(config.max_body_size),
            app,
            routes.clone(),
        );
        Self {
            routes,
            pool: ContextPool::new(shared, config.pool_size),
            on_error,
            global_headers: config.global_headers.clone(),
            offload_timeout: config.offload_timeout_duration(),
            runtime: capabilities.active(),
        }
    }

    /// Dispatcher with default configuration under `runtime`.
    pub fn with_runtime(runtime: RuntimeKind, routes: RouteTable) -> Self {
        let config = JetConfig::default().runtime(runtime);
        Self::new(&config, routes, Arc::default(), None)
    }

    pub fn runtime(&self) -> RuntimeKind {
        self.runtime
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn pool(&self) -> &ContextPool {
        &self.pool
    }

    /// Run the matching handler and report how it settled.
    pub async fn settle(&self, request: HostRequest) -> Settled {
        let method = request.method().clone();
        let path = request.path().to_string();

        let Some(found) = self.routes.find(&method, &path) else {
            debug!("No route for {} {}", method, path);
            return Settled::Complete(StagedResponse::text(404, "Not Found"));
        };

        let search = parse_query(request.query());
        let route = found.route;
        let mut ctx = self
            .pool
            .acquire(request, route.path.clone(), Some(found.params), Some(search))
            .await;

        let outcome = route.handler().call(&mut ctx).await;
        let settled = self.conclude(&mut ctx, outcome);
        self.pool.release(ctx).await;
        settled
    }

    /// Settle the request and build the transport response.
    /// `Err(JetError::Abandoned)` means nothing should be written.
    pub async fn handle(&self, request: HostRequest) -> Result<Response<StreamBody>, JetError> {
        let staged = match self.settle(request).await {
            Settled::Complete(staged) => staged,
            Settled::Deferred(receiver) => self.await_deferred(receiver).await?,
            Settled::Abandoned => return Err(JetError::Abandoned),
        };
        self.write(staged).await
    }

    async fn await_deferred(
        &self,
        receiver: oneshot::Receiver<StagedResponse>,
    ) -> Result<StagedResponse, JetError> {
        match tokio::time::timeout(self.offload_timeout, receiver).await {
            Ok(Ok(staged)) => Ok(staged),
            Ok(Err(_)) => {
                debug!("Deferred responder dropped without finalizing; abandoning request");
                Err(JetError::Abandoned)
            }
            Err(_) => {
                warn!(
                    "Deferred response not finalized within {:?}; abandoning request",
                    self.offload_timeout
                );
                Err(JetError::Abandoned)
            }
        }
    }

    async fn write(&self, staged: StagedResponse) -> Result<Response<StreamBody>, JetError> {
        match staged.into_http(&self.global_headers).await {
            Ok(response) => Ok(response),
            Err(err) => {
                let fallback = if err.kind() == io::ErrorKind::NotFound {
                    debug!("Streamed file missing: {}", err);
                    StagedResponse::text(404, "Not Found")
                } else {
                    error!("Failed to open response stream: {}", err);
                    StagedResponse::text(500, "Internal Server Error")
                };
                Ok(fallback.into_http(&self.global_headers).await?)
            }
        }
    }

    fn conclude(&self, ctx: &mut Context, outcome: Flow) -> Settled {
        match outcome {
            Ok(()) if ctx.is_ejected() => self.ejected(ctx),
            Ok(()) | Err(Interrupt::Signal(Signal::Done)) => completed(ctx),
            Err(Interrupt::Signal(Signal::Eject)) => self.ejected(ctx),
            Err(Interrupt::Error(err)) => {
                self.recover(ctx, err);
                completed(ctx)
            }
        }
    }

    fn ejected(&self, ctx: &mut Context) -> Settled {
        match ctx.take_deferred() {
            Some(receiver) => Settled::Deferred(receiver),
            None => {
                debug!("{} {} ejected without a deferred responder", ctx.method(), ctx.path());
                Settled::Abandoned
            }
        }
    }

    /// Give the error hook a chance to respond, then fall back to a response
    /// derived from the error.
    fn recover(&self, ctx: &mut Context, err: JetError) {
        if err.is_client_error() {
            debug!("{} {} rejected: {}", ctx.method(), ctx.path(), err);
        } else {
            error!("Handler for {} {} failed: {}", ctx.method(), ctx.path(), err);
        }

        if let Some(hook) = &self.on_error {
            if let Err(Interrupt::Error(hook_err)) = hook(ctx, &err) {
                error!("Error hook failed: {}", hook_err);
            }
        }

        if !ctx.is_finalized() {
            let status = err.status();
            let message = if status >= 500 {
                "Internal Server Error".to_string()
            } else {
                err.to_string()
            };
            let _ = ctx.throw((status, message));
        }
    }
}

fn completed(ctx: &mut Context) -> Settled {
    let pending = ctx.take_deferred();
    if ctx.is_offloaded() {
        return match pending {
            Some(receiver) => Settled::Deferred(receiver),
            None => Settled::Abandoned,
        };
    }
    if pending.is_some() {
        warn!(
            "{} {} returned without ejecting; discarding its deferred response",
            ctx.method(),
            ctx.path()
        );
    }
    Settled::Complete(ctx.take_response())
}

/// Query string to a map. Malformed input yields an empty map.
pub fn parse_query(query: Option<&str>) -> Params {
    let Some(query) = query.filter(|q| !q.is_empty()) else {
        return Params::new();
    };
    match serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
        Ok(pairs) => pairs.into_iter().collect(),
        Err(err) => {
            warn!("Ignoring malformed query string {:?}: {}", query, err);
            Params::new()
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.routes.len())
            .field("runtime", &self.runtime)
            .field("on_error", &self.on_error.is_some())
            .field("offload_timeout", &self.offload_timeout)
            .finish()
    }
}
