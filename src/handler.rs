//! Route handlers and the host error hook.

use crate::context::Context;
use crate::error::JetError;
use crate::signal::Flow;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Future returned by closure handlers.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Flow> + Send + 'a>>;

/// A route handler.
///
/// Handlers read the request through the context and finalize the response
/// with its `Respond` methods, propagating the returned [`Flow`] with `?`.
/// Returning `Ok(())` without finalizing sends the staged status and headers
/// with an empty body.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, ctx: &mut Context) -> Flow;
}

/// Handler backed by a closure. Build one with [`handler`].
pub struct FnHandler<F> {
    f: F,
}

/// Wrap a closure as a [`Handler`].
///
/// ```rust
/// use jetpath::prelude::*;
///
/// let hello = handler(|ctx| Box::pin(async move { ctx.send("hello world") }));
/// # let _ = hello;
/// ```
pub fn handler<F>(f: F) -> FnHandler<F>
where
    F: for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync,
{
    FnHandler { f }
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut Context) -> HandlerFuture<'a> + Send + Sync,
{
    async fn call(&self, ctx: &mut Context) -> Flow {
        (self.f)(ctx).await
    }
}

/// Called with the context and the error when a handler fails. Expected to
/// finalize the response, usually through `throw`.
pub type ErrorHook = Arc<dyn Fn(&mut Context, &JetError) -> Flow + Send + Sync>;
