//! Reusable contexts.

use crate::context::{Context, Shared};
use crate::http::HostRequest;
use crate::router::Params;
use tokio::sync::Mutex;

/// Idle contexts kept between requests. A context is owned by exactly one
/// request between `acquire` and `release`.
#[derive(Debug)]
pub struct ContextPool {
    shared: Shared,
    idle: Mutex<Vec<Context>>,
    capacity: usize,
}

impl ContextPool {
    pub fn new(shared: Shared, capacity: usize) -> Self {
        Self {
            shared,
            idle: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Take an idle context, or build one, and reset it for `request`.
    pub async fn acquire(
        &self,
        request: HostRequest,
        path: impl Into<String>,
        params: Option<Params>,
        search: Option<Params>,
    ) -> Context {
        let idle = self.idle.lock().await.pop();
        let mut ctx = idle.unwrap_or_else(|| Context::new(self.shared.clone()));
        ctx.reset(request, path, params, search);
        ctx
    }

    /// Return a context to the pool.
    pub async fn release(&self, mut ctx: Context) {
        ctx.clear();
        let mut idle = self.idle.lock().await;
        if idle.len() < self.capacity {
            idle.push(ctx);
        }
    }

    /// Number of idle contexts.
    pub async fn idle(&self) -> usize {
        self.idle.lock().await.len()
    }
}
