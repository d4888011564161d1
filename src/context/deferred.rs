//! Responders that outlive the handler.

use super::respond::{Reply, Respond, Staging};
use crate::http::StagedResponse;
use crate::runtime::HostIo;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

/// Finalizes a request after its handler ejected.
///
/// Obtained from [`Context::defer`](crate::Context::defer). The first
/// finalization delivers the response to the host; later ones are no-ops
/// that return `Ok(())`. Dropping a `Deferred` without finalizing abandons
/// the request.
#[derive(Debug)]
pub struct Deferred {
    code: u16,
    reply: Reply,
    io: Arc<dyn HostIo>,
}

impl Deferred {
    pub(crate) fn new(
        code: u16,
        headers: HashMap<String, String>,
        io: Arc<dyn HostIo>,
        sender: oneshot::Sender<StagedResponse>,
    ) -> Self {
        let mut reply = Reply::with_headers(headers);
        reply.arm(Box::new(move |response| {
            if sender.send(response).is_err() {
                debug!("Deferred response dropped; request already gone");
            }
        }));
        Self { code, reply, io }
    }

    /// Status code that will be sent.
    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn set_code(&mut self, code: u16) {
        self.code = code;
    }

    pub fn is_finalized(&self) -> bool {
        self.reply.is_finalized()
    }
}

impl Respond for Deferred {
    fn staging(&mut self) -> Staging<'_> {
        Staging {
            code: &mut self.code,
            reply: &mut self.reply,
            io: self.io.as_ref(),
        }
    }
}
