//! Actor scaffolding shared by every entity service
//!
//! Each actor is a dedicated OS thread that owns its handler state and
//! drains a request channel one message at a time:
//!
//! ```text
//!   caller ──Envelope::Request{ctx, req, reply}──► mpsc ──► actor thread
//!     ▲                                                       │
//!     └───────────── oneshot reply (or timeout) ◄─────────────┘
//! ```
//!
//! Callers stop waiting after the request timeout or when their future is
//! dropped; the actor still finishes the request and drops the reply if
//! nobody is listening.

use controldb_common::{DbError, DbResult, RequestContext};
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Requests buffered per actor before callers wait on the send
pub const REQUEST_QUEUE_DEPTH: usize = 256;

/// State and request logic owned by one actor thread
pub trait Handler: Send + 'static {
    type Request: Send + 'static;
    type Response: Send + 'static;

    /// Operation and key of a request, for logs
    fn describe(req: &Self::Request) -> String;

    fn handle(&mut self, ctx: &RequestContext, req: Self::Request) -> DbResult<Self::Response>;

    /// Called on the actor thread before it exits
    fn shutdown(&mut self) {}
}

enum Envelope<Req, Resp> {
    Request {
        ctx: RequestContext,
        req: Req,
        reply: oneshot::Sender<DbResult<Resp>>,
    },
    Quit {
        ack: oneshot::Sender<()>,
    },
}

/// Caller side of an actor
pub struct ActorHandle<Req, Resp> {
    name: &'static str,
    tx: mpsc::Sender<Envelope<Req, Resp>>,
    timeout: Duration,
}

impl<Req, Resp> Clone for ActorHandle<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
            timeout: self.timeout,
        }
    }
}

impl<Req: Send + 'static, Resp: Send + 'static> ActorHandle<Req, Resp> {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Submit a request and wait for its response.
    pub async fn call(&self, ctx: &RequestContext, req: Req) -> DbResult<Resp> {
        let (reply, rx) = oneshot::channel();
        let envelope = Envelope::Request {
            ctx: ctx.clone(),
            req,
            reply,
        };

        let wait = async {
            if self.tx.send(envelope).await.is_err() {
                return Err(DbError::internal(format!("{} is stopped", self.name)));
            }
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(DbError::internal(format!(
                    "{} dropped the request",
                    self.name
                ))),
            }
        };

        if let Ok(result) = tokio::time::timeout(self.timeout, wait).await {
            result
        } else {
            warn!(
                request_id = %ctx.request_id,
                "{} request timed out after {:?}", self.name, self.timeout
            );
            Err(DbError::Timeout)
        }
    }

    /// Ask the actor to exit and wait until it has.
    pub async fn stop(&self) {
        let (ack, rx) = oneshot::channel();
        if self.tx.send(Envelope::Quit { ack }).await.is_err() {
            debug!("{} already stopped", self.name);
            return;
        }
        let _ = rx.await;
    }
}

/// Start `handler` on its own thread.
pub fn spawn<H: Handler>(
    name: &'static str,
    handler: H,
    timeout: Duration,
) -> DbResult<ActorHandle<H::Request, H::Response>> {
    let (tx, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
    thread::Builder::new()
        .name(format!("controldb-{name}"))
        .spawn(move || run(name, handler, rx))
        .map_err(|e| DbError::internal(format!("spawn {name} actor: {e}")))?;
    Ok(ActorHandle { name, tx, timeout })
}

fn run<H: Handler>(
    name: &'static str,
    mut handler: H,
    mut rx: mpsc::Receiver<Envelope<H::Request, H::Response>>,
) {
    info!("{} actor started", name);
    while let Some(envelope) = rx.blocking_recv() {
        match envelope {
            Envelope::Request { ctx, req, reply } => {
                let op = H::describe(&req);
                let result = handler.handle(&ctx, req);
                match &result {
                    Ok(_) => debug!(request_id = %ctx.request_id, "{} {} done", name, op),
                    Err(e) if e.is_expected() => {
                        info!(request_id = %ctx.request_id, "{} {}: {}", name, op, e);
                    }
                    Err(e) => {
                        error!(request_id = %ctx.request_id, "{} {} failed: {}", name, op, e);
                    }
                }
                if reply.send(result).is_err() {
                    debug!(
                        request_id = %ctx.request_id,
                        "{} {}: caller gone, response dropped", name, op
                    );
                }
            }
            Envelope::Quit { ack } => {
                handler.shutdown();
                let _ = ack.send(());
                break;
            }
        }
    }
    info!("{} actor stopped", name);
}
