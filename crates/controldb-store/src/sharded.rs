//! Hash-sharded fan-out
//!
//! N worker actors each own a disjoint slice of the key space. Callers hash
//! the request key and submit straight to the owning worker, so a key
//! always maps to the same worker and requests for one key stay in
//! submission order. A busy worker only holds up callers of its own shard.

use crate::actor::{self, ActorHandle, Handler};
use controldb_common::{DbError, DbResult, RequestContext};
use std::time::Duration;
use tracing::{debug, info};
use xxhash_rust::xxh64::xxh64;

/// Requests that can be routed to a shard
pub trait ShardKey {
    /// Bytes identifying the record this request targets
    fn shard_key(&self) -> Vec<u8>;
}

/// Worker index for `key` among `shards` workers
#[must_use]
pub fn shard_for(key: &[u8], shards: usize) -> usize {
    // Both operands fit in u64 and the result is below `shards`.
    #[allow(clippy::cast_possible_truncation)]
    let index = (xxh64(key, 0) % shards as u64) as usize;
    index
}

/// Caller side of a set of sharded workers
pub struct ShardedHandle<Req, Resp> {
    name: &'static str,
    workers: Vec<ActorHandle<Req, Resp>>,
}

impl<Req, Resp> Clone for ShardedHandle<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            workers: self.workers.clone(),
        }
    }
}

impl<Req, Resp> ShardedHandle<Req, Resp>
where
    Req: ShardKey + Send + 'static,
    Resp: Send + 'static,
{
    #[must_use]
    pub fn shards(&self) -> usize {
        self.workers.len()
    }

    /// Submit a request to the worker owning its key.
    pub async fn call(&self, ctx: &RequestContext, req: Req) -> DbResult<Resp> {
        let shard = shard_for(&req.shard_key(), self.workers.len());
        debug!(request_id = %ctx.request_id, "{} routing to shard {}", self.name, shard);
        self.workers[shard].call(ctx, req).await
    }

    /// Stop every worker.
    pub async fn stop(&self) {
        for worker in &self.workers {
            worker.stop().await;
        }
        info!("{} stopped", self.name);
    }
}

/// Start `shards` workers built by `make_worker`.
pub fn spawn_sharded<H, F>(
    name: &'static str,
    shards: usize,
    timeout: Duration,
    mut make_worker: F,
) -> DbResult<ShardedHandle<H::Request, H::Response>>
where
    H: Handler,
    H::Request: ShardKey,
    F: FnMut(usize) -> DbResult<H>,
{
    if shards == 0 {
        return Err(DbError::invalid_request(format!(
            "{name} needs at least one shard"
        )));
    }

    let mut workers = Vec::with_capacity(shards);
    for index in 0..shards {
        let worker = actor::spawn(name, make_worker(index)?, timeout)?;
        workers.push(worker);
    }

    info!("{} started with {} shards", name, shards);
    Ok(ShardedHandle { name, workers })
}
