//! Worker node run loop (§2): once the handshake has loaded its shard
//! of the weights, a worker does nothing but run its executor program
//! in lockstep with the root, forever, until the root's socket closes.

use crate::executor::Executor;
use crate::transport::Network;
use crate::utils::error::{EngineError, Result};

/// Drives a worker's executor one forward step at a time. A worker
/// never samples or tokenizes — the position and input token arrive
/// on the root-synced pipes inside the executor program itself, so
/// `forward()` alone is enough to keep it in lockstep (§2, §4.8).
pub struct WorkerRunner<'a> {
    pub executor: &'a Executor,
    pub network: &'a Network,
}

impl<'a> WorkerRunner<'a> {
    /// Run forward steps until the root disconnects or a step fails.
    /// A `TransportRead`/`TransportWrite` error on the root socket after
    /// at least one successful step is treated as a normal shutdown
    /// (the root closed the connection once generation finished) rather
    /// than propagated as a crash (§9 open question, resolved).
    pub fn run(&self) -> Result<()> {
        let mut steps_run = 0u64;
        loop {
            match self.executor.forward() {
                Ok(()) => steps_run += 1,
                Err(EngineError::TransportRead(_)) | Err(EngineError::TransportWrite(_)) if steps_run > 0 => {
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Byte counters for the worker's socket, surfaced for logging
    /// (§9 metrics, ambient logging section).
    pub fn transport_stats(&self) -> (u64, u64) {
        self.network.stats()
    }
}
