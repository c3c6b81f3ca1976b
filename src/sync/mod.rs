//! Distributed synchronizer (§4.8): after a segment's ops run, the
//! pipes they touched are exchanged between nodes according to the
//! segment's declared `SyncMode`s.

use crate::device::ExecutionBuffers;
use crate::graph::SyncMode;
use crate::transport::Network;
use crate::utils::error::Result;
use std::sync::Arc;

pub trait NodeSynchronizer: Send + Sync {
    fn sync(&self, segment_index: usize, n_threads: usize, thread_index: usize, ctx: &ExecutionBuffers) -> Result<()>;
}

/// Single-node engine (`nNodes == 1`): nothing to exchange (§4.8, §9
/// "what does the synchronizer do for nNodes=1" — resolved as a no-op,
/// not a special-cased executor).
pub struct FakeSynchronizer;

impl NodeSynchronizer for FakeSynchronizer {
    fn sync(&self, _segment_index: usize, _n_threads: usize, _thread_index: usize, _ctx: &ExecutionBuffers) -> Result<()> {
        Ok(())
    }
}

/// What a segment's sync step needs to exchange one pipe (§4.8).
pub struct PipeSync {
    pub pipe_index: usize,
    pub mode: SyncMode,
}

/// Network-backed synchronizer: one per node, holding that node's
/// sockets to every other node plus the per-segment sync plan. Shares
/// ownership of the `Network` (via `Arc`) with the run loop, which
/// also needs it for byte-count logging after the executor stops
/// (§9 ambient metrics).
pub struct NetworkSynchronizer {
    network: Arc<Network>,
    node_index: usize,
    n_nodes: usize,
    segment_syncs: Vec<Vec<PipeSync>>,
}

impl NetworkSynchronizer {
    pub fn new(network: Arc<Network>, node_index: usize, n_nodes: usize, segment_syncs: Vec<Vec<PipeSync>>) -> Self {
        Self { network, node_index, n_nodes, segment_syncs }
    }
}

impl NodeSynchronizer for NetworkSynchronizer {
    fn sync(&self, segment_index: usize, _n_threads: usize, thread_index: usize, ctx: &ExecutionBuffers) -> Result<()> {
        if thread_index != 0 {
            return Ok(());
        }
        let syncs = match self.segment_syncs.get(segment_index) {
            Some(s) => s,
            None => return Ok(()),
        };
        for sync in syncs {
            let pipe = ctx.pipe(sync.pipe_index);
            match sync.mode {
                SyncMode::WithRoot => self.sync_with_root(pipe.as_bytes_mut())?,
                SyncMode::NodeSlices => self.sync_node_slices(pipe.as_bytes_mut(), true)?,
                SyncMode::NodeSlicesExceptRoot => self.sync_node_slices(pipe.as_bytes_mut(), false)?,
            }
        }
        Ok(())
    }
}

impl NetworkSynchronizer {
    /// Root broadcasts its whole pipe to every worker (§4.8 `WithRoot`).
    fn sync_with_root(&self, pipe: &mut [u8]) -> Result<()> {
        if self.node_index == 0 {
            for peer in 1..self.n_nodes {
                self.network.write(self.network.peer_socket_index(0, peer), pipe)?;
            }
        } else {
            self.network.read(crate::transport::ROOT_SOCKET_INDEX, pipe)?;
        }
        Ok(())
    }

    /// Every node's slice of the pipe ends up on every node. Sockets
    /// only connect a worker to the root (§4.7 star topology), so this
    /// routes through the root: non-root nodes send their slice and
    /// read back the full assembly in place; the root collects every
    /// worker's slice (plus its own when `include_root`) and relays the
    /// result back out (§4.8 `NodeSlices` / `NodeSlicesExceptRoot`).
    fn sync_node_slices(&self, pipe: &mut [u8], include_root: bool) -> Result<()> {
        let slice_size = pipe.len() / self.n_nodes;

        if self.node_index != 0 {
            let my_start = self.node_index * slice_size;
            let my_slice = pipe[my_start..my_start + slice_size].to_vec();
            self.network.write(crate::transport::ROOT_SOCKET_INDEX, &my_slice)?;
            if include_root {
                self.network.read(crate::transport::ROOT_SOCKET_INDEX, pipe)?;
            } else {
                self.network.read(crate::transport::ROOT_SOCKET_INDEX, &mut pipe[slice_size..])?;
            }
            return Ok(());
        }

        for worker in 1..self.n_nodes {
            let socket_index = self.network.peer_socket_index(0, worker);
            let start = worker * slice_size;
            self.network.read(socket_index, &mut pipe[start..start + slice_size])?;
        }
        let broadcast: Vec<u8> = if include_root { pipe.to_vec() } else { pipe[slice_size..].to_vec() };
        for worker in 1..self.n_nodes {
            let socket_index = self.network.peer_socket_index(0, worker);
            self.network.write(socket_index, &broadcast)?;
        }
        Ok(())
    }
}
