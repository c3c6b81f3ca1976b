//! Device abstraction (§4.3): a `Device` builds `DeviceSegment`s, each
//! of which can load a weight slab and run one op of the segment's
//! program on a thread's `[nThreads, threadIndex)` slice.
//!
//! Pipes and buffers are allocated once per node and handed to every
//! segment's `forward` call as an `ExecutionBuffers` view rather than
//! owned by the segment, mirroring the source engine's single
//! `NnNetExecution` pipe table shared by every device segment.

pub mod cpu;

use crate::graph::OpConfig;
use crate::utils::error::Result;
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::cell::UnsafeCell;

/// A 64-byte-aligned byte buffer (§4.3, §4.9 "weight buffers are
/// aligned for the widest SIMD tier a future backend might add").
pub struct RawBuf {
    ptr: *mut u8,
    len: usize,
    layout: Layout,
}

unsafe impl Send for RawBuf {}
unsafe impl Sync for RawBuf {}

impl RawBuf {
    pub fn new(len: usize) -> Self {
        let alloc_len = len.max(1);
        let layout = Layout::from_size_align(alloc_len, 64).expect("valid layout");
        let ptr = unsafe { alloc_zeroed(layout) };
        assert!(!ptr.is_null(), "allocation failed");
        Self { ptr, len, layout }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    pub fn as_bytes_mut(&self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    pub fn as_f32(&self) -> &[f32] {
        let n = self.len / 4;
        unsafe { std::slice::from_raw_parts(self.ptr as *const f32, n) }
    }

    pub fn as_f32_mut(&self) -> &mut [f32] {
        let n = self.len / 4;
        unsafe { std::slice::from_raw_parts_mut(self.ptr as *mut f32, n) }
    }

    pub fn as_q80(&self) -> &[crate::quant::BlockQ80] {
        let n = self.len / std::mem::size_of::<crate::quant::BlockQ80>();
        unsafe { std::slice::from_raw_parts(self.ptr as *const crate::quant::BlockQ80, n) }
    }

    pub fn as_q80_mut(&self) -> &mut [crate::quant::BlockQ80] {
        let n = self.len / std::mem::size_of::<crate::quant::BlockQ80>();
        unsafe { std::slice::from_raw_parts_mut(self.ptr as *mut crate::quant::BlockQ80, n) }
    }

    pub fn as_q40(&self) -> &[crate::quant::BlockQ40] {
        let n = self.len / std::mem::size_of::<crate::quant::BlockQ40>();
        unsafe { std::slice::from_raw_parts(self.ptr as *const crate::quant::BlockQ40, n) }
    }
}

impl Drop for RawBuf {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr, self.layout) };
    }
}

/// Best-effort page lock for a weight slab so it can't be paged out
/// mid-inference (§4.9). Failures are not fatal: some hosts (containers
/// without `CAP_IPC_LOCK`, non-Linux targets) simply can't grant this.
pub fn try_mlock(buf: &RawBuf) {
    #[cfg(unix)]
    unsafe {
        let _ = libc::mlock(buf.as_bytes().as_ptr() as *const libc::c_void, buf.len());
    }
}

/// The pipes (network-visible) and this node's buffers (local), shared
/// read/write by every segment and every thread. Aliasing across
/// threads within one op is safe because `kernel::split_range` hands
/// each thread a disjoint row range, and the executor's step barrier
/// (§4.5) guarantees no two ops touching the same pipe/buffer run
/// concurrently.
pub struct ExecutionBuffers {
    pipes: Vec<UnsafeCell<RawBuf>>,
    buffers: Vec<UnsafeCell<RawBuf>>,
}

unsafe impl Sync for ExecutionBuffers {}

impl ExecutionBuffers {
    pub fn new(pipe_sizes: &[usize], buffer_sizes: &[usize]) -> Self {
        Self {
            pipes: pipe_sizes.iter().map(|&n| UnsafeCell::new(RawBuf::new(n))).collect(),
            buffers: buffer_sizes.iter().map(|&n| UnsafeCell::new(RawBuf::new(n))).collect(),
        }
    }

    pub fn pipe(&self, index: usize) -> &RawBuf {
        unsafe { &*self.pipes[index].get() }
    }

    pub fn buffer(&self, index: usize) -> &RawBuf {
        unsafe { &*self.buffers[index].get() }
    }

    pub fn resolve(&self, pointer: &crate::graph::PointerConfig) -> &RawBuf {
        match pointer.source {
            crate::graph::PointerSource::Pipe => self.pipe(pointer.index),
            crate::graph::PointerSource::Buffer => self.buffer(pointer.index),
        }
    }
}

/// One segment's compiled, weight-loaded state on a device (§4.3).
pub trait DeviceSegment: Send + Sync {
    /// Copy `nBytes` of `weight` into this segment's slab for op
    /// `op_index`, starting at byte `offset` (§4.9 streamed loading).
    fn load_weight(&mut self, op_index: usize, offset: usize, weight: &[u8]) -> Result<()>;

    /// Run op `op_index` of this segment's program over
    /// `[nThreads, threadIndex)`'s slice of `batch_size` rows, reading
    /// and writing through `ctx`.
    fn forward(&self, op_index: usize, n_threads: usize, thread_index: usize, batch_size: usize, ctx: &ExecutionBuffers) -> Result<()>;
}

/// A compute backend capable of building `DeviceSegment`s for a node's
/// program (§4.3). The spec names CPU as the only backend in scope;
/// the trait boundary is where a GPU backend would plug in later.
pub trait Device: Send + Sync {
    fn max_n_threads(&self) -> usize;
    fn create_segment(&self, ops: Vec<OpConfig>) -> Box<dyn DeviceSegment>;
}
