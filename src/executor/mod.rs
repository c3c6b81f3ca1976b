//! The executor (§4.5): a linearized program of `ExecuteOp`/`SyncNodes`
//! steps run by a fixed pool of OS threads, coordinated by an atomic
//! step counter and a spin barrier instead of a mutex — the same shape
//! as the source engine's thread pool, so the hot path never blocks on
//! a lock.

use crate::device::{DeviceSegment, ExecutionBuffers};
use crate::sync::NodeSynchronizer;
use crate::utils::error::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One step of a node's linearized forward program (§4.5).
pub enum Step {
    ExecuteOp { segment_index: usize, op_index: usize },
    SyncNodes { segment_index: usize },
}

struct SharedState {
    steps: Vec<Step>,
    segments: Vec<Box<dyn DeviceSegment>>,
    buffers: ExecutionBuffers,
    synchronizer: Box<dyn NodeSynchronizer>,
    current_step: AtomicUsize,
    done_threads: AtomicUsize,
    n_threads: usize,
    batch_size: usize,
}

/// Runs a node's forward program on `n_threads` worker threads with a
/// deterministic, allocation-free hot path (§4.5, §8 "output is
/// independent of thread/node count").
pub struct Executor {
    state: Arc<SharedState>,
}

impl Executor {
    pub fn new(
        steps: Vec<Step>,
        segments: Vec<Box<dyn DeviceSegment>>,
        buffers: ExecutionBuffers,
        synchronizer: Box<dyn NodeSynchronizer>,
        n_threads: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            state: Arc::new(SharedState {
                steps,
                segments,
                buffers,
                synchronizer,
                current_step: AtomicUsize::new(0),
                done_threads: AtomicUsize::new(0),
                n_threads,
                batch_size,
            }),
        }
    }

    /// The pipe/buffer storage this executor's steps read and write.
    /// The root/worker run loops need this to seed the position/token
    /// pipes and read back logits outside of `forward()` itself.
    pub fn buffers(&self) -> &ExecutionBuffers {
        &self.state.buffers
    }

    /// Run every step of the program once, synchronously. Spawns
    /// `n_threads - 1` helper threads and runs thread 0 on the calling
    /// thread so the caller can propagate the first error it observes.
    pub fn forward(&self) -> Result<()> {
        let n_threads = self.state.n_threads;
        self.state.current_step.store(0, Ordering::SeqCst);
        self.state.done_threads.store(0, Ordering::SeqCst);

        std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(n_threads - 1);
            for t in 1..n_threads {
                let state = Arc::clone(&self.state);
                handles.push(scope.spawn(move || run_thread(&state, t)));
            }
            let first_result = run_thread(&self.state, 0);
            for h in handles {
                let _ = h.join();
            }
            first_result
        })
    }
}

/// Spin-wait for every thread to finish the current step before any
/// thread advances to the next one (§4.5's atomic barrier, no mutex).
fn run_thread(state: &SharedState, thread_index: usize) -> Result<()> {
    let n_threads = state.n_threads;
    loop {
        let step_index = state.current_step.load(Ordering::Acquire);
        if step_index >= state.steps.len() {
            return Ok(());
        }

        let result = execute_step(state, step_index, thread_index);

        let done = state.done_threads.fetch_add(1, Ordering::AcqRel) + 1;
        if done == n_threads {
            state.done_threads.store(0, Ordering::Release);
            state.current_step.store(step_index + 1, Ordering::Release);
        } else {
            while state.current_step.load(Ordering::Acquire) == step_index {
                std::hint::spin_loop();
            }
        }

        result?;
    }
}

fn execute_step(state: &SharedState, step_index: usize, thread_index: usize) -> Result<()> {
    match &state.steps[step_index] {
        Step::ExecuteOp { segment_index, op_index } => {
            state.segments[*segment_index].forward(*op_index, state.n_threads, thread_index, state.batch_size, &state.buffers)
        }
        Step::SyncNodes { segment_index } => state.synchronizer.sync(*segment_index, state.n_threads, thread_index, &state.buffers),
    }
}
