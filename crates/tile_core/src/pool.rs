//! Worker abstraction: `apply_async`/`get()` over either a real thread pool
//! or an inline, synchronous executor, so the pipeline can dispatch batches
//! without caring whether they run concurrently or on the calling thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;

use crate::error::PipelineError;

/// A handle to an in-flight (or already-complete) unit of work.
pub trait Handle<T> {
    fn get(self: Box<Self>) -> Result<T, PipelineError>;
}

/// The pool capability: submit a job, get back a handle to await it.
pub trait Pool {
    fn apply_async_count(&self, job: Box<dyn FnOnce() -> Result<u64, PipelineError> + Send>) -> Box<dyn Handle<u64>>;
}

fn run_guarded(job: Box<dyn FnOnce() -> Result<u64, PipelineError> + Send>) -> Result<u64, PipelineError> {
    // The Rust analogue of `catch_keyboardinterrupt`: a panicking worker
    // becomes a normal fatal error instead of aborting the process.
    match panic::catch_unwind(AssertUnwindSafe(job)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "worker panicked with a non-string payload".to_string());
            Err(PipelineError::WorkerPanicked(message))
        }
    }
}

/// Executes jobs synchronously on the calling thread. Used when `workers == 1`.
pub struct InlinePool;

struct ReadyHandle(Result<u64, PipelineError>);

impl Handle<u64> for ReadyHandle {
    fn get(self: Box<Self>) -> Result<u64, PipelineError> {
        self.0
    }
}

impl Pool for InlinePool {
    fn apply_async_count(&self, job: Box<dyn FnOnce() -> Result<u64, PipelineError> + Send>) -> Box<dyn Handle<u64>> {
        Box::new(ReadyHandle(run_guarded(job)))
    }
}

/// Dispatches jobs onto a dedicated `rayon::ThreadPool`, delivering results
/// over a one-shot channel so callers get the blocking `get()` contract the
/// spec requires on top of rayon's data-parallel primitives.
pub struct RayonPool {
    inner: rayon::ThreadPool,
}

impl RayonPool {
    pub fn new(workers: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let inner = rayon::ThreadPoolBuilder::new().num_threads(workers.max(1)).build()?;
        Ok(Self { inner })
    }
}

struct ChannelHandle(mpsc::Receiver<Result<u64, PipelineError>>);

impl Handle<u64> for ChannelHandle {
    fn get(self: Box<Self>) -> Result<u64, PipelineError> {
        self.0
            .recv()
            .unwrap_or_else(|_| Err(PipelineError::WorkerPanicked("worker thread dropped its result".into())))
    }
}

impl Pool for RayonPool {
    fn apply_async_count(&self, job: Box<dyn FnOnce() -> Result<u64, PipelineError> + Send>) -> Box<dyn Handle<u64>> {
        let (tx, rx) = mpsc::channel();
        self.inner.spawn(move || {
            let result = run_guarded(job);
            let _ = tx.send(result);
        });
        Box::new(ChannelHandle(rx))
    }
}
