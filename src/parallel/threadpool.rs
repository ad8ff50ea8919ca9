//! Bounded worker pool backing the parallel encoder and decoder pipelines.
//!
//! Generalizes the `TPool` pattern (a `rayon::ThreadPool` plus a bounded
//! channel used purely as a counting semaphore) to jobs that can fail: each
//! submitted closure returns a [`Result`], and [`BoundedPool::join`] surfaces
//! the first error any job produced.

use crossbeam_channel::{bounded, Receiver, Sender};
use rayon::ThreadPool as RayonPool;
use std::sync::{Arc, Condvar, Mutex};

use crate::error::{RagzipError, Result};

type JobFn = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

struct PoolState {
    pending: usize,
    first_error: Option<RagzipError>,
}

/// Fixed-size thread pool with a bounded in-flight job count. The bound is
/// the back-pressure mechanism behind `maxBufferedPages` in the parallel
/// encoder and decoder (spec.md §4.7, §4.8): a submitter blocks once that
/// many jobs are queued or running, rather than buffering unboundedly.
pub struct BoundedPool {
    pool: Arc<RayonPool>,
    slot_tx: Sender<()>,
    slot_rx: Receiver<()>,
    state: Arc<(Mutex<PoolState>, Condvar)>,
}

impl BoundedPool {
    pub fn new(nb_threads: usize, queue_size: usize) -> Result<Self> {
        let nb_threads = nb_threads.max(1);
        let queue_size = queue_size.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(nb_threads)
            .build()
            .map_err(|e| RagzipError::concurrency("failed to start worker pool", RagzipError::format(e.to_string())))?;

        // Total slots = queue_size + nb_threads, pre-filled so that
        // `slot_rx.recv()` acts as "wait for a free slot".
        let capacity = queue_size + nb_threads;
        let (slot_tx, slot_rx) = bounded(capacity);
        for _ in 0..capacity {
            slot_tx.send(()).expect("freshly created channel cannot be full");
        }

        let state = Arc::new((Mutex::new(PoolState { pending: 0, first_error: None }), Condvar::new()));

        Ok(BoundedPool { pool: Arc::new(pool), slot_tx, slot_rx, state })
    }

    /// Blocks until a slot is free, then spawns `job` on the pool. A job's
    /// error is recorded (first one wins) but does not cancel jobs already
    /// in flight; callers observe it through [`join`](Self::join).
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.slot_rx.recv().expect("pool slot channel closed");
        {
            let (lock, _cvar) = &*self.state;
            let mut s = lock.lock().unwrap();
            s.pending += 1;
        }

        let state = Arc::clone(&self.state);
        let slot_tx = self.slot_tx.clone();
        self.pool.spawn(move || {
            let result = job();
            let (lock, cvar) = &*state;
            let mut s = lock.lock().unwrap();
            if let Err(e) = result {
                if s.first_error.is_none() {
                    s.first_error = Some(e);
                }
            }
            s.pending -= 1;
            if s.pending == 0 {
                cvar.notify_all();
            }
            let _ = slot_tx.send(());
        });
    }

    /// Waits for all submitted jobs to finish and returns the first error
    /// any of them produced, wrapped as [`RagzipError::Concurrency`]. Safe
    /// to call more than once; the pool remains usable afterward.
    pub fn join(&self) -> Result<()> {
        let (lock, cvar) = &*self.state;
        let mut s = lock.lock().unwrap();
        while s.pending > 0 {
            s = cvar.wait(s).unwrap();
        }
        match s.first_error.take() {
            Some(e) => Err(RagzipError::concurrency("a worker pool job failed", e)),
            None => Ok(()),
        }
    }
}
