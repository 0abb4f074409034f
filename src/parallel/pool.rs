use crate::error::{EngineError, Result};
use crossbeam::channel::{
    Receiver, RecvTimeoutError, Sender, TrySendError, bounded, unbounded,
};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of named worker threads fed through a crossbeam channel
///
/// Jobs are executed in submission order by whichever worker is free. A job
/// that panics is reported through its [`TaskHandle`]; the worker survives.
/// Dropping the pool closes the queue. Idle workers exit once the queue is
/// drained; a worker stuck in a job is detached rather than joined.
pub struct WorkerPool {
    workers: usize,
    job_tx: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` threads. `queue_capacity == 0` means an unbounded queue;
    /// otherwise submissions beyond the capacity are rejected.
    pub fn new(workers: usize, queue_capacity: usize) -> Result<Self> {
        if workers == 0 {
            return Err(EngineError::InvalidInput(
                "worker pool needs at least one worker".to_string(),
            ));
        }

        let (job_tx, job_rx): (Sender<Job>, Receiver<Job>) = if queue_capacity > 0 {
            bounded(queue_capacity)
        } else {
            unbounded()
        };

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let job_rx = job_rx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("splitfold-worker-{worker_id}"))
                .spawn(move || Self::worker_thread(worker_id, job_rx))
                .map_err(|e| EngineError::Rejected(format!("failed to spawn worker: {e}")))?;
            handles.push(handle);
        }

        tracing::trace!("Started worker pool with {} workers", workers);
        Ok(Self {
            workers,
            job_tx: Some(job_tx),
            handles,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Queue a job and return a handle for its result
    pub fn submit<T, F>(&self, job: F) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let job_tx = self
            .job_tx
            .as_ref()
            .ok_or_else(|| EngineError::Rejected("worker pool is shut down".to_string()))?;

        let (result_tx, result_rx) = bounded(1);
        let started = Arc::new(OnceLock::new());
        let job_started = started.clone();
        let wrapped: Job = Box::new(move || {
            let _ = job_started.set(Instant::now());
            let result = catch_unwind(AssertUnwindSafe(job))
                .unwrap_or_else(|payload| Err(EngineError::from_panic(payload)));
            // The handle may already be gone; nobody is waiting then.
            let _ = result_tx.send(result);
        });

        match job_tx.try_send(wrapped) {
            Ok(()) => Ok(TaskHandle { result_rx, started }),
            Err(TrySendError::Full(_)) => Err(EngineError::Rejected(
                "worker queue is full".to_string(),
            )),
            Err(TrySendError::Disconnected(_)) => Err(EngineError::Rejected(
                "worker pool is shut down".to_string(),
            )),
        }
    }

    fn worker_thread(worker_id: usize, job_rx: Receiver<Job>) {
        while let Ok(job) = job_rx.recv() {
            job();
        }
        tracing::trace!("Worker {} exiting", worker_id);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the sender lets every worker drain the queue and exit.
        self.job_tx.take();
        for handle in self.handles.drain(..) {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
        tracing::trace!("Worker pool with {} workers shut down", self.workers);
    }
}

/// Receiving end of a submitted job
pub struct TaskHandle<T> {
    result_rx: Receiver<Result<T>>,
    started: Arc<OnceLock<Instant>>,
}

impl<T> TaskHandle<T> {
    /// Block until the job reports
    pub fn wait(&self) -> Result<T> {
        self.result_rx.recv().unwrap_or_else(|_| {
            Err(EngineError::Panicked(
                "worker exited before reporting".to_string(),
            ))
        })
    }

    /// When a worker picked the job up, if it has
    pub fn started_at(&self) -> Option<Instant> {
        self.started.get().copied()
    }

    /// Block until the job has run for at most `limit`
    ///
    /// The deadline counts from the moment a worker starts the job; time
    /// spent queued behind other jobs does not count against it.
    pub fn wait_timeout(&self, limit: Duration) -> Result<T> {
        loop {
            let received = match self.started_at() {
                Some(start) => self.result_rx.recv_deadline(start + limit),
                None => self.result_rx.recv_timeout(limit),
            };

            match received {
                Ok(result) => return result,
                Err(RecvTimeoutError::Timeout) if self.started_at().is_none() => continue,
                Err(RecvTimeoutError::Timeout) => {
                    // Started during the last wait; check its own deadline
                    if let Some(start) = self.started_at()
                        && start.elapsed() < limit
                    {
                        continue;
                    }
                    return Err(EngineError::Timeout(limit));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(EngineError::Panicked(
                        "worker exited before reporting".to_string(),
                    ));
                }
            }
        }
    }
}
