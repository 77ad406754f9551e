use log::debug;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("worker pool is closed")]
    Closed,
    #[error("worker job failed: {0}")]
    Join(String),
}

/// Fixed number of slots for blocking work (subprocesses, file I/O).
///
/// A slot is released only when the job itself returns. A caller that stops
/// waiting (timeout, dropped request) detaches from the job; the job keeps
/// its slot until it finishes and its result is dropped.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn run<F, T>(&self, job: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;
        debug!("Dispatching job, {} worker(s) idle", self.idle_workers());

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|e| PoolError::Join(e.to_string()))
    }
}
