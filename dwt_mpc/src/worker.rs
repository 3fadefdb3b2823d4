use std::sync::Arc;

use futures::channel::oneshot;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::error;

use crate::Error;

/// Fixed-size pool for CPU-bound protocol steps.
///
/// Closures run outside the async runtime; the caller awaits the result
/// through a oneshot channel, so the event loop keeps driving I/O meanwhile.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    pool: Arc<ThreadPool>,
}

impl WorkerPool {
    /// Pool with `threads` workers (at least one).
    pub fn new(threads: usize) -> Result<Self, Error> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("dwt-worker-{i}"))
            .panic_handler(|_| error!("worker task panicked"))
            .build()
            .map_err(|e| Error::Parameters(format!("cannot start worker pool: {e}")))?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `closure` on the pool and await its result.
    pub async fn run<F, T>(&self, closure: F) -> Result<T, Error>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        self.pool.spawn(move || {
            _ = sender.send(closure());
        });
        Ok(receiver.await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run() {
        let pool = WorkerPool::new(2).unwrap();
        assert_eq!(pool.threads(), 2);
        let sum = pool.run(|| (0..100u32).sum::<u32>()).await.unwrap();
        assert_eq!(sum, 4950);
    }

    #[tokio::test]
    async fn test_panicking_task_reports_cancel() {
        let pool = WorkerPool::new(1).unwrap();
        let result = pool.run(|| -> u32 { panic!("boom") }).await;
        assert!(matches!(result, Err(Error::WorkerCanceled(_))));
    }
}
