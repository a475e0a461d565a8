use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool is shut down")]
    Closed,
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Caps how many blocking video jobs run at once across the whole server.
#[derive(Clone)]
pub struct ProcessingPool {
    permits: Arc<Semaphore>,
}

impl ProcessingPool {
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size)),
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Waits for a free slot, then runs `job` on the blocking thread set.
    pub async fn run<F, T>(&self, job: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        });

        Ok(handle.await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_returns_job_result() {
        let pool = ProcessingPool::new(1);
        assert_eq!(pool.run(|| 21 * 2).await.unwrap(), 42);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_limits_concurrency() {
        let pool = ProcessingPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                pool.run(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_panicking_job_is_an_error() {
        let pool = ProcessingPool::new(1);
        let result = pool.run(|| panic!("boom")).await;
        assert!(matches!(result, Err(PoolError::Join(_))));
        // the permit is released even though the job panicked
        assert_eq!(pool.run(|| 1).await.unwrap(), 1);
    }
}
