//! C2 — the worker pool.
//!
//! Grounded on `original_source/src/assistant/object_pool.py`
//! (`AsyncObjectPool`): a free-list queue, a `created_count` capped at
//! `max_workers`, and a construction lock serializing process spawns —
//! held across the spawn's own await point, exactly as `acquire_nowait`
//! holds its lock across `await loop.run_in_executor(None, self._factory)`,
//! so two concurrent acquires can never both decide there's room and load
//! two workers' models at once. The lock is only ever held across that one
//! suspension (the construction itself), never across anything else.

mod handle;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub use handle::WorkerHandle;
use tokio::sync::{Notify, Mutex as AsyncMutex};

use crate::config::AssistantConfig;
use crate::error::Result;

/// Fixed-capacity pool of worker processes, constructed lazily up to
/// `max_workers`.
pub struct WorkerPool {
    max_workers: usize,
    implementation: String,
    model_path: Option<PathBuf>,
    lora_path: Option<PathBuf>,
    free: Mutex<VecDeque<WorkerHandle>>,
    created: AtomicUsize,
    construct_lock: AsyncMutex<()>,
    notify: Notify,
}

impl WorkerPool {
    pub fn new(config: &AssistantConfig) -> Self {
        Self {
            max_workers: config.max_workers.max(1),
            implementation: config.implementation.clone(),
            model_path: config.model_path.clone(),
            lora_path: config.lora_path.clone(),
            free: Mutex::new(VecDeque::new()),
            created: AtomicUsize::new(0),
            construct_lock: AsyncMutex::new(()),
            notify: Notify::new(),
        }
    }

    /// Returns a free worker without waiting, constructing a new one if
    /// capacity allows. Never blocks.
    pub async fn try_acquire(&self) -> Result<Option<WorkerHandle>> {
        if let Some(worker) = self.pop_free() {
            return Ok(Some(worker));
        }

        // Serialize construction across the spawn itself — spec.md §4.2:
        // "this mutex is never held across suspensions other than the
        // construction itself" — so two concurrent acquires can't both
        // decide there's room and load two models' worth of weights at
        // once.
        let _guard = self.construct_lock.lock().await;
        if self.created.load(Ordering::Acquire) >= self.max_workers {
            return Ok(None);
        }
        self.created.fetch_add(1, Ordering::AcqRel);

        let result =
            WorkerHandle::spawn(&self.implementation, self.model_path.as_ref(), self.lora_path.as_ref())
                .await;
        drop(_guard);

        match result {
            Ok(worker) => Ok(Some(worker)),
            Err(e) => {
                self.created.fetch_sub(1, Ordering::AcqRel);
                Err(e)
            }
        }
    }

    /// As `try_acquire`, but waits indefinitely when no worker is
    /// immediately available.
    pub async fn acquire(&self) -> Result<WorkerHandle> {
        loop {
            if let Some(worker) = self.try_acquire().await? {
                return Ok(worker);
            }
            self.notify.notified().await;
        }
    }

    /// Returns a worker to the pool. A worker whose process has died is
    /// dropped instead of recycled, freeing a construction slot so the
    /// next `acquire`/`try_acquire` spawns a replacement.
    pub async fn release(&self, mut worker: WorkerHandle) {
        if worker.is_alive() {
            self.free.lock().unwrap_or_else(|e| e.into_inner()).push_back(worker);
        } else {
            worker.kill().await;
            self.created.fetch_sub(1, Ordering::AcqRel);
        }
        self.notify.notify_one();
    }

    /// Terminates every worker process without draining in-flight
    /// generations. Called from orchestrator shutdown.
    pub async fn shutdown(&self) {
        let drained: Vec<WorkerHandle> = {
            let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
            free.drain(..).collect()
        };
        for mut worker in drained {
            worker.kill().await;
        }
    }

    /// Number of processes constructed so far (free + loaned). Exposed for
    /// the pool invariant tests.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Acquire)
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    fn pop_free(&self) -> Option<WorkerHandle> {
        self.free.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(max_workers: usize) -> AssistantConfig {
        AssistantConfig {
            max_workers,
            implementation: "mock".to_string(),
            model_path: None,
            lora_path: None,
        }
    }

    #[tokio::test]
    async fn try_acquire_never_exceeds_max_workers() {
        let pool = WorkerPool::new(&test_config(1));
        let first = pool.try_acquire().await.unwrap();
        assert!(first.is_some());
        let second = pool.try_acquire().await.unwrap();
        assert!(second.is_none(), "pool must not construct beyond max_workers");
        assert_eq!(pool.created_count(), 1);
    }

    #[tokio::test]
    async fn released_worker_is_reused_without_growing_created_count() {
        let pool = WorkerPool::new(&test_config(1));
        let worker = pool.try_acquire().await.unwrap().unwrap();
        pool.release(worker).await;
        assert_eq!(pool.created_count(), 1);
        let reused = pool.try_acquire().await.unwrap();
        assert!(reused.is_some());
        assert_eq!(pool.created_count(), 1);
    }
}
