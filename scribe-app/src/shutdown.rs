//! The shutdown coordinator.

use futures::future::BoxFuture;
use std::future::Future;
use tokio::sync::{Mutex, watch};

/// Coordinates the drain: long-running tasks watch
/// [`when_shutting_down`](ShutdownManager::when_shutting_down) to stop
/// themselves, and anything that must finish before process exit
/// registers through [`wait_for`](ShutdownManager::wait_for).
pub struct ShutdownManager {
    state: watch::Sender<bool>,
    pending: Mutex<Vec<BoxFuture<'static, ()>>>,
}

impl ShutdownManager {
    /// A manager with shutdown not yet initiated.
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Whether shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        *self.state.borrow()
    }

    /// Initiate shutdown. Idempotent.
    pub fn begin(&self) {
        let _ = self.state.send(true);
    }

    /// Block until shutdown is initiated.
    pub async fn when_shutting_down(&self) {
        let mut rx = self.state.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Register a future that must complete before process exit.
    pub async fn wait_for(&self, future: impl Future<Output = ()> + Send + 'static) {
        self.pending.lock().await.push(Box::pin(future));
    }

    /// Await everything registered through `wait_for`.
    pub async fn drain(&self) {
        let pending = std::mem::take(&mut *self.pending.lock().await);
        futures::future::join_all(pending).await;
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn when_shutting_down_blocks_until_begin() {
        let manager = Arc::new(ShutdownManager::new());
        assert!(!manager.is_shutting_down());
        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.when_shutting_down().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        manager.begin();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn when_shutting_down_returns_immediately_after_begin() {
        let manager = ShutdownManager::new();
        manager.begin();
        manager.begin();
        manager.when_shutting_down().await;
    }

    #[tokio::test]
    async fn drain_awaits_registered_futures() {
        let manager = ShutdownManager::new();
        let done = Arc::new(AtomicBool::new(false));
        {
            let done = done.clone();
            manager
                .wait_for(async move {
                    tokio::task::yield_now().await;
                    done.store(true, Ordering::Relaxed);
                })
                .await;
        }
        manager.drain().await;
        assert!(done.load(Ordering::Relaxed));
    }
}
