//! In-memory thread store.
//!
//! Holds every thread by id so suspended runs survive between requests. A
//! suspended thread is data, not a parked task: nothing waits on it.

use std::collections::HashMap;
use taxmate_core::{Thread, ThreadError};
use tokio::sync::RwLock;
use tracing::debug;

/// Threads kept before terminal ones start being evicted.
pub const MAX_THREADS: usize = 1_000;

pub struct ThreadStore {
    threads: RwLock<HashMap<String, Thread>>,
    max_threads: usize,
}

impl Default for ThreadStore {
    fn default() -> Self {
        Self::new(MAX_THREADS)
    }
}

impl ThreadStore {
    pub fn new(max_threads: usize) -> Self {
        Self {
            threads: RwLock::new(HashMap::new()),
            max_threads,
        }
    }

    /// Insert or replace a thread.
    ///
    /// At capacity, the least recently updated terminal thread is evicted.
    /// Suspended and running threads are never evicted.
    pub async fn save(&self, thread: Thread) {
        let mut threads = self.threads.write().await;

        if !threads.contains_key(thread.id.as_str()) && threads.len() >= self.max_threads {
            let oldest = threads
                .values()
                .filter(|t| t.status.is_terminal())
                .min_by_key(|t| t.updated_at)
                .map(|t| t.id.to_string());
            if let Some(id) = oldest {
                debug!(thread_id = %id, "Evicting terminal thread");
                threads.remove(&id);
            }
        }

        threads.insert(thread.id.to_string(), thread);
    }

    pub async fn get(&self, id: &str) -> Option<Thread> {
        self.threads.read().await.get(id).cloned()
    }

    /// Mutate a thread in place under the write lock.
    ///
    /// `f` runs atomically with respect to every other store access, so two
    /// callers racing to claim the same thread cannot both succeed. If `f`
    /// fails, the stored thread is left as it was.
    pub async fn update<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Thread) -> Result<T, ThreadError>,
    ) -> Result<(T, Thread), ThreadError> {
        let mut threads = self.threads.write().await;
        let stored = threads
            .get_mut(id)
            .ok_or_else(|| ThreadError::NotFound(id.to_string()))?;

        let mut working = stored.clone();
        let value = f(&mut working)?;
        *stored = working.clone();
        Ok((value, working))
    }

    pub async fn len(&self) -> usize {
        self.threads.read().await.len()
    }
}
