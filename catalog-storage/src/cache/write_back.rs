//! Supervised background cache writes.
//!
//! Write-backs run detached from the request that triggered them, but are
//! never orphaned: every task is owned by a [`WriteBackTasks`] group that can
//! be flushed or drained on shutdown.
//!
//! The group also tracks an invalidation generation per cache key. A reader
//! takes a [`Generation`] before it starts producing a record, and the
//! write-back for that record only lands if no invalidation of the key
//! happened in between.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use catalog_core::CatalogResult;
use tokio::task::JoinSet;

use super::key::CacheKey;
use super::traits::CacheStore;

/// Invalidation count of one key, observed at some point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Generation(u64);

/// Task group owning in-flight cache write-backs.
///
/// Cloning yields another handle to the same group.
#[derive(Debug, Clone, Default)]
pub struct WriteBackTasks {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    tasks: Mutex<JoinSet<()>>,
    /// Tasks taken out of `tasks` by a flush and not yet joined.
    flushing: AtomicUsize,
    /// Only written while `tasks` is locked.
    closed: AtomicBool,
    generations: Mutex<HashMap<CacheKey, u64>>,
}

impl WriteBackTasks {
    pub fn new() -> Self {
        Self::default()
    }

    fn tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn generations(&self) -> MutexGuard<'_, HashMap<CacheKey, u64>> {
        self.inner
            .generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn a write-back onto the current runtime.
    ///
    /// Returns `false` (and drops `task`) once the group has been drained.
    pub fn spawn<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks();
        if self.is_closed() {
            tracing::debug!("Write-back group closed, dropping write");
            return false;
        }
        // Reap finished tasks so the set does not grow without bound.
        while let Some(result) = tasks.try_join_next() {
            log_join(result);
        }
        tasks.spawn(task);
        true
    }

    /// Number of write-backs not yet reaped, including those a flush is
    /// currently waiting on.
    pub fn in_flight(&self) -> usize {
        let tasks = self.tasks();
        tasks.len() + self.inner.flushing.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Current invalidation generation of `key`.
    pub fn generation(&self, key: &CacheKey) -> Generation {
        Generation(self.generations().get(key).copied().unwrap_or(0))
    }

    /// Record an invalidation of `key`.
    ///
    /// Write-backs of records produced before this call are discarded. Call
    /// it before deleting the key from the store.
    pub fn invalidated(&self, key: &CacheKey) -> Generation {
        let mut generations = self.generations();
        let current = generations.entry(*key).or_insert(0);
        *current += 1;
        Generation(*current)
    }

    pub fn is_current(&self, key: &CacheKey, seen: Generation) -> bool {
        self.generation(key) == seen
    }

    /// Write `bytes` under `key` unless the key was invalidated after `seen`
    /// was taken.
    ///
    /// An invalidation that races the write itself is caught by checking
    /// again afterwards and removing the record. Returns whether the record
    /// was left in the store.
    pub async fn store_if_current(
        &self,
        store: &dyn CacheStore,
        key: &CacheKey,
        bytes: &[u8],
        ttl: Duration,
        seen: Generation,
    ) -> CatalogResult<bool> {
        if !self.is_current(key, seen) {
            tracing::debug!(key = %key, "Record invalidated while assembling, skipping write-back");
            return Ok(false);
        }
        store.set(key, bytes, ttl).await?;
        if self.is_current(key, seen) {
            return Ok(true);
        }
        tracing::debug!(key = %key, "Record invalidated during write-back, removing it");
        store.delete(key).await?;
        Ok(false)
    }

    /// Wait for every write-back spawned so far, including ones spawned
    /// while waiting. Returns how many completed.
    pub async fn flush(&self) -> usize {
        let mut completed = 0;
        loop {
            let (mut batch, mut held) = {
                let mut tasks = self.tasks();
                let held = Held::new(&self.inner.flushing, tasks.len());
                (std::mem::take(&mut *tasks), held)
            };
            if batch.is_empty() {
                return completed;
            }
            while let Some(result) = batch.join_next().await {
                held.release_one();
                log_join(result);
                completed += 1;
            }
        }
    }

    /// Close the group to new writes and wait for the in-flight ones.
    pub async fn drain(&self) -> usize {
        {
            let _tasks = self.tasks();
            self.inner.closed.store(true, Ordering::Release);
        }
        let completed = self.flush().await;
        tracing::debug!(completed, "Write-back group drained");
        completed
    }
}

/// Share of the `flushing` count owned by one flush batch. Whatever is left
/// is given back on drop, so a cancelled flush does not skew `in_flight`.
struct Held<'a> {
    count: &'a AtomicUsize,
    remaining: usize,
}

impl<'a> Held<'a> {
    fn new(count: &'a AtomicUsize, n: usize) -> Self {
        count.fetch_add(n, Ordering::AcqRel);
        Self { count, remaining: n }
    }

    fn release_one(&mut self) {
        if self.remaining > 0 {
            self.remaining -= 1;
            self.count.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl Drop for Held<'_> {
    fn drop(&mut self) {
        self.count.fetch_sub(self.remaining, Ordering::AcqRel);
    }
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        tracing::warn!(error = %e, "Cache write-back task did not complete");
    }
}
