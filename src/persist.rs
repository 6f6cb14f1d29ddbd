// planner/src/persist.rs

use parking_lot::Mutex;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::{
    error::{Result, StoreError},
    storage::Storage,
};

/// Called when a debounced write fails. `flush()` also returns the error.
pub type PersistErrorHook = Arc<dyn Fn(&StoreError) + Send + Sync>;

pub fn log_persist_error() -> PersistErrorHook {
    Arc::new(|e: &StoreError| error!(error = %e, "planner write failed"))
}

struct Pending<T> {
    value: Option<T>,
    timer: Option<JoinHandle<()>>,
    generation: u64,
}

struct Shared<T> {
    storage: Arc<dyn Storage>,
    key: String,
    pending: Mutex<Pending<T>>,
    // Held from taking a value until `storage.set` returns; guards the
    // generation last written. Lock order: `io` before `pending`.
    io: Mutex<u64>,
    on_error: PersistErrorHook,
}

impl<T: Serialize> Shared<T> {
    fn write(&self, value: &T) -> Result<()> {
        let text = serde_json::to_string(value)
            .map_err(|source| StoreError::Serialize { key: self.key.clone(), source })?;
        self.storage.set(&self.key, &text)?;
        debug!(key = %self.key, bytes = text.len(), "persisted");
        Ok(())
    }

    /// Takes the pending value and its generation. With `only`, nothing is
    /// taken unless that generation is still the latest.
    fn take(&self, only: Option<u64>) -> Option<(u64, T)> {
        let mut p = self.pending.lock();
        if only.is_some_and(|g| g != p.generation) { return None; }
        if only.is_some() { p.timer = None; } else if let Some(t) = p.timer.take() { t.abort(); }
        let value = p.value.take()?;
        Some((p.generation, value))
    }

    /// Takes and writes under the io lock so writes land in generation order.
    fn drain(&self, only: Option<u64>) -> Result<()> {
        let mut written = self.io.lock();
        let Some((generation, value)) = self.take(only) else { return Ok(()) };
        if generation <= *written {
            debug!(key = %self.key, generation, "skipping superseded write");
            return Ok(());
        }
        self.write(&value)?;
        *written = generation;
        Ok(())
    }
}

/// Sole writer of one storage key. Writes are debounced: every `schedule`
/// restarts the quiet period and only the latest value is written.
pub struct PersistenceGateway<T> {
    shared: Arc<Shared<T>>,
    delay: Duration,
}

impl<T> PersistenceGateway<T>
where
    T: Serialize + Send + Sync + 'static,
{
    pub fn new(storage: Arc<dyn Storage>, key: impl Into<String>, delay: Duration, on_error: PersistErrorHook) -> Self {
        let shared = Shared {
            storage,
            key: key.into(),
            pending: Mutex::new(Pending { value: None, timer: None, generation: 0 }),
            io: Mutex::new(0),
            on_error,
        };
        Self { shared: Arc::new(shared), delay }
    }

    pub fn key(&self) -> &str { &self.shared.key }
    pub fn delay(&self) -> Duration { self.delay }
    pub fn has_pending(&self) -> bool { self.shared.pending.lock().value.is_some() }

    /// Queues `value`. With a zero delay, or outside a tokio runtime, the
    /// write happens immediately.
    pub fn schedule(&self, value: T) {
        let runtime = tokio::runtime::Handle::try_current().ok();
        let (generation, handle) = {
            let mut p = self.shared.pending.lock();
            p.value = Some(value);
            if let Some(t) = p.timer.take() { t.abort(); }
            p.generation += 1;
            (p.generation, runtime.filter(|_| !self.delay.is_zero()))
        };
        let Some(handle) = handle else {
            if let Err(e) = self.flush() { (self.shared.on_error)(&e); }
            return;
        };
        let shared = Arc::clone(&self.shared);
        let delay = self.delay;
        let timer = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = shared.drain(Some(generation)) { (shared.on_error)(&e); }
        });
        let mut p = self.shared.pending.lock();
        if p.generation == generation { p.timer = Some(timer); } else { timer.abort(); }
    }

    /// Writes any pending value now, cancelling its timer. Waits for a
    /// write already in flight, so storage holds the latest value on return.
    pub fn flush(&self) -> Result<()> { self.shared.drain(None) }

    /// Writes `value` synchronously, superseding anything pending.
    pub fn write_now(&self, value: T) -> Result<()> {
        let mut written = self.shared.io.lock();
        let generation = {
            let mut p = self.shared.pending.lock();
            if let Some(t) = p.timer.take() { t.abort(); }
            p.value = None;
            p.generation += 1;
            p.generation
        };
        self.shared.write(&value)?;
        *written = generation;
        Ok(())
    }
}

impl<T> Drop for PersistenceGateway<T> {
    fn drop(&mut self) {
        if let Some(t) = self.shared.pending.lock().timer.take() { t.abort(); }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn gateway(delay_ms: u64) -> (Arc<MemoryStorage>, PersistenceGateway<Vec<u32>>) {
        let storage = Arc::new(MemoryStorage::new());
        let g = PersistenceGateway::new(storage.clone(), "k", Duration::from_millis(delay_ms), log_persist_error());
        (storage, g)
    }

    #[test]
    fn zero_delay_writes_immediately() {
        let (storage, g) = gateway(0);
        g.schedule(vec![1]);
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("[1]"));
        assert!(!g.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_keeps_only_the_latest_value() {
        let (storage, g) = gateway(200);
        g.schedule(vec![1]);
        tokio::time::sleep(Duration::from_millis(150)).await;
        g.schedule(vec![1, 2]);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(storage.get("k").unwrap(), None);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("[1,2]"));
    }

    /// First `set` stalls, so a debounced write is still in flight when
    /// a newer value is flushed.
    #[derive(Default)]
    struct StallingStorage {
        inner: MemoryStorage,
        sets: Mutex<u32>,
    }

    impl Storage for StallingStorage {
        fn get(&self, key: &str) -> Result<Option<String>> { self.inner.get(key) }
        fn set(&self, key: &str, value: &str) -> Result<()> {
            let first = {
                let mut n = self.sets.lock();
                *n += 1;
                *n == 1
            };
            if first { std::thread::sleep(Duration::from_millis(300)); }
            self.inner.set(key, value)
        }
        fn remove(&self, key: &str) -> Result<()> { self.inner.remove(key) }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn flush_waits_for_an_in_flight_write_and_wins() {
        let storage = Arc::new(StallingStorage::default());
        let g = PersistenceGateway::new(storage.clone(), "k", Duration::from_millis(10), log_persist_error());
        g.schedule(vec![1]);
        std::thread::sleep(Duration::from_millis(100));
        g.schedule(vec![1, 2]);
        g.flush().unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("[1,2]"));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("[1,2]"));
    }

    #[test]
    fn write_now_supersedes_pending() {
        let (storage, g) = gateway(0);
        g.write_now(vec![9]).unwrap();
        g.flush().unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("[9]"));
    }

    #[tokio::test(start_paused = true)]
    async fn flush_drains_and_cancels_the_timer() {
        let (storage, g) = gateway(1_000);
        g.schedule(vec![7]);
        g.flush().unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("[7]"));
        storage.remove("k").unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(storage.get("k").unwrap(), None);
        g.flush().unwrap();
    }
}
