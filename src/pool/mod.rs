//! Keyed, versioned cache of idle physical connections.
//!
//! Each key (a data source, compared case-insensitively) owns a FIFO queue bounded by the
//! max size last requested for it. Versions invalidate connections that were checked out
//! before a clear: releasing one with a stale version closes it instead of queueing it.

pub mod types;

pub use types::PooledResource;

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};

use crate::engine::Engine;
use types::PoolEntry;

/// Version given to entries created before any global clear.
pub const INITIAL_VERSION: u64 = 1;

#[derive(Debug)]
struct PoolState<H> {
    entries: HashMap<String, PoolEntry<H>>,
    /// Version assigned to newly created entries.
    version: u64,
}

/// A pool of idle resources keyed by data source.
#[derive(Debug)]
pub struct ConnectionPool<H> {
    state: Mutex<PoolState<H>>,
}

static GLOBAL_POOL: LazyLock<ConnectionPool<Box<dyn Engine>>> = LazyLock::new(ConnectionPool::new);

/// The process-wide pool used by connections opened with pooling enabled.
pub fn global_pool() -> &'static ConnectionPool<Box<dyn Engine>> {
    &GLOBAL_POOL
}

fn normalize(key: &str) -> String {
    key.to_lowercase()
}

/// Close resources outside of the pool lock.
fn close_all<H: PooledResource>(key: &str, discarded: Vec<H>, reason: &'static str) {
    if !discarded.is_empty() {
        tracing::debug!(key, count = discarded.len(), reason, "closing pooled connections");
    }
    for handle in discarded {
        handle.close();
    }
}

impl<H: PooledResource> Default for ConnectionPool<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: PooledResource> ConnectionPool<H> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PoolState {
                entries: HashMap::new(),
                version: INITIAL_VERSION,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState<H>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take an idle resource for `key`, together with the entry version to hand back on
    /// [`release`](Self::release).
    ///
    /// The entry is created on first use even when nothing is returned. The queue is first
    /// trimmed to `max_size`; dead resources found while dequeuing are closed.
    /// A `max_size` of zero never yields a resource.
    pub fn acquire(&self, key: &str, max_size: usize) -> (Option<H>, u64) {
        let mut discarded = Vec::new();
        let (found, version) = {
            let mut state = self.lock();
            let initial = state.version;
            let entry = state
                .entries
                .entry(normalize(key))
                .or_insert_with(|| PoolEntry::new(initial));
            entry.max_size = max_size;
            discarded.extend(entry.trim_to(max_size));

            let mut found = None;
            while let Some(handle) = entry.idle.pop_front() {
                if handle.is_live() {
                    found = Some(handle);
                    break;
                }
                discarded.push(handle);
            }
            (found, entry.version)
        };

        tracing::trace!(key, version, hit = found.is_some(), "pool acquire");
        close_all(key, discarded, "trimmed or dead");
        (found, version)
    }

    /// Return a resource taken with [`acquire`](Self::acquire). It is queued only if the
    /// entry still has the same version and allows pooling; otherwise it is closed.
    pub fn release(&self, key: &str, handle: H, version: u64) {
        let discarded = {
            let mut state = self.lock();
            match state.entries.get_mut(&normalize(key)) {
                Some(entry) if entry.version == version && entry.max_size > 0 => {
                    let excess = entry.trim_to(entry.max_size - 1);
                    entry.idle.push_back(handle);
                    excess
                }
                _ => {
                    tracing::debug!(key, version, "released connection is stale, closing");
                    vec![handle]
                }
            }
        };
        close_all(key, discarded, "released past capacity or stale");
    }

    /// Close every idle resource for `key` and invalidate the ones currently checked out.
    pub fn clear(&self, key: &str) {
        let discarded = {
            let mut state = self.lock();
            match state.entries.get_mut(&normalize(key)) {
                Some(entry) => {
                    entry.version += 1;
                    entry.idle.drain(..).collect()
                }
                None => Vec::new(),
            }
        };
        close_all(key, discarded, "pool cleared");
    }

    /// Close every idle resource of every key, invalidate everything checked out and
    /// forget all entries.
    pub fn clear_all(&self) {
        let discarded: Vec<H> = {
            let mut state = self.lock();
            let newest = state
                .entries
                .values()
                .map(|entry| entry.version)
                .max()
                .unwrap_or(state.version);
            state.version = newest.max(state.version) + 1;
            state
                .entries
                .drain()
                .flat_map(|(_, entry)| entry.idle)
                .collect()
        };
        close_all("*", discarded, "all pools cleared");
    }

    /// Number of idle resources queued for `key`.
    #[must_use]
    pub fn idle_count(&self, key: &str) -> usize {
        self.lock()
            .entries
            .get(&normalize(key))
            .map_or(0, |entry| entry.idle.len())
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;

    use super::*;

    #[derive(Debug)]
    struct FakeConn {
        id: usize,
        live: Arc<AtomicBool>,
        closes: Arc<AtomicUsize>,
        panic_on_check: bool,
    }

    impl PooledResource for FakeConn {
        fn is_live(&self) -> bool {
            assert!(!self.panic_on_check, "liveness check blew up");
            self.live.load(Ordering::SeqCst)
        }

        fn close(self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Factory {
        closes: Arc<AtomicUsize>,
    }

    impl Factory {
        fn new() -> Self {
            Self {
                closes: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn conn(&self, id: usize) -> FakeConn {
            FakeConn {
                id,
                live: Arc::new(AtomicBool::new(true)),
                closes: Arc::clone(&self.closes),
                panic_on_check: false,
            }
        }

        fn closed(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn empty_pool_yields_nothing_at_initial_version() {
        let pool = ConnectionPool::<FakeConn>::new();
        let (handle, version) = pool.acquire("db1", 3);
        assert!(handle.is_none());
        assert_eq!(version, INITIAL_VERSION);
    }

    #[test]
    fn released_connection_is_reused_with_case_insensitive_key() {
        let factory = Factory::new();
        let pool = ConnectionPool::new();
        let (_, version) = pool.acquire("db1", 3);
        pool.release("DB1", factory.conn(7), version);
        assert_eq!(pool.idle_count("db1"), 1);

        let (handle, again) = pool.acquire("Db1", 3);
        assert_eq!(handle.map(|c| c.id), Some(7));
        assert_eq!(again, version);
        assert_eq!(factory.closed(), 0);
    }

    #[test]
    fn stale_release_after_clear_is_closed() {
        let factory = Factory::new();
        let pool = ConnectionPool::new();
        let (_, version) = pool.acquire("db", 3);
        pool.clear("db");
        pool.release("db", factory.conn(1), version);
        assert_eq!(factory.closed(), 1);
        assert!(pool.acquire("db", 3).0.is_none());
    }

    #[test]
    fn queue_is_bounded_and_each_excess_closed_once() {
        let factory = Factory::new();
        let pool = ConnectionPool::new();
        let (_, version) = pool.acquire("db", 2);
        for id in 0..5 {
            pool.release("db", factory.conn(id), version);
        }
        assert_eq!(pool.idle_count("db"), 2);
        assert_eq!(factory.closed(), 3);

        // newest survive
        assert_eq!(pool.acquire("db", 2).0.map(|c| c.id), Some(3));
    }

    #[test]
    fn zero_max_size_disables_pooling() {
        let factory = Factory::new();
        let pool = ConnectionPool::new();
        let (_, version) = pool.acquire("db", 0);
        pool.release("db", factory.conn(1), version);
        assert_eq!(pool.idle_count("db"), 0);
        assert_eq!(factory.closed(), 1);
    }

    #[test]
    fn smaller_max_size_trims_on_acquire() {
        let factory = Factory::new();
        let pool = ConnectionPool::new();
        let (_, version) = pool.acquire("db", 5);
        for id in 0..4 {
            pool.release("db", factory.conn(id), version);
        }
        let (handle, _) = pool.acquire("db", 1);
        assert_eq!(handle.map(|c| c.id), Some(3));
        assert_eq!(factory.closed(), 3);
    }

    #[test]
    fn dead_connections_are_skipped() {
        let factory = Factory::new();
        let pool = ConnectionPool::new();
        let (_, version) = pool.acquire("db", 3);
        let dead = factory.conn(1);
        dead.live.store(false, Ordering::SeqCst);
        pool.release("db", dead, version);
        pool.release("db", factory.conn(2), version);

        assert_eq!(pool.acquire("db", 3).0.map(|c| c.id), Some(2));
        assert_eq!(factory.closed(), 1);
    }

    #[test]
    fn clear_all_outranks_every_version() {
        let factory = Factory::new();
        let pool = ConnectionPool::new();
        let (_, a) = pool.acquire("a", 3);
        pool.clear("a");
        pool.clear("a");
        let (_, b) = pool.acquire("b", 3);
        pool.release("b", factory.conn(1), b);

        pool.clear_all();
        assert_eq!(factory.closed(), 1);
        assert_eq!(pool.idle_count("b"), 0);

        let (_, fresh) = pool.acquire("a", 3);
        assert!(fresh > a + 2);
        pool.release("a", factory.conn(2), a);
        assert_eq!(factory.closed(), 2);
    }

    #[test]
    fn concurrent_checkouts_stay_within_bounds() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 200;

        let factory = Arc::new(Factory::new());
        let pool = Arc::new(ConnectionPool::new());
        let created = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..THREADS)
            .map(|t| {
                let factory = Arc::clone(&factory);
                let pool = Arc::clone(&pool);
                let created = Arc::clone(&created);
                thread::spawn(move || {
                    let mut max_idle_seen = 0;
                    for round in 0..ROUNDS {
                        let (found, version) = pool.acquire("shared", 2);
                        let conn = found.unwrap_or_else(|| {
                            created.fetch_add(1, Ordering::SeqCst);
                            factory.conn(t * ROUNDS + round)
                        });
                        max_idle_seen = max_idle_seen.max(pool.idle_count("shared"));
                        pool.release("shared", conn, version);
                        max_idle_seen = max_idle_seen.max(pool.idle_count("shared"));
                    }
                    max_idle_seen
                })
            })
            .collect();

        for worker in workers {
            let max_idle_seen = worker.join().expect("worker thread");
            assert!(max_idle_seen <= 2, "saw {max_idle_seen} idle");
        }

        let idle = pool.idle_count("shared");
        assert!(idle <= 2);
        assert!(created.load(Ordering::SeqCst) >= idle);
        // every handle ever created is either closed exactly once or still queued
        assert_eq!(factory.closed() + idle, created.load(Ordering::SeqCst));
    }

    #[test]
    fn pool_keeps_serving_after_a_panic_under_its_lock() {
        let factory = Factory::new();
        let pool = ConnectionPool::new();
        let (_, version) = pool.acquire("db", 3);
        let mut bad = factory.conn(1);
        bad.panic_on_check = true;
        pool.release("db", bad, version);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| pool.acquire("db", 3)));
        assert!(outcome.is_err());
        assert!(pool.state.is_poisoned());

        assert_eq!(pool.idle_count("db"), 0);
        pool.release("db", factory.conn(2), version);
        assert_eq!(pool.acquire("db", 3).0.map(|c| c.id), Some(2));
        pool.clear("db");
        let (_, fresh) = pool.acquire("db", 3);
        assert_eq!(fresh, version + 1);
    }
}
