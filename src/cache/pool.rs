use std::{
    hash::Hash,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        RwLock,
    },
};

use crossbeam_queue::SegQueue;
use dashmap::{mapref::one::Ref, DashMap};
use log::{debug, warn};

use crate::{cache::Disposable, Error, Result};

/// Default concurrency level of a pool: eight times the number of logical CPUs
pub fn default_concurrency() -> usize {
    num_cpus::get() * 8
}

/// A keyed pool of reusable values.
///
/// Every key owns a FIFO queue. Values go in with [`ProxyPool::add`] (or
/// [`ProxyPool::release`]) and come out with [`ProxyPool::request`]; each value is handed
/// out at most once per add. Queues are created on first use and live until the pool is
/// disposed. All operations are safe to call concurrently from any number of threads.
///
/// The map is sharded by the concurrency level (rounded up to a power of two) and sized
/// for `level * level` keys up front.
///
/// [`ProxyPool::dispose`] drains every queue, disposes each value and marks the pool
/// unusable: afterwards every operation except `dispose`, `count` and the diagnostics
/// returns [`Error::Disposed`].
pub struct ProxyPool<K, V>
where
    K: Eq + Hash + Clone,
{
    entries: DashMap<K, SegQueue<V>>,
    concurrency: usize,
    disposed: AtomicBool,
    queued: AtomicUsize,
    // add/request hold it shared, dispose exclusively
    gate: RwLock<()>,
}

impl<K, V> ProxyPool<K, V>
where
    K: Eq + Hash + Clone,
    V: Disposable,
{
    /// Create a pool with the [`default_concurrency`] level
    pub fn new() -> Self {
        Self::with_concurrency(default_concurrency())
    }

    /// Create a pool tuned for `level` concurrent users
    pub fn with_concurrency(level: usize) -> Self {
        let level = level.max(1);
        let shards = level.next_power_of_two().max(2);

        ProxyPool {
            entries: DashMap::with_capacity_and_shard_amount(level.saturating_mul(level), shards),
            concurrency: level,
            disposed: AtomicBool::new(false),
            queued: AtomicUsize::new(0),
            gate: RwLock::new(()),
        }
    }

    /// The concurrency level this pool was created with
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns true once [`ProxyPool::dispose`] was called
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }
        Ok(())
    }

    fn queue(&self, key: &K) -> Result<Ref<'_, K, SegQueue<V>>> {
        if let Some(queue) = self.entries.get(key) {
            return Ok(queue);
        }

        self.entries.entry(key.clone()).or_default();
        self.entries.get(key).ok_or_else(|| {
            Error::PoolInconsistent("queue missing right after its creation".to_string())
        })
    }

    /// Enqueue `value` under `key`, creating the queue on first use
    ///
    /// # Errors
    /// Returns [`Error::Disposed`] after disposal, or [`Error::PoolInconsistent`] if the
    /// queue cannot be located after creation.
    pub fn add(&self, key: K, value: V) -> Result<()> {
        let _open = read_lock!(self.gate);
        self.ensure_open()?;
        let queue = self.queue(&key)?;
        self.queued.fetch_add(1, Ordering::AcqRel);
        queue.push(value);
        Ok(())
    }

    /// Return a value obtained from [`ProxyPool::request`] to the pool
    ///
    /// # Errors
    /// Same as [`ProxyPool::add`].
    pub fn release(&self, key: K, value: V) -> Result<()> {
        self.add(key, value)
    }

    /// Number of values currently queued under `key`, 0 for keys never seen.
    ///
    /// The answer is a snapshot; concurrent adds and requests may change it immediately.
    pub fn count(&self, key: &K) -> usize {
        if self.is_disposed() {
            return 0;
        }
        self.queue(key).map_or(0, |queue| queue.len())
    }

    /// Dequeue the oldest value under `key`, `None` if the queue is empty
    ///
    /// # Errors
    /// Returns [`Error::Disposed`] after disposal, or [`Error::PoolInconsistent`] if the
    /// queue cannot be located after creation.
    pub fn request(&self, key: &K) -> Result<Option<V>> {
        let _open = read_lock!(self.gate);
        self.ensure_open()?;
        let value = self.queue(key)?.pop();
        if value.is_some() {
            self.queued.fetch_sub(1, Ordering::AcqRel);
        }
        Ok(value)
    }

    /// Dequeue a value under `key`, or build a fresh one with `builder` when none is
    /// queued. A built value is handed to the caller directly, it is not enqueued.
    ///
    /// # Errors
    /// Returns the errors of [`ProxyPool::request`] and whatever `builder` returns.
    pub fn request_or_build<F>(&self, key: &K, builder: F) -> Result<V>
    where
        F: FnOnce() -> Result<V>,
    {
        match self.request(key)? {
            Some(value) => Ok(value),
            None => builder(),
        }
    }

    /// Keys that currently own a queue, in no particular order
    pub fn keys(&self) -> Vec<K> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of values queued across all keys
    pub fn total_count(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    /// Drain every queue, dispose each value and mark the pool disposed.
    ///
    /// Waits for in-flight adds and requests, so every value an `add` accepted is
    /// disposed. A failing value is logged and does not stop the remaining values from
    /// being disposed. Calling `dispose` again is a no-op.
    ///
    /// # Errors
    /// Returns [`Error::DisposeFailed`] with the number of failed and drained values if
    /// any value failed to dispose.
    pub fn dispose(&self) -> Result<()> {
        let _closed = write_lock!(self.gate);
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut total = 0;
        let mut failed = 0;
        for key in self.keys() {
            let Some((_, queue)) = self.entries.remove(&key) else {
                continue;
            };
            while let Some(value) = queue.pop() {
                total += 1;
                self.queued.fetch_sub(1, Ordering::AcqRel);
                if let Err(error) = value.dispose() {
                    failed += 1;
                    warn!("Failed to dispose a pooled value: {error}");
                }
            }
        }

        debug!("Disposed pool ({total} values, {failed} failures)");
        if failed > 0 {
            return Err(Error::DisposeFailed { failed, total });
        }
        Ok(())
    }
}

impl<K, V> Default for ProxyPool<K, V>
where
    K: Eq + Hash + Clone,
    V: Disposable,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    struct Tracked {
        id: usize,
        disposed: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Disposable for Tracked {
        fn dispose(self) -> Result<()> {
            self.disposed.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Error(format!("handle {} is stuck", self.id)));
            }
            Ok(())
        }
    }

    #[test]
    fn test_fifo_per_key() {
        let pool: ProxyPool<&str, i32> = ProxyPool::with_concurrency(4);
        pool.add("a", 1).unwrap();
        pool.add("a", 2).unwrap();
        pool.add("b", 3).unwrap();

        assert_eq!(pool.request(&"a").unwrap(), Some(1));
        assert_eq!(pool.request(&"a").unwrap(), Some(2));
        assert_eq!(pool.request(&"a").unwrap(), None);
        assert_eq!(pool.request(&"b").unwrap(), Some(3));
        assert_eq!(pool.total_count(), 0);
    }

    #[test]
    fn test_count_creates_queue_lazily() {
        let pool: ProxyPool<&str, i32> = ProxyPool::with_concurrency(4);
        assert_eq!(pool.count(&"unseen"), 0);
        assert_eq!(pool.keys(), vec!["unseen"]);
    }

    #[test]
    fn test_request_or_build_does_not_enqueue() {
        let pool: ProxyPool<&str, i32> = ProxyPool::with_concurrency(4);
        let value = pool.request_or_build(&"missing", || Ok(42)).unwrap();
        assert_eq!(value, 42);
        assert_eq!(pool.count(&"missing"), 0);

        pool.add("present", 7).unwrap();
        let value = pool
            .request_or_build(&"present", || panic!("builder must not run"))
            .unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_builder_error_is_propagated() {
        let pool: ProxyPool<&str, i32> = ProxyPool::with_concurrency(4);
        let result = pool.request_or_build(&"k", || Err(Error::Error("no backend".into())));
        assert!(matches!(result, Err(Error::Error(_))));
    }

    #[test]
    fn test_dispose_is_best_effort() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let pool: ProxyPool<u32, Tracked> = ProxyPool::with_concurrency(2);
        for id in 0..5 {
            pool.add(
                (id % 2) as u32,
                Tracked {
                    id,
                    disposed: disposed.clone(),
                    fail: id == 3,
                },
            )
            .unwrap();
        }

        match pool.dispose() {
            Err(Error::DisposeFailed { failed, total }) => {
                assert_eq!(failed, 1);
                assert_eq!(total, 5);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(disposed.load(Ordering::SeqCst), 5);

        // second dispose is a no-op
        assert!(pool.dispose().is_ok());
        assert_eq!(disposed.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_disposed_pool_rejects_use() {
        let pool: ProxyPool<&str, i32> = ProxyPool::with_concurrency(1);
        pool.add("a", 1).unwrap();
        pool.dispose().unwrap();

        assert!(pool.is_disposed());
        assert!(matches!(pool.add("a", 2), Err(Error::Disposed)));
        assert!(matches!(pool.request(&"a"), Err(Error::Disposed)));
        assert!(matches!(
            pool.request_or_build(&"a", || Ok(3)),
            Err(Error::Disposed)
        ));
        assert_eq!(pool.count(&"a"), 0);
        assert_eq!(pool.total_count(), 0);
    }

    #[test]
    fn test_dispose_racing_adds_disposes_every_accepted_value() {
        const THREADS: usize = 4;
        const VALUES: usize = 2_000;

        for _ in 0..20 {
            let disposed = Arc::new(AtomicUsize::new(0));
            let accepted = AtomicUsize::new(0);
            let pool: ProxyPool<usize, Tracked> = ProxyPool::with_concurrency(THREADS);

            std::thread::scope(|scope| {
                for thread in 0..THREADS {
                    let (pool, accepted, disposed) = (&pool, &accepted, &disposed);
                    scope.spawn(move || {
                        for id in 0..VALUES {
                            let value = Tracked {
                                id,
                                disposed: disposed.clone(),
                                fail: false,
                            };
                            match pool.add((thread + id) % 8, value) {
                                Ok(()) => {
                                    accepted.fetch_add(1, Ordering::SeqCst);
                                }
                                Err(Error::Disposed) => break,
                                Err(other) => panic!("unexpected {other:?}"),
                            }
                        }
                    });
                }
                scope.spawn(|| {
                    std::thread::yield_now();
                    pool.dispose().unwrap();
                });
            });

            assert_eq!(
                disposed.load(Ordering::SeqCst),
                accepted.load(Ordering::SeqCst)
            );
            assert_eq!(pool.total_count(), 0);
        }
    }

    #[test]
    fn test_shard_amount_is_valid_for_any_level() {
        for level in [0, 1, 3, 12, 100] {
            let pool: ProxyPool<u8, u8> = ProxyPool::with_concurrency(level);
            pool.add(1, 1).unwrap();
            assert_eq!(pool.count(&1), 1);
        }
    }
}
