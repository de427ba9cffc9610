use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::env;
use std::sync::Mutex;

use crate::connection::Handle;
use crate::constants::POOL_WARM_SIZE_ENV;

/// Process-wide idle connection cache, one slot per pool key.
///
/// Constructed once at process start and shared by reference; every
/// mutation funnels through the single internal mutex. The lock is only
/// ever held for the map operation itself, never across a network call.
///
/// This is a cache, not a checkout queue: a caller that does not find
/// an idle handle for its key simply opens a new one.
#[derive(Debug, Default)]
pub struct ConnectionPool {
    entries: Mutex<HashMap<String, Handle>>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically removes and returns the idle handle for `key`.
    pub fn get(&self, key: &str) -> Option<Handle> {
        self.entries.lock().unwrap().remove(key)
    }

    /// Returns a handle to the pool.
    ///
    /// Inserts only into a vacant slot. When two callers race to return
    /// a handle for the same key, the loser's handle is dropped rather
    /// than overwriting the winner's. The drop happens outside the lock,
    /// since tearing down a transport can block on the socket.
    pub fn put(&self, key: String, handle: Handle) {
        let rejected = {
            let mut entries = self.entries.lock().unwrap();
            match entries.entry(key) {
                Entry::Occupied(_) => Some(handle),
                Entry::Vacant(slot) => {
                    slot.insert(handle);
                    None
                }
            }
        };

        drop(rejected);
    }

    /// Closes every pooled handle best-effort and clears the map.
    /// Individual close failures are logged and do not stop the sweep.
    pub fn evict_all(&self) {
        let mut entries = self.entries.lock().unwrap();

        for (key, mut handle) in entries.drain() {
            if handle.is_closed() {
                continue;
            }
            if let Err(e) = handle.close() {
                log::debug!("failed to close pooled connection {}: {}", key, e);
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

/// Pre-warm size from the environment, used by callers at process
/// start. Absent or unparsable values mean no pre-warming.
pub fn warm_size_from_env() -> usize {
    env::var(POOL_WARM_SIZE_ENV)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::constants::TIMESTAMP_FORMAT_DEFAULT;
    use crate::credentials::RowSeparator;
    use crate::driver::{DriverSession, ImportRequest, QueryResult};
    use crate::testing::MockSession;

    fn handle() -> Handle {
        MockSession::new().into_handle()
    }

    /// Checks, when dropped, whether the pool mutex is free.
    struct LockWatchingSession {
        pool: Arc<ConnectionPool>,
        saw_unlocked_pool: Arc<AtomicBool>,
    }

    impl DriverSession for LockWatchingSession {
        fn execute(&mut self, _sql: &str) -> crate::error::Result<QueryResult> {
            Ok(QueryResult::RowCount(0))
        }

        fn import_file(&mut self, _request: &ImportRequest) -> crate::error::Result<u64> {
            Ok(0)
        }

        fn is_closed(&self) -> bool {
            false
        }

        fn abort_query(&mut self) {}

        fn close(&mut self) -> crate::error::Result<()> {
            Ok(())
        }
    }

    impl Drop for LockWatchingSession {
        fn drop(&mut self) {
            let unlocked = self.pool.entries.try_lock().is_ok();
            self.saw_unlocked_pool.store(unlocked, Ordering::SeqCst);
        }
    }

    #[test]
    fn get_removes_the_entry() {
        let pool = ConnectionPool::new();
        pool.put("k".to_owned(), handle());

        assert!(pool.get("k").is_some());
        assert!(pool.get("k").is_none());
        assert!(pool.is_empty());
    }

    #[test]
    fn put_never_overwrites() {
        let pool = ConnectionPool::new();

        let first = MockSession::new();
        let marker = first.executed();
        pool.put("k".to_owned(), first.into_handle());
        pool.put("k".to_owned(), handle());

        assert_eq!(pool.len(), 1);

        // The surviving entry is the first one put in.
        let mut survivor = pool.get("k").unwrap();
        survivor.execute("SELECT 1").unwrap();
        assert_eq!(marker.lock().unwrap().len(), 1);
    }

    #[test]
    fn rejected_put_drops_the_loser_outside_the_lock() {
        let pool = Arc::new(ConnectionPool::new());
        pool.put("k".to_owned(), handle());

        let saw_unlocked_pool = Arc::new(AtomicBool::new(false));
        let loser = Handle {
            session: Box::new(LockWatchingSession {
                pool: Arc::clone(&pool),
                saw_unlocked_pool: Arc::clone(&saw_unlocked_pool),
            }),
            row_separator: RowSeparator::default(),
            timestamp_format: TIMESTAMP_FORMAT_DEFAULT.to_owned(),
        };

        // The losing handle is torn down only after the guard is gone,
        // so its teardown may talk to the network without stalling the
        // pool.
        pool.put("k".to_owned(), loser);

        assert!(saw_unlocked_pool.load(Ordering::SeqCst));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn evict_all_is_idempotent() {
        let pool = ConnectionPool::new();
        pool.put("a".to_owned(), handle());
        pool.put("b".to_owned(), handle());

        pool.evict_all();
        assert!(pool.is_empty());

        // Evicting again, and evicting empty, never panics.
        pool.evict_all();
        assert!(pool.is_empty());
    }

    #[test]
    fn evict_all_survives_failing_closes() {
        let pool = ConnectionPool::new();
        pool.put("bad".to_owned(), MockSession::new().failing().into_handle());
        pool.put("good".to_owned(), handle());

        pool.evict_all();
        assert!(pool.is_empty());
    }

    #[test]
    fn concurrent_puts_are_serialized() {
        let pool = Arc::new(ConnectionPool::new());

        let threads: Vec<_> = (0..10)
            .map(|i| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    pool.put(format!("key_{}", i), handle());
                })
            })
            .collect();

        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(pool.len(), 10);
    }

    #[test]
    fn concurrent_gets_yield_at_most_one_winner() {
        let pool = Arc::new(ConnectionPool::new());
        pool.put("k".to_owned(), handle());

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || pool.get("k").is_some())
            })
            .collect();

        let winners = threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert!(pool.is_empty());
    }
}
