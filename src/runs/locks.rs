use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-thread single-flight registry. The backend serializes runs on a
/// thread badly (a second run while one is active errors); overlapping turns
/// on the same thread queue here instead.
#[derive(Default)]
pub struct ThreadLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ThreadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `thread_id`, waiting behind any in-flight turn
    /// on the same thread. The guard releases on drop.
    pub async fn acquire(&self, thread_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            // Entries nobody holds or waits on are garbage
            map.retain(|_, l| Arc::strong_count(l) > 1);
            map.entry(thread_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_thread_serializes() {
        let locks = Arc::new(ThreadLocks::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let in_flight = in_flight.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("thread_a").await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_threads_do_not_block() {
        let locks = ThreadLocks::new();
        let _a = locks.acquire("thread_a").await;
        // Would deadlock if keys shared a lock
        let _b = locks.acquire("thread_b").await;
    }

    #[tokio::test]
    async fn test_released_entries_are_swept() {
        let locks = ThreadLocks::new();
        drop(locks.acquire("thread_a").await);
        drop(locks.acquire("thread_b").await);
        let _c = locks.acquire("thread_c").await;
        let map = locks.inner.lock().await;
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("thread_c"));
    }
}
