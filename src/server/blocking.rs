//! Waiter registry for blocking list commands (BLPOP/BRPOP/BLMOVE).
//!
//! Each waiting client registers a oneshot notification against the key(s)
//! it's blocked on. A writer that pushes to a key wakes the oldest waiter
//! first (FIFO), matching the reference ordering guarantee. The actual
//! pop happens after the wake, back in the waiter's own task, so the
//! waiter and the keyspace lock are never held across an await.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::Notify;

#[derive(Default)]
pub struct BlockingManager {
    waiters: Mutex<HashMap<(usize, Bytes), Vec<std::sync::Arc<Notify>>>>,
}

impl BlockingManager {
    /// Register interest in `key` within database `db`, returning a handle
    /// the caller awaits with an optional timeout.
    pub fn register(&self, db: usize, key: &Bytes) -> std::sync::Arc<Notify> {
        let notify = std::sync::Arc::new(Notify::new());
        self.waiters
            .lock()
            .entry((db, key.clone()))
            .or_default()
            .push(notify.clone());
        notify
    }

    pub fn unregister(&self, db: usize, key: &Bytes, notify: &std::sync::Arc<Notify>) {
        if let Some(list) = self.waiters.lock().get_mut(&(db, key.clone())) {
            list.retain(|n| !std::sync::Arc::ptr_eq(n, notify));
        }
    }

    /// Wake every waiter blocked on `key` in database `db` (oldest first).
    /// Called after a push-like mutation makes the key non-empty.
    pub fn notify_key(&self, db: usize, key: &[u8]) {
        if let Some(list) = self.waiters.lock().get(&(db, Bytes::copy_from_slice(key))) {
            for notify in list {
                notify.notify_one();
            }
        }
    }

    pub fn has_waiters(&self, db: usize, key: &[u8]) -> bool {
        self.waiters
            .lock()
            .get(&(db, Bytes::copy_from_slice(key)))
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notify_wakes_registered_waiter() {
        let mgr = BlockingManager::default();
        let key = Bytes::from_static(b"list");
        let notify = mgr.register(0, &key);

        let notify2 = notify.clone();
        let handle = tokio::spawn(async move {
            notify2.notified().await;
        });

        mgr.notify_key(0, b"list");
        tokio::time::timeout(std::time::Duration::from_millis(100), handle)
            .await
            .expect("waiter should have woken")
            .unwrap();
    }

    #[test]
    fn unregister_removes_waiter() {
        let mgr = BlockingManager::default();
        let key = Bytes::from_static(b"list");
        let notify = mgr.register(0, &key);
        assert!(mgr.has_waiters(0, b"list"));
        mgr.unregister(0, &key, &notify);
        assert!(!mgr.has_waiters(0, b"list"));
    }
}
