//! Per-key async mutexes.
//!
//! Every read-modify-write of a shared document (a user config, the global
//! config, a user's operation log) runs under the mutex for its key, so two
//! concurrent operations on the same user queue instead of losing updates.
//! Keys are independent: user `a` never waits on user `b`.
//!
//! Holders must not re-acquire their own key: the mutexes are not reentrant.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

pub const GLOBAL_KEY: &str = "@global";

#[derive(Default)]
pub struct UserLocks {
    slots: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock();
            slots
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        slot.lock_owned().await
    }

    pub async fn lock_user(&self, user_id: &str) -> OwnedMutexGuard<()> {
        self.lock(&format!("user:{}", user_id)).await
    }

    pub async fn lock_log(&self, user_id: &str) -> OwnedMutexGuard<()> {
        self.lock(&format!("log:{}", user_id)).await
    }

    pub async fn lock_global(&self) -> OwnedMutexGuard<()> {
        self.lock(GLOBAL_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_same_key_is_serialized() {
        let locks = Arc::new(UserLocks::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let guard = locks.lock_user("a").await;
        let waiter = {
            let locks = locks.clone();
            let order = order.clone();
            tokio::spawn(async move {
                let _g = locks.lock_user("a").await;
                order.lock().push("second");
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        order.lock().push("first");
        drop(guard);
        waiter.await.unwrap();

        assert_eq!(*order.lock(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = UserLocks::new();
        let _a = locks.lock_user("a").await;
        let _b = locks.lock_user("b").await;
        let _log = locks.lock_log("a").await;
        let _g = locks.lock_global().await;
    }
}
