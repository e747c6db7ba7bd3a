//! # Lock Distribuido por Fingerprint
//! src/store/lock.rs
//!
//! `lock:{fingerprint}` → task id del dueño, con TTL. La creación es
//! siempre `set_if_absent` (nunca "leer y luego escribir") y la liberación
//! es compare-and-delete: un dueño cuyo lock ya expiró y fue tomado por
//! otra tarea no puede borrar el lock nuevo.

use super::{KeySpace, KeyValueStore};
use crate::error::StoreError;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct LockStore {
    kv: Arc<dyn KeyValueStore>,
    keys: KeySpace,
    ttl: Duration,
}

impl LockStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, keys: KeySpace, ttl: Duration) -> Self {
        Self { kv, keys, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Intenta tomar el lock para `owner`. `true` si ahora es el dueño.
    pub fn try_acquire(&self, fingerprint: &str, owner: &str) -> Result<bool, StoreError> {
        self.kv.set_if_absent(&self.keys.lock(fingerprint), owner, self.ttl)
    }

    /// Task id del dueño actual, si hay lock
    pub fn read(&self, fingerprint: &str) -> Result<Option<String>, StoreError> {
        self.kv.get(&self.keys.lock(fingerprint))
    }

    /// Tiempo transcurrido desde que se tomó el lock, derivado del TTL restante
    pub fn age(&self, fingerprint: &str) -> Result<Option<Duration>, StoreError> {
        let remaining = self.kv.remaining_ttl(&self.keys.lock(fingerprint))?;
        Ok(remaining.map(|r| self.ttl.saturating_sub(r)))
    }

    /// Libera el lock solo si sigue perteneciendo a `owner`
    pub fn release(&self, fingerprint: &str, owner: &str) -> Result<bool, StoreError> {
        self.kv.delete_if_equals(&self.keys.lock(fingerprint), owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn lock_store(ttl: Duration) -> LockStore {
        LockStore::new(Arc::new(MemoryStore::new()), KeySpace::default(), ttl)
    }

    #[test]
    fn test_acquire_read_release() {
        let locks = lock_store(Duration::from_secs(60));

        assert!(locks.try_acquire("fp1", "task-a").unwrap());
        assert!(!locks.try_acquire("fp1", "task-b").unwrap());
        assert_eq!(locks.read("fp1").unwrap().as_deref(), Some("task-a"));

        assert!(locks.release("fp1", "task-a").unwrap());
        assert_eq!(locks.read("fp1").unwrap(), None);
        assert!(locks.try_acquire("fp1", "task-b").unwrap());
    }

    #[test]
    fn test_release_by_non_owner_is_noop() {
        let locks = lock_store(Duration::from_secs(60));
        locks.try_acquire("fp1", "task-a").unwrap();

        assert!(!locks.release("fp1", "task-b").unwrap());
        assert_eq!(locks.read("fp1").unwrap().as_deref(), Some("task-a"));
    }

    #[test]
    fn test_different_fingerprints_do_not_contend() {
        let locks = lock_store(Duration::from_secs(60));
        assert!(locks.try_acquire("fp1", "task-a").unwrap());
        assert!(locks.try_acquire("fp2", "task-b").unwrap());
    }

    #[test]
    fn test_age_grows_from_zero() {
        let locks = lock_store(Duration::from_secs(60));
        assert_eq!(locks.age("fp1").unwrap(), None);

        locks.try_acquire("fp1", "task-a").unwrap();
        std::thread::sleep(Duration::from_millis(30));
        let age = locks.age("fp1").unwrap().unwrap();
        assert!(age >= Duration::from_millis(20));
        assert!(age < Duration::from_secs(5));
    }

    #[test]
    fn test_lock_expires_after_ttl() {
        let locks = lock_store(Duration::from_millis(20));
        locks.try_acquire("fp1", "task-a").unwrap();
        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(locks.read("fp1").unwrap(), None);
        assert!(locks.try_acquire("fp1", "task-b").unwrap());
    }
}
