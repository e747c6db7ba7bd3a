//! Store instrumentado para tests: registra cada escritura y permite
//! inyectar fallas por operación.

use super::{KeyValueStore, MemoryStore};
use crate::error::StoreError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    pub fail_acquires: AtomicBool,
    pub fail_puts: AtomicBool,
    pub fail_reads: AtomicBool,
    pub fail_deletes: AtomicBool,
    writes: Mutex<Vec<(String, String)>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Historial de `set` exitosos sobre claves que empiezan con `prefix`
    pub fn writes_to(&self, prefix: &str) -> Vec<String> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(_, v)| v.clone())
            .collect()
    }

    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl KeyValueStore for FlakyStore {
    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        Self::check(&self.fail_acquires)?;
        self.inner.set_if_absent(key, value, ttl)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        Self::check(&self.fail_puts)?;
        self.inner.set(key, value, ttl)?;
        self.writes.lock().unwrap().push((key.to_string(), value.to_string()));
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Self::check(&self.fail_reads)?;
        self.inner.get(key)
    }

    fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        Self::check(&self.fail_deletes)?;
        self.inner.delete_if_equals(key, expected)
    }

    fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        Self::check(&self.fail_reads)?;
        self.inner.remaining_ttl(key)
    }
}
