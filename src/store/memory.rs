//! # Store en Memoria
//! src/store/memory.rs
//!
//! Implementación de `KeyValueStore` para una sola instancia.
//! Todas las operaciones toman el mismo Mutex, así que `set_if_absent`
//! y `delete_if_equals` son atómicas. Las entradas vencidas se leen como
//! ausentes; además cada escritura barre el mapa completo si pasó
//! `sweep_interval` desde el último barrido.

use super::KeyValueStore;
use crate::error::StoreError;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

struct Entries {
    map: HashMap<String, Entry>,
    last_sweep: Instant,
}

impl Entries {
    /// Inserta y, si toca, purga las entradas vencidas
    fn insert(&mut self, key: &str, value: &str, ttl: Duration, sweep_interval: Duration) {
        let now = Instant::now();
        if now.saturating_duration_since(self.last_sweep) >= sweep_interval {
            self.map.retain(|_, e| e.is_live(now));
            self.last_sweep = now;
        }

        let expires_at = now.checked_add(ttl).unwrap_or_else(far_future);
        self.map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
    }
}

/// Tope para TTLs que no caben en un `Instant`
fn far_future() -> Instant {
    let now = Instant::now();
    now.checked_add(Duration::from_secs(100 * 365 * 24 * 3600)).unwrap_or(now)
}

pub struct MemoryStore {
    entries: Mutex<Entries>,
    sweep_interval: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sweep_interval(sweep_interval: Duration) -> Self {
        Self {
            entries: Mutex::new(Entries {
                map: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            sweep_interval,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Entries>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store mutex poisoned".to_string()))
    }

    /// Número de claves vivas (purga las vencidas)
    pub fn len(&self) -> usize {
        match self.lock() {
            Ok(mut entries) => {
                let now = Instant::now();
                entries.map.retain(|_, e| e.is_live(now));
                entries.map.len()
            }
            Err(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entradas guardadas, vencidas incluidas
    #[cfg(test)]
    fn stored(&self) -> usize {
        self.lock().map(|e| e.map.len()).unwrap_or(0)
    }
}

impl KeyValueStore for MemoryStore {
    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut entries = self.lock()?;
        let now = Instant::now();

        if entries.map.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }

        entries.insert(key, value, ttl, self.sweep_interval);
        Ok(true)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.lock()?;
        entries.insert(key, value, ttl, self.sweep_interval);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.lock()?;
        let now = Instant::now();

        match entries.map.get(key) {
            Some(e) if e.is_live(now) => Ok(Some(e.value.clone())),
            Some(_) => {
                entries.map.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut entries = self.lock()?;
        let now = Instant::now();

        let matches = entries
            .map
            .get(key)
            .is_some_and(|e| e.is_live(now) && e.value == expected);

        if matches {
            entries.map.remove(key);
        }
        Ok(matches)
    }

    fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let entries = self.lock()?;
        let now = Instant::now();

        Ok(entries
            .map
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.expires_at.saturating_duration_since(now)))
    }
}
