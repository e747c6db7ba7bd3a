//! # Store Compartido
//! src/store/mod.rs
//!
//! Key-value store con TTL compartido entre instancias del servidor.
//! Sobre él se construyen:
//!
//! - `LockStore`: exclusión mutua distribuida por fingerprint
//!   (`lock:{fingerprint}` → task id).
//! - `TaskStatusStore`: TaskRecords con expiración (`task:{taskId}`).
//!
//! ## Backends
//!
//! - `MemoryStore`: un solo proceso, útil en desarrollo y tests.
//! - `RedisStore`: Redis (o compatible) detrás de un pool r2d2; necesario
//!   cuando hay varias instancias.

pub mod lock;
pub mod memory;
pub mod redis;
pub mod status;

#[cfg(test)]
pub(crate) mod testing;

pub use lock::LockStore;
pub use memory::MemoryStore;
pub use self::redis::RedisStore;
pub use status::TaskStatusStore;

use crate::error::StoreError;
use std::time::Duration;

/// Operaciones mínimas que necesita la orquestación.
///
/// `set_if_absent` y `delete_if_equals` deben ser atómicas en el backend:
/// nunca se implementan como lectura seguida de escritura.
pub trait KeyValueStore: Send + Sync {
    /// Guarda `value` solo si `key` no existe. Retorna `true` si lo guardó.
    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Reemplaza el valor y reinicia el TTL completo
    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Borra `key` solo si su valor actual es `expected`
    fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError>;

    /// TTL restante; `None` si la clave no existe o no expira
    fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;
}

/// Construye claves con el prefijo opcional de la instalación
#[derive(Debug, Clone, Default)]
pub struct KeySpace {
    prefix: Option<String>,
}

impl KeySpace {
    pub fn new(prefix: Option<String>) -> Self {
        let prefix = prefix.filter(|p| !p.trim().is_empty());
        Self { prefix }
    }

    pub fn lock(&self, fingerprint: &str) -> String {
        self.key("lock", fingerprint)
    }

    pub fn task(&self, task_id: &str) -> String {
        self.key("task", task_id)
    }

    fn key(&self, kind: &str, id: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}:{}", prefix, kind, id),
            None => format!("{}:{}", kind, id),
        }
    }
}
