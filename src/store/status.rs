//! # Store de Estado de Tareas
//! src/store/status.rs
//!
//! `task:{taskId}` → TaskRecord (JSON). Cada `put` reemplaza el registro
//! completo y reinicia el TTL de retención; no hay actualización parcial.

use super::{KeySpace, KeyValueStore};
use crate::error::StoreError;
use crate::jobs::types::TaskRecord;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct TaskStatusStore {
    kv: Arc<dyn KeyValueStore>,
    keys: KeySpace,
    ttl: Duration,
}

impl TaskStatusStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, keys: KeySpace, ttl: Duration) -> Self {
        Self { kv, keys, ttl }
    }

    pub fn put(&self, record: &TaskRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)?;
        self.kv.set(&self.keys.task(&record.task_id), &json, self.ttl)
    }

    /// `None` cubre tanto "nunca existió" como "expiró"
    pub fn get(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        match self.kv.get(&self.keys.task(task_id))? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}
