//! # Progreso de Tareas
//! src/jobs/progress.rs
//!
//! El generador nunca escribe en el store. Reporta a través de un
//! `ProgressSink` (un extremo de un canal `mpsc`) y el hilo dueño de la
//! tarea consume los `JobEvent` con un `ProgressReporter`, que es el único
//! que modifica el TaskRecord.
//!
//! Reglas del reporter:
//!
//! - Un porcentaje menor al actual se descarta.
//! - Las escrituras al store se espacian al menos `interval`, excepto el
//!   primer reporte y el 100, que siempre se escriben.
//! - `complete` y `fail` escriben siempre.

use crate::error::{GenerationError, StoreError};
use crate::jobs::types::{TaskRecord, TaskStatus};
use crate::store::TaskStatusStore;
use chrono::Utc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// Mensajes del generador hacia el hilo dueño de la tarea
#[derive(Debug)]
pub enum JobEvent {
    Progress { percent: u8, message: String },
    Finished(Result<Vec<u8>, GenerationError>),
}

/// Callback de progreso que recibe el generador
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: Sender<JobEvent>,
}

impl ProgressSink {
    pub fn channel() -> (Self, Receiver<JobEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }

    pub fn report(&self, percent: u8, message: impl Into<String>) {
        // Si el receptor ya no existe la tarea terminó; no hay a quién avisar
        let _ = self.tx.send(JobEvent::Progress {
            percent,
            message: message.into(),
        });
    }

    pub(crate) fn finish(&self, result: Result<Vec<u8>, GenerationError>) {
        let _ = self.tx.send(JobEvent::Finished(result));
    }
}

/// Dueño único del TaskRecord mientras la tarea corre
pub struct ProgressReporter {
    store: TaskStatusStore,
    record: TaskRecord,
    interval: Duration,
    last_write: Option<Instant>,
}

impl ProgressReporter {
    pub fn new(store: TaskStatusStore, record: TaskRecord, interval: Duration) -> Self {
        Self {
            store,
            record,
            interval,
            last_write: None,
        }
    }

    pub fn record(&self) -> &TaskRecord {
        &self.record
    }

    /// Aplica un reporte. Retorna `true` si se escribió al store.
    pub fn report(&mut self, percent: u8, message: &str) -> bool {
        let percent = percent.min(100);
        if percent < self.record.progress {
            trace!(
                task_id = %self.record.task_id,
                percent,
                current = self.record.progress,
                "Discarding out-of-order progress"
            );
            return false;
        }

        self.record.progress = percent;
        self.record.message = message.to_string();
        self.record.updated_at = Utc::now();

        let due = match self.last_write {
            None => true,
            Some(_) if percent == 100 => true,
            Some(at) => at.elapsed() >= self.interval,
        };
        if !due {
            trace!(task_id = %self.record.task_id, percent, "Progress write throttled");
            return false;
        }

        match self.store.put(&self.record) {
            Ok(()) => {
                self.last_write = Some(Instant::now());
                true
            }
            Err(e) => {
                // El registro final se reintenta en complete/fail
                warn!(task_id = %self.record.task_id, error = %e, "Failed to persist progress");
                false
            }
        }
    }

    /// Transición a Completed
    pub fn complete(mut self, download_url: String) -> Result<TaskRecord, StoreError> {
        self.record.status = TaskStatus::Completed;
        self.record.progress = 100;
        self.record.message = "completed".to_string();
        self.record.download_url = Some(download_url);
        self.record.updated_at = Utc::now();
        self.store.put(&self.record)?;
        Ok(self.record)
    }

    /// Transición a Failed; el progreso queda en el último valor reportado
    pub fn fail(mut self, message: &str) -> Result<TaskRecord, StoreError> {
        self.record.status = TaskStatus::Failed;
        self.record.message = if message.trim().is_empty() {
            "generation failed".to_string()
        } else {
            message.to_string()
        };
        self.record.download_url = None;
        self.record.updated_at = Utc::now();
        self.store.put(&self.record)?;
        Ok(self.record)
    }
}
