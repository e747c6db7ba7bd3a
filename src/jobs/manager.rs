//! # Gestor Central de Jobs
//! src/jobs/manager.rs
//!
//! Las tres operaciones de borde: `submit`, `status` y `download`.
//!
//! ## Submit
//!
//! 1. Validar (sin tocar ningún store).
//! 2. Fingerprint del request.
//! 3. `set_if_absent(lock:{fp}, candidato)`.
//! 4. Si se adquirió: registro inicial + spawn del executor.
//! 5. Si no: se inspecciona al dueño actual del lock.
//!
//! | Dueño del lock                       | Respuesta                          |
//! |--------------------------------------|------------------------------------|
//! | desapareció                          | reintentar adquisición             |
//! | registro Processing                  | su task id (deduplicado)           |
//! | registro terminal                    | lock huérfano: liberar y reintentar|
//! | sin registro, lock joven (< gracia)  | esperar su registro, luego `Busy`  |
//! | sin registro, lock viejo (>= gracia) | lock huérfano: liberar y reintentar|

use crate::artifacts::{self, ArtifactStore};
use crate::error::{DownloadError, StoreError, SubmitError};
use crate::jobs::executor::{JobContext, JobExecutor};
use crate::jobs::fingerprint::{self, Fingerprint};
use crate::jobs::types::{GenerationRequest, TaskRecord, TaskStatus};
use crate::metrics::MetricsCollector;
use crate::render::DocumentGenerator;
use crate::store::{KeySpace, KeyValueStore, LockStore, TaskStatusStore};
use chrono::Utc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Máximo de locks huérfanos que un submit reclama antes de rendirse
const MAX_RECLAIMS: usize = 3;

/// Tope de vueltas del loop de adquisición
const MAX_ATTEMPTS: usize = 64;

/// Espera máxima a que el dueño de un lock recién tomado escriba su registro
const REGISTRATION_WAIT: Duration = Duration::from_millis(250);
const REGISTRATION_POLL: Duration = Duration::from_millis(10);

/// Configuración del Job Manager
#[derive(Debug, Clone)]
pub struct JobManagerConfig {
    pub key_prefix: Option<String>,
    pub lock_ttl: Duration,
    pub task_ttl: Duration,
    pub progress_interval: Duration,
    pub stale_lock_grace: Duration,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            key_prefix: None,
            lock_ttl: Duration::from_secs(1800),
            task_ttl: Duration::from_secs(1800),
            progress_interval: Duration::from_millis(300),
            stale_lock_grace: Duration::from_secs(10),
        }
    }
}

impl JobManagerConfig {
    /// Crea una configuración desde el Config principal
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            key_prefix: config.key_prefix.clone(),
            lock_ttl: Duration::from_secs(config.lock_ttl_secs),
            task_ttl: Duration::from_secs(config.task_ttl_secs),
            progress_interval: Duration::from_millis(config.progress_interval_ms),
            stale_lock_grace: Duration::from_secs(config.stale_lock_grace_secs),
        }
    }
}

/// Resultado de un submit aceptado
#[derive(Debug)]
pub struct Submission {
    pub task_id: String,
    /// `true` si este submit creó la tarea; `false` si se deduplicó
    pub created: bool,
    /// Handle del thread dueño (solo cuando `created`)
    pub handle: Option<JoinHandle<TaskStatus>>,
}

impl Submission {
    pub fn message(&self) -> &'static str {
        if self.created {
            "task created"
        } else {
            "task already in progress"
        }
    }
}

/// Estado del dueño de un lock que no pudimos tomar
enum OwnerState {
    Vanished,
    Active(String),
    Registering,
    Stale(String),
}

pub struct JobManager {
    locks: LockStore,
    statuses: TaskStatusStore,
    artifacts: Arc<dyn ArtifactStore>,
    executor: JobExecutor,
    metrics: MetricsCollector,
    stale_lock_grace: Duration,
}

impl JobManager {
    pub fn new(
        config: JobManagerConfig,
        kv: Arc<dyn KeyValueStore>,
        artifacts: Arc<dyn ArtifactStore>,
        generator: Arc<dyn DocumentGenerator>,
        metrics: MetricsCollector,
    ) -> Self {
        let keys = KeySpace::new(config.key_prefix.clone());
        let locks = LockStore::new(Arc::clone(&kv), keys.clone(), config.lock_ttl);
        let statuses = TaskStatusStore::new(kv, keys, config.task_ttl);
        let executor = JobExecutor::new(
            generator,
            Arc::clone(&artifacts),
            statuses.clone(),
            locks.clone(),
            metrics.clone(),
            config.progress_interval,
        );

        Self {
            locks,
            statuses,
            artifacts,
            executor,
            metrics,
            stale_lock_grace: config.stale_lock_grace,
        }
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Acepta un request de generación o devuelve la tarea que ya lo atiende
    pub fn submit(&self, request: GenerationRequest) -> Result<Submission, SubmitError> {
        request.validate()?;
        let fp = fingerprint::compute(&request).map_err(StoreError::from)?;

        let deadline = Instant::now() + REGISTRATION_WAIT;
        let mut reclaims = 0;

        for _ in 0..MAX_ATTEMPTS {
            let candidate = new_task_id();
            if self.locks.try_acquire(fp.as_str(), &candidate)? {
                debug!(task_id = %candidate, fingerprint = %fp.short(), "Lock acquired");
                return self.start(fp, candidate, request);
            }

            match self.inspect_owner(&fp)? {
                OwnerState::Active(owner) => {
                    info!(task_id = %owner, fingerprint = %fp.short(), "Duplicate request joined running task");
                    self.metrics.record_task_deduplicated();
                    return Ok(Submission {
                        task_id: owner,
                        created: false,
                        handle: None,
                    });
                }
                OwnerState::Vanished => continue,
                OwnerState::Registering => {
                    if Instant::now() >= deadline {
                        warn!(fingerprint = %fp.short(), "Lock owner has not registered its task yet");
                        return Err(SubmitError::Busy);
                    }
                    thread::sleep(REGISTRATION_POLL);
                }
                OwnerState::Stale(owner) => {
                    if reclaims >= MAX_RECLAIMS {
                        break;
                    }
                    reclaims += 1;
                    warn!(task_id = %owner, fingerprint = %fp.short(), "Reclaiming stale lock");
                    self.locks.release(fp.as_str(), &owner)?;
                }
            }
        }

        Err(SubmitError::Busy)
    }

    fn inspect_owner(&self, fp: &Fingerprint) -> Result<OwnerState, StoreError> {
        let Some(owner) = self.locks.read(fp.as_str())? else {
            return Ok(OwnerState::Vanished);
        };

        match self.statuses.get(&owner)? {
            Some(record) if !record.is_terminal() => Ok(OwnerState::Active(owner)),
            // Terminal pero con lock: la liberación falló en su momento
            Some(_) => Ok(OwnerState::Stale(owner)),
            None => match self.locks.age(fp.as_str())? {
                None => Ok(OwnerState::Vanished),
                Some(age) if age < self.stale_lock_grace => Ok(OwnerState::Registering),
                Some(_) => Ok(OwnerState::Stale(owner)),
            },
        }
    }

    /// Camino del dueño: registro inicial y spawn
    fn start(&self, fp: Fingerprint, task_id: String, request: GenerationRequest) -> Result<Submission, SubmitError> {
        let record = TaskRecord::processing(&task_id);
        if let Err(e) = self.statuses.put(&record) {
            error!(task_id = %task_id, error = %e, "Failed to register task");
            if let Err(release_err) = self.locks.release(fp.as_str(), &task_id) {
                warn!(task_id = %task_id, error = %release_err, "Failed to release lock after registration failure");
            }
            return Err(e.into());
        }

        info!(
            task_id = %task_id,
            fingerprint = %fp.short(),
            project = %request.project_name,
            "Task accepted"
        );
        self.metrics.record_task_submitted();

        let job = JobContext {
            task_id: task_id.clone(),
            fingerprint: fp.clone(),
            request,
        };

        let handle = match self.executor.spawn(job, record.clone()) {
            Ok(handle) => Some(handle),
            Err(e) => {
                // Sin thread no hay tarea: queda Failed y se libera el lock
                error!(task_id = %task_id, error = %e, "Failed to spawn task thread");
                let mut failed = record;
                failed.status = TaskStatus::Failed;
                failed.message = format!("could not start task: {}", e);
                failed.updated_at = Utc::now();
                if let Err(store_err) = self.statuses.put(&failed) {
                    error!(task_id = %task_id, error = %store_err, "Failed to persist failed record");
                }
                if let Err(release_err) = self.locks.release(fp.as_str(), &task_id) {
                    warn!(task_id = %task_id, error = %release_err, "Failed to release lock");
                }
                None
            }
        };

        Ok(Submission {
            task_id,
            created: true,
            handle,
        })
    }

    /// `None` cubre "nunca existió", "expiró" e ids mal formados
    pub fn status(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        if artifacts::validate_task_id(task_id).is_err() {
            return Ok(None);
        }
        self.statuses.get(task_id)
    }

    /// Bytes del artefacto; el task id se valida antes de tocar el disco
    pub fn download(&self, task_id: &str) -> Result<Vec<u8>, DownloadError> {
        artifacts::validate_task_id(task_id)?;
        self.artifacts.read(task_id)?.ok_or(DownloadError::NotFound)
    }
}

fn new_task_id() -> String {
    Uuid::new_v4().simple().to_string()
}
