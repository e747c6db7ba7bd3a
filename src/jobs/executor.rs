//! # Ejecutor de Tareas
//! src/jobs/executor.rs
//!
//! Cada tarea aceptada corre en su propio thread (dueño del TaskRecord).
//! El generador corre en un thread hijo con scope y solo se comunica con
//! el dueño por el canal de `JobEvent`:
//!
//! ```text
//! owner thread                         generator thread
//! ────────────                         ────────────────
//! ProgressReporter ◄── Progress ────── ProgressSink::report
//!                  ◄── Finished ────── resultado / panic capturado
//! artifact write
//! complete / fail
//! release lock (best effort)
//! ```
//!
//! Ningún panic sale del thread: se capturan en ambos niveles y terminan
//! como `Failed`.

use crate::artifacts::{self, ArtifactStore};
use crate::error::GenerationError;
use crate::jobs::fingerprint::Fingerprint;
use crate::jobs::progress::{JobEvent, ProgressReporter, ProgressSink};
use crate::jobs::types::{GenerationRequest, TaskRecord, TaskStatus};
use crate::metrics::MetricsCollector;
use crate::render::DocumentGenerator;
use crate::store::{LockStore, TaskStatusStore};
use chrono::{Local, Utc};
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Lo que necesita el thread dueño para ejecutar una tarea
#[derive(Debug, Clone)]
pub struct JobContext {
    pub task_id: String,
    pub fingerprint: Fingerprint,
    pub request: GenerationRequest,
}

#[derive(Clone)]
pub struct JobExecutor {
    generator: Arc<dyn DocumentGenerator>,
    artifacts: Arc<dyn ArtifactStore>,
    statuses: TaskStatusStore,
    locks: LockStore,
    metrics: MetricsCollector,
    progress_interval: Duration,
}

impl JobExecutor {
    pub fn new(
        generator: Arc<dyn DocumentGenerator>,
        artifacts: Arc<dyn ArtifactStore>,
        statuses: TaskStatusStore,
        locks: LockStore,
        metrics: MetricsCollector,
        progress_interval: Duration,
    ) -> Self {
        Self {
            generator,
            artifacts,
            statuses,
            locks,
            metrics,
            progress_interval,
        }
    }

    /// Inicia la tarea en un thread propio. El handle es opcional de usar:
    /// la tarea termina (y libera su lock) aunque nadie haga `join`.
    pub fn spawn(&self, job: JobContext, record: TaskRecord) -> io::Result<JoinHandle<TaskStatus>> {
        let executor = self.clone();
        let name = format!("psd-task-{}", &job.task_id[..8.min(job.task_id.len())]);

        self.metrics.record_task_started();
        let spawned = thread::Builder::new().name(name).spawn(move || {
            let initial = record.clone();
            let status = panic::catch_unwind(AssertUnwindSafe(|| executor.execute(&job, record)))
                .unwrap_or_else(|payload| {
                    error!(
                        task_id = %job.task_id,
                        panic = %panic_message(payload.as_ref()),
                        "Task owner panicked"
                    );
                    executor.fail_after_panic(initial, "internal error")
                });

            executor.release_lock(&job);
            executor.metrics.record_task_finished(status);
            status
        });

        if spawned.is_err() {
            self.metrics.record_task_finished(TaskStatus::Failed);
        }
        spawned
    }

    fn execute(&self, job: &JobContext, record: TaskRecord) -> TaskStatus {
        info!(task_id = %job.task_id, fingerprint = %job.fingerprint.short(), "Task started");
        let mut reporter = ProgressReporter::new(self.statuses.clone(), record, self.progress_interval);

        match self.produce(job, &mut reporter) {
            Ok(download_url) => {
                match reporter.complete(download_url) {
                    Ok(record) => info!(task_id = %job.task_id, url = ?record.download_url, "Task completed"),
                    Err(e) => error!(task_id = %job.task_id, error = %e, "Failed to persist completed record"),
                }
                TaskStatus::Completed
            }
            Err(e) => {
                error!(task_id = %job.task_id, error = %e, "Generation failed");
                if let Err(store_err) = reporter.fail(&e.to_string()) {
                    error!(task_id = %job.task_id, error = %store_err, "Failed to persist failed record");
                }
                TaskStatus::Failed
            }
        }
    }

    /// Corre el generador, guarda el artefacto y retorna la URL de descarga
    fn produce(&self, job: &JobContext, reporter: &mut ProgressReporter) -> Result<String, GenerationError> {
        let bytes = self.run_generator(job, reporter)?;

        self.artifacts
            .write(&job.task_id, &bytes)
            .map_err(|e| GenerationError::new(format!("failed to store artifact: {}", e)))?;
        debug!(task_id = %job.task_id, bytes = bytes.len(), "Artifact stored");

        let file_name = artifacts::download_file_name(
            &job.request.project_name,
            &job.request.specifications.dimensions,
            Local::now(),
        );
        Ok(super::download_url(&job.task_id, &file_name))
    }

    fn run_generator(&self, job: &JobContext, reporter: &mut ProgressReporter) -> Result<Vec<u8>, GenerationError> {
        let (sink, rx) = ProgressSink::channel();
        let generator = self.generator.as_ref();
        let request = &job.request;

        thread::scope(|scope| {
            let worker = thread::Builder::new()
                .name(format!("psd-gen-{}", &job.task_id[..8.min(job.task_id.len())]))
                .spawn_scoped(scope, move || {
                    let result = panic::catch_unwind(AssertUnwindSafe(|| generator.generate(request, &sink)))
                        .unwrap_or_else(|payload| {
                            Err(GenerationError::new(format!(
                                "generator panicked: {}",
                                panic_message(payload.as_ref())
                            )))
                        });
                    sink.finish(result);
                });

            if let Err(e) = worker {
                return Err(GenerationError::new(format!("could not start generator: {}", e)));
            }

            // El sink vive en el worker: el canal se cierra cuando termina
            let mut outcome = None;
            for event in rx.iter() {
                match event {
                    JobEvent::Progress { percent, message } => {
                        reporter.report(percent, &message);
                    }
                    JobEvent::Finished(result) => outcome = Some(result),
                }
            }

            outcome.unwrap_or_else(|| Err(GenerationError::new("generator exited without a result")))
        })
    }

    /// Cierra la tarea cuando el dueño perdió su reporter por un panic.
    ///
    /// Parte del último registro persistido para no retroceder el progreso;
    /// si ya es terminal no se toca.
    fn fail_after_panic(&self, initial: TaskRecord, message: &str) -> TaskStatus {
        let mut record = match self.statuses.get(&initial.task_id) {
            Ok(Some(stored)) if stored.is_terminal() => {
                debug!(task_id = %stored.task_id, status = stored.status.as_str(), "Record already terminal");
                return stored.status;
            }
            Ok(Some(stored)) => stored,
            Ok(None) => initial,
            Err(e) => {
                warn!(task_id = %initial.task_id, error = %e, "Could not read record after panic");
                initial
            }
        };

        record.status = TaskStatus::Failed;
        record.message = message.to_string();
        record.download_url = None;
        record.updated_at = Utc::now();
        if let Err(e) = self.statuses.put(&record) {
            error!(task_id = %record.task_id, error = %e, "Failed to persist failed record");
        }
        TaskStatus::Failed
    }

    /// Libera el lock si sigue siendo nuestro. Nunca reintenta: el TTL
    /// lo vence de todas formas.
    fn release_lock(&self, job: &JobContext) {
        match self.locks.release(job.fingerprint.as_str(), &job.task_id) {
            Ok(true) => debug!(task_id = %job.task_id, fingerprint = %job.fingerprint.short(), "Lock released"),
            Ok(false) => warn!(
                task_id = %job.task_id,
                fingerprint = %job.fingerprint.short(),
                "Lock already expired or owned by another task"
            ),
            Err(e) => warn!(
                task_id = %job.task_id,
                fingerprint = %job.fingerprint.short(),
                error = %e,
                "Failed to release lock, leaving it to expire"
            ),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
