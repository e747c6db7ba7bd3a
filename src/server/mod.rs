//! # Módulo del Servidor HTTP
//! src/server/mod.rs
//!
//! Servidor TCP thread-per-connection:
//! 1. Escucha en un puerto
//! 2. Acepta conexiones y lanza un thread por cada una
//! 3. Lee el request completo (head + body por `Content-Length`)
//! 4. Despacha al router y escribe la response
//!
//! Las tareas de generación no corren en estos threads: el handler de
//! submit retorna apenas el `JobManager` acepta el request.

pub mod routes;
pub mod tcp;

pub use tcp::{ConnectionLimits, Server};

use crate::jobs::JobManager;
use crate::metrics::MetricsCollector;

/// Estado compartido por todos los handlers
pub struct AppState {
    pub jobs: JobManager,
    pub metrics: MetricsCollector,
}
