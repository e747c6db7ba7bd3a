//! # Sistema de Jobs
//! src/jobs/mod.rs
//!
//! Orquestación de la generación de PSD en segundo plano:
//!
//! - `types`: request de generación y TaskRecord
//! - `fingerprint`: clave de deduplicación
//! - `progress`: canal de progreso y reporter con throttling
//! - `executor`: thread dueño de cada tarea
//! - `manager`: submit / status / download
//! - `handlers`: adaptadores HTTP
//!
//! ## Endpoints
//!
//! - `POST /api/design/generate/psd` - Encolar generación (deduplicada)
//! - `GET /api/design/psd/status/:task_id` - Consultar estado
//! - `GET /api/design/psd/download/:task_id?file_name=` - Descargar el PSD

pub mod executor;
pub mod fingerprint;
pub mod handlers;
pub mod manager;
pub mod progress;
pub mod types;

pub use manager::{JobManager, JobManagerConfig, Submission};
pub use types::{GenerationRequest, TaskRecord, TaskStatus};

use crate::http::url;

pub const SUBMIT_ROUTE: &str = "/api/design/generate/psd";
pub const STATUS_ROUTE: &str = "/api/design/psd/status/:task_id";
pub const DOWNLOAD_ROUTE: &str = "/api/design/psd/download/:task_id";

const DOWNLOAD_PREFIX: &str = "/api/design/psd/download";

/// URL de descarga publicada en el TaskRecord
pub fn download_url(task_id: &str, file_name: &str) -> String {
    format!(
        "{}/{}?file_name={}",
        DOWNLOAD_PREFIX,
        task_id,
        url::encode_component(file_name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_url_encodes_file_name() {
        assert_eq!(
            download_url("abc", "Joint Cream_10x4x15cm_202501011200.psd"),
            "/api/design/psd/download/abc?file_name=Joint%20Cream_10x4x15cm_202501011200.psd"
        );
    }

    #[test]
    fn test_download_route_matches_prefix() {
        assert!(DOWNLOAD_ROUTE.starts_with(DOWNLOAD_PREFIX));
    }
}
