//! # Errores del Servicio
//! src/error.rs
//!
//! Taxonomía de errores de la orquestación de trabajos:
//!
//! - `StoreError`: el store compartido (locks / estado) no respondió.
//!   Siempre se considera reintentable.
//! - `ValidationError`: request mal formado, se rechaza antes de tocar
//!   cualquier store.
//! - `ArtifactError`: direccionamiento o persistencia de artefactos.
//! - `GenerationError`: fallo reportado por el generador externo.
//! - `SubmitError` / `DownloadError`: resultados de las operaciones de borde.

use thiserror::Error;

/// Fallo del store compartido (Redis o en memoria)
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt store value: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(e: r2d2::Error) -> Self {
        StoreError::Unavailable(format!("connection pool: {}", e))
    }
}

/// Campo inválido en un request de generación
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("invalid task id")]
    InvalidTaskId,

    #[error("artifact i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// Error reportado por el generador de documentos
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct GenerationError(pub String);

impl GenerationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),

    /// Existe un lock sin TaskRecord todavía dentro del periodo de gracia
    #[error("a task for this request is being registered, retry shortly")]
    Busy,
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid task id")]
    InvalidTaskId,

    #[error("artifact not found")]
    NotFound,

    #[error("artifact storage failure: {0}")]
    Storage(std::io::Error),
}

impl From<ArtifactError> for DownloadError {
    fn from(e: ArtifactError) -> Self {
        match e {
            ArtifactError::InvalidTaskId => DownloadError::InvalidTaskId,
            ArtifactError::Io(io) => DownloadError::Storage(io),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new("specifications.dimensions.length", "must be within [0.1, 1000] cm");
        assert_eq!(
            err.to_string(),
            "specifications.dimensions.length: must be within [0.1, 1000] cm"
        );
    }

    #[test]
    fn test_artifact_error_maps_to_download_error() {
        assert!(matches!(
            DownloadError::from(ArtifactError::InvalidTaskId),
            DownloadError::InvalidTaskId
        ));
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(
            DownloadError::from(ArtifactError::Io(io)),
            DownloadError::Storage(_)
        ));
    }

    #[test]
    fn test_store_error_wraps_into_submit_error() {
        let err: SubmitError = StoreError::Unavailable("connection refused".into()).into();
        assert!(matches!(err, SubmitError::StoreUnavailable(_)));
        assert!(err.to_string().contains("connection refused"));
    }
}
