//! # PSD Jobs
//! src/lib.rs
//!
//! Servidor HTTP que acepta requests de generación de PSD y los ejecuta en
//! segundo plano, deduplicando requests idénticos con un lock distribuido
//! sobre un store compartido (Redis o memoria).
//!
//! ## Arquitectura
//!
//! - `http`: parsing y construcción de mensajes HTTP/1.x
//! - `router`: método + patrón de path → handler
//! - `server`: listener TCP, un thread por conexión
//! - `jobs`: fingerprint, lock, ciclo de vida del TaskRecord, progreso
//! - `store`: backends key-value con TTL (locks y estado)
//! - `artifacts`: PSD terminados, direccionados por task id
//! - `render`: generador de documentos (colaborador externo)
//! - `metrics`: contadores y latencias
//! - `config` / `telemetry`: arranque
//!
//! ## Ejemplo de uso
//!
//! ```ignore
//! use psd_jobs::config::Config;
//! use psd_jobs::server::{AppState, ConnectionLimits, Server};
//!
//! let config = Config::default();
//! let server = Server::new(state, ConnectionLimits::from_config(&config));
//! server.run(config.address())?;
//! ```

pub mod artifacts;
pub mod config;
pub mod error;
pub mod http;
pub mod jobs;
pub mod metrics;
pub mod render;
pub mod router;
pub mod server;
pub mod store;
pub mod telemetry;
