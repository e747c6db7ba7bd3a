//! # Configuración del Servidor
//! src/config.rs
//!
//! Configuración por CLI con respaldo en variables de entorno (y `.env`,
//! cargado en `main` antes de parsear).
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./psd_jobs --port 8080 \
//!   --artifact-dir /var/lib/psd \
//!   --redis-url redis://127.0.0.1:6379/0 \
//!   --lock-ttl-secs 1800
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! HTTP_PORT=8080 REDIS_URL=redis://cache:6379 LOG_FORMAT=json ./psd_jobs
//! ```

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Tope para los TTL de locks y registros (7 días)
pub const MAX_TTL_SECS: u64 = 7 * 24 * 3600;

/// Formato de salida de los logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "psd_jobs")]
#[command(about = "Servidor HTTP con generación deduplicada de PSD en segundo plano")]
#[command(version)]
pub struct Config {
    /// Puerto en el que escucha el servidor
    #[arg(short, long, default_value = "8080", env = "HTTP_PORT")]
    pub port: u16,

    /// Host/IP en el que escucha
    #[arg(long, default_value = "127.0.0.1", env = "HTTP_HOST")]
    pub host: String,

    /// Directorio donde se guardan los PSD generados
    #[arg(long, default_value = "./data/artifacts", env = "ARTIFACT_DIR")]
    pub artifact_dir: PathBuf,

    // === Store compartido ===

    /// URL de Redis. Sin ella se usa un store en memoria (una sola instancia)
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Conexiones máximas del pool de Redis
    #[arg(long, default_value = "8", env = "REDIS_POOL_SIZE")]
    pub redis_pool_size: u32,

    /// Prefijo para todas las claves (`{prefix}:lock:...`)
    #[arg(long, env = "REDIS_PREFIX")]
    pub key_prefix: Option<String>,

    // === Tareas ===

    /// TTL del lock por fingerprint, en segundos
    #[arg(long, default_value = "1800", env = "LOCK_TTL_SECS")]
    pub lock_ttl_secs: u64,

    /// Retención de los TaskRecord, en segundos
    #[arg(long, default_value = "1800", env = "TASK_TTL_SECS")]
    pub task_ttl_secs: u64,

    /// Intervalo mínimo entre escrituras de progreso, en milisegundos
    #[arg(long, default_value = "300", env = "PROGRESS_INTERVAL_MS")]
    pub progress_interval_ms: u64,

    /// Edad a partir de la cual un lock sin TaskRecord se considera huérfano
    #[arg(long, default_value = "10", env = "STALE_LOCK_GRACE_SECS")]
    pub stale_lock_grace_secs: u64,

    // === Conexiones ===

    /// Tamaño máximo del body de un request, en bytes
    #[arg(long, default_value = "1048576", env = "MAX_BODY_BYTES")]
    pub max_body_bytes: usize,

    /// Timeout de lectura del socket, en milisegundos
    #[arg(long, default_value = "10000", env = "READ_TIMEOUT_MS")]
    pub read_timeout_ms: u64,

    // === Logging ===

    #[arg(long, value_enum, default_value = "text", env = "LOG_FORMAT")]
    pub log_format: LogFormat,
}

impl Config {
    pub fn new() -> Self {
        Config::parse()
    }

    /// Dirección completa para bind (host:port)
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.lock_ttl_secs == 0 {
            return Err("Lock TTL must be > 0".to_string());
        }
        if self.task_ttl_secs == 0 {
            return Err("Task TTL must be > 0".to_string());
        }
        if self.lock_ttl_secs > MAX_TTL_SECS || self.task_ttl_secs > MAX_TTL_SECS {
            return Err(format!("TTLs must be <= {} seconds", MAX_TTL_SECS));
        }
        if self.stale_lock_grace_secs >= self.lock_ttl_secs {
            return Err("Stale lock grace must be shorter than the lock TTL".to_string());
        }
        if self.redis_pool_size == 0 {
            return Err("Redis pool size must be >= 1".to_string());
        }
        if self.max_body_bytes == 0 {
            return Err("Max body bytes must be > 0".to_string());
        }
        if self.read_timeout_ms == 0 {
            return Err("Read timeout must be > 0".to_string());
        }
        if let Some(url) = &self.redis_url {
            if url.starts_with("rediss://") {
                return Err("Redis over TLS (rediss://) is not supported by this build".to_string());
            }
            if !(url.starts_with("redis://") || url.starts_with("unix://")) {
                return Err(format!("Redis URL has an unsupported scheme: {}", url));
            }
        }
        Ok(())
    }

    /// Loguea la configuración efectiva (sin credenciales)
    pub fn log_summary(&self) {
        info!(
            address = %self.address(),
            artifact_dir = %self.artifact_dir.display(),
            store = if self.redis_url.is_some() { "redis" } else { "memory" },
            key_prefix = self.key_prefix.as_deref().unwrap_or("-"),
            lock_ttl_secs = self.lock_ttl_secs,
            task_ttl_secs = self.task_ttl_secs,
            progress_interval_ms = self.progress_interval_ms,
            stale_lock_grace_secs = self.stale_lock_grace_secs,
            max_body_bytes = self.max_body_bytes,
            read_timeout_ms = self.read_timeout_ms,
            "Configuration loaded"
        );
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            artifact_dir: PathBuf::from("./data/artifacts"),
            redis_url: None,
            redis_pool_size: 8,
            key_prefix: None,
            lock_ttl_secs: 1800,
            task_ttl_secs: 1800,
            progress_interval_ms: 300,
            stale_lock_grace_secs: 10,
            max_body_bytes: 1024 * 1024,
            read_timeout_ms: 10_000,
            log_format: LogFormat::Text,
        }
    }
}
