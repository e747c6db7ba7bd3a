//! # Logging
//! src/telemetry.rs
//!
//! Subscriber global de `tracing`. El nivel se controla con `RUST_LOG`
//! (por defecto `info`); el formato con `--log-format text|json`.

use crate::config::LogFormat;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
}

/// Instala el subscriber. Llamar una sola vez, al arrancar.
///
/// Retorna error si ya había un subscriber global instalado.
pub fn init_logging(format: LogFormat) -> Result<(), String> {
    let builder = fmt()
        .with_env_filter(env_filter())
        .with_target(true)
        .with_thread_names(true)
        .with_span_events(FmtSpan::NONE)
        .with_timer(fmt::time::ChronoLocal::rfc_3339());

    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
    };
    result.map_err(|e| e.to_string())
}
