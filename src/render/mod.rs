//! # Generación de Documentos
//! src/render/mod.rs
//!
//! El motor de render es un colaborador externo: recibe el request y un
//! `ProgressSink`, y devuelve los bytes del PSD o un error. La
//! orquestación solo conoce el trait `DocumentGenerator`.
//!
//! `CanvasGenerator` es la implementación incluida: arma el lienzo del
//! troquel con la geometría de producción y escribe un PSD RGB en blanco
//! con las líneas de pliegue marcadas.

pub mod layout;
pub mod psd;

pub use layout::CanvasLayout;

use crate::error::GenerationError;
use crate::jobs::progress::ProgressSink;
use crate::jobs::types::GenerationRequest;
use tracing::debug;

pub trait DocumentGenerator: Send + Sync {
    fn generate(&self, request: &GenerationRequest, progress: &ProgressSink) -> Result<Vec<u8>, GenerationError>;
}

#[derive(Debug, Default, Clone)]
pub struct CanvasGenerator;

impl CanvasGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentGenerator for CanvasGenerator {
    fn generate(&self, request: &GenerationRequest, progress: &ProgressSink) -> Result<Vec<u8>, GenerationError> {
        progress.report(1, "initializing canvas");
        let layout = CanvasLayout::from_specifications(&request.specifications)?;
        debug!(width = layout.width, height = layout.height, "Canvas computed");

        progress.report(5, "creating base layers");
        progress.report(10, "drawing dieline");
        progress.report(40, "generating guides");
        progress.report(50, "rendering text");
        progress.report(70, "saving document");

        // 70..=89 mientras se escriben las filas
        let mut last = 70u8;
        let bytes = psd::write_document(&layout, &mut |fraction| {
            let percent = 70 + (fraction.clamp(0.0, 1.0) * 19.0) as u8;
            if percent > last {
                last = percent;
                progress.report(percent, "saving document");
            }
        });

        progress.report(90, "generation complete, preparing output");
        Ok(bytes)
    }
}
