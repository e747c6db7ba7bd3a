//! # Geometría del Troquel
//! src/render/layout.rs
//!
//! Convierte las dimensiones físicas (cm) en el lienzo en píxeles a 300 DPI.
//!
//! ```text
//!  X = largo, Y = alto, Z = ancho
//!  A = sangrado lateral, B = sangrado sup/inf, C = sangrado interno
//!
//!  ancho total = 2X + 2Z + 2A
//!  alto total  = max(Y + 2Z + 2B - 4C, B + 2Z + Y)
//! ```

use crate::error::GenerationError;
use crate::jobs::types::Specifications;

pub const DPI: u32 = 300;

/// Límite de ancho/alto de un PSD versión 1
pub const MAX_PSD_DIMENSION: u32 = 30_000;

pub fn cm_to_px(cm: f64) -> u32 {
    ((cm / 2.54) * DPI as f64).round().max(0.0) as u32
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanvasLayout {
    pub width: u32,
    pub height: u32,
    /// Columnas de pliegue (bordes de paneles)
    pub vertical_folds: Vec<u32>,
    /// Filas de pliegue (tapas superior e inferior)
    pub horizontal_folds: Vec<u32>,
}

impl CanvasLayout {
    pub fn from_specifications(specs: &Specifications) -> Result<Self, GenerationError> {
        let x = cm_to_px(specs.dimensions.length) as i64;
        let y = cm_to_px(specs.dimensions.height) as i64;
        let z = cm_to_px(specs.dimensions.width) as i64;
        let a = cm_to_px(specs.print.bleed_left_right) as i64;
        let b = cm_to_px(specs.print.bleed_top_bottom) as i64;
        let c = cm_to_px(specs.print.inner_bleed) as i64;

        let width = 2 * x + 2 * z + 2 * a;
        let height = (y + 2 * z + 2 * b - 4 * c).max(b + 2 * z + y);

        if width <= 0 || height <= 0 {
            return Err(GenerationError::new("canvas would be empty"));
        }
        if width > MAX_PSD_DIMENSION as i64 || height > MAX_PSD_DIMENSION as i64 {
            return Err(GenerationError::new(format!(
                "canvas {}x{} px exceeds the PSD limit of {} px",
                width, height, MAX_PSD_DIMENSION
            )));
        }

        let inside_width = |v: &i64| *v > 0 && *v < width;
        let inside_height = |v: &i64| *v > 0 && *v < height;

        let vertical_folds = [a, a + z, a + z + x, a + 2 * z + x, a + 2 * z + 2 * x]
            .iter()
            .filter(|v| inside_width(v))
            .map(|v| *v as u32)
            .collect();
        let horizontal_folds = [b, b + z, b + z + y, b + 2 * z + y]
            .iter()
            .filter(|v| inside_height(v))
            .map(|v| *v as u32)
            .collect();

        Ok(Self {
            width: width as u32,
            height: height as u32,
            vertical_folds,
            horizontal_folds,
        })
    }
}
