//! # Tipos y Estructuras para el Sistema de Jobs
//! src/jobs/types.rs
//!
//! Define el request de generación (lo que el cliente pide) y el
//! TaskRecord (lo que el cliente consulta mientras se genera).

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rango aceptado para largo/ancho/alto, en centímetros
pub const DIMENSION_RANGE_CM: (f64, f64) = (0.1, 1000.0);

/// Rango aceptado para sangrados, en centímetros
pub const BLEED_RANGE_CM: (f64, f64) = (0.0, 100.0);

pub const MAX_PROJECT_NAME_LEN: usize = 128;

/// Estado de una tarea
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Generación en curso
    Processing,

    /// Artefacto disponible para descarga
    Completed,

    /// Falló; `message` explica por qué
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Documento de estado de una tarea.
///
/// Solo el executor dueño de la tarea lo modifica después de crearlo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub status: TaskStatus,
    /// 0-100
    pub progress: u8,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Registro inicial al aceptar una tarea
    pub fn processing(task_id: &str) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.to_string(),
            status: TaskStatus::Processing,
            progress: 0,
            message: "ready".to_string(),
            download_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Dimensiones físicas de la caja, en cm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

/// Configuración de impresión (sangrados), en cm
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintConfig {
    pub bleed_left_right: f64,
    pub bleed_top_bottom: f64,
    pub inner_bleed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specifications {
    pub dimensions: Dimensions,
    #[serde(default)]
    pub print: PrintConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MainPanel {
    pub brand_name: String,
    pub product_name: String,
    pub capacity_info: String,
    pub capacity_info_back: String,
    pub manufacturer: String,
    pub address: String,
    pub selling_points: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfoPanel {
    pub ingredients: String,
    pub manufacturer: String,
    pub origin: String,
    pub warnings: String,
    pub directions: String,
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Texts {
    pub main_panel: MainPanel,
    pub info_panel: InfoPanel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Images {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barcode: Option<ImageRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Assets {
    pub texts: Texts,
    pub images: Images,
}

/// Request de generación de PSD.
///
/// `user_id` no viene en el body: lo completa la capa HTTP a partir de la
/// identidad autenticada (header `X-User-Id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    #[serde(skip)]
    pub user_id: Option<String>,
    pub project_name: String,
    pub specifications: Specifications,
    #[serde(default)]
    pub assets: Assets,
}

impl GenerationRequest {
    /// Valida la estructura antes de cualquier interacción con los stores
    pub fn validate(&self) -> Result<(), ValidationError> {
        let name = self.project_name.trim();
        if name.is_empty() {
            return Err(ValidationError::new("project_name", "must not be empty"));
        }
        if name.chars().count() > MAX_PROJECT_NAME_LEN {
            return Err(ValidationError::new(
                "project_name",
                format!("must be at most {} characters", MAX_PROJECT_NAME_LEN),
            ));
        }

        let dim = &self.specifications.dimensions;
        check_range("specifications.dimensions.length", dim.length, DIMENSION_RANGE_CM)?;
        check_range("specifications.dimensions.width", dim.width, DIMENSION_RANGE_CM)?;
        check_range("specifications.dimensions.height", dim.height, DIMENSION_RANGE_CM)?;

        let print = &self.specifications.print;
        check_range("specifications.print.bleed_left_right", print.bleed_left_right, BLEED_RANGE_CM)?;
        check_range("specifications.print.bleed_top_bottom", print.bleed_top_bottom, BLEED_RANGE_CM)?;
        check_range("specifications.print.inner_bleed", print.inner_bleed, BLEED_RANGE_CM)?;

        if let Some(barcode) = &self.assets.images.barcode {
            if barcode.url.trim().is_empty() {
                return Err(ValidationError::new("assets.images.barcode.url", "must not be empty"));
            }
        }

        Ok(())
    }

    /// Identidad usada para deduplicar
    pub fn user_or_anonymous(&self) -> &str {
        self.user_id
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or("anonymous")
    }
}

fn check_range(field: &'static str, value: f64, (min, max): (f64, f64)) -> Result<(), ValidationError> {
    if !value.is_finite() || value < min || value > max {
        return Err(ValidationError::new(
            field,
            format!("must be within [{}, {}] cm, got {}", min, max, value),
        ));
    }
    Ok(())
}
