//! # Fingerprint de Requests
//! src/jobs/fingerprint.rs
//!
//! Clave de deduplicación: SHA-256 (hex) de la serialización canónica de
//! `{user, project, specifications, assets}`. Canónica quiere decir claves
//! de objeto ordenadas y sin espacios, así que el resultado no depende del
//! orden de los campos ni del proceso que lo calcule.

use crate::jobs::types::GenerationRequest;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Hash hex de 64 caracteres
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefijo corto para logs
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Calcula el fingerprint de un request
pub fn compute(request: &GenerationRequest) -> Result<Fingerprint, serde_json::Error> {
    let subject = json!({
        "user": request.user_or_anonymous(),
        "project": request.project_name,
        "specifications": serde_json::to_value(&request.specifications)?,
        "assets": serde_json::to_value(&request.assets)?,
    });

    let canonical = to_canonical_json(&subject);
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(Fingerprint(to_hex(&digest)))
}

/// Serializa un `Value` con claves ordenadas y sin espacios
pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        Value::Object(map) => {
            let sorted: BTreeMap<&String, String> =
                map.iter().map(|(k, v)| (k, to_canonical_json(v))).collect();
            let items: Vec<String> = sorted
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), v))
                .collect();
            format!("{{{}}}", items.join(","))
        }
        // Display de Value ya es JSON compacto para escalares
        scalar => scalar.to_string(),
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
