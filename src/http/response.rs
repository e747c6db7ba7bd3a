//! # Construcción de Responses HTTP
//! src/http/response.rs
//!
//! ## Formato de Response
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Content-Type: application/json\r\n
//! Content-Length: 95\r\n
//! \r\n
//! {"code":200,"message":"task created","data":{"task_id":"...","message":"task created"}}
//! ```
//!
//! Las respuestas de la API van envueltas en `{code, message, data}`.
//! Los headers se guardan en orden de inserción; reemplazar uno existente
//! conserva su posición.

use super::{url, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_PSD: &str = "application/x-photoshop";

#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.add_header(name, value);
        self
    }

    pub fn add_header(&mut self, name: &str, value: &str) {
        match self.headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    pub fn with_body_bytes(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        let len = self.body.len().to_string();
        self.add_header("Content-Length", &len);
        self
    }

    /// JSON sin envelope (health, metrics)
    pub fn json(status: StatusCode, value: &Value) -> Self {
        Self::new(status)
            .with_header("Content-Type", CONTENT_TYPE_JSON)
            .with_body_bytes(value.to_string().into_bytes())
    }

    /// Envelope `{code, message, data}`
    pub fn envelope<T: Serialize>(status: StatusCode, message: &str, data: T) -> Self {
        let data = serde_json::to_value(data).unwrap_or(Value::Null);
        Self::json(
            status,
            &json!({
                "code": status.as_u16(),
                "message": message,
                "data": data,
            }),
        )
    }

    /// Envelope de error con `data: null`
    pub fn error(status: StatusCode, message: &str) -> Self {
        Self::envelope(status, message, Value::Null)
    }

    /// Error reintentable: 503 con `Retry-After`
    pub fn unavailable(message: &str, retry_after_secs: u64) -> Self {
        Self::error(StatusCode::ServiceUnavailable, message)
            .with_header("Retry-After", &retry_after_secs.to_string())
    }

    /// Binario como descarga con nombre de archivo.
    ///
    /// Los nombres no ASCII van en `filename*` (RFC 6266) con un
    /// `filename` ASCII de respaldo.
    pub fn attachment(content_type: &str, file_name: &str, body: Vec<u8>) -> Self {
        let fallback: String = file_name
            .chars()
            .map(|c| match c {
                '"' | '\\' => '_',
                c if c.is_ascii() && !c.is_ascii_control() => c,
                _ => '_',
            })
            .collect();

        let disposition = if fallback == file_name {
            format!("attachment; filename=\"{}\"", fallback)
        } else {
            format!(
                "attachment; filename=\"{}\"; filename*=UTF-8''{}",
                fallback,
                url::encode_component(file_name)
            )
        };

        Self::new(StatusCode::Ok)
            .with_header("Content-Type", content_type)
            .with_header("Content-Disposition", &disposition)
            .with_body_bytes(body)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(self.body.len() + 256);
        result.extend_from_slice(format!("HTTP/1.1 {}\r\n", self.status).as_bytes());

        for (name, value) in &self.headers {
            result.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        if self.header("Content-Length").is_none() {
            result.extend_from_slice(b"Content-Length: 0\r\n");
        }

        result.extend_from_slice(b"\r\n");
        result.extend_from_slice(&self.body);
        result
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}
