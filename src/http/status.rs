//! # Códigos de Estado HTTP
//! src/http/status.rs
//!
//! Los códigos que el servicio realmente emite.
//!
//! ## Categorías
//!
//! - **2xx Success**: 200 OK
//! - **4xx Client Error**: 400, 404, 405, 413
//! - **5xx Server Error**: 500, 503

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok = 200,

    /// 204 No Content
    NoContent = 204,

    /// 400 Bad Request - request mal formado o task id inválido
    BadRequest = 400,

    /// 404 Not Found - tarea o artefacto inexistente/expirado
    NotFound = 404,

    /// 405 Method Not Allowed - la ruta existe con otro método
    MethodNotAllowed = 405,

    /// 413 Payload Too Large - body sobre el límite configurado
    PayloadTooLarge = 413,

    /// 500 Internal Server Error
    InternalServerError = 500,

    /// 503 Service Unavailable - store compartido caído o lock en registro
    ServiceUnavailable = 503,
}

impl StatusCode {
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::NoContent => "No Content",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::PayloadTooLarge => "Payload Too Large",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::ServiceUnavailable => "Service Unavailable",
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.as_u16())
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.as_u16())
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.as_u16())
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}
