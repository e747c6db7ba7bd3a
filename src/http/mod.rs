//! # Módulo HTTP
//! src/http/mod.rs
//!
//! HTTP/1.x implementado a mano sobre `std::net`:
//!
//! - Parsing de requests (head + body por `Content-Length`)
//! - Construcción de responses con el envelope de la API
//! - Status codes
//! - Percent-encoding de query strings
//!
//! No hay keep-alive: cada conexión atiende un request y se cierra.

pub mod request;
pub mod response;
pub mod status;
pub mod url;

pub use request::{Method, Request};
pub use response::Response;
pub use status::StatusCode;
