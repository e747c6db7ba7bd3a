//! # Parsing de Requests HTTP/1.x
//! src/http/request.rs
//!
//! ## Formato de un Request
//!
//! ```text
//! POST /api/design/generate/psd HTTP/1.1\r\n
//! Content-Type: application/json\r\n
//! Content-Length: 57\r\n
//! X-User-Id: user-42\r\n
//! \r\n
//! {"project_name": "Joint Cream", "specifications": {...}}
//! ```
//!
//! ## Componentes
//!
//! 1. **Request Line**: `METHOD /path?query HTTP/1.x`
//! 2. **Headers**: Pares `Name: Value`, nombres sin distinción de mayúsculas
//! 3. **Empty Line**: `\r\n\r\n` separa headers del body
//! 4. **Body**: exactamente `Content-Length` bytes
//!
//! El server lee del socket hasta tener el head completo (`head_len`) y
//! luego hasta `Content-Length`; `parse` recibe el request entero.

use super::url;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    GET,
    HEAD,
    POST,
}

impl Method {
    fn from_str(s: &str) -> Result<Self, ParseError> {
        match s {
            "GET" => Ok(Method::GET),
            "HEAD" => Ok(Method::HEAD),
            "POST" => Ok(Method::POST),
            _ => Err(ParseError::UnsupportedMethod(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::POST => "POST",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query_params: HashMap<String, String>,
    /// Nombres normalizados a minúsculas
    headers: HashMap<String, String>,
    version: String,
    body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Incomplete HTTP request")]
    IncompleteRequest,
    #[error("Invalid request line format")]
    InvalidRequestLine,
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),
    #[error("Invalid HTTP version: {0}")]
    InvalidHttpVersion(String),
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
    #[error("Invalid Content-Length: {0}")]
    InvalidContentLength(String),
    #[error("Empty request")]
    EmptyRequest,
}

/// Largo del head (incluyendo `\r\n\r\n`) si ya llegó completo
pub fn head_len(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n").map(|pos| pos + 4)
}

/// Content-Length declarado en un head crudo; 0 si no viene
pub fn content_length(head: &[u8]) -> Result<usize, ParseError> {
    let text = std::str::from_utf8(head).map_err(|_| ParseError::InvalidRequestLine)?;
    for line in text.split("\r\n").skip(1) {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                let value = value.trim();
                return value
                    .parse()
                    .map_err(|_| ParseError::InvalidContentLength(value.to_string()));
            }
        }
    }
    Ok(0)
}

impl Request {
    /// Parsea un request completo (head + body)
    pub fn parse(buffer: &[u8]) -> Result<Self, ParseError> {
        if buffer.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(ParseError::EmptyRequest);
        }

        let head_end = head_len(buffer).ok_or(ParseError::IncompleteRequest)?;
        let head = std::str::from_utf8(&buffer[..head_end - 4]).map_err(|_| ParseError::InvalidRequestLine)?;

        let mut lines = head.split("\r\n");
        let request_line = lines.next().ok_or(ParseError::IncompleteRequest)?;
        let (method, path, query_params, version) = Self::parse_request_line(request_line)?;
        let headers = Self::parse_headers(lines)?;

        let declared = match headers.get("content-length") {
            Some(value) => value
                .parse::<usize>()
                .map_err(|_| ParseError::InvalidContentLength(value.clone()))?,
            None => 0,
        };
        let available = &buffer[head_end..];
        if available.len() < declared {
            return Err(ParseError::IncompleteRequest);
        }

        Ok(Request {
            method,
            path,
            query_params,
            headers,
            version,
            body: available[..declared].to_vec(),
        })
    }

    fn parse_request_line(line: &str) -> Result<(Method, String, HashMap<String, String>, String), ParseError> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(ParseError::InvalidRequestLine);
        }

        let method = Method::from_str(parts[0])?;
        let (path, query_params) = Self::parse_path_and_query(parts[1]);

        let version = parts[2].to_string();
        if version != "HTTP/1.0" && version != "HTTP/1.1" {
            return Err(ParseError::InvalidHttpVersion(version));
        }

        Ok((method, path, query_params, version))
    }

    fn parse_path_and_query(path_with_query: &str) -> (String, HashMap<String, String>) {
        match path_with_query.split_once('?') {
            Some((path, query)) => (path.to_string(), Self::parse_query_string(query)),
            None => (path_with_query.to_string(), HashMap::new()),
        }
    }

    fn parse_query_string(query: &str) -> HashMap<String, String> {
        query
            .split('&')
            .filter(|param| !param.is_empty())
            .map(|param| match param.split_once('=') {
                Some((key, value)) => (url::decode(key), url::decode(value)),
                None => (url::decode(param), String::new()),
            })
            .collect()
    }

    fn parse_headers<'a>(lines: impl Iterator<Item = &'a str>) -> Result<HashMap<String, String>, ParseError> {
        let mut headers = HashMap::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ParseError::InvalidHeader(line.to_string()))?;
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
        Ok(headers)
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_params(&self) -> &HashMap<String, String> {
        &self.query_params
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(|s| s.as_str())
    }

    /// Búsqueda sin distinción de mayúsculas
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}
