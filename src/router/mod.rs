//! # Sistema de Routing
//! src/router/mod.rs
//!
//! Mapea método + path a handlers.
//!
//! ## Arquitectura
//!
//! ```text
//! Request → Router → Handler(state, request, params) → Response
//! ```
//!
//! Los patrones admiten segmentos `:nombre`, que se capturan en `Params`:
//! `/api/design/psd/status/:task_id` matchea `/api/design/psd/status/abc`.
//!
//! - Ningún patrón matchea el path → 404
//! - El path matchea pero con otro método → 405 con header `Allow`

use crate::http::{Method, Request, Response, StatusCode};

pub const SERVER_NAME: &str = "psd-jobs";

/// Un handler recibe el estado compartido, el request y los parámetros del path
pub type Handler<S> = fn(&S, &Request, &Params) -> Response;

/// Segmentos capturados de un patrón
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

struct Route<S> {
    method: Method,
    pattern: String,
    segments: Vec<Segment>,
    handler: Handler<S>,
}

impl<S> Route<S> {
    fn matches(&self, path: &str) -> Option<Params> {
        let parts: Vec<&str> = split_path(path).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = Vec::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if part.is_empty() => return None,
                Segment::Param(name) => params.push((name.clone(), part.to_string())),
            }
        }
        Some(Params(params))
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.trim_matches('/').split('/').filter(|s| !s.is_empty())
}

pub struct Router<S> {
    routes: Vec<Route<S>>,
}

impl<S> Router<S> {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    pub fn register(&mut self, method: Method, pattern: &str, handler: Handler<S>) {
        let segments = split_path(pattern)
            .map(|s| match s.strip_prefix(':') {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(s.to_string()),
            })
            .collect();

        self.routes.push(Route {
            method,
            pattern: pattern.to_string(),
            segments,
            handler,
        });
    }

    pub fn get(&mut self, pattern: &str, handler: Handler<S>) {
        self.register(Method::GET, pattern, handler);
    }

    pub fn post(&mut self, pattern: &str, handler: Handler<S>) {
        self.register(Method::POST, pattern, handler);
    }

    /// Despacha el request. Retorna también el patrón que lo atendió (o
    /// `"unmatched"`), que es lo que se usa como etiqueta en las métricas.
    pub fn route(&self, state: &S, request: &Request) -> (Response, &str) {
        let mut allowed = Vec::new();

        for route in &self.routes {
            let Some(params) = route.matches(request.path()) else {
                continue;
            };
            if route.method == request.method() {
                let mut response = (route.handler)(state, request, &params);
                add_common_headers(&mut response);
                return (response, route.pattern.as_str());
            }
            allowed.push(route.method.as_str());
        }

        let mut response = if allowed.is_empty() {
            Response::error(
                StatusCode::NotFound,
                &format!("route not found: {}", request.path()),
            )
        } else {
            Response::error(StatusCode::MethodNotAllowed, "method not allowed")
                .with_header("Allow", &allowed.join(", "))
        };
        add_common_headers(&mut response);
        (response, "unmatched")
    }
}

impl<S> Default for Router<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Headers comunes a todas las respuestas
pub fn add_common_headers(response: &mut Response) {
    response.add_header("Server", SERVER_NAME);
    response.add_header("Connection", "close");
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(&'static str);

    fn echo_task(state: &Counter, _req: &Request, params: &Params) -> Response {
        Response::envelope(
            StatusCode::Ok,
            state.0,
            serde_json::json!({ "task_id": params.get("task_id") }),
        )
    }

    fn health(_state: &Counter, _req: &Request, _params: &Params) -> Response {
        Response::json(StatusCode::Ok, &serde_json::json!({ "status": "ok" }))
    }

    fn router() -> Router<Counter> {
        let mut router = Router::new();
        router.get("/health", health);
        router.get("/api/design/psd/status/:task_id", echo_task);
        router
    }

    fn request(raw: &[u8]) -> Request {
        Request::parse(raw).unwrap()
    }

    fn body(response: &Response) -> serde_json::Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[test]
    fn test_literal_route() {
        let router = router();
        let (response, pattern) = router.route(&Counter("ok"), &request(b"GET /health HTTP/1.1\r\n\r\n"));
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(pattern, "/health");
        assert_eq!(response.header("Server"), Some(SERVER_NAME));
        assert_eq!(response.header("Connection"), Some("close"));
    }

    #[test]
    fn test_param_capture() {
        let raw = b"GET /api/design/psd/status/abc123 HTTP/1.1\r\n\r\n";
        let router = router();
        let (response, pattern) = router.route(&Counter("found"), &request(raw));
        assert_eq!(pattern, "/api/design/psd/status/:task_id");
        let json = body(&response);
        assert_eq!(json["message"], "found");
        assert_eq!(json["data"]["task_id"], "abc123");
    }

    #[test]
    fn test_trailing_slash_is_ignored() {
        let router = router();
        let (response, _) = router.route(&Counter("x"), &request(b"GET /health/ HTTP/1.1\r\n\r\n"));
        assert_eq!(response.status(), StatusCode::Ok);
    }

    #[test]
    fn test_missing_param_is_not_found() {
        let raw = b"GET /api/design/psd/status/ HTTP/1.1\r\n\r\n";
        let router = router();
        let (response, pattern) = router.route(&Counter("x"), &request(raw));
        assert_eq!(response.status(), StatusCode::NotFound);
        assert_eq!(pattern, "unmatched");
    }

    #[test]
    fn test_extra_segments_do_not_match() {
        let raw = b"GET /api/design/psd/status/a/b HTTP/1.1\r\n\r\n";
        let router = router();
        let (response, _) = router.route(&Counter("x"), &request(raw));
        assert_eq!(response.status(), StatusCode::NotFound);
    }

    #[test]
    fn test_wrong_method_is_405() {
        let raw = b"POST /health HTTP/1.1\r\n\r\n";
        let router = router();
        let (response, _) = router.route(&Counter("x"), &request(raw));
        assert_eq!(response.status(), StatusCode::MethodNotAllowed);
        assert_eq!(response.header("Allow"), Some("GET"));
    }

    #[test]
    fn test_unknown_route() {
        let router = router();
        let (response, _) = router.route(&Counter("x"), &request(b"GET /nope HTTP/1.1\r\n\r\n"));
        assert_eq!(response.status(), StatusCode::NotFound);
        assert!(body(&response)["message"].as_str().unwrap().contains("/nope"));
    }
}
