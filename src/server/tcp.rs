//! # Servidor TCP Concurrente
//! src/server/tcp.rs
//!
//! Cada conexión se procesa en su propio thread y atiende un único
//! request. Todas las responses llevan `X-Request-Id`.

use super::routes::build_router;
use super::AppState;
use crate::config::Config;
use crate::http::request::{content_length, head_len, ParseError};
use crate::http::{Request, Response, StatusCode};
use crate::router::{add_common_headers, Router};
use std::io::{self, ErrorKind, Read, Write};
use std::any::Any;
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

/// Tope del head (request line + headers)
const MAX_HEAD_BYTES: usize = 16 * 1024;
const READ_CHUNK: usize = 8192;

/// Límites por conexión
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    pub max_body_bytes: usize,
    pub read_timeout: Duration,
}

impl ConnectionLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_body_bytes: config.max_body_bytes,
            read_timeout: config.read_timeout(),
        }
    }
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024,
            read_timeout: Duration::from_secs(10),
        }
    }
}

/// Lo que se pudo leer del socket
enum Incoming {
    Request(Request),
    /// El peer cerró o expiró el timeout sin mandar nada
    Nothing,
    Reject(Response),
}

/// Descuenta la conexión activa al salir del thread, incluso si hizo panic
struct ActiveConnection(Arc<AppState>);

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.0.metrics.decrement_active_connections();
    }
}

pub struct Server {
    router: Arc<Router<AppState>>,
    state: Arc<AppState>,
    limits: ConnectionLimits,
}

impl Server {
    pub fn new(state: AppState, limits: ConnectionLimits) -> Self {
        Self::with_router(build_router(), state, limits)
    }

    pub(crate) fn with_router(router: Router<AppState>, state: AppState, limits: ConnectionLimits) -> Self {
        Self {
            router: Arc::new(router),
            state: Arc::new(state),
            limits,
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Bind + serve; bloquea el thread actual
    pub fn run(&self, address: impl ToSocketAddrs) -> io::Result<()> {
        let listener = TcpListener::bind(address)?;
        self.serve(listener)
    }

    /// Acepta conexiones del listener dado (útil con puerto 0 en tests)
    pub fn serve(&self, listener: TcpListener) -> io::Result<()> {
        info!(address = %listener.local_addr()?, "Server listening (one thread per connection)");

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => self.spawn_connection(stream),
                Err(e) => error!(error = %e, "Failed to accept connection"),
            }
        }
        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream) {
        let router = Arc::clone(&self.router);
        let state = Arc::clone(&self.state);
        let limits = self.limits;

        state.metrics.increment_active_connections();
        let active = ActiveConnection(state);
        let spawned = thread::Builder::new()
            .name("http-conn".to_string())
            .spawn(move || {
                let active = active;
                if let Err(e) = handle_connection(stream, &router, &active.0, limits) {
                    debug!(error = %e, "Connection ended with I/O error");
                }
            });

        // Si el spawn falla el closure se descarta y el guard descuenta la conexión
        if let Err(e) = spawned {
            error!(error = %e, "Failed to spawn connection thread");
        }
    }
}

pub(crate) fn handle_connection(
    mut stream: TcpStream,
    router: &Router<AppState>,
    state: &AppState,
    limits: ConnectionLimits,
) -> io::Result<()> {
    let start = Instant::now();
    let request_id = Uuid::new_v4().simple().to_string();
    let span = info_span!("request", request_id = %request_id);
    let _entered = span.enter();

    stream.set_read_timeout(Some(limits.read_timeout))?;

    let (mut response, route, method, path) = match read_request(&mut stream, limits.max_body_bytes)? {
        Incoming::Nothing => {
            debug!("Connection closed without a request");
            return Ok(());
        }
        Incoming::Reject(mut response) => {
            add_common_headers(&mut response);
            (response, "unmatched".to_string(), "-", "-".to_string())
        }
        Incoming::Request(request) => {
            let (response, route) = dispatch(router, state, &request);
            (
                response,
                route,
                request.method().as_str(),
                request.path().to_string(),
            )
        }
    };

    response.add_header("X-Request-Id", &request_id);
    stream.write_all(&response.to_bytes())?;
    stream.flush()?;

    let latency = start.elapsed();
    let status = response.status();
    state.metrics.record_request(&route, status.as_u16(), latency);

    if status.is_server_error() {
        warn!(method, path = %path, status = status.as_u16(), latency_ms = latency.as_millis() as u64, "Request failed");
    } else {
        info!(method, path = %path, status = status.as_u16(), latency_ms = latency.as_millis() as u64, "Request served");
    }
    Ok(())
}

/// Ejecuta el handler; un panic se convierte en un 500 con el envelope de error
fn dispatch(router: &Router<AppState>, state: &AppState, request: &Request) -> (Response, String) {
    match panic::catch_unwind(AssertUnwindSafe(|| router.route(state, request))) {
        Ok((response, route)) => (response, route.to_string()),
        Err(payload) => {
            error!(
                method = request.method().as_str(),
                path = %request.path(),
                panic = %panic_message(payload.as_ref()),
                "Handler panicked"
            );
            let mut response = Response::error(StatusCode::InternalServerError, "internal server error");
            add_common_headers(&mut response);
            (response, "unmatched".to_string())
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Lee head + body. Los errores de protocolo se convierten en una response
/// de rechazo; solo los errores de I/O reales se propagan.
fn read_request(stream: &mut TcpStream, max_body_bytes: usize) -> io::Result<Incoming> {
    let mut buffer = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];
    let mut expected_total: Option<usize> = None;

    loop {
        if let Some(total) = expected_total {
            if buffer.len() >= total {
                break;
            }
        }

        let n = match stream.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                if buffer.is_empty() {
                    return Ok(Incoming::Nothing);
                }
                return Ok(Incoming::Reject(Response::error(
                    StatusCode::BadRequest,
                    "timed out reading request",
                )));
            }
            Err(e) => return Err(e),
        };
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);

        if expected_total.is_none() {
            match head_len(&buffer) {
                Some(head_end) => {
                    let declared = match content_length(&buffer[..head_end]) {
                        Ok(declared) => declared,
                        Err(e) => return Ok(Incoming::Reject(parse_rejection(&e))),
                    };
                    if declared > max_body_bytes {
                        warn!(declared, max_body_bytes, "Request body too large");
                        return Ok(Incoming::Reject(Response::error(
                            StatusCode::PayloadTooLarge,
                            &format!("request body exceeds {} bytes", max_body_bytes),
                        )));
                    }
                    expected_total = Some(head_end + declared);
                }
                None if buffer.len() > MAX_HEAD_BYTES => {
                    return Ok(Incoming::Reject(Response::error(
                        StatusCode::BadRequest,
                        "request header too large",
                    )));
                }
                None => {}
            }
        }
    }

    if buffer.is_empty() {
        return Ok(Incoming::Nothing);
    }

    match Request::parse(&buffer) {
        Ok(request) => Ok(Incoming::Request(request)),
        Err(e) => {
            debug!(error = %e, "Rejected unparseable request");
            Ok(Incoming::Reject(parse_rejection(&e)))
        }
    }
}

fn parse_rejection(e: &ParseError) -> Response {
    Response::error(StatusCode::BadRequest, &format!("invalid request: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::FileArtifactStore;
    use crate::jobs::{JobManager, JobManagerConfig};
    use crate::metrics::MetricsCollector;
    use crate::render::CanvasGenerator;
    use crate::store::MemoryStore;
    use std::net::Shutdown;
    use tempfile::TempDir;

    fn state(dir: &TempDir) -> AppState {
        let metrics = MetricsCollector::new();
        let jobs = JobManager::new(
            JobManagerConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(FileArtifactStore::open(dir.path()).unwrap()),
            Arc::new(CanvasGenerator::new()),
            metrics.clone(),
        );
        AppState { jobs, metrics }
    }

    /// Atiende una conexión con `raw` como request y retorna la response cruda
    fn exchange(raw: &[u8], limits: ConnectionLimits) -> (String, AppState) {
        let dir = TempDir::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let state = state(&dir);
            let router = build_router();
            let (stream, _) = listener.accept().unwrap();
            handle_connection(stream, &router, &state, limits).unwrap();
            state
        });

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(raw).unwrap();
        client.shutdown(Shutdown::Write).unwrap();

        let mut buf = Vec::new();
        client.read_to_end(&mut buf).unwrap();
        (String::from_utf8_lossy(&buf).into_owned(), server.join().unwrap())
    }

    #[test]
    fn test_health_has_request_id() {
        let (text, state) = exchange(b"GET /health HTTP/1.1\r\n\r\n", ConnectionLimits::default());
        assert!(text.starts_with("HTTP/1.1 200 OK"));
        assert!(text.contains("X-Request-Id: "));
        assert!(text.contains("Server: psd-jobs"));
        assert!(text.contains("\"status\":\"ok\""));
        assert_eq!(state.metrics.get_snapshot().total_requests, 1);
    }

    #[test]
    fn test_metrics_endpoint() {
        let (text, _) = exchange(b"GET /metrics HTTP/1.1\r\n\r\n", ConnectionLimits::default());
        assert!(text.contains("200 OK"));
        assert!(text.contains("\"tasks\""));
    }

    #[test]
    fn test_body_over_limit_is_413() {
        let limits = ConnectionLimits {
            max_body_bytes: 16,
            ..ConnectionLimits::default()
        };
        let raw = b"POST /api/design/generate/psd HTTP/1.1\r\nContent-Length: 64\r\n\r\n";
        let (text, _) = exchange(raw, limits);
        assert!(text.starts_with("HTTP/1.1 413 Payload Too Large"));
    }

    #[test]
    fn test_garbage_is_400() {
        let (text, state) = exchange(b"\x00\x01\x02\x03garbage\r\n\r\n", ConnectionLimits::default());
        assert!(text.contains("400 Bad Request"));
        assert!(text.contains("invalid request"));
        assert_eq!(state.metrics.get_snapshot().total_requests, 1);
    }

    #[test]
    fn test_truncated_body_is_400() {
        let raw = b"POST /api/design/generate/psd HTTP/1.1\r\nContent-Length: 50\r\n\r\n{}";
        let (text, _) = exchange(raw, ConnectionLimits::default());
        assert!(text.contains("400 Bad Request"));
    }

    #[test]
    fn test_unknown_route_is_404() {
        let (text, _) = exchange(b"GET /jobs/unknown HTTP/1.1\r\n\r\n", ConnectionLimits::default());
        assert!(text.contains("404 Not Found"));
        assert!(text.contains("route not found"));
    }

    #[test]
    fn test_peer_closed_immediately() {
        let dir = TempDir::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let state = state(&dir);
            let (stream, _) = listener.accept().unwrap();
            handle_connection(stream, &build_router(), &state, ConnectionLimits::default()).unwrap();
            state.metrics.get_snapshot().total_requests
        });

        drop(TcpStream::connect(addr).unwrap());
        assert_eq!(server.join().unwrap(), 0);
    }

    fn boom(_state: &AppState, _req: &Request, _params: &crate::router::Params) -> Response {
        panic!("handler exploded");
    }

    #[test]
    fn test_handler_panic_becomes_500_and_releases_connection() {
        let dir = TempDir::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut router = build_router();
        router.get("/boom", boom);
        let server = Server::with_router(router, state(&dir), ConnectionLimits::default());
        let state = Arc::clone(server.state());
        thread::spawn(move || server.serve(listener));

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"GET /boom HTTP/1.1\r\n\r\n").unwrap();
        client.shutdown(Shutdown::Write).unwrap();
        let mut buf = Vec::new();
        client.read_to_end(&mut buf).unwrap();
        let text = String::from_utf8_lossy(&buf);

        assert!(text.starts_with("HTTP/1.1 500 Internal Server Error"), "{}", text);
        assert!(text.contains("\"code\":500"));
        assert!(text.contains("X-Request-Id: "));

        // El thread de la conexión termina justo después de escribir
        let mut active = state.metrics.active_connections();
        for _ in 0..100 {
            if active == 0 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
            active = state.metrics.active_connections();
        }
        assert_eq!(active, 0);
        assert_eq!(state.metrics.get_snapshot().total_requests, 1);
    }
}
