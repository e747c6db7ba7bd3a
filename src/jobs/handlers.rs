//! # Handlers HTTP para Jobs
//! src/jobs/handlers.rs
//!
//! Adaptadores entre HTTP y `JobManager`. Todas las respuestas usan el
//! envelope `{code, message, data}`.
//!
//! | Error                          | HTTP                  |
//! |--------------------------------|-----------------------|
//! | body inválido / validación     | 400                   |
//! | task id mal formado            | 400                   |
//! | tarea o artefacto inexistente  | 404                   |
//! | store caído / lock registrando | 503 + `Retry-After`   |
//! | fallo de disco                 | 500                   |

use crate::artifacts;
use crate::error::{DownloadError, SubmitError};
use crate::http::response::CONTENT_TYPE_PSD;
use crate::http::{Request, Response, StatusCode};
use crate::jobs::types::GenerationRequest;
use crate::router::Params;
use crate::server::AppState;
use serde_json::json;
use tracing::{debug, error, warn};

pub const USER_ID_HEADER: &str = "X-User-Id";

/// Segundos sugeridos al cliente ante un 503
const RETRY_AFTER_SECS: u64 = 1;

/// POST /api/design/generate/psd
pub fn submit_handler(state: &AppState, req: &Request, _params: &Params) -> Response {
    let mut request: GenerationRequest = match serde_json::from_slice(req.body()) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Rejected malformed generation request");
            return Response::error(StatusCode::BadRequest, &format!("invalid request body: {}", e));
        }
    };
    request.user_id = req
        .header(USER_ID_HEADER)
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string);

    match state.jobs.submit(request) {
        // El handle se descarta: el thread de la tarea sigue solo
        Ok(submission) => Response::envelope(
            StatusCode::Ok,
            submission.message(),
            json!({
                "task_id": submission.task_id,
                "message": submission.message(),
            }),
        ),
        Err(SubmitError::Validation(e)) => {
            debug!(field = e.field, "Rejected invalid generation request");
            Response::error(StatusCode::BadRequest, &e.to_string())
        }
        Err(SubmitError::StoreUnavailable(e)) => {
            error!(error = %e, "Submission failed: store unavailable");
            Response::unavailable("task store unavailable, retry later", RETRY_AFTER_SECS)
        }
        Err(e @ SubmitError::Busy) => {
            warn!("Submission deferred: lock owner still registering");
            Response::unavailable(&e.to_string(), RETRY_AFTER_SECS)
        }
    }
}

/// GET /api/design/psd/status/:task_id
pub fn status_handler(state: &AppState, _req: &Request, params: &Params) -> Response {
    let task_id = params.get("task_id").unwrap_or_default();
    if artifacts::validate_task_id(task_id).is_err() {
        return Response::error(StatusCode::BadRequest, "invalid task id");
    }

    match state.jobs.status(task_id) {
        Ok(Some(record)) => Response::envelope(StatusCode::Ok, "ok", &record),
        Ok(None) => Response::error(StatusCode::NotFound, "task not found"),
        Err(e) => {
            error!(task_id = %task_id, error = %e, "Status lookup failed");
            Response::unavailable("task store unavailable, retry later", RETRY_AFTER_SECS)
        }
    }
}

/// GET /api/design/psd/download/:task_id?file_name=
pub fn download_handler(state: &AppState, req: &Request, params: &Params) -> Response {
    let task_id = params.get("task_id").unwrap_or_default();

    match state.jobs.download(task_id) {
        Ok(bytes) => {
            let file_name = artifacts::presented_file_name(req.query_param("file_name"), task_id);
            debug!(task_id = %task_id, bytes = bytes.len(), file_name = %file_name, "Serving artifact");
            Response::attachment(CONTENT_TYPE_PSD, &file_name, bytes)
        }
        Err(DownloadError::InvalidTaskId) => Response::error(StatusCode::BadRequest, "invalid task id"),
        Err(DownloadError::NotFound) => Response::error(StatusCode::NotFound, "file not found or expired"),
        Err(e @ DownloadError::Storage(_)) => {
            error!(task_id = %task_id, error = %e, "Artifact read failed");
            Response::error(StatusCode::InternalServerError, "failed to read artifact")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{ArtifactStore, FileArtifactStore};
    use crate::error::GenerationError;
    use crate::jobs::manager::{JobManager, JobManagerConfig};
    use crate::jobs::progress::ProgressSink;
    use crate::jobs::types::fixtures::sample_request;
    use crate::jobs::types::{TaskRecord, TaskStatus};
    use crate::metrics::MetricsCollector;
    use crate::render::DocumentGenerator;
    use crate::store::testing::FlakyStore;
    use crate::store::KeyValueStore;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Immediate;

    impl DocumentGenerator for Immediate {
        fn generate(&self, _: &GenerationRequest, progress: &ProgressSink) -> Result<Vec<u8>, GenerationError> {
            progress.report(50, "half");
            Ok(b"8BPS-test".to_vec())
        }
    }

    struct Fixture {
        _dir: TempDir,
        kv: Arc<FlakyStore>,
        artifacts: Arc<FileArtifactStore>,
        state: AppState,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let kv = Arc::new(FlakyStore::new());
        let artifacts = Arc::new(FileArtifactStore::open(dir.path()).unwrap());
        let metrics = MetricsCollector::new();
        let jobs = JobManager::new(
            JobManagerConfig::default(),
            kv.clone(),
            artifacts.clone(),
            Arc::new(Immediate),
            metrics.clone(),
        );
        Fixture {
            _dir: dir,
            kv,
            artifacts,
            state: AppState { jobs, metrics },
        }
    }

    fn post(body: &str, user: Option<&str>) -> Request {
        let user_header = user.map(|u| format!("X-User-Id: {}\r\n", u)).unwrap_or_default();
        let raw = format!(
            "POST /api/design/generate/psd HTTP/1.1\r\n{}Content-Length: {}\r\n\r\n{}",
            user_header,
            body.len(),
            body
        );
        Request::parse(raw.as_bytes()).unwrap()
    }

    fn get(path: &str) -> Request {
        Request::parse(format!("GET {} HTTP/1.1\r\n\r\n", path).as_bytes()).unwrap()
    }

    fn params(task_id: &str) -> Params {
        [("task_id", task_id)].into_iter().collect()
    }

    fn body(response: &Response) -> serde_json::Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    fn sample_body() -> String {
        serde_json::to_string(&sample_request()).unwrap()
    }

    fn wait_terminal(state: &AppState, task_id: &str) -> TaskRecord {
        for _ in 0..200 {
            if let Some(record) = state.jobs.status(task_id).unwrap() {
                if record.is_terminal() {
                    return record;
                }
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("task {} did not finish", task_id);
    }

    #[test]
    fn test_submit_returns_envelope_with_task_id() {
        let fx = fixture();
        let response = submit_handler(&fx.state, &post(&sample_body(), Some("user-42")), &Params::default());
        assert_eq!(response.status(), StatusCode::Ok);

        let json = body(&response);
        assert_eq!(json["code"], 200);
        assert_eq!(json["message"], "task created");
        let task_id = json["data"]["task_id"].as_str().unwrap();
        assert_eq!(json["data"]["message"], "task created");

        let record = wait_terminal(&fx.state, task_id);
        assert_eq!(record.status, TaskStatus::Completed);
    }

    #[test]
    fn test_user_header_changes_fingerprint() {
        let fx = fixture();
        let a = body(&submit_handler(&fx.state, &post(&sample_body(), Some("alice")), &Params::default()));
        let b = body(&submit_handler(&fx.state, &post(&sample_body(), Some("bob")), &Params::default()));
        assert_ne!(a["data"]["task_id"], b["data"]["task_id"]);
    }

    #[test]
    fn test_submit_malformed_body_is_400() {
        let fx = fixture();
        let response = submit_handler(&fx.state, &post("{not json", None), &Params::default());
        assert_eq!(response.status(), StatusCode::BadRequest);
        assert!(body(&response)["message"].as_str().unwrap().contains("invalid request body"));
        assert!(fx.kv.inner().is_empty());
    }

    #[test]
    fn test_submit_invalid_dimensions_is_400() {
        let fx = fixture();
        let mut request = sample_request();
        request.specifications.dimensions.width = -1.0;
        let response = submit_handler(
            &fx.state,
            &post(&serde_json::to_string(&request).unwrap(), None),
            &Params::default(),
        );
        assert_eq!(response.status(), StatusCode::BadRequest);
        assert!(body(&response)["message"].as_str().unwrap().contains("specifications.dimensions.width"));
        assert!(fx.kv.inner().is_empty());
    }

    #[test]
    fn test_submit_store_down_is_503() {
        let fx = fixture();
        fx.kv.fail_acquires.store(true, Ordering::SeqCst);
        let response = submit_handler(&fx.state, &post(&sample_body(), None), &Params::default());
        assert_eq!(response.status(), StatusCode::ServiceUnavailable);
        assert_eq!(response.header("Retry-After"), Some("1"));
    }

    #[test]
    fn test_status_found_and_missing() {
        let fx = fixture();
        let record = TaskRecord::processing("known");
        fx.kv
            .set("task:known", &serde_json::to_string(&record).unwrap(), Duration::from_secs(60))
            .unwrap();

        let response = status_handler(&fx.state, &get("/x"), &params("known"));
        assert_eq!(response.status(), StatusCode::Ok);
        let json = body(&response);
        assert_eq!(json["data"]["task_id"], "known");
        assert_eq!(json["data"]["status"], "processing");
        assert!(json["data"].get("download_url").is_none());

        let response = status_handler(&fx.state, &get("/x"), &params("unknown"));
        assert_eq!(response.status(), StatusCode::NotFound);
    }

    #[test]
    fn test_status_invalid_id_is_400() {
        let fx = fixture();
        let response = status_handler(&fx.state, &get("/x"), &params("a..b%2F"));
        assert_eq!(response.status(), StatusCode::BadRequest);
    }

    #[test]
    fn test_status_store_down_is_503() {
        let fx = fixture();
        fx.kv.fail_reads.store(true, Ordering::SeqCst);
        let response = status_handler(&fx.state, &get("/x"), &params("known"));
        assert_eq!(response.status(), StatusCode::ServiceUnavailable);
    }

    #[test]
    fn test_download_serves_attachment() {
        let fx = fixture();
        fx.artifacts.write("done1", b"8BPS-bytes").unwrap();

        let response = download_handler(
            &fx.state,
            &get("/x?file_name=Joint%20Cream_10x4x15cm_202501011200.psd"),
            &params("done1"),
        );
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.body(), b"8BPS-bytes");
        assert_eq!(response.header("Content-Type"), Some(CONTENT_TYPE_PSD));
        assert_eq!(
            response.header("Content-Disposition"),
            Some("attachment; filename=\"Joint Cream_10x4x15cm_202501011200.psd\"")
        );
    }

    #[test]
    fn test_download_non_ascii_file_name() {
        let fx = fixture();
        fx.artifacts.write("done3", b"8BPS").unwrap();
        let query = format!("/x?file_name={}", crate::http::url::encode_component("护手霜_6x3x8cm_202501011200"));

        let response = download_handler(&fx.state, &get(&query), &params("done3"));
        assert_eq!(response.status(), StatusCode::Ok);
        let disposition = response.header("Content-Disposition").unwrap();
        assert!(disposition.is_ascii());
        assert!(disposition.starts_with("attachment; filename=\"____6x3x8cm_202501011200.psd\"; "));
        assert!(disposition.ends_with(
            "filename*=UTF-8''%E6%8A%A4%E6%89%8B%E9%9C%9C_6x3x8cm_202501011200.psd"
        ));
    }

    #[test]
    fn test_download_defaults_file_name() {
        let fx = fixture();
        fx.artifacts.write("done2", b"x").unwrap();
        let response = download_handler(&fx.state, &get("/x"), &params("done2"));
        assert_eq!(
            response.header("Content-Disposition"),
            Some("attachment; filename=\"done2.psd\"")
        );
    }

    #[test]
    fn test_download_errors() {
        let fx = fixture();
        let response = download_handler(&fx.state, &get("/x"), &params(".."));
        assert_eq!(response.status(), StatusCode::BadRequest);

        let response = download_handler(&fx.state, &get("/x"), &params("missing"));
        assert_eq!(response.status(), StatusCode::NotFound);
        assert_eq!(body(&response)["message"], "file not found or expired");
    }
}
