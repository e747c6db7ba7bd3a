//! # Tabla de Rutas
//! src/server/routes.rs

use super::AppState;
use crate::http::{Request, Response, StatusCode};
use crate::jobs::{self, handlers as job_handlers};
use crate::router::{Params, Router};
use serde_json::json;

pub fn build_router() -> Router<AppState> {
    let mut router = Router::new();

    router.get("/health", health_handler);
    router.get("/metrics", metrics_handler);

    router.post(jobs::SUBMIT_ROUTE, job_handlers::submit_handler);
    router.get(jobs::STATUS_ROUTE, job_handlers::status_handler);
    router.get(jobs::DOWNLOAD_ROUTE, job_handlers::download_handler);

    router
}

fn health_handler(_state: &AppState, _req: &Request, _params: &Params) -> Response {
    Response::json(StatusCode::Ok, &json!({ "status": "ok" }))
}

fn metrics_handler(state: &AppState, _req: &Request, _params: &Params) -> Response {
    Response::json(StatusCode::Ok, &state.metrics.get_metrics_json())
}
