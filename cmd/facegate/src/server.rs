//! HTTP surface of the gate station.
//!
//! API endpoints:
//! - POST /extract-embedding          - multipart `file` -> {embedding} | {error, kind}
//! - POST /extract-embedding-from-url - {url} -> {embedding} | {error, kind}
//! - POST /api/verify                 - VerifyRequest JSON -> VerifyResponse
//! - POST /api/verify/upload          - multipart `file` (+ `threshold`) -> VerifyResponse
//! - POST /api/compare                - {url_a, url_b, threshold?} -> PairVerdict
//! - POST /api/sync                   - SyncReport
//! - GET  /api/identities             - export view of the configured slot
//! - GET  /healthz

use std::sync::Arc;

use anyhow::Result;
use axum::{
    Router,
    extract::{Multipart, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use bytes::Bytes;
use facegate_embed::{EmbedError, ErrorKind, ExtractReply, ImageSource, UrlRequest};
use facegate_faceid::{CompareRequest, FaceIdError, Gate, VerifyRequest, VerifyResponse};
use tower_http::cors::CorsLayer;

use crate::config::parse_addr;

#[derive(Clone)]
struct AppState {
    gate: Arc<Gate>,
}

pub fn router(gate: Arc<Gate>) -> Router {
    Router::new()
        .route("/extract-embedding", post(extract_upload))
        .route("/extract-embedding-from-url", post(extract_url))
        .route("/api/verify", post(verify))
        .route("/api/verify/upload", post(verify_upload))
        .route("/api/compare", post(compare))
        .route("/api/sync", post(sync))
        .route("/api/identities", get(identities))
        .route("/healthz", get(healthz))
        .layer(CorsLayer::permissive())
        .with_state(AppState { gate })
}

/// Start the HTTP server and block until it stops.
pub async fn serve(addr: &str, gate: Arc<Gate>) -> Result<()> {
    let addr = parse_addr(addr)?;
    let app = router(gate);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "facegate: listening");
    eprintln!("Server started at http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

async fn extract_upload(State(state): State<AppState>, multipart: Multipart) -> Response {
    let upload = match read_upload(multipart).await {
        Ok(u) => u,
        Err(msg) => {
            return extract_reply(Err(EmbedError::InvalidInput(msg)), StatusCode::BAD_REQUEST);
        }
    };
    let Some(image) = upload.file else {
        return extract_reply(Err(EmbedError::EmptyInput), StatusCode::BAD_REQUEST);
    };
    let result = state.gate.extract(&ImageSource::Bytes(image)).await;
    let status = extract_status(&result);
    extract_reply(result, status)
}

async fn extract_url(
    State(state): State<AppState>,
    payload: Result<Json<UrlRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(e) => {
            return extract_reply(
                Err(EmbedError::InvalidInput(e.body_text())),
                StatusCode::BAD_REQUEST,
            );
        }
    };
    let result = state.gate.extract(&ImageSource::Url(req.url)).await;
    let status = extract_status(&result);
    extract_reply(result, status)
}

/// Extraction failures other than bad input stay 200 with an error body so
/// callers can tell "no face" apart from transport problems.
fn extract_status(result: &Result<Vec<f32>, EmbedError>) -> StatusCode {
    match result {
        Ok(_) => StatusCode::OK,
        Err(e) => match e.kind() {
            ErrorKind::Input => StatusCode::BAD_REQUEST,
            ErrorKind::Unavailable => StatusCode::BAD_GATEWAY,
            ErrorKind::NoFace | ErrorKind::Decode | ErrorKind::Model => StatusCode::OK,
        },
    }
}

fn extract_reply(result: Result<Vec<f32>, EmbedError>, status: StatusCode) -> Response {
    (status, Json(ExtractReply::from_result(result))).into_response()
}

async fn verify(
    State(state): State<AppState>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(req)) => run_verify(&state.gate, req).await,
        Err(e) => input_error(e.body_text()),
    }
}

async fn verify_upload(State(state): State<AppState>, multipart: Multipart) -> Response {
    let upload = match read_upload(multipart).await {
        Ok(u) => u,
        Err(msg) => return input_error(msg),
    };
    let Some(image) = upload.file else {
        return input_error("missing multipart field \"file\"");
    };
    let mut req = VerifyRequest::with_image(image);
    req.threshold = upload.threshold;
    run_verify(&state.gate, req).await
}

async fn run_verify(gate: &Gate, req: VerifyRequest) -> Response {
    match gate.verify(req).await {
        Ok(outcome) => Json(VerifyResponse::from(outcome)).into_response(),
        Err(FaceIdError::InvalidInput(msg)) => input_error(msg),
        Err(e) => error_response(e),
    }
}

async fn compare(
    State(state): State<AppState>,
    payload: Result<Json<CompareRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(e) => return input_error(e.body_text()),
    };
    let a = ImageSource::Url(req.url_a);
    let b = ImageSource::Url(req.url_b);
    match state.gate.compare(&a, &b, req.threshold).await {
        Ok(verdict) => Json(verdict).into_response(),
        Err(e) => error_response(e),
    }
}

async fn sync(State(state): State<AppState>) -> Response {
    match state.gate.sync().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(e),
    }
}

async fn identities(State(state): State<AppState>) -> Response {
    let gate = state.gate.clone();
    match tokio::task::spawn_blocking(move || gate.export()).await {
        Ok(Ok(records)) => Json(records).into_response(),
        Ok(Err(e)) => error_response(e),
        Err(e) => error_response(FaceIdError::Persistence(format!("export task failed: {e}"))),
    }
}

fn input_error(msg: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(VerifyResponse::input_error(msg)),
    )
        .into_response()
}

fn error_response(err: FaceIdError) -> Response {
    let status = match &err {
        FaceIdError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        FaceIdError::Extraction(e) => match e.kind() {
            ErrorKind::Input => StatusCode::BAD_REQUEST,
            ErrorKind::Unavailable => StatusCode::BAD_GATEWAY,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        },
        FaceIdError::DimensionMismatch { .. } | FaceIdError::DegenerateVector => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        FaceIdError::Persistence(_)
        | FaceIdError::NotFound(_)
        | FaceIdError::Serialization(_)
        | FaceIdError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "facegate: request failed");
    }
    (status, Json(serde_json::json!({"error": err.to_string()}))).into_response()
}

/// Multipart upload: the image under `file`, optionally a `threshold`.
#[derive(Default)]
struct Upload {
    file: Option<Bytes>,
    threshold: Option<f32>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, String> {
    let mut upload = Upload::default();
    while let Some(field) = multipart.next_field().await.map_err(|e| e.body_text())? {
        match field.name() {
            Some(facegate_embed::FILE_FIELD) => {
                upload.file = Some(field.bytes().await.map_err(|e| e.body_text())?);
            }
            Some("threshold") => {
                let text = field.text().await.map_err(|e| e.body_text())?;
                let t = text
                    .trim()
                    .parse::<f32>()
                    .map_err(|e| format!("threshold {text:?}: {e}"))?;
                upload.threshold = Some(t);
            }
            _ => {}
        }
    }
    Ok(upload)
}
