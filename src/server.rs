//! HTTP front end for the vocabulary pipeline.
//!
//! | Route | Response |
//! |-------|----------|
//! | `POST /vocab` (multipart field `image`) | 200 `{"vocab": ...}` |
//! | `GET /health` | 200 `{"status": "ok", ...}` |
//!
//! Failures are JSON too: 400 when no image was uploaded, 502 when the
//! model failed or answered with something unusable, 500 for anything else.
//! All requests share one [`ChainController`], and therefore one rate-limit
//! budget.

use crate::chain::ChainController;
use crate::error::ChainError;
use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Largest accepted upload. Stitched multi-page passages run to a few MB.
pub const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

const IMAGE_FIELD: &str = "image";

/// Shared state for request handlers.
pub struct AppState {
    pub chain: Arc<ChainController>,
}

/// Build the router with all routes, permissive CORS and request tracing.
pub fn build_router(chain: Arc<ChainController>) -> Router {
    let state = Arc::new(AppState { chain });
    Router::new()
        .route("/vocab", post(vocab))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve `app` until the process is stopped.
pub async fn serve(addr: SocketAddr, app: Router) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("scan2json server listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum ApiError {
    MissingImage,
    Upstream(String),
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::MissingImage => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Please upload an image" }),
            ),
            ApiError::Upstream(detail) => (
                StatusCode::BAD_GATEWAY,
                json!({ "error": "Model returned an unusable response", "detail": detail }),
            ),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Internal Server Error" }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

impl From<ChainError> for ApiError {
    fn from(e: ChainError) -> Self {
        if e.is_upstream() {
            warn!("Vocabulary chain failed upstream: {}", e);
            ApiError::Upstream(e.to_string())
        } else {
            error!("Error in vocabulary process: {}", e);
            ApiError::Internal
        }
    }
}

// ── Handlers ────────────────────────────────────────────────────────────────

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "scan2json",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn vocab(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let Some(upload) = read_image_field(multipart).await else {
        return Err(ApiError::MissingImage);
    };
    info!(
        "Received image upload: {} ({} bytes)",
        upload.filename.as_deref().unwrap_or("<unnamed>"),
        upload.bytes.len()
    );

    // The temp file is removed when `tmp` drops at the end of the request.
    let tmp = tempfile::Builder::new()
        .prefix("scan2json-")
        .suffix(&upload_suffix(upload.filename.as_deref()))
        .tempfile()
        .map_err(|e| {
            error!("tempfile: {}", e);
            ApiError::Internal
        })?;
    tokio::fs::write(tmp.path(), &upload.bytes).await.map_err(|e| {
        error!("tempfile write: {}", e);
        ApiError::Internal
    })?;

    let path = tmp.path().to_string_lossy().to_string();
    let output = state.chain.run_vocabulary(&path).await?;
    Ok(Json(json!({ "vocab": output.payload })))
}

struct Upload {
    filename: Option<String>,
    bytes: Vec<u8>,
}

/// First non-empty `image` field, or `None` when the request has none.
/// A body that is not multipart at all counts as "no image".
async fn read_image_field(multipart: Result<Multipart, MultipartRejection>) -> Option<Upload> {
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(rejection) => {
            warn!("Rejected upload: {}", rejection);
            return None;
        }
    };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return None,
            Err(e) => {
                warn!("Malformed multipart body: {}", e);
                return None;
            }
        };
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        match field.bytes().await {
            Ok(bytes) if !bytes.is_empty() => {
                return Some(Upload {
                    filename,
                    bytes: bytes.to_vec(),
                })
            }
            Ok(_) => return None,
            Err(e) => {
                warn!("Failed to read image field: {}", e);
                return None;
            }
        }
    }
}

/// Keep the uploaded extension so the encoder picks the right image subtype.
fn upload_suffix(filename: Option<&str>) -> String {
    filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{ext}"))
        .unwrap_or_else(|| ".png".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ModelError, RecoveryError};
    use crate::prompts::TaskKind;

    #[test]
    fn suffix_keeps_safe_extensions() {
        assert_eq!(upload_suffix(Some("page one.JPG")), ".JPG");
        assert_eq!(upload_suffix(Some("scan.webp")), ".webp");
        assert_eq!(upload_suffix(Some("no_ext")), ".png");
        assert_eq!(upload_suffix(Some("bad.p/g")), ".png");
        assert_eq!(upload_suffix(None), ".png");
    }

    #[test]
    fn upstream_errors_map_to_bad_gateway() {
        let e = ChainError::MalformedResponse {
            stage: TaskKind::VocabularyAnalysis,
            source: RecoveryError::Empty,
        };
        let resp = ApiError::from(e).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let e = ChainError::StageFailed {
            stage: TaskKind::StitchedPassageOcr,
            attempts: 4,
            source: ModelError::Timeout { secs: 120 },
        };
        assert_eq!(ApiError::from(e).into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn other_errors_are_internal() {
        let e = ChainError::Internal("boom".into());
        assert_eq!(
            ApiError::from(e).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::MissingImage.into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
