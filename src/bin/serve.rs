use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use parler_batch_tts::engine::config::DEFAULT_MODEL_ID;
use parler_batch_tts::{
    BatchHandler, Device, EngineConfig, Error, ErrorBody, SynthesisRequest, SynthesisResponse,
    HANDLER_VERSION,
};

#[derive(Clone)]
struct AppState {
    handler: Arc<Mutex<BatchHandler>>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = if err.is_caller_fault() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody::new(self.message));
        (self.status, body).into_response()
    }
}

async fn generate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SynthesisRequest>,
) -> Result<Json<SynthesisResponse>, ApiError> {
    let handler = state.handler.clone();

    // The engine is not reentrant; the mutex serializes every request onto
    // one blocking worker so callers are served in arrival order.
    let response = tokio::task::spawn_blocking(move || {
        let mut handler = handler.blocking_lock();
        handler.handle(&req).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::internal(format!("task join error: {e}")))??;

    Ok(Json(response))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "tts",
        "version": HANDLER_VERSION,
        "endpoint": "/generate",
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let model_dir =
        std::env::var("MODEL_DIR").unwrap_or_else(|_| DEFAULT_MODEL_ID.to_string());
    let device: Device = std::env::var("DEVICE")
        .unwrap_or_else(|_| "cpu".to_string())
        .parse()?;
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "8888".to_string())
        .parse()?;
    let deploy_env = std::env::var("DEPLOY_ENV").unwrap_or_else(|_| "local".to_string());

    let config = EngineConfig::new(model_dir, device);
    let mut handler = BatchHandler::new(config);

    if deploy_env == "local" {
        // One-shot verification run for local development, no server.
        tracing::info!("DEPLOY_ENV=local, running self test");
        let response = handler.self_test()?;
        tracing::info!(
            buffers = response.buffer_count,
            sample_rate = response.sampling_rate,
            "self test complete, exiting"
        );
        return Ok(());
    }

    let state = Arc::new(AppState {
        handler: Arc::new(Mutex::new(handler)),
    });

    let app = Router::new()
        .route("/generate", post(generate))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    tracing::info!(version = HANDLER_VERSION, "listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
