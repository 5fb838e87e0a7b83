//! 推論 HTTP API
//!
//! - `POST /predict`        multipart のフィールド `file` に画像
//! - `POST /predict/base64` JSON `{ "filename": ..., "image_base64": ... }`
//! - `GET  /health`
//! - `GET  /labels`

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::ml::PollutantModel;
use crate::model::ServerSettings;
use crate::predictor::InferenceContext;

pub mod error;
pub mod handlers;

pub use error::ApiError;

pub fn create_router<M: PollutantModel + 'static>(
    context: Arc<InferenceContext<M>>,
    max_upload_bytes: usize,
) -> Router {
    Router::new()
        .route("/predict", post(handlers::predict_upload::<M>))
        .route("/predict/base64", post(handlers::predict_base64::<M>))
        .route("/health", get(handlers::health::<M>))
        .route("/labels", get(handlers::labels))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(context)
}

/// Ctrl-C を受けるまでサーバを動かす
pub async fn serve<M: PollutantModel + 'static>(
    context: Arc<InferenceContext<M>>,
    settings: &ServerSettings,
) -> anyhow::Result<()> {
    let app = create_router(context, settings.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind_addr))?;
    info!("待ち受け開始: http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("終了シグナルを受信しました");
        })
        .await?;
    Ok(())
}
