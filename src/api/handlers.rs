//! リクエストハンドラ

use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartRejection, rejection::JsonRejection, Multipart, State},
    Json,
};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::error::ApiError;
use crate::error::AqiError;
use crate::ml::PollutantModel;
use crate::predictor::InferenceContext;
use crate::types::{PhysicalPrediction, Pollutant};

/// アップロードファイルのフィールド名
pub const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub filename: String,
    pub predictions: PhysicalPrediction,
}

#[derive(Debug, Deserialize)]
pub struct Base64Request {
    #[serde(default)]
    pub filename: Option<String>,
    /// 画像データ（`data:image/...;base64,` 付きでも可）
    pub image_base64: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub architecture: String,
}

#[derive(Debug, Serialize)]
pub struct LabelInfo {
    pub label: &'static str,
    pub unit: &'static str,
}

/// 推論はブロッキング処理なので専用スレッドで実行
async fn run_prediction<M: PollutantModel + 'static>(
    context: Arc<InferenceContext<M>>,
    filename: String,
    bytes: Vec<u8>,
) -> Result<Json<PredictionResponse>, ApiError> {
    info!("推論リクエスト: {} ({} bytes)", filename, bytes.len());
    let predictions = tokio::task::spawn_blocking(move || context.predict(&bytes))
        .await
        .map_err(|e| ApiError::internal(format!("推論タスクが異常終了しました: {}", e)))??;

    Ok(Json(PredictionResponse {
        filename,
        predictions,
    }))
}

/// POST /predict (multipart/form-data, フィールド `file`)
pub async fn predict_upload<M: PollutantModel + 'static>(
    State(context): State<Arc<InferenceContext<M>>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let mut multipart = multipart?;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let bytes = field.bytes().await?;
        return run_prediction(context, filename, bytes.to_vec()).await;
    }

    Err(ApiError::bad_request(format!(
        "フィールド {} がありません",
        UPLOAD_FIELD
    )))
}

/// POST /predict/base64
pub async fn predict_base64<M: PollutantModel + 'static>(
    State(context): State<Arc<InferenceContext<M>>>,
    request: Result<Json<Base64Request>, JsonRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let Json(request) = request?;
    let encoded = match request.image_base64.split_once(',') {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => request.image_base64.as_str(),
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| ApiError::from(AqiError::InvalidImage(format!("base64 が不正です: {}", e))))?;

    let filename = request.filename.unwrap_or_else(|| "upload".to_string());
    run_prediction(context, filename, bytes).await
}

/// GET /health
pub async fn health<M: PollutantModel + 'static>(
    State(context): State<Arc<InferenceContext<M>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        architecture: context.model().describe(),
    })
}

/// GET /labels
pub async fn labels() -> Json<Vec<LabelInfo>> {
    Json(
        Pollutant::ALL
            .iter()
            .map(|p| LabelInfo {
                label: p.label(),
                unit: p.unit(),
            })
            .collect(),
    )
}
