//! Classification endpoints

use axum::body::Bytes;
use axum::extract::{Multipart, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Multipart field carrying the uploaded image
pub const IMAGE_FIELD: &str = "image";

/// Description of the model now being served
#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub labels: Vec<String>,
    pub trained_at: Option<DateTime<Utc>>,
}

/// POST /api/Classification/classify_image - predict the label of one uploaded image
pub async fn classify_image(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> ApiResult<String> {
    let bytes = read_image_field(&mut multipart).await?;
    let service = state.service().await.ok_or(ApiError::ModelUnavailable)?;

    let size = bytes.len();
    let prediction = tokio::task::spawn_blocking(move || service.classify_bytes(&bytes)).await??;

    info!(
        "Classified upload of {} bytes as '{}' ({:.1}%)",
        size,
        prediction.predicted_label,
        prediction.confidence * 100.0
    );
    Ok(prediction.predicted_label)
}

async fn read_image_field(multipart: &mut Multipart) -> ApiResult<Bytes> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(IMAGE_FIELD) {
            return Ok(field.bytes().await?);
        }
    }
    Err(ApiError::bad_request(format!(
        "missing multipart field '{IMAGE_FIELD}'"
    )))
}

/// POST /api/Classification/reload - swap in the artifact currently on disk
pub async fn reload_model(State(state): State<SharedState>) -> ApiResult<Json<ModelInfo>> {
    let loader = state.clone();
    let service = tokio::task::spawn_blocking(move || loader.load_service()).await??;
    let service = state.install(service).await;

    Ok(Json(ModelInfo {
        labels: service.labels().labels().to_vec(),
        trained_at: service.trained_at(),
    }))
}
