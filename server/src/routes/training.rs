//! Training and evaluation endpoints
//!
//! Both run on the blocking pool. Only one training run may be active; a
//! second request is refused instead of queued.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tracing::info;

use kanji_classifier::{run_evaluation, EvaluationReport, TrainingOrchestrator};

use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// GET /api/Training/train - train on the assets directory and overwrite the artifact
pub async fn start_training(State(state): State<SharedState>) -> ApiResult<StatusCode> {
    let guard = state
        .training_lock
        .clone()
        .try_lock_owned()
        .map_err(|_| ApiError::conflict("a training run is already in progress"))?;

    info!("Training run requested");
    let orchestrator = TrainingOrchestrator::new(state.config.clone(), state.engine.clone());

    // The guard moves with the job so a dropped request cannot release it early
    let summary = tokio::task::spawn_blocking(move || {
        let _guard = guard;
        orchestrator.run()
    })
    .await??;

    info!(
        "Training run finished; artifact written to {:?}. Reload to serve it.",
        summary.artifact_path
    );
    Ok(StatusCode::OK)
}

/// GET /api/Training/classify - evaluate the saved artifact on the held-out test split
pub async fn run_test_evaluation(
    State(state): State<SharedState>,
) -> ApiResult<Json<EvaluationReport>> {
    let config = state.config.clone();
    let engine = state.engine.clone();

    let report =
        tokio::task::spawn_blocking(move || run_evaluation(&config, engine.as_ref())).await??;

    Ok(Json(report))
}
