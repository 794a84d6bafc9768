use axum::{
    extract::State,
    Json,
};
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    error::AppError,
    message::{ChatRequest, ChatResponse},
    state::SharedState,
};

pub async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let trimmed = payload.message.trim();

    if trimmed.is_empty() {
        return Err(AppError::BadRequest("Message cannot be empty".to_string()));
    }

    let span = tracing::info_span!("chat", request_id = %Uuid::new_v4());
    async move {
        // Faults while classifying or extracting are not caught here; they become a 500.
        let (classification, entities) = state.router.parse_message(trimmed).await?;
        tracing::info!(intent = classification.label(), "message classified");
        tracing::debug!(?entities, "entities extracted");

        let response = state.dispatcher.dispatch(&classification, &entities, trimmed).await;
        tracing::info!(success = response.success, rows = response.data.len(), "message handled");

        Ok::<_, AppError>(Json(response))
    }
    .instrument(span)
    .await
}
