//! Axum Handlers for the REST API
//!
//! This module maps HTTP requests onto the engine operations and engine
//! errors onto HTTP status codes. It uses `utoipa` doc comments to generate
//! OpenAPI documentation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::sync::Arc;
use tracing::error;
use voxbridge_core::error::EngineError;
use voxbridge_core::models::CreateSessionOptions;
use voxbridge_core::audio;

use crate::{
    models::{
        AudioFormat, CreateSessionPayload, ErrorResponse, ExchangeResponse, HistoryResponse,
        SendAudioPayload, SendTextPayload, SessionIdResponse, SessionResponse,
        UpdateInstructionsPayload,
    },
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    TooManyRequests(String),
    GatewayTimeout(String),
    BadGateway(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::TooManyRequests(message) => (StatusCode::TOO_MANY_REQUESTS, message),
            ApiError::GatewayTimeout(message) => (StatusCode::GATEWAY_TIMEOUT, message),
            ApiError::BadGateway(message) => (StatusCode::BAD_GATEWAY, message),
        };
        (status, Json(ErrorResponse { message })).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match &err {
            EngineError::SessionNotFound(_) => ApiError::NotFound(err.to_string()),
            EngineError::InvalidInput(_) => ApiError::BadRequest(err.to_string()),
            EngineError::LimitExceeded(_) => ApiError::TooManyRequests(err.to_string()),
            EngineError::SessionUnavailable { .. } => ApiError::Conflict(err.to_string()),
            EngineError::ConnectionTimeout | EngineError::RequestTimeout(_) => {
                ApiError::GatewayTimeout(err.to_string())
            }
            EngineError::ConnectionError(_) | EngineError::RemoteProtocolError(_) => {
                error!(error = %err, "upstream realtime failure");
                ApiError::BadGateway(err.to_string())
            }
        }
    }
}

/// Create a new realtime session.
#[utoipa::path(
    post,
    path = "/sessions",
    request_body = CreateSessionPayload,
    responses(
        (status = 201, description = "Session created successfully", body = SessionResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 429, description = "Session limit reached", body = ErrorResponse),
        (status = 504, description = "Connection to the realtime service timed out", body = ErrorResponse)
    )
)]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateSessionPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let opts = CreateSessionOptions {
        id: payload.id,
        instructions: payload.instructions,
        voice: payload.voice,
        metadata: payload.metadata.unwrap_or_default(),
    };
    let summary = state.registry.create_session(opts).await?;
    Ok((StatusCode::CREATED, Json(SessionResponse::from(summary))))
}

/// List all live sessions.
#[utoipa::path(
    get,
    path = "/sessions",
    responses(
        (status = 200, description = "List of sessions", body = [SessionResponse])
    )
)]
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<SessionResponse>> {
    let sessions = state.registry.list_sessions().await;
    Json(sessions.into_iter().map(SessionResponse::from).collect())
}

/// Get a specific session by its ID.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    responses(
        (status = 200, description = "Session details", body = SessionResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("id" = String, Path, description = "Session ID")
    )
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let summary = state
        .registry
        .get_session(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("session '{id}' not found")))?;
    Ok(Json(SessionResponse::from(summary)))
}

/// Close a session, rejecting any in-flight calls.
#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    responses(
        (status = 200, description = "Session closed", body = SessionIdResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("id" = String, Path, description = "Session ID")
    )
)]
pub async fn close_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionIdResponse>, ApiError> {
    let closed = state.registry.close_session(&id).await?;
    Ok(Json(SessionIdResponse { id: closed.id }))
}

/// Send a text message and wait for the aggregated response.
#[utoipa::path(
    post,
    path = "/sessions/{id}/text",
    request_body = SendTextPayload,
    responses(
        (status = 200, description = "Aggregated response", body = ExchangeResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 504, description = "No response within the deadline", body = ErrorResponse)
    ),
    params(
        ("id" = String, Path, description = "Session ID")
    )
)]
pub async fn send_text(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<SendTextPayload>,
) -> Result<Json<ExchangeResponse>, ApiError> {
    let result = state
        .registry
        .send_text(&id, payload.text, payload.return_audio)
        .await?;
    Ok(Json(ExchangeResponse::from(result)))
}

/// Send audio input and wait for the aggregated response.
///
/// WAV-wrapped input is unwrapped to raw PCM before it reaches the engine.
#[utoipa::path(
    post,
    path = "/sessions/{id}/audio",
    request_body = SendAudioPayload,
    responses(
        (status = 200, description = "Aggregated response", body = ExchangeResponse),
        (status = 400, description = "Malformed audio payload", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 504, description = "No response within the deadline", body = ErrorResponse)
    ),
    params(
        ("id" = String, Path, description = "Session ID")
    )
)]
pub async fn send_audio(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<SendAudioPayload>,
) -> Result<Json<ExchangeResponse>, ApiError> {
    let bytes = BASE64
        .decode(payload.audio.as_bytes())
        .map_err(|e| ApiError::BadRequest(format!("audio is not valid base64: {e}")))?;
    let pcm = match payload.format {
        AudioFormat::Pcm16 => bytes,
        AudioFormat::Wav => audio::wav_to_pcm(&bytes).map_err(ApiError::from)?,
    };
    let result = state
        .registry
        .send_audio(&id, pcm, payload.return_audio)
        .await?;
    Ok(Json(ExchangeResponse::from(result)))
}

/// Replace the session's instructions for subsequent turns.
#[utoipa::path(
    patch,
    path = "/sessions/{id}/instructions",
    request_body = UpdateInstructionsPayload,
    responses(
        (status = 200, description = "Instructions updated", body = SessionIdResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("id" = String, Path, description = "Session ID")
    )
)]
pub async fn update_instructions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateInstructionsPayload>,
) -> Result<Json<SessionIdResponse>, ApiError> {
    state
        .registry
        .update_instructions(&id, payload.instructions)
        .await?;
    Ok(Json(SessionIdResponse { id }))
}

/// Get the session's conversation history.
#[utoipa::path(
    get,
    path = "/sessions/{id}/history",
    responses(
        (status = 200, description = "Conversation history", body = HistoryResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("id" = String, Path, description = "Session ID")
    )
)]
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let history = state.registry.history(&id).await?;
    Ok(Json(HistoryResponse::from(history)))
}
