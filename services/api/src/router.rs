//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        AudioFormat, CreateSessionPayload, ErrorResponse, ExchangeResponse, HistoryResponse,
        SendAudioPayload, SendTextPayload, SessionIdResponse, SessionResponse, TurnResponse,
        UpdateInstructionsPayload,
    },
    state::AppState,
};

use axum::{
    Router,
    routing::{get, patch, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::create_session,
        handlers::list_sessions,
        handlers::get_session,
        handlers::close_session,
        handlers::send_text,
        handlers::send_audio,
        handlers::update_instructions,
        handlers::get_history,
    ),
    components(
        schemas(
            CreateSessionPayload,
            SendTextPayload,
            SendAudioPayload,
            AudioFormat,
            UpdateInstructionsPayload,
            SessionResponse,
            ExchangeResponse,
            HistoryResponse,
            TurnResponse,
            SessionIdResponse,
            ErrorResponse
        )
    ),
    tags(
        (name = "Voxbridge API", description = "Request/response bridge to a realtime conversational service")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route(
            "/sessions",
            get(handlers::list_sessions).post(handlers::create_session),
        )
        .route(
            "/sessions/{id}",
            get(handlers::get_session).delete(handlers::close_session),
        )
        .route("/sessions/{id}/text", post(handlers::send_text))
        .route("/sessions/{id}/audio", post(handlers::send_audio))
        .route(
            "/sessions/{id}/instructions",
            patch(handlers::update_instructions),
        )
        .route("/sessions/{id}/history", get(handlers::get_history))
        .with_state(app_state);

    // Merge the stateful routes with the stateless ones (like Swagger UI).
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
