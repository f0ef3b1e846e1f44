//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Failures become `{ "error": { "kind", "message" } }` with a status picked from the error kind.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, instrument, warn};

use crate::error::{ApiError, WizardError};
use crate::logic::*;
use crate::protocol::*;
use crate::state::AppState;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Generation(_) => StatusCode::BAD_GATEWAY,
            ApiError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Wizard(e) => match e {
                WizardError::Busy | WizardError::WrongStep { .. } | WizardError::NothingToGoBackTo | WizardError::NoCourse => {
                    StatusCode::CONFLICT
                }
                WizardError::UnknownPillar(_) | WizardError::UnknownVariation(_) => StatusCode::NOT_FOUND,
                WizardError::EmptyTopic
                | WizardError::UnknownModule(_)
                | WizardError::UnknownQuestion(_)
                | WizardError::UnknownOption(_) => StatusCode::BAD_REQUEST,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(target: "course_wizard", %status, kind = self.kind(), error = %self, "HTTP request failed");
        }
        let body = ErrorOut { error: ErrorBody { kind: self.kind(), message: self.user_message() } };
        (status, Json(body)).into_response()
    }
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthOut { ok: true, generation_enabled: state.gemini.is_some() })
}

#[instrument(level = "debug", skip(state))]
pub async fn http_get_usage(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(usage_snapshot(&state))
}

#[instrument(level = "debug", skip(state))]
pub async fn http_get_wizard(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(wizard_snapshot(&state).await)
}

#[instrument(level = "info", skip(state, body), fields(topic_len = body.topic.len()))]
pub async fn http_post_topic(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TopicIn>,
) -> Result<Json<WizardOut>, ApiError> {
    let out = submit_topic(&state, &body.topic).await?;
    info!(target: "wizard", pillars = out.pillars.len(), "HTTP topic submitted");
    Ok(Json(out))
}

#[instrument(level = "info", skip(state, body), fields(%body.pillar_id))]
pub async fn http_post_pillar(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PillarIn>,
) -> Result<Json<WizardOut>, ApiError> {
    Ok(Json(select_pillar(&state, &body.pillar_id).await?))
}

#[instrument(level = "info", skip(state, body), fields(%body.variation_id))]
pub async fn http_post_variation(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VariationIn>,
) -> Result<Json<WizardOut>, ApiError> {
    Ok(Json(select_variation(&state, &body.variation_id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_back(State(state): State<Arc<AppState>>) -> Result<Json<WizardOut>, ApiError> {
    Ok(Json(go_back(&state).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_restart(State(state): State<Arc<AppState>>) -> Result<Json<WizardOut>, ApiError> {
    Ok(Json(restart(&state).await?))
}

#[instrument(level = "debug", skip(state))]
pub async fn http_get_course_view(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(course_view(&state).await?))
}

#[instrument(level = "debug", skip(state, body), fields(index = body.index))]
pub async fn http_post_module(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ModuleIn>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(open_module(&state, body.index).await?))
}

#[instrument(level = "debug", skip(state, body), fields(question = body.question, option = body.option))]
pub async fn http_post_select_answer(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SelectAnswerIn>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(select_answer(&state, body.question, body.option).await?))
}

#[instrument(level = "debug", skip(state, body), fields(question = body.question))]
pub async fn http_post_check_answer(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CheckAnswerIn>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(check_answer(&state, body.question).await?))
}

/// The bundle as a zip attachment named after the course title.
#[instrument(level = "info", skip(state))]
pub async fn http_get_export(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let bundle = export_course(&state).await?;
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", bundle.file_name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment; filename=\"course.zip\""));
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bundle.bytes,
    )
        .into_response())
}
