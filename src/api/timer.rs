use crate::api::session::{CurrentSession, require_session};
use crate::domain::TaskId;
use crate::domain::auth::driven_ports::SessionStore;
use crate::domain::auth::{AuthService, Session};
use crate::domain::task::driven_ports::{TaskReader, TaskWriter};
use crate::domain::timer::TimerService;
use crate::domain::timer::driving_ports::{TimerError, TimerPort};
use crate::external_connections::ExternalConnectivity;
use crate::persistence::db_task_driven_ports::{DbTaskReader, DbTaskWriter};
use crate::routing_utils::{BasicErrorResponse, GenericErrorResponse, Json, not_found, not_signed_in};
use crate::{AppState, SharedData, dto};
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::ErrorResponse;
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(paths(timer_status, start_timer, stop_timer))]
/// Defines the OpenAPI spec for timer endpoints
pub struct TimerApi;
/// Used to group timer endpoints together in the OpenAPI documentation
pub const TIMER_API_GROUP: &str = "Timer";

/// Builds a router for the session timer
pub fn timer_routes() -> Router<Arc<SharedData>> {
    Router::new()
        .route(
            "/timer",
            get(
                async |State(app_state): AppState, CurrentSession(session_id): CurrentSession| {
                    let session = require_session(session_id, &AuthService {}, &app_state.sessions)?;

                    Ok::<_, ErrorResponse>(timer_status(&session, Utc::now()))
                },
            ),
        )
        .route(
            "/tasks/:task_id/timer/start",
            post(
                async |State(app_state): AppState,
                       CurrentSession(session_id): CurrentSession,
                       Path(task_id): Path<TaskId>| {
                    let session = require_session(session_id, &AuthService {}, &app_state.sessions)?;
                    let mut ext_cxn = app_state.ext_cxn.clone();

                    start_timer(
                        &session,
                        task_id,
                        Utc::now(),
                        &mut ext_cxn,
                        &TimerService {},
                        &DbTaskReader,
                        &app_state.sessions,
                    )
                    .await
                },
            ),
        )
        .route(
            "/tasks/:task_id/timer/stop",
            post(
                async |State(app_state): AppState,
                       CurrentSession(session_id): CurrentSession,
                       Path(task_id): Path<TaskId>| {
                    let session = require_session(session_id, &AuthService {}, &app_state.sessions)?;
                    let mut ext_cxn = app_state.ext_cxn.clone();

                    stop_timer(
                        &session,
                        task_id,
                        Utc::now(),
                        &mut ext_cxn,
                        &TimerService {},
                        &DbTaskReader,
                        &DbTaskWriter,
                        &app_state.sessions,
                    )
                    .await
                },
            ),
        )
}

pub(super) fn timer_error_response(err: TimerError) -> ErrorResponse {
    match err {
        TimerError::AnotherTimerActive { .. } => BasicErrorResponse::new(
            "another_timer_active",
            "Another timer is already running. Stop it before starting a new one.",
        )
        .with_status(StatusCode::CONFLICT),
        TimerError::NotRunning(_) => BasicErrorResponse::new(
            "timer_not_running",
            "There is no timer running for this task.",
        )
        .with_status(StatusCode::CONFLICT),
        TimerError::TaskDoesNotExist(_) => not_found("task"),
        TimerError::SessionEnded => not_signed_in(),
        TimerError::PortError(cause) => GenericErrorResponse(cause).into(),
    }
}

#[utoipa::path(
    get,
    path = "/timer",
    tag = TIMER_API_GROUP,
    security(("session" = [])),
    responses(
        (status = 200, description = "The session's timer", body = dto::timer::TimerStatus),
        (status = 401, response = dto::err_resps::BasicError401),
    ),
)]
#[tracing::instrument(skip(session))]
fn timer_status(session: &Session, now: DateTime<Utc>) -> Json<dto::timer::TimerStatus> {
    Json(dto::timer::TimerStatus::at(session.timer, now))
}

#[utoipa::path(
    post,
    path = "/tasks/{task_id}/timer/start",
    tag = TIMER_API_GROUP,
    params(("task_id" = uuid::Uuid, Path, description = "ID of the task to time")),
    security(("session" = [])),
    responses(
        (status = 200, description = "Timer running", body = dto::timer::TimerStatus),
        (status = 401, response = dto::err_resps::BasicError401),
        (status = 404, response = dto::err_resps::BasicError404),
        (status = 409, response = dto::err_resps::BasicError409),
        (status = 500, response = dto::err_resps::BasicError500),
    ),
)]
#[tracing::instrument(skip_all, fields(task_id = %task_id))]
/// Starts the session's timer on a task. Only one task can be timed per session.
async fn start_timer(
    session: &Session,
    task_id: TaskId,
    now: DateTime<Utc>,
    ext_cxn: &mut impl ExternalConnectivity,
    timer_service: &impl TimerPort,
    task_read: &impl TaskReader,
    sessions: &impl SessionStore,
) -> Result<Json<dto::timer::TimerStatus>, ErrorResponse> {
    let timer = timer_service
        .start_timer(
            session.id,
            &session.user.id,
            task_id,
            now,
            &mut *ext_cxn,
            task_read,
            sessions,
        )
        .await
        .map_err(timer_error_response)?;

    Ok(Json(dto::timer::TimerStatus::at(timer, now)))
}

#[utoipa::path(
    post,
    path = "/tasks/{task_id}/timer/stop",
    tag = TIMER_API_GROUP,
    params(("task_id" = uuid::Uuid, Path, description = "ID of the timed task")),
    security(("session" = [])),
    responses(
        (status = 200, description = "Timer stopped, the recorded interval is returned", body = dto::time_entry::TimeEntry),
        (status = 401, response = dto::err_resps::BasicError401),
        (status = 404, response = dto::err_resps::BasicError404),
        (status = 409, response = dto::err_resps::BasicError409),
        (status = 500, response = dto::err_resps::BasicError500),
    ),
)]
#[tracing::instrument(skip_all, fields(task_id = %task_id))]
/// Stops the session's timer and logs the interval on the task
#[allow(clippy::too_many_arguments)]
async fn stop_timer(
    session: &Session,
    task_id: TaskId,
    now: DateTime<Utc>,
    ext_cxn: &mut impl ExternalConnectivity,
    timer_service: &impl TimerPort,
    task_read: &impl TaskReader,
    task_write: &impl TaskWriter,
    sessions: &impl SessionStore,
) -> Result<Json<dto::time_entry::TimeEntry>, ErrorResponse> {
    let entry = timer_service
        .stop_timer(
            session.id,
            &session.user.id,
            task_id,
            now,
            &mut *ext_cxn,
            task_read,
            task_write,
            sessions,
        )
        .await
        .map_err(timer_error_response)?;

    Ok(Json(entry.into()))
}
