use crate::api::session::{CurrentSession, require_session};
use crate::api::timer::timer_error_response;
use crate::domain::auth::driven_ports::SessionStore;
use crate::domain::auth::{AuthService, Session};
use crate::domain::task::TaskService;
use crate::domain::task::driven_ports::{TaskReader, TaskSubscriber, TaskWriter};
use crate::domain::task::driving_ports::{TaskError, TaskPort};
use crate::domain::timer::TimerService;
use crate::domain::timer::driving_ports::TimerPort;
use crate::domain::{TaskId, task_list};
use crate::external_connections::{ExternalConnectivity, Transactable};
use crate::persistence::db_task_driven_ports::{DbTaskReader, DbTaskWriter};
use crate::routing_utils::{GenericErrorResponse, Json, ValidationErrorResponse, not_found};
use crate::{AppState, SharedData, dto};
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::ErrorResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;
use tracing::error;
use utoipa::OpenApi;
use validator::Validate;

#[derive(OpenApi)]
#[openapi(paths(
    list_tasks,
    overdue_tasks,
    task_progress,
    time_summary,
    task_stream,
    create_task,
    reorder_tasks,
    get_task,
    update_task,
    toggle_complete,
    delete_task,
))]
/// Defines the OpenAPI spec for task endpoints
pub struct TaskApi;
/// Used to group task endpoints together in the OpenAPI documentation
pub const TASK_API_GROUP: &str = "Tasks";

type TaskStream = Sse<BoxStream<'static, Result<Event, axum::Error>>>;

/// Builds a router for all the task routes
pub fn task_routes() -> Router<Arc<SharedData>> {
    Router::new()
        .route(
            "/tasks",
            get(
                async |State(app_state): AppState,
                       CurrentSession(session_id): CurrentSession,
                       Query(query): Query<dto::task::DayQuery>| {
                    let session = require_session(session_id, &AuthService {}, &app_state.sessions)?;
                    let mut ext_cxn = app_state.ext_cxn.clone();

                    list_tasks(&session.user.id, query, &mut ext_cxn, &TaskService {}, &DbTaskReader).await
                },
            )
            .post(
                async |State(app_state): AppState,
                       CurrentSession(session_id): CurrentSession,
                       Json(new_task): Json<dto::task::NewTask>| {
                    let session = require_session(session_id, &AuthService {}, &app_state.sessions)?;
                    let mut ext_cxn = app_state.ext_cxn.clone();

                    create_task(&session.user.id, new_task, &mut ext_cxn, &TaskService {}, &DbTaskWriter).await
                },
            ),
        )
        .route(
            "/tasks/overdue",
            get(
                async |State(app_state): AppState,
                       CurrentSession(session_id): CurrentSession,
                       Query(query): Query<dto::task::DayQuery>| {
                    let session = require_session(session_id, &AuthService {}, &app_state.sessions)?;
                    let mut ext_cxn = app_state.ext_cxn.clone();

                    overdue_tasks(
                        &session.user.id,
                        query,
                        Utc::now(),
                        &mut ext_cxn,
                        &TaskService {},
                        &DbTaskReader,
                    )
                    .await
                },
            ),
        )
        .route(
            "/tasks/progress",
            get(
                async |State(app_state): AppState,
                       CurrentSession(session_id): CurrentSession,
                       Query(query): Query<dto::task::DayQuery>| {
                    let session = require_session(session_id, &AuthService {}, &app_state.sessions)?;
                    let mut ext_cxn = app_state.ext_cxn.clone();

                    task_progress(
                        &session.user.id,
                        query,
                        Utc::now(),
                        &mut ext_cxn,
                        &TaskService {},
                        &DbTaskReader,
                    )
                    .await
                },
            ),
        )
        .route(
            "/tasks/summary",
            get(
                async |State(app_state): AppState,
                       CurrentSession(session_id): CurrentSession,
                       Query(query): Query<dto::task::SummaryQuery>| {
                    let session = require_session(session_id, &AuthService {}, &app_state.sessions)?;
                    let mut ext_cxn = app_state.ext_cxn.clone();

                    time_summary(
                        &session.user.id,
                        query,
                        Utc::now(),
                        &mut ext_cxn,
                        &TaskService {},
                        &DbTaskReader,
                    )
                    .await
                },
            ),
        )
        .route(
            "/tasks/stream",
            get(
                async |State(app_state): AppState,
                       CurrentSession(session_id): CurrentSession,
                       Query(query): Query<dto::task::DayQuery>| {
                    let session = require_session(session_id, &AuthService {}, &app_state.sessions)?;

                    task_stream(
                        &session.user.id,
                        query,
                        Utc::now(),
                        &TaskService {},
                        &app_state.task_subscriber,
                    )
                },
            ),
        )
        .route(
            "/tasks/reorder",
            post(
                async |State(app_state): AppState,
                       CurrentSession(session_id): CurrentSession,
                       Json(reorder): Json<dto::task::ReorderRequest>| {
                    let session = require_session(session_id, &AuthService {}, &app_state.sessions)?;
                    let mut ext_cxn = app_state.ext_cxn.clone();

                    reorder_tasks(
                        &session.user.id,
                        reorder,
                        &mut ext_cxn,
                        &TaskService {},
                        &DbTaskReader,
                        &DbTaskWriter,
                    )
                    .await
                },
            ),
        )
        .route(
            "/tasks/:task_id",
            get(
                async |State(app_state): AppState,
                       CurrentSession(session_id): CurrentSession,
                       Path(task_id): Path<TaskId>| {
                    let session = require_session(session_id, &AuthService {}, &app_state.sessions)?;
                    let mut ext_cxn = app_state.ext_cxn.clone();

                    get_task(&session.user.id, task_id, &mut ext_cxn, &TaskService {}, &DbTaskReader).await
                },
            )
            .patch(
                async |State(app_state): AppState,
                       CurrentSession(session_id): CurrentSession,
                       Path(task_id): Path<TaskId>,
                       Json(update): Json<dto::task::UpdateTask>| {
                    let session = require_session(session_id, &AuthService {}, &app_state.sessions)?;
                    let mut ext_cxn = app_state.ext_cxn.clone();

                    update_task(
                        &session.user.id,
                        task_id,
                        update,
                        &mut ext_cxn,
                        &TaskService {},
                        &DbTaskWriter,
                    )
                    .await
                },
            )
            .delete(
                async |State(app_state): AppState,
                       CurrentSession(session_id): CurrentSession,
                       Path(task_id): Path<TaskId>| {
                    let session = require_session(session_id, &AuthService {}, &app_state.sessions)?;
                    let mut ext_cxn = app_state.ext_cxn.clone();

                    delete_task(
                        &session,
                        task_id,
                        &mut ext_cxn,
                        &TaskService {},
                        &DbTaskWriter,
                        &TimerService {},
                        &app_state.sessions,
                    )
                    .await
                },
            ),
        )
        .route(
            "/tasks/:task_id/toggle-complete",
            post(
                async |State(app_state): AppState,
                       CurrentSession(session_id): CurrentSession,
                       Path(task_id): Path<TaskId>| {
                    let session = require_session(session_id, &AuthService {}, &app_state.sessions)?;
                    let mut ext_cxn = app_state.ext_cxn.clone();

                    toggle_complete(
                        &session.user.id,
                        task_id,
                        &mut ext_cxn,
                        &TaskService {},
                        &DbTaskReader,
                        &DbTaskWriter,
                    )
                    .await
                },
            ),
        )
}

fn task_error_response(err: TaskError) -> ErrorResponse {
    match err {
        TaskError::Invalid(errors) => ValidationErrorResponse::from(errors).into(),
        TaskError::TaskDoesNotExist(_) => not_found("task"),
        TaskError::PortError(cause) => GenericErrorResponse(cause).into(),
    }
}

fn to_dtos(tasks: Vec<crate::domain::task::Task>) -> Vec<dto::task::Task> {
    tasks.into_iter().map(dto::task::Task::from).collect()
}

#[utoipa::path(
    get,
    path = "/tasks",
    tag = TASK_API_GROUP,
    params(dto::task::DayQuery),
    security(("session" = [])),
    responses(
        (status = 200, description = "The day's tasks in display order, or every task when no date is given", body = Vec<dto::task::Task>),
        (status = 400, response = dto::err_resps::BasicError400),
        (status = 401, response = dto::err_resps::BasicError401),
        (status = 500, response = dto::err_resps::BasicError500),
    ),
)]
#[tracing::instrument(skip(ext_cxn, task_service, task_read))]
/// Lists a user's tasks
async fn list_tasks(
    user_id: &str,
    query: dto::task::DayQuery,
    ext_cxn: &mut impl ExternalConnectivity,
    task_service: &impl TaskPort,
    task_read: &impl TaskReader,
) -> Result<Json<Vec<dto::task::Task>>, ErrorResponse> {
    let offset = query.offset().map_err(ValidationErrorResponse::from)?;
    let tasks = match query.date {
        Some(day) => {
            task_service
                .tasks_for_day(user_id, day, offset, &mut *ext_cxn, task_read)
                .await
        }
        None => {
            task_service
                .tasks_for_user(user_id, &mut *ext_cxn, task_read)
                .await
        }
    }
    .map_err(task_error_response)?;

    Ok(Json(to_dtos(tasks)))
}

#[utoipa::path(
    get,
    path = "/tasks/overdue",
    tag = TASK_API_GROUP,
    params(dto::task::DayQuery),
    security(("session" = [])),
    responses(
        (status = 200, description = "Incomplete tasks due before the given day, oldest first", body = Vec<dto::task::Task>),
        (status = 400, response = dto::err_resps::BasicError400),
        (status = 401, response = dto::err_resps::BasicError401),
        (status = 500, response = dto::err_resps::BasicError500),
    ),
)]
#[tracing::instrument(skip(ext_cxn, task_service, task_read))]
async fn overdue_tasks(
    user_id: &str,
    query: dto::task::DayQuery,
    now: DateTime<Utc>,
    ext_cxn: &mut impl ExternalConnectivity,
    task_service: &impl TaskPort,
    task_read: &impl TaskReader,
) -> Result<Json<Vec<dto::task::Task>>, ErrorResponse> {
    let offset = query.offset().map_err(ValidationErrorResponse::from)?;
    let today = query.day_or_today(offset, now);
    let tasks = task_service
        .tasks_for_user(user_id, &mut *ext_cxn, task_read)
        .await
        .map_err(task_error_response)?;

    Ok(Json(to_dtos(task_list::overdue_tasks(tasks, today, offset))))
}

#[utoipa::path(
    get,
    path = "/tasks/progress",
    tag = TASK_API_GROUP,
    params(dto::task::DayQuery),
    security(("session" = [])),
    responses(
        (status = 200, description = "Completion and time figures across all tasks", body = dto::task::Progress),
        (status = 400, response = dto::err_resps::BasicError400),
        (status = 401, response = dto::err_resps::BasicError401),
        (status = 500, response = dto::err_resps::BasicError500),
    ),
)]
#[tracing::instrument(skip(ext_cxn, task_service, task_read))]
async fn task_progress(
    user_id: &str,
    query: dto::task::DayQuery,
    now: DateTime<Utc>,
    ext_cxn: &mut impl ExternalConnectivity,
    task_service: &impl TaskPort,
    task_read: &impl TaskReader,
) -> Result<Json<dto::task::Progress>, ErrorResponse> {
    let offset = query.offset().map_err(ValidationErrorResponse::from)?;
    let today = query.day_or_today(offset, now);
    let tasks = task_service
        .tasks_for_user(user_id, &mut *ext_cxn, task_read)
        .await
        .map_err(task_error_response)?;

    Ok(Json(task_list::progress(&tasks, today, offset).into()))
}

#[utoipa::path(
    get,
    path = "/tasks/summary",
    tag = TASK_API_GROUP,
    params(dto::task::SummaryQuery),
    security(("session" = [])),
    responses(
        (status = 200, description = "Time spent per day of the week or per week of the month", body = Vec<dto::task::TimeBucket>),
        (status = 400, response = dto::err_resps::BasicError400),
        (status = 401, response = dto::err_resps::BasicError401),
        (status = 500, response = dto::err_resps::BasicError500),
    ),
)]
#[tracing::instrument(skip(ext_cxn, task_service, task_read))]
async fn time_summary(
    user_id: &str,
    query: dto::task::SummaryQuery,
    now: DateTime<Utc>,
    ext_cxn: &mut impl ExternalConnectivity,
    task_service: &impl TaskPort,
    task_read: &impl TaskReader,
) -> Result<Json<Vec<dto::task::TimeBucket>>, ErrorResponse> {
    let day_query = query.day_query();
    let offset = day_query.offset().map_err(ValidationErrorResponse::from)?;
    let day = day_query.day_or_today(offset, now);
    let tasks = task_service
        .tasks_for_user(user_id, &mut *ext_cxn, task_read)
        .await
        .map_err(task_error_response)?;

    let buckets = match query.view {
        dto::task::SummaryView::Weekly => task_list::weekly_time_summary(&tasks, day, offset),
        dto::task::SummaryView::Monthly => task_list::monthly_time_summary(&tasks, day, offset),
    };
    Ok(Json(buckets.into_iter().map(dto::task::TimeBucket::from).collect()))
}

#[utoipa::path(
    get,
    path = "/tasks/stream",
    tag = TASK_API_GROUP,
    params(dto::task::DayQuery),
    security(("session" = [])),
    responses(
        (status = 200, description = "Server-sent `tasks` events, each carrying the day's full task list. \
            The first event is the current list. An `error` event ends the stream.", content_type = "text/event-stream"),
        (status = 400, response = dto::err_resps::BasicError400),
        (status = 401, response = dto::err_resps::BasicError401),
    ),
)]
#[tracing::instrument(skip(task_service, task_subscribe))]
/// Streams the day's task list every time one of the user's tasks changes
fn task_stream(
    user_id: &str,
    query: dto::task::DayQuery,
    now: DateTime<Utc>,
    task_service: &impl TaskPort,
    task_subscribe: &impl TaskSubscriber,
) -> Result<TaskStream, ErrorResponse> {
    let offset = query.offset().map_err(ValidationErrorResponse::from)?;
    let day = query.day_or_today(offset, now);

    let events = task_service
        .day_snapshots(user_id, day, offset, task_subscribe)
        .map(|snapshot| match snapshot {
            Ok(tasks) => Event::default().event("tasks").json_data(to_dtos(tasks)),
            Err(err) => {
                error!("Task snapshot stream failed: {err:#}");
                Ok(Event::default().event("error").data("internal_error"))
            }
        })
        .boxed();

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

#[utoipa::path(
    post,
    path = "/tasks",
    tag = TASK_API_GROUP,
    request_body = dto::task::NewTask,
    security(("session" = [])),
    responses(
        (status = 201, description = "Task created", body = dto::task::InsertedTask),
        (status = 400, response = dto::err_resps::BasicError400),
        (status = 401, response = dto::err_resps::BasicError401),
        (status = 500, response = dto::err_resps::BasicError500),
    ),
)]
#[tracing::instrument(skip(new_task, ext_cxn, task_service, task_write))]
/// Creates a task for the signed-in user
async fn create_task(
    user_id: &str,
    new_task: dto::task::NewTask,
    ext_cxn: &mut impl ExternalConnectivity,
    task_service: &impl TaskPort,
    task_write: &impl TaskWriter,
) -> Result<(StatusCode, Json<dto::task::InsertedTask>), ErrorResponse> {
    new_task.validate().map_err(ValidationErrorResponse::from)?;
    let domain_task =
        crate::domain::task::NewTask::try_from(new_task).map_err(ValidationErrorResponse::from)?;

    let id = task_service
        .create_task_for_user(user_id, &domain_task, &mut *ext_cxn, task_write)
        .await
        .map_err(task_error_response)?;

    Ok((StatusCode::CREATED, Json(dto::task::InsertedTask { id })))
}

#[utoipa::path(
    post,
    path = "/tasks/reorder",
    tag = TASK_API_GROUP,
    request_body = dto::task::ReorderRequest,
    security(("session" = [])),
    responses(
        (status = 200, description = "The day's tasks in their new order", body = Vec<dto::task::Task>),
        (status = 400, response = dto::err_resps::BasicError400),
        (status = 401, response = dto::err_resps::BasicError401),
        (status = 404, response = dto::err_resps::BasicError404),
        (status = 500, response = dto::err_resps::BasicError500),
    ),
)]
#[tracing::instrument(skip(reorder, ext_cxn, task_service, task_read, task_write))]
/// Moves a task to a new position in its day's list
async fn reorder_tasks(
    user_id: &str,
    reorder: dto::task::ReorderRequest,
    ext_cxn: &mut impl Transactable,
    task_service: &impl TaskPort,
    task_read: &impl TaskReader,
    task_write: &impl TaskWriter,
) -> Result<Json<Vec<dto::task::Task>>, ErrorResponse> {
    let offset = dto::utc_offset(reorder.utc_offset_minutes).map_err(ValidationErrorResponse::from)?;
    let reordered = task_service
        .move_task(
            user_id,
            reorder.task_id,
            reorder.to_index,
            reorder.date,
            offset,
            &mut *ext_cxn,
            task_read,
            task_write,
        )
        .await
        .map_err(task_error_response)?;

    Ok(Json(to_dtos(reordered)))
}

#[utoipa::path(
    get,
    path = "/tasks/{task_id}",
    tag = TASK_API_GROUP,
    params(("task_id" = uuid::Uuid, Path, description = "ID of the task")),
    security(("session" = [])),
    responses(
        (status = 200, description = "The task", body = dto::task::Task),
        (status = 401, response = dto::err_resps::BasicError401),
        (status = 404, response = dto::err_resps::BasicError404),
        (status = 500, response = dto::err_resps::BasicError500),
    ),
)]
#[tracing::instrument(skip(ext_cxn, task_service, task_read))]
async fn get_task(
    user_id: &str,
    task_id: TaskId,
    ext_cxn: &mut impl ExternalConnectivity,
    task_service: &impl TaskPort,
    task_read: &impl TaskReader,
) -> Result<Json<dto::task::Task>, ErrorResponse> {
    let task = task_service
        .user_task_by_id(user_id, task_id, &mut *ext_cxn, task_read)
        .await
        .map_err(task_error_response)?;

    match task {
        Some(task) => Ok(Json(task.into())),
        None => Err(not_found("task")),
    }
}

#[utoipa::path(
    patch,
    path = "/tasks/{task_id}",
    tag = TASK_API_GROUP,
    params(("task_id" = uuid::Uuid, Path, description = "ID of the task")),
    request_body = dto::task::UpdateTask,
    security(("session" = [])),
    responses(
        (status = 204, description = "Task updated"),
        (status = 400, response = dto::err_resps::BasicError400),
        (status = 401, response = dto::err_resps::BasicError401),
        (status = 404, response = dto::err_resps::BasicError404),
        (status = 500, response = dto::err_resps::BasicError500),
    ),
)]
#[tracing::instrument(skip(update, ext_cxn, task_service, task_write))]
/// Updates some of a task's fields. Rescheduling is an update of the due date.
async fn update_task(
    user_id: &str,
    task_id: TaskId,
    update: dto::task::UpdateTask,
    ext_cxn: &mut impl ExternalConnectivity,
    task_service: &impl TaskPort,
    task_write: &impl TaskWriter,
) -> Result<StatusCode, ErrorResponse> {
    update.validate().map_err(ValidationErrorResponse::from)?;
    let domain_update =
        crate::domain::task::UpdateTask::try_from(update).map_err(ValidationErrorResponse::from)?;

    task_service
        .update_task(user_id, task_id, &domain_update, &mut *ext_cxn, task_write)
        .await
        .map_err(task_error_response)?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/tasks/{task_id}/toggle-complete",
    tag = TASK_API_GROUP,
    params(("task_id" = uuid::Uuid, Path, description = "ID of the task")),
    security(("session" = [])),
    responses(
        (status = 200, description = "The task's new completion state", body = dto::task::ToggleResponse),
        (status = 401, response = dto::err_resps::BasicError401),
        (status = 404, response = dto::err_resps::BasicError404),
        (status = 500, response = dto::err_resps::BasicError500),
    ),
)]
#[tracing::instrument(skip(ext_cxn, task_service, task_read, task_write))]
async fn toggle_complete(
    user_id: &str,
    task_id: TaskId,
    ext_cxn: &mut impl ExternalConnectivity,
    task_service: &impl TaskPort,
    task_read: &impl TaskReader,
    task_write: &impl TaskWriter,
) -> Result<Json<dto::task::ToggleResponse>, ErrorResponse> {
    let is_completed = task_service
        .toggle_completion(user_id, task_id, &mut *ext_cxn, task_read, task_write)
        .await
        .map_err(task_error_response)?;

    Ok(Json(dto::task::ToggleResponse { is_completed }))
}

#[utoipa::path(
    delete,
    path = "/tasks/{task_id}",
    tag = TASK_API_GROUP,
    params(("task_id" = uuid::Uuid, Path, description = "ID of the task")),
    security(("session" = [])),
    responses(
        (status = 204, description = "Task deleted, or it was already gone"),
        (status = 401, response = dto::err_resps::BasicError401),
        (status = 500, response = dto::err_resps::BasicError500),
    ),
)]
#[tracing::instrument(skip_all, fields(task_id = %task_id))]
/// Deletes a task. A timer running for it in this session is discarded.
async fn delete_task(
    session: &Session,
    task_id: TaskId,
    ext_cxn: &mut impl ExternalConnectivity,
    task_service: &impl TaskPort,
    task_write: &impl TaskWriter,
    timer_service: &impl TimerPort,
    sessions: &impl SessionStore,
) -> Result<StatusCode, ErrorResponse> {
    task_service
        .delete_task(&session.user.id, task_id, &mut *ext_cxn, task_write)
        .await
        .map_err(task_error_response)?;

    timer_service
        .discard_timer_for(session.id, task_id, sessions)
        .map_err(timer_error_response)?;

    Ok(StatusCode::NO_CONTENT)
}
