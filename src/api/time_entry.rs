use crate::api::session::{CurrentSession, require_session};
use crate::domain::auth::AuthService;
use crate::domain::task::driven_ports::{TaskReader, TaskWriter};
use crate::domain::time_entry::TimeEntryService;
use crate::domain::time_entry::driving_ports::{TimeEntryError, TimeEntryPort};
use crate::domain::{TaskId, TimeEntryId};
use crate::external_connections::ExternalConnectivity;
use crate::persistence::db_task_driven_ports::{DbTaskReader, DbTaskWriter};
use crate::routing_utils::{GenericErrorResponse, Json, ValidationErrorResponse, not_found};
use crate::{AppState, SharedData, dto};
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::ErrorResponse;
use axum::routing::{patch, post};
use std::sync::Arc;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(paths(log_time_entry, update_time_entry, delete_time_entry))]
/// Defines the OpenAPI spec for manual time entry endpoints
pub struct TimeEntryApi;
/// Used to group time entry endpoints together in the OpenAPI documentation
pub const TIME_ENTRY_API_GROUP: &str = "Time entries";

/// Builds a router for the time entries nested under a task
pub fn time_entry_routes() -> Router<Arc<SharedData>> {
    Router::new()
        .route(
            "/tasks/:task_id/time-entries",
            post(
                async |State(app_state): AppState,
                       CurrentSession(session_id): CurrentSession,
                       Path(task_id): Path<TaskId>,
                       Json(new_entry): Json<dto::time_entry::NewTimeEntry>| {
                    let session = require_session(session_id, &AuthService {}, &app_state.sessions)?;
                    let mut ext_cxn = app_state.ext_cxn.clone();

                    log_time_entry(
                        &session.user.id,
                        task_id,
                        new_entry,
                        &mut ext_cxn,
                        &TimeEntryService {},
                        &DbTaskReader,
                        &DbTaskWriter,
                    )
                    .await
                },
            ),
        )
        .route(
            "/tasks/:task_id/time-entries/:entry_id",
            patch(
                async |State(app_state): AppState,
                       CurrentSession(session_id): CurrentSession,
                       Path((task_id, entry_id)): Path<(TaskId, TimeEntryId)>,
                       Json(update): Json<dto::time_entry::UpdateTimeEntry>| {
                    let session = require_session(session_id, &AuthService {}, &app_state.sessions)?;
                    let mut ext_cxn = app_state.ext_cxn.clone();

                    update_time_entry(
                        &session.user.id,
                        (task_id, entry_id),
                        update,
                        &mut ext_cxn,
                        &TimeEntryService {},
                        &DbTaskReader,
                        &DbTaskWriter,
                    )
                    .await
                },
            )
            .delete(
                async |State(app_state): AppState,
                       CurrentSession(session_id): CurrentSession,
                       Path((task_id, entry_id)): Path<(TaskId, TimeEntryId)>| {
                    let session = require_session(session_id, &AuthService {}, &app_state.sessions)?;
                    let mut ext_cxn = app_state.ext_cxn.clone();

                    delete_time_entry(
                        &session.user.id,
                        (task_id, entry_id),
                        &mut ext_cxn,
                        &TimeEntryService {},
                        &DbTaskReader,
                        &DbTaskWriter,
                    )
                    .await
                },
            ),
        )
}

fn time_entry_error_response(err: TimeEntryError) -> ErrorResponse {
    match err {
        TimeEntryError::Invalid(errors) => ValidationErrorResponse::from(errors).into(),
        TimeEntryError::TaskDoesNotExist(_) => not_found("task"),
        TimeEntryError::EntryDoesNotExist(_) => not_found("time entry"),
        TimeEntryError::PortError(cause) => GenericErrorResponse(cause).into(),
    }
}

#[utoipa::path(
    post,
    path = "/tasks/{task_id}/time-entries",
    tag = TIME_ENTRY_API_GROUP,
    params(("task_id" = uuid::Uuid, Path, description = "ID of the task the time was spent on")),
    request_body = dto::time_entry::NewTimeEntry,
    security(("session" = [])),
    responses(
        (status = 201, description = "Entry recorded and added to the task's time spent", body = dto::time_entry::TimeEntry),
        (status = 400, response = dto::err_resps::BasicError400),
        (status = 401, response = dto::err_resps::BasicError401),
        (status = 404, response = dto::err_resps::BasicError404),
        (status = 500, response = dto::err_resps::BasicError500),
    ),
)]
#[tracing::instrument(skip(new_entry, ext_cxn, entry_service, task_read, task_write))]
/// Logs time spent on a task by hand
async fn log_time_entry(
    user_id: &str,
    task_id: TaskId,
    new_entry: dto::time_entry::NewTimeEntry,
    ext_cxn: &mut impl ExternalConnectivity,
    entry_service: &impl TimeEntryPort,
    task_read: &impl TaskReader,
    task_write: &impl TaskWriter,
) -> Result<(StatusCode, Json<dto::time_entry::TimeEntry>), ErrorResponse> {
    let offset = new_entry.offset().map_err(ValidationErrorResponse::from)?;
    let domain_entry = crate::domain::time_entry::NewTimeEntry::from(new_entry);

    let entry = entry_service
        .log_time_entry(
            user_id,
            task_id,
            &domain_entry,
            offset,
            &mut *ext_cxn,
            task_read,
            task_write,
        )
        .await
        .map_err(time_entry_error_response)?;

    Ok((StatusCode::CREATED, Json(entry.into())))
}

#[utoipa::path(
    patch,
    path = "/tasks/{task_id}/time-entries/{entry_id}",
    tag = TIME_ENTRY_API_GROUP,
    params(
        ("task_id" = uuid::Uuid, Path, description = "ID of the task"),
        ("entry_id" = uuid::Uuid, Path, description = "ID of the time entry"),
    ),
    request_body = dto::time_entry::UpdateTimeEntry,
    security(("session" = [])),
    responses(
        (status = 200, description = "The entry after the change", body = dto::time_entry::TimeEntry),
        (status = 400, response = dto::err_resps::BasicError400),
        (status = 401, response = dto::err_resps::BasicError401),
        (status = 404, response = dto::err_resps::BasicError404),
        (status = 500, response = dto::err_resps::BasicError500),
    ),
)]
#[tracing::instrument(skip(update, ext_cxn, entry_service, task_read, task_write))]
/// Moves the start or end of an entry. The task's time spent follows the new duration.
async fn update_time_entry(
    user_id: &str,
    (task_id, entry_id): (TaskId, TimeEntryId),
    update: dto::time_entry::UpdateTimeEntry,
    ext_cxn: &mut impl ExternalConnectivity,
    entry_service: &impl TimeEntryPort,
    task_read: &impl TaskReader,
    task_write: &impl TaskWriter,
) -> Result<Json<dto::time_entry::TimeEntry>, ErrorResponse> {
    let offset = update.offset().map_err(ValidationErrorResponse::from)?;
    let domain_update = crate::domain::time_entry::TimeEntryUpdate::from(update);

    let entry = entry_service
        .update_time_entry(
            user_id,
            task_id,
            entry_id,
            &domain_update,
            offset,
            &mut *ext_cxn,
            task_read,
            task_write,
        )
        .await
        .map_err(time_entry_error_response)?;

    Ok(Json(entry.into()))
}

#[utoipa::path(
    delete,
    path = "/tasks/{task_id}/time-entries/{entry_id}",
    tag = TIME_ENTRY_API_GROUP,
    params(
        ("task_id" = uuid::Uuid, Path, description = "ID of the task"),
        ("entry_id" = uuid::Uuid, Path, description = "ID of the time entry"),
    ),
    security(("session" = [])),
    responses(
        (status = 204, description = "Entry removed, or it was already gone"),
        (status = 401, response = dto::err_resps::BasicError401),
        (status = 404, response = dto::err_resps::BasicError404),
        (status = 500, response = dto::err_resps::BasicError500),
    ),
)]
#[tracing::instrument(skip(ext_cxn, entry_service, task_read, task_write))]
async fn delete_time_entry(
    user_id: &str,
    (task_id, entry_id): (TaskId, TimeEntryId),
    ext_cxn: &mut impl ExternalConnectivity,
    entry_service: &impl TimeEntryPort,
    task_read: &impl TaskReader,
    task_write: &impl TaskWriter,
) -> Result<StatusCode, ErrorResponse> {
    entry_service
        .delete_time_entry(user_id, task_id, entry_id, &mut *ext_cxn, task_read, task_write)
        .await
        .map_err(time_entry_error_response)?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_util::{deserialize_body, error_response};
    use crate::domain::field_error;
    use crate::domain::task::TimeEntry;
    use crate::domain::task::test_util::InMemoryTaskPersistence;
    use crate::domain::time_entry::test_util::MockTimeEntryService;
    use crate::external_connections;
    use crate::routing_utils::{BasicErrorResponse, ExtraInfo};
    use chrono::{DateTime, TimeZone, Utc};
    use speculoos::prelude::*;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, hour, minute, 0).unwrap()
    }

    mod log_time_entry_tests {
        use super::*;

        #[tokio::test]
        async fn happy_path() {
            let task_id = TaskId::new_v4();
            let recorded = TimeEntry::new(at(9, 0), at(10, 30));
            let entry_service = MockTimeEntryService::new_locked();
            entry_service
                .lock()
                .unwrap()
                .log_time_entry_result
                .set_returned_result(Ok(recorded.clone()));
            let persistence = InMemoryTaskPersistence::new_locked();
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let response = log_time_entry(
                "user-1",
                task_id,
                dto::time_entry::NewTimeEntry {
                    start_time: at(9, 0),
                    end_time: at(10, 30),
                    utc_offset_minutes: -300,
                },
                &mut ext_cxn,
                &entry_service,
                &persistence,
                &persistence,
            )
            .await;
            assert_that!(response).is_ok().matches(|(status, Json(entry))| {
                *status == StatusCode::CREATED && entry.id == recorded.id && entry.duration == 5400
            });

            let locked_service = entry_service.lock().unwrap();
            assert!(matches!(
                locked_service.log_time_entry_result.calls(),
                [(id, new_entry)] if *id == task_id && new_entry.start_time == at(9, 0)
            ));
        }

        #[tokio::test]
        async fn invalid_interval_is_400() {
            let entry_service = MockTimeEntryService::new_locked();
            entry_service
                .lock()
                .unwrap()
                .log_time_entry_result
                .set_returned_result(Err(TimeEntryError::Invalid(field_error(
                    "end_time",
                    "end_before_start",
                    "End time must be after start time",
                ))));
            let persistence = InMemoryTaskPersistence::new_locked();
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let Err(response) = log_time_entry(
                "user-1",
                TaskId::new_v4(),
                dto::time_entry::NewTimeEntry {
                    start_time: at(10, 0),
                    end_time: at(9, 0),
                    utc_offset_minutes: 0,
                },
                &mut ext_cxn,
                &entry_service,
                &persistence,
                &persistence,
            )
            .await
            else {
                panic!("Backwards interval should be rejected");
            };
            let response = error_response(response);
            assert_eq!(StatusCode::BAD_REQUEST, response.status());

            let body: BasicErrorResponse = deserialize_body(response.into_body()).await;
            assert!(matches!(
                body.extra_info,
                Some(ExtraInfo::ValidationIssues(ref issues)) if issues.has_field("end_time")
            ));
        }
    }

    mod update_time_entry_tests {
        use super::*;

        #[tokio::test]
        async fn missing_entry_is_404() {
            let task_id = TaskId::new_v4();
            let entry_id = TimeEntryId::new_v4();
            let entry_service = MockTimeEntryService::new_locked();
            entry_service
                .lock()
                .unwrap()
                .update_time_entry_result
                .set_returned_result(Err(TimeEntryError::EntryDoesNotExist(entry_id)));
            let persistence = InMemoryTaskPersistence::new_locked();
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let Err(response) = update_time_entry(
                "user-1",
                (task_id, entry_id),
                dto::time_entry::UpdateTimeEntry {
                    end_time: Some(at(11, 0)),
                    ..Default::default()
                },
                &mut ext_cxn,
                &entry_service,
                &persistence,
                &persistence,
            )
            .await
            else {
                panic!("Unknown entry should not be found");
            };
            let response = error_response(response);
            assert_eq!(StatusCode::NOT_FOUND, response.status());

            let body: BasicErrorResponse = deserialize_body(response.into_body()).await;
            assert_eq!("The requested time entry could not be found.", body.error_description);
        }

        #[tokio::test]
        async fn passes_changed_end_through() {
            let task_id = TaskId::new_v4();
            let updated = TimeEntry::new(at(9, 0), at(11, 0));
            let entry_service = MockTimeEntryService::new_locked();
            entry_service
                .lock()
                .unwrap()
                .update_time_entry_result
                .set_returned_result(Ok(updated.clone()));
            let persistence = InMemoryTaskPersistence::new_locked();
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let response = update_time_entry(
                "user-1",
                (task_id, updated.id),
                dto::time_entry::UpdateTimeEntry {
                    end_time: Some(at(11, 0)),
                    ..Default::default()
                },
                &mut ext_cxn,
                &entry_service,
                &persistence,
                &persistence,
            )
            .await;
            assert_that!(response)
                .is_ok()
                .matches(|Json(entry)| entry.duration == 7200);

            let locked_service = entry_service.lock().unwrap();
            assert!(matches!(
                locked_service.update_time_entry_result.calls(),
                [(_, id, update)] if *id == updated.id
                    && update.start_time.is_none()
                    && update.end_time == Some(at(11, 0))
            ));
        }
    }

    mod delete_time_entry_tests {
        use super::*;

        #[tokio::test]
        async fn happy_path() {
            let task_id = TaskId::new_v4();
            let entry_id = TimeEntryId::new_v4();
            let entry_service = MockTimeEntryService::new_locked();
            entry_service
                .lock()
                .unwrap()
                .delete_time_entry_result
                .set_returned_result(Ok(()));
            let persistence = InMemoryTaskPersistence::new_locked();
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let response = delete_time_entry(
                "user-1",
                (task_id, entry_id),
                &mut ext_cxn,
                &entry_service,
                &persistence,
                &persistence,
            )
            .await;
            assert_that!(response).is_ok_containing(StatusCode::NO_CONTENT);
            assert_eq!(
                [(task_id, entry_id)],
                entry_service.lock().unwrap().delete_time_entry_result.calls()
            );
        }
    }
}
