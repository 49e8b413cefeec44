use crate::api::session::{CurrentSession, require_session};
use crate::domain::auth::AuthService;
use crate::domain::suggestion::SuggestionService;
use crate::domain::suggestion::driven_ports::PrioritySuggester;
use crate::domain::suggestion::driving_ports::{SuggestionError, SuggestionPort};
use crate::external_connections::ExternalConnectivity;
use crate::routing_utils::{BasicErrorResponse, Json, ValidationErrorResponse};
use crate::{AppState, SharedData, dto};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::ErrorResponse;
use axum::routing::post;
use std::sync::Arc;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(paths(suggest_priority))]
pub struct SuggestionApi;
pub const SUGGESTION_API_GROUP: &str = "Suggestions";

pub fn suggestion_routes() -> Router<Arc<SharedData>> {
    Router::new().route(
        "/priority-suggestions",
        post(
            async |State(app_state): AppState,
                   CurrentSession(session_id): CurrentSession,
                   Json(request): Json<dto::suggestion::SuggestionRequest>| {
                require_session(session_id, &AuthService {}, &app_state.sessions)?;
                let mut ext_cxn = app_state.ext_cxn.clone();

                suggest_priority(request, &mut ext_cxn, &SuggestionService {}, &app_state.suggester).await
            },
        ),
    )
}

#[utoipa::path(
    post,
    path = "/priority-suggestions",
    tag = SUGGESTION_API_GROUP,
    request_body = dto::suggestion::SuggestionRequest,
    security(("session" = [])),
    responses(
        (status = 200, description = "Suggested priority and the reasoning behind it", body = dto::suggestion::PrioritySuggestion),
        (status = 400, response = dto::err_resps::BasicError400),
        (status = 401, response = dto::err_resps::BasicError401),
        (status = 502, response = dto::err_resps::BasicError502),
    ),
)]
#[tracing::instrument(skip_all, fields(deadline = %request.deadline))]
/// Asks the suggester how urgent a draft task is. Nothing is saved.
async fn suggest_priority(
    request: dto::suggestion::SuggestionRequest,
    ext_cxn: &mut impl ExternalConnectivity,
    suggestion_service: &impl SuggestionPort,
    suggester: &impl PrioritySuggester,
) -> Result<Json<dto::suggestion::PrioritySuggestion>, ErrorResponse> {
    let draft = crate::domain::suggestion::TaskDraft::from(request);

    let suggestion = suggestion_service
        .suggest_priority(&draft, &mut *ext_cxn, suggester)
        .await
        .map_err(|err| match err {
            SuggestionError::Invalid(errors) => ErrorResponse::from(ValidationErrorResponse::from(errors)),
            SuggestionError::Failed(_) => BasicErrorResponse::new(
                "suggestion_failed",
                "Failed to get suggestion from AI. Please try again.",
            )
            .with_status(StatusCode::BAD_GATEWAY),
        })?;

    Ok(Json(suggestion.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_util::{deserialize_body, error_response};
    use crate::domain::field_error;
    use crate::domain::suggestion::PrioritySuggestion;
    use crate::domain::suggestion::test_util::{FakeSuggester, MockSuggestionService};
    use crate::domain::task::Priority;
    use crate::external_connections;
    use anyhow::anyhow;
    use chrono::NaiveDate;
    use speculoos::prelude::*;

    fn request() -> dto::suggestion::SuggestionRequest {
        dto::suggestion::SuggestionRequest {
            title: "File taxes".to_owned(),
            description: Some("Penalties start next week".to_owned()),
            deadline: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
        }
    }

    #[tokio::test]
    async fn returns_suggestion() {
        let suggestion_service = MockSuggestionService::new_locked();
        suggestion_service
            .lock()
            .unwrap()
            .suggest_priority_result
            .set_returned_result(Ok(PrioritySuggestion {
                priority: Priority::High,
                reason: "Due tomorrow".to_owned(),
            }));
        let suggester = FakeSuggester::new_locked();
        let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

        let response = suggest_priority(request(), &mut ext_cxn, &suggestion_service, &suggester).await;
        assert_that!(response).is_ok().matches(|Json(suggestion)| {
            suggestion.priority == dto::task::Priority::High && suggestion.reason == "Due tomorrow"
        });

        let locked_service = suggestion_service.lock().unwrap();
        assert!(matches!(
            locked_service.suggest_priority_result.calls(),
            [draft] if draft.title == "File taxes"
        ));
    }

    #[tokio::test]
    async fn empty_draft_is_400() {
        let suggestion_service = MockSuggestionService::new_locked();
        suggestion_service
            .lock()
            .unwrap()
            .suggest_priority_result
            .set_returned_result(Err(SuggestionError::Invalid(field_error(
                "title",
                "required",
                "Please enter a title or description first.",
            ))));
        let suggester = FakeSuggester::new_locked();
        let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

        let Err(response) = suggest_priority(request(), &mut ext_cxn, &suggestion_service, &suggester).await else {
            panic!("Empty draft should be rejected");
        };
        assert_eq!(StatusCode::BAD_REQUEST, error_response(response).status());
    }

    #[tokio::test]
    async fn suggester_failure_is_502() {
        let suggestion_service = MockSuggestionService::new_locked();
        suggestion_service
            .lock()
            .unwrap()
            .suggest_priority_result
            .set_returned_result(Err(SuggestionError::Failed(anyhow!("model overloaded"))));
        let suggester = FakeSuggester::new_locked();
        let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

        let Err(response) = suggest_priority(request(), &mut ext_cxn, &suggestion_service, &suggester).await else {
            panic!("Suggester failure should surface");
        };
        let response = error_response(response);
        assert_eq!(StatusCode::BAD_GATEWAY, response.status());

        let body: BasicErrorResponse = deserialize_body(response.into_body()).await;
        assert_eq!("suggestion_failed", body.error_code);
        assert_eq!("Failed to get suggestion from AI. Please try again.", body.error_description);
    }
}
