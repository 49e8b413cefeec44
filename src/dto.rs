use crate::domain::field_error;
use chrono::FixedOffset;
use utoipa::OpenApi;
use validator::ValidationErrors;

pub mod auth;
pub mod err_resps;
pub mod suggestion;
pub mod task;
pub mod time_entry;
pub mod timer;

#[derive(OpenApi)]
#[openapi(
    components(
        schemas(
            auth::SignUp,
            auth::SignIn,
            auth::SessionCreated,
            auth::User,
            auth::ChangePassword,
            task::Priority,
            task::Task,
            task::NewTask,
            task::UpdateTask,
            task::InsertedTask,
            task::ToggleResponse,
            task::ReorderRequest,
            task::SummaryView,
            task::Progress,
            task::TimeBucket,
            time_entry::TimeEntry,
            time_entry::NewTimeEntry,
            time_entry::UpdateTimeEntry,
            timer::TimerStatus,
            suggestion::SuggestionRequest,
            suggestion::PrioritySuggestion,
            crate::routing_utils::BasicErrorResponse,
            crate::routing_utils::ExtraInfo,
            crate::routing_utils::ValidationErrorSchema,
        ),
        responses(
            err_resps::BasicError400,
            err_resps::BasicError401,
            err_resps::BasicError404,
            err_resps::BasicError409,
            err_resps::BasicError500,
            err_resps::BasicError502,
        ),
    ),
)]
/// Captures OpenAPI schemas and canned responses defined in the DTO module
pub struct OpenApiSchemas;

/// Turns the caller's UTC offset in minutes into a [FixedOffset]. Offsets of a day or
/// more are rejected.
pub fn utc_offset(minutes: i32) -> Result<FixedOffset, ValidationErrors> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| {
            field_error(
                "utc_offset_minutes",
                "out_of_range",
                "UTC offset must be less than a day",
            )
        })
}
