//! OpenAPI descriptions of the error bodies each status code can carry. These are never
//! constructed; handlers build [BasicErrorResponse][crate::routing_utils::BasicErrorResponse]s.
#![allow(dead_code)]

use crate::routing_utils::ExtraInfo;
use utoipa::ToResponse;

#[derive(ToResponse)]
#[response(
    description = "Invalid input (`invalid_input`) or malformed JSON (`invalid_json`)",
    content_type = "application/json",
    example = json!({
        "error_code": "invalid_input",
        "error_description": "Submitted data was invalid.",
        "extra_info": null
    })
)]
pub struct BasicError400 {
    error_code: String,
    error_description: String,
    extra_info: Option<ExtraInfo>,
}

#[derive(ToResponse)]
#[response(
    description = "No live session (`not_signed_in`) or a rejected password (`wrong_password`)",
    content_type = "application/json",
    example = json!({
        "error_code": "not_signed_in",
        "error_description": "You must be signed in to do that.",
        "extra_info": null
    })
)]
pub struct BasicError401 {
    error_code: String,
    error_description: String,
    extra_info: Option<ExtraInfo>,
}

#[derive(ToResponse)]
#[response(
    description = "The entity doesn't exist for this user",
    content_type = "application/json",
    example = json!({
        "error_code": "not_found",
        "error_description": "The requested task could not be found.",
        "extra_info": null
    })
)]
pub struct BasicError404 {
    error_code: String,
    error_description: String,
    extra_info: Option<ExtraInfo>,
}

#[derive(ToResponse)]
#[response(
    description = "The request conflicts with current state: `another_timer_active`, `timer_not_running` or `email_in_use`",
    content_type = "application/json",
    example = json!({
        "error_code": "another_timer_active",
        "error_description": "A timer is already running for another task. Stop it first.",
        "extra_info": null
    })
)]
pub struct BasicError409 {
    error_code: String,
    error_description: String,
    extra_info: Option<ExtraInfo>,
}

#[derive(ToResponse)]
#[response(
    description = "Something unexpected went wrong",
    content_type = "application/json",
    example = json!({
        "error_code": "internal_error",
        "error_description": "An unexpected error occurred. Please try again.",
        "extra_info": null
    })
)]
pub struct BasicError500 {
    error_code: String,
    error_description: String,
    extra_info: Option<ExtraInfo>,
}

#[derive(ToResponse)]
#[response(
    description = "The priority suggester could not produce an answer",
    content_type = "application/json",
    example = json!({
        "error_code": "suggestion_failed",
        "error_description": "Failed to get suggestion from AI. Please try again.",
        "extra_info": null
    })
)]
pub struct BasicError502 {
    error_code: String,
    error_description: String,
    extra_info: Option<ExtraInfo>,
}
