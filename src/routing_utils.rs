use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{ErrorResponse, IntoResponse, Response};
use axum_macros::FromRequest;
#[cfg(test)]
use serde::Deserialize;
use serde::Serialize;
use tracing::error;
use utoipa::openapi::{RefOr, Schema};
use utoipa::{ToSchema, openapi};
use validator::ValidationErrors;

/// Contains diagnostic information about an API failure
#[derive(Serialize, Debug, ToSchema)]
#[cfg_attr(test, derive(Deserialize))]
pub struct BasicErrorResponse {
    pub error_code: String,
    pub error_description: String,
    pub extra_info: Option<ExtraInfo>,
}

impl BasicErrorResponse {
    pub fn new(error_code: &str, error_description: &str) -> BasicErrorResponse {
        BasicErrorResponse {
            error_code: error_code.to_owned(),
            error_description: error_description.to_owned(),
            extra_info: None,
        }
    }

    pub fn with_message(mut self, message: String) -> BasicErrorResponse {
        self.extra_info = Some(ExtraInfo::Message(message));
        self
    }

    /// Pairs the body with a status code to produce a full error response
    pub fn with_status(self, status: StatusCode) -> ErrorResponse {
        (status, Json(self)).into()
    }
}

#[derive(Serialize, Debug, ToSchema)]
#[cfg_attr(test, derive(Deserialize))]
#[serde(untagged)]
pub enum ExtraInfo {
    ValidationIssues(ValidationErrorSchema),
    Message(String),
}

/// Stand-in OpenAPI schema for [ValidationErrors] which just provides an empty object
#[derive(Serialize, Debug)]
#[serde(transparent)]
pub struct ValidationErrorSchema(ValidationErrors);

#[cfg(test)]
impl<'de> Deserialize<'de> for ValidationErrorSchema {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
        let mut errors = ValidationErrors::new();
        for field in raw.keys() {
            // Field names only need to survive for assertions in tests
            let leaked: &'static str = Box::leak(field.clone().into_boxed_str());
            errors.add(leaked, validator::ValidationError::new("from_response"));
        }

        Ok(ValidationErrorSchema(errors))
    }
}

#[cfg(test)]
impl ValidationErrorSchema {
    pub fn has_field(&self, field: &str) -> bool {
        self.0.field_errors().contains_key(field)
    }
}

impl<'schem> ToSchema<'schem> for ValidationErrorSchema {
    fn schema() -> (&'schem str, RefOr<Schema>) {
        ("ValidationErrorSchema", openapi::ObjectBuilder::new().into())
    }
}

/// Response type that wraps validation errors and turns them into [BasicErrorResponse]s
pub struct ValidationErrorResponse(ValidationErrors);

impl IntoResponse for ValidationErrorResponse {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(BasicErrorResponse {
                error_code: "invalid_input".into(),
                error_description: "Submitted data was invalid.".to_owned(),
                extra_info: Some(ExtraInfo::ValidationIssues(ValidationErrorSchema(self.0))),
            }),
        )
            .into_response()
    }
}

impl From<ValidationErrors> for ValidationErrorResponse {
    fn from(value: ValidationErrors) -> Self {
        Self(value)
    }
}

/// Response type for failures the client can't do anything about. The cause is logged
/// but never sent back.
pub struct GenericErrorResponse(pub anyhow::Error);

impl IntoResponse for GenericErrorResponse {
    fn into_response(self) -> Response {
        error!("Internal failure: {:#}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(BasicErrorResponse::new(
                "internal_error",
                "An unexpected error occurred. Please try again.",
            )),
        )
            .into_response()
    }
}

/// 401 for requests without a live session
pub fn not_signed_in() -> ErrorResponse {
    not_signed_in_response().into()
}

/// [not_signed_in] for places that need a plain [Response], such as extractor rejections
pub fn not_signed_in_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(BasicErrorResponse::new("not_signed_in", "You must be signed in to do that.")),
    )
        .into_response()
}

/// 404 for entities that don't exist or belong to someone else
pub fn not_found(what: &str) -> ErrorResponse {
    BasicErrorResponse::new("not_found", &format!("The requested {what} could not be found."))
        .with_status(StatusCode::NOT_FOUND)
}

/// Wrapper for [axum::Json] which customizes the error response to use our
/// data structure for API errors
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(JsonErrorResponse))]
#[cfg_attr(test, derive(Debug))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

/// Response type representing JSON parse errors
pub struct JsonErrorResponse {
    parse_problem: String,
}

impl From<JsonRejection> for JsonErrorResponse {
    fn from(value: JsonRejection) -> Self {
        JsonErrorResponse {
            parse_problem: value.body_text(),
        }
    }
}

impl IntoResponse for JsonErrorResponse {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            axum::Json(BasicErrorResponse {
                error_code: "invalid_json".into(),
                error_description: "The passed request body contained malformed or unreadable JSON."
                    .into(),
                extra_info: Some(ExtraInfo::Message(self.parse_problem)),
            }),
        )
            .into_response()
    }
}
