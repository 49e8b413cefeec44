use crate::domain::auth::driven_ports::SessionStore;
use crate::domain::auth::driving_ports::{AuthError, AuthPort};
use crate::domain::auth::{Session, SessionId};
use crate::routing_utils::{GenericErrorResponse, ValidationErrorResponse, not_signed_in, not_signed_in_response};
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::response::{ErrorResponse, Response};

/// Session identifier taken from an `Authorization: Bearer <session id>` header. Requests
/// without a readable one are rejected with a 401 before the handler runs.
#[derive(Debug)]
pub struct CurrentSession(pub SessionId);

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentSession {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .and_then(|header| header.strip_prefix("Bearer "))
            .and_then(|token| SessionId::parse_str(token.trim()).ok())
            .map(CurrentSession)
            .ok_or_else(not_signed_in_response)
    }
}

/// Looks up the live session behind a bearer token
pub fn require_session(
    session_id: SessionId,
    auth_service: &impl AuthPort,
    sessions: &impl SessionStore,
) -> Result<Session, ErrorResponse> {
    auth_service
        .current_session(session_id, sessions)
        .map_err(auth_error_response)
}

/// Maps auth failures that can happen on any signed-in route. Routes with their own
/// wording for a wrong password handle that case before calling this.
pub fn auth_error_response(err: AuthError) -> ErrorResponse {
    match err {
        AuthError::NotSignedIn => not_signed_in(),
        AuthError::Invalid(errors) => ValidationErrorResponse::from(errors).into(),
        AuthError::Failed(cause) => GenericErrorResponse(cause).into(),
        AuthError::WrongPassword | AuthError::EmailAlreadyInUse => {
            GenericErrorResponse(anyhow::Error::new(err).context("unexpected auth failure")).into()
        }
    }
}
