use crate::api::session::{CurrentSession, auth_error_response, require_session};
use crate::domain::auth::driven_ports::{IdentityProvider, SessionStore};
use crate::domain::auth::driving_ports::{AuthError, AuthPort};
use crate::domain::auth::{AuthService, Session, SessionId};
use crate::external_connections::ExternalConnectivity;
use crate::routing_utils::{BasicErrorResponse, Json, ValidationErrorResponse};
use crate::{AppState, SharedData, dto};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::ErrorResponse;
use axum::routing::{get, post};
use std::sync::Arc;
use utoipa::OpenApi;
use validator::Validate;

#[derive(OpenApi)]
#[openapi(paths(sign_up, sign_in, sign_out, current_user, change_password))]
/// Defines the OpenAPI spec for account and session endpoints
pub struct AuthApi;
/// Used to group auth endpoints together in the OpenAPI documentation
pub const AUTH_API_GROUP: &str = "Auth";

/// Builds a router for everything under "/auth"
pub fn auth_routes() -> Router<Arc<SharedData>> {
    Router::new()
        .route(
            "/sign-up",
            post(async |State(app_state): AppState, Json(new_account): Json<dto::auth::SignUp>| {
                let mut ext_cxn = app_state.ext_cxn.clone();

                sign_up(
                    new_account,
                    &mut ext_cxn,
                    &AuthService {},
                    &app_state.identity,
                    &app_state.sessions,
                )
                .await
            }),
        )
        .route(
            "/sign-in",
            post(async |State(app_state): AppState, Json(credentials): Json<dto::auth::SignIn>| {
                let mut ext_cxn = app_state.ext_cxn.clone();

                sign_in(
                    credentials,
                    &mut ext_cxn,
                    &AuthService {},
                    &app_state.identity,
                    &app_state.sessions,
                )
                .await
            }),
        )
        .route(
            "/sign-out",
            post(
                async |State(app_state): AppState, CurrentSession(session_id): CurrentSession| {
                    sign_out(session_id, &AuthService {}, &app_state.sessions)
                },
            ),
        )
        .route(
            "/me",
            get(
                async |State(app_state): AppState, CurrentSession(session_id): CurrentSession| {
                    let session = require_session(session_id, &AuthService {}, &app_state.sessions)?;

                    Ok::<_, ErrorResponse>(current_user(&session))
                },
            ),
        )
        .route(
            "/password",
            post(
                async |State(app_state): AppState,
                       CurrentSession(session_id): CurrentSession,
                       Json(change): Json<dto::auth::ChangePassword>| {
                    let mut ext_cxn = app_state.ext_cxn.clone();

                    change_password(
                        session_id,
                        change,
                        &mut ext_cxn,
                        &AuthService {},
                        &app_state.identity,
                        &app_state.sessions,
                    )
                    .await
                },
            ),
        )
}

fn wrong_password(description: &str) -> ErrorResponse {
    BasicErrorResponse::new("wrong_password", description).with_status(StatusCode::UNAUTHORIZED)
}

#[utoipa::path(
    post,
    path = "/auth/sign-up",
    tag = AUTH_API_GROUP,
    request_body = dto::auth::SignUp,
    responses(
        (status = 201, description = "Account created and signed in", body = dto::auth::SessionCreated),
        (status = 400, response = dto::err_resps::BasicError400),
        (status = 409, response = dto::err_resps::BasicError409),
        (status = 500, response = dto::err_resps::BasicError500),
    ),
)]
#[tracing::instrument(skip(new_account, ext_cxn, auth_service, identity, sessions), fields(account = %new_account))]
/// Creates an account and signs it in
async fn sign_up(
    new_account: dto::auth::SignUp,
    ext_cxn: &mut impl ExternalConnectivity,
    auth_service: &impl AuthPort,
    identity: &impl IdentityProvider,
    sessions: &impl SessionStore,
) -> Result<(StatusCode, Json<dto::auth::SessionCreated>), ErrorResponse> {
    new_account.validate().map_err(ValidationErrorResponse::from)?;
    let domain_sign_up = crate::domain::auth::SignUp::from(new_account);

    let session = auth_service
        .sign_up(&domain_sign_up, &mut *ext_cxn, identity, sessions)
        .await
        .map_err(|err| match err {
            AuthError::EmailAlreadyInUse => BasicErrorResponse::new(
                "email_in_use",
                "An account with this email already exists. Please log in.",
            )
            .with_status(StatusCode::CONFLICT),
            other => auth_error_response(other),
        })?;

    Ok((StatusCode::CREATED, Json(session.into())))
}

#[utoipa::path(
    post,
    path = "/auth/sign-in",
    tag = AUTH_API_GROUP,
    request_body = dto::auth::SignIn,
    responses(
        (status = 200, description = "Signed in", body = dto::auth::SessionCreated),
        (status = 400, response = dto::err_resps::BasicError400),
        (status = 401, response = dto::err_resps::BasicError401),
        (status = 500, response = dto::err_resps::BasicError500),
    ),
)]
#[tracing::instrument(skip_all, fields(email = %credentials.email))]
async fn sign_in(
    credentials: dto::auth::SignIn,
    ext_cxn: &mut impl ExternalConnectivity,
    auth_service: &impl AuthPort,
    identity: &impl IdentityProvider,
    sessions: &impl SessionStore,
) -> Result<Json<dto::auth::SessionCreated>, ErrorResponse> {
    credentials.validate().map_err(ValidationErrorResponse::from)?;
    let domain_credentials = crate::domain::auth::Credentials::from(credentials);

    let session = auth_service
        .sign_in(&domain_credentials, &mut *ext_cxn, identity, sessions)
        .await
        .map_err(|err| match err {
            AuthError::WrongPassword => {
                wrong_password("The email or password you entered is incorrect.")
            }
            other => auth_error_response(other),
        })?;

    Ok(Json(session.into()))
}

#[utoipa::path(
    post,
    path = "/auth/sign-out",
    tag = AUTH_API_GROUP,
    security(("session" = [])),
    responses(
        (status = 204, description = "Session ended. A running timer is discarded."),
        (status = 401, response = dto::err_resps::BasicError401),
        (status = 500, response = dto::err_resps::BasicError500),
    ),
)]
#[tracing::instrument(skip(auth_service, sessions))]
fn sign_out(
    session_id: SessionId,
    auth_service: &impl AuthPort,
    sessions: &impl SessionStore,
) -> Result<StatusCode, ErrorResponse> {
    auth_service
        .sign_out(session_id, sessions)
        .map_err(auth_error_response)?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = AUTH_API_GROUP,
    security(("session" = [])),
    responses(
        (status = 200, description = "The signed-in user", body = dto::auth::User),
        (status = 401, response = dto::err_resps::BasicError401),
    ),
)]
fn current_user(session: &Session) -> Json<dto::auth::User> {
    Json(session.user.clone().into())
}

#[utoipa::path(
    post,
    path = "/auth/password",
    tag = AUTH_API_GROUP,
    request_body = dto::auth::ChangePassword,
    security(("session" = [])),
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, response = dto::err_resps::BasicError400),
        (status = 401, response = dto::err_resps::BasicError401),
        (status = 500, response = dto::err_resps::BasicError500),
    ),
)]
#[tracing::instrument(skip(change, ext_cxn, auth_service, identity, sessions))]
/// Changes the signed-in user's password after re-checking the current one
async fn change_password(
    session_id: SessionId,
    change: dto::auth::ChangePassword,
    ext_cxn: &mut impl ExternalConnectivity,
    auth_service: &impl AuthPort,
    identity: &impl IdentityProvider,
    sessions: &impl SessionStore,
) -> Result<StatusCode, ErrorResponse> {
    let domain_change = crate::domain::auth::PasswordChange::from(change);

    auth_service
        .change_password(session_id, &domain_change, &mut *ext_cxn, identity, sessions)
        .await
        .map_err(|err| match err {
            AuthError::WrongPassword => {
                wrong_password("The current password you entered is incorrect.")
            }
            other => auth_error_response(other),
        })?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_util::{deserialize_body, error_response};
    use crate::domain::auth::test_util::InMemoryIdentityProvider;
    use crate::domain::test_util::Connectivity;
    use crate::external_connections;
    use crate::persistence::session_store::InMemorySessionStore;
    use crate::routing_utils::ExtraInfo;
    use speculoos::prelude::*;

    async fn error_body(response: ErrorResponse) -> (StatusCode, BasicErrorResponse) {
        let response = error_response(response);
        let status = response.status();
        (status, deserialize_body(response.into_body()).await)
    }

    fn jane_sign_up() -> dto::auth::SignUp {
        dto::auth::SignUp {
            name: "Jane Doe".to_owned(),
            email: "jane@example.com".to_owned(),
            password: "hunter22".to_owned(),
        }
    }

    mod sign_up_tests {
        use super::*;

        #[tokio::test]
        async fn creates_a_live_session() {
            let identity = InMemoryIdentityProvider::new_locked();
            let sessions = InMemorySessionStore::new();
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let response = sign_up(jane_sign_up(), &mut ext_cxn, &AuthService {}, &identity, &sessions).await;
            let Ok((status, Json(created))) = response else {
                panic!("Sign-up should succeed");
            };
            assert_eq!(StatusCode::CREATED, status);
            assert_eq!("Jane Doe", created.user.display_name);

            let stored = sessions.session(created.session_id).unwrap();
            assert!(matches!(stored, Some(Session { ref user, .. }) if user.email == "jane@example.com"));
        }

        #[tokio::test]
        async fn taken_email_is_409() {
            let identity = InMemoryIdentityProvider::new_locked();
            identity
                .write()
                .unwrap()
                .add_account("Jane", "jane@example.com", "secret1");
            let sessions = InMemorySessionStore::new();
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let Err(response) = sign_up(jane_sign_up(), &mut ext_cxn, &AuthService {}, &identity, &sessions).await
            else {
                panic!("Duplicate email should be rejected");
            };
            let (status, body) = error_body(response).await;
            assert_eq!(StatusCode::CONFLICT, status);
            assert_eq!("email_in_use", body.error_code);
            assert_eq!(
                "An account with this email already exists. Please log in.",
                body.error_description
            );
        }

        #[tokio::test]
        async fn bad_email_never_reaches_provider() {
            let identity = InMemoryIdentityProvider::new_locked();
            identity.write().unwrap().connected = Connectivity::Disconnected;
            let sessions = InMemorySessionStore::new();
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();
            let mut new_account = jane_sign_up();
            new_account.email = "jane".to_owned();

            let Err(response) = sign_up(new_account, &mut ext_cxn, &AuthService {}, &identity, &sessions).await
            else {
                panic!("Invalid email should be rejected");
            };
            let (status, body) = error_body(response).await;
            assert_eq!(StatusCode::BAD_REQUEST, status);
            assert!(matches!(
                body.extra_info,
                Some(ExtraInfo::ValidationIssues(ref issues)) if issues.has_field("email")
            ));
        }

        #[tokio::test]
        async fn provider_outage_is_500() {
            let identity = InMemoryIdentityProvider::new_locked();
            identity.write().unwrap().connected = Connectivity::Disconnected;
            let sessions = InMemorySessionStore::new();
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let Err(response) = sign_up(jane_sign_up(), &mut ext_cxn, &AuthService {}, &identity, &sessions).await
            else {
                panic!("Provider outage should fail sign-up");
            };
            let (status, body) = error_body(response).await;
            assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, status);
            assert_eq!("internal_error", body.error_code);
        }
    }

    mod sign_in_tests {
        use super::*;

        #[tokio::test]
        async fn wrong_password_is_401() {
            let identity = InMemoryIdentityProvider::new_locked();
            identity
                .write()
                .unwrap()
                .add_account("Jane", "jane@example.com", "secret1");
            let sessions = InMemorySessionStore::new();
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let Err(response) = sign_in(
                dto::auth::SignIn {
                    email: "jane@example.com".to_owned(),
                    password: "secret2".to_owned(),
                },
                &mut ext_cxn,
                &AuthService {},
                &identity,
                &sessions,
            )
            .await
            else {
                panic!("Wrong password should be rejected");
            };
            let (status, body) = error_body(response).await;
            assert_eq!(StatusCode::UNAUTHORIZED, status);
            assert_eq!("wrong_password", body.error_code);
        }

        #[tokio::test]
        async fn sign_in_then_out() {
            let identity = InMemoryIdentityProvider::new_locked();
            let user = identity
                .write()
                .unwrap()
                .add_account("Jane", "jane@example.com", "secret1");
            let sessions = InMemorySessionStore::new();
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let response = sign_in(
                dto::auth::SignIn {
                    email: "jane@example.com".to_owned(),
                    password: "secret1".to_owned(),
                },
                &mut ext_cxn,
                &AuthService {},
                &identity,
                &sessions,
            )
            .await;
            let Ok(Json(created)) = response else {
                panic!("Sign-in should succeed");
            };
            assert_eq!(user.id, created.user.id);

            let signed_out = sign_out(created.session_id, &AuthService {}, &sessions);
            assert_that!(signed_out).is_ok_containing(StatusCode::NO_CONTENT);
            assert!(sessions.session(created.session_id).unwrap().is_none());
        }
    }

    mod current_user_tests {
        use super::*;
        use crate::domain::auth::{AuthenticatedUser, User};

        #[test]
        fn returns_session_user() {
            let session = Session::new(AuthenticatedUser {
                user: User {
                    id: "user-1".to_owned(),
                    display_name: "Jane".to_owned(),
                    email: "jane@example.com".to_owned(),
                    avatar_url: Some("https://example.com/jane.png".to_owned()),
                },
                id_token: "token".to_owned(),
            });

            let Json(user) = current_user(&session);
            assert_eq!(
                dto::auth::User {
                    id: "user-1".to_owned(),
                    display_name: "Jane".to_owned(),
                    email: "jane@example.com".to_owned(),
                    avatar_url: Some("https://example.com/jane.png".to_owned()),
                },
                user
            );
        }
    }

    mod change_password_tests {
        use super::*;
        use crate::domain::auth::Credentials;

        async fn signed_in(
            identity: &std::sync::RwLock<InMemoryIdentityProvider>,
            sessions: &InMemorySessionStore,
        ) -> SessionId {
            identity
                .write()
                .unwrap()
                .add_account("Jane", "jane@example.com", "secret1");
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();
            let session = AuthService {}
                .sign_in(
                    &Credentials {
                        email: "jane@example.com".to_owned(),
                        password: "secret1".to_owned(),
                    },
                    &mut ext_cxn,
                    identity,
                    sessions,
                )
                .await
                .unwrap();
            session.id
        }

        fn change(current: &str, new: &str, confirm: &str) -> dto::auth::ChangePassword {
            dto::auth::ChangePassword {
                current_password: current.to_owned(),
                new_password: new.to_owned(),
                confirm_password: confirm.to_owned(),
            }
        }

        #[tokio::test]
        async fn happy_path() {
            let identity = InMemoryIdentityProvider::new_locked();
            let sessions = InMemorySessionStore::new();
            let session_id = signed_in(&identity, &sessions).await;
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let response = change_password(
                session_id,
                change("secret1", "secret2", "secret2"),
                &mut ext_cxn,
                &AuthService {},
                &identity,
                &sessions,
            )
            .await;
            assert_that!(response).is_ok_containing(StatusCode::NO_CONTENT);
            assert_eq!("secret2", identity.read().unwrap().accounts[0].password);
        }

        #[tokio::test]
        async fn wrong_current_password_is_401() {
            let identity = InMemoryIdentityProvider::new_locked();
            let sessions = InMemorySessionStore::new();
            let session_id = signed_in(&identity, &sessions).await;
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let Err(response) = change_password(
                session_id,
                change("nope-nope", "secret2", "secret2"),
                &mut ext_cxn,
                &AuthService {},
                &identity,
                &sessions,
            )
            .await
            else {
                panic!("Wrong current password should be rejected");
            };
            let (status, body) = error_body(response).await;
            assert_eq!(StatusCode::UNAUTHORIZED, status);
            assert_eq!("The current password you entered is incorrect.", body.error_description);
        }

        #[tokio::test]
        async fn mismatched_confirmation_is_400() {
            let identity = InMemoryIdentityProvider::new_locked();
            let sessions = InMemorySessionStore::new();
            let session_id = signed_in(&identity, &sessions).await;
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let Err(response) = change_password(
                session_id,
                change("secret1", "secret2", "secret3"),
                &mut ext_cxn,
                &AuthService {},
                &identity,
                &sessions,
            )
            .await
            else {
                panic!("Mismatched passwords should be rejected");
            };
            let (status, body) = error_body(response).await;
            assert_eq!(StatusCode::BAD_REQUEST, status);
            assert!(matches!(
                body.extra_info,
                Some(ExtraInfo::ValidationIssues(ref issues)) if issues.has_field("confirm_password")
            ));
        }

        #[tokio::test]
        async fn unknown_session_is_401() {
            let identity = InMemoryIdentityProvider::new_locked();
            let sessions = InMemorySessionStore::new();
            let mut ext_cxn = external_connections::test_util::FakeExternalConnectivity::new();

            let Err(response) = change_password(
                SessionId::new_v4(),
                change("secret1", "secret2", "secret2"),
                &mut ext_cxn,
                &AuthService {},
                &identity,
                &sessions,
            )
            .await
            else {
                panic!("Password change needs a session");
            };
            let (status, body) = error_body(response).await;
            assert_eq!(StatusCode::UNAUTHORIZED, status);
            assert_eq!("not_signed_in", body.error_code);
        }
    }
}
