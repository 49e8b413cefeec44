use crate::domain::auth::driven_ports::{IdentityProvider, ProviderError, SessionStore};
use crate::domain::auth::driving_ports::AuthError;
use crate::domain::timer::TimerState;
use crate::domain::{UserId, field_error};
use crate::external_connections::ExternalConnectivity;
use anyhow::Context;
use tracing::{info, warn};
use uuid::Uuid;
use validator::ValidationErrors;

pub type SessionId = Uuid;

/// Minimum password length enforced by the identity provider
pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub email: String,
    pub avatar_url: Option<String>,
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct SignUp {
    pub display_name: String,
    pub credentials: Credentials,
}

impl SignUp {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        if self.display_name.trim().is_empty() {
            return Err(field_error("display_name", "required", "Name is required"));
        }
        if self.credentials.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(field_error(
                "password",
                "too_short",
                "Password must be at least 6 characters",
            ));
        }

        Ok(())
    }
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

impl PasswordChange {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        if self.current_password.is_empty() {
            return Err(field_error(
                "current_password",
                "required",
                "Current password is required",
            ));
        }
        if self.new_password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(field_error(
                "new_password",
                "too_short",
                "New password must be at least 6 characters",
            ));
        }
        if self.new_password != self.confirm_password {
            return Err(field_error(
                "confirm_password",
                "must_match",
                "New passwords don't match",
            ));
        }

        Ok(())
    }
}

/// A user as confirmed by the identity provider, along with the token proving it
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub id_token: String,
}

/// Server-side state for one signed-in client
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub user: User,
    pub id_token: String,
    pub timer: TimerState,
}

impl Session {
    pub fn new(authenticated: AuthenticatedUser) -> Session {
        Session {
            id: SessionId::new_v4(),
            user: authenticated.user,
            id_token: authenticated.id_token,
            timer: TimerState::Idle,
        }
    }
}

pub mod driven_ports {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum ProviderError {
        #[error("the password was incorrect")]
        WrongPassword,
        #[error("an account with that email already exists")]
        EmailAlreadyInUse,
        #[error("the password was rejected as too weak")]
        WeakPassword,
        #[error(transparent)]
        Other(#[from] anyhow::Error),
    }

    /// The external account service. It owns users and passwords; this service only
    /// ever sees the tokens it hands back.
    pub trait IdentityProvider {
        async fn sign_up(
            &self,
            display_name: &str,
            credentials: &Credentials,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<AuthenticatedUser, ProviderError>;
        async fn sign_in(
            &self,
            credentials: &Credentials,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<AuthenticatedUser, ProviderError>;
        /// Returns a replacement ID token, since changing the password invalidates the old one
        async fn update_password(
            &self,
            id_token: &str,
            new_password: &str,
            ext_cxn: &mut impl ExternalConnectivity,
        ) -> Result<String, ProviderError>;
    }

    pub trait SessionStore {
        fn session(&self, session_id: SessionId) -> Result<Option<Session>, anyhow::Error>;
        fn save(&self, session: Session) -> Result<(), anyhow::Error>;
        /// Changes the stored session in place. No other change to the same session can
        /// interleave with `change`. Returns [None] if the session doesn't exist.
        fn update<R>(
            &self,
            session_id: SessionId,
            change: impl FnOnce(&mut Session) -> R,
        ) -> Result<Option<R>, anyhow::Error>;
        fn remove(&self, session_id: SessionId) -> Result<Option<Session>, anyhow::Error>;
    }
}

pub mod driving_ports {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum AuthError {
        #[error("sign-in data was invalid: {0}")]
        Invalid(#[from] ValidationErrors),
        #[error("the current password is incorrect")]
        WrongPassword,
        #[error("an account with this email already exists")]
        EmailAlreadyInUse,
        #[error("no active session")]
        NotSignedIn,
        #[error(transparent)]
        Failed(#[from] anyhow::Error),
    }

    pub trait AuthPort {
        async fn sign_up(
            &self,
            sign_up: &SignUp,
            ext_cxn: &mut impl ExternalConnectivity,
            identity: &impl IdentityProvider,
            sessions: &impl SessionStore,
        ) -> Result<Session, AuthError>;
        async fn sign_in(
            &self,
            credentials: &Credentials,
            ext_cxn: &mut impl ExternalConnectivity,
            identity: &impl IdentityProvider,
            sessions: &impl SessionStore,
        ) -> Result<Session, AuthError>;
        fn sign_out(&self, session_id: SessionId, sessions: &impl SessionStore) -> Result<(), AuthError>;
        fn current_session(&self, session_id: SessionId, sessions: &impl SessionStore) -> Result<Session, AuthError>;
        /// Re-checks the current password before setting the new one
        async fn change_password(
            &self,
            session_id: SessionId,
            change: &PasswordChange,
            ext_cxn: &mut impl ExternalConnectivity,
            identity: &impl IdentityProvider,
            sessions: &impl SessionStore,
        ) -> Result<(), AuthError>;
    }
}

fn weak_password(field: &'static str) -> AuthError {
    AuthError::Invalid(field_error(
        field,
        "weak_password",
        "Password must be at least 6 characters",
    ))
}

pub struct AuthService {}

impl driving_ports::AuthPort for AuthService {
    async fn sign_up(
        &self,
        sign_up: &SignUp,
        ext_cxn: &mut impl ExternalConnectivity,
        identity: &impl IdentityProvider,
        sessions: &impl SessionStore,
    ) -> Result<Session, AuthError> {
        sign_up.validate()?;

        let signed_up = identity
            .sign_up(sign_up.display_name.trim(), &sign_up.credentials, &mut *ext_cxn)
            .await;
        let authenticated = match signed_up {
            Ok(authenticated) => authenticated,
            Err(ProviderError::EmailAlreadyInUse) => return Err(AuthError::EmailAlreadyInUse),
            Err(ProviderError::WeakPassword) => return Err(weak_password("password")),
            Err(ProviderError::WrongPassword) => {
                return Err(AuthError::Failed(anyhow::anyhow!(
                    "identity provider rejected a password during sign-up"
                )));
            }
            Err(ProviderError::Other(err)) => return Err(AuthError::Failed(err.context("signing up"))),
        };

        let session = Session::new(authenticated);
        sessions.save(session.clone()).context("saving a new session")?;
        info!("User {} signed up", session.user.id);
        Ok(session)
    }

    async fn sign_in(
        &self,
        credentials: &Credentials,
        ext_cxn: &mut impl ExternalConnectivity,
        identity: &impl IdentityProvider,
        sessions: &impl SessionStore,
    ) -> Result<Session, AuthError> {
        let authenticated = match identity.sign_in(credentials, &mut *ext_cxn).await {
            Ok(authenticated) => authenticated,
            Err(ProviderError::WrongPassword) => return Err(AuthError::WrongPassword),
            Err(err) => return Err(AuthError::Failed(anyhow::Error::new(err).context("signing in"))),
        };

        let session = Session::new(authenticated);
        sessions.save(session.clone()).context("saving a new session")?;
        info!("User {} signed in", session.user.id);
        Ok(session)
    }

    fn sign_out(&self, session_id: SessionId, sessions: &impl SessionStore) -> Result<(), AuthError> {
        let removed = sessions.remove(session_id).context("removing a session")?;
        if let Some(Session {
            timer: TimerState::Running { task_id, .. },
            ..
        }) = removed
        {
            warn!("Session {session_id} signed out with a timer running for task {task_id}");
        }

        Ok(())
    }

    fn current_session(&self, session_id: SessionId, sessions: &impl SessionStore) -> Result<Session, AuthError> {
        sessions
            .session(session_id)
            .context("looking up a session")?
            .ok_or(AuthError::NotSignedIn)
    }

    async fn change_password(
        &self,
        session_id: SessionId,
        change: &PasswordChange,
        ext_cxn: &mut impl ExternalConnectivity,
        identity: &impl IdentityProvider,
        sessions: &impl SessionStore,
    ) -> Result<(), AuthError> {
        change.validate()?;
        let session = self.current_session(session_id, sessions)?;

        let reauthenticated = identity
            .sign_in(
                &Credentials {
                    email: session.user.email.clone(),
                    password: change.current_password.clone(),
                },
                &mut *ext_cxn,
            )
            .await;
        let reauthenticated = match reauthenticated {
            Ok(reauthenticated) => reauthenticated,
            Err(ProviderError::WrongPassword) => return Err(AuthError::WrongPassword),
            Err(err) => {
                return Err(AuthError::Failed(
                    anyhow::Error::new(err).context("re-authenticating to change a password"),
                ));
            }
        };

        let new_token = match identity
            .update_password(&reauthenticated.id_token, &change.new_password, &mut *ext_cxn)
            .await
        {
            Ok(new_token) => new_token,
            Err(ProviderError::WeakPassword) => return Err(weak_password("new_password")),
            Err(err) => {
                return Err(AuthError::Failed(
                    anyhow::Error::new(err).context("updating a password"),
                ));
            }
        };

        // Only the token is replaced, the timer may have changed while the provider was called
        sessions
            .update(session_id, |session| session.id_token = new_token)
            .context("saving a refreshed session")?
            .ok_or(AuthError::NotSignedIn)?;
        info!("Password changed for session {session_id}");
        Ok(())
    }
}
