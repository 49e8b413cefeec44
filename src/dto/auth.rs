use crate::domain;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// DTO for creating an account via the API
#[derive(Deserialize, Display, Validate, ToSchema)]
#[display("{name} <{email}>")]
#[cfg_attr(test, derive(Serialize))]
pub struct SignUp {
    #[validate(length(min = 1, max = 100))]
    #[schema(example = "Jane Doe")]
    pub name: String,
    #[validate(email)]
    #[schema(example = "jane@example.com")]
    pub email: String,
    #[validate(length(min = 6))]
    pub password: String,
}

impl From<SignUp> for domain::auth::SignUp {
    fn from(value: SignUp) -> Self {
        domain::auth::SignUp {
            display_name: value.name,
            credentials: domain::auth::Credentials {
                email: value.email,
                password: value.password,
            },
        }
    }
}

#[derive(Deserialize, Validate, ToSchema)]
#[cfg_attr(test, derive(Serialize))]
pub struct SignIn {
    #[validate(email)]
    #[schema(example = "jane@example.com")]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

impl From<SignIn> for domain::auth::Credentials {
    fn from(value: SignIn) -> Self {
        domain::auth::Credentials {
            email: value.email,
            password: value.password,
        }
    }
}

/// DTO for a signed-in user
#[derive(Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize, Debug, PartialEq, Eq))]
pub struct User {
    #[schema(example = "Xy3kz0aQ9")]
    pub id: String,
    #[schema(example = "Jane Doe")]
    pub display_name: String,
    #[schema(example = "jane@example.com")]
    pub email: String,
    pub avatar_url: Option<String>,
}

impl From<domain::auth::User> for User {
    fn from(value: domain::auth::User) -> Self {
        User {
            id: value.id,
            display_name: value.display_name,
            email: value.email,
            avatar_url: value.avatar_url,
        }
    }
}

/// A new session. Send `session_id` as a bearer token on later requests.
#[derive(Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize, Debug))]
pub struct SessionCreated {
    pub session_id: Uuid,
    pub user: User,
}

impl From<domain::auth::Session> for SessionCreated {
    fn from(value: domain::auth::Session) -> Self {
        SessionCreated {
            session_id: value.id,
            user: value.user.into(),
        }
    }
}

/// Password rules are checked by the service so each problem gets its own message
#[derive(Deserialize, ToSchema)]
#[cfg_attr(test, derive(Serialize))]
pub struct ChangePassword {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

impl From<ChangePassword> for domain::auth::PasswordChange {
    fn from(value: ChangePassword) -> Self {
        domain::auth::PasswordChange {
            current_password: value.current_password,
            new_password: value.new_password,
            confirm_password: value.confirm_password,
        }
    }
}
