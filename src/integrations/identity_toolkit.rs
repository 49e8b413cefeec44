use crate::domain::auth::driven_ports::{IdentityProvider, ProviderError};
use crate::domain::auth::{AuthenticatedUser, Credentials, User};
use crate::external_connections::ExternalConnectivity;
use anyhow::{Context, anyhow};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Identity provider backed by the Identity Toolkit REST API (the service behind Firebase
/// email/password accounts)
pub struct IdentityToolkit {
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct AccountUpdate<'a> {
    id_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    email: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    profile_picture: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
}

impl AccountResponse {
    fn into_user(self) -> Result<AuthenticatedUser, ProviderError> {
        let id_token = self
            .id_token
            .ok_or_else(|| anyhow!("identity provider did not return an ID token"))?;
        Ok(AuthenticatedUser {
            user: User {
                id: self.local_id,
                display_name: self.display_name.unwrap_or_default(),
                email: self.email,
                avatar_url: self.profile_picture.filter(|url| !url.is_empty()),
            },
            id_token,
        })
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Error messages look like `WEAK_PASSWORD : Password should be at least 6 characters`,
/// so only the code before any detail is matched
fn provider_error(message: &str) -> ProviderError {
    let code = message.split(':').next().unwrap_or_default().trim();
    match code {
        "EMAIL_EXISTS" => ProviderError::EmailAlreadyInUse,
        "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "EMAIL_NOT_FOUND" => ProviderError::WrongPassword,
        "WEAK_PASSWORD" => ProviderError::WeakPassword,
        _ => ProviderError::Other(anyhow!("identity provider rejected the request: {message}")),
    }
}

impl IdentityToolkit {
    pub fn new(base_url: &str, api_key: &str) -> IdentityToolkit {
        IdentityToolkit {
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
        }
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/accounts:{action}?key={}", self.base_url, self.api_key)
    }

    async fn call<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        action: &str,
        request: &Req,
        ext_cxn: &impl ExternalConnectivity,
    ) -> Result<Resp, ProviderError> {
        let response = ext_cxn
            .http_client()
            .post(self.endpoint(action))
            .json(request)
            .send()
            .await
            .with_context(|| format!("calling accounts:{action}"))?;

        let status = response.status();
        if !status.is_success() {
            let envelope: ErrorEnvelope = response
                .json()
                .await
                .with_context(|| format!("reading the accounts:{action} error ({status})"))?;
            debug!("accounts:{action} failed with {status}: {}", envelope.error.message);
            return Err(provider_error(&envelope.error.message));
        }

        let body = response
            .json()
            .await
            .with_context(|| format!("reading the accounts:{action} response"))?;
        Ok(body)
    }
}

impl IdentityProvider for IdentityToolkit {
    #[tracing::instrument(skip(self, credentials, ext_cxn), fields(email = %credentials.email))]
    async fn sign_up(
        &self,
        display_name: &str,
        credentials: &Credentials,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<AuthenticatedUser, ProviderError> {
        let created: AccountResponse = self
            .call(
                "signUp",
                &PasswordRequest {
                    email: &credentials.email,
                    password: &credentials.password,
                    return_secure_token: true,
                },
                &*ext_cxn,
            )
            .await?;
        let mut authenticated = created.into_user()?;

        // The profile is a separate call. The account already exists if it fails.
        let named: Result<AccountResponse, ProviderError> = self
            .call(
                "update",
                &AccountUpdate {
                    id_token: &authenticated.id_token,
                    display_name: Some(display_name),
                    return_secure_token: true,
                    ..Default::default()
                },
                &*ext_cxn,
            )
            .await;
        match named {
            Ok(named) => {
                if let Some(id_token) = named.id_token {
                    authenticated.id_token = id_token;
                }
                authenticated.user.display_name = display_name.to_owned();
            }
            Err(err) => warn!("Account {} created without a display name: {err}", authenticated.user.id),
        }

        Ok(authenticated)
    }

    #[tracing::instrument(skip_all, fields(email = %credentials.email))]
    async fn sign_in(
        &self,
        credentials: &Credentials,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<AuthenticatedUser, ProviderError> {
        let signed_in: AccountResponse = self
            .call(
                "signInWithPassword",
                &PasswordRequest {
                    email: &credentials.email,
                    password: &credentials.password,
                    return_secure_token: true,
                },
                &*ext_cxn,
            )
            .await?;

        signed_in.into_user()
    }

    #[tracing::instrument(skip_all)]
    async fn update_password(
        &self,
        id_token: &str,
        new_password: &str,
        ext_cxn: &mut impl ExternalConnectivity,
    ) -> Result<String, ProviderError> {
        let updated: AccountResponse = self
            .call(
                "update",
                &AccountUpdate {
                    id_token,
                    password: Some(new_password),
                    return_secure_token: true,
                    ..Default::default()
                },
                &*ext_cxn,
            )
            .await?;

        updated
            .id_token
            .ok_or_else(|| ProviderError::Other(anyhow!("password change did not return a new ID token")))
    }
}
