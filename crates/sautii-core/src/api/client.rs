//! Supabase (GoTrue) identity provider client.
//!
//! Password sign-in, sign-up, logout and refresh go through the GoTrue
//! REST endpoints under `{url}/auth/v1`. National ID sign-in first resolves
//! the account email through a PostgREST RPC under `{url}/rest/v1/rpc`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::provider::{Grant, IdentityProvider};
use super::ApiError;
use crate::auth::{Identity, LoginId, Registration};
use crate::utils::mask_login_id;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// The session store applies its own, usually shorter, bound on top.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default PostgREST function mapping a national ID to an account email
pub const DEFAULT_NATIONAL_ID_LOOKUP: &str = "email_for_national_id";

/// Lifetime assumed when GoTrue omits both `expires_at` and `expires_in`
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: UserResponse,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    #[serde(default, alias = "name")]
    full_name: Option<String>,
    #[serde(default)]
    national_id: Option<String>,
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct SignUpRequest<'a> {
    email: &'a str,
    password: &'a str,
    data: SignUpMetadata<'a>,
}

#[derive(Serialize)]
struct SignUpMetadata<'a> {
    full_name: &'a str,
    national_id: &'a str,
}

#[derive(Serialize)]
struct NationalIdLookup<'a> {
    national_id: &'a str,
}

impl TokenResponse {
    fn into_grant(self) -> Grant {
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .unwrap_or_else(|| {
                let secs = self.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
                Utc::now() + chrono::Duration::seconds(secs)
            });

        Grant {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            identity: Identity {
                id: self.user.id,
                email: self.user.email,
                display_name: self.user.user_metadata.full_name,
                national_id: self.user.user_metadata.national_id,
            },
        }
    }
}

/// GoTrue client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
    national_id_lookup: String,
}

impl SupabaseClient {
    /// Create a new client for a Supabase project
    pub fn new(base_url: &str, anon_key: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            national_id_lookup: DEFAULT_NATIONAL_ID_LOOKUP.to_string(),
        })
    }

    /// Use a different PostgREST function for national ID resolution
    pub fn with_national_id_lookup(mut self, function: &str) -> Self {
        self.national_id_lookup = function.to_string();
        self
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn rpc_url(&self) -> String {
        format!("{}/rest/v1/rpc/{}", self.base_url, self.national_id_lookup)
    }

    /// Check if response is successful, returning an error built from the body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            debug!(%status, body = %ApiError::truncate_body(&body), "Identity provider rejected request");
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self
            .client
            .post(url)
            .header("apikey", &self.anon_key)
            .header(header::ACCEPT, "application/json")
            .bearer_auth(&self.anon_key)
            .json(body)
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    /// Resolve a national ID to the email the account was registered with
    async fn resolve_national_id(&self, national_id: &str) -> Result<String, ApiError> {
        debug!(national_id = %mask_login_id(national_id), "Resolving national ID");
        let email: Option<String> = self
            .post(&self.rpc_url(), &NationalIdLookup { national_id })
            .await?;
        email
            .filter(|e| !e.is_empty())
            .ok_or(ApiError::UnknownNationalId)
    }

    async fn sign_in_with_password(&self, login_id: &LoginId, secret: &str) -> Result<Grant, ApiError> {
        let email = match login_id {
            LoginId::Email(email) => email.clone(),
            LoginId::NationalId(id) => self.resolve_national_id(id).await?,
        };

        let token: TokenResponse = self
            .post(
                &self.auth_url("token?grant_type=password"),
                &PasswordGrant { email: &email, password: secret },
            )
            .await?;
        Ok(token.into_grant())
    }

    async fn sign_up(&self, registration: Registration<'_>) -> Result<Option<Grant>, ApiError> {
        let body: Value = self
            .post(
                &self.auth_url("signup"),
                &SignUpRequest {
                    email: registration.email,
                    password: registration.secret,
                    data: SignUpMetadata {
                        full_name: registration.name,
                        national_id: registration.id_number,
                    },
                },
            )
            .await?;

        // Without auto-confirm GoTrue answers with the bare user object.
        if body.get("access_token").is_none() {
            debug!("Sign-up accepted without a session");
            return Ok(None);
        }
        let token: TokenResponse =
            serde_json::from_value(body).map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        Ok(Some(token.into_grant()))
    }

    async fn logout(&self, access_token: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.auth_url("logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        match Self::check_response(response).await {
            Ok(_) => Ok(()),
            // Token already invalid server-side
            Err(ApiError::Unauthorized) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn refresh_tokens(&self, refresh_token: &str) -> Result<Grant, ApiError> {
        let token: TokenResponse = self
            .post(
                &self.auth_url("token?grant_type=refresh_token"),
                &RefreshGrant { refresh_token },
            )
            .await?;
        Ok(token.into_grant())
    }
}

impl IdentityProvider for SupabaseClient {
    fn authenticate<'a>(
        &'a self,
        login_id: &'a LoginId,
        secret: &'a str,
    ) -> BoxFuture<'a, Result<Grant, ApiError>> {
        self.sign_in_with_password(login_id, secret).boxed()
    }

    fn register<'a>(
        &'a self,
        registration: Registration<'a>,
    ) -> BoxFuture<'a, Result<Option<Grant>, ApiError>> {
        self.sign_up(registration).boxed()
    }

    fn invalidate<'a>(&'a self, access_token: &'a str) -> BoxFuture<'a, Result<(), ApiError>> {
        self.logout(access_token).boxed()
    }

    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, Result<Grant, ApiError>> {
        self.refresh_tokens(refresh_token).boxed()
    }
}

// ============================================================================
// Tests
// ============================================================================
