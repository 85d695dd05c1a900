use std::fmt;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use super::ApiError;
use crate::auth::{Identity, LoginId, Registration};

/// Tokens and identity issued by a successful authenticate, register or refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct Grant {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub identity: Identity,
}

impl fmt::Debug for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grant")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("identity", &self.identity.id)
            .finish()
    }
}

/// Remote service that verifies credentials and issues session tokens.
///
/// The session store only sees this capability, so the Supabase client can
/// be swapped for a fake in tests or another provider in production.
pub trait IdentityProvider: Send + Sync {
    fn authenticate<'a>(
        &'a self,
        login_id: &'a LoginId,
        secret: &'a str,
    ) -> BoxFuture<'a, Result<Grant, ApiError>>;

    /// `Ok(None)` means the account was created but no session was issued
    /// (for example while email confirmation is pending).
    fn register<'a>(
        &'a self,
        registration: Registration<'a>,
    ) -> BoxFuture<'a, Result<Option<Grant>, ApiError>>;

    fn invalidate<'a>(&'a self, access_token: &'a str) -> BoxFuture<'a, Result<(), ApiError>>;

    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, Result<Grant, ApiError>>;
}
