use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::AuthError;

/// Buffer time before expiry to trigger refresh (5 minutes)
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

/// The authenticated user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Identity {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub national_id: Option<String>,
}

impl Identity {
    /// Name to greet the user with: profile name, else the email's local part.
    pub fn greeting_name(&self) -> String {
        if let Some(name) = self.display_name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }
        self.email
            .as_deref()
            .and_then(|e| e.split('@').next())
            .filter(|local| !local.is_empty())
            .unwrap_or("User")
            .to_string()
    }
}

/// Identifies one sign-in, sign-up or refresh call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub(crate) u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Error(AuthError),
}

impl CredentialState {
    pub fn label(&self) -> &'static str {
        match self {
            CredentialState::Unauthenticated => "unauthenticated",
            CredentialState::Authenticating => "authenticating",
            CredentialState::Authenticated => "authenticated",
            CredentialState::Error(_) => "error",
        }
    }
}

/// Snapshot of the session owned by `SessionStore`.
///
/// Fields are private so the identity can only exist alongside the
/// `Authenticated` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    state: CredentialState,
    identity: Option<Identity>,
    expires_at: Option<DateTime<Utc>>,
    request: Option<RequestId>,
}

impl Session {
    pub fn unauthenticated() -> Self {
        Self {
            state: CredentialState::Unauthenticated,
            identity: None,
            expires_at: None,
            request: None,
        }
    }

    pub(crate) fn authenticating(request: RequestId) -> Self {
        Self {
            state: CredentialState::Authenticating,
            identity: None,
            expires_at: None,
            request: Some(request),
        }
    }

    pub(crate) fn authenticated(
        identity: Identity,
        expires_at: DateTime<Utc>,
        request: Option<RequestId>,
    ) -> Self {
        Self {
            state: CredentialState::Authenticated,
            identity: Some(identity),
            expires_at: Some(expires_at),
            request,
        }
    }

    pub(crate) fn failed(error: AuthError, request: RequestId) -> Self {
        Self {
            state: CredentialState::Error(error),
            identity: None,
            expires_at: None,
            request: Some(request),
        }
    }

    pub fn state(&self) -> &CredentialState {
        &self.state
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// The operation that produced this snapshot, if any.
    pub fn request(&self) -> Option<RequestId> {
        self.request
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, CredentialState::Authenticated)
    }

    pub fn is_authenticating(&self) -> bool {
        matches!(self.state, CredentialState::Authenticating)
    }

    pub fn error(&self) -> Option<&AuthError> {
        match &self.state {
            CredentialState::Error(e) => Some(e),
            _ => None,
        }
    }

    /// True once an authenticated session has passed its expiry.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.is_authenticated() && self.expires_at.map(|e| now >= e).unwrap_or(false)
    }

    /// True when an authenticated session is inside the refresh buffer.
    pub fn needs_refresh_at(&self, now: DateTime<Utc>) -> bool {
        self.is_authenticated()
            && self
                .expires_at
                .map(|e| now > e - Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES))
                .unwrap_or(false)
    }

    pub(crate) fn with_request(mut self, request: Option<RequestId>) -> Self {
        self.request = request;
        self
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            state: self.state.label().to_string(),
            identity: self.identity.clone(),
            expires_at: self.expires_at.map(|e| e.to_rfc3339()),
            message: self.error().map(AuthError::user_message),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::unauthenticated()
    }
}

/// Serializable form of a `Session` for front ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SessionView {
    pub state: String,
    pub identity: Option<Identity>,
    pub expires_at: Option<String>,
    pub message: Option<String>,
}

// ============================================================================
// Persisted form
// ============================================================================

/// What durable storage holds between runs. Never contains the password.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub identity: Identity,
    pub saved_at: DateTime<Utc>,
}

impl fmt::Debug for PersistedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistedSession")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("identity", &self.identity.id)
            .field("saved_at", &self.saved_at)
            .finish()
    }
}

impl PersistedSession {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Check if the session will expire soon and should be refreshed
    pub fn needs_refresh(&self) -> bool {
        let refresh_at = self.expires_at - Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES);
        Utc::now() > refresh_at
    }

    pub fn time_until_expiry(&self) -> Duration {
        self.expires_at - Utc::now()
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> i64 {
        self.time_until_expiry().num_minutes().max(0)
    }
}
