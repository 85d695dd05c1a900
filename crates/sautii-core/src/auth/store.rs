//! The session store: sole owner and writer of the authentication session.
//!
//! Every mutation happens under a `std::sync::Mutex` that is never held
//! across an `.await`. Provider calls run with the lock released and are
//! matched back to the store by their `RequestId`; a result whose id no
//! longer matches the in-flight slot (because a sign-out cancelled it) is
//! dropped and its tokens revoked.
//!
//! Sign-in, sign-up and refresh run on a spawned task. A caller that stops
//! waiting does not cancel the request: the store still applies the result.
//!
//! Observers get snapshots two ways: callback subscriptions, invoked with
//! no lock held, and a `tokio::sync::watch` channel.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use super::subscription::Listeners;
use super::{
    AuthError, CredentialState, Credentials, PersistedSession, RequestId, Session, SignUpProfile,
    Subscription, CONFIRMATION_PENDING,
};
use crate::api::{ApiError, Grant, IdentityProvider};
use crate::storage::SessionStorage;
use crate::utils::mask_login_id;

/// Upper bound on a single identity provider call
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(15);

struct Tokens {
    access: Zeroizing<String>,
    refresh: Zeroizing<String>,
}

#[derive(Default)]
struct Inner {
    session: Session,
    tokens: Option<Tokens>,
    in_flight: Option<RequestId>,
    /// Bumped on every published transition
    revision: u64,
}

/// A transition waiting to be delivered to listeners once the lock is released.
type Change = Option<(u64, Session)>;

/// How a provider result landed.
enum Completion {
    Applied(Result<Session, AuthError>),
    /// A sign-out took the slot first; any grant is no longer wanted.
    Superseded(Option<Grant>),
}

/// State shared between the store and its spawned provider calls.
struct Shared {
    provider: Arc<dyn IdentityProvider>,
    storage: Arc<dyn SessionStorage>,
    inner: Mutex<Inner>,
    listeners: Listeners,
    watch_tx: watch::Sender<Session>,
    next_request: AtomicU64,
}

pub struct SessionStore {
    shared: Arc<Shared>,
    timeout: Duration,
}

impl SessionStore {
    pub fn new(provider: Arc<dyn IdentityProvider>, storage: Arc<dyn SessionStorage>) -> Self {
        let (watch_tx, _) = watch::channel(Session::unauthenticated());
        Self {
            shared: Arc::new(Shared {
                provider,
                storage,
                inner: Mutex::new(Inner::default()),
                listeners: Listeners::default(),
                watch_tx,
                next_request: AtomicU64::new(0),
            }),
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    // ========================================================================
    // Credential operations
    // ========================================================================

    /// Authenticate with a national ID or email and a password.
    ///
    /// Missing fields fail with `Validation` before anything else happens.
    /// While another sign-in, sign-up or refresh is pending this returns
    /// `ConcurrentOperation` without touching the session.
    pub async fn sign_in(&self, credentials: Credentials) -> Result<Session, AuthError> {
        credentials.validate()?;
        let login_id = credentials.login_id();

        let request = self.shared.begin("sign_in")?;
        info!(request = %request, login = %mask_login_id(login_id.as_str()), "Signing in");

        let shared = Arc::clone(&self.shared);
        let timeout = self.timeout;
        self.detach(request, async move {
            let result = call(
                timeout,
                shared.provider.authenticate(&login_id, credentials.secret()),
            )
            .await
            .map(Some);
            drop(credentials);
            let completion = shared.complete(request, result);
            shared.finish(completion, timeout).await
        })
        .await
    }

    /// Create an account and, when the provider issues one, start a session.
    pub async fn sign_up(&self, profile: SignUpProfile) -> Result<Session, AuthError> {
        profile.validate()?;

        let request = self.shared.begin("sign_up")?;
        info!(request = %request, email = %mask_login_id(profile.email.trim()), "Signing up");

        let shared = Arc::clone(&self.shared);
        let timeout = self.timeout;
        self.detach(request, async move {
            let result = call(timeout, shared.provider.register(profile.registration())).await;
            drop(profile);
            let completion = shared.complete(request, result);
            shared.finish(completion, timeout).await
        })
        .await
    }

    /// End the session.
    ///
    /// The local clear always happens, before any network traffic. Remote
    /// invalidation is best effort. A pending sign-in is cancelled.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let shared = &self.shared;
        let (tokens, change) = {
            let mut inner = shared.lock();
            let tokens = inner.tokens.take();
            let cancelled = inner.in_flight.take();

            if tokens.is_none()
                && cancelled.is_none()
                && matches!(inner.session.state(), CredentialState::Unauthenticated)
            {
                debug!("Sign-out with no active session");
                return Ok(());
            }
            if let Some(request) = cancelled {
                info!(request = %request, "Sign-out cancelled pending operation");
            }
            shared.clear_storage();
            let change = shared.commit(&mut inner, Session::unauthenticated());
            (tokens, change)
        };
        shared.publish(change);
        info!("Signed out");

        if let Some(tokens) = tokens {
            shared.revoke(&tokens.access, self.timeout).await;
        }
        Ok(())
    }

    /// Load the persisted session, if any, without touching the network.
    ///
    /// Expired or unreadable sessions are cleared from storage.
    pub fn restore_session(&self) -> Session {
        let shared = &self.shared;
        let (session, change) = {
            let mut inner = shared.lock();
            if inner.in_flight.is_some() || inner.tokens.is_some() {
                debug!("Session already live; skipping restore");
                return inner.session.clone();
            }

            let restored = match shared.storage.load() {
                Ok(Some(persisted)) if !persisted.is_expired() => {
                    info!(
                        user = %persisted.identity.id,
                        minutes_left = persisted.minutes_until_expiry(),
                        "Restored session"
                    );
                    let session =
                        Session::authenticated(persisted.identity, persisted.expires_at, None);
                    inner.tokens = Some(Tokens {
                        access: Zeroizing::new(persisted.access_token),
                        refresh: Zeroizing::new(persisted.refresh_token),
                    });
                    session
                }
                Ok(Some(_)) => {
                    info!("Persisted session expired");
                    shared.clear_storage();
                    Session::unauthenticated()
                }
                Ok(None) => {
                    debug!("No persisted session");
                    Session::unauthenticated()
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load persisted session");
                    shared.clear_storage();
                    Session::unauthenticated()
                }
            };
            let change = shared.commit(&mut inner, restored.clone());
            (restored, change)
        };
        shared.publish(change);
        session
    }

    /// Exchange the refresh token for fresh tokens.
    ///
    /// The session stays `Authenticated` throughout. A refresh token the
    /// provider rejects ends the session; a network failure or timeout
    /// leaves it as it was.
    pub async fn refresh_session(&self) -> Result<Session, AuthError> {
        let (request, refresh_token) = {
            let mut inner = self.shared.lock();
            if let Some(active) = inner.in_flight {
                warn!(active = %active, "Refresh rejected: another operation in flight");
                return Err(AuthError::ConcurrentOperation);
            }
            let Some(tokens) = inner.tokens.as_ref() else {
                debug!("Refresh requested with no session");
                return Err(AuthError::InvalidCredentials);
            };
            let refresh_token = tokens.refresh.clone();
            let request = self.shared.next_request_id();
            inner.in_flight = Some(request);
            (request, refresh_token)
        };
        debug!(request = %request, "Refreshing session");

        let shared = Arc::clone(&self.shared);
        let timeout = self.timeout;
        self.detach(request, async move {
            let result = call(timeout, shared.provider.refresh(&refresh_token)).await;
            drop(refresh_token);
            let completion = shared.complete_refresh(request, result);
            shared.finish(completion, timeout).await
        })
        .await
    }

    /// Refresh only when the session is close to expiry.
    pub async fn refresh_if_needed(&self) -> Result<Session, AuthError> {
        let session = self.current();
        if session.needs_refresh_at(Utc::now()) {
            self.refresh_session().await
        } else {
            Ok(session)
        }
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// Latest snapshot. An authenticated session past its expiry is ended first.
    pub fn current(&self) -> Session {
        let shared = &self.shared;
        let (session, change) = {
            let mut inner = shared.lock();
            if !inner.session.is_expired_at(Utc::now()) {
                return inner.session.clone();
            }
            info!("Session expired");
            inner.tokens = None;
            shared.clear_storage();
            let change = shared.commit(&mut inner, Session::unauthenticated());
            (inner.session.clone(), change)
        };
        shared.publish(change);
        session
    }

    /// Call `listener` with the new snapshot on every transition.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Session) + Send + Sync + 'static,
    {
        self.shared.listeners.add(Arc::new(listener))
    }

    pub fn watch(&self) -> watch::Receiver<Session> {
        self.shared.watch_tx.subscribe()
    }

    /// Access token for authenticated API calls.
    pub fn bearer_token(&self) -> Option<String> {
        let inner = self.shared.lock();
        if !inner.session.is_authenticated() || inner.session.is_expired_at(Utc::now()) {
            return None;
        }
        inner.tokens.as_ref().map(|t| t.access.to_string())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Run a provider call to completion on its own task and wait for it.
    ///
    /// Dropping the returned future detaches the task; the outcome is still
    /// applied to the store.
    async fn detach<F>(&self, request: RequestId, task: F) -> Result<Session, AuthError>
    where
        F: Future<Output = Result<Session, AuthError>> + Send + 'static,
    {
        match tokio::spawn(task).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(request = %request, error = %e, "Provider task failed");
                self.shared.abandon(request);
                Err(AuthError::ProviderError("task_failed".to_string()))
            }
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every transition is a single assignment; a poisoned lock still holds a valid session.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_request_id(&self) -> RequestId {
        RequestId(self.next_request.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Claim the in-flight slot and move to `Authenticating`.
    fn begin(&self, operation: &'static str) -> Result<RequestId, AuthError> {
        let (request, change) = {
            let mut inner = self.lock();
            if let Some(active) = inner.in_flight {
                warn!(active = %active, operation, "Rejected: another operation in flight");
                return Err(AuthError::ConcurrentOperation);
            }
            let request = self.next_request_id();
            inner.in_flight = Some(request);
            if inner.tokens.take().is_some() {
                // The previous session is replaced by whatever this operation yields
                self.clear_storage();
            }
            let change = self.commit(&mut inner, Session::authenticating(request));
            (request, change)
        };
        self.publish(change);
        Ok(request)
    }

    /// Apply the result of a sign-in or sign-up.
    fn complete(&self, request: RequestId, result: Result<Option<Grant>, AuthError>) -> Completion {
        let (outcome, change) = {
            let mut inner = self.lock();
            if inner.in_flight != Some(request) {
                debug!(request = %request, "Discarding result superseded by sign-out");
                return Completion::Superseded(result.ok().flatten());
            }
            inner.in_flight = None;

            let (next, outcome) = match result {
                Ok(Some(grant)) => {
                    let session = self.install(&mut inner, grant, request);
                    info!(request = %request, "Authenticated");
                    (session.clone(), Ok(session))
                }
                Ok(None) => {
                    info!(request = %request, "Account created; confirmation pending");
                    let err = AuthError::ProviderError(CONFIRMATION_PENDING.to_string());
                    (Session::failed(err.clone(), request), Err(err))
                }
                Err(AuthError::Timeout) => {
                    warn!(request = %request, "Identity provider timed out");
                    let next = Session::unauthenticated().with_request(Some(request));
                    (next, Err(AuthError::Timeout))
                }
                Err(e) => {
                    warn!(request = %request, error = %e, "Authentication failed");
                    (Session::failed(e.clone(), request), Err(e))
                }
            };
            let change = self.commit(&mut inner, next);
            (outcome, change)
        };
        self.publish(change);
        Completion::Applied(outcome)
    }

    /// Apply the result of a refresh.
    fn complete_refresh(&self, request: RequestId, result: Result<Grant, AuthError>) -> Completion {
        let (outcome, change) = {
            let mut inner = self.lock();
            if inner.in_flight != Some(request) {
                debug!(request = %request, "Discarding refresh superseded by sign-out");
                return Completion::Superseded(result.ok());
            }
            inner.in_flight = None;
            match result {
                Ok(grant) => {
                    let session = self.install(&mut inner, grant, request);
                    info!(request = %request, "Session refreshed");
                    let change = self.commit(&mut inner, session.clone());
                    (Ok(session), change)
                }
                Err(AuthError::InvalidCredentials) => {
                    info!(request = %request, "Refresh token rejected; session ended");
                    inner.tokens = None;
                    self.clear_storage();
                    let next = Session::unauthenticated().with_request(Some(request));
                    let change = self.commit(&mut inner, next);
                    (Err(AuthError::InvalidCredentials), change)
                }
                Err(e) => {
                    warn!(request = %request, error = %e, "Refresh failed; keeping session");
                    (Err(e), None)
                }
            }
        };
        self.publish(change);
        Completion::Applied(outcome)
    }

    async fn finish(&self, completion: Completion, timeout: Duration) -> Result<Session, AuthError> {
        match completion {
            Completion::Applied(outcome) => outcome,
            Completion::Superseded(grant) => {
                if let Some(grant) = grant {
                    self.revoke(&grant.access_token, timeout).await;
                }
                Err(AuthError::ConcurrentOperation)
            }
        }
    }

    /// Release a slot whose task died without completing.
    fn abandon(&self, request: RequestId) {
        let change = {
            let mut inner = self.lock();
            if inner.in_flight != Some(request) {
                return;
            }
            inner.in_flight = None;
            if !inner.session.is_authenticating() {
                // A refresh keeps the session it started from
                return;
            }
            self.commit(&mut inner, Session::unauthenticated().with_request(Some(request)))
        };
        self.publish(change);
    }

    /// Persist a grant and hold its tokens; returns the authenticated snapshot.
    fn install(&self, inner: &mut Inner, grant: Grant, request: RequestId) -> Session {
        let persisted = PersistedSession {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at: grant.expires_at,
            identity: grant.identity,
            saved_at: Utc::now(),
        };
        if let Err(e) = self.storage.save(&persisted) {
            warn!(error = %e, "Failed to save session");
        }
        let session =
            Session::authenticated(persisted.identity, persisted.expires_at, Some(request));
        inner.tokens = Some(Tokens {
            access: Zeroizing::new(persisted.access_token),
            refresh: Zeroizing::new(persisted.refresh_token),
        });
        session
    }

    /// Best-effort remote invalidation of an access token.
    async fn revoke(&self, access_token: &str, timeout: Duration) {
        match call(timeout, self.provider.invalidate(access_token)).await {
            Ok(()) => debug!("Remote session invalidated"),
            Err(e) => warn!(error = %e, "Remote sign-out failed; local session already cleared"),
        }
    }

    fn clear_storage(&self) {
        if let Err(e) = self.storage.clear() {
            warn!(error = %e, "Failed to clear persisted session");
        }
    }

    /// Record a transition. Must be called with the lock held.
    fn commit(&self, inner: &mut Inner, next: Session) -> Change {
        if inner.session == next {
            return None;
        }
        inner.session = next.clone();
        inner.revision += 1;
        self.watch_tx.send_replace(next.clone());
        Some((inner.revision, next))
    }

    /// Deliver a committed transition. Must be called with the lock released.
    fn publish(&self, change: Change) {
        if let Some((revision, session)) = change {
            self.listeners.notify(revision, &session);
        }
    }
}

async fn call<T>(
    timeout: Duration,
    fut: BoxFuture<'_, Result<T, ApiError>>,
) -> Result<T, AuthError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            if matches!(e, ApiError::ServerError(_) | ApiError::InvalidResponse(_)) {
                error!(error = %e, "Identity provider error");
            } else {
                debug!(error = %e, "Identity provider call failed");
            }
            Err(e.into())
        }
        Err(_) => Err(AuthError::Timeout),
    }
}
