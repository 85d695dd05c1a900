use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::Route;
use crate::auth::{CredentialState, Session, SessionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardState {
    /// Decision pending while a sign-in or sign-up is in flight
    Checking,
    Allowed,
    Denied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardOutcome {
    pub target: Route,
    pub state: GuardState,
    /// Set when `state` is `Denied`
    pub redirect: Option<Route>,
}

impl GuardOutcome {
    /// The screen to show, or `None` while still checking.
    pub fn destination(&self) -> Option<&Route> {
        match self.state {
            GuardState::Allowed => Some(&self.target),
            GuardState::Denied => self.redirect.as_ref(),
            GuardState::Checking => None,
        }
    }
}

/// Decide a navigation from a session snapshot. Pure; no I/O.
pub fn evaluate(session: &Session, target: &Route) -> GuardOutcome {
    let state = if !target.is_protected() {
        GuardState::Allowed
    } else {
        match session.state() {
            CredentialState::Authenticated => GuardState::Allowed,
            CredentialState::Authenticating => GuardState::Checking,
            CredentialState::Unauthenticated | CredentialState::Error(_) => GuardState::Denied,
        }
    };
    let redirect = (state == GuardState::Denied).then(|| target.sign_in_redirect());
    GuardOutcome { target: target.clone(), state, redirect }
}

/// Gates protected screens on the session store's current state.
///
/// Every navigation is evaluated afresh from the latest snapshot. The guard
/// never retries or calls the network.
pub struct RouteGuard {
    store: Arc<SessionStore>,
}

impl RouteGuard {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    pub fn navigate(&self, target: Route) -> GuardOutcome {
        let outcome = evaluate(&self.store.current(), &target);
        debug!(target = %outcome.target, state = ?outcome.state, "Route guard decision");
        outcome
    }

    /// Like `navigate`, but waits out a pending sign-in instead of returning `Checking`.
    pub async fn settle(&self, target: Route) -> GuardOutcome {
        let outcome = self.navigate(target);
        if outcome.state != GuardState::Checking {
            return outcome;
        }

        let mut rx = self.store.watch();
        // The sender lives as long as the store, which we hold.
        let _ = rx.wait_for(|session| !session.is_authenticating()).await;
        drop(rx);

        self.navigate(outcome.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, Credentials, FakeProvider, Identity, RequestId};
    use crate::storage::MemoryStorage;
    use chrono::{Duration, Utc};

    fn signed_in() -> Session {
        let identity = Identity {
            id: "user-1".to_string(),
            email: None,
            display_name: None,
            national_id: Some("12345678".to_string()),
        };
        Session::authenticated(identity, Utc::now() + Duration::hours(1), None)
    }

    #[test]
    fn test_unauthenticated_is_denied_with_redirect() {
        let outcome = evaluate(&Session::unauthenticated(), &Route::Forums);
        assert_eq!(outcome.state, GuardState::Denied);
        assert_eq!(
            outcome.redirect,
            Some(Route::SignIn { return_to: Some("/forums".to_string()) })
        );
        assert_eq!(outcome.destination(), outcome.redirect.as_ref());
    }

    #[test]
    fn test_unauthenticated_never_allowed_on_protected_routes() {
        let protected = [
            Route::Home,
            Route::Issues,
            Route::NewIssue,
            Route::Forums,
            Route::Representatives,
            Route::RepresentativeDetails { id: "1".to_string() },
            Route::Settings,
        ];
        for target in protected {
            assert_eq!(evaluate(&Session::unauthenticated(), &target).state, GuardState::Denied);
        }
    }

    #[test]
    fn test_error_state_is_denied() {
        let session = Session::failed(AuthError::NetworkFailure, RequestId(1));
        assert_eq!(evaluate(&session, &Route::Settings).state, GuardState::Denied);
    }

    #[test]
    fn test_authenticated_is_allowed() {
        let outcome = evaluate(&signed_in(), &Route::Settings);
        assert_eq!(outcome.state, GuardState::Allowed);
        assert!(outcome.redirect.is_none());
        assert_eq!(outcome.destination(), Some(&Route::Settings));
    }

    #[test]
    fn test_public_routes_always_allowed() {
        let target = Route::SignUp;
        assert_eq!(evaluate(&Session::unauthenticated(), &target).state, GuardState::Allowed);
        let session = Session::failed(AuthError::Timeout, RequestId(2));
        assert_eq!(evaluate(&session, &target).state, GuardState::Allowed);
    }

    #[test]
    fn test_authenticating_stays_checking() {
        let outcome = evaluate(&Session::authenticating(RequestId(4)), &Route::Issues);
        assert_eq!(outcome.state, GuardState::Checking);
        assert!(outcome.destination().is_none());
    }

    #[tokio::test]
    async fn test_navigate_follows_store() {
        let store = Arc::new(SessionStore::new(
            Arc::new(FakeProvider::default()),
            Arc::new(MemoryStorage::new()),
        ));
        let guard = RouteGuard::new(Arc::clone(&store));

        assert_eq!(guard.navigate(Route::Issues).state, GuardState::Denied);
        store.sign_in(Credentials::new("12345678", "secret")).await.unwrap();
        assert_eq!(guard.navigate(Route::Issues).state, GuardState::Allowed);
        store.sign_out().await.unwrap();
        assert_eq!(guard.navigate(Route::Issues).state, GuardState::Denied);
    }

    #[tokio::test]
    async fn test_settle_waits_for_pending_sign_in() {
        let provider = Arc::new(FakeProvider::gated());
        let store = Arc::new(SessionStore::new(provider.clone(), Arc::new(MemoryStorage::new())));
        let guard = RouteGuard::new(Arc::clone(&store));

        let pending = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.sign_in(Credentials::new("12345678", "a")).await })
        };
        store.watch().wait_for(|s| s.is_authenticating()).await.unwrap();
        assert_eq!(guard.navigate(Route::Forums).state, GuardState::Checking);

        let settle = guard.settle(Route::Forums);
        provider.release();
        let settled = settle.await;
        assert_eq!(settled.state, GuardState::Allowed);
        assert!(pending.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_settle_resolves_immediately_when_decided() {
        let store = Arc::new(SessionStore::new(
            Arc::new(FakeProvider::default()),
            Arc::new(MemoryStorage::new()),
        ));
        let guard = RouteGuard::new(store);
        assert_eq!(guard.settle(Route::Home).await.state, GuardState::Denied);
    }
}
