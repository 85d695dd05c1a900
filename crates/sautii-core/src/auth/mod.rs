//! Authentication session lifecycle.
//!
//! `SessionStore` is the only writer of the `Session`. Front ends drive it
//! with `Credentials` or a `SignUpProfile` and observe it through
//! `subscribe` or `watch`.

mod credentials;
mod error;
mod session;
mod store;
mod subscription;

pub use credentials::{
    is_valid_email, is_valid_id_number, Credentials, LoginId, Registration, SignUpProfile,
};
pub use error::{AuthError, Field, FieldError, Problem, ValidationError, CONFIRMATION_PENDING};
pub use session::{
    CredentialState, Identity, PersistedSession, RequestId, Session, SessionView,
};
pub use store::{SessionStore, DEFAULT_PROVIDER_TIMEOUT};
pub use subscription::Subscription;

#[cfg(test)]
pub(crate) use store::tests::FakeProvider;
