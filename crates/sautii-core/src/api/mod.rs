//! Identity provider access.
//!
//! The session store talks to the provider only through the
//! `IdentityProvider` trait. `SupabaseClient` is the production
//! implementation over the GoTrue REST API; provider failures surface as
//! `ApiError` and are normalized into `AuthError` by the store.

pub mod client;
pub mod error;
pub mod provider;

pub use client::{SupabaseClient, DEFAULT_NATIONAL_ID_LOOKUP};
pub use error::ApiError;
pub use provider::{Grant, IdentityProvider};
