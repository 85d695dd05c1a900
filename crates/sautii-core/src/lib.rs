//! Sautii core library.
//!
//! The authentication session lifecycle for the Sautii civic app: a
//! single-writer `SessionStore` driven against a Supabase identity
//! provider, durable session storage, and the `RouteGuard` that gates
//! protected screens. Front ends (the CLI, or a mobile shell through the
//! `ts` feature's generated types) sit on top of this crate.

pub mod api;
pub mod auth;
pub mod config;
pub mod routing;
pub mod storage;
pub mod utils;

pub use api::{ApiError, IdentityProvider, SupabaseClient};
pub use auth::{AuthError, Credentials, Session, SessionStore, SignUpProfile};
pub use config::Config;
pub use routing::{Route, RouteGuard};
pub use storage::{SessionStorage, StorageBackend};
