//! Route classification and the guard that gates protected screens.

mod guard;
mod route;

pub use guard::{evaluate, GuardOutcome, GuardState, RouteGuard};
pub use route::{Route, RouteError};
