//! Command handlers.
//!
//! `App` wires config, storage and the Supabase client into a
//! `SessionStore` and drives it the way the mobile screens do.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use sautii_core::auth::{AuthError, Credentials, Session, SessionStore, SignUpProfile};
use sautii_core::routing::{GuardState, Route, RouteGuard};
use sautii_core::utils::mask_login_id;
use sautii_core::{storage, Config, SupabaseClient};

pub struct App {
    config: Config,
    store: Arc<SessionStore>,
    guard: RouteGuard,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let (url, anon_key) = config.supabase()?;
        let client = SupabaseClient::new(url, anon_key)
            .context("Failed to create Supabase client")?
            .with_national_id_lookup(&config.national_id_lookup);

        let cache_dir = config.cache_dir()?;
        let storage = storage::open(config.storage, &cache_dir)
            .with_context(|| format!("Failed to open {} session storage", config.storage))?;

        let store = Arc::new(
            SessionStore::new(Arc::new(client), storage).with_timeout(config.request_timeout()),
        );
        let session = store.restore_session();
        debug!(state = session.state().label(), "Session restored");

        let guard = RouteGuard::new(Arc::clone(&store));
        Ok(Self { config, store, guard })
    }

    // ========================================================================
    // Commands
    // ========================================================================

    pub async fn sign_in(&mut self, login_id: Option<String>) -> Result<()> {
        let login_id = match login_id {
            Some(id) => id,
            None => self.prompt_login_id()?,
        };
        let secret = rpassword::prompt_password("Password: ")?;

        let session = self
            .store
            .sign_in(Credentials::new(login_id.trim(), secret))
            .await
            .map_err(auth_failure)?;

        self.config.last_login_id = Some(login_id.trim().to_string());
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }

        println!("Welcome, {}!", greeting(&session));
        Ok(())
    }

    pub async fn sign_up(&self, name: String, email: String, id_number: String) -> Result<()> {
        let secret = rpassword::prompt_password("Password: ")?;
        let confirmation = rpassword::prompt_password("Confirm password: ")?;
        let profile = SignUpProfile::new(name, email, id_number, secret, confirmation);

        let session = self.store.sign_up(profile).await.map_err(auth_failure)?;
        println!("Account created. Welcome, {}!", greeting(&session));
        Ok(())
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.store.sign_out().await.map_err(auth_failure)?;
        println!("Signed out.");
        Ok(())
    }

    pub fn status(&self, json: bool) -> Result<()> {
        let session = self.store.current();
        if json {
            println!("{}", serde_json::to_string_pretty(&session.view())?);
            return Ok(());
        }

        match session.identity() {
            Some(identity) => {
                println!("Signed in as {}", identity.greeting_name());
                if let Some(email) = identity.email.as_deref() {
                    println!("  Email:       {}", email);
                }
                if let Some(national_id) = identity.national_id.as_deref() {
                    println!("  National ID: {}", mask_login_id(national_id));
                }
                if let Some(expires_at) = session.expires_at() {
                    let minutes = (expires_at - Utc::now()).num_minutes().max(0);
                    println!("  Expires in:  {} min", minutes);
                }
                println!("  Storage:     {}", self.config.storage);
            }
            None => println!("Not signed in."),
        }
        Ok(())
    }

    pub async fn refresh(&self) -> Result<()> {
        let session = self.store.refresh_session().await.map_err(auth_failure)?;
        match session.expires_at() {
            Some(expires_at) => println!("Session refreshed. Expires {}.", expires_at.to_rfc3339()),
            None => println!("Session refreshed."),
        }
        Ok(())
    }

    /// Resolve a navigation the way the app's router would.
    pub async fn open(&self, path: &str) -> Result<()> {
        let target = Route::parse(path)?;

        if target.is_protected() {
            if let Err(e) = self.store.refresh_if_needed().await {
                warn!(error = %e, "Session refresh before navigation failed");
            }
        }

        let outcome = self.guard.settle(target).await;
        info!(target = %outcome.target, state = ?outcome.state, "Navigation resolved");

        match (outcome.state, outcome.redirect.as_ref()) {
            (GuardState::Allowed, _) => {
                println!("{} ({})", outcome.target.title(), outcome.target.path());
            }
            (GuardState::Denied, Some(redirect)) => {
                if let Some(message) = self.store.current().error().map(AuthError::user_message) {
                    println!("{}", message);
                }
                println!("Sign in required. Redirecting to {}", redirect.path());
            }
            (GuardState::Denied, None) | (GuardState::Checking, _) => {
                println!("Still checking your session. Try again shortly.");
            }
        }
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn prompt_login_id(&self) -> Result<String> {
        match self.config.last_login_id.as_deref() {
            Some(last) => print!("National ID or email [{}]: ", mask_login_id(last)),
            None => print!("National ID or email: "),
        }
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim();

        if input.is_empty() {
            if let Some(last) = self.config.last_login_id.clone() {
                return Ok(last);
            }
        }
        Ok(input.to_string())
    }
}

fn greeting(session: &Session) -> String {
    session
        .identity()
        .map(|identity| identity.greeting_name())
        .unwrap_or_else(|| "User".to_string())
}

/// Render an auth failure as the message a screen would show.
///
/// Validation failures list every offending field.
fn auth_failure(err: AuthError) -> anyhow::Error {
    match &err {
        AuthError::Validation(v) => {
            let lines: Vec<String> = v
                .errors()
                .iter()
                .map(|e| format!("{}: {}", e.field, e.problem.message()))
                .collect();
            anyhow::anyhow!(lines.join("\n"))
        }
        _ => anyhow::anyhow!(err.user_message()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sautii_core::auth::{Field, FieldError, Problem, ValidationError};

    #[test]
    fn test_auth_failure_hides_internals() {
        let message = auth_failure(AuthError::ProviderError("http_500".to_string())).to_string();
        assert_eq!(message, "Something went wrong. Please try again.");
    }

    #[test]
    fn test_auth_failure_lists_every_field() {
        let err = ValidationError::from_errors(vec![
            FieldError { field: Field::IdNumber, problem: Problem::InvalidIdNumber },
            FieldError { field: Field::Email, problem: Problem::InvalidEmail },
        ])
        .unwrap();
        let message = auth_failure(AuthError::Validation(err)).to_string();
        assert!(message.contains("Please enter a valid ID number (8 digits)"));
        assert!(message.contains("Please enter a valid email address"));
    }

    #[test]
    fn test_greeting_without_identity() {
        assert_eq!(greeting(&Session::unauthenticated()), "User");
    }
}
