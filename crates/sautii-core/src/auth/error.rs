use std::fmt;

use thiserror::Error;

use crate::api::ApiError;

/// Provider code used when a registration is accepted but no session is issued.
pub const CONFIRMATION_PENDING: &str = "confirmation_pending";

/// Errors surfaced by the session store.
///
/// Everything here is recoverable; callers may retry the operation.
/// Raw provider payloads never reach this type: `ProviderError` only
/// carries a short machine-readable code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Validation failed: {0}")]
    Validation(ValidationError),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Network failure")]
    NetworkFailure,

    #[error("Identity provider timed out")]
    Timeout,

    #[error("Another authentication operation is in progress")]
    ConcurrentOperation,

    #[error("Identity provider error: {0}")]
    ProviderError(String),
}

impl AuthError {
    /// The single message a screen should display for this error.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Validation(v) => v.headline().problem.message().to_string(),
            AuthError::InvalidCredentials => "Invalid national ID or password".to_string(),
            AuthError::NetworkFailure => {
                "Unable to connect to server. Check your internet connection.".to_string()
            }
            AuthError::Timeout => "Connection timed out. Please try again.".to_string(),
            AuthError::ConcurrentOperation => {
                "Please wait for the current sign-in to finish.".to_string()
            }
            AuthError::ProviderError(code) => match code.as_str() {
                "user_already_exists" | "email_exists" => {
                    "An account with this email already exists".to_string()
                }
                "weak_password" => "Please choose a stronger password".to_string(),
                "rate_limited" | "over_request_rate_limit" => {
                    "Too many attempts. Please wait before retrying.".to_string()
                }
                CONFIRMATION_PENDING => {
                    "Check your email to confirm your account, then sign in.".to_string()
                }
                _ => "Something went wrong. Please try again.".to_string(),
            },
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, AuthError::Validation(_))
    }
}

impl From<ValidationError> for AuthError {
    fn from(err: ValidationError) -> Self {
        AuthError::Validation(err)
    }
}

/// Normalize provider client failures into the session taxonomy.
impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::InvalidCredentials | ApiError::Unauthorized | ApiError::UnknownNationalId => {
                AuthError::InvalidCredentials
            }
            ApiError::NetworkError(e) if e.is_timeout() => AuthError::Timeout,
            ApiError::NetworkError(_) => AuthError::NetworkFailure,
            ApiError::Timeout => AuthError::Timeout,
            ApiError::RateLimited => AuthError::ProviderError("rate_limited".to_string()),
            ApiError::ServerError(status) => AuthError::ProviderError(format!("http_{}", status)),
            ApiError::Rejected { code, .. } => AuthError::ProviderError(code),
            ApiError::InvalidResponse(_) => {
                AuthError::ProviderError("invalid_response".to_string())
            }
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Input fields checked locally before any network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    LoginId,
    Secret,
    Name,
    Email,
    IdNumber,
    SecretConfirmation,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::LoginId => "login_id",
            Field::Secret => "secret",
            Field::Name => "name",
            Field::Email => "email",
            Field::IdNumber => "id_number",
            Field::SecretConfirmation => "secret_confirmation",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Problem {
    Missing,
    Mismatch,
    InvalidIdNumber,
    InvalidEmail,
}

impl Problem {
    pub fn message(&self) -> &'static str {
        match self {
            Problem::Missing => "All fields are required",
            Problem::Mismatch => "Passwords do not match",
            Problem::InvalidIdNumber => "Please enter a valid ID number (8 digits)",
            Problem::InvalidEmail => "Please enter a valid email address",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldError {
    pub field: Field,
    pub problem: Problem,
}

/// One or more offending fields. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn single(field: Field, problem: Problem) -> Self {
        Self {
            errors: vec![FieldError { field, problem }],
        }
    }

    /// Returns `None` when there is nothing to report.
    pub fn from_errors(errors: Vec<FieldError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self { errors })
        }
    }

    /// The first offending field, in check order.
    pub fn headline(&self) -> &FieldError {
        &self.errors[0]
    }

    pub fn field(&self) -> Field {
        self.headline().field
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.errors.iter().map(|e| e.field)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.fields().map(|f| f.as_str()).collect();
        write!(f, "{} ({})", self.headline().problem.message(), fields.join(", "))
    }
}
