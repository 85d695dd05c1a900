//! Transient sign-in and sign-up inputs.
//!
//! Secrets are held in zeroize-on-drop buffers and never appear in
//! `Debug` output. The session store takes these by value, so they are
//! discarded as soon as the call resolves.

use std::fmt;

use zeroize::Zeroizing;

use super::error::{Field, FieldError, Problem, ValidationError};

/// Required length of a national identity number.
const ID_NUMBER_LENGTH: usize = 8;

/// How the user identified themselves on the sign-in screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginId {
    NationalId(String),
    Email(String),
}

impl LoginId {
    /// All-digit input is a national ID; anything else is treated as an email.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
            LoginId::NationalId(trimmed.to_string())
        } else {
            LoginId::Email(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            LoginId::NationalId(id) | LoginId::Email(id) => id,
        }
    }
}

pub struct Credentials {
    login_id: String,
    secret: Zeroizing<String>,
}

impl Credentials {
    pub fn new(login_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            login_id: login_id.into(),
            secret: Zeroizing::new(secret.into()),
        }
    }

    pub fn login_id(&self) -> LoginId {
        LoginId::parse(&self.login_id)
    }

    pub(crate) fn secret(&self) -> &str {
        &self.secret
    }

    /// Both fields are required; nothing else is checked locally.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();
        if self.login_id.trim().is_empty() {
            errors.push(FieldError { field: Field::LoginId, problem: Problem::Missing });
        }
        if self.secret.is_empty() {
            errors.push(FieldError { field: Field::Secret, problem: Problem::Missing });
        }
        ValidationError::from_errors(errors).map_or(Ok(()), Err)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login_id", &crate::utils::mask_login_id(&self.login_id))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Everything the sign-up screen collects.
pub struct SignUpProfile {
    pub name: String,
    pub email: String,
    pub id_number: String,
    pub secret: Zeroizing<String>,
    pub secret_confirmation: Zeroizing<String>,
}

impl SignUpProfile {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        id_number: impl Into<String>,
        secret: impl Into<String>,
        secret_confirmation: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            id_number: id_number.into(),
            secret: Zeroizing::new(secret.into()),
            secret_confirmation: Zeroizing::new(secret_confirmation.into()),
        }
    }

    /// Check every field and report all offending ones.
    ///
    /// Order: required fields, confirmation match, ID number, email.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        let required = [
            (Field::Name, self.name.trim().is_empty()),
            (Field::Email, self.email.trim().is_empty()),
            (Field::IdNumber, self.id_number.trim().is_empty()),
            (Field::Secret, self.secret.is_empty()),
            (Field::SecretConfirmation, self.secret_confirmation.is_empty()),
        ];
        for (field, missing) in required {
            if missing {
                errors.push(FieldError { field, problem: Problem::Missing });
            }
        }

        if !has_error(&errors, Field::Secret)
            && !has_error(&errors, Field::SecretConfirmation)
            && *self.secret != *self.secret_confirmation
        {
            errors.push(FieldError {
                field: Field::SecretConfirmation,
                problem: Problem::Mismatch,
            });
        }

        if !has_error(&errors, Field::IdNumber) && !is_valid_id_number(self.id_number.trim()) {
            errors.push(FieldError { field: Field::IdNumber, problem: Problem::InvalidIdNumber });
        }

        if !has_error(&errors, Field::Email) && !is_valid_email(self.email.trim()) {
            errors.push(FieldError { field: Field::Email, problem: Problem::InvalidEmail });
        }

        ValidationError::from_errors(errors).map_or(Ok(()), Err)
    }

    pub(crate) fn registration(&self) -> Registration<'_> {
        Registration {
            name: self.name.trim(),
            email: self.email.trim(),
            id_number: self.id_number.trim(),
            secret: &self.secret,
        }
    }
}

impl fmt::Debug for SignUpProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignUpProfile")
            .field("name", &self.name)
            .field("email", &crate::utils::mask_login_id(&self.email))
            .field("id_number", &crate::utils::mask_login_id(&self.id_number))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Validated sign-up data handed to the identity provider.
#[derive(Clone, Copy)]
pub struct Registration<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub id_number: &'a str,
    pub secret: &'a str,
}

fn has_error(errors: &[FieldError], field: Field) -> bool {
    errors.iter().any(|e| e.field == field)
}

/// Exactly eight ASCII digits.
pub fn is_valid_id_number(s: &str) -> bool {
    s.len() == ID_NUMBER_LENGTH && s.chars().all(|c| c.is_ascii_digit())
}

/// A basic `local@domain.tld` shape with no whitespace.
pub fn is_valid_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.rsplit_once('@') else {
        return false;
    };
    if local.is_empty() {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}
