use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("Unauthorized - token may be expired or revoked")]
    Unauthorized,

    #[error("No account is registered for this national ID")]
    UnknownNationalId,

    #[error("Request rejected ({status}): {code}")]
    Rejected { status: u16, code: String },

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: HTTP {0}")]
    ServerError(u16),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Request timed out")]
    Timeout,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Error body shapes returned by GoTrue. Older deployments use
/// `error`/`error_description`, newer ones `error_code`/`msg`.
#[derive(Debug, Default, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

impl ProviderErrorBody {
    fn code(&self) -> Option<&str> {
        self.error_code.as_deref().or(self.error.as_deref())
    }

    fn mentions_invalid_credentials(&self) -> bool {
        let text = self
            .error_description
            .as_deref()
            .or(self.msg.as_deref())
            .unwrap_or_default()
            .to_lowercase();
        text.contains("invalid login credentials")
    }
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    pub fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let cut = (0..=MAX_ERROR_BODY_LENGTH)
                .rev()
                .find(|&i| body.is_char_boundary(i))
                .unwrap_or(0);
            format!("{}... (truncated, {} total bytes)", &body[..cut], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let parsed: ProviderErrorBody = serde_json::from_str(body).unwrap_or_default();
        let code = parsed.code().map(str::to_string);

        match (status.as_u16(), code.as_deref()) {
            (_, Some("invalid_grant" | "invalid_credentials")) => ApiError::InvalidCredentials,
            (400, _) if parsed.mentions_invalid_credentials() => ApiError::InvalidCredentials,
            (401 | 403, _) => ApiError::Unauthorized,
            (429, _) => ApiError::RateLimited,
            (500..=599, _) => ApiError::ServerError(status.as_u16()),
            (s, Some(code)) => ApiError::Rejected {
                status: s,
                code: code.to_string(),
            },
            (s, None) => ApiError::Rejected {
                status: s,
                code: format!("http_{}", s),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_invalid_grant() {
        let body = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_REQUEST, body),
            ApiError::InvalidCredentials
        ));
    }

    #[test]
    fn test_from_status_new_style_code() {
        let body = r#"{"code":422,"error_code":"user_already_exists","msg":"User already registered"}"#;
        match ApiError::from_status(StatusCode::UNPROCESSABLE_ENTITY, body) {
            ApiError::Rejected { status, code } => {
                assert_eq!(status, 422);
                assert_eq!(code, "user_already_exists");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_from_status_plain_bodies() {
        assert!(matches!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, ""),
            ApiError::Unauthorized
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            ApiError::RateLimited
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, "<html>"),
            ApiError::ServerError(502)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::NOT_FOUND, "nope"),
            ApiError::Rejected { status: 404, .. }
        ));
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(500);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(200)));
        assert!(truncated.contains("500 total bytes"));
        assert_eq!(ApiError::truncate_body("short"), "short");
    }
}
