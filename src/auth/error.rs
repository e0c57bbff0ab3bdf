//! Client-facing error taxonomy for authentication and authorization.

use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use validator::ValidationErrors;

use crate::allocator::AllocatorError;
use crate::auth::password::PasswordError;
use crate::auth::token::TokenError;
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No usable token on a protected route. Carries the codec failure when
    /// a token was presented.
    Unauthenticated(Option<TokenError>),
    /// Authenticated, but without a role the route requires.
    Forbidden,
    /// `require_role` / `is_authenticated` check failed in a handler.
    AccessDenied,
    UsernameTaken,
    EmailTaken,
    BadCredentials,
    UserNotFound,
    /// Registration payload failed validation.
    InvalidRequest(String),
    StoreUnavailable(String),
    AllocatorUnavailable(String),
    Internal(String),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "UNAUTHENTICATED",
            Self::Forbidden => "FORBIDDEN",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::UsernameTaken => "USERNAME_TAKEN",
            Self::EmailTaken => "EMAIL_TAKEN",
            Self::BadCredentials => "BAD_CREDENTIALS",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::AllocatorUnavailable(_) => "ALLOCATOR_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) | Self::BadCredentials | Self::UserNotFound => {
                StatusCode::UNAUTHORIZED
            }
            Self::Forbidden | Self::AccessDenied => StatusCode::FORBIDDEN,
            Self::UsernameTaken | Self::EmailTaken => StatusCode::CONFLICT,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::StoreUnavailable(_) | Self::AllocatorUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Codec failure behind an `Unauthenticated` rejection, if any.
    pub fn token_error(&self) -> Option<&TokenError> {
        match self {
            Self::Unauthenticated(Some(e)) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated(None) => write!(f, "Authentication required"),
            Self::Unauthenticated(Some(e)) => write!(f, "Authentication failed: {}", e),
            Self::Forbidden => write!(f, "Insufficient role for this resource"),
            Self::AccessDenied => write!(f, "Access denied"),
            Self::UsernameTaken => write!(f, "Username is already taken"),
            Self::EmailTaken => write!(f, "Email is already registered"),
            Self::BadCredentials => write!(f, "Invalid username or password"),
            Self::UserNotFound => write!(f, "User not found"),
            Self::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            Self::StoreUnavailable(msg) => write!(f, "Credential store unavailable: {}", msg),
            Self::AllocatorUnavailable(msg) => write!(f, "Identifier allocator unavailable: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(field) if field == "username" => Self::UsernameTaken,
            StoreError::Duplicate(field) if field == "email" => Self::EmailTaken,
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<AllocatorError> for AuthError {
    fn from(err: AllocatorError) -> Self {
        Self::AllocatorUnavailable(err.to_string())
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<ValidationErrors> for AuthError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let reason = errs
                    .first()
                    .and_then(|e| e.message.as_ref())
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "is invalid".to_string());
                format!("{} {}", field, reason)
            })
            .collect();
        fields.sort();
        Self::InvalidRequest(fields.join("; "))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let mut error = json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        if let Some(token_error) = self.token_error() {
            error["reason"] = json!(token_error.code());
        }

        (self.status(), Json(json!({ "error": error }))).into_response()
    }
}
