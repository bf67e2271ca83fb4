//! Unified application error model and mapping helpers.
//! `AuthError` is the taxonomy used inside the identity and routing layers; `AppError`
//! is what the HTTP frontend turns into status codes and JSON bodies.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::identity::{Role, RoleSet};

/// Failures raised by the authentication core.
///
/// None of these escape into view code: the auth context folds them into `bool`
/// results and state transitions, the access guard into denial outcomes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Unknown email and wrong password are deliberately the same error.
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("email and password are both required")]
    MissingCredentials,
    #[error("wallet address must be 0x followed by 40 hex characters")]
    MalformedWalletAddress,
    #[error("persisted session is malformed: {0}")]
    MalformedPersistedSession(String),
    #[error("restricted to {required} users; current role is {actual}")]
    ForbiddenRole { required: RoleSet, actual: Role },
    #[error("not authenticated")]
    Unauthenticated,
    #[error("session storage failure: {0}")]
    Storage(String),
    #[error("password hashing failure: {0}")]
    Hashing(String),
    /// A sign-in or storage task panicked or was cancelled before finishing.
    #[error("background task failed: {0}")]
    TaskFailed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    NotFound { code: String, message: String },
    Auth { code: String, message: String },
    Forbidden { code: String, message: String },
    Csrf { code: String, message: String },
    Io { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::Csrf { code, .. }
            | AppError::Io { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::Csrf { message, .. }
            | AppError::Io { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn csrf<S: Into<String>>(code: S, msg: S) -> Self { AppError::Csrf { code: code.into(), message: msg.into() } }
    pub fn io<S: Into<String>>(code: S, msg: S) -> Self { AppError::Io { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::Auth { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::Csrf { .. } => 403,
            AppError::Io { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }

    /// JSON body in the `{status, code, message}` shape every endpoint uses for failures.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "status": "error",
            "code": self.code_str(),
            "message": self.message(),
        })
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        match err {
            AuthError::InvalidCredentials => AppError::auth("invalid_credentials".into(), message),
            AuthError::Unauthenticated => AppError::auth("unauthenticated".into(), message),
            AuthError::MissingCredentials => AppError::user("missing_credentials".into(), message),
            AuthError::MalformedWalletAddress => AppError::user("malformed_wallet_address".into(), message),
            AuthError::ForbiddenRole { .. } => AppError::forbidden("forbidden_role".into(), message),
            // A corrupt stored session is recovered silently; reaching here means a bug upstream.
            AuthError::MalformedPersistedSession(_) => AppError::internal("malformed_session".into(), message),
            AuthError::Storage(_) => AppError::io("session_storage".into(), message),
            AuthError::Hashing(_) => AppError::internal("hashing".into(), message),
            AuthError::TaskFailed(_) => AppError::internal("task_failed".into(), message),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(auth) = err.downcast_ref::<AuthError>() {
            return auth.clone().into();
        }
        AppError::Internal { code: "internal".into(), message: err.to_string() }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
