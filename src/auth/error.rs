// Authentication Error Types
// Error handling for configuration, redirect validation and the OAuth2 handshake

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AuthError {
    // Client input errors
    #[error("Invalid redirect target")]
    InvalidRedirect,

    #[error("Unsupported OAuth2 provider: {0}")]
    UnsupportedProvider(String),

    // OAuth2-related errors
    #[error("OAuth2 error: {0}")]
    OAuth2Error(String),

    #[error("OAuth2 provider error: {0}")]
    ProviderError(String),

    #[error("Invalid OAuth2 state parameter")]
    InvalidState,

    #[error("OAuth2 code exchange failed: {0}")]
    CodeExchangeFailed(String),

    #[error("Failed to retrieve user info: {0}")]
    UserInfoFailed(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidConfig { key: String, reason: String },

    // Network/HTTP errors
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),

    #[error("Provider communication timeout")]
    Timeout,

    // General errors
    #[error("Internal authentication error: {0}")]
    Internal(String),
}

// Conversion from reqwest errors
impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AuthError::Timeout
        } else {
            AuthError::HttpError(err.to_string())
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::JsonError(err.to_string())
    }
}

// HTTP status code mapping for error responses
impl AuthError {
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::InvalidRedirect | AuthError::UnsupportedProvider(_) => 400,
            _ => 500,
        }
    }

    /// Message safe to show to the client. Upstream detail stays in the logs.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::InvalidRedirect => "Invalid redirect target",
            AuthError::UnsupportedProvider(_) => "Unsupported provider",
            _ => "Authentication failed",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(error = %self, "authentication request failed");
        }

        let body = json!({
            "error": self.public_message(),
            "status": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}
