//! Error types for the GymMaster client.
//!
//! `ApiError` is the normalized shape every failed request is reduced to.
//! `AppError` is the taxonomy callers match on, and [`Notice`] is the single
//! mapping from that taxonomy to what a user gets to see.

use serde::Serialize;
use thiserror::Error;

/// Coarse classification of a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// The server answered, but not with a usable success response
    ServerError,
    /// No response was received
    NetworkError,
    /// The request could not be built or sent for a local reason
    UnknownError,
}

/// Normalized failure of a single backend call
#[derive(Error, Debug, Clone, Serialize)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    /// HTTP status, when a response was received
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Message taken from the response body, if the backend sent one
    #[serde(skip)]
    pub server_message: Option<String>,
}

pub const SERVER_ERROR_MESSAGE: &str = "Server error";
pub const NETWORK_ERROR_MESSAGE: &str = "Connection error. Check your internet connection.";
pub const UNEXPECTED_RESPONSE_MESSAGE: &str = "Unexpected response from server";

impl ApiError {
    /// The backend answered with its own failure message
    pub fn server(status: Option<u16>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: ErrorKind::ServerError,
            server_message: Some(message.clone()),
            message,
            status,
        }
    }

    /// The backend answered with a failure; `server_message` is whatever the
    /// body carried, blank messages counting as none
    pub fn from_response(status: Option<u16>, server_message: Option<String>) -> Self {
        let server_message = server_message.filter(|m| !m.trim().is_empty());
        Self {
            kind: ErrorKind::ServerError,
            message: server_message
                .clone()
                .unwrap_or_else(|| SERVER_ERROR_MESSAGE.to_string()),
            status,
            server_message,
        }
    }

    pub fn network() -> Self {
        Self {
            kind: ErrorKind::NetworkError,
            message: NETWORK_ERROR_MESSAGE.to_string(),
            status: None,
            server_message: None,
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::UnknownError,
            message: message.into(),
            status: None,
            server_message: None,
        }
    }

    /// Body did not match the endpoint's schema
    pub fn unexpected_response(status: Option<u16>) -> Self {
        Self {
            kind: ErrorKind::ServerError,
            message: UNEXPECTED_RESPONSE_MESSAGE.to_string(),
            status,
            server_message: None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(401)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }

    /// The `{success: false, message, errorKind}` view of this failure
    pub fn to_failure_body(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "message": self.message,
            "errorKind": self.kind,
        })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::unknown(err.to_string())
        } else {
            Self::network()
        }
    }
}

/// Errors surfaced by client operations
#[derive(Error, Debug, Clone)]
pub enum AppError {
    /// Local input was missing or malformed; nothing was sent
    #[error("{0}")]
    Validation(String),

    /// The operation is not valid in the current session phase
    #[error("{0}")]
    InvalidState(String),

    /// The server rejected the bearer token; the session has been cleared
    #[error("Session expired")]
    SessionExpired,

    #[error("{0}")]
    Api(ApiError),
}

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        if err.is_unauthorized() {
            Self::SessionExpired
        } else {
            Self::Api(err)
        }
    }
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for raw adapter calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors raised by the check-in flow
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CheckInError {
    #[error("Your profile has no valid QR code. Contact the front desk.")]
    MissingQrIdentity,

    #[error("Invalid QR code: could not determine the branch")]
    InvalidPayload,

    #[error("This QR code has expired")]
    ExpiredPayload,

    #[error("Check-in endpoint not found. Verify the server configuration.")]
    EndpointMissing,

    #[error("Session expired")]
    SessionExpired,

    /// The backend refused the check-in with its own message
    #[error("{0}")]
    Rejected(String),

    #[error("Could not complete the check-in")]
    CheckInFailed,
}

impl CheckInError {
    /// Whether the user may scan again after this failure
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::MissingQrIdentity | Self::SessionExpired)
    }

    /// Classify a failed check-in call
    pub fn from_api(err: &ApiError) -> Self {
        if err.is_unauthorized() {
            Self::SessionExpired
        } else if err.is_not_found() {
            Self::EndpointMissing
        } else {
            match (&err.kind, &err.server_message) {
                (ErrorKind::ServerError, Some(message)) => Self::Rejected(message.clone()),
                _ => Self::CheckInFailed,
            }
        }
    }
}

/// What the front end shows for a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: &'static str,
    pub message: String,
    /// Offer the user a retry
    pub retry: bool,
    /// Do not show a dialog; route the user back to login instead
    pub silent: bool,
}

impl Notice {
    fn new(title: &'static str, message: impl Into<String>, retry: bool) -> Self {
        Self {
            title,
            message: message.into(),
            retry,
            silent: false,
        }
    }
}

impl From<&AppError> for Notice {
    fn from(err: &AppError) -> Self {
        match err {
            AppError::Validation(msg) => Notice::new("Invalid input", msg.clone(), false),
            AppError::InvalidState(msg) => Notice::new("Not available", msg.clone(), false),
            AppError::SessionExpired => Notice {
                silent: true,
                ..Notice::new("Session expired", "Please log in again.", false)
            },
            AppError::Api(api) => match api.kind {
                ErrorKind::ServerError => Notice::new("Error", api.message.clone(), true),
                ErrorKind::NetworkError => Notice::new("Connection error", NETWORK_ERROR_MESSAGE, true),
                ErrorKind::UnknownError => Notice::new("Unexpected error", api.message.clone(), false),
            },
        }
    }
}

impl From<&CheckInError> for Notice {
    fn from(err: &CheckInError) -> Self {
        match err {
            CheckInError::SessionExpired => Notice::from(&AppError::SessionExpired),
            other => Notice::new("Check-in error", other.to_string(), other.is_retryable()),
        }
    }
}
