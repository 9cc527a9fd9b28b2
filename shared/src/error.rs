use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
}

/// What the UI offers after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recovery {
    /// Offer an explicit retry.
    Retry,
    /// Send the user to sign in again.
    Reauthenticate,
    /// Let the user dismiss and press again.
    Dismiss,
}

/// Client-observable failures of the panic flow.
///
/// Every failure inside `Submitting` ends up here; none escapes as a panic.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PanicError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("no location fix available")]
    NoLocation,

    #[error("not authenticated")]
    Unauthenticated,

    #[error("network error: {message}")]
    NetworkError { message: String },

    #[error("server error {status}")]
    ServerError {
        status: u16,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String },
}

impl PanicError {
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn server(status: u16, message: Option<String>) -> Self {
        Self::ServerError { status, message }
    }

    #[must_use]
    pub fn invalid_response(reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "LOCATION_PERMISSION_DENIED",
            Self::NoLocation => "NO_LOCATION",
            Self::Unauthenticated => "AUTH_ERROR",
            Self::NetworkError { .. } => "NETWORK_ERROR",
            Self::ServerError { .. } => "SERVER_ERROR",
            Self::InvalidResponse { .. } => "INVALID_RESPONSE",
        }
    }

    #[must_use]
    pub const fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NoLocation | Self::NetworkError { .. } | Self::ServerError { .. } => {
                ErrorSeverity::Transient
            }
            Self::PermissionDenied | Self::Unauthenticated | Self::InvalidResponse { .. } => {
                ErrorSeverity::Permanent
            }
        }
    }

    #[must_use]
    pub const fn recovery(&self) -> Recovery {
        match self {
            Self::PermissionDenied | Self::NoLocation => Recovery::Retry,
            Self::Unauthenticated => Recovery::Reauthenticate,
            Self::NetworkError { .. } | Self::ServerError { .. } | Self::InvalidResponse { .. } => {
                Recovery::Dismiss
            }
        }
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self {
            Self::PermissionDenied => {
                "Location access is required to send an alert. Please enable location permissions in Settings."
                    .into()
            }
            Self::NoLocation => {
                "Unable to determine your location. Please check your GPS settings and try again."
                    .into()
            }
            Self::Unauthenticated => "Your session has expired. Please sign in again.".into(),
            Self::NetworkError { .. } => {
                "Unable to connect. Please check your internet connection and press the button again."
                    .into()
            }
            Self::ServerError {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => message.clone(),
            Self::ServerError { .. } => {
                "The alert could not be sent. Please try again or call campus security.".into()
            }
            Self::InvalidResponse { .. } => {
                "The server sent an unexpected reply. Your alert may not have been received; please call campus security."
                    .into()
            }
        }
    }
}
