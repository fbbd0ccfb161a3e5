use serde::{Deserialize, Serialize};

/// Notice shown when a gateway fails without a message of its own.
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong, please try again later";

/// Simplified error structure handed to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error category (e.g., "Validation", "Upload", "Gateway")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Upload rejected: {0}")]
    UploadRejected(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Gateway rejected request: {0}")]
    GatewayRejected(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ServiceError::SerializationError(err.to_string())
        } else {
            ServiceError::ExternalServiceError(err.to_string())
        }
    }
}

impl ServiceError {
    /// Builds a gateway rejection from an optional gateway-supplied message,
    /// falling back to the generic notice when the gateway said nothing useful.
    pub fn gateway_rejected(message: Option<&str>, fallback: &str) -> Self {
        let message = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(fallback);
        ServiceError::GatewayRejected(message.to_string())
    }

    /// Short category label used in `ErrorResponse` and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NotFound",
            Self::ValidationError(_) => "Validation",
            Self::UploadRejected(_) => "Upload",
            Self::InvalidOperation(_) | Self::InvalidStatus(_) => "InvalidOperation",
            Self::GatewayRejected(_) | Self::ExternalServiceError(_) => "Gateway",
            Self::SerializationError(_)
            | Self::EventError(_)
            | Self::InternalError(_)
            | Self::Other(_) => "Internal",
        }
    }

    /// Returns the message suitable for a user notice.
    /// Transport and internal failures collapse into the generic notice so
    /// implementation details never reach the merchant.
    pub fn user_message(&self) -> String {
        match self {
            Self::ValidationError(msg)
            | Self::UploadRejected(msg)
            | Self::GatewayRejected(msg)
            | Self::InvalidOperation(msg)
            | Self::InvalidStatus(msg)
            | Self::NotFound(msg) => msg.clone(),
            Self::ExternalServiceError(_)
            | Self::SerializationError(_)
            | Self::EventError(_)
            | Self::InternalError(_)
            | Self::Other(_) => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.category().to_string(),
            message: self.user_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
