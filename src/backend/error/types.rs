/**
 * Backend Error Types
 *
 * # Error Types
 *
 * - `CoreError` - Failures of the realtime messaging core (send, presence,
 *   read receipts). Reported to clients as `ack` errors or `message-error`
 *   events.
 * - `BackendError` - Errors returned from HTTP handlers, convertible to a
 *   JSON response.
 *
 * # Propagation
 *
 * Errors raised before a send is acknowledged abort the send with no side
 * effects. Errors raised during asynchronous persistence never reach the
 * acknowledgement; they surface as a `message-error` event keyed by the
 * temporary id.
 */

use axum::http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use crate::backend::store::StoreError;
use crate::shared::SharedError;

/// Failures of the messaging core
#[derive(Debug, Error)]
pub enum CoreError {
    /// The sender's profile could not be resolved; nothing was broadcast or persisted
    #[error("sender {0} not found")]
    SenderNotFound(Uuid),

    #[error("conversation {0} not found")]
    ConversationNotFound(Uuid),

    #[error("message {0} not found")]
    MessageNotFound(Uuid),

    /// Persisting or updating durable state failed
    #[error("persistence failed: {0}")]
    PersistenceFailure(#[from] StoreError),

    /// Presence could not be read; senders degrade to "nobody online"
    #[error("presence lookup failed: {0}")]
    PresenceLookupFailure(#[source] StoreError),

    /// A disconnect arrived for a handle that no longer owns the user's presence
    #[error("connection {0} is no longer bound to a user")]
    StaleConnectionHandle(Uuid),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl CoreError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::SenderNotFound(_) | Self::ConversationNotFound(_) | Self::MessageNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::StaleConnectionHandle(_) => StatusCode::CONFLICT,
            Self::PersistenceFailure(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::PersistenceFailure(_) | Self::PresenceLookupFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<SharedError> for CoreError {
    fn from(err: SharedError) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

/// Errors returned by HTTP handlers
#[derive(Debug, Error)]
pub enum BackendError {
    /// Handler error (e.g. malformed path or query)
    #[error("Handler error: {message}")]
    HandlerError {
        status: StatusCode,
        message: String,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    SharedError(#[from] SharedError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl BackendError {
    pub fn handler(status: StatusCode, message: impl Into<String>) -> Self {
        Self::HandlerError {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::handler(StatusCode::NOT_FOUND, message)
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::HandlerError { status, .. } => *status,
            Self::Core(err) => err.status_code(),
            Self::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::SharedError(SharedError::ValidationError { .. }) => StatusCode::BAD_REQUEST,
            Self::SharedError(SharedError::SerializationError { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::SerializationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::HandlerError { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
