//! Worker error types.

use thiserror::Error;

use crate::transport::TransportError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Media error: {0}")]
    Media(#[from] unic_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    /// Whether a variant render failed in the media engine.
    pub fn is_encode_failure(&self) -> bool {
        matches!(self, WorkerError::Media(unic_media::MediaError::FfmpegFailed { .. }))
    }
}

/// Session registry rejections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("A run is already in progress for this user")]
    Busy,

    #[error("No staged input for this user")]
    NoSession,

    #[error("Variant count {value} outside {min}..={max}")]
    InvalidVariantCount { value: u32, min: u32, max: u32 },
}

/// Terminal delivery failures.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("File is still too large after compression")]
    TooLargeAfterCompression,

    #[error("Could not compress within the upload limit: {0}")]
    BudgetExceeded(String),

    #[error("Send failed after {attempts} attempts: {message}")]
    Transport { message: String, attempts: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeliveryError {
    pub fn budget_exceeded(msg: impl Into<String>) -> Self {
        Self::BudgetExceeded(msg.into())
    }

    /// Message shown to the recipient when delivery gives up.
    pub fn user_notice(&self) -> String {
        match self {
            DeliveryError::TooLargeAfterCompression => {
                "File is too large even after compression. Shorten the clip and try again.".to_string()
            }
            DeliveryError::BudgetExceeded(message) => {
                format!("Could not compress the video for sending: {}", message)
            }
            DeliveryError::Transport { message, .. } => format!("Could not send the video: {}", message),
            DeliveryError::Io(e) => format!("Could not read the video: {}", e),
        }
    }
}
