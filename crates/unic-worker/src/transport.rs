//! Chat transport seam.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Send failures the delivery retrier distinguishes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Request entity too large")]
    EntityTooLarge,

    #[error("API error: {0}")]
    Api(String),
}

impl TransportError {
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api(message.into())
    }

    pub fn rate_limited(secs: u64) -> Self {
        Self::RateLimited {
            retry_after: Duration::from_secs(secs),
        }
    }
}

/// Outbound chat transport bound to one recipient.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Largest upload the transport accepts.
    fn max_upload_bytes(&self) -> u64;

    async fn send_video(&self, path: &Path, caption: &str) -> Result<(), TransportError>;

    async fn send_message(&self, text: &str) -> Result<(), TransportError>;
}
