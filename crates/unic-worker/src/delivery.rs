//! Delivery of rendered variants through a size-limited transport.
//!
//! Delivery is a small state machine. Each send either succeeds or moves
//! to a state that decides the next step:
//!
//! ```text
//! Sending ─┬─> Delivered
//!          ├─> WaitingRateLimit ──> Sending
//!          ├─> CompressingThenResend ──> Sending      (first rejection only)
//!          ├─> TooLargeFatal                         (rejected after compression)
//!          ├─> TransientRetry ──> Sending            (while attempts remain)
//!          └─> Fatal
//! ```
//!
//! Files above the transport limit are compressed before the first send.
//! A compressed intermediate never outlives the call.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use unic_media::fs_utils::{file_size, remove_if_exists};
use unic_media::Compressor;
use unic_models::DeliveryOutcome;

use crate::config::DeliveryConfig;
use crate::error::DeliveryError;
use crate::transport::{Transport, TransportError};

#[derive(Debug)]
enum DeliveryState {
    Sending,
    WaitingRateLimit(Duration),
    CompressingThenResend,
    TransientRetry { message: String },
    Delivered,
    TooLargeFatal,
    Fatal(DeliveryError),
}

/// Sends artifacts with rate-limit waits, compression and bounded retries.
pub struct DeliveryRetrier {
    transport: Arc<dyn Transport>,
    compressor: Arc<dyn Compressor>,
    config: DeliveryConfig,
}

impl DeliveryRetrier {
    pub fn new(transport: Arc<dyn Transport>, compressor: Arc<dyn Compressor>, config: DeliveryConfig) -> Self {
        Self {
            transport,
            compressor,
            config,
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Deliver `artifact` with `caption`.
    pub async fn deliver(&self, artifact: &Path, caption: &str) -> Result<DeliveryOutcome, DeliveryError> {
        let mut run = DeliveryRun::new(artifact);
        let result = self.drive(&mut run, caption).await;

        if let Some(compressed) = &run.compressed {
            remove_if_exists(compressed).await;
        }

        match result {
            Ok(()) => {
                metrics::counter!("unic_deliveries_total", "status" => "delivered").increment(1);
                Ok(DeliveryOutcome {
                    sent_path: run.current,
                    compressed_path: run.compressed,
                    attempts_used: run.sends,
                })
            }
            Err(e) => {
                metrics::counter!("unic_deliveries_total", "status" => "failed").increment(1);
                warn!(artifact = %artifact.display(), sends = run.sends, "Delivery failed: {}", e);
                self.notify(&e.user_notice()).await;
                Err(e)
            }
        }
    }

    async fn drive(&self, run: &mut DeliveryRun, caption: &str) -> Result<(), DeliveryError> {
        let limit = self.transport.max_upload_bytes();
        let size = tokio::fs::metadata(&run.current).await?.len();

        if size > limit {
            debug!(size, limit, "Artifact above upload limit, compressing before send");
            self.compress(run).await?;
        }

        let mut state = DeliveryState::Sending;
        loop {
            state = match state {
                DeliveryState::Sending => {
                    run.sends += 1;
                    self.send(run, caption).await
                }
                DeliveryState::WaitingRateLimit(wait) => {
                    metrics::counter!("unic_delivery_retries_total", "reason" => "rate_limited").increment(1);
                    info!(wait_secs = wait.as_secs(), "Rate limited, waiting before resend");
                    tokio::time::sleep(wait).await;
                    DeliveryState::Sending
                }
                DeliveryState::CompressingThenResend => {
                    metrics::counter!("unic_delivery_retries_total", "reason" => "too_large").increment(1);
                    self.compress(run).await?;
                    DeliveryState::Sending
                }
                DeliveryState::TransientRetry { message } => {
                    run.api_failures += 1;
                    if run.api_failures >= self.config.attempts {
                        DeliveryState::Fatal(DeliveryError::Transport {
                            message,
                            attempts: run.api_failures,
                        })
                    } else {
                        metrics::counter!("unic_delivery_retries_total", "reason" => "api").increment(1);
                        let backoff = self.config.backoff_base * run.api_failures;
                        warn!(attempt = run.api_failures, backoff_secs = backoff.as_secs_f64(), "Send failed: {}", message);
                        tokio::time::sleep(backoff).await;
                        DeliveryState::Sending
                    }
                }
                DeliveryState::Delivered => return Ok(()),
                DeliveryState::TooLargeFatal => return Err(DeliveryError::TooLargeAfterCompression),
                DeliveryState::Fatal(e) => return Err(e),
            };
        }
    }

    async fn send(&self, run: &DeliveryRun, caption: &str) -> DeliveryState {
        match self.transport.send_video(&run.current, caption).await {
            Ok(()) => DeliveryState::Delivered,
            Err(TransportError::RateLimited { retry_after }) => DeliveryState::WaitingRateLimit(retry_after),
            Err(TransportError::EntityTooLarge) if run.compressed.is_none() => DeliveryState::CompressingThenResend,
            Err(TransportError::EntityTooLarge) => DeliveryState::TooLargeFatal,
            Err(TransportError::Api(message)) => DeliveryState::TransientRetry { message },
        }
    }

    async fn compress(&self, run: &mut DeliveryRun) -> Result<(), DeliveryError> {
        let target = self.transport.max_upload_bytes();
        let compressed = self
            .compressor
            .compress(&run.current, target)
            .await
            .map_err(|e| DeliveryError::budget_exceeded(e.to_string()))?;

        let size = file_size(&compressed).await.unwrap_or(0);
        run.current = compressed.clone();
        run.compressed = Some(compressed);

        self.notify(&format!("Compressed to {} for sending.", format_size_mb(size)))
            .await;
        Ok(())
    }

    /// User-visible notices are best effort.
    async fn notify(&self, text: &str) {
        if let Err(e) = self.transport.send_message(text).await {
            warn!("Failed to send notice: {}", e);
        }
    }
}

struct DeliveryRun {
    /// File the next send uploads
    current: PathBuf,
    compressed: Option<PathBuf>,
    sends: u32,
    api_failures: u32,
}

impl DeliveryRun {
    fn new(artifact: &Path) -> Self {
        Self {
            current: artifact.to_path_buf(),
            compressed: None,
            sends: 0,
            api_failures: 0,
        }
    }
}

/// Size as `N.N MB`.
pub fn format_size_mb(bytes: u64) -> String {
    format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
}
