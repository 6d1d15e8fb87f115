//! Variant pipeline worker.
//!
//! This crate provides:
//! - Environment configuration for every stage
//! - Tracing setup and per-run structured logging
//! - The per-user session registry
//! - A transport seam with a Telegram Bot API adapter
//! - The delivery retry state machine
//! - Batch and session variant runs

pub mod config;
pub mod delivery;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod session;
pub mod telegram;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{DeliveryConfig, WorkerConfig};
pub use delivery::DeliveryRetrier;
pub use error::{DeliveryError, SessionError, WorkerError, WorkerResult};
pub use logging::{init_tracing, RunLogger};
pub use pipeline::{acquire_input, AcquiredInput, RenderedVariant, VariantPipeline};
pub use session::SessionStore;
pub use telegram::TelegramTransport;
pub use transport::{Transport, TransportError};
