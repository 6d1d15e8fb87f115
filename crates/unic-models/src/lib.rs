//! Shared data models for the Unic variant pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Probed video geometry
//! - Banner assets and placement decisions
//! - Per-variant distortion parameters
//! - Encoding, transcode and delivery records
//! - Per-user session state

pub mod banner;
pub mod delivery;
pub mod encoding;
pub mod session;
pub mod transcode;
pub mod variant;
pub mod video;

// Re-export common types
pub use banner::{BannerAsset, BannerMode, BannerPosition, ColorParseError, PlacementDecision, Rgb};
pub use delivery::DeliveryOutcome;
pub use encoding::EncodingConfig;
pub use session::{SessionState, SessionStatus, UserId};
pub use transcode::TranscodeAttempt;
pub use variant::VariantParams;
pub use video::VideoInfo;
