//! Delivery result record.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    /// File that the transport accepted
    pub sent_path: PathBuf,
    /// Compressed intermediate, if one was produced (already removed)
    pub compressed_path: Option<PathBuf>,
    /// Number of send attempts made
    pub attempts_used: u32,
}

impl DeliveryOutcome {
    pub fn was_compressed(&self) -> bool {
        self.compressed_path.is_some()
    }
}
