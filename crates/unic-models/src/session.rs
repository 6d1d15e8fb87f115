//! Per-user session state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Transport-level user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Input received, waiting for the user to start
    #[default]
    Staged,
    /// A pipeline run owns the session
    Processing,
}

/// One staged input and its run settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub input_path: PathBuf,
    /// Display name of the original upload or download
    pub original_name: String,
    pub variants: u32,
    #[serde(default)]
    pub status: SessionStatus,
}

impl SessionState {
    pub fn new(input_path: impl Into<PathBuf>, original_name: impl Into<String>) -> Self {
        Self {
            input_path: input_path.into(),
            original_name: original_name.into(),
            variants: 1,
            status: SessionStatus::Staged,
        }
    }

    pub fn is_processing(&self) -> bool {
        self.status == SessionStatus::Processing
    }
}
