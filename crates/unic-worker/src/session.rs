//! Per-user session registry.
//!
//! A user holds at most one session. While its run is processing, the
//! session cannot be replaced or reconfigured.

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::debug;

use unic_models::{SessionState, SessionStatus, UserId};

use crate::error::SessionError;

pub type SessionResult<T> = Result<T, SessionError>;

/// Registry of staged and processing sessions.
#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<HashMap<UserId, SessionState>>,
    variant_range: RangeInclusive<u32>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(1..=5)
    }
}

impl SessionStore {
    pub fn new(variant_range: RangeInclusive<u32>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            variant_range,
        }
    }

    /// Stage a new input for `user`.
    ///
    /// Returns the input path of a replaced staged session so the caller can
    /// delete it. Rejected while the user's run is processing.
    pub async fn stage(&self, user: UserId, state: SessionState) -> SessionResult<Option<PathBuf>> {
        let mut sessions = self.sessions.lock().await;
        if sessions.get(&user).is_some_and(SessionState::is_processing) {
            return Err(SessionError::Busy);
        }

        let state = SessionState {
            status: SessionStatus::Staged,
            variants: state.variants.clamp(*self.variant_range.start(), *self.variant_range.end()),
            ..state
        };
        let staged_path = state.input_path.clone();
        let previous = sessions.insert(user, state);
        debug!(user = %user, replaced = previous.is_some(), "Session staged");

        Ok(previous.map(|p| p.input_path).filter(|p| *p != staged_path))
    }

    /// Change the variant count of a staged session.
    pub async fn set_variants(&self, user: UserId, variants: u32) -> SessionResult<SessionState> {
        if !self.variant_range.contains(&variants) {
            return Err(SessionError::InvalidVariantCount {
                value: variants,
                min: *self.variant_range.start(),
                max: *self.variant_range.end(),
            });
        }

        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(&user).ok_or(SessionError::NoSession)?;
        if session.is_processing() {
            return Err(SessionError::Busy);
        }
        session.variants = variants;
        Ok(session.clone())
    }

    /// Move a staged session to processing and return a snapshot of it.
    pub async fn begin_processing(&self, user: UserId) -> SessionResult<SessionState> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(&user).ok_or(SessionError::NoSession)?;
        if session.is_processing() {
            return Err(SessionError::Busy);
        }
        session.status = SessionStatus::Processing;
        Ok(session.clone())
    }

    /// Drop the session, whatever its state.
    pub async fn finish(&self, user: UserId) -> Option<SessionState> {
        self.sessions.lock().await.remove(&user)
    }

    pub async fn get(&self, user: UserId) -> Option<SessionState> {
        self.sessions.lock().await.get(&user).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    pub fn variant_range(&self) -> &RangeInclusive<u32> {
        &self.variant_range
    }
}
