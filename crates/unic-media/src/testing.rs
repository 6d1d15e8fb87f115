//! In-crate test doubles for the engine and prober seams.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Mutex;

use unic_models::VideoInfo;

use crate::command::{FfmpegCommand, MediaEngine};
use crate::error::MediaResult;
use crate::probe::MediaProber;

type Handler = Box<dyn Fn(&FfmpegCommand) -> MediaResult<()> + Send + Sync>;

/// Records every command and answers through a handler.
pub(crate) struct FakeEngine {
    calls: Mutex<Vec<FfmpegCommand>>,
    handler: Handler,
}

impl FakeEngine {
    /// Succeeds without producing output.
    pub fn ok() -> Self {
        Self::with_handler(|_| Ok(()))
    }

    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&FfmpegCommand) -> MediaResult<()> + Send + Sync + 'static,
    {
        Self {
            calls: Mutex::new(Vec::new()),
            handler: Box::new(handler),
        }
    }

    pub fn calls(&self) -> Vec<FfmpegCommand> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.calls.lock().unwrap().push(cmd.clone());
        (self.handler)(cmd)
    }
}

/// Prober returning a fixed answer.
pub(crate) struct FixedProber(pub VideoInfo);

#[async_trait]
impl MediaProber for FixedProber {
    async fn probe(&self, _path: &Path) -> VideoInfo {
        self.0
    }
}

pub(crate) fn portrait_info() -> VideoInfo {
    VideoInfo {
        width: 1080,
        height: 1920,
        duration: 10.0,
        fps: 30.0,
        has_audio: true,
    }
}
