//! Test doubles for the transport, compressor, engine and prober seams.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use unic_media::{Compressor, FfmpegCommand, MediaEngine, MediaError, MediaProber, MediaResult};
use unic_models::VideoInfo;

use crate::transport::{Transport, TransportError};

/// Answers `send_video` from a script; an exhausted script succeeds.
pub(crate) struct ScriptedTransport {
    limit: u64,
    script: Mutex<VecDeque<Result<(), TransportError>>>,
    sent: Mutex<Vec<(PathBuf, String)>>,
    messages: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(limit: u64, script: Vec<Result<(), TransportError>>) -> Self {
        Self {
            limit,
            script: Mutex::new(script.into()),
            sent: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn sent_paths(&self) -> Vec<PathBuf> {
        self.sent.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn sent_captions(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn max_upload_bytes(&self) -> u64 {
        self.limit
    }

    async fn send_video(&self, path: &Path, caption: &str) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push((path.to_path_buf(), caption.to_string()));
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn send_message(&self, text: &str) -> Result<(), TransportError> {
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Writes a fixed-size file into `dir`, or always fails.
pub(crate) struct FakeCompressor {
    dir: Option<PathBuf>,
    output_bytes: usize,
    targets: Mutex<Vec<u64>>,
    outputs: Mutex<Vec<PathBuf>>,
}

impl FakeCompressor {
    pub fn new(dir: &Path, output_bytes: usize) -> Self {
        Self {
            dir: Some(dir.to_path_buf()),
            output_bytes,
            targets: Mutex::new(Vec::new()),
            outputs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            dir: None,
            output_bytes: 0,
            targets: Mutex::new(Vec::new()),
            outputs: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.targets.lock().unwrap().len()
    }

    pub fn targets(&self) -> Vec<u64> {
        self.targets.lock().unwrap().clone()
    }

    pub fn outputs(&self) -> Vec<PathBuf> {
        self.outputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Compressor for FakeCompressor {
    async fn compress(&self, _source: &Path, target_bytes: u64) -> MediaResult<PathBuf> {
        let call = {
            let mut targets = self.targets.lock().unwrap();
            targets.push(target_bytes);
            targets.len()
        };
        let Some(dir) = &self.dir else {
            return Err(MediaError::BudgetExceeded {
                target_bytes,
                best_bytes: Some(target_bytes * 2),
                attempts: 4,
            });
        };

        let output = dir.join(format!("compressed_{}.mp4", call));
        tokio::fs::write(&output, vec![0u8; self.output_bytes]).await?;
        self.outputs.lock().unwrap().push(output.clone());
        Ok(output)
    }
}

/// Engine that writes a small file at every output path, optionally
/// failing from a given call on.
pub(crate) struct WritingEngine {
    fail_from_call: Option<usize>,
    calls: Mutex<Vec<FfmpegCommand>>,
}

impl WritingEngine {
    pub fn ok() -> Self {
        Self {
            fail_from_call: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail on the `n`-th call (1-based) and later ones.
    pub fn failing_from(n: usize) -> Self {
        Self {
            fail_from_call: Some(n),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<FfmpegCommand> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaEngine for WritingEngine {
    async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(cmd.clone());
            calls.len()
        };
        tokio::fs::write(cmd.output_path(), b"rendered").await?;

        match self.fail_from_call {
            Some(n) if call >= n => Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                Some("Conversion failed!".to_string()),
                Some(1),
            )),
            _ => Ok(()),
        }
    }
}

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
