use crate::foundation::core::{Fps, FrameIndex};
use crate::foundation::error::RenderError;
use crate::render::backend::FrameRGBA;
use crate::scene::Quality;
use std::path::Path;

/// Configuration provided to a [`FrameSink`] before the first frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SinkConfig {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Output frames-per-second.
    pub fps: Fps,
    /// Encoder quality preset.
    pub quality: Quality,
}

/// Container format of a finished artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    /// H.264 in MP4, produced by the system `ffmpeg`.
    Mp4,
    /// Uncompressed RGBA frames behind a small header.
    RawRgba,
}

impl ContainerKind {
    /// File extension used for artifacts of this kind.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::RawRgba => "rgba",
        }
    }

    /// MIME type to advertise when delivering the artifact.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Mp4 => "video/mp4",
            Self::RawRgba => "application/octet-stream",
        }
    }
}

/// Sink contract for consuming rendered frames in timeline order.
///
/// Ordering contract: `push_frame` is called in strictly increasing `FrameIndex` order.
pub trait FrameSink: Send {
    /// Called once before any frames are pushed.
    fn begin(&mut self, cfg: SinkConfig) -> Result<(), RenderError>;
    /// Push one frame in strictly increasing timeline order.
    fn push_frame(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> Result<(), RenderError>;
    /// Called once after the last frame is pushed. The output file is complete on success.
    fn end(&mut self) -> Result<(), RenderError>;
}

/// Creates one [`FrameSink`] per render attempt, writing to a given path.
pub trait SinkFactory: Send + Sync {
    /// Container produced by sinks from this factory.
    fn container(&self) -> ContainerKind;

    /// Create a sink that writes its output to `out_path`.
    fn create(&self, out_path: &Path) -> Result<Box<dyn FrameSink>, RenderError>;
}

/// In-memory sink for tests and debugging.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<SinkConfig>,
    frames: Vec<(FrameIndex, FrameRGBA)>,
    finished: bool,
}

impl InMemorySink {
    /// Create a new in-memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration captured in `begin`, if any.
    pub fn config(&self) -> Option<SinkConfig> {
        self.cfg
    }

    /// Captured frames in push order.
    pub fn frames(&self) -> &[(FrameIndex, FrameRGBA)] {
        &self.frames
    }

    /// Whether `end` has been called.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl FrameSink for InMemorySink {
    fn begin(&mut self, cfg: SinkConfig) -> Result<(), RenderError> {
        self.cfg = Some(cfg);
        self.frames.clear();
        self.finished = false;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> Result<(), RenderError> {
        if let Some((last, _)) = self.frames.last()
            && idx.0 <= last.0
        {
            return Err(RenderError::encoder("out-of-order frame index"));
        }
        self.frames.push((idx, frame.clone()));
        Ok(())
    }

    fn end(&mut self) -> Result<(), RenderError> {
        self.finished = true;
        Ok(())
    }
}

pub(crate) fn check_frame(cfg: &SinkConfig, frame: &FrameRGBA) -> Result<(), RenderError> {
    if frame.width != cfg.width || frame.height != cfg.height {
        return Err(RenderError::encoder(format!(
            "frame size mismatch: got {}x{}, expected {}x{}",
            frame.width, frame.height, cfg.width, cfg.height
        )));
    }
    let expected = (cfg.width as usize) * (cfg.height as usize) * 4;
    if frame.data.len() != expected {
        return Err(RenderError::encoder(
            "frame.data size mismatch with width*height*4",
        ));
    }
    Ok(())
}
