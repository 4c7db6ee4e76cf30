//! Uncompressed RGBA container.
//!
//! Layout: an 8-byte magic, then width, height, fps num and fps den as little-endian `u32`,
//! followed by premultiplied RGBA8 frames back to back.

use crate::encode::sink::{ContainerKind, FrameSink, SinkConfig, SinkFactory, check_frame};
use crate::foundation::core::{Fps, FrameIndex};
use crate::foundation::error::RenderError;
use crate::render::backend::FrameRGBA;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const MAGIC: &[u8; 8] = b"FCRAW\0v1";

/// Size of the header in bytes.
pub const RAW_HEADER_LEN: u64 = 24;

/// Parsed raw container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHeader {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frame rate.
    pub fps: Fps,
}

impl RawHeader {
    /// Read and check the header at the start of `r`.
    pub fn read_from(r: &mut impl Read) -> std::io::Result<Self> {
        let mut buf = [0u8; RAW_HEADER_LEN as usize];
        r.read_exact(&mut buf)?;
        if &buf[..8] != MAGIC {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "not a framecast raw container",
            ));
        }
        let u = |i: usize| u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
        Ok(Self {
            width: u(8),
            height: u(12),
            fps: Fps {
                num: u(16),
                den: u(20),
            },
        })
    }

    /// Bytes per frame.
    pub fn frame_len(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * 4
    }
}

/// Writes frames into the raw container.
pub struct RawRgbaSink {
    out_path: PathBuf,
    out: Option<BufWriter<File>>,
    cfg: Option<SinkConfig>,
    last_idx: Option<FrameIndex>,
}

impl RawRgbaSink {
    /// Create a sink writing to `out_path`.
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        Self {
            out_path: out_path.into(),
            out: None,
            cfg: None,
            last_idx: None,
        }
    }
}

impl FrameSink for RawRgbaSink {
    fn begin(&mut self, cfg: SinkConfig) -> Result<(), RenderError> {
        if cfg.width == 0 || cfg.height == 0 {
            return Err(RenderError::encoder("raw sink width/height must be non-zero"));
        }
        let file = File::create(&self.out_path).map_err(|e| RenderError::encoder_io(&e))?;
        let mut out = BufWriter::new(file);
        let mut header = Vec::with_capacity(RAW_HEADER_LEN as usize);
        header.extend_from_slice(MAGIC);
        for v in [cfg.width, cfg.height, cfg.fps.num, cfg.fps.den] {
            header.extend_from_slice(&v.to_le_bytes());
        }
        out.write_all(&header)
            .map_err(|e| RenderError::encoder_io(&e))?;
        self.out = Some(out);
        self.cfg = Some(cfg);
        self.last_idx = None;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> Result<(), RenderError> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| RenderError::encoder("raw sink not started"))?;
        if let Some(last) = self.last_idx
            && idx.0 <= last.0
        {
            return Err(RenderError::encoder(
                "raw sink received out-of-order frame index",
            ));
        }
        check_frame(cfg, frame)?;
        self.last_idx = Some(idx);

        let out = self
            .out
            .as_mut()
            .ok_or_else(|| RenderError::encoder("raw sink is already finalized"))?;
        out.write_all(&frame.data)
            .map_err(|e| RenderError::encoder_io(&e))
    }

    fn end(&mut self) -> Result<(), RenderError> {
        let out = self
            .out
            .take()
            .ok_or_else(|| RenderError::encoder("raw sink not started"))?;
        let file = out
            .into_inner()
            .map_err(|e| RenderError::encoder_io(e.error()))?;
        file.sync_all().map_err(|e| RenderError::encoder_io(&e))?;
        self.cfg = None;
        Ok(())
    }
}

/// Factory for [`RawRgbaSink`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RawRgbaSinkFactory;

impl SinkFactory for RawRgbaSinkFactory {
    fn container(&self) -> ContainerKind {
        ContainerKind::RawRgba
    }

    fn create(&self, out_path: &Path) -> Result<Box<dyn FrameSink>, RenderError> {
        Ok(Box::new(RawRgbaSink::new(out_path)))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/raw.rs"]
mod tests;
