use crate::encode::sink::{ContainerKind, FrameSink, SinkConfig, SinkFactory, check_frame};
use crate::foundation::core::{Fps, FrameIndex};
use crate::foundation::error::RenderError;
use crate::foundation::math::mul_div255_u16;
use crate::render::backend::FrameRGBA;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

/// Options shared by every [`FfmpegSink`] a factory creates.
#[derive(Clone, Debug)]
pub struct FfmpegSinkOpts {
    /// Executable to spawn.
    pub program: PathBuf,
    /// Background color used to flatten alpha (RGBA8, straight alpha).
    pub bg_rgba: [u8; 4],
}

impl Default for FfmpegSinkOpts {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            bg_rgba: [0, 0, 0, 255],
        }
    }
}

/// Sink that spawns the system `ffmpeg` and streams raw frames to its stdin.
pub struct FfmpegSink {
    opts: FfmpegSinkOpts,
    out_path: PathBuf,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,

    scratch: Vec<u8>,
    cfg: Option<SinkConfig>,
    last_idx: Option<FrameIndex>,
}

impl FfmpegSink {
    /// Create a sink that encodes into `out_path`.
    pub fn new(opts: FfmpegSinkOpts, out_path: impl Into<PathBuf>) -> Self {
        Self {
            opts,
            out_path: out_path.into(),
            child: None,
            stdin: None,
            stderr_drain: None,
            scratch: Vec::new(),
            cfg: None,
            last_idx: None,
        }
    }
}

impl FrameSink for FfmpegSink {
    fn begin(&mut self, cfg: SinkConfig) -> Result<(), RenderError> {
        if cfg.fps.num == 0 || cfg.fps.den == 0 {
            return Err(RenderError::encoder("fps must be non-zero"));
        }
        if cfg.width == 0 || cfg.height == 0 {
            return Err(RenderError::encoder(
                "ffmpeg sink width/height must be non-zero",
            ));
        }
        if !cfg.width.is_multiple_of(2) || !cfg.height.is_multiple_of(2) {
            return Err(RenderError::encoder(
                "ffmpeg sink width/height must be even (required for yuv420p mp4 output)",
            ));
        }
        ensure_parent_dir(&self.out_path)?;

        let mut cmd = Command::new(&self.opts.program);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        // Input is premultiplied RGBA8, which ffmpeg does not understand; push_frame flattens it.
        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
        ]);
        push_input_fps(&mut cmd, cfg.fps);
        cmd.args(["-i", "pipe:0"]);
        cmd.args([
            "-an",
            "-c:v",
            "libx264",
            "-preset",
            cfg.quality.preset(),
            "-crf",
            &cfg.quality.crf().to_string(),
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
            "-f",
            "mp4",
        ]);
        cmd.arg(&self.out_path);

        let mut child = cmd.spawn().map_err(|e| {
            RenderError::encoder(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RenderError::encoder("failed to open ffmpeg stdin"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| RenderError::encoder("failed to open ffmpeg stderr"))?;
        let stderr_drain = std::thread::Builder::new()
            .name("framecast-ffmpeg-stderr".to_string())
            .spawn(move || {
                let mut stderr_bytes = Vec::new();
                stderr.read_to_end(&mut stderr_bytes)?;
                Ok(stderr_bytes)
            })
            .map_err(|e| RenderError::encoder_io(&e))?;

        self.scratch = vec![0u8; (cfg.width as usize) * (cfg.height as usize) * 4];
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.cfg = Some(cfg);
        self.last_idx = None;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> Result<(), RenderError> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| RenderError::encoder("ffmpeg sink not started"))?;
        if let Some(last) = self.last_idx
            && idx.0 <= last.0
        {
            return Err(RenderError::encoder(
                "ffmpeg sink received out-of-order frame index",
            ));
        }
        check_frame(cfg, frame)?;
        self.last_idx = Some(idx);

        if frame.premultiplied {
            flatten_premul_over_bg_to_opaque_rgba8(&mut self.scratch, &frame.data, self.opts.bg_rgba);
        } else {
            self.scratch.copy_from_slice(&frame.data);
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(RenderError::encoder("ffmpeg sink is already finalized"));
        };

        use std::io::Write as _;
        stdin
            .write_all(&self.scratch)
            .map_err(|e| RenderError::encoder_io(&e))
    }

    fn end(&mut self) -> Result<(), RenderError> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| RenderError::encoder("ffmpeg sink not started"))?;

        let status = child.wait().map_err(|e| RenderError::encoder_io(&e))?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| RenderError::encoder("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| RenderError::encoder_io(&e))?,
            None => Vec::new(),
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(RenderError::encoder(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }

        self.cfg = None;
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        // Abandoned mid-render: don't leave ffmpeg writing into the staging file.
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Factory producing one [`FfmpegSink`] per render attempt.
#[derive(Clone, Debug, Default)]
pub struct FfmpegSinkFactory {
    opts: FfmpegSinkOpts,
}

impl FfmpegSinkFactory {
    /// Factory with the given options.
    pub fn new(opts: FfmpegSinkOpts) -> Self {
        Self { opts }
    }
}

impl SinkFactory for FfmpegSinkFactory {
    fn container(&self) -> ContainerKind {
        ContainerKind::Mp4
    }

    fn create(&self, out_path: &Path) -> Result<Box<dyn FrameSink>, RenderError> {
        Ok(Box::new(FfmpegSink::new(self.opts.clone(), out_path)))
    }
}

fn push_input_fps(cmd: &mut Command, fps: Fps) {
    // For rawvideo input, `-r` before `-i` sets the input framerate; rational `num/den` is accepted.
    cmd.args(["-r", &format!("{}/{}", fps.num, fps.den)]);
}

fn flatten_premul_over_bg_to_opaque_rgba8(dst: &mut [u8], src_premul: &[u8], bg_rgba: [u8; 4]) {
    let bg_r = u16::from(bg_rgba[0]);
    let bg_g = u16::from(bg_rgba[1]);
    let bg_b = u16::from(bg_rgba[2]);

    for (d, s) in dst.chunks_exact_mut(4).zip(src_premul.chunks_exact(4)) {
        let a = u16::from(s[3]);
        if a == 255 {
            d.copy_from_slice(s);
            continue;
        }

        let inv = 255u16 - a;
        let r = u16::from(s[0]) + mul_div255_u16(bg_r, inv);
        let g = u16::from(s[1]) + mul_div255_u16(bg_g, inv);
        let b = u16::from(s[2]) + mul_div255_u16(bg_b, inv);

        d[0] = r.min(255) as u8;
        d[1] = g.min(255) as u8;
        d[2] = b.min(255) as u8;
        d[3] = 255;
    }
}

/// Ensure the parent directory of `path` exists.
pub(crate) fn ensure_parent_dir(path: &Path) -> Result<(), RenderError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| RenderError::encoder_io(&e))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
