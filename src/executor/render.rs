use crate::cache::{Artifact, hash_file};
use crate::encode::{FrameSink, SinkConfig, SinkFactory};
use crate::executor::control::RenderControl;
use crate::executor::slots::WorkerSlot;
use crate::foundation::config::ExecutorConfig;
use crate::foundation::core::{FrameIndex, FrameRange};
use crate::foundation::error::{FramecastError, FramecastResult, RenderError};
use crate::render::backend::{FrameRGBA, SceneEngine};
use crate::scene::{RenderParams, SceneDescription};
use rayon::prelude::*;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Drives a [`SceneEngine`] and a [`FrameSink`] to turn one scene into one artifact file.
///
/// Frames of a chunk render in parallel on a shared rayon pool; chunks reach the sink in order.
pub struct RenderExecutor {
    engine: Arc<dyn SceneEngine>,
    sinks: Arc<dyn SinkFactory>,
    staging_dir: PathBuf,
    pool: rayon::ThreadPool,
    chunk_size: u64,
    timeout: Duration,
}

impl std::fmt::Debug for RenderExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderExecutor")
            .field("engine", &self.engine.name())
            .field("container", &self.sinks.container())
            .field("staging_dir", &self.staging_dir)
            .field("frame_threads", &self.pool.current_num_threads())
            .field("chunk_size", &self.chunk_size)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RenderExecutor {
    /// Build an executor writing staged outputs into `staging_dir`.
    pub fn new(
        engine: Arc<dyn SceneEngine>,
        sinks: Arc<dyn SinkFactory>,
        staging_dir: impl Into<PathBuf>,
        cfg: &ExecutorConfig,
    ) -> FramecastResult<Self> {
        Ok(Self {
            engine,
            sinks,
            staging_dir: staging_dir.into(),
            pool: build_thread_pool(cfg.frame_threads)?,
            chunk_size: normalized_chunk_size(cfg.chunk_size),
            timeout: cfg.render_timeout(),
        })
    }

    /// Render every frame of `desc` and encode it into a staged artifact file.
    ///
    /// `slot` is held for the duration of the call and released when it returns. The staging
    /// file is removed on any error.
    #[tracing::instrument(
        skip_all,
        fields(fingerprint = %ctl.fingerprint, attempt = ctl.attempt, engine = self.engine.name())
    )]
    pub fn render(
        &self,
        desc: &SceneDescription,
        params: &RenderParams,
        slot: WorkerSlot,
        ctl: &RenderControl,
    ) -> Result<Artifact, RenderError> {
        let _slot = slot;
        let started = Instant::now();
        let deadline = started + self.timeout;

        let total = desc.frame_count(params);
        if total == 0 {
            return Err(RenderError::engine("scene produces no frames"));
        }

        std::fs::create_dir_all(&self.staging_dir)
            .map_err(|e| RenderError::storage(format!("create staging directory: {e}")))?;
        let container = self.sinks.container();
        let path = self.staging_dir.join(format!(
            "{}-a{}.{}.part",
            ctl.fingerprint.to_hex(),
            ctl.attempt,
            container.extension()
        ));
        let mut staged = TempFileGuard(Some(path.clone()));

        let mut sink = self.sinks.create(&path)?;
        sink.begin(SinkConfig {
            width: params.resolution.width,
            height: params.resolution.height,
            fps: params.fps,
            quality: params.quality,
        })?;
        tracing::debug!(frames = total, path = %path.display(), "render started");

        let range = FrameRange {
            start: FrameIndex(0),
            end: FrameIndex(total),
        };
        let mut done = 0u64;
        for chunk in range.chunks(self.chunk_size) {
            self.check(ctl, deadline)?;
            let frames = self.render_chunk(desc, params, chunk, ctl, deadline);
            push_chunk(sink.as_mut(), chunk, frames)?;
            done += chunk.len_frames();
            ctl.report(done, total);
        }
        self.check(ctl, deadline)?;
        sink.end()?;
        drop(sink);

        let (content_hash, size_bytes) = hash_file(&path)
            .map_err(|e| RenderError::storage(format!("hash staged artifact: {e}")))?;
        staged.disarm();

        tracing::info!(
            frames = total,
            size_bytes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "render finished"
        );
        Ok(Artifact {
            fingerprint: ctl.fingerprint,
            location: path,
            size_bytes,
            duration_secs: params.fps.frames_to_secs(total),
            frame_count: total,
            content_hash,
            container,
            params: *params,
        })
    }

    fn check(&self, ctl: &RenderControl, deadline: Instant) -> Result<(), RenderError> {
        if ctl.cancel.is_cancelled() {
            return Err(RenderError::Cancelled);
        }
        if Instant::now() >= deadline {
            return Err(RenderError::TimedOut {
                limit: self.timeout,
            });
        }
        Ok(())
    }

    fn render_chunk(
        &self,
        desc: &SceneDescription,
        params: &RenderParams,
        chunk: FrameRange,
        ctl: &RenderControl,
        deadline: Instant,
    ) -> Vec<Result<FrameRGBA, RenderError>> {
        let scene = desc.scene();
        let engine = self.engine.as_ref();
        self.pool.install(|| {
            (0..chunk.len_frames() as usize)
                .into_par_iter()
                .map(|i| {
                    let f = chunk.start.0 + i as u64;
                    self.check(ctl, deadline)?;
                    std::panic::catch_unwind(AssertUnwindSafe(|| {
                        engine.render_frame(scene, params, FrameIndex(f))
                    }))
                    .unwrap_or_else(|payload| {
                        Err(RenderError::engine(format!(
                            "engine panicked on frame {f}: {}",
                            panic_message(payload.as_ref())
                        )))
                    })
                })
                .collect()
        })
    }
}

fn push_chunk(
    sink: &mut dyn FrameSink,
    chunk: FrameRange,
    frames: Vec<Result<FrameRGBA, RenderError>>,
) -> Result<(), RenderError> {
    for (i, frame) in frames.into_iter().enumerate() {
        let frame = frame?;
        sink.push_frame(FrameIndex(chunk.start.0 + i as u64), &frame)?;
    }
    Ok(())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn normalized_chunk_size(chunk_size: usize) -> u64 {
    if chunk_size == 0 {
        1
    } else {
        chunk_size as u64
    }
}

fn build_thread_pool(threads: Option<usize>) -> FramecastResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(FramecastError::config(
            "executor.frame_threads must be >= 1 when set",
        ));
    }
    let mut builder =
        rayon::ThreadPoolBuilder::new().thread_name(|i| format!("framecast-frame-{i}"));
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| FramecastError::config(format!("failed to build rayon thread pool: {e}")))
}

struct TempFileGuard(Option<PathBuf>);

impl TempFileGuard {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/executor/render.rs"]
mod tests;
