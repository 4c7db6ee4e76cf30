use crate::foundation::ids::Fingerprint;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation flag shared between a job and its render.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Withdraw a pending cancellation request.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Progress callback: `(frames_done, frames_total)`.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Per-attempt inputs to [`crate::executor::RenderExecutor::render`] besides the scene itself.
#[derive(Clone)]
pub struct RenderControl {
    /// Identity of the render, used for staging file names and logs.
    pub fingerprint: Fingerprint,
    /// 1-based dispatch count for this job.
    pub attempt: u32,
    /// Checked at every frame boundary.
    pub cancel: CancelToken,
    /// Called after every chunk is handed to the encoder.
    pub progress: Option<ProgressFn>,
}

impl RenderControl {
    /// Control with a fresh cancel token and no progress reporting.
    pub fn new(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint,
            attempt: 1,
            cancel: CancelToken::new(),
            progress: None,
        }
    }

    /// Attach a progress callback.
    pub fn with_progress(mut self, f: impl Fn(u64, u64) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(f));
        self
    }

    pub(crate) fn report(&self, done: u64, total: u64) {
        if let Some(f) = &self.progress {
            f(done, total);
        }
    }
}

impl std::fmt::Debug for RenderControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderControl")
            .field("fingerprint", &self.fingerprint)
            .field("attempt", &self.attempt)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
