use crate::cache::Artifact;
use crate::executor::CancelToken;
use crate::foundation::error::{FramecastError, FramecastResult, RenderError};
use crate::foundation::ids::{Fingerprint, JobId, RequesterId};
use crate::scene::{RenderParams, SceneDescription};
use std::collections::HashSet;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Lifecycle state of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Admitted, waiting for a worker slot.
    Queued,
    /// Holding a worker slot.
    Running,
    /// Artifact produced and cached.
    Succeeded,
    /// Render failed permanently (or after its retry).
    Failed,
    /// Every requester withdrew before an artifact was produced.
    Cancelled,
}

impl JobState {
    /// Whether the job can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// Progress notification delivered to [`crate::coordinator::JobCoordinator::subscribe`] receivers.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// Waiting for a worker slot.
    Queued,
    /// A render attempt started.
    Started {
        /// 1-based attempt number.
        attempt: u32,
    },
    /// Frames handed to the encoder so far.
    Progress {
        /// Frames done.
        frames_done: u64,
        /// Frames in the render.
        frames_total: u64,
    },
    /// A transient failure sent the job back to the queue.
    Retrying {
        /// Attempt that failed.
        attempt: u32,
        /// Failure description.
        reason: String,
    },
    /// Terminal: artifact available.
    Succeeded {
        /// Artifact fingerprint.
        fingerprint: Fingerprint,
    },
    /// Terminal: render failed.
    Failed {
        /// Machine-readable error kind.
        kind: String,
        /// Error description.
        message: String,
    },
    /// Terminal: cancelled.
    Cancelled,
}

impl JobEvent {
    /// Whether this is the last event a subscriber will receive.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded { .. } | Self::Failed { .. } | Self::Cancelled
        )
    }
}

/// Point-in-time view of a job.
#[derive(Debug, Clone)]
pub struct JobStatus {
    /// Job id.
    pub id: JobId,
    /// Render identity.
    pub fingerprint: Fingerprint,
    /// Lifecycle state.
    pub state: JobState,
    /// Dispatches so far (0 while first queued, 0 for cache hits).
    pub attempt: u32,
    /// Frames handed to the encoder in the current attempt.
    pub frames_done: u64,
    /// Frames in the render.
    pub frames_total: u64,
    /// Requesters still interested.
    pub waiters: usize,
    /// Whether the job was answered from the render cache.
    pub cache_hit: bool,
    /// Time since the job was created.
    pub age: Duration,
    /// Artifact, once succeeded.
    pub artifact: Option<Arc<Artifact>>,
    /// Failure, once failed.
    pub error: Option<RenderError>,
}

#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    Succeeded(Arc<Artifact>),
    Failed(RenderError),
    Cancelled,
}

impl Outcome {
    fn state(&self) -> JobState {
        match self {
            Self::Succeeded(_) => JobState::Succeeded,
            Self::Failed(_) => JobState::Failed,
            Self::Cancelled => JobState::Cancelled,
        }
    }

    fn event(&self) -> JobEvent {
        match self {
            Self::Succeeded(a) => JobEvent::Succeeded {
                fingerprint: a.fingerprint,
            },
            Self::Failed(e) => JobEvent::Failed {
                kind: e.kind().to_string(),
                message: e.to_string(),
            },
            Self::Cancelled => JobEvent::Cancelled,
        }
    }

    fn to_result(&self) -> FramecastResult<Arc<Artifact>> {
        match self {
            Self::Succeeded(a) => Ok(a.clone()),
            Self::Failed(e) => Err(FramecastError::RenderFailed(e.clone())),
            Self::Cancelled => Err(FramecastError::Cancelled),
        }
    }
}

/// One render of one fingerprint, shared by every requester interested in it.
pub(crate) struct RenderJob {
    pub(crate) id: JobId,
    pub(crate) fingerprint: Fingerprint,
    pub(crate) scene: SceneDescription,
    pub(crate) params: RenderParams,
    pub(crate) cancel: CancelToken,
    created_at: Instant,
    cache_hit: bool,
    state: Mutex<JobInner>,
    cond: Condvar,
}

pub(crate) struct JobInner {
    pub(crate) state: JobState,
    pub(crate) requesters: HashSet<RequesterId>,
    pub(crate) attempt: u32,
    pub(crate) retries_used: u32,
    frames_done: u64,
    frames_total: u64,
    outcome: Option<Outcome>,
    subscribers: Vec<mpsc::Sender<JobEvent>>,
}

impl RenderJob {
    pub(crate) fn queued(
        id: JobId,
        requester: RequesterId,
        scene: SceneDescription,
        params: RenderParams,
    ) -> Self {
        let fingerprint = scene.fingerprint(&params);
        let frames_total = scene.frame_count(&params);
        Self {
            id,
            fingerprint,
            scene,
            params,
            cancel: CancelToken::new(),
            created_at: Instant::now(),
            cache_hit: false,
            state: Mutex::new(JobInner {
                state: JobState::Queued,
                requesters: HashSet::from([requester]),
                attempt: 0,
                retries_used: 0,
                frames_done: 0,
                frames_total,
                outcome: None,
                subscribers: Vec::new(),
            }),
            cond: Condvar::new(),
        }
    }

    /// Already-succeeded job answering a cache hit.
    pub(crate) fn cached(
        id: JobId,
        requester: RequesterId,
        scene: SceneDescription,
        params: RenderParams,
        artifact: Arc<Artifact>,
    ) -> Self {
        let mut job = Self::queued(id, requester, scene, params);
        job.cache_hit = true;
        let inner = job.state.get_mut().unwrap_or_else(|p| p.into_inner());
        inner.state = JobState::Succeeded;
        inner.frames_done = artifact.frame_count;
        inner.frames_total = artifact.frame_count;
        inner.outcome = Some(Outcome::Succeeded(artifact));
        job
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, JobInner> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub(crate) fn status(&self) -> JobStatus {
        let g = self.lock();
        JobStatus {
            id: self.id,
            fingerprint: self.fingerprint,
            state: g.state,
            attempt: g.attempt,
            frames_done: g.frames_done,
            frames_total: g.frames_total,
            waiters: g.requesters.len(),
            cache_hit: self.cache_hit,
            age: self.created_at.elapsed(),
            artifact: match &g.outcome {
                Some(Outcome::Succeeded(a)) => Some(a.clone()),
                _ => None,
            },
            error: match &g.outcome {
                Some(Outcome::Failed(e)) => Some(e.clone()),
                _ => None,
            },
        }
    }

    /// Block until the job is terminal or `requester` has withdrawn, up to `timeout`.
    pub(crate) fn wait(
        &self,
        requester: RequesterId,
        timeout: Duration,
    ) -> FramecastResult<Arc<Artifact>> {
        let deadline = Instant::now() + timeout;
        let mut g = self.lock();
        loop {
            if !g.requesters.contains(&requester) {
                return Err(FramecastError::Cancelled);
            }
            if let Some(outcome) = &g.outcome {
                return outcome.to_result();
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(FramecastError::Timeout { waited: timeout });
            }
            g = self
                .cond
                .wait_timeout(g, deadline - now)
                .map(|(g, _)| g)
                .unwrap_or_else(|p| p.into_inner().0);
        }
    }

    pub(crate) fn subscribe(&self) -> mpsc::Receiver<JobEvent> {
        let (tx, rx) = mpsc::channel();
        let mut g = self.lock();
        if let Some(outcome) = &g.outcome {
            let _ = tx.send(outcome.event());
            return rx;
        }
        let current = match g.state {
            JobState::Running => JobEvent::Started { attempt: g.attempt },
            _ => JobEvent::Queued,
        };
        if tx.send(current).is_ok() {
            g.subscribers.push(tx);
        }
        rx
    }

    /// Wake everyone blocked in [`RenderJob::wait`]; used when a requester withdraws.
    pub(crate) fn notify(&self) {
        self.cond.notify_all();
    }

    pub(crate) fn set_progress(&self, done: u64, total: u64) {
        let mut g = self.lock();
        g.frames_done = done;
        g.frames_total = total;
        emit(
            &mut g,
            JobEvent::Progress {
                frames_done: done,
                frames_total: total,
            },
        );
    }

    /// Move to a terminal state and release every waiter and subscriber.
    pub(crate) fn finish(&self, g: &mut JobInner, outcome: Outcome) {
        if g.outcome.is_some() {
            return;
        }
        g.state = outcome.state();
        emit(g, outcome.event());
        g.subscribers.clear();
        g.outcome = Some(outcome);
        self.cond.notify_all();
    }
}

impl std::fmt::Debug for RenderJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderJob")
            .field("id", &self.id)
            .field("fingerprint", &self.fingerprint)
            .field("state", &self.lock().state)
            .finish()
    }
}

/// Send `ev` to every live subscriber, pruning those whose receiver is gone.
pub(crate) fn emit(g: &mut JobInner, ev: JobEvent) {
    g.subscribers.retain(|tx| tx.send(ev.clone()).is_ok());
}

/// One requester's interest in a render job.
///
/// Obtained from [`crate::coordinator::JobCoordinator::submit`]; pass it back to await, poll,
/// subscribe, or cancel.
#[derive(Clone)]
pub struct JobHandle {
    pub(crate) requester: RequesterId,
    pub(crate) job: Arc<RenderJob>,
}

impl JobHandle {
    /// Job id.
    pub fn id(&self) -> JobId {
        self.job.id
    }

    /// Render identity.
    pub fn fingerprint(&self) -> Fingerprint {
        self.job.fingerprint
    }

    /// This requester's id.
    pub fn requester(&self) -> RequesterId {
        self.requester
    }

    /// Whether the request was answered from the render cache.
    pub fn is_cache_hit(&self) -> bool {
        self.job.cache_hit
    }
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("job", &self.job.id)
            .field("requester", &self.requester)
            .field("fingerprint", &self.job.fingerprint)
            .finish()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/coordinator/job.rs"]
mod tests;
