use crate::cache::{Artifact, CacheStats, RenderCache};
use crate::coordinator::job::{JobEvent, JobHandle, JobState, JobStatus, Outcome, RenderJob, emit};
use crate::encode::SinkFactory;
use crate::executor::{RenderControl, RenderExecutor, WorkerSlot, WorkerSlots};
use crate::foundation::config::ServiceConfig;
use crate::foundation::error::{FramecastError, FramecastResult, RenderError};
use crate::foundation::ids::{Fingerprint, JobId, RequesterId};
use crate::render::backend::SceneEngine;
use crate::scene::{RenderParams, SceneDescription, SceneValidator};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

/// Point-in-time load of a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CoordinatorStats {
    /// Jobs in the in-flight table (queued or running).
    pub in_flight: usize,
    /// Jobs holding a worker slot.
    pub running: usize,
    /// Jobs waiting for a slot, retries included.
    pub queued: usize,
    /// Worker slots not currently held.
    pub free_slots: usize,
    /// Configured worker slots.
    pub total_slots: usize,
    /// Render cache occupancy.
    pub cache: CacheStats,
}

/// Accepts render requests, deduplicates them by fingerprint, and schedules them onto a
/// bounded number of worker slots.
///
/// Cheap to clone; clones share the same table, cache, and executor.
///
/// Locking: the job table is held only for short bookkeeping. A job's own lock may be taken
/// while holding the table, never the other way around.
#[derive(Clone)]
pub struct JobCoordinator {
    inner: Arc<CoordInner>,
}

struct CoordInner {
    validator: SceneValidator,
    cache: RenderCache,
    executor: RenderExecutor,
    slots: WorkerSlots,
    queue_depth: usize,
    transient_retries: u32,
    retained_jobs: usize,
    next_job: AtomicU64,
    next_requester: AtomicU64,
    table: Mutex<Table>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Default)]
struct Table {
    in_flight: HashMap<Fingerprint, Arc<RenderJob>>,
    by_id: HashMap<JobId, Arc<RenderJob>>,
    queue: VecDeque<Arc<RenderJob>>,
    // Re-dispatches; served before `queue` and not counted against the queue depth.
    retry_queue: VecDeque<Arc<RenderJob>>,
    retired: VecDeque<JobId>,
    shutting_down: bool,
}

impl std::fmt::Debug for JobCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobCoordinator")
            .field("executor", &self.inner.executor)
            .field("slots", &self.inner.slots.capacity())
            .field("queue_depth", &self.inner.queue_depth)
            .field("cache_dir", &self.inner.cache.dir())
            .finish()
    }
}

impl JobCoordinator {
    /// Open the render cache named by `cfg` and build a coordinator over it.
    pub fn new(
        cfg: &ServiceConfig,
        engine: Arc<dyn SceneEngine>,
        sinks: Arc<dyn SinkFactory>,
    ) -> FramecastResult<Self> {
        cfg.validate()?;
        let cache = RenderCache::open(cfg.cache.clone())?;
        Self::with_cache(cfg, cache, engine, sinks)
    }

    /// Build a coordinator over an already opened cache.
    pub fn with_cache(
        cfg: &ServiceConfig,
        cache: RenderCache,
        engine: Arc<dyn SceneEngine>,
        sinks: Arc<dyn SinkFactory>,
    ) -> FramecastResult<Self> {
        let executor = RenderExecutor::new(engine, sinks, cache.staging_dir(), &cfg.executor)?;
        let slots = WorkerSlots::new(cfg.executor.effective_worker_slots());
        tracing::info!(
            worker_slots = slots.capacity(),
            queue_depth = cfg.queue_depth,
            cache_dir = %cache.dir().display(),
            "coordinator ready"
        );
        Ok(Self {
            inner: Arc::new(CoordInner {
                validator: SceneValidator::new(cfg.limits.clone()),
                cache,
                executor,
                slots,
                queue_depth: cfg.queue_depth,
                transient_retries: cfg.executor.transient_retries,
                retained_jobs: cfg.retained_jobs,
                next_job: AtomicU64::new(1),
                next_requester: AtomicU64::new(1),
                table: Mutex::new(Table::default()),
                workers: Mutex::new(Vec::new()),
            }),
        })
    }

    /// The render cache backing this coordinator.
    pub fn cache(&self) -> &RenderCache {
        &self.inner.cache
    }

    /// The validator applied by [`JobCoordinator::submit_raw`] and to render parameters.
    pub fn validator(&self) -> &SceneValidator {
        &self.inner.validator
    }

    /// Validate a raw JSON scene, then [`JobCoordinator::submit`] it.
    pub fn submit_raw(&self, raw: &[u8], params: RenderParams) -> FramecastResult<JobHandle> {
        let desc = self.inner.validator.validate(raw)?;
        self.submit(desc, params)
    }

    /// Request a render. Returns immediately.
    ///
    /// A cached artifact yields an already-succeeded handle. A render already in flight for
    /// the same fingerprint gains another requester. Otherwise a new job is dispatched or
    /// queued, or refused with [`FramecastError::AdmissionRejected`] when the queue is full.
    #[tracing::instrument(skip_all, fields(fingerprint = tracing::field::Empty))]
    pub fn submit(
        &self,
        desc: SceneDescription,
        params: RenderParams,
    ) -> FramecastResult<JobHandle> {
        let inner = &self.inner;
        inner.validator.validate_params(&desc, &params)?;
        let fingerprint = desc.fingerprint(&params);
        tracing::Span::current().record("fingerprint", tracing::field::display(fingerprint));
        let requester = RequesterId(inner.next_requester.fetch_add(1, Ordering::Relaxed));

        let mut table = inner.lock_table();
        if table.shutting_down {
            return Err(FramecastError::ShuttingDown);
        }

        if let Some(job) = table.in_flight.get(&fingerprint).cloned() {
            let mut g = job.lock();
            if !g.state.is_terminal() {
                g.requesters.insert(requester);
                if job.cancel.is_cancelled() {
                    job.cancel.reset();
                    tracing::debug!(job = %job.id, "pending cancellation withdrawn");
                }
                tracing::debug!(job = %job.id, waiters = g.requesters.len(), "attached to in-flight job");
                drop(g);
                return Ok(JobHandle { requester, job });
            }
        }

        let id = inner.new_job_id();
        if let Some(artifact) = inner.cache.lookup(&fingerprint) {
            let job = Arc::new(RenderJob::cached(id, requester, desc, params, artifact));
            table.by_id.insert(id, Arc::clone(&job));
            inner.retire(&mut table, id);
            tracing::debug!(job = %id, "cache hit");
            return Ok(JobHandle { requester, job });
        }

        let job = Arc::new(RenderJob::queued(id, requester, desc, params));
        if table.queue.is_empty()
            && table.retry_queue.is_empty()
            && let Some(slot) = inner.slots.try_acquire()
        {
            table.in_flight.insert(fingerprint, Arc::clone(&job));
            table.by_id.insert(id, Arc::clone(&job));
            inner.dispatch(&mut table, Arc::clone(&job), slot);
            return Ok(JobHandle { requester, job });
        }

        if table.queue.len() >= inner.queue_depth {
            tracing::warn!(queue_depth = inner.queue_depth, "admission rejected");
            return Err(FramecastError::AdmissionRejected {
                queue_depth: inner.queue_depth,
            });
        }
        table.in_flight.insert(fingerprint, Arc::clone(&job));
        table.by_id.insert(id, Arc::clone(&job));
        table.queue.push_back(Arc::clone(&job));
        tracing::debug!(job = %id, position = table.queue.len(), "queued");
        Ok(JobHandle { requester, job })
    }

    /// Block until the job is terminal, up to `timeout`.
    ///
    /// On timeout the caller gets [`FramecastError::Timeout`]; the job and the caller's
    /// interest in it are unaffected. A timeout only stops this wait: the requester stays
    /// attached, so callers abandoning the job must call [`JobCoordinator::cancel`]. A caller
    /// that already cancelled gets [`FramecastError::Cancelled`].
    pub fn await_result(
        &self,
        handle: &JobHandle,
        timeout: Duration,
    ) -> FramecastResult<Arc<Artifact>> {
        let res = handle.job.wait(handle.requester, timeout);
        if let Err(FramecastError::Timeout { .. }) = &res {
            tracing::debug!(job = %handle.job.id, ?timeout, "await timed out");
        }
        res
    }

    /// Current status of the handle's job.
    pub fn status(&self, handle: &JobHandle) -> JobStatus {
        handle.job.status()
    }

    /// Status of a live or recently retired job.
    pub fn status_by_id(&self, id: JobId) -> Option<JobStatus> {
        let job = self.inner.lock_table().by_id.get(&id).cloned()?;
        Some(job.status())
    }

    /// Receive [`JobEvent`]s for the handle's job, starting with its current state.
    ///
    /// A terminal job yields its terminal event and then disconnects.
    pub fn subscribe(&self, handle: &JobHandle) -> mpsc::Receiver<JobEvent> {
        handle.job.subscribe()
    }

    /// Withdraw this handle's interest in its job. Idempotent.
    ///
    /// When the last requester withdraws, a queued job is cancelled on the spot and a running
    /// job is asked to stop at its next frame boundary. Terminal jobs are left alone.
    #[tracing::instrument(skip_all, fields(job = %handle.job.id, requester = handle.requester.0))]
    pub fn cancel(&self, handle: &JobHandle) -> FramecastResult<()> {
        let inner = &self.inner;
        let job = &handle.job;
        let mut table = inner.lock_table();
        let mut g = job.lock();
        if g.state.is_terminal() || !g.requesters.remove(&handle.requester) {
            return Ok(());
        }
        job.notify();
        if !g.requesters.is_empty() {
            tracing::debug!(waiters = g.requesters.len(), "requester detached");
            return Ok(());
        }

        match g.state {
            JobState::Queued => {
                table.queue.retain(|j| !Arc::ptr_eq(j, job));
                table.retry_queue.retain(|j| !Arc::ptr_eq(j, job));
                job.cancel.cancel();
                job.finish(&mut g, Outcome::Cancelled);
                drop(g);
                inner.remove_in_flight(&mut table, job);
                tracing::info!("queued job cancelled");
            }
            JobState::Running => {
                job.cancel.cancel();
                tracing::info!("cancellation requested");
            }
            _ => {}
        }
        Ok(())
    }

    /// Current load and cache occupancy.
    pub fn stats(&self) -> CoordinatorStats {
        let inner = &self.inner;
        let (in_flight, queued, jobs) = {
            let table = inner.lock_table();
            (
                table.in_flight.len(),
                table.queue.len() + table.retry_queue.len(),
                table.in_flight.values().cloned().collect::<Vec<_>>(),
            )
        };
        let running = jobs
            .iter()
            .filter(|j| j.lock().state == JobState::Running)
            .count();
        CoordinatorStats {
            in_flight,
            running,
            queued,
            free_slots: inner.slots.available(),
            total_slots: inner.slots.capacity(),
            cache: inner.cache.stats(),
        }
    }

    /// Stop accepting work, cancel everything pending, and wait for running renders to stop.
    #[tracing::instrument(skip_all)]
    pub fn shutdown(&self) {
        let inner = &self.inner;
        let workers = {
            let mut table = inner.lock_table();
            if table.shutting_down {
                Vec::new()
            } else {
                table.shutting_down = true;
                let mut pending: Vec<_> = table.retry_queue.drain(..).collect();
                pending.extend(table.queue.drain(..));
                for job in &pending {
                    job.cancel.cancel();
                    job.finish(&mut job.lock(), Outcome::Cancelled);
                    inner.remove_in_flight(&mut table, job);
                }
                for job in table.in_flight.values() {
                    job.cancel.cancel();
                }
                tracing::info!(
                    cancelled = pending.len(),
                    running = table.in_flight.len(),
                    "shutting down"
                );
                std::mem::take(&mut *inner.lock_workers())
            }
        };
        for w in workers {
            let _ = w.join();
        }
    }
}

impl CoordInner {
    fn lock_table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn new_job_id(&self) -> JobId {
        JobId(self.next_job.fetch_add(1, Ordering::Relaxed))
    }

    /// Mark `job` running and start its render thread. Caller holds the table.
    fn dispatch(self: &Arc<Self>, table: &mut Table, job: Arc<RenderJob>, slot: WorkerSlot) {
        let attempt = {
            let mut g = job.lock();
            g.state = JobState::Running;
            g.attempt += 1;
            let attempt = g.attempt;
            emit(&mut g, JobEvent::Started { attempt });
            attempt
        };
        tracing::debug!(job = %job.id, attempt, "dispatched");

        let this = Arc::clone(self);
        let worker_job = Arc::clone(&job);
        let spawned = std::thread::Builder::new()
            .name(format!("framecast-render-{}", job.id.0))
            .spawn(move || this.run_job(worker_job, slot, attempt));
        match spawned {
            Ok(handle) => {
                let mut workers = self.lock_workers();
                workers.retain(|w| !w.is_finished());
                workers.push(handle);
            }
            Err(e) => {
                tracing::error!(job = %job.id, error = %e, "failed to spawn render thread");
                let err = RenderError::engine(format!("spawn render thread: {e}"));
                job.finish(&mut job.lock(), Outcome::Failed(err));
                self.remove_in_flight(table, &job);
            }
        }
    }

    #[tracing::instrument(skip_all, fields(job = %job.id, fingerprint = %job.fingerprint, attempt = attempt))]
    fn run_job(self: Arc<Self>, job: Arc<RenderJob>, slot: WorkerSlot, attempt: u32) {
        let progress_job = Arc::clone(&job);
        let ctl = RenderControl {
            fingerprint: job.fingerprint,
            attempt,
            cancel: job.cancel.clone(),
            progress: None,
        }
        .with_progress(move |done, total| progress_job.set_progress(done, total));

        let result = self.executor.render(&job.scene, &job.params, slot, &ctl);
        self.complete(&job, result);
    }

    fn complete(self: &Arc<Self>, job: &Arc<RenderJob>, result: Result<Artifact, RenderError>) {
        // Stored before the job leaves the in-flight table so a concurrent submit always
        // finds either the running job or the cached artifact.
        // Cancellation is set under the job lock, so holding it across the store means a
        // cancel lands either before the artifact is cached or after it.
        let result = result.and_then(|artifact| {
            let staged = artifact.location.clone();
            let _g = job.lock();
            if job.cancel.is_cancelled() {
                let _ = std::fs::remove_file(&staged);
                tracing::debug!("cancelled during finalization, discarding artifact");
                return Err(RenderError::Cancelled);
            }
            self.cache.store(artifact).map_err(|e| {
                let _ = std::fs::remove_file(&staged);
                RenderError::storage(e.to_string())
            })
        });

        let mut table = self.lock_table();
        let mut g = job.lock();
        let live = !g.requesters.is_empty() && !table.shutting_down;
        match result {
            Ok(artifact) => {
                tracing::info!(size_bytes = artifact.size_bytes, "job succeeded");
                job.finish(&mut g, Outcome::Succeeded(artifact));
            }
            Err(RenderError::Cancelled) if live => {
                // A requester reattached after the cancellation was observed.
                job.cancel.reset();
                g.state = JobState::Queued;
                emit(&mut g, JobEvent::Queued);
                table.retry_queue.push_front(Arc::clone(job));
                tracing::debug!("cancelled render requeued for new requester");
            }
            Err(RenderError::Cancelled) => {
                tracing::info!("job cancelled");
                job.finish(&mut g, Outcome::Cancelled);
            }
            Err(e) if e.is_transient() && live && g.retries_used < self.transient_retries => {
                g.retries_used += 1;
                tracing::warn!(error = %e, attempt = g.attempt, "transient failure, retrying");
                let attempt = g.attempt;
                emit(
                    &mut g,
                    JobEvent::Retrying {
                        attempt,
                        reason: e.to_string(),
                    },
                );
                g.state = JobState::Queued;
                table.retry_queue.push_back(Arc::clone(job));
            }
            Err(e) => {
                tracing::error!(error = %e, kind = e.kind(), "job failed");
                job.finish(&mut g, Outcome::Failed(e));
            }
        }
        let terminal = g.state.is_terminal();
        drop(g);
        if terminal {
            self.remove_in_flight(&mut table, job);
        }
        self.pump(&mut table);
    }

    /// Start queued jobs, oldest first, while slots are free. Caller holds the table.
    fn pump(self: &Arc<Self>, table: &mut Table) {
        while !table.shutting_down {
            let from_retry = !table.retry_queue.is_empty();
            if !from_retry && table.queue.is_empty() {
                break;
            }
            let Some(slot) = self.slots.try_acquire() else {
                break;
            };
            let next = if from_retry {
                table.retry_queue.pop_front()
            } else {
                table.queue.pop_front()
            };
            if let Some(job) = next {
                self.dispatch(table, job, slot);
            }
        }
    }

    fn remove_in_flight(&self, table: &mut Table, job: &Arc<RenderJob>) {
        if table
            .in_flight
            .get(&job.fingerprint)
            .is_some_and(|j| Arc::ptr_eq(j, job))
        {
            table.in_flight.remove(&job.fingerprint);
        }
        self.retire(table, job.id);
    }

    fn retire(&self, table: &mut Table, id: JobId) {
        table.retired.push_back(id);
        while table.retired.len() > self.retained_jobs {
            if let Some(old) = table.retired.pop_front() {
                table.by_id.remove(&old);
            }
        }
    }
}
