#![allow(dead_code)]

use framecast::{
    FrameIndex, FrameRGBA, JobCoordinator, RawRgbaSinkFactory, RenderError, RenderParams,
    SceneEngine, ServiceConfig,
};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(20);

static NEXT_DIR: AtomicU64 = AtomicU64::new(0);

pub fn temp_dir(tag: &str) -> PathBuf {
    let n = NEXT_DIR.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("framecast-it-{tag}-{}-{n}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

/// A scene whose fingerprint is distinguished by `duration_secs`.
pub fn scene(duration_secs: f64) -> Vec<u8> {
    format!(
        r##"{{
  "version": "1",
  "viewport": {{ "width": 8, "height": 8 }},
  "duration_secs": {duration_secs},
  "background": "#102030",
  "elements": [
    {{ "type": "rect", "x": 1, "y": 1, "width": 4, "height": 4, "fill": "#ff0000",
       "animations": [ {{ "property": "translate_x", "from": 0, "to": 2, "start_sec": 0, "end_sec": {duration_secs} }} ] }}
  ]
}}"##
    )
    .into_bytes()
}

pub fn params() -> RenderParams {
    RenderParams::new(4, 4, framecast::Fps::new(4, 1).unwrap())
}

pub fn config(tag: &str, slots: usize, queue_depth: usize) -> ServiceConfig {
    let mut cfg = ServiceConfig::default();
    cfg.executor.worker_slots = Some(slots);
    cfg.executor.frame_threads = Some(2);
    cfg.executor.chunk_size = 2;
    cfg.queue_depth = queue_depth;
    cfg.cache.dir = temp_dir(tag);
    cfg
}

pub fn coordinator(cfg: &ServiceConfig, engine: Arc<GatedEngine>) -> JobCoordinator {
    JobCoordinator::new(cfg, engine, Arc::new(RawRgbaSinkFactory)).unwrap()
}

/// Flat-color engine whose frames block until the gate opens, with scripted failures.
pub struct GatedEngine {
    open: Mutex<bool>,
    cv: Condvar,
    /// Calls for frame 0, i.e. render attempts that reached the engine.
    pub starts: AtomicUsize,
    /// Every `render_frame` call.
    pub frames: AtomicUsize,
    failures: Mutex<VecDeque<RenderError>>,
}

impl GatedEngine {
    pub fn open() -> Arc<Self> {
        Arc::new(Self::with_gate(true))
    }

    pub fn closed() -> Arc<Self> {
        Arc::new(Self::with_gate(false))
    }

    fn with_gate(open: bool) -> Self {
        Self {
            open: Mutex::new(open),
            cv: Condvar::new(),
            starts: AtomicUsize::new(0),
            frames: AtomicUsize::new(0),
            failures: Mutex::new(VecDeque::new()),
        }
    }

    /// Fail the next attempts (at frame 0) with these errors, in order.
    pub fn fail_with(&self, errs: impl IntoIterator<Item = RenderError>) {
        self.failures.lock().unwrap().extend(errs);
    }

    pub fn release(&self) {
        *self.open.lock().unwrap() = true;
        self.cv.notify_all();
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    fn wait_open(&self) {
        let deadline = Instant::now() + WAIT;
        let mut open = self.open.lock().unwrap();
        while !*open && Instant::now() < deadline {
            open = self
                .cv
                .wait_timeout(open, Duration::from_millis(50))
                .unwrap()
                .0;
        }
    }
}

impl SceneEngine for GatedEngine {
    fn render_frame(
        &self,
        _scene: &framecast::scene::Scene,
        params: &RenderParams,
        frame: FrameIndex,
    ) -> Result<FrameRGBA, RenderError> {
        self.frames.fetch_add(1, Ordering::SeqCst);
        if frame.0 == 0 {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.wait_open();
            if let Some(err) = self.failures.lock().unwrap().pop_front() {
                return Err(err);
            }
        } else {
            self.wait_open();
        }
        Ok(FrameRGBA {
            width: params.resolution.width,
            height: params.resolution.height,
            data: vec![(frame.0 as u8).wrapping_mul(40); params.resolution.rgba8_len()],
            premultiplied: true,
        })
    }

    fn name(&self) -> &'static str {
        "gated"
    }
}

/// Poll `f` until it holds or the shared deadline passes.
pub fn eventually(mut f: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if f() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}
