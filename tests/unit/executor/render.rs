use super::*;
use crate::encode::{ContainerKind, RawHeader, RawRgbaSinkFactory};
use crate::executor::control::CancelToken;
use crate::executor::slots::WorkerSlots;
use crate::foundation::config::SceneLimits;
use crate::foundation::core::Fps;
use crate::foundation::ids::Fingerprint;
use crate::scene::{Scene, SceneValidator};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

static NEXT_DIR: AtomicU64 = AtomicU64::new(0);

fn staging() -> PathBuf {
    let n = NEXT_DIR.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("framecast-exec-{}-{n}", std::process::id()))
}

fn desc(duration: f64) -> SceneDescription {
    let raw = format!(
        r#"{{"version":"1","viewport":{{"width":4,"height":4}},"duration_secs":{duration}}}"#
    );
    SceneValidator::new(SceneLimits::default())
        .validate(raw.as_bytes())
        .unwrap()
}

fn params() -> RenderParams {
    RenderParams::new(2, 2, Fps::new(10, 1).unwrap())
}

#[derive(Default)]
struct FlatEngine {
    calls: AtomicUsize,
    panic_on: Option<u64>,
    cancel_after: Option<(u64, CancelToken)>,
}

impl SceneEngine for FlatEngine {
    fn render_frame(
        &self,
        _scene: &Scene,
        params: &RenderParams,
        frame: FrameIndex,
    ) -> Result<FrameRGBA, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on == Some(frame.0) {
            panic!("boom at {}", frame.0);
        }
        if let Some((n, token)) = &self.cancel_after
            && frame.0 >= *n
        {
            token.cancel();
        }
        Ok(FrameRGBA {
            width: params.resolution.width,
            height: params.resolution.height,
            data: vec![frame.0 as u8; params.resolution.rgba8_len()],
            premultiplied: true,
        })
    }
}

fn executor(engine: Arc<dyn SceneEngine>, dir: &PathBuf, cfg: ExecutorConfig) -> RenderExecutor {
    RenderExecutor::new(engine, Arc::new(RawRgbaSinkFactory), dir.clone(), &cfg).unwrap()
}

fn cfg(chunk_size: usize) -> ExecutorConfig {
    ExecutorConfig {
        chunk_size,
        frame_threads: Some(2),
        ..ExecutorConfig::default()
    }
}

fn staged_files(dir: &PathBuf) -> usize {
    std::fs::read_dir(dir).map(|r| r.count()).unwrap_or(0)
}

#[test]
fn renders_all_frames_in_order_and_hashes_output() {
    let dir = staging();
    let engine = Arc::new(FlatEngine::default());
    let exec = executor(engine.clone(), &dir, cfg(3));
    let slots = WorkerSlots::new(1);
    let progress = Arc::new(Mutex::new(Vec::new()));
    let seen = progress.clone();
    let ctl = RenderControl::new(Fingerprint::from_u128(9))
        .with_progress(move |done, total| seen.lock().unwrap().push((done, total)));

    let artifact = exec
        .render(&desc(1.0), &params(), slots.try_acquire().unwrap(), &ctl)
        .unwrap();
    assert_eq!(slots.in_use(), 0);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 10);
    assert_eq!(artifact.frame_count, 10);
    assert_eq!(artifact.duration_secs, 1.0);
    assert_eq!(artifact.container, ContainerKind::RawRgba);
    assert_eq!(artifact.content_hash.len(), 64);

    let bytes = std::fs::read(&artifact.location).unwrap();
    assert_eq!(artifact.size_bytes, bytes.len() as u64);
    let mut r = bytes.as_slice();
    let header = RawHeader::read_from(&mut r).unwrap();
    let frames: Vec<u8> = r.chunks(header.frame_len() as usize).map(|f| f[0]).collect();
    assert_eq!(frames, (0..10).collect::<Vec<u8>>());

    assert_eq!(
        *progress.lock().unwrap(),
        vec![(3, 10), (6, 10), (9, 10), (10, 10)]
    );
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn engine_panic_is_a_permanent_fault_and_cleans_staging() {
    let dir = staging();
    let engine = Arc::new(FlatEngine {
        panic_on: Some(4),
        ..FlatEngine::default()
    });
    let exec = executor(engine, &dir, cfg(4));
    let slots = WorkerSlots::new(1);
    let err = exec
        .render(
            &desc(1.0),
            &params(),
            slots.try_acquire().unwrap(),
            &RenderControl::new(Fingerprint::from_u128(1)),
        )
        .unwrap_err();
    assert!(matches!(err, RenderError::Engine { transient: false, .. }));
    assert!(err.to_string().contains("boom at 4"));
    assert_eq!(staged_files(&dir), 0);
    assert_eq!(slots.in_use(), 0);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn cancellation_is_observed_at_frame_boundaries() {
    let dir = staging();
    let ctl = RenderControl::new(Fingerprint::from_u128(2));
    let engine = Arc::new(FlatEngine {
        cancel_after: Some((2, ctl.cancel.clone())),
        ..FlatEngine::default()
    });
    let exec = executor(engine.clone(), &dir, cfg(2));
    let slots = WorkerSlots::new(1);
    let err = exec
        .render(&desc(3.0), &params(), slots.try_acquire().unwrap(), &ctl)
        .unwrap_err();
    assert_eq!(err, RenderError::Cancelled);
    assert!(engine.calls.load(Ordering::SeqCst) < 30);
    assert_eq!(staged_files(&dir), 0);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn deadline_exceeded_is_timed_out() {
    let dir = staging();
    let exec = executor(
        Arc::new(FlatEngine::default()),
        &dir,
        ExecutorConfig {
            render_timeout_secs: 0,
            ..cfg(2)
        },
    );
    let slots = WorkerSlots::new(1);
    let err = exec
        .render(
            &desc(1.0),
            &params(),
            slots.try_acquire().unwrap(),
            &RenderControl::new(Fingerprint::from_u128(3)),
        )
        .unwrap_err();
    assert!(matches!(err, RenderError::TimedOut { .. }));
    assert!(!err.is_transient());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn zero_frame_threads_rejected() {
    let dir = staging();
    let res = RenderExecutor::new(
        Arc::new(FlatEngine::default()),
        Arc::new(RawRgbaSinkFactory),
        dir,
        &ExecutorConfig {
            frame_threads: Some(0),
            ..ExecutorConfig::default()
        },
    );
    assert!(res.is_err());
}
