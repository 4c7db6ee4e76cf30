//! Service configuration.
//!
//! Every section has a `Default`, so a config file only needs the keys it overrides.
//! `FRAMECAST_*` environment variables are applied on top of the file.

use crate::foundation::error::{FramecastError, FramecastResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for a coordinator instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Input policy enforced by the scene validator.
    pub limits: SceneLimits,
    /// Render executor sizing and failure policy.
    pub executor: ExecutorConfig,
    /// Maximum number of jobs waiting for a worker slot.
    pub queue_depth: usize,
    /// Number of retired jobs kept around for `status_by_id`.
    pub retained_jobs: usize,
    /// Render cache location and bounds.
    pub cache: CacheConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Bounds on scene payloads and render parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneLimits {
    /// Payloads larger than this are rejected before parsing.
    pub max_payload_bytes: usize,
    /// Maximum output width in pixels.
    pub max_width: u32,
    /// Maximum output height in pixels.
    pub max_height: u32,
    /// Maximum frames per second.
    pub max_fps: f64,
    /// Maximum scene duration in seconds.
    pub max_duration_secs: f64,
    /// Maximum total frames per render.
    pub max_frames: u64,
    /// Maximum number of elements, counted recursively through groups.
    pub max_elements: usize,
}

/// Render executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Simultaneous renders. `None` uses available CPU parallelism.
    pub worker_slots: Option<usize>,
    /// Threads in the shared frame-rendering pool. `None` uses rayon defaults.
    pub frame_threads: Option<usize>,
    /// Frames rendered in parallel before being pushed to the encoder.
    pub chunk_size: usize,
    /// Per-job wall-clock limit.
    pub render_timeout_secs: u64,
    /// Automatic re-dispatches after a transient failure.
    pub transient_retries: u32,
}

/// Render cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding artifact files and their metadata sidecars.
    pub dir: PathBuf,
    /// Total artifact bytes before eviction kicks in.
    pub max_bytes: u64,
    /// Total artifact count before eviction kicks in.
    pub max_entries: usize,
    /// Eviction trims down to this fraction of the limits.
    pub evict_to_fraction: f64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "framecast=debug,warn").
    pub level: String,
    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            limits: SceneLimits::default(),
            executor: ExecutorConfig::default(),
            queue_depth: 32,
            retained_jobs: 256,
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SceneLimits {
    fn default() -> Self {
        Self {
            max_payload_bytes: 1024 * 1024,
            max_width: 3840,
            max_height: 2160,
            max_fps: 120.0,
            max_duration_secs: 600.0,
            max_frames: 36_000,
            max_elements: 10_000,
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_slots: None,
            frame_threads: None,
            chunk_size: 32,
            render_timeout_secs: 900,
            transient_retries: 1,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir().join("framecast").join("cache"),
            max_bytes: 8 * 1024 * 1024 * 1024,
            max_entries: 4096,
            evict_to_fraction: 0.9,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl ExecutorConfig {
    /// Effective worker slot count.
    pub fn effective_worker_slots(&self) -> usize {
        self.worker_slots.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Per-job wall-clock limit as a `Duration`.
    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }
}

impl ServiceConfig {
    /// Load a JSON config file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> FramecastResult<Self> {
        use anyhow::Context as _;

        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        let mut cfg: Self = serde_json::from_str(&content).map_err(|e| {
            FramecastError::config(format!("parse config '{}': {e}", path.display()))
        })?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> FramecastResult<Self> {
        let mut cfg = Self::default();
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `FRAMECAST_*` environment overrides.
    pub fn apply_env(&mut self) -> FramecastResult<()> {
        self.apply_vars(|k| std::env::var(k).ok())
    }

    pub(crate) fn apply_vars(
        &mut self,
        get: impl Fn(&str) -> Option<String>,
    ) -> FramecastResult<()> {
        fn parse<T: std::str::FromStr>(key: &str, v: &str) -> FramecastResult<T> {
            v.trim()
                .parse()
                .map_err(|_| FramecastError::config(format!("{key}: cannot parse \"{v}\"")))
        }

        if let Some(v) = get("FRAMECAST_CACHE_DIR") {
            self.cache.dir = PathBuf::from(v);
        }
        if let Some(v) = get("FRAMECAST_CACHE_MAX_BYTES") {
            self.cache.max_bytes = parse("FRAMECAST_CACHE_MAX_BYTES", &v)?;
        }
        if let Some(v) = get("FRAMECAST_WORKER_SLOTS") {
            self.executor.worker_slots = Some(parse("FRAMECAST_WORKER_SLOTS", &v)?);
        }
        if let Some(v) = get("FRAMECAST_QUEUE_DEPTH") {
            self.queue_depth = parse("FRAMECAST_QUEUE_DEPTH", &v)?;
        }
        if let Some(v) = get("FRAMECAST_RENDER_TIMEOUT_SECS") {
            self.executor.render_timeout_secs = parse("FRAMECAST_RENDER_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("FRAMECAST_LOG") {
            self.logging.level = v;
        }
        Ok(())
    }

    /// Reject values that would make the service unusable.
    pub fn validate(&self) -> FramecastResult<()> {
        if self.executor.effective_worker_slots() == 0 {
            return Err(FramecastError::config("executor.worker_slots must be >= 1"));
        }
        if self.executor.frame_threads == Some(0) {
            return Err(FramecastError::config(
                "executor.frame_threads must be >= 1 when set",
            ));
        }
        if self.executor.render_timeout_secs == 0 {
            return Err(FramecastError::config(
                "executor.render_timeout_secs must be > 0",
            ));
        }
        if !(self.cache.evict_to_fraction > 0.0 && self.cache.evict_to_fraction <= 1.0) {
            return Err(FramecastError::config(
                "cache.evict_to_fraction must be in (0, 1]",
            ));
        }
        if self.cache.max_entries == 0 {
            return Err(FramecastError::config("cache.max_entries must be >= 1"));
        }
        if !self.limits.max_fps.is_finite() || self.limits.max_fps <= 0.0 {
            return Err(FramecastError::config("limits.max_fps must be finite and > 0"));
        }
        if !self.limits.max_duration_secs.is_finite() || self.limits.max_duration_secs <= 0.0 {
            return Err(FramecastError::config(
                "limits.max_duration_secs must be finite and > 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/config.rs"]
mod tests;
