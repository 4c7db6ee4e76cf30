//! Framecast is the core of an animation render service.
//!
//! Requests flow through a fixed pipeline:
//!
//! - A [`SceneValidator`] turns a JSON payload into a [`SceneDescription`] with a stable
//!   [`Fingerprint`]
//! - The [`JobCoordinator`] deduplicates requests by fingerprint and admits them onto a bounded
//!   number of worker slots
//! - The [`RenderExecutor`] drives a [`SceneEngine`] and a [`FrameSink`] to produce an
//!   [`Artifact`]
//! - The [`RenderCache`] keeps finished artifacts and [`Delivery`] streams them back out
#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Artifact metadata and the fingerprint-keyed render cache.
pub mod cache;
/// Request deduplication, admission, and job lifecycle.
pub mod coordinator;
/// Whole and ranged artifact streaming.
pub mod delivery;
/// Frame sinks: ffmpeg MP4 and raw RGBA containers.
pub mod encode;
/// Turns one scene into one artifact file.
pub mod executor;
/// Shared primitives: geometry, ids, errors, configuration, logging.
pub mod foundation;
/// Scene engines.
pub mod render;
/// Scene payloads and their canonical identity.
pub mod scene;

pub use crate::cache::{Artifact, ArtifactPin, CacheStats, EvictionPolicy, RenderCache};
pub use crate::coordinator::{
    CoordinatorStats, JobCoordinator, JobEvent, JobHandle, JobState, JobStatus,
};
pub use crate::delivery::{ArtifactStream, ByteRange, Delivery};
pub use crate::encode::{
    ContainerKind, FfmpegSinkFactory, FfmpegSinkOpts, FrameSink, InMemorySink, RawRgbaSinkFactory,
    SinkConfig, SinkFactory,
};
pub use crate::executor::{CancelToken, RenderControl, RenderExecutor, WorkerSlot, WorkerSlots};
pub use crate::foundation::config::{
    CacheConfig, ExecutorConfig, LoggingConfig, SceneLimits, ServiceConfig,
};
pub use crate::foundation::core::{Fps, FrameIndex, FrameRange, Resolution};
pub use crate::foundation::error::{
    FramecastError, FramecastResult, RenderError, SchemaError, ValidationError,
};
pub use crate::foundation::ids::{Fingerprint, JobId, RequesterId};
pub use crate::foundation::logging::init_logging;
pub use crate::render::backend::{FrameRGBA, SceneEngine};
pub use crate::render::cpu::CpuEngine;
pub use crate::scene::{Quality, RenderParams, SceneDescription, SceneValidator};
