//! Encoding sinks.
//!
//! Sinks consume rendered frames in timeline order and write one artifact file per render attempt.

/// `ffmpeg`-based MP4 output.
pub mod ffmpeg;
/// Uncompressed RGBA container.
pub mod raw;
/// Sink traits and the in-memory sink.
pub mod sink;

pub use ffmpeg::{FfmpegSink, FfmpegSinkFactory, FfmpegSinkOpts, is_ffmpeg_on_path};
pub use raw::{RawHeader, RawRgbaSink, RawRgbaSinkFactory};
pub use sink::{ContainerKind, FrameSink, InMemorySink, SinkConfig, SinkFactory};
