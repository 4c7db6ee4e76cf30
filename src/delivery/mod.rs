//! Streaming finished artifacts to callers, whole or by byte range.

pub mod range;
pub mod stream;

pub use range::ByteRange;
pub use stream::{ArtifactStream, Chunks, Delivery};
