//! Render cache: fingerprint → finished artifact.

pub mod artifact;
pub mod store;

pub(crate) use artifact::hash_file;
pub use artifact::Artifact;
pub use store::{ArtifactPin, CacheStats, EvictionPolicy, RenderCache};
