use crate::encode::ContainerKind;
use crate::foundation::ids::Fingerprint;
use crate::scene::RenderParams;
use serde::{Deserialize, Serialize};
use sha2::Digest as _;
use std::io::Read;
use std::path::{Path, PathBuf};

/// A finished render output and its metadata.
///
/// Immutable once produced. The file at `location` belongs to the render cache after `store`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Identity of the scene and parameters that produced this artifact.
    pub fingerprint: Fingerprint,
    /// Where the media file lives.
    pub location: PathBuf,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Playback duration in seconds.
    pub duration_secs: f64,
    /// Number of encoded frames.
    pub frame_count: u64,
    /// SHA-256 of the media file, lowercase hex.
    pub content_hash: String,
    /// Container format.
    pub container: ContainerKind,
    /// Parameters the artifact was rendered with.
    pub params: RenderParams,
}

impl Artifact {
    /// MIME type for delivery.
    pub fn mime_type(&self) -> &'static str {
        self.container.mime_type()
    }
}

/// SHA-256 and length of the file at `path`, streamed in fixed-size blocks.
pub(crate) fn hash_file(path: &Path) -> std::io::Result<(String, u64)> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = sha2::Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((sha256_hex(hasher), total))
}

fn sha256_hex(hasher: sha2::Sha256) -> String {
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
