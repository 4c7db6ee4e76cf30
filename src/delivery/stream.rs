use crate::cache::{Artifact, ArtifactPin, RenderCache};
use crate::delivery::range::ByteRange;
use crate::foundation::error::{FramecastError, FramecastResult};
use anyhow::Context as _;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Take};
use std::sync::Arc;

/// Hands out readers over cached artifacts.
#[derive(Debug, Clone)]
pub struct Delivery {
    cache: RenderCache,
}

impl Delivery {
    /// Deliver artifacts held by `cache`.
    pub fn new(cache: RenderCache) -> Self {
        Self { cache }
    }

    /// Open `artifact` for reading, optionally restricted to `range`.
    ///
    /// The cache entry stays pinned until the returned stream is dropped.
    #[tracing::instrument(skip_all, fields(fingerprint = %artifact.fingerprint))]
    pub fn deliver(
        &self,
        artifact: &Artifact,
        range: Option<ByteRange>,
    ) -> FramecastResult<ArtifactStream> {
        let fp = artifact.fingerprint;
        let pin = self
            .cache
            .pin(&fp)
            .ok_or(FramecastError::ArtifactNotFound(fp))?;
        let size = pin.size_bytes;
        let (start, len) = match range {
            None => (0, size),
            Some(r) => {
                let (s, e) = r.resolve(size)?;
                (s, e - s + 1)
            }
        };

        let mut file = match File::open(&pin.location) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FramecastError::ArtifactNotFound(fp));
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("open artifact '{}'", pin.location.display()))
                    .into());
            }
        };
        if start > 0 {
            file.seek(SeekFrom::Start(start))
                .with_context(|| format!("seek artifact '{}'", pin.location.display()))?;
        }
        tracing::debug!(start, len, size, partial = range.is_some(), "delivering");

        Ok(ArtifactStream {
            reader: BufReader::new(file).take(len),
            start,
            len,
            size,
            partial: range.is_some(),
            pin,
        })
    }
}

/// Reader over one window of an artifact file.
///
/// Holds a cache pin; dropping the stream (finished or abandoned) releases it.
pub struct ArtifactStream {
    reader: Take<BufReader<File>>,
    start: u64,
    len: u64,
    size: u64,
    partial: bool,
    pin: ArtifactPin,
}

impl ArtifactStream {
    /// The artifact being delivered.
    pub fn artifact(&self) -> &Arc<Artifact> {
        self.pin.artifact()
    }

    /// Bytes this stream yields in total.
    pub fn content_length(&self) -> u64 {
        self.len
    }

    /// `bytes start-end/size`, or `bytes */size` for an empty window.
    pub fn content_range(&self) -> String {
        if self.len == 0 {
            return format!("bytes */{}", self.size);
        }
        format!(
            "bytes {}-{}/{}",
            self.start,
            self.start + self.len - 1,
            self.size
        )
    }

    /// Whether a range was requested (a 206 response rather than a 200).
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    /// MIME type of the artifact container.
    pub fn mime_type(&self) -> &'static str {
        self.pin.mime_type()
    }

    /// Iterate the remaining bytes in blocks of at most `chunk_size`.
    pub fn chunks(&mut self, chunk_size: usize) -> Chunks<'_> {
        Chunks {
            stream: self,
            chunk_size: chunk_size.max(1),
        }
    }
}

impl Read for ArtifactStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl std::fmt::Debug for ArtifactStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStream")
            .field("fingerprint", &self.pin.fingerprint)
            .field("content_range", &self.content_range())
            .field("remaining", &self.reader.limit())
            .finish()
    }
}

/// Blocks of an [`ArtifactStream`]; see [`ArtifactStream::chunks`].
pub struct Chunks<'a> {
    stream: &'a mut ArtifactStream,
    chunk_size: usize,
}

impl Iterator for Chunks<'_> {
    type Item = std::io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.stream.reader.limit();
        if remaining == 0 {
            return None;
        }
        let want = remaining.min(self.chunk_size as u64) as usize;
        let mut buf = vec![0u8; want];
        let mut filled = 0;
        while filled < want {
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Some(Err(e)),
            }
        }
        if filled == 0 {
            self.stream.reader.set_limit(0);
            return Some(Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "artifact file shorter than its recorded size",
            )));
        }
        buf.truncate(filled);
        Some(Ok(buf))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/delivery/stream.rs"]
mod tests;
