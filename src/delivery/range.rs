use crate::foundation::error::{FramecastError, FramecastResult};
use std::fmt;

/// A single HTTP-style byte range (`Range: bytes=...`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=a-b`, both ends inclusive.
    Bounded {
        /// First byte.
        start: u64,
        /// Last byte, clamped to the artifact size on resolve.
        end: u64,
    },
    /// `bytes=a-`, from `a` to the end.
    From(u64),
    /// `bytes=-n`, the last `n` bytes.
    Suffix(u64),
}

impl ByteRange {
    /// Parse a single `bytes=` range. Multi-range requests are rejected.
    pub fn parse(header: &str) -> FramecastResult<Self> {
        let bad = || FramecastError::validation(format!("malformed byte range \"{header}\""));
        let body = header.trim().strip_prefix("bytes=").ok_or_else(bad)?;
        if body.contains(',') {
            return Err(FramecastError::validation(format!(
                "multiple byte ranges are not supported: \"{header}\""
            )));
        }
        let (a, b) = body.split_once('-').ok_or_else(bad)?;
        let num = |s: &str| s.trim().parse::<u64>().map_err(|_| bad());
        match (a.trim().is_empty(), b.trim().is_empty()) {
            (true, true) => Err(bad()),
            (true, false) => Ok(Self::Suffix(num(b)?)),
            (false, true) => Ok(Self::From(num(a)?)),
            (false, false) => {
                let (start, end) = (num(a)?, num(b)?);
                if end < start {
                    return Err(bad());
                }
                Ok(Self::Bounded { start, end })
            }
        }
    }

    /// Inclusive `[start, end]` window within an artifact of `size` bytes.
    pub fn resolve(self, size: u64) -> FramecastResult<(u64, u64)> {
        let unsatisfiable = || FramecastError::RangeNotSatisfiable {
            range: self.to_string(),
            size,
        };
        if size == 0 {
            return Err(unsatisfiable());
        }
        let last = size - 1;
        match self {
            Self::Bounded { start, end } if start <= last => Ok((start, end.min(last))),
            Self::From(start) if start <= last => Ok((start, last)),
            Self::Suffix(n) if n > 0 => Ok((size - n.min(size), last)),
            _ => Err(unsatisfiable()),
        }
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bounded { start, end } => write!(f, "bytes={start}-{end}"),
            Self::From(start) => write!(f, "bytes={start}-"),
            Self::Suffix(n) => write!(f, "bytes=-{n}"),
        }
    }
}

impl std::str::FromStr for ByteRange {
    type Err = FramecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/delivery/range.rs"]
mod tests;
