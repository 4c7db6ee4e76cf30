use crate::foundation::ids::{Fingerprint, JobId};
use std::fmt;
use std::time::Duration;

/// Convenience result type used across framecast.
pub type FramecastResult<T> = Result<T, FramecastError>;

/// Top-level error taxonomy returned by service operations.
#[derive(thiserror::Error, Debug)]
pub enum FramecastError {
    /// Malformed, oversized, or out-of-policy scene input. Never retried.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The waiting queue is at capacity; the caller should retry later.
    #[error("admission rejected: render queue is full ({queue_depth} waiting)")]
    AdmissionRejected {
        /// Configured queue depth that was exceeded.
        queue_depth: usize,
    },

    /// Engine or encoder fault, after any automatic retry.
    #[error("render failed: {0}")]
    RenderFailed(#[from] RenderError),

    /// Caller-side wait expired. The job itself is unaffected.
    #[error("timed out after {waited:?} waiting for job result")]
    Timeout {
        /// How long the caller waited.
        waited: Duration,
    },

    /// The job was cancelled before producing an artifact.
    #[error("job cancelled")]
    Cancelled,

    /// The coordinator is shutting down and accepts no new work.
    #[error("coordinator is shutting down")]
    ShuttingDown,

    /// No job with this id is known (never existed or already forgotten).
    #[error("unknown job {0}")]
    UnknownJob(JobId),

    /// The artifact is not (or no longer) present in the render cache.
    #[error("artifact {0} is not in the render cache")]
    ArtifactNotFound(Fingerprint),

    /// Requested byte range cannot be served.
    #[error("range not satisfiable: {range} for artifact of {size} bytes")]
    RangeNotSatisfiable {
        /// Range as requested by the caller.
        range: String,
        /// Artifact size in bytes.
        size: u64,
    },

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FramecastError {
    /// Build a [`FramecastError::Validation`] with a single root-level message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(ValidationError::single(msg))
    }

    /// Build a [`FramecastError::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Short machine-readable kind, suitable for status payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::AdmissionRejected { .. } => "admission_rejected",
            Self::RenderFailed(e) => e.kind(),
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
            Self::ShuttingDown => "shutting_down",
            Self::UnknownJob(_) => "unknown_job",
            Self::ArtifactNotFound(_) => "artifact_not_found",
            Self::RangeNotSatisfiable { .. } => "range_not_satisfiable",
            Self::Config(_) => "config",
            Self::Other(_) => "internal",
        }
    }
}

/// One element of a JSON path into the scene payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaPathElem {
    /// Object field.
    Field(&'static str),
    /// Array index.
    Index(usize),
}

/// A single schema violation at a JSON path.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaError {
    /// Location of the offending value (`$` when empty).
    pub path: Vec<SchemaPathElem>,
    /// Human-readable description.
    pub message: String,
}

impl SchemaError {
    pub(crate) fn at(path: &[SchemaPathElem], message: impl Into<String>) -> Self {
        Self {
            path: path.to_vec(),
            message: message.into(),
        }
    }

    /// Render the path as `$.field[0].other`.
    pub fn path_string(&self) -> String {
        let mut s = String::from("$");
        for p in &self.path {
            match *p {
                SchemaPathElem::Field(name) => {
                    s.push('.');
                    s.push_str(name);
                }
                SchemaPathElem::Index(i) => {
                    s.push('[');
                    s.push_str(&i.to_string());
                    s.push(']');
                }
            }
        }
        s
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            return write!(f, "{}", self.message);
        }
        write!(f, "{}: {}", self.path_string(), self.message)
    }
}

/// All schema violations found in one scene payload or parameter set.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Violations in discovery order. Never empty.
    pub errors: Vec<SchemaError>,
}

impl ValidationError {
    /// Single root-level violation.
    pub fn single(msg: impl Into<String>) -> Self {
        Self {
            errors: vec![SchemaError::at(&[], msg)],
        }
    }

    pub(crate) fn from_errors(errors: Vec<SchemaError>) -> Result<(), Self> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Self { errors })
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Failure of a single render attempt.
///
/// Each variant is distinct so the coordinator can decide between an automatic retry
/// (transient) and surfacing the error to every waiter (permanent).
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// The rendering engine failed on a scene that passed validation.
    #[error("engine fault: {message}")]
    Engine {
        /// Engine-provided description.
        message: String,
        /// Whether a fresh attempt may succeed.
        transient: bool,
    },

    /// The encoder failed to assemble frames into a container.
    #[error("encoder fault: {message}")]
    Encoder {
        /// Encoder-provided description.
        message: String,
        /// Whether a fresh attempt may succeed (I/O exhaustion and the like).
        transient: bool,
    },

    /// The render exceeded its per-job wall-clock limit.
    #[error("render exceeded wall-clock limit of {limit:?}")]
    TimedOut {
        /// Configured limit.
        limit: Duration,
    },

    /// Artifact bytes could not be persisted.
    #[error("artifact storage failed: {message}")]
    Storage {
        /// Underlying I/O description.
        message: String,
    },

    /// Cancellation was observed at a frame boundary.
    #[error("render cancelled")]
    Cancelled,
}

impl RenderError {
    /// Permanent engine fault.
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine {
            message: msg.into(),
            transient: false,
        }
    }

    /// Engine fault that a fresh attempt may not hit again.
    pub fn engine_transient(msg: impl Into<String>) -> Self {
        Self::Engine {
            message: msg.into(),
            transient: true,
        }
    }

    /// Permanent encoder fault.
    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder {
            message: msg.into(),
            transient: false,
        }
    }

    /// Encoder I/O fault that may clear on retry.
    pub fn encoder_io(err: &std::io::Error) -> Self {
        Self::Encoder {
            message: err.to_string(),
            transient: true,
        }
    }

    /// Artifact storage fault.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage {
            message: msg.into(),
        }
    }

    /// Eligible for one automatic re-dispatch on a fresh slot.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Engine { transient, .. } | Self::Encoder { transient, .. } => *transient,
            Self::Storage { .. } => true,
            Self::TimedOut { .. } | Self::Cancelled => false,
        }
    }

    /// Short machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Engine { .. } => "engine_fault",
            Self::Encoder { .. } => "encoder_fault",
            Self::TimedOut { .. } => "render_timeout",
            Self::Storage { .. } => "storage_fault",
            Self::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
