use std::fmt;
use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised while establishing a backend session.
///
/// All of these are fatal: a run never starts dispatching after a setup failure.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The backend configuration is incomplete or inconsistent.
    #[error("invalid backend configuration: {0}")]
    Config(String),

    /// The backend rejected the credentials or could not be reached for authentication.
    #[error("authentication failed: {context}")]
    Auth {
        context: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A container required before dispatch could not be created.
    #[error("could not create container `{container}`")]
    ContainerCreate {
        container: String,
        #[source]
        cause: Box<CopyError>,
    },

    /// Local resources needed by the backend could not be prepared.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl SetupError {
    pub(crate) fn auth(context: impl Into<String>) -> Self {
        Self::Auth {
            context: context.into(),
            cause: None,
        }
    }

    pub(crate) fn auth_caused(
        context: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Auth {
            context: context.into(),
            cause: Some(Box::new(cause)),
        }
    }
}

/// Result type for backend setup.
pub type SetupResult<T> = Result<T, SetupError>;

/// Errors for a single copy attempt.
///
/// These are recovered at the worker boundary: the file is recorded as failed and the batch
/// moves on.
#[derive(Debug, Error)]
pub enum CopyError {
    /// `setup` was not called before the copier was used.
    #[error("copier used before setup")]
    NotSetUp,

    /// The source file could not be opened or inspected.
    #[error("failed to open `{}`", path.display())]
    FileOpen {
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },

    /// The request never produced a response.
    #[error("transport error: {context}")]
    Transport {
        context: String,
        #[source]
        cause: reqwest::Error,
    },

    /// The backend answered with a status we do not handle.
    #[error("{context}: unexpected status {status}")]
    Status { context: String, status: StatusCode },

    /// The content tag reported by the backend does not match the expected digest.
    #[error("integrity mismatch for `{object}`: expected {expected}, got {actual}")]
    IntegrityMismatch {
        object: String,
        expected: String,
        actual: String,
    },

    /// The remote object length differs from the local file.
    #[error("size mismatch for `{object}`: local {expected} bytes, remote {actual} bytes")]
    SizeMismatch {
        object: String,
        expected: u64,
        actual: u64,
    },

    /// The object does not exist in the backend.
    #[error("object `{0}` not found")]
    NotFound(String),

    /// A container could not be created on demand.
    #[error("could not create container `{container}`")]
    ContainerCreate {
        container: String,
        #[source]
        cause: Box<CopyError>,
    },

    /// Content-addressed placement was requested for a file without precomputed checksums.
    #[error("no checksums available for `{}`", path.display())]
    MissingChecksum { path: PathBuf },

    /// A container or object name could not be turned into a request URL.
    #[error("invalid object url: {0}")]
    InvalidUrl(String),

    /// I/O errors inside a local backend.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl CopyError {
    pub(crate) fn transport(context: impl Into<String>, cause: reqwest::Error) -> Self {
        Self::Transport {
            context: context.into(),
            cause,
        }
    }

    /// Classifies this error for reporting.
    pub fn kind(&self) -> FailureKind {
        match self {
            CopyError::FileOpen { .. } => FailureKind::FileOpen,
            CopyError::Transport { .. } | CopyError::Status { .. } => FailureKind::Transport,
            CopyError::IntegrityMismatch { .. } => FailureKind::IntegrityMismatch,
            CopyError::SizeMismatch { .. } | CopyError::NotFound(_) => FailureKind::Verification,
            CopyError::ContainerCreate { .. } => FailureKind::ContainerCreate,
            CopyError::MissingChecksum { .. } => FailureKind::MissingChecksum,
            CopyError::NotSetUp | CopyError::InvalidUrl(_) | CopyError::Io(_) => {
                FailureKind::Backend
            }
        }
    }
}

/// Result type for copy operations.
pub type CopyResult<T> = Result<T, CopyError>;

/// Coarse classification of per-file failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureKind {
    FileOpen,
    Transport,
    IntegrityMismatch,
    Verification,
    ContainerCreate,
    MissingChecksum,
    Backend,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::FileOpen => "file-open",
            FailureKind::Transport => "transport",
            FailureKind::IntegrityMismatch => "integrity-mismatch",
            FailureKind::Verification => "verification",
            FailureKind::ContainerCreate => "container-create",
            FailureKind::MissingChecksum => "missing-checksum",
            FailureKind::Backend => "backend",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A checksum string that is not a valid hex digest of the expected length.
#[derive(Debug, Error)]
#[error("invalid {algorithm} digest `{value}`")]
pub struct InvalidChecksum {
    pub algorithm: &'static str,
    pub value: String,
}
