//! The closed error taxonomy surfaced by the object-store adapter (spec §7)
//! and its translation to POSIX errno values at the `Drive` boundary.
//!
//! POSIX errno values are plain `i32`s (`libc::ENOENT` and friends), matching
//! the `fuser` crate's `reply.error()` signature.

/// Closed set of error kinds the adapter can report. Mirrors
/// `original_source/include/client/QSError.h`, generalized away from any one
/// vendor's literal error codes (spec §1 Non-goals).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    Unknown,
    Good,
    AccessDenied,
    AccessKeyIdInvalid,
    ActionInvalid,
    ActionMissing,
    AuthenticationTokenMissing,
    BucketAlreadyOwnedByYou,
    BucketNotExist,
    ClientUnrecognized,
    ClientTokenIdInvalid,
    InternalFailure,
    KeyNotExist,
    NetworkConnection,
    NoSuchListMultipart,
    NoSuchListMultipartUploads,
    NoSuchListObjects,
    ObjectAlreadyInActiveTier,
    ObjectNotInActiveTier,
    ParameterCombinationInvalid,
    ParameterMissing,
    ParameterValueInvalid,
    QueryParameterInvalid,
    RequestExpired,
    ResourceNotFound,
    ServiceUnavailable,
    SignatureDoesNotMatch,
    SignatureIncompleted,
    SignatureInvalid,
    SdkConfigureFileInvalid,
    SdkRequestSendError,
}

impl ErrorKind {
    /// Whether the retry strategy should retry an operation that failed
    /// with this kind (spec §7 retry policy).
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::NetworkConnection
                | ErrorKind::ServiceUnavailable
                | ErrorKind::RequestExpired
        )
    }

    /// Map an HTTP status code into the transient-retry set named in spec §7,
    /// independent of any particular error kind classification.
    pub fn is_transient_status(status: u16) -> bool {
        matches!(
            status,
            408 | 419 | 429 | 440 | 444 | 449 | 450 | 451 | 497 | 502 | 504 | 509 | 598 | 599
        )
    }

    /// Nearest POSIX errno for this error kind (spec §7 propagation rules).
    pub fn to_errno(self) -> i32 {
        match self {
            ErrorKind::KeyNotExist => libc::ENOENT,
            ErrorKind::BucketNotExist => libc::ENOENT,
            ErrorKind::ResourceNotFound => libc::ENOENT,
            ErrorKind::AccessDenied => libc::EACCES,
            ErrorKind::NetworkConnection => libc::EIO,
            ErrorKind::Good => 0,
            _ => libc::EIO,
        }
    }
}

/// Error returned by the object-store adapter for a failed call. Carries an
/// error kind, the vendor exception name (diagnostics only, never matched
/// on), a human message, and whether the retry strategy may retry it.
#[derive(Debug, Clone)]
pub struct ClientError {
    pub kind: ErrorKind,
    pub exception_name: String,
    pub message: String,
    pub retryable: bool,
}

impl ClientError {
    pub fn new(kind: ErrorKind, exception_name: impl Into<String>, message: impl Into<String>) -> Self {
        let retryable = kind.is_retryable();
        Self {
            kind,
            exception_name: exception_name.into(),
            message: message.into(),
            retryable,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkConnection, "NetworkConnection", message)
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {} ({})", self.kind, self.message, self.exception_name)
    }
}

impl std::error::Error for ClientError {}

/// Every object-store call returns this: the uniform request/outcome pair
/// named in spec §4.J.
pub type Outcome<T> = Result<T, ClientError>;

/// Internal fallible operations that never reach the wire (cache, tree,
/// metadata, transfer bookkeeping) use this smaller enum instead of
/// `ClientError`, and are converted to an errno only at the `Drive`
/// boundary.
#[derive(Debug, thiserror::Error)]
pub enum QsfsError {
    #[error("invalid range: {0}")]
    InvalidRange(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("directory not empty: {0}")]
    NotEmpty(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("cache is full and disk fallback is unavailable")]
    OutOfSpace,
    #[error("object store error: {0}")]
    Store(#[from] ClientError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Config(String),
}

impl QsfsError {
    pub fn to_errno(&self) -> i32 {
        match self {
            QsfsError::InvalidRange(_) => libc::EINVAL,
            QsfsError::NotFound(_) => libc::ENOENT,
            QsfsError::AlreadyExists(_) => libc::EEXIST,
            QsfsError::NotADirectory(_) => libc::ENOTDIR,
            QsfsError::NotEmpty(_) => libc::ENOTEMPTY,
            QsfsError::PermissionDenied(_) => libc::EACCES,
            QsfsError::OutOfSpace => libc::ENOMEM,
            QsfsError::Store(e) => e.kind.to_errno(),
            QsfsError::Io(_) => libc::EIO,
            QsfsError::Config(_) => libc::EINVAL,
        }
    }
}
