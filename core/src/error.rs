use std::fmt;
use thiserror::Error;

/// The error type for chunksign operations
#[derive(Error, Debug)]
#[error("{message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<anyhow::Error>,
}

/// The kind of error that occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Credentials exist but are invalid/malformed
    CredentialInvalid,

    /// Credentials are expired
    CredentialExpired,

    /// Request cannot be signed (missing required fields, etc.)
    RequestInvalid,

    /// Configuration error (unsupported policy combination, invalid values)
    ///
    /// Never retried.
    ConfigInvalid,

    /// Computed and transmitted content digests disagree.
    ///
    /// Fatal for the current attempt. An outer retry policy may replay the
    /// whole stream from the start.
    DataIntegrity,

    /// Unexpected errors (I/O, crypto primitives, chunk signing, etc.)
    Unexpected,
}

impl Error {
    /// Create a new error with the given kind and message
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Add a source error
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Check if this is a credential error
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::CredentialInvalid | ErrorKind::CredentialExpired
        )
    }

    /// Check if replaying the request from scratch could succeed.
    ///
    /// Only data integrity failures qualify, everything else is fatal.
    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::DataIntegrity
    }
}

// Convenience constructors
impl Error {
    /// Create a credential invalid error
    pub fn credential_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CredentialInvalid, message)
    }

    /// Create a credential expired error
    pub fn credential_expired(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CredentialExpired, message)
    }

    /// Create a request invalid error
    pub fn request_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RequestInvalid, message)
    }

    /// Create a config invalid error
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    /// Create a data integrity error
    pub fn data_integrity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DataIntegrity, message)
    }

    /// Create an unexpected error
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::CredentialInvalid => write!(f, "invalid credentials"),
            ErrorKind::CredentialExpired => write!(f, "expired credentials"),
            ErrorKind::RequestInvalid => write!(f, "invalid request"),
            ErrorKind::ConfigInvalid => write!(f, "invalid configuration"),
            ErrorKind::DataIntegrity => write!(f, "data integrity check failed"),
            ErrorKind::Unexpected => write!(f, "unexpected error"),
        }
    }
}

/// Convenience type alias for Results
pub type Result<T> = std::result::Result<T, Error>;

/// Wrap an error into `std::io::Error` so it can travel through `Read` and
/// `Stream` implementations.
///
/// `Error::from(io::Error)` recovers the original kind on the other side.
impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        std::io::Error::other(err)
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::unexpected(err.to_string()).with_source(err)
    }
}

macro_rules! impl_from {
    ($($ty:ty => $ctor:ident),+ $(,)?) => {
        $(
            impl From<$ty> for Error {
                fn from(err: $ty) -> Self {
                    Self::$ctor(err.to_string()).with_source(anyhow::Error::from(err))
                }
            }
        )+
    };
}

impl_from! {
    std::fmt::Error => unexpected,
    std::string::FromUtf8Error => unexpected,
    http::Error => request_invalid,
    http::header::InvalidHeaderName => request_invalid,
    http::header::InvalidHeaderValue => request_invalid,
    http::header::ToStrError => request_invalid,
    http::uri::InvalidUri => request_invalid,
    http::uri::InvalidUriParts => request_invalid,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        // An io::Error produced by one of our own stream layers carries the
        // original error inside.
        if err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            if let Some(Ok(inner)) = err.into_inner().map(|e| e.downcast::<Error>()) {
                return *inner;
            }
            return Self::unexpected("io error lost its inner value");
        }

        Self::unexpected(err.to_string()).with_source(anyhow::Error::from(err))
    }
}
