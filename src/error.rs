//! Error types reported across the method-call boundary

/// Failure raised by a native backend.
#[derive(Debug, thiserror::Error)]
pub enum NativeError {
    #[cfg(feature = "native")]
    #[error("PDF engine: {0}")]
    Pdf(#[from] mupdf::error::Error),

    #[error("{detail}")]
    Generic { detail: String },
}

impl NativeError {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }
}

/// Errors returned by the engine for a single call.
///
/// Every variant maps onto a stable wire code (see [`BridgeError::code`]).
/// An operation either fully succeeds or fails with one of these; there are
/// no partial results.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Malformed or out-of-range input. The caller can correct it and retry.
    #[error("{0}")]
    InvalidArgument(String),

    /// A capability this host cannot provide.
    #[error("{0}")]
    NotSupported(String),

    /// The native library failed.
    #[error("internal error: {0}")]
    Internal(#[from] NativeError),

    /// The method name is unknown.
    #[error("method not implemented: {0}")]
    NotImplemented(String),
}

impl BridgeError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(NativeError::generic(msg))
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotSupported(_) => "not_supported",
            Self::Internal(_) => "internal",
            Self::NotImplemented(_) => "not_implemented",
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
