use thiserror::Error;

/// Error taxonomy shared by the services, the storage layer and the HTTP encoder.
///
/// Every variant carries a human readable context message; the variant itself
/// decides how the failure is surfaced to clients.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("invalid request data: {0}")]
    Request(String),
    #[error("resource was not found: {0}")]
    NotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("service is temporary unavailable: {0}")]
    Temporary(String),
    #[error("conflict error: {0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn request(detail: impl Into<String>) -> Self {
        Self::Request(detail.into())
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::NotFound(detail.into())
    }

    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Self::InvalidArgument(detail.into())
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal(detail.into())
    }

    /// Returns `true` when retrying the same operation later may succeed.
    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Stable label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request(_) => "request",
            Self::NotFound(_) => "not_found",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Unavailable(_) => "unavailable",
            Self::Temporary(_) => "temporary",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal",
        }
    }
}
