use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Rate limited: {retry_after:?}")]
    RateLimit { retry_after: Option<u64> },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Table not found: {0}")]
    NotFound(String),

    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Network(_) => true,
            StoreError::Server { status, .. } if *status >= 500 => true,
            StoreError::RateLimit { .. } => true,
            _ => false,
        }
    }

    /// Whether a request can be sent again without risking a second write.
    ///
    /// A rate-limited request was rejected before reaching the table; a
    /// timeout or 5xx may have been committed server side.
    pub fn is_safe_to_resend(&self) -> bool {
        matches!(self, StoreError::RateLimit { .. })
    }

    /// Bad or expired credentials. Every later request would fail the same way.
    pub fn is_authentication(&self) -> bool {
        matches!(self, StoreError::Authentication(_))
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            StoreError::RateLimit { retry_after } => *retry_after,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
