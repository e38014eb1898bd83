use thiserror::Error;

/// Failures reported by a [`SearchBackend`](crate::backend::SearchBackend).
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Connection failed: {0}")]
    Connection(#[from] reqwest::Error),

    #[error("Authentication failed (status {status})")]
    Auth { status: u16 },

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Scroll context expired or unknown: {0}")]
    ScrollExpired(String),

    #[error("Backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Injected failure: {0}")]
    Injected(String),
}

impl BackendError {
    /// Error type label used for metrics
    pub fn error_type(&self) -> &'static str {
        match self {
            BackendError::Connection(_) => "connection",
            BackendError::Auth { .. } => "auth",
            BackendError::IndexNotFound(_) => "index_not_found",
            BackendError::ScrollExpired(_) => "scroll_expired",
            BackendError::Status { .. } => "status",
            BackendError::MalformedResponse(_) => "malformed_response",
            BackendError::InvalidUrl(_) => "invalid_url",
            BackendError::Injected(_) => "injected",
        }
    }

    /// Whether re-issuing the same request may succeed.
    ///
    /// An expired scroll, bad credentials or a missing index will fail the
    /// same way again.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Connection(_) | BackendError::Injected(_) => true,
            BackendError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum TapError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unmapped field: {0}")]
    UnmappedField(String),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(#[source] BackendError),

    #[error("Backend query failed: {0}")]
    BackendQuery(#[source] BackendError),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl TapError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        TapError::Config(msg.into())
    }

    pub(crate) fn illegal_state(msg: impl Into<String>) -> Self {
        TapError::IllegalState(msg.into())
    }

    /// The backend failure behind this error, if any
    pub fn backend_error(&self) -> Option<&BackendError> {
        match self {
            TapError::SourceUnavailable(e) | TapError::BackendQuery(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TapError>;

pub type BackendResult<T> = std::result::Result<T, BackendError>;
