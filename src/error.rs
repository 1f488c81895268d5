//! Error types for the pcloud_sdk crate.

use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of pCloud result codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing, invalid or expired credentials.
    Auth,
    /// A required parameter was missing or malformed.
    BadRequest,
    NotFound,
    AccessDenied,
    NameConflict,
    NameInvalid,
    NotEmpty,
    QuotaExceeded,
    /// Too many requests; safe to retry after a pause.
    RateLimited,
    /// Temporary server-side failure; safe to retry.
    ServerBusy,
    Unknown,
}

impl ErrorCategory {
    /// Map a non-zero pCloud `result` code to its category.
    pub fn from_code(code: i64) -> Self {
        match code {
            1000 | 2000 | 2012 | 2094 | 2095 => ErrorCategory::Auth,
            1001..=1999 => ErrorCategory::BadRequest,
            2002 | 2005 | 2009 | 2010 => ErrorCategory::NotFound,
            2003 | 2007 => ErrorCategory::AccessDenied,
            2004 => ErrorCategory::NameConflict,
            2001 => ErrorCategory::NameInvalid,
            2006 => ErrorCategory::NotEmpty,
            2008 => ErrorCategory::QuotaExceeded,
            4000 => ErrorCategory::RateLimited,
            5000 | 5001 => ErrorCategory::ServerBusy,
            _ => ErrorCategory::Unknown,
        }
    }

    pub fn is_transient(self) -> bool {
        matches!(self, ErrorCategory::RateLimited | ErrorCategory::ServerBusy)
    }
}

/// Errors that can occur when talking to pCloud.
#[derive(Error, Debug)]
pub enum PCloudError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("pCloud API error {code}: {message}")]
    Api {
        code: i64,
        category: ErrorCategory,
        message: String,
    },

    #[error("Malformed API response: {0}")]
    MalformedResponse(String),

    #[error("Corrupt token file {path:?}: {message}")]
    CorruptTokenFile { path: PathBuf, message: String },

    #[error("Local I/O error on {path:?}: {source}")]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Transfer failed: {message}")]
    Transfer {
        message: String,
        #[source]
        source: Box<PCloudError>,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP error ({status}): {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid authorization code or redirect URL: {0}")]
    InvalidCodeOrUrl(String),
}

impl PCloudError {
    /// Build an API error from a raw result code, classifying it.
    pub fn api(code: i64, message: impl Into<String>) -> Self {
        PCloudError::Api {
            code,
            category: ErrorCategory::from_code(code),
            message: message.into(),
        }
    }

    pub(crate) fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PCloudError::LocalIo {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn transfer(source: PCloudError) -> Self {
        PCloudError::Transfer {
            message: source.to_string(),
            source: Box::new(source),
        }
    }

    /// The pCloud result code, if this error came from the API.
    pub fn code(&self) -> Option<i64> {
        match self {
            PCloudError::Api { code, .. } => Some(*code),
            PCloudError::Transfer { source, .. } => source.code(),
            _ => None,
        }
    }

    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            PCloudError::Api { category, .. } => Some(*category),
            PCloudError::Transfer { source, .. } => source.category(),
            _ => None,
        }
    }

    /// Whether the request that produced this error may be retried.
    ///
    /// Connection failures, timeouts, 429/5xx statuses and the rate-limit /
    /// server-busy result codes are transient. Everything else is final.
    pub fn is_transient(&self) -> bool {
        match self {
            PCloudError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            PCloudError::HttpStatus { status, .. } => {
                *status == 429 || (500..=599).contains(status)
            }
            PCloudError::Api { category, .. } => category.is_transient(),
            _ => false,
        }
    }

    /// Whether this error means the current session is no longer usable.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            PCloudError::Api {
                category: ErrorCategory::Auth,
                ..
            }
        )
    }
}

/// Result type alias for PCloudError.
pub type Result<T> = std::result::Result<T, PCloudError>;
