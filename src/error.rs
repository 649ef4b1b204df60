use std::path::{Path, PathBuf};

/// Errors that can occur while extracting features.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// Missing or malformed data model, boundary, config or form file.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// No database session could be opened, or the session was closed.
    #[error("Database connection error: {message}")]
    Connection { message: String },

    /// A statement failed on an open database session.
    #[error("Database query failed: {0}")]
    Database(#[from] postgres::Error),

    /// The remote API answered with something we could not interpret.
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// The snapshot task reached a terminal state other than SUCCESS.
    #[error("Snapshot task {task_id} failed with status {status}")]
    TaskFailed { task_id: String, status: String },

    /// The remote host could not be reached or the request timed out.
    #[error("Network error for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status code.
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// The poll bound or the deadline was exceeded.
    #[error("Timed out: {message}")]
    Timeout { message: String },

    /// The caller cancelled the extraction.
    #[error("Extraction cancelled")]
    Cancelled,

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExtractError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether retrying the same request could reasonably succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_request()
            }
            Self::HttpStatus { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;
