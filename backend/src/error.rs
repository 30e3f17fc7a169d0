//! Error types for the lesson upload pipeline.
//!
//! Errors are layered the same way the pipeline is:
//!
//! - [`ConfigError`] - environment / flag configuration
//! - [`TransportError`] - a single file transfer or REST call
//! - [`ValidationError`] - lesson submission rejected before any transfer
//! - [`LessonError`] - top-level lesson workflow errors
//! - [`ServerError`] - HTTP control surface errors
//!
//! `From` conversions let `?` cross layer boundaries. User cancellation is
//! never a generic failure: it is [`TransportError::Aborted`] at the transport
//! layer and [`LessonError::Aborted`] at the top.

use std::path::PathBuf;
use thiserror::Error;

/// Process exit code for a user cancellation (128 + SIGINT).
pub const EXIT_ABORTED: i32 = 130;

/// Process exit code for any other failure.
pub const EXIT_FAILURE: i32 = 1;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while building a [`crate::config::Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable or flag could not be parsed.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// The API base URL is not an http(s) URL.
    #[error("API URL must start with http:// or https://, got '{0}'")]
    InvalidApiUrl(String),
}

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors from the REST client and the two upload transports.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The shared abort signal fired.
    #[error("Upload aborted")]
    Aborted,

    /// The HTTP request itself failed (connection, TLS, body stream).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with `success: false` or a non-2xx status.
    #[error("API error: {0}")]
    Api(String),

    /// The API answered with something we could not decode.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Reading the local file failed.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether this error is the user cancelling the transfer.
    pub fn is_aborted(&self) -> bool {
        matches!(self, TransportError::Aborted)
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_aborted() {
            EXIT_ABORTED
        } else {
            EXIT_FAILURE
        }
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Lesson submission problems caught before any byte is transferred.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Nothing to upload.
    #[error("Add at least one video or document")]
    NoFiles,

    /// Scheduled release lies in the past.
    #[error("Release date {0} is in the past")]
    ReleaseInPast(String),

    /// A file vanished between selection and submission.
    #[error("File not found: {}", .0.display())]
    MissingFile(PathBuf),

    /// A path points at something that is not a regular file.
    #[error("Not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    /// A required field is empty.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

// =============================================================================
// Lesson Errors (top-level)
// =============================================================================

/// Top-level lesson workflow errors.
///
/// Returned by [`crate::lesson::LessonPublisher`]. Callers check
/// [`LessonError::is_aborted`] to suppress error reporting for cancellations.
#[derive(Debug, Error)]
pub enum LessonError {
    /// Submission rejected before upload.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The user cancelled the upload.
    #[error("Upload aborted")]
    Aborted,

    /// A file transfer failed and the session was discarded.
    #[error("Upload failed: {0}")]
    Upload(TransportError),

    /// Files were uploaded but the lesson metadata could not be saved.
    #[error("Failed to save lesson: {0}")]
    Persist(TransportError),
}

impl LessonError {
    /// Whether this error is a user cancellation.
    pub fn is_aborted(&self) -> bool {
        matches!(self, LessonError::Aborted)
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_aborted() {
            EXIT_ABORTED
        } else {
            EXIT_FAILURE
        }
    }
}

impl From<TransportError> for LessonError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Aborted => LessonError::Aborted,
            other => LessonError::Upload(other),
        }
    }
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP control surface errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Unknown upload job.
    #[error("Upload job not found: {0}")]
    NotFound(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for lesson operations.
pub type LessonResult<T> = Result<T, LessonError>;
