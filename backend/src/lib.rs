//! # Lessonload - lesson media uploader
//!
//! Uploads the videos and documents attached to a lesson, reports one
//! aggregate progress figure (with throughput and ETA) across the whole batch,
//! and can be cancelled at any point.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────────┐     ┌─────────────┐
//! │ LessonDraft │────▶│  Validate   │────▶│  UploadSession   │────▶│ Lesson API  │
//! │  (files)    │     │             │     │ videos → stream  │     │  (persist)  │
//! └─────────────┘     └─────────────┘     │ docs → multipart │     └─────────────┘
//!                                         └────────┬─────────┘
//!                                                  ▼
//!                                         ProgressTracker ──▶ observers
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lessonload::{Config, FileKind, PendingFile, UploadSession};
//! use lessonload::session::{AbortController, NoopObserver};
//!
//! #[tokio::main]
//! async fn main() {
//!     let session = UploadSession::from_config(&Config::from_env().unwrap());
//!     let files = vec![PendingFile::from_path("intro.mp4", FileKind::Video).unwrap()];
//!     let controller = AbortController::new();
//!     let outcome = session.run(&files, &controller.signal(), &NoopObserver).await;
//!     println!("{:?}", outcome.state());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Layered error types
//! - [`config`] - Environment configuration
//! - [`models`] - Files, uploaded references, lesson drafts, API envelope
//! - [`progress`] - Aggregate progress / speed / ETA tracker
//! - [`session`] - Sequential upload orchestration and cancellation
//! - [`transport`] - REST client, streaming-video and multipart transports
//! - [`lesson`] - Validate, upload, persist
//! - [`api`] - HTTP control surface and log broadcasting

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Upload pipeline
pub mod progress;
pub mod session;
pub mod transport;

// Lesson workflow
pub mod lesson;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Errors
// =============================================================================

pub use error::{
    ConfigError, LessonError, ServerError, TransportError, ValidationError, EXIT_ABORTED,
    EXIT_FAILURE,
};

// =============================================================================
// Re-exports - Configuration & Models
// =============================================================================

pub use config::Config;

pub use models::{
    ApiEnvelope, FileKind, LessonDraft, PendingFile, Release, UploadedDocument, UploadedFiles,
    UploadedVideo, VideoStatus,
};

// =============================================================================
// Re-exports - Progress & Session
// =============================================================================

pub use progress::{
    format_eta, format_size, format_speed, ProgressSnapshot, ProgressTracker, SessionState,
    SAMPLE_INTERVAL,
};

pub use session::{
    upload_order, AbortController, AbortSignal, NoopObserver, ProgressObserver, SessionOutcome,
    UploadSession,
};

// =============================================================================
// Re-exports - Transports
// =============================================================================

pub use transport::{
    ApiClient, MediaUploader, MultipartUploader, ObjectUploader, PollOptions, StreamUploader,
    TransferProgress,
};

// =============================================================================
// Re-exports - Lesson workflow
// =============================================================================

pub use lesson::LessonPublisher;

// Server
pub mod server {
    pub use crate::api::server::{router, start_server, AppState};
}
