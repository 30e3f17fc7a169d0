//! Upload transports.
//!
//! Two collaborators move bytes off the machine:
//!
//! - [`MediaUploader`] - videos to the streaming-media host ([`stream`])
//! - [`ObjectUploader`] - documents to object storage via chunked multipart
//!   upload ([`multipart`])
//!
//! Both report monotonic per-file byte counts through a progress callback and
//! observe the session's [`AbortSignal`]. Neither retries; a failed transfer
//! is returned as-is to the session, which abandons the queue.

pub mod client;
pub mod multipart;
pub mod stream;

use async_trait::async_trait;

use crate::error::TransportResult;
use crate::models::PendingFile;
use crate::session::abort::AbortSignal;

pub use client::ApiClient;
pub use multipart::MultipartUploader;
pub use stream::{PollOptions, StreamUploader};

/// Bytes transferred so far for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub loaded: u64,
    pub total: u64,
}

/// Per-file progress callback.
pub type ProgressFn<'a> = &'a (dyn Fn(TransferProgress) + Send + Sync);

/// Arguments for a video upload.
pub struct VideoUpload<'a> {
    pub file: &'a PendingFile,
    pub title: &'a str,
    pub collection_name: Option<&'a str>,
    pub on_progress: ProgressFn<'a>,
    pub signal: &'a AbortSignal,
}

/// Arguments for a document upload.
pub struct ObjectUpload<'a> {
    pub file: &'a PendingFile,
    pub folder: &'a str,
    pub on_progress: ProgressFn<'a>,
    pub signal: &'a AbortSignal,
}

/// Uploads a video and resolves to its remote identifier.
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload_video(&self, request: VideoUpload<'_>) -> TransportResult<String>;
}

/// Uploads a document and resolves to its storage path.
#[async_trait]
pub trait ObjectUploader: Send + Sync {
    async fn upload_object(&self, request: ObjectUpload<'_>) -> TransportResult<String>;
}
