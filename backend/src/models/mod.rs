//! Domain models for the lesson upload pipeline.
//!
//! - [`PendingFile`] - a local file queued for upload
//! - [`FileKind`] - where a file goes (streaming host or object storage)
//! - [`UploadedVideo`] / [`UploadedDocument`] - references returned after transfer
//! - [`LessonDraft`] - a lesson submission with attached files
//! - [`ApiEnvelope`] - the REST `{success, data, error}` wrapper
//! - [`VideoStatus`] - transcode status of an uploaded video

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

// =============================================================================
// Pending Files
// =============================================================================

/// Destination of a file.
///
/// Videos go to the streaming-media host (transcoding, adaptive playback),
/// documents to generic object storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Video,
    Document,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Video => write!(f, "video"),
            FileKind::Document => write!(f, "document"),
        }
    }
}

/// A local file queued for upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingFile {
    pub path: PathBuf,
    pub file_name: String,
    /// Size in bytes, captured when the file was selected.
    pub size: u64,
    pub mime_type: String,
    pub kind: FileKind,
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration_seconds: Option<u32>,
}

impl PendingFile {
    /// Stat a file on disk and queue it as `kind`.
    pub fn from_path(path: impl AsRef<Path>, kind: FileKind) -> io::Result<Self> {
        let path = path.as_ref();
        let metadata = fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();

        Ok(Self {
            path: path.to_path_buf(),
            mime_type: mime_type_for(&file_name).to_string(),
            file_name,
            size: metadata.len(),
            kind,
            title: None,
            description: None,
            duration_seconds: None,
        })
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_duration(mut self, seconds: u32) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    /// Title shown on the streaming host: explicit title, else the file name.
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.file_name)
    }
}

/// Best-effort MIME type from the file extension.
pub fn mime_type_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

// =============================================================================
// Uploaded References
// =============================================================================

/// Transcode status the streaming host assigns right after upload.
pub const BUNNY_STATUS_UPLOADED: i32 = 1;

/// A video transferred to the streaming host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedVideo {
    pub bunny_guid: String,
    pub bunny_status: i32,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration_seconds: Option<u32>,
}

impl UploadedVideo {
    pub fn new(file: &PendingFile, guid: String) -> Self {
        Self {
            bunny_guid: guid,
            bunny_status: BUNNY_STATUS_UPLOADED,
            file_name: file.file_name.clone(),
            file_size: file.size,
            mime_type: file.mime_type.clone(),
            title: file.title.clone(),
            description: file.description.clone(),
            duration_seconds: file.duration_seconds,
        }
    }
}

/// A document transferred to object storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedDocument {
    pub storage_path: String,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl UploadedDocument {
    pub fn new(file: &PendingFile, storage_path: String) -> Self {
        Self {
            storage_path,
            file_name: file.file_name.clone(),
            file_size: file.size,
            mime_type: file.mime_type.clone(),
            title: file.title.clone(),
            description: file.description.clone(),
        }
    }
}

/// Everything a completed session transferred.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadedFiles {
    pub videos: Vec<UploadedVideo>,
    pub documents: Vec<UploadedDocument>,
}

impl UploadedFiles {
    pub fn is_empty(&self) -> bool {
        self.videos.is_empty() && self.documents.is_empty()
    }
}

// =============================================================================
// Lesson Draft
// =============================================================================

/// When a lesson becomes visible to students.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "at", rename_all = "lowercase")]
pub enum Release {
    Immediate,
    Scheduled(DateTime<Utc>),
}

impl Release {
    /// Timestamp sent to the API; immediate releases use `now`.
    pub fn timestamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Release::Immediate => now,
            Release::Scheduled(at) => *at,
        }
    }
}

/// A lesson submission with attached files.
#[derive(Debug, Clone, PartialEq)]
pub struct LessonDraft {
    pub class_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub release: Release,
    pub topic_id: Option<String>,
    pub max_watch_time_multiplier: f64,
    pub watermark_interval_mins: u32,
    pub files: Vec<PendingFile>,
}

impl LessonDraft {
    pub fn new(class_id: impl Into<String>) -> Self {
        Self {
            class_id: class_id.into(),
            title: None,
            description: None,
            release: Release::Immediate,
            topic_id: None,
            max_watch_time_multiplier: 2.0,
            watermark_interval_mins: 5,
            files: Vec::new(),
        }
    }

    pub fn with_file(mut self, file: PendingFile) -> Self {
        self.files.push(file);
        self
    }
}

// =============================================================================
// REST Envelope
// =============================================================================

/// Response wrapper used by every API endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None, message: None }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(error.into()), message: None }
    }

    /// Backend error text, preferring `error` over `message`.
    pub fn error_text(&self) -> Option<&str> {
        self.error.as_deref().or(self.message.as_deref())
    }
}

// =============================================================================
// Video Status
// =============================================================================

/// Streaming host status code for a failed transcode.
pub const BUNNY_STATUS_FAILED: i32 = 5;

/// Transcode status of an uploaded video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatus {
    #[serde(default)]
    pub guid: String,
    pub status: i32,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub is_ready: bool,
    pub duration: Option<f64>,
}

impl VideoStatus {
    pub fn is_failed(&self) -> bool {
        self.status == BUNNY_STATUS_FAILED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_pending_file_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Week 1 Slides.PDF");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(&[0u8; 1234]).unwrap();

        let file = PendingFile::from_path(&path, FileKind::Document).unwrap();
        assert_eq!(file.file_name, "Week 1 Slides.PDF");
        assert_eq!(file.size, 1234);
        assert_eq!(file.mime_type, "application/pdf");
        assert_eq!(file.display_title(), "Week 1 Slides.PDF");

        let titled = file.with_title("Slides");
        assert_eq!(titled.display_title(), "Slides");
    }

    #[test]
    fn test_pending_file_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PendingFile::from_path(dir.path(), FileKind::Video).is_err());
    }

    #[test]
    fn test_uploaded_video_wire_format() {
        let file = PendingFile {
            path: PathBuf::from("intro.mp4"),
            file_name: "intro.mp4".into(),
            size: 42,
            mime_type: "video/mp4".into(),
            kind: FileKind::Video,
            title: Some("Intro".into()),
            description: None,
            duration_seconds: Some(90),
        };
        let json = serde_json::to_value(UploadedVideo::new(&file, "abc-123".into())).unwrap();
        assert_eq!(json["bunnyGuid"], "abc-123");
        assert_eq!(json["bunnyStatus"], 1);
        assert_eq!(json["fileSize"], 42);
        assert_eq!(json["durationSeconds"], 90);
    }

    #[test]
    fn test_envelope_error_text() {
        let env: ApiEnvelope<serde_json::Value> =
            serde_json::from_str(r#"{"success": false, "message": "Not authorized"}"#).unwrap();
        assert!(!env.success);
        assert_eq!(env.error_text(), Some("Not authorized"));
    }
}
