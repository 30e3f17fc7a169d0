//! REST types for the upload control surface.
//!
//! Responses use the same `{success, data, error}` envelope as the lesson API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::ServerError;
use crate::models::{ApiEnvelope, FileKind, LessonDraft, PendingFile, Release};
use crate::progress::{ProgressSnapshot, SessionState};

/// A local file named in a start request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSpec {
    pub path: PathBuf,
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration_seconds: Option<u32>,
}

impl FileSpec {
    fn into_pending(self, kind: FileKind) -> Result<PendingFile, ServerError> {
        let mut file = PendingFile::from_path(&self.path, kind).map_err(|e| {
            ServerError::BadRequest(format!("{}: {}", self.path.display(), e))
        })?;
        file.title = self.title;
        file.description = self.description;
        file.duration_seconds = self.duration_seconds;
        Ok(file)
    }
}

/// Body of `POST /api/uploads`.
///
/// Exactly one of `class_id` (create a lesson) or `lesson_id` (attach files to
/// an existing lesson) must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartUploadRequest {
    pub class_id: Option<String>,
    pub lesson_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub release_at: Option<DateTime<Utc>>,
    pub topic_id: Option<String>,
    pub max_watch_time_multiplier: Option<f64>,
    pub watermark_interval_mins: Option<u32>,
    pub videos: Vec<FileSpec>,
    pub documents: Vec<FileSpec>,
}

/// What a start request asks for.
#[derive(Debug, Clone)]
pub enum UploadTarget {
    NewLesson(LessonDraft),
    ExistingLesson { lesson_id: String, files: Vec<PendingFile> },
}

impl UploadTarget {
    pub fn files(&self) -> &[PendingFile] {
        match self {
            UploadTarget::NewLesson(draft) => &draft.files,
            UploadTarget::ExistingLesson { files, .. } => files,
        }
    }
}

impl StartUploadRequest {
    /// Resolve paths on disk and decide the target.
    pub fn into_target(self) -> Result<UploadTarget, ServerError> {
        let mut files = Vec::with_capacity(self.videos.len() + self.documents.len());
        for spec in self.videos {
            files.push(spec.into_pending(FileKind::Video)?);
        }
        for spec in self.documents {
            files.push(spec.into_pending(FileKind::Document)?);
        }

        match (self.class_id, self.lesson_id) {
            (Some(class_id), None) => {
                let mut draft = LessonDraft::new(class_id);
                draft.title = self.title;
                draft.description = self.description;
                draft.topic_id = self.topic_id;
                draft.release = self.release_at.map_or(Release::Immediate, Release::Scheduled);
                if let Some(m) = self.max_watch_time_multiplier {
                    draft.max_watch_time_multiplier = m;
                }
                if let Some(w) = self.watermark_interval_mins {
                    draft.watermark_interval_mins = w;
                }
                draft.files = files;
                Ok(UploadTarget::NewLesson(draft))
            }
            (None, Some(lesson_id)) => Ok(UploadTarget::ExistingLesson { lesson_id, files }),
            _ => Err(ServerError::BadRequest(
                "exactly one of classId or lessonId is required".to_string(),
            )),
        }
    }
}

/// Public view of an upload job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub job_id: Uuid,
    pub state: SessionState,
    pub progress: ProgressSnapshot,
    /// Lesson record returned by the API once persisted.
    pub lesson: Option<Value>,
    pub error: Option<String>,
}

/// Wrap data in a success envelope.
pub fn success_response<T: Serialize>(data: T) -> Value {
    serde_json::to_value(ApiEnvelope::ok(data)).unwrap_or(Value::Null)
}

/// Create an error envelope.
pub fn error_response(error: &str) -> Value {
    serde_json::to_value(ApiEnvelope::<Value>::err(error)).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_lesson_request() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("intro.mp4");
        let doc = dir.path().join("notes.pdf");
        std::fs::write(&video, b"1234").unwrap();
        std::fs::write(&doc, b"12").unwrap();

        let request: StartUploadRequest = serde_json::from_value(json!({
            "classId": "class-7",
            "title": "Week 1",
            "watermarkIntervalMins": 10,
            "videos": [{ "path": video, "title": "Intro" }],
            "documents": [{ "path": doc }]
        }))
        .unwrap();

        match request.into_target().unwrap() {
            UploadTarget::NewLesson(draft) => {
                assert_eq!(draft.class_id, "class-7");
                assert_eq!(draft.watermark_interval_mins, 10);
                assert_eq!(draft.max_watch_time_multiplier, 2.0);
                assert_eq!(draft.release, Release::Immediate);
                assert_eq!(draft.files.len(), 2);
                assert_eq!(draft.files[0].title.as_deref(), Some("Intro"));
                assert_eq!(draft.files[1].kind, FileKind::Document);
            }
            other => panic!("unexpected target {:?}", other),
        }
    }

    #[test]
    fn test_requires_exactly_one_target() {
        let both = StartUploadRequest {
            class_id: Some("c".into()),
            lesson_id: Some("l".into()),
            ..Default::default()
        };
        assert!(matches!(both.into_target(), Err(ServerError::BadRequest(_))));
        assert!(StartUploadRequest::default().into_target().is_err());
    }

    #[test]
    fn test_missing_file_is_bad_request() {
        let request = StartUploadRequest {
            lesson_id: Some("l".into()),
            documents: vec![FileSpec {
                path: PathBuf::from("/definitely/not/here.pdf"),
                title: None,
                description: None,
                duration_seconds: None,
            }],
            ..Default::default()
        };
        assert!(matches!(request.into_target(), Err(ServerError::BadRequest(_))));
    }

    #[test]
    fn test_envelopes() {
        let ok = success_response(json!({ "jobId": "x" }));
        assert_eq!(ok["success"], true);
        assert_eq!(ok["data"]["jobId"], "x");

        let err = error_response("nope");
        assert_eq!(err["success"], false);
        assert_eq!(err["error"], "nope");
    }
}
