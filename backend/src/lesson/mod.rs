//! Lesson workflow: validate, upload, persist.
//!
//! # Example
//!
//! ```rust,ignore
//! use lessonload::{Config, FileKind, LessonDraft, LessonPublisher, PendingFile};
//! use lessonload::session::{AbortController, NoopObserver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let publisher = LessonPublisher::from_config(&Config::from_env()?);
//!     let draft = LessonDraft::new("class-42")
//!         .with_file(PendingFile::from_path("intro.mp4", FileKind::Video)?);
//!
//!     let controller = AbortController::new();
//!     let lesson = publisher.create_lesson(&draft, &controller.signal(), &NoopObserver).await?;
//!     println!("Created lesson {}", lesson["id"]);
//!     Ok(())
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::api::logs::{log_info, log_success};
use crate::config::Config;
use crate::error::{LessonError, LessonResult, TransportError, ValidationError};
use crate::models::{LessonDraft, PendingFile, Release, UploadedDocument, UploadedFiles, UploadedVideo};
use crate::session::{AbortSignal, ProgressObserver, SessionOutcome, UploadSession};
use crate::transport::ApiClient;

/// Payload for `POST /lessons/create-with-uploaded`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLessonRequest<'a> {
    class_id: &'a str,
    title: String,
    description: Option<&'a str>,
    release_date: String,
    topic_id: Option<&'a str>,
    max_watch_time_multiplier: f64,
    watermark_interval_mins: u32,
    videos: &'a [UploadedVideo],
    documents: &'a [UploadedDocument],
}

/// Payload for `POST /lessons/{id}/add-files`.
#[derive(Debug, Serialize)]
struct AddFilesRequest<'a> {
    videos: &'a [UploadedVideo],
    documents: &'a [UploadedDocument],
}

/// Check a draft before any byte is transferred.
pub fn validate(draft: &LessonDraft, now: DateTime<Utc>) -> Result<(), ValidationError> {
    if draft.class_id.trim().is_empty() {
        return Err(ValidationError::MissingField("class_id"));
    }
    if let Release::Scheduled(at) = draft.release {
        if at < now {
            return Err(ValidationError::ReleaseInPast(at.to_rfc3339()));
        }
    }
    validate_files(&draft.files)
}

/// Every file must still exist as a regular file; at least one is required.
pub fn validate_files(files: &[PendingFile]) -> Result<(), ValidationError> {
    if files.is_empty() {
        return Err(ValidationError::NoFiles);
    }
    for file in files {
        match std::fs::metadata(&file.path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(ValidationError::NotAFile(file.path.clone())),
            Err(_) => return Err(ValidationError::MissingFile(file.path.clone())),
        }
    }
    Ok(())
}

/// Title used when none is given, e.g. `16 October 2026`.
pub fn default_title(now: DateTime<Utc>) -> String {
    now.format("%-d %B %Y").to_string()
}

/// Runs upload sessions and records the result against the REST API.
#[derive(Clone)]
pub struct LessonPublisher {
    client: ApiClient,
    session: UploadSession,
}

impl LessonPublisher {
    pub fn new(client: ApiClient, session: UploadSession) -> Self {
        Self { client, session }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(ApiClient::new(config), UploadSession::from_config(config))
    }

    /// Upload the draft's files, then create the lesson that references them.
    ///
    /// Returns the lesson record as sent back by the API.
    pub async fn create_lesson(
        &self,
        draft: &LessonDraft,
        signal: &AbortSignal,
        observer: &dyn ProgressObserver,
    ) -> LessonResult<Value> {
        let now = Utc::now();
        validate(draft, now)?;

        let uploaded = self.upload(&draft.files, signal, observer).await?;

        let title = draft
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| default_title(now));

        let request = CreateLessonRequest {
            class_id: &draft.class_id,
            title,
            description: draft.description.as_deref(),
            release_date: draft.release.timestamp(now).to_rfc3339(),
            topic_id: draft.topic_id.as_deref().filter(|t| !t.is_empty()),
            max_watch_time_multiplier: draft.max_watch_time_multiplier,
            watermark_interval_mins: draft.watermark_interval_mins,
            videos: &uploaded.videos,
            documents: &uploaded.documents,
        };

        let lesson: Value = signal
            .race(self.client.post("/lessons/create-with-uploaded", &request))
            .await
            .map_err(persist_error)?;

        log_success(format!("Lesson \"{}\" created", request.title));
        Ok(lesson)
    }

    /// Upload additional files and attach them to an existing lesson.
    pub async fn add_files(
        &self,
        lesson_id: &str,
        files: &[PendingFile],
        signal: &AbortSignal,
        observer: &dyn ProgressObserver,
    ) -> LessonResult<Value> {
        if lesson_id.trim().is_empty() {
            return Err(ValidationError::MissingField("lesson_id").into());
        }
        validate_files(files)?;

        let uploaded = self.upload(files, signal, observer).await?;
        let request = AddFilesRequest {
            videos: &uploaded.videos,
            documents: &uploaded.documents,
        };

        let result: Value = signal
            .race(self.client.post(&format!("/lessons/{}/add-files", lesson_id), &request))
            .await
            .map_err(persist_error)?;

        log_success(format!("Attached {} file(s) to lesson {}", files.len(), lesson_id));
        Ok(result)
    }

    async fn upload(
        &self,
        files: &[PendingFile],
        signal: &AbortSignal,
        observer: &dyn ProgressObserver,
    ) -> LessonResult<UploadedFiles> {
        log_info(format!("Starting upload session for {} file(s)", files.len()));
        match self.session.run(files, signal, observer).await {
            SessionOutcome::Completed(uploaded) => Ok(uploaded),
            SessionOutcome::Aborted => Err(LessonError::Aborted),
            SessionOutcome::Failed(e) => Err(LessonError::Upload(e)),
        }
    }
}

fn persist_error(err: TransportError) -> LessonError {
    match err {
        TransportError::Aborted => LessonError::Aborted,
        other => LessonError::Persist(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileKind;
    use chrono::{Duration, TimeZone};

    fn draft_with_file() -> (tempfile::TempDir, LessonDraft) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intro.mp4");
        std::fs::write(&path, b"video").unwrap();
        let draft = LessonDraft::new("class-1")
            .with_file(PendingFile::from_path(&path, FileKind::Video).unwrap());
        (dir, draft)
    }

    #[test]
    fn test_rejects_draft_without_files() {
        let draft = LessonDraft::new("class-1");
        assert!(matches!(validate(&draft, Utc::now()), Err(ValidationError::NoFiles)));
    }

    #[test]
    fn test_rejects_release_in_the_past() {
        let (_dir, mut draft) = draft_with_file();
        let now = Utc::now();
        draft.release = Release::Scheduled(now - Duration::hours(1));
        assert!(matches!(validate(&draft, now), Err(ValidationError::ReleaseInPast(_))));

        draft.release = Release::Scheduled(now + Duration::hours(1));
        assert!(validate(&draft, now).is_ok());
    }

    #[test]
    fn test_rejects_file_removed_after_selection() {
        let (dir, draft) = draft_with_file();
        drop(dir);
        assert!(matches!(
            validate(&draft, Utc::now()),
            Err(ValidationError::MissingFile(_))
        ));
    }

    #[test]
    fn test_default_title_uses_long_date() {
        let now = Utc.with_ymd_and_hms(2026, 10, 6, 9, 0, 0).unwrap();
        assert_eq!(default_title(now), "6 October 2026");
    }

    #[test]
    fn test_persist_error_keeps_abort_distinct() {
        assert!(persist_error(TransportError::Aborted).is_aborted());
        assert!(matches!(
            persist_error(TransportError::Api("boom".into())),
            LessonError::Persist(_)
        ));
    }
}
