//! Upload session: one batch of lesson files, transferred in order.
//!
//! ```text
//! Idle ──▶ InProgress ──┬──▶ Completed
//!            ▲   │      ├──▶ Aborted   (abort signal)
//!            └───┘      └──▶ Failed    (transport error)
//!        (next file)
//! ```
//!
//! Videos go first, then documents, each group in the order given. Exactly one
//! transfer is in flight at a time and the first failure abandons the rest of
//! the queue. There are no retries; a failed session is discarded.

pub mod abort;

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};

use crate::api::logs::{log_error, log_info, log_success, log_warning};
use crate::config::{Config, DOCUMENT_FOLDER};
use crate::error::{TransportError, TransportResult};
use crate::models::{FileKind, PendingFile, UploadedDocument, UploadedFiles, UploadedVideo};
use crate::progress::{format_size, ProgressSnapshot, ProgressTracker, SessionState};
use crate::transport::{
    ApiClient, MediaUploader, MultipartUploader, ObjectUpload, ObjectUploader, StreamUploader,
    TransferProgress, VideoUpload,
};

pub use abort::{AbortController, AbortSignal};

// =============================================================================
// Observers
// =============================================================================

/// Receives session progress. All methods default to no-ops.
pub trait ProgressObserver: Send + Sync {
    /// Called after every transport progress callback.
    fn on_progress(&self, _snapshot: &ProgressSnapshot) {}

    /// Called before a file starts transferring.
    fn on_file_started(&self, _index: usize, _file: &PendingFile) {}

    /// Called after a file finished; the snapshot includes its full size.
    fn on_file_completed(&self, _index: usize, _snapshot: &ProgressSnapshot) {}

    /// Called once with the terminal snapshot.
    fn on_finished(&self, _snapshot: &ProgressSnapshot) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {}

/// Publishes the latest snapshot on a watch channel.
impl ProgressObserver for watch::Sender<ProgressSnapshot> {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self.send_replace(snapshot.clone());
    }

    fn on_file_completed(&self, _index: usize, snapshot: &ProgressSnapshot) {
        self.send_replace(snapshot.clone());
    }

    fn on_finished(&self, snapshot: &ProgressSnapshot) {
        self.send_replace(snapshot.clone());
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Terminal result of a session.
#[derive(Debug)]
pub enum SessionOutcome {
    /// Every file transferred.
    Completed(UploadedFiles),
    /// The abort signal fired. Nothing is committed.
    Aborted,
    /// A transfer failed; the remaining queue never started.
    Failed(TransportError),
}

impl SessionOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            SessionOutcome::Completed(_) => SessionState::Completed,
            SessionOutcome::Aborted => SessionState::Aborted,
            SessionOutcome::Failed(_) => SessionState::Failed,
        }
    }

    /// Convert into a result, mapping an abort to [`TransportError::Aborted`].
    pub fn into_result(self) -> TransportResult<UploadedFiles> {
        match self {
            SessionOutcome::Completed(files) => Ok(files),
            SessionOutcome::Aborted => Err(TransportError::Aborted),
            SessionOutcome::Failed(e) => Err(e),
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// Videos first, then documents; order within each kind is preserved.
pub fn upload_order(files: &[PendingFile]) -> Vec<&PendingFile> {
    let videos = files.iter().filter(|f| f.kind == FileKind::Video);
    let documents = files.iter().filter(|f| f.kind == FileKind::Document);
    videos.chain(documents).collect()
}

/// Orchestrates the two transports for one batch of files.
#[derive(Clone)]
pub struct UploadSession {
    media: Arc<dyn MediaUploader>,
    storage: Arc<dyn ObjectUploader>,
    collection_name: Option<String>,
    document_folder: String,
}

impl UploadSession {
    pub fn new(media: Arc<dyn MediaUploader>, storage: Arc<dyn ObjectUploader>) -> Self {
        Self {
            media,
            storage,
            collection_name: None,
            document_folder: DOCUMENT_FOLDER.to_string(),
        }
    }

    /// Session wired to the REST transports described by `config`.
    pub fn from_config(config: &Config) -> Self {
        let client = ApiClient::new(config);
        let media = Arc::new(StreamUploader::new(client.clone()));
        let storage = Arc::new(MultipartUploader::new(client, config));

        let mut session = Self::new(media, storage);
        session.collection_name = config.collection.clone();
        session.document_folder = config.document_folder.clone();
        session
    }

    /// Transfer `files`, reporting to `observer`, until done, aborted or failed.
    pub async fn run(
        &self,
        files: &[PendingFile],
        signal: &AbortSignal,
        observer: &dyn ProgressObserver,
    ) -> SessionOutcome {
        let queue = upload_order(files);
        let sizes: Vec<u64> = queue.iter().map(|f| f.size).collect();
        let mut tracker = ProgressTracker::new(&sizes, Instant::now());
        tracker.start(Instant::now());

        log_info(format!(
            "📤 Uploading {} file(s), {}",
            queue.len(),
            format_size(tracker.total_size())
        ));

        let mut uploaded = UploadedFiles::default();

        for (index, file) in queue.iter().enumerate() {
            if signal.is_aborted() {
                return finish(&mut tracker, observer, SessionOutcome::Aborted);
            }

            tracker.begin_file(index, &file.file_name);
            observer.on_file_started(index, file);
            log_info(format!("[{}/{}] {} ({})", index + 1, queue.len(), file.file_name, file.kind));

            let result = match file.kind {
                FileKind::Video => self
                    .transfer_video(file, signal, &mut tracker, observer)
                    .await
                    .map(|guid| uploaded.videos.push(UploadedVideo::new(file, guid))),
                FileKind::Document => self
                    .transfer_document(file, signal, &mut tracker, observer)
                    .await
                    .map(|path| uploaded.documents.push(UploadedDocument::new(file, path))),
            };

            match result {
                Ok(()) => {
                    let snapshot = tracker.finish_file(file.size);
                    observer.on_file_completed(index, &snapshot);
                }
                // A transport torn down by the abort may surface as any error.
                Err(e) if e.is_aborted() || signal.is_aborted() => {
                    return finish(&mut tracker, observer, SessionOutcome::Aborted);
                }
                Err(e) => {
                    return finish(&mut tracker, observer, SessionOutcome::Failed(e));
                }
            }
        }

        finish(&mut tracker, observer, SessionOutcome::Completed(uploaded))
    }

    async fn transfer_video(
        &self,
        file: &PendingFile,
        signal: &AbortSignal,
        tracker: &mut ProgressTracker,
        observer: &dyn ProgressObserver,
    ) -> TransportResult<String> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let report = move |p: TransferProgress| {
            let _ = tx.send(p.loaded);
        };
        let upload = self.media.upload_video(VideoUpload {
            file,
            title: file.display_title(),
            collection_name: self.collection_name.as_deref(),
            on_progress: &report,
            signal,
        });
        drive(upload, &mut rx, tracker, observer).await
    }

    async fn transfer_document(
        &self,
        file: &PendingFile,
        signal: &AbortSignal,
        tracker: &mut ProgressTracker,
        observer: &dyn ProgressObserver,
    ) -> TransportResult<String> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let report = move |p: TransferProgress| {
            let _ = tx.send(p.loaded);
        };
        let upload = self.storage.upload_object(ObjectUpload {
            file,
            folder: &self.document_folder,
            on_progress: &report,
            signal,
        });
        drive(upload, &mut rx, tracker, observer).await
    }
}

/// Poll one transfer to completion, folding its progress into the tracker.
///
/// Progress arrives over a channel so the tracker stays owned by this task.
async fn drive<F, T>(
    upload: F,
    progress: &mut mpsc::UnboundedReceiver<u64>,
    tracker: &mut ProgressTracker,
    observer: &dyn ProgressObserver,
) -> TransportResult<T>
where
    F: std::future::Future<Output = TransportResult<T>>,
{
    tokio::pin!(upload);

    let result = loop {
        tokio::select! {
            result = &mut upload => break result,
            Some(loaded) = progress.recv() => {
                observer.on_progress(&tracker.on_progress(loaded, Instant::now()));
            }
        }
    };

    while let Ok(loaded) = progress.try_recv() {
        observer.on_progress(&tracker.on_progress(loaded, Instant::now()));
    }
    result
}

fn finish(
    tracker: &mut ProgressTracker,
    observer: &dyn ProgressObserver,
    outcome: SessionOutcome,
) -> SessionOutcome {
    let snapshot = match &outcome {
        SessionOutcome::Completed(files) => {
            log_success(format!(
                "Upload complete: {} video(s), {} document(s)",
                files.videos.len(),
                files.documents.len()
            ));
            tracker.complete()
        }
        SessionOutcome::Aborted => {
            log_warning("Upload cancelled");
            tracker.abort()
        }
        SessionOutcome::Failed(e) => {
            log_error(format!("Upload failed: {}", e));
            tracker.fail()
        }
    };
    observer.on_finished(&snapshot);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    const MB: u64 = 1024 * 1024;

    fn file(name: &str, size: u64, kind: FileKind) -> PendingFile {
        PendingFile {
            path: PathBuf::from(name),
            file_name: name.to_string(),
            size,
            mime_type: "application/octet-stream".to_string(),
            kind,
            title: None,
            description: None,
            duration_seconds: None,
        }
    }

    /// In-memory transport for both kinds. Reports progress in two halves,
    /// can fail or fire the abort controller on a given file name.
    #[derive(Default)]
    struct FakeTransport {
        started: Mutex<Vec<String>>,
        fail_on: Option<String>,
        abort_on: Option<(String, AbortController)>,
    }

    impl FakeTransport {
        async fn transfer(
            &self,
            file: &PendingFile,
            on_progress: &(dyn Fn(TransferProgress) + Send + Sync),
            signal: &AbortSignal,
        ) -> TransportResult<String> {
            signal.check()?;
            self.started.lock().unwrap().push(file.file_name.clone());

            on_progress(TransferProgress { loaded: file.size / 2, total: file.size });

            if let Some((name, controller)) = &self.abort_on {
                if *name == file.file_name {
                    controller.abort();
                    // Pends until the race observes the signal.
                    return signal
                        .race(futures::future::pending::<TransportResult<String>>())
                        .await;
                }
            }
            if self.fail_on.as_deref() == Some(file.file_name.as_str()) {
                return Err(TransportError::Api("connection reset".into()));
            }

            on_progress(TransferProgress { loaded: file.size, total: file.size });
            Ok(format!("remote/{}", file.file_name))
        }

        fn started(&self) -> Vec<String> {
            self.started.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MediaUploader for FakeTransport {
        async fn upload_video(&self, request: VideoUpload<'_>) -> TransportResult<String> {
            self.transfer(request.file, request.on_progress, request.signal).await
        }
    }

    #[async_trait]
    impl ObjectUploader for FakeTransport {
        async fn upload_object(&self, request: ObjectUpload<'_>) -> TransportResult<String> {
            self.transfer(request.file, request.on_progress, request.signal).await
        }
    }

    #[derive(Default)]
    struct Recorder {
        progress: Mutex<Vec<f64>>,
        completed: Mutex<Vec<f64>>,
        finished: Mutex<Option<ProgressSnapshot>>,
    }

    impl ProgressObserver for Recorder {
        fn on_progress(&self, snapshot: &ProgressSnapshot) {
            self.progress.lock().unwrap().push(snapshot.percentage);
        }

        fn on_file_completed(&self, _index: usize, snapshot: &ProgressSnapshot) {
            self.completed.lock().unwrap().push(snapshot.percentage);
        }

        fn on_finished(&self, snapshot: &ProgressSnapshot) {
            *self.finished.lock().unwrap() = Some(snapshot.clone());
        }
    }

    fn session(transport: Arc<FakeTransport>) -> UploadSession {
        UploadSession::new(transport.clone(), transport)
    }

    #[tokio::test]
    async fn test_three_files_report_cumulative_percentages() {
        let transport = Arc::new(FakeTransport::default());
        let files = vec![
            file("a.mp4", 10 * MB, FileKind::Video),
            file("b.mp4", 5 * MB, FileKind::Video),
            file("c.pdf", MB, FileKind::Document),
        ];
        let recorder = Recorder::default();

        let outcome = session(transport.clone())
            .run(&files, &AbortSignal::never(), &recorder)
            .await;

        let uploaded = outcome.into_result().unwrap();
        assert_eq!(uploaded.videos.len(), 2);
        assert_eq!(uploaded.documents[0].storage_path, "remote/c.pdf");
        assert_eq!(*recorder.completed.lock().unwrap(), vec![62.5, 93.75, 100.0]);

        let progress = recorder.progress.lock().unwrap().clone();
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert!(progress.iter().all(|p| (0.0..=100.0).contains(p)));

        let finished = recorder.finished.lock().unwrap().clone().unwrap();
        assert_eq!(finished.state, SessionState::Completed);
        assert_eq!(finished.percentage, 100.0);
    }

    #[tokio::test]
    async fn test_videos_upload_before_documents() {
        let transport = Arc::new(FakeTransport::default());
        let files = vec![
            file("syllabus.pdf", 10, FileKind::Document),
            file("intro.mp4", 10, FileKind::Video),
            file("exercises.pdf", 10, FileKind::Document),
            file("outro.mp4", 10, FileKind::Video),
        ];

        session(transport.clone())
            .run(&files, &AbortSignal::never(), &NoopObserver)
            .await
            .into_result()
            .unwrap();

        assert_eq!(
            transport.started(),
            vec!["intro.mp4", "outro.mp4", "syllabus.pdf", "exercises.pdf"]
        );
    }

    #[tokio::test]
    async fn test_zero_files_complete_immediately() {
        let transport = Arc::new(FakeTransport::default());
        let recorder = Recorder::default();

        let outcome = session(transport.clone())
            .run(&[], &AbortSignal::never(), &recorder)
            .await;

        assert!(matches!(outcome, SessionOutcome::Completed(ref f) if f.is_empty()));
        let finished = recorder.finished.lock().unwrap().clone().unwrap();
        assert_eq!(finished.percentage, 100.0);
        assert!(transport.started().is_empty());
    }

    #[tokio::test]
    async fn test_abort_mid_queue_stops_remaining_files() {
        let controller = AbortController::new();
        let transport = Arc::new(FakeTransport {
            abort_on: Some(("b.mp4".into(), controller.clone())),
            ..Default::default()
        });
        let files = vec![
            file("a.mp4", 100, FileKind::Video),
            file("b.mp4", 100, FileKind::Video),
            file("c.pdf", 100, FileKind::Document),
        ];
        let recorder = Recorder::default();

        let outcome = session(transport.clone())
            .run(&files, &controller.signal(), &recorder)
            .await;

        assert_eq!(outcome.state(), SessionState::Aborted);
        assert_eq!(transport.started(), vec!["a.mp4", "b.mp4"]);
        let finished = recorder.finished.lock().unwrap().clone().unwrap();
        assert_eq!(finished.state, SessionState::Aborted);
    }

    #[tokio::test]
    async fn test_pre_aborted_session_starts_nothing() {
        let controller = AbortController::new();
        controller.abort();
        let transport = Arc::new(FakeTransport::default());

        let outcome = session(transport.clone())
            .run(&[file("a.mp4", 1, FileKind::Video)], &controller.signal(), &NoopObserver)
            .await;

        assert!(matches!(outcome, SessionOutcome::Aborted));
        assert!(transport.started().is_empty());
    }

    #[tokio::test]
    async fn test_failure_abandons_queue() {
        let transport = Arc::new(FakeTransport {
            fail_on: Some("a.mp4".into()),
            ..Default::default()
        });
        let files = vec![
            file("a.mp4", 100, FileKind::Video),
            file("b.pdf", 100, FileKind::Document),
        ];

        let outcome = session(transport.clone())
            .run(&files, &AbortSignal::never(), &NoopObserver)
            .await;

        assert_eq!(outcome.state(), SessionState::Failed);
        assert!(matches!(outcome, SessionOutcome::Failed(TransportError::Api(_))));
        assert_eq!(transport.started(), vec!["a.mp4"]);
    }

    #[tokio::test]
    async fn test_watch_sender_publishes_latest_snapshot() {
        let transport = Arc::new(FakeTransport::default());
        let (tx, rx) = watch::channel(ProgressSnapshot::idle(0, 0));

        session(transport)
            .run(&[file("a.pdf", 64, FileKind::Document)], &AbortSignal::never(), &tx)
            .await;

        let latest = rx.borrow().clone();
        assert_eq!(latest.state, SessionState::Completed);
        assert_eq!(latest.uploaded_bytes, 64);
    }
}
