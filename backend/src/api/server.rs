//! HTTP control surface for background uploads.
//!
//! Lets a local UI start lesson uploads, follow their progress and cancel
//! them. Each upload runs as its own tokio task with its own abort controller.
//!
//! # API Endpoints
//!
//! | Method | Path                          | Description                         |
//! |--------|-------------------------------|-------------------------------------|
//! | GET    | `/health`                     | Health check                        |
//! | GET    | `/api/logs`                   | SSE stream of log entries           |
//! | GET    | `/api/uploads`                | List upload jobs                    |
//! | POST   | `/api/uploads`                | Start an upload job                 |
//! | GET    | `/api/uploads/{id}`           | Job status                          |
//! | GET    | `/api/uploads/{id}/progress`  | SSE stream of progress snapshots    |
//! | DELETE | `/api/uploads/{id}`           | Cancel a job, or forget a finished one |
//!
//! Finished jobs stay listed for [`JOB_RETENTION`], then are dropped.

use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::get,
    Router,
};
use chrono::Utc;
use futures::stream::Stream;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use std::{convert::Infallible, net::SocketAddr};
use tokio::sync::watch;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use super::logs::{log_info, LOG_BROADCASTER};
use super::types::{error_response, success_response, JobView, StartUploadRequest, UploadTarget};
use crate::config::Config;
use crate::error::ServerError;
use crate::lesson::{validate, validate_files, LessonPublisher};
use crate::progress::{ProgressSnapshot, SessionState};
use crate::session::{AbortController, AbortSignal};

/// How long a finished job stays queryable.
pub const JOB_RETENTION: Duration = Duration::from_secs(10 * 60);

type Rejection = (StatusCode, Json<Value>);

struct Job {
    controller: AbortController,
    progress: watch::Receiver<ProgressSnapshot>,
    state: SessionState,
    lesson: Option<Value>,
    error: Option<String>,
    finished_at: Option<Instant>,
}

impl Job {
    fn view(&self, id: Uuid) -> JobView {
        JobView {
            job_id: id,
            state: self.state,
            progress: self.progress.borrow().clone(),
            lesson: self.lesson.clone(),
            error: self.error.clone(),
        }
    }
}

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    publisher: LessonPublisher,
    jobs: Arc<Mutex<HashMap<Uuid, Job>>>,
    retention: Duration,
}

impl AppState {
    pub fn new(publisher: LessonPublisher) -> Self {
        Self {
            publisher,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            retention: JOB_RETENTION,
        }
    }

    /// Override how long finished jobs are kept.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Drop finished jobs older than the retention window.
    fn prune(&self) {
        let retention = self.retention;
        self.jobs()
            .retain(|_, job| job.finished_at.map_or(true, |at| at.elapsed() < retention));
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<Uuid, Job>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn view(&self, id: Uuid) -> Result<JobView, ServerError> {
        self.jobs()
            .get(&id)
            .map(|job| job.view(id))
            .ok_or_else(|| ServerError::NotFound(id.to_string()))
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/logs", get(sse_logs))
        .route("/api/uploads", get(list_uploads).post(start_upload))
        .route("/api/uploads/{id}", get(get_upload).delete(cancel_upload))
        .route("/api/uploads/{id}/progress", get(sse_progress))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(port: u16, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::new(LessonPublisher::from_config(&config));
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    println!("🚀 Lessonload server running on http://localhost:{}", port);
    println!("   Lesson API: {}", config.api_url);
    println!("   POST   /api/uploads               - Start upload");
    println!("   GET    /api/uploads/{{id}}/progress - SSE progress stream");
    println!("   DELETE /api/uploads/{{id}}          - Cancel upload");
    println!("   GET    /api/logs                  - SSE log stream");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn reject(err: ServerError) -> Rejection {
    let status = match err {
        ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ServerError::NotFound(_) => StatusCode::NOT_FOUND,
    };
    (status, Json(error_response(&err.to_string())))
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "lessonload",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "uploads": "POST /api/uploads",
            "progress": "GET /api/uploads/{id}/progress (SSE)",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(LOG_BROADCASTER.subscribe()).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

async fn list_uploads(State(state): State<AppState>) -> Json<Value> {
    state.prune();
    let views: Vec<JobView> = state.jobs().iter().map(|(id, job)| job.view(*id)).collect();
    Json(success_response(views))
}

async fn start_upload(
    State(state): State<AppState>,
    Json(request): Json<StartUploadRequest>,
) -> Result<(StatusCode, Json<Value>), Rejection> {
    state.prune();
    let target = request.into_target().map_err(reject)?;

    // Validation failures never create a job.
    let checked = match &target {
        UploadTarget::NewLesson(draft) => validate(draft, Utc::now()),
        UploadTarget::ExistingLesson { files, .. } => validate_files(files),
    };
    checked.map_err(|e| reject(ServerError::BadRequest(e.to_string())))?;

    let files = target.files();
    let total: u64 = files.iter().map(|f| f.size).sum();
    let (tx, rx) = watch::channel(ProgressSnapshot::idle(total, files.len()));

    let id = Uuid::new_v4();
    let controller = AbortController::new();
    let signal = controller.signal();
    state.jobs().insert(
        id,
        Job {
            controller,
            progress: rx,
            state: SessionState::InProgress,
            lesson: None,
            error: None,
            finished_at: None,
        },
    );
    log_info(format!("Job {} accepted ({} file(s))", id, files.len()));

    tokio::spawn(run_job(state.clone(), id, target, signal, tx));

    let view = state.view(id).map_err(reject)?;
    Ok((StatusCode::ACCEPTED, Json(success_response(view))))
}

async fn run_job(
    state: AppState,
    id: Uuid,
    target: UploadTarget,
    signal: AbortSignal,
    progress: watch::Sender<ProgressSnapshot>,
) {
    let result = match &target {
        UploadTarget::NewLesson(draft) => {
            state.publisher.create_lesson(draft, &signal, &progress).await
        }
        UploadTarget::ExistingLesson { lesson_id, files } => {
            state.publisher.add_files(lesson_id, files, &signal, &progress).await
        }
    };

    let (final_state, lesson, error) = match result {
        Ok(lesson) => (SessionState::Completed, Some(lesson), None),
        Err(e) if e.is_aborted() => (SessionState::Aborted, None, None),
        Err(e) => (SessionState::Failed, None, Some(e.to_string())),
    };

    // Final snapshot carries the job state, including a failed save.
    progress.send_modify(|snapshot| snapshot.state = final_state);

    if let Some(job) = state.jobs().get_mut(&id) {
        job.state = final_state;
        job.lesson = lesson;
        job.error = error;
        job.finished_at = Some(Instant::now());
    }
}

async fn get_upload(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, Rejection> {
    let view = state.view(id).map_err(reject)?;
    Ok(Json(success_response(view)))
}

async fn cancel_upload(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, Rejection> {
    let mut jobs = state.jobs();
    let job = jobs
        .get(&id)
        .ok_or_else(|| reject(ServerError::NotFound(id.to_string())))?;

    if job.state.is_terminal() {
        let view = job.view(id);
        jobs.remove(&id);
        drop(jobs);
        log_info(format!("Job {} removed", id));
        return Ok(Json(success_response(view)));
    }

    job.controller.abort();
    let view = job.view(id);
    drop(jobs);
    log_info(format!("Job {} cancellation requested", id));
    Ok(Json(success_response(view)))
}

async fn sse_progress(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, Rejection> {
    let rx = state
        .jobs()
        .get(&id)
        .map(|job| job.progress.clone())
        .ok_or_else(|| reject(ServerError::NotFound(id.to_string())))?;

    // Ends once the job drops its sender.
    let stream = WatchStream::new(rx).filter_map(|snapshot| {
        let json = serde_json::to_string(&snapshot).ok()?;
        Some(Ok(Event::default().event("progress").data(json)))
    });

    Ok(Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new().interval(Duration::from_secs(15)),
    ))
}
