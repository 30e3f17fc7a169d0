//! Lessonload CLI - upload lesson media with live progress
//!
//! # Main Commands
//!
//! ```bash
//! lessonload upload --class <id> --video intro.mp4 --document notes.pdf
//! lessonload attach --lesson <id> --document extra.pdf
//! lessonload serve                  # Start HTTP control server (port 3100)
//! ```
//!
//! # Helper Commands
//!
//! ```bash
//! lessonload plan --video a.mp4 --document b.pdf   # Show upload order, no network
//! lessonload wait <video-guid>                     # Poll until transcode is ready
//! ```
//!
//! Ctrl-C cancels a running upload; nothing is committed and the exit code is 130.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use lessonload::api::logs::LOG_BROADCASTER;
use lessonload::transport::multipart::plan_parts;
use lessonload::{
    format_size, upload_order, AbortController, ApiClient, Config, FileKind, LessonDraft,
    LessonPublisher, PendingFile, PollOptions, ProgressObserver, ProgressSnapshot, Release,
    StreamUploader, EXIT_ABORTED, EXIT_FAILURE,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "lessonload")]
#[command(about = "Upload lesson videos and documents with aggregate progress", long_about = None)]
struct Cli {
    /// Lesson API base URL (overrides LESSONLOAD_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Bearer token (overrides LESSONLOAD_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Video collection name (overrides LESSONLOAD_COLLECTION)
    #[arg(long, global = true)]
    collection: Option<String>,

    /// Do not echo pipeline logs to stdout
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a lesson from local videos and documents
    Upload {
        /// Class the lesson belongs to
        #[arg(long)]
        class: String,

        /// Lesson title (default: today's date)
        #[arg(short, long)]
        title: Option<String>,

        /// Lesson description
        #[arg(short, long)]
        description: Option<String>,

        /// Video file (repeatable)
        #[arg(long = "video")]
        videos: Vec<PathBuf>,

        /// Document file (repeatable)
        #[arg(long = "document")]
        documents: Vec<PathBuf>,

        /// Scheduled release, RFC 3339 (default: publish immediately)
        #[arg(long)]
        release_at: Option<DateTime<Utc>>,

        /// Topic to file the lesson under
        #[arg(long)]
        topic: Option<String>,

        /// Max watch time as a multiple of video length
        #[arg(long, default_value = "2.0")]
        max_watch_time_multiplier: f64,

        /// Minutes between watermark appearances
        #[arg(long, default_value = "5")]
        watermark_interval_mins: u32,
    },

    /// Upload files and attach them to an existing lesson
    Attach {
        /// Lesson to attach to
        #[arg(long)]
        lesson: String,

        /// Video file (repeatable)
        #[arg(long = "video")]
        videos: Vec<PathBuf>,

        /// Document file (repeatable)
        #[arg(long = "document")]
        documents: Vec<PathBuf>,
    },

    /// Show upload order and sizes without transferring anything
    Plan {
        /// Video file (repeatable)
        #[arg(long = "video")]
        videos: Vec<PathBuf>,

        /// Document file (repeatable)
        #[arg(long = "document")]
        documents: Vec<PathBuf>,
    },

    /// Wait for an uploaded video to finish transcoding
    Wait {
        /// Video GUID returned by the upload
        guid: String,

        /// Maximum number of status checks
        #[arg(long, default_value = "60")]
        attempts: u32,

        /// Seconds between checks
        #[arg(long, default_value = "5")]
        interval: u64,
    },

    /// Start HTTP control server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3100")]
        port: u16,
    },
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    if cli.quiet {
        LOG_BROADCASTER.set_echo(false);
    }

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            std::process::exit(EXIT_FAILURE);
        }
    };

    let result = match cli.command {
        Commands::Upload {
            class,
            title,
            description,
            videos,
            documents,
            release_at,
            topic,
            max_watch_time_multiplier,
            watermark_interval_mins,
        } => {
            let draft = collect_files(&videos, &documents).map(|files| LessonDraft {
                class_id: class,
                title,
                description,
                release: release_at.map_or(Release::Immediate, Release::Scheduled),
                topic_id: topic,
                max_watch_time_multiplier,
                watermark_interval_mins,
                files,
            });
            match draft {
                Ok(draft) => cmd_upload(&config, draft).await,
                Err(e) => Err(e),
            }
        }

        Commands::Attach { lesson, videos, documents } => {
            match collect_files(&videos, &documents) {
                Ok(files) => cmd_attach(&config, &lesson, files).await,
                Err(e) => Err(e),
            }
        }

        Commands::Plan { videos, documents } => cmd_plan(&config, &videos, &documents),

        Commands::Wait { guid, attempts, interval } => {
            cmd_wait(&config, &guid, attempts, interval).await
        }

        Commands::Serve { port } => lessonload::server::start_server(port, config).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(EXIT_FAILURE);
    }
}

fn build_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = Config::from_env()?;
    if let Some(url) = &cli.api_url {
        config = config.with_api_url(url)?;
    }
    if let Some(token) = &cli.token {
        config = config.with_token(token.as_str());
    }
    if let Some(collection) = &cli.collection {
        config = config.with_collection(collection.as_str());
    }
    Ok(config)
}

fn collect_files(
    videos: &[PathBuf],
    documents: &[PathBuf],
) -> Result<Vec<PendingFile>, Box<dyn std::error::Error>> {
    let videos = videos.iter().map(|p| (p, FileKind::Video));
    let documents = documents.iter().map(|p| (p, FileKind::Document));

    videos
        .chain(documents)
        .map(|(path, kind)| {
            PendingFile::from_path(path, kind).map_err(|e| -> Box<dyn std::error::Error> {
                format!("{}: {}", path.display(), e).into()
            })
        })
        .collect()
}

/// Progress line on stderr, rewritten in place.
struct ConsoleProgress;

impl ProgressObserver for ConsoleProgress {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        eprint!("\r   ⏳ {:<50}", snapshot.summary());
    }

    fn on_finished(&self, snapshot: &ProgressSnapshot) {
        eprintln!("\r   ⏳ {:<50}", snapshot.summary());
    }
}

/// Abort controller fired by Ctrl-C.
fn cancel_on_ctrl_c() -> AbortController {
    let controller = AbortController::new();
    let trigger = controller.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n⏹  Cancelling...");
            trigger.abort();
        }
    });
    controller
}

/// Cancellation is not an error: report it quietly and exit 130.
fn exit_if_aborted(exit_code: i32, notice: &str) {
    if exit_code == EXIT_ABORTED {
        eprintln!("⏹  {}", notice);
        std::process::exit(EXIT_ABORTED);
    }
}

const UPLOAD_CANCELLED: &str = "Upload cancelled, nothing was saved.";

async fn cmd_upload(config: &Config, draft: LessonDraft) -> CliResult {
    eprintln!("📚 New lesson for class {}", draft.class_id);

    let publisher = LessonPublisher::from_config(config);
    let controller = cancel_on_ctrl_c();

    match publisher.create_lesson(&draft, &controller.signal(), &ConsoleProgress).await {
        Ok(lesson) => {
            eprintln!("\n✨ Done!");
            println!("{}", serde_json::to_string_pretty(&lesson)?);
            Ok(())
        }
        Err(e) => {
            exit_if_aborted(e.exit_code(), UPLOAD_CANCELLED);
            Err(e.into())
        }
    }
}

async fn cmd_attach(config: &Config, lesson_id: &str, files: Vec<PendingFile>) -> CliResult {
    eprintln!("📎 Attaching {} file(s) to lesson {}", files.len(), lesson_id);

    let publisher = LessonPublisher::from_config(config);
    let controller = cancel_on_ctrl_c();

    match publisher
        .add_files(lesson_id, &files, &controller.signal(), &ConsoleProgress)
        .await
    {
        Ok(result) => {
            eprintln!("\n✨ Done!");
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e) => {
            exit_if_aborted(e.exit_code(), UPLOAD_CANCELLED);
            Err(e.into())
        }
    }
}

fn cmd_plan(config: &Config, videos: &[PathBuf], documents: &[PathBuf]) -> CliResult {
    let files = collect_files(videos, documents)?;
    let queue = upload_order(&files);
    let total: u64 = queue.iter().map(|f| f.size).sum();

    println!("📋 Upload plan ({} file(s), {})\n", queue.len(), format_size(total));

    let mut done = 0u64;
    for (i, file) in queue.iter().enumerate() {
        done += file.size;
        let route = match file.kind {
            FileKind::Video => "stream".to_string(),
            FileKind::Document => format!(
                "multipart, {} part(s)",
                plan_parts(file.size, config.chunk_size).len()
            ),
        };
        let after = if total == 0 { 100.0 } else { done as f64 / total as f64 * 100.0 };
        println!(
            "  {}. {} [{}] {} via {} → {:.2}%",
            i + 1,
            file.file_name,
            file.kind,
            format_size(file.size),
            route,
            after
        );
    }

    Ok(())
}

async fn cmd_wait(config: &Config, guid: &str, attempts: u32, interval: u64) -> CliResult {
    let uploader = StreamUploader::new(ApiClient::new(config));
    let controller = cancel_on_ctrl_c();
    let options = PollOptions {
        max_attempts: attempts,
        interval: Duration::from_secs(interval),
    };

    eprintln!("🎬 Waiting for video {}", guid);
    let polled = uploader
        .wait_for_ready(guid, options, &controller.signal(), |status| {
            eprintln!("   {} (status {})", status.status_text, status.status);
        })
        .await;
    let ready = match polled {
        Ok(ready) => ready,
        Err(e) => {
            exit_if_aborted(e.exit_code(), "Stopped waiting.");
            return Err(e.into());
        }
    };

    if !ready {
        return Err(format!("Video {} not ready after {} checks", guid, attempts).into());
    }

    eprintln!("✅ Video ready");
    let urls = uploader.stream_urls(guid).await?;
    println!("{}", serde_json::to_string_pretty(&urls)?);
    Ok(())
}
