//! Video upload to the streaming-media host.
//!
//! A video is created on the host first (yielding its GUID), then the file is
//! streamed in a single `PUT` through the API proxy. Progress is the number of
//! bytes handed to the HTTP body so far.
//!
//! After upload the host transcodes asynchronously; [`StreamUploader::wait_for_ready`]
//! polls until the video is playable.

use async_trait::async_trait;
use futures::stream::{self, Stream};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Method};
use serde::Deserialize;
use serde_json::{json, Value};
use std::io;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

use super::client::error_message;
use super::{ApiClient, MediaUploader, TransferProgress, VideoUpload};
use crate::api::logs::{log_error, log_info_indent};
use crate::error::{TransportError, TransportResult};
use crate::models::VideoStatus;
use crate::session::abort::AbortSignal;

/// Read size for the streamed request body.
const READ_CHUNK: usize = 256 * 1024;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedVideo {
    video_guid: Option<String>,
}

/// Polling schedule for [`StreamUploader::wait_for_ready`].
#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            interval: Duration::from_secs(5),
        }
    }
}

/// [`MediaUploader`] backed by the streaming host proxy endpoints.
#[derive(Clone)]
pub struct StreamUploader {
    client: ApiClient,
}

impl StreamUploader {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    async fn create_video(&self, request: &VideoUpload<'_>) -> TransportResult<String> {
        let body = json!({
            "title": request.title,
            "fileName": request.file.file_name,
            "collectionName": request.collection_name,
        });
        let created: CreatedVideo = self.client.post("/bunny/video/create", &body).await?;

        created
            .video_guid
            .filter(|guid| !guid.is_empty())
            .ok_or_else(|| {
                TransportError::InvalidResponse(
                    "Failed to create video: no videoGuid returned from server".to_string(),
                )
            })
    }

    async fn put_video(&self, guid: &str, request: &VideoUpload<'_>) -> TransportResult<()> {
        let total = request.file.size;
        let file = File::open(&request.file.path).await?;

        let (tx, mut rx) = mpsc::unbounded_channel::<u64>();
        let body = Body::wrap_stream(read_chunks(file, tx));

        let send = self
            .client
            .request(Method::PUT, "/bunny/video/upload")
            .query(&[("videoGuid", guid)])
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, total)
            .body(body)
            .send();
        tokio::pin!(send);

        let response = loop {
            tokio::select! {
                response = &mut send => break response?,
                Some(loaded) = rx.recv() => {
                    (request.on_progress)(TransferProgress { loaded, total });
                }
            }
        };
        while let Ok(loaded) = rx.try_recv() {
            (request.on_progress)(TransferProgress { loaded, total });
        }

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        log_error(format!("Video upload {} failed with status {}", guid, status));
        Err(TransportError::Api(error_message(status, &text)))
    }

    /// Current transcode status of a video.
    pub async fn video_status(&self, guid: &str) -> TransportResult<VideoStatus> {
        self.client.get(&format!("/bunny/video/{}/status", guid)).await
    }

    /// Signed playback URLs for a ready video.
    pub async fn stream_urls(&self, guid: &str) -> TransportResult<Value> {
        self.client.get(&format!("/bunny/video/{}/stream", guid)).await
    }

    /// Poll until the video is ready.
    ///
    /// Returns `Ok(true)` once ready, `Ok(false)` when attempts run out, and an
    /// error when the host reports the transcode failed.
    pub async fn wait_for_ready<F>(
        &self,
        guid: &str,
        options: PollOptions,
        signal: &AbortSignal,
        on_status: F,
    ) -> TransportResult<bool>
    where
        F: Fn(&VideoStatus) + Send + Sync,
    {
        for attempt in 1..=options.max_attempts {
            let status = signal.race(self.video_status(guid)).await?;
            on_status(&status);

            if status.is_ready {
                return Ok(true);
            }
            if status.is_failed() {
                return Err(TransportError::Api("Video processing failed".to_string()));
            }
            if attempt < options.max_attempts {
                signal
                    .race(async {
                        tokio::time::sleep(options.interval).await;
                        Ok(())
                    })
                    .await?;
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl MediaUploader for StreamUploader {
    async fn upload_video(&self, request: VideoUpload<'_>) -> TransportResult<String> {
        let guid = request.signal.race(self.create_video(&request)).await?;
        log_info_indent(format!("{} → video {}", request.file.file_name, guid), 1);

        request.signal.race(self.put_video(&guid, &request)).await?;
        Ok(guid)
    }
}

/// File contents as a body stream, reporting the running byte count on `tx`.
fn read_chunks(
    file: File,
    tx: mpsc::UnboundedSender<u64>,
) -> impl Stream<Item = io::Result<Vec<u8>>> + Send + 'static {
    stream::try_unfold((file, 0u64, tx), |(mut file, sent, tx)| async move {
        let mut buf = vec![0u8; READ_CHUNK];
        let n = file.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        let sent = sent + n as u64;
        let _ = tx.send(sent);
        Ok(Some((buf, (file, sent, tx))))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_read_chunks_reports_running_total() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        let data = vec![7u8; READ_CHUNK + 10];
        std::fs::write(&path, &data).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let file = File::open(&path).await.unwrap();
        let chunks: Vec<Vec<u8>> = read_chunks(file, tx).try_collect().await.unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks.concat(), data);

        let mut totals = Vec::new();
        while let Ok(n) = rx.try_recv() {
            totals.push(n);
        }
        assert_eq!(totals, vec![READ_CHUNK as u64, READ_CHUNK as u64 + 10]);
    }

    #[test]
    fn test_poll_defaults() {
        let options = PollOptions::default();
        assert_eq!(options.max_attempts, 60);
        assert_eq!(options.interval, Duration::from_secs(5));
    }
}
