//! Chunked multipart upload to object storage.
//!
//! ```text
//! init ──▶ parts (batches of N in parallel) ──▶ complete
//!   │                    │ error / abort
//!   │                    ▼
//!   └──────────────▶ remote abort (best effort) ──▶ original error
//! ```
//!
//! Progress is the running total of acknowledged part bytes, so within a
//! batch it advances in completion order, never backwards.

use async_trait::async_trait;
use futures::future;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{self, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::{ApiClient, ObjectUpload, ObjectUploader, TransferProgress};
use crate::api::logs::{log_info_indent, log_warning};
use crate::config::Config;
use crate::error::{TransportError, TransportResult};

/// Byte range of one part. Part numbers start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
    pub part_number: u32,
    pub start: u64,
    pub end: u64,
}

impl PartRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Most parts a single upload may have.
pub const MAX_PARTS: u64 = 10_000;

/// Split `size` bytes into `chunk_size` parts; the last part takes the rest.
///
/// The chunk grows when needed to stay within [`MAX_PARTS`]. An empty file
/// still gets one empty part so the upload can be completed.
pub fn plan_parts(size: u64, chunk_size: u64) -> Vec<PartRange> {
    if size == 0 {
        return vec![PartRange { part_number: 1, start: 0, end: 0 }];
    }

    let chunk = chunk_size.max(size.div_ceil(MAX_PARTS)).max(1);
    (0..size.div_ceil(chunk))
        .map(|i| {
            // i < ceil(size / chunk), so i * chunk < size.
            let start = i * chunk;
            PartRange {
                part_number: (i + 1) as u32,
                start,
                end: start.saturating_add(chunk).min(size),
            }
        })
        .collect()
}

/// Identifiers of a multipart upload opened on the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteUpload {
    upload_id: String,
    key: String,
}

/// Server acknowledgement for one part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteRequest<'a> {
    key: &'a str,
    upload_id: &'a str,
    parts: &'a [CompletedPart],
}

/// [`ObjectUploader`] backed by the storage multipart endpoints.
#[derive(Clone)]
pub struct MultipartUploader {
    client: ApiClient,
    chunk_size: u64,
    concurrency: usize,
}

impl MultipartUploader {
    pub fn new(client: ApiClient, config: &Config) -> Self {
        Self {
            client,
            chunk_size: config.chunk_size.max(1),
            concurrency: config.part_concurrency.max(1),
        }
    }

    async fn upload_parts(
        &self,
        remote: &RemoteUpload,
        request: &ObjectUpload<'_>,
    ) -> TransportResult<String> {
        let file = request.file;
        let parts = plan_parts(file.size, self.chunk_size);
        log_info_indent(
            format!("{} → {} part(s) of up to {} bytes", file.file_name, parts.len(), parts[0].len()),
            1,
        );

        let counter = AtomicU64::new(0);
        let uploaded = &counter;
        let mut completed = Vec::with_capacity(parts.len());

        for batch in parts.chunks(self.concurrency) {
            let uploads = batch.iter().map(|part| async move {
                let ack = self.upload_part(remote, &file.path, part).await?;
                let loaded = uploaded.fetch_add(part.len(), Ordering::Relaxed) + part.len();
                (request.on_progress)(TransferProgress { loaded, total: file.size });
                Ok::<_, TransportError>(ack)
            });
            let acks = request.signal.race(future::try_join_all(uploads)).await?;
            completed.extend(acks);
        }

        let body = CompleteRequest {
            key: &remote.key,
            upload_id: &remote.upload_id,
            parts: &completed,
        };
        let _: Value = request
            .signal
            .race(self.client.post("/storage/multipart/complete", &body))
            .await?;

        Ok(remote.key.clone())
    }

    async fn upload_part(
        &self,
        remote: &RemoteUpload,
        path: &Path,
        part: &PartRange,
    ) -> TransportResult<CompletedPart> {
        let bytes = read_part(path, part).await?;
        let part_number = part.part_number.to_string();

        let request = self
            .client
            .request(Method::PUT, "/storage/multipart/upload-part")
            .query(&[
                ("key", remote.key.as_str()),
                ("uploadId", remote.upload_id.as_str()),
                ("partNumber", part_number.as_str()),
            ])
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes);

        self.client.send(request).await
    }

    /// Tell the server to drop the parts it holds. Runs without the abort
    /// signal; failures are logged, never returned.
    async fn abort_remote(&self, remote: &RemoteUpload) {
        let body = json!({ "key": remote.key, "uploadId": remote.upload_id });
        let result: TransportResult<Value> =
            self.client.post("/storage/multipart/abort", &body).await;
        if let Err(e) = result {
            log_warning(format!("Failed to abort upload {}: {}", remote.key, e));
        }
    }
}

#[async_trait]
impl ObjectUploader for MultipartUploader {
    async fn upload_object(&self, request: ObjectUpload<'_>) -> TransportResult<String> {
        let init = json!({
            "fileName": request.file.file_name,
            "fileType": request.file.mime_type,
            "folder": request.folder,
        });
        let remote: RemoteUpload = request
            .signal
            .race(self.client.post("/storage/multipart/init", &init))
            .await?;

        match self.upload_parts(&remote, &request).await {
            Ok(key) => Ok(key),
            Err(e) => {
                self.abort_remote(&remote).await;
                Err(e)
            }
        }
    }
}

async fn read_part(path: &Path, part: &PartRange) -> io::Result<Vec<u8>> {
    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(part.start)).await?;
    let mut buf = vec![0u8; part.len() as usize];
    file.read_exact(&mut buf).await?;
    Ok(buf)
}
