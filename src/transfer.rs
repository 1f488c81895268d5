//! Chunked uploads and streamed downloads with progress reporting.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};

use crate::envelope::parse_payload;
use crate::error::{PCloudError, Result};
use crate::models::{FileLink, Metadata, MetadataResponse, UploadCreated, UploadFileResponse};
use crate::progress::{Operation, ProgressCallback, ProgressReporter, TransferStatus};
use crate::transport::ApiClient;

/// Local write buffer for downloads; progress is reported per filled buffer.
const DOWNLOAD_BUFFER_SIZE: usize = 1024 * 1024;

/// State of one upload or download call.
#[derive(Debug, Clone)]
pub struct TransferTask {
    pub source: String,
    pub destination: String,
    pub total_size: u64,
    pub chunk_size: u64,
    pub bytes_transferred: u64,
    pub status: TransferStatus,
}

impl TransferTask {
    fn new(
        source: impl Into<String>,
        destination: impl Into<String>,
        total_size: u64,
        chunk_size: u64,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            total_size,
            chunk_size,
            bytes_transferred: 0,
            status: TransferStatus::Starting,
        }
    }

    fn advance(&mut self, bytes: u64, reporter: &mut ProgressReporter<'_>) {
        self.bytes_transferred += bytes;
        self.set_status(TransferStatus::Progress, reporter);
    }

    fn set_status(&mut self, status: TransferStatus, reporter: &mut ProgressReporter<'_>) {
        self.status = status;
        reporter.report(self.bytes_transferred, self.total_size, status, None);
    }

    /// Record a failure and hand the error back.
    fn fail(&mut self, error: PCloudError, reporter: &mut ProgressReporter<'_>) -> PCloudError {
        self.status = TransferStatus::Error;
        tracing::warn!(
            source = %self.source,
            destination = %self.destination,
            bytes = self.bytes_transferred,
            error = %error,
            "Transfer failed"
        );
        reporter.report(
            self.bytes_transferred,
            self.total_size,
            TransferStatus::Error,
            Some(error.to_string()),
        );
        error
    }
}

/// Split `total` bytes into `(offset, len)` pieces of at most `chunk_size`.
pub fn chunk_plan(total: u64, chunk_size: u64) -> Result<Vec<(u64, u64)>> {
    if chunk_size == 0 {
        return Err(PCloudError::InvalidArgument(
            "chunk size must be positive".to_string(),
        ));
    }
    let mut plan = Vec::with_capacity(total.div_ceil(chunk_size) as usize);
    let mut offset = 0;
    while offset < total {
        let len = chunk_size.min(total - offset);
        plan.push((offset, len));
        offset += len;
    }
    Ok(plan)
}

/// Upload a local file into `folder_id`.
///
/// Files no larger than the configured chunk size go up in one multipart
/// request; larger ones use an upload session written chunk by chunk and
/// then saved. A failed chunk aborts the upload; already written chunks are
/// left to expire server-side.
pub async fn upload(
    api: &mut ApiClient,
    path: &Path,
    folder_id: u64,
    filename: Option<&str>,
    callback: Option<&mut dyn ProgressCallback>,
) -> Result<Metadata> {
    let local = tokio::fs::metadata(path)
        .await
        .map_err(|e| PCloudError::local_io(path, e))?;
    if !local.is_file() {
        return Err(PCloudError::InvalidArgument(format!(
            "{} is not a file",
            path.display()
        )));
    }

    let name = match filename.filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                PCloudError::InvalidArgument(format!(
                    "cannot derive a file name from {}",
                    path.display()
                ))
            })?,
    };

    let chunk_size = api.config().chunk_size;
    let plan = chunk_plan(local.len(), chunk_size)?;

    let mut task = TransferTask::new(
        path.display().to_string(),
        format!("folder {folder_id}/{name}"),
        local.len(),
        chunk_size,
    );
    let mut reporter = ProgressReporter::new(callback, Operation::Upload, &name);
    task.set_status(TransferStatus::Starting, &mut reporter);

    let result = if task.total_size <= chunk_size {
        upload_single(api, path, folder_id, &name, &mut task, &mut reporter).await
    } else {
        upload_chunked(
            api,
            path,
            folder_id,
            &name,
            &plan,
            &mut task,
            &mut reporter,
        )
        .await
    };

    match result {
        Ok(metadata) => {
            task.set_status(TransferStatus::Completed, &mut reporter);
            tracing::info!(
                file = %name,
                folder_id,
                bytes = task.total_size,
                "Upload completed"
            );
            Ok(metadata)
        }
        Err(e) => Err(task.fail(e, &mut reporter)),
    }
}

async fn upload_single(
    api: &mut ApiClient,
    path: &Path,
    folder_id: u64,
    name: &str,
    task: &mut TransferTask,
    reporter: &mut ProgressReporter<'_>,
) -> Result<Metadata> {
    let params = [
        ("folderid", folder_id.to_string()),
        ("filename", name.to_string()),
        ("nopartial", "1".to_string()),
    ];
    let payload = api.post_file("uploadfile", &params, path, name).await?;
    let response: UploadFileResponse = parse_payload(payload)?;
    let metadata = response
        .metadata
        .into_iter()
        .next()
        .ok_or_else(|| {
            PCloudError::MalformedResponse("uploadfile returned no metadata".to_string())
        })?;

    task.advance(task.total_size, reporter);
    Ok(metadata)
}

async fn upload_chunked(
    api: &mut ApiClient,
    path: &Path,
    folder_id: u64,
    name: &str,
    plan: &[(u64, u64)],
    task: &mut TransferTask,
    reporter: &mut ProgressReporter<'_>,
) -> Result<Metadata> {
    let created: UploadCreated = api.get_as("upload_create", &[]).await?;
    let upload_id = created.uploadid.to_string();
    tracing::debug!(upload_id = %upload_id, chunks = plan.len(), "Upload session opened");

    let mut file = File::open(path)
        .await
        .map_err(|e| PCloudError::local_io(path, e))?;
    let mut buffer = vec![0_u8; task.chunk_size as usize];

    for &(offset, len) in plan {
        let chunk = &mut buffer[..len as usize];
        file.read_exact(chunk)
            .await
            .map_err(|e| PCloudError::local_io(path, e))?;

        let params = [
            ("uploadid", upload_id.clone()),
            ("uploadoffset", offset.to_string()),
        ];
        api.put_body("upload_write", &params, chunk)
            .await
            .map_err(PCloudError::transfer)?;

        task.advance(len, reporter);
    }

    task.set_status(TransferStatus::Saving, reporter);
    let params = [
        ("uploadid", upload_id),
        ("name", name.to_string()),
        ("folderid", folder_id.to_string()),
    ];
    let saved: MetadataResponse = api.get_as("upload_save", &params).await?;
    Ok(saved.metadata)
}

/// Download `file_id` to `destination`, returning the written path.
///
/// `destination` may be an existing directory (the remote name is used) or a
/// file path. The body is fetched in one streamed GET.
pub async fn download(
    api: &mut ApiClient,
    file_id: u64,
    destination: &Path,
    callback: Option<&mut dyn ProgressCallback>,
) -> Result<PathBuf> {
    let params = [("fileid", file_id.to_string())];
    let info: MetadataResponse = api.get_as("stat", &params).await?;
    let info = info.metadata;
    if info.isfolder {
        return Err(PCloudError::InvalidArgument(format!("{file_id} is a folder")));
    }

    let target = resolve_target(destination, &info.name).await?;

    let link: FileLink = api.get_as("getfilelink", &params).await?;
    let host = link
        .hosts
        .first()
        .ok_or_else(|| {
            PCloudError::MalformedResponse("getfilelink returned no hosts".to_string())
        })?;
    let url = format!("{}://{}{}", api.scheme(), host, link.path);

    let mut task = TransferTask::new(
        format!("file {file_id}"),
        target.display().to_string(),
        info.size.unwrap_or(0),
        DOWNLOAD_BUFFER_SIZE as u64,
    );
    let mut reporter = ProgressReporter::new(callback, Operation::Download, &info.name);
    task.set_status(TransferStatus::Starting, &mut reporter);

    match stream_to_file(api, &url, &target, &mut task, &mut reporter).await {
        Ok(()) => {
            task.total_size = task.total_size.max(task.bytes_transferred);
            task.set_status(TransferStatus::Completed, &mut reporter);
            tracing::info!(
                file_id,
                path = %target.display(),
                bytes = task.bytes_transferred,
                "Download completed"
            );
            Ok(target)
        }
        Err(e) => Err(task.fail(e, &mut reporter)),
    }
}

async fn stream_to_file(
    api: &ApiClient,
    url: &str,
    target: &Path,
    task: &mut TransferTask,
    reporter: &mut ProgressReporter<'_>,
) -> Result<()> {
    let response = api.open_stream(url).await?;
    if let Some(length) = response.content_length() {
        task.total_size = length;
    }

    let file = File::create(target)
        .await
        .map_err(|e| PCloudError::local_io(target, e))?;

    let result = write_body(response, file, target, task, reporter).await;
    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(target).await {
            tracing::warn!(
                path = %target.display(),
                error = %e,
                "Could not remove partial download"
            );
        }
    }
    result
}

async fn write_body(
    response: reqwest::Response,
    file: File,
    target: &Path,
    task: &mut TransferTask,
    reporter: &mut ProgressReporter<'_>,
) -> Result<()> {
    let mut writer = BufWriter::with_capacity(DOWNLOAD_BUFFER_SIZE, file);
    let mut stream = response.bytes_stream();
    let mut pending = 0_u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| PCloudError::transfer(e.into()))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| PCloudError::local_io(target, e))?;

        pending += chunk.len() as u64;
        if pending >= DOWNLOAD_BUFFER_SIZE as u64 {
            task.advance(pending, reporter);
            pending = 0;
        }
    }

    writer.flush().await.map_err(|e| PCloudError::local_io(target, e))?;
    if pending > 0 {
        task.advance(pending, reporter);
    }
    Ok(())
}

/// Directory destinations get the remote file name appended; missing parent
/// directories are created.
async fn resolve_target(destination: &Path, remote_name: &str) -> Result<PathBuf> {
    let as_dir = destination.is_dir()
        || destination
            .to_string_lossy()
            .ends_with(std::path::MAIN_SEPARATOR);

    let target = if as_dir {
        tokio::fs::create_dir_all(destination)
            .await
            .map_err(|e| PCloudError::local_io(destination, e))?;
        destination.join(remote_name)
    } else {
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PCloudError::local_io(parent, e))?;
        }
        destination.to_path_buf()
    };
    Ok(target)
}
