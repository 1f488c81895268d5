//! File operations, including uploads and downloads.

use std::path::{Path, PathBuf};

use crate::error::{PCloudError, Result};
use crate::models::{Checksums, FileLink, Metadata, MetadataResponse};
use crate::progress::ProgressCallback;
use crate::transfer;
use crate::transport::ApiClient;

/// File operations, borrowed from the SDK.
pub struct File<'a> {
    api: &'a mut ApiClient,
}

impl<'a> File<'a> {
    pub fn new(api: &'a mut ApiClient) -> Self {
        Self { api }
    }

    /// `stat` of a file.
    pub async fn get_info(&mut self, file_id: u64) -> Result<Metadata> {
        let response: MetadataResponse = self
            .api
            .get_as("stat", &[("fileid", file_id.to_string())])
            .await?;
        Ok(response.metadata)
    }

    /// Direct download URL for a file.
    pub async fn get_link(&mut self, file_id: u64) -> Result<String> {
        let link: FileLink = self
            .api
            .get_as("getfilelink", &[("fileid", file_id.to_string())])
            .await?;
        let host = link
            .hosts
            .first()
            .ok_or_else(|| {
                PCloudError::MalformedResponse("getfilelink returned no hosts".to_string())
            })?;
        Ok(format!("{}://{}{}", self.api.scheme(), host, link.path))
    }

    pub async fn rename(&mut self, file_id: u64, name: &str) -> Result<Metadata> {
        if name.trim().is_empty() {
            return Err(PCloudError::InvalidArgument("file name is empty".to_string()));
        }
        let params = [
            ("fileid", file_id.to_string()),
            ("toname", name.to_string()),
        ];
        let response: MetadataResponse = self.api.get_as("renamefile", &params).await?;
        Ok(response.metadata)
    }

    pub async fn move_to(&mut self, file_id: u64, folder_id: u64) -> Result<Metadata> {
        let params = [
            ("fileid", file_id.to_string()),
            ("tofolderid", folder_id.to_string()),
        ];
        let response: MetadataResponse = self.api.get_as("renamefile", &params).await?;
        Ok(response.metadata)
    }

    pub async fn copy(&mut self, file_id: u64, folder_id: u64) -> Result<Metadata> {
        let params = [
            ("fileid", file_id.to_string()),
            ("tofolderid", folder_id.to_string()),
        ];
        let response: MetadataResponse = self.api.get_as("copyfile", &params).await?;
        Ok(response.metadata)
    }

    /// Returns whether the server reports the file as deleted.
    pub async fn delete(&mut self, file_id: u64) -> Result<bool> {
        let response: MetadataResponse = self
            .api
            .get_as("deletefile", &[("fileid", file_id.to_string())])
            .await?;
        Ok(response.metadata.isdeleted)
    }

    pub async fn checksum(&mut self, file_id: u64) -> Result<Checksums> {
        self.api
            .get_as("checksumfile", &[("fileid", file_id.to_string())])
            .await
    }

    /// Upload `path` into `folder_id`, optionally under another name.
    pub async fn upload(
        &mut self,
        path: impl AsRef<Path>,
        folder_id: u64,
        filename: Option<&str>,
        callback: Option<&mut dyn ProgressCallback>,
    ) -> Result<Metadata> {
        transfer::upload(self.api, path.as_ref(), folder_id, filename, callback).await
    }

    /// Download `file_id` into `destination` (directory or file path).
    pub async fn download(
        &mut self,
        file_id: u64,
        destination: impl AsRef<Path>,
        callback: Option<&mut dyn ProgressCallback>,
    ) -> Result<PathBuf> {
        transfer::download(self.api, file_id, destination.as_ref(), callback).await
    }
}
