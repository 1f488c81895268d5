//! Folder operations.

use crate::error::{PCloudError, Result};
use crate::models::{Metadata, MetadataResponse};
use crate::transport::ApiClient;

/// Where a folder is: by id or by absolute path. Exactly one of the two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderLocator {
    Id(u64),
    Path(String),
}

impl FolderLocator {
    /// Validate a pair of optional locators, requiring exactly one.
    pub fn from_parts(folder_id: Option<u64>, path: Option<&str>) -> Result<Self> {
        match (folder_id, path) {
            (Some(id), None) => Ok(FolderLocator::Id(id)),
            (None, Some(path)) if !path.is_empty() => Ok(FolderLocator::Path(path.to_string())),
            (None, Some(_)) => Err(PCloudError::InvalidArgument(
                "folder path is empty".to_string(),
            )),
            (Some(_), Some(_)) => Err(PCloudError::InvalidArgument(
                "give either a folder id or a path, not both".to_string(),
            )),
            (None, None) => Err(PCloudError::InvalidArgument(
                "a folder id or a path is required".to_string(),
            )),
        }
    }

    fn param(&self) -> (&'static str, String) {
        match self {
            FolderLocator::Id(id) => ("folderid", id.to_string()),
            FolderLocator::Path(path) => ("path", path.clone()),
        }
    }
}

/// Folder operations, borrowed from the SDK.
pub struct Folder<'a> {
    api: &'a mut ApiClient,
}

impl<'a> Folder<'a> {
    pub fn new(api: &'a mut ApiClient) -> Self {
        Self { api }
    }

    /// `listfolder` for exactly one of `folder_id` / `path`.
    pub async fn get_metadata(
        &mut self,
        folder_id: Option<u64>,
        path: Option<&str>,
    ) -> Result<Metadata> {
        let locator = FolderLocator::from_parts(folder_id, path)?;
        self.list(&locator).await
    }

    /// Metadata of `/`, with its contents.
    pub async fn list_root(&mut self) -> Result<Metadata> {
        self.list(&FolderLocator::Path("/".to_string())).await
    }

    /// Items directly inside the folder.
    pub async fn get_content(
        &mut self,
        folder_id: Option<u64>,
        path: Option<&str>,
    ) -> Result<Vec<Metadata>> {
        Ok(self.get_metadata(folder_id, path).await?.contents)
    }

    async fn list(&mut self, locator: &FolderLocator) -> Result<Metadata> {
        let response: MetadataResponse = self.api.get_as("listfolder", &[locator.param()]).await?;
        Ok(response.metadata)
    }

    /// Create `name` inside `parent_id` (0 is the root). Returns the new id.
    pub async fn create(&mut self, name: &str, parent_id: u64) -> Result<u64> {
        validate_name(name)?;
        let params = [
            ("name", name.to_string()),
            ("folderid", parent_id.to_string()),
        ];
        let response: MetadataResponse = self.api.get_as("createfolder", &params).await?;
        folder_id_of(response.metadata)
    }

    pub async fn rename(&mut self, folder_id: u64, name: &str) -> Result<u64> {
        validate_name(name)?;
        let params = [
            ("folderid", folder_id.to_string()),
            ("toname", name.to_string()),
        ];
        let response: MetadataResponse = self.api.get_as("renamefolder", &params).await?;
        folder_id_of(response.metadata)
    }

    pub async fn move_to(&mut self, folder_id: u64, new_parent_id: u64) -> Result<u64> {
        let params = [
            ("folderid", folder_id.to_string()),
            ("tofolderid", new_parent_id.to_string()),
        ];
        let response: MetadataResponse = self.api.get_as("renamefolder", &params).await?;
        folder_id_of(response.metadata)
    }

    /// Delete an empty folder.
    pub async fn delete(&mut self, folder_id: u64) -> Result<bool> {
        let response: MetadataResponse = self
            .api
            .get_as("deletefolder", &[("folderid", folder_id.to_string())])
            .await?;
        Ok(response.metadata.isdeleted)
    }

    /// Delete a folder and everything below it. One API call; the server
    /// does the recursion.
    pub async fn delete_recursive(&mut self, folder_id: u64) -> Result<DeletedCounts> {
        let payload = self
            .api
            .get("deletefolderrecursive", &[("folderid", folder_id.to_string())])
            .await?;
        crate::envelope::parse_payload(payload)
    }
}

/// What `deletefolderrecursive` removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub struct DeletedCounts {
    #[serde(default)]
    pub deletedfiles: u64,
    #[serde(default)]
    pub deletedfolders: u64,
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(PCloudError::InvalidArgument("folder name is empty".to_string()));
    }
    Ok(())
}

fn folder_id_of(metadata: Metadata) -> Result<u64> {
    metadata
        .folderid
        .ok_or_else(|| {
            PCloudError::MalformedResponse("folder metadata without folderid".to_string())
        })
}
