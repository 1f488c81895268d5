//! pcloud_sdk - A client for the pCloud storage API.
//!
//! This library provides functionality to:
//! - Log in with email/password or OAuth2, keeping the token on disk
//! - Read account information and quotas
//! - Create, list, rename, move and delete folders and files
//! - Upload files (chunked above a size threshold) and stream downloads,
//!   with progress callbacks
//!
//! # Example
//!
//! ```no_run
//! use pcloud_sdk::{create_progress_bar, ClientConfig, PCloudSdk};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut sdk = PCloudSdk::new(ClientConfig::from_env()?)?;
//!     sdk.login(Some("me@example.com"), Some("secret"), false).await?;
//!
//!     for item in sdk.folder().list_root().await?.contents {
//!         println!("{}", item);
//!     }
//!
//!     let mut bar = create_progress_bar("Upload");
//!     sdk.file().upload("backup.tar", 0, None, Some(&mut bar)).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod envelope;
pub mod error;
pub mod file;
pub mod folder;
pub mod models;
pub mod progress;
pub mod sdk;
pub mod token_store;
pub mod transfer;
pub mod transport;
pub mod url_parser;
pub mod user;

// Re-exports for convenience
pub use auth::{CredentialsInfo, LoginDecision};
pub use config::ClientConfig;
pub use error::{ErrorCategory, PCloudError, Result};
pub use models::{AuthType, Location, LoginInfo, Metadata, UserInfo};
pub use progress::{
    create_detailed_progress, create_minimal_progress, create_progress_bar, create_silent_progress,
    ProgressCallback, ProgressExtras, TransferStatus,
};
pub use sdk::PCloudSdk;
pub use token_store::{Credential, TokenStore};
pub use url_parser::parse_authorization_redirect;
