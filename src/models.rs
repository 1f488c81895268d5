//! Data models for pCloud API responses.

use serde::{Deserialize, Serialize};

use crate::error::PCloudError;

/// Regional API host an account lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Location {
    Us,
    Eu,
}

impl Location {
    pub fn id(self) -> u8 {
        match self {
            Location::Us => 1,
            Location::Eu => 2,
        }
    }

    pub fn api_host(self) -> &'static str {
        match self {
            Location::Us => "https://api.pcloud.com/",
            Location::Eu => "https://eapi.pcloud.com/",
        }
    }
}

impl TryFrom<u8> for Location {
    type Error = PCloudError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            1 => Ok(Location::Us),
            2 => Ok(Location::Eu),
            other => Err(PCloudError::InvalidArgument(format!(
                "location id must be 1 (US) or 2 (EU), got {other}"
            ))),
        }
    }
}

impl From<Location> for u8 {
    fn from(location: Location) -> u8 {
        location.id()
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Us => write!(f, "US"),
            Location::Eu => write!(f, "EU"),
        }
    }
}

/// How a token was obtained. Decides which query parameter carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    Oauth2,
    Direct,
}

impl AuthType {
    /// Query parameter name the token is sent under.
    pub fn param_name(self) -> &'static str {
        match self {
            AuthType::Oauth2 => "access_token",
            AuthType::Direct => "auth",
        }
    }
}

impl std::fmt::Display for AuthType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthType::Oauth2 => write!(f, "oauth2"),
            AuthType::Direct => write!(f, "direct"),
        }
    }
}

/// Metadata for a file or folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    #[serde(default)]
    pub isfolder: bool,
    #[serde(default)]
    pub folderid: Option<u64>,
    #[serde(default)]
    pub fileid: Option<u64>,
    #[serde(default)]
    pub parentfolderid: Option<u64>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub contenttype: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub isdeleted: bool,
    #[serde(default)]
    pub contents: Vec<Metadata>,
}

impl Metadata {
    /// The folder or file id, whichever applies.
    pub fn id(&self) -> Option<u64> {
        if self.isfolder {
            self.folderid
        } else {
            self.fileid
        }
    }
}

impl std::fmt::Display for Metadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let id_str = self
            .id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        let kind = if self.isfolder { "dir" } else { "file" };
        let size_str = match (self.isfolder, self.size) {
            (false, Some(s)) => format_size(s),
            _ => "-".to_string(),
        };
        write!(f, "{:<14} {:<6} {:>10} {}", id_str, kind, size_str, self.name)
    }
}

/// Envelope payload for calls that return a single `metadata` object.
#[derive(Debug, Deserialize)]
pub(crate) struct MetadataResponse {
    pub metadata: Metadata,
}

/// Account details returned by `userinfo`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub userid: u64,
    pub email: String,
    #[serde(default)]
    pub quota: u64,
    #[serde(default)]
    pub usedquota: u64,
    #[serde(default)]
    pub publiclinkquota: Option<u64>,
    #[serde(default)]
    pub premium: bool,
    #[serde(default)]
    pub emailverified: bool,
}

/// `userinfo?getauth=1` response: user info plus a fresh token.
#[derive(Debug, Deserialize)]
pub(crate) struct DirectLoginResponse {
    pub auth: String,
    #[serde(flatten)]
    pub user: UserInfo,
}

/// `oauth2_token` response.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub locationid: Option<u8>,
    #[serde(default)]
    pub userid: Option<u64>,
}

/// Direct download link returned by `getfilelink`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileLink {
    pub hosts: Vec<String>,
    pub path: String,
    #[serde(default)]
    pub expires: Option<String>,
}

/// Checksums returned by `checksumfile`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checksums {
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub md5: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
    pub metadata: Metadata,
}

/// `upload_create` response.
#[derive(Debug, Deserialize)]
pub(crate) struct UploadCreated {
    pub uploadid: u64,
}

/// `uploadfile` response: one metadata entry per uploaded file.
#[derive(Debug, Deserialize)]
pub(crate) struct UploadFileResponse {
    #[serde(default)]
    pub metadata: Vec<Metadata>,
}

/// What a successful login produced.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginInfo {
    pub email: String,
    pub access_token: String,
    pub auth_type: AuthType,
    pub location: Location,
    /// True when a saved credential was reused instead of logging in again.
    pub reused: bool,
}

/// Format bytes into human-readable size.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format a bytes-per-second rate.
pub fn format_speed(bytes_per_second: f64) -> String {
    if !bytes_per_second.is_finite() || bytes_per_second <= 0.0 {
        return "--".to_string();
    }
    format!("{}/s", format_size(bytes_per_second as u64))
}

/// Format seconds into human-readable time (e.g., "2m 15s", "1h 5m", "< 1s").
pub fn format_eta(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "--".to_string();
    }

    let secs = seconds.round() as u64;

    if secs == 0 {
        return "< 1s".to_string();
    }

    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let remaining_secs = secs % 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, remaining_secs)
    } else {
        format!("{}s", remaining_secs)
    }
}
