//! On-disk persistence of a single account's credential.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PCloudError, Result};
use crate::models::{AuthType, Location};

/// A bearer token plus what is needed to use it again later.
///
/// Never holds a password.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub token_type: AuthType,
    pub location_id: Location,
    #[serde(default)]
    pub email: String,
    pub saved_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        token_type: AuthType,
        location_id: Location,
        email: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            token_type,
            location_id,
            email: email.into(),
            saved_at: Utc::now(),
        }
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.saved_at
    }

    /// Age in fractional days, for display.
    pub fn age_days(&self) -> f64 {
        self.age().num_seconds() as f64 / 86_400.0
    }
}

/// JSON file holding one credential. The file path is the account key:
/// separate accounts need separate files.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
    ttl: Duration,
}

impl TokenStore {
    /// Fails with [`PCloudError::InvalidArgument`] when `ttl_days` does not
    /// fit a duration.
    pub fn new(path: impl Into<PathBuf>, ttl_days: i64) -> Result<Self> {
        let ttl = Duration::try_days(ttl_days).ok_or_else(|| {
            PCloudError::InvalidArgument(format!("token TTL of {ttl_days} days is out of range"))
        })?;
        Ok(Self {
            path: path.into(),
            ttl,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the credential, replacing any previous file atomically.
    pub fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| PCloudError::local_io(parent, e))?;
            }
        }

        let contents = serde_json::to_string_pretty(credential).map_err(|e| {
            PCloudError::InvalidArgument(format!("cannot serialize credential: {e}"))
        })?;

        let tmp = self.tmp_path();
        fs::write(&tmp, contents).map_err(|e| PCloudError::local_io(&tmp, e))?;
        restrict_permissions(&tmp)?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| PCloudError::local_io(&self.path, e))?;

        tracing::debug!(path = %self.path.display(), "Saved credential");
        Ok(())
    }

    /// Read the credential.
    ///
    /// A missing file is `Ok(None)`. A file that exists but does not parse is
    /// [`PCloudError::CorruptTokenFile`].
    pub fn load(&self) -> Result<Option<Credential>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PCloudError::local_io(&self.path, e)),
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| PCloudError::CorruptTokenFile {
                path: self.path.clone(),
                message: e.to_string(),
            })
    }

    /// Like [`load`](Self::load), but a corrupt file is logged and treated as absent.
    pub fn load_or_discard(&self) -> Result<Option<Credential>> {
        match self.load() {
            Err(e @ PCloudError::CorruptTokenFile { .. }) => {
                tracing::warn!(error = %e, "Ignoring unreadable credential file");
                Ok(None)
            }
            other => other,
        }
    }

    /// A credential is valid while its age is strictly below the TTL.
    /// At exactly the TTL it counts as expired.
    pub fn is_valid(&self, credential: &Credential) -> bool {
        self.is_valid_at(credential, Utc::now())
    }

    pub fn is_valid_at(&self, credential: &Credential, now: DateTime<Utc>) -> bool {
        !credential.access_token.is_empty() && now - credential.saved_at < self.ttl
    }

    /// Delete the file. Succeeds when there is nothing to delete.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Removed credential file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PCloudError::local_io(&self.path, e)),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|e| PCloudError::local_io(path, e))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> TokenStore {
        TokenStore::new(dir.path().join("creds.json"), 30).unwrap()
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let credential =
            Credential::new("tok-123", AuthType::Direct, Location::Eu, "me@example.com");

        store.save(&credential).unwrap();
        let loaded = store.load().unwrap().unwrap();

        assert_eq!(loaded, credential);
    }

    #[test]
    fn test_save_leaves_no_tmp_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store
            .save(&Credential::new("t", AuthType::Oauth2, Location::Us, ""))
            .unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["creds.json".to_string()]);
    }

    #[test]
    fn test_load_missing_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(store_in(&dir).load().unwrap().is_none());
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "{not json").unwrap();

        assert!(matches!(
            store.load(),
            Err(PCloudError::CorruptTokenFile { .. })
        ));
        assert!(store.load_or_discard().unwrap().is_none());
    }

    #[test]
    fn test_validity_boundary_at_thirty_days() {
        let store = TokenStore::new("unused", 30).unwrap();
        let credential = Credential::new("t", AuthType::Direct, Location::Us, "");
        let saved = credential.saved_at;

        assert!(store.is_valid_at(&credential, saved + Duration::days(29)));
        let just_before = saved + Duration::days(30) - Duration::seconds(1);
        assert!(store.is_valid_at(&credential, just_before));
        assert!(!store.is_valid_at(&credential, saved + Duration::days(30)));
        assert!(!store.is_valid_at(&credential, saved + Duration::days(31)));
    }

    #[test]
    fn test_ttl_out_of_range_is_rejected() {
        let result = TokenStore::new("unused", i64::MAX);
        assert!(matches!(result, Err(PCloudError::InvalidArgument(_))));
    }

    #[test]
    fn test_empty_token_is_never_valid() {
        let store = TokenStore::new("unused", 30).unwrap();
        let credential = Credential::new("", AuthType::Direct, Location::Us, "");
        assert!(!store.is_valid(&credential));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store
            .save(&Credential::new("t", AuthType::Direct, Location::Us, ""))
            .unwrap();

        store.clear().unwrap();
        assert!(!store.path().exists());
        store.clear().unwrap();
    }
}
