//! The SDK facade: authentication plus the user, folder and file clients.

use crate::auth::{AuthManager, CredentialsInfo};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::file::File;
use crate::folder::Folder;
use crate::models::{AuthType, Location, LoginInfo};
use crate::transport::ApiClient;
use crate::user::User;

/// One pCloud account session.
///
/// Every networked call borrows the SDK mutably, so an instance cannot be
/// shared between tasks. Create one instance per concurrent caller, each
/// with its own `token_file`.
pub struct PCloudSdk {
    api: ApiClient,
    auth: AuthManager,
}

impl PCloudSdk {
    /// Build an SDK. A valid saved credential, if any, is loaded into the
    /// session without touching the network.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let auth = AuthManager::new(&config)?;
        let mut api = ApiClient::new(config)?;
        auth.restore_session(&mut api)?;
        Ok(Self { api, auth })
    }

    pub fn config(&self) -> &ClientConfig {
        self.api.config()
    }

    /// Reuse a saved token unless `force`, else log in with email and password.
    pub async fn login(
        &mut self,
        email: Option<&str>,
        password: Option<&str>,
        force: bool,
    ) -> Result<LoginInfo> {
        self.auth.login(&mut self.api, email, password, force).await
    }

    pub fn get_auth_url(&self, redirect_uri: Option<&str>) -> Result<String> {
        self.auth.get_auth_url(redirect_uri)
    }

    /// Exchange an OAuth2 authorization code. `location` overrides the
    /// configured region, typically with the `locationid` from the redirect.
    pub async fn authenticate(
        &mut self,
        code: &str,
        location: Option<Location>,
    ) -> Result<LoginInfo> {
        self.auth.authenticate(&mut self.api, code, location).await
    }

    pub fn set_access_token(
        &mut self,
        token: &str,
        auth_type: AuthType,
        location: Option<Location>,
    ) {
        self.auth.set_access_token(&mut self.api, token, auth_type, location);
    }

    pub fn is_authenticated(&self) -> bool {
        self.api.is_authenticated()
    }

    pub fn logout(&mut self) -> Result<()> {
        self.auth.logout(&mut self.api)
    }

    pub fn credentials_info(&self) -> CredentialsInfo {
        self.auth.credentials_info(&self.api)
    }

    pub fn saved_email(&self) -> Option<String> {
        self.auth.saved_email()
    }

    pub fn user(&mut self) -> User<'_> {
        User::new(&mut self.api)
    }

    pub fn folder(&mut self) -> Folder<'_> {
        Folder::new(&mut self.api)
    }

    pub fn file(&mut self) -> File<'_> {
        File::new(&mut self.api)
    }
}
