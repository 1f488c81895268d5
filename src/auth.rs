//! Login, OAuth2 code exchange, and the saved-token lifecycle.

use reqwest::Url;

use crate::config::ClientConfig;
use crate::envelope::parse_payload;
use crate::error::{ErrorCategory, PCloudError, Result};
use crate::models::{AuthType, DirectLoginResponse, Location, LoginInfo, TokenResponse, UserInfo};
use crate::token_store::{Credential, TokenStore};
use crate::transport::ApiClient;

/// pCloud OAuth2 authorization page (same host for every region).
pub const OAUTH_AUTHORIZE_URL: &str = "https://my.pcloud.com/oauth2/authorize";

/// Outcome of looking at the saved token before a login.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginDecision {
    /// A valid saved token exists and a fresh login was not forced.
    ReuseSaved(Credential),
    /// Email and password are needed.
    RequireCredentials,
}

impl LoginDecision {
    /// `saved` must already be filtered down to a valid credential.
    pub fn new(saved: Option<Credential>, force: bool) -> Self {
        match saved {
            Some(credential) if !force => LoginDecision::ReuseSaved(credential),
            _ => LoginDecision::RequireCredentials,
        }
    }
}

/// Snapshot of the credential state, for display.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialsInfo {
    pub authenticated: bool,
    pub token_manager_enabled: bool,
    pub file: String,
    pub email: Option<String>,
    pub location_id: Option<u8>,
    pub auth_type: Option<AuthType>,
    pub age_days: Option<f64>,
}

/// Drives authentication for one SDK instance.
pub struct AuthManager {
    app_key: String,
    app_secret: String,
    location: Location,
    token_file: String,
    /// `None` when the token manager is disabled.
    store: Option<TokenStore>,
}

impl AuthManager {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let store = if config.token_manager {
            Some(TokenStore::new(&config.token_file, config.token_ttl_days)?)
        } else {
            None
        };

        Ok(Self {
            app_key: config.app_key.clone(),
            app_secret: config.app_secret.clone(),
            location: config.location,
            token_file: config.token_file.display().to_string(),
            store,
        })
    }

    pub fn token_store(&self) -> Option<&TokenStore> {
        self.store.as_ref()
    }

    /// The saved credential, if present and not expired. Corrupt files are
    /// logged and ignored.
    pub fn saved_credential(&self) -> Result<Option<Credential>> {
        let Some(store) = &self.store else {
            return Ok(None);
        };

        Ok(store.load_or_discard()?.filter(|credential| {
            let valid = store.is_valid(credential);
            if !valid {
                tracing::info!(
                    email = %credential.email,
                    age_days = credential.age_days(),
                    "Saved credential expired"
                );
            }
            valid
        }))
    }

    /// Install a valid saved credential into the session without any
    /// network call. Returns whether one was installed.
    pub fn restore_session(&self, api: &mut ApiClient) -> Result<bool> {
        match self.saved_credential()? {
            Some(credential) => {
                tracing::debug!(email = %credential.email, "Restored saved credential");
                api.set_session(credential);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Reuse a valid saved token unless `force`, otherwise log in directly
    /// with `email` and `password`.
    ///
    /// A fresh token that cannot be written to the token file fails the
    /// login with [`PCloudError::LocalIo`] and leaves no session behind.
    pub async fn login(
        &mut self,
        api: &mut ApiClient,
        email: Option<&str>,
        password: Option<&str>,
        force: bool,
    ) -> Result<LoginInfo> {
        let email = email.filter(|e| !e.is_empty());
        let password = password.filter(|p| !p.is_empty());

        match LoginDecision::new(self.saved_credential()?, force) {
            LoginDecision::ReuseSaved(credential) => {
                api.set_session(credential.clone());
                match check_token(api).await {
                    Ok(user) => {
                        if let Some(session) = api.session_mut() {
                            session.user_info = Some(user);
                        }
                        tracing::info!(email = %credential.email, "Reusing saved credential");
                        return Ok(LoginInfo {
                            email: credential.email,
                            access_token: credential.access_token,
                            auth_type: credential.token_type,
                            location: credential.location_id,
                            reused: true,
                        });
                    }
                    Err(e) => {
                        api.clear_session();
                        if email.is_none() || password.is_none() {
                            return Err(if e.is_auth_failure() {
                                PCloudError::Authentication(
                                    "saved token was rejected; email and password are required"
                                        .to_string(),
                                )
                            } else {
                                e
                            });
                        }
                        tracing::warn!(error = %e, "Saved credential unusable, logging in again");
                    }
                }
            }
            LoginDecision::RequireCredentials => {}
        }

        let (Some(email), Some(password)) = (email, password) else {
            return Err(PCloudError::Authentication(
                "email and password are required: no valid saved token".to_string(),
            ));
        };
        self.direct_login(api, email, password).await
    }

    async fn direct_login(
        &mut self,
        api: &mut ApiClient,
        email: &str,
        password: &str,
    ) -> Result<LoginInfo> {
        let location = self.location;
        let params = [
            ("getauth", "1".to_string()),
            ("logout", "1".to_string()),
            ("username", email.to_string()),
            ("password", password.to_string()),
        ];

        let payload = api
            .get_public(location, "userinfo", &params)
            .await
            .map_err(rejection_to_auth_error)?;
        let response: DirectLoginResponse = parse_payload(payload)?;

        let account_email = if response.user.email.is_empty() {
            email.to_string()
        } else {
            response.user.email.clone()
        };
        let credential = Credential::new(response.auth, AuthType::Direct, location, account_email);

        self.persist(&credential)?;
        api.set_session(credential.clone());
        if let Some(session) = api.session_mut() {
            session.user_info = Some(response.user);
        }

        tracing::info!(email = %credential.email, location = %location, "Logged in");
        Ok(LoginInfo {
            email: credential.email,
            access_token: credential.access_token,
            auth_type: AuthType::Direct,
            location,
            reused: false,
        })
    }

    /// OAuth2 authorization URL the user should open. No I/O.
    pub fn get_auth_url(&self, redirect_uri: Option<&str>) -> Result<String> {
        if self.app_key.is_empty() {
            return Err(PCloudError::InvalidArgument(
                "app_key (client id) is required for OAuth2".to_string(),
            ));
        }

        let mut params = vec![
            ("client_id", self.app_key.as_str()),
            ("response_type", "code"),
        ];
        if let Some(uri) = redirect_uri.filter(|u| !u.is_empty()) {
            params.push(("redirect_uri", uri));
        }

        let url = Url::parse_with_params(OAUTH_AUTHORIZE_URL, &params).map_err(|e| {
            PCloudError::InvalidArgument(format!("cannot build authorization URL: {e}"))
        })?;
        Ok(url.to_string())
    }

    /// Exchange an authorization code for an access token.
    pub async fn authenticate(
        &mut self,
        api: &mut ApiClient,
        code: &str,
        location: Option<Location>,
    ) -> Result<LoginInfo> {
        if self.app_key.is_empty() || self.app_secret.is_empty() {
            return Err(PCloudError::Authentication(
                "app_key and app_secret are required for OAuth2".to_string(),
            ));
        }
        if code.trim().is_empty() {
            return Err(PCloudError::Authentication(
                "authorization code is empty".to_string(),
            ));
        }

        let requested = location.unwrap_or(self.location);
        let params = [
            ("client_id", self.app_key.clone()),
            ("client_secret", self.app_secret.clone()),
            ("code", code.trim().to_string()),
        ];

        let payload = api
            .get_public(requested, "oauth2_token", &params)
            .await
            .map_err(rejection_to_auth_error)?;
        let token: TokenResponse = parse_payload(payload)?;
        if token.access_token.is_empty() {
            return Err(PCloudError::Authentication(
                "token exchange returned an empty access token".to_string(),
            ));
        }

        let location = token
            .locationid
            .and_then(|id| Location::try_from(id).ok())
            .unwrap_or(requested);

        api.set_session(Credential::new(
            &token.access_token,
            AuthType::Oauth2,
            location,
            "",
        ));

        // The token response carries no email; ask for it, but a failure here
        // does not undo the exchange.
        let email = match check_token(api).await {
            Ok(user) => {
                let email = user.email.clone();
                if let Some(session) = api.session_mut() {
                    session.credential.email = email.clone();
                    session.user_info = Some(user);
                }
                email
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    userid = ?token.userid,
                    "Could not fetch account email after OAuth2 exchange"
                );
                String::new()
            }
        };

        if let Some(credential) = api.session().map(|s| s.credential.clone()) {
            if let Err(e) = self.persist(&credential) {
                api.clear_session();
                return Err(e);
            }
        }

        tracing::info!(email = %email, location = %location, "Authenticated via OAuth2");
        Ok(LoginInfo {
            email,
            access_token: token.access_token,
            auth_type: AuthType::Oauth2,
            location,
            reused: false,
        })
    }

    /// Use an existing token. Nothing is validated or saved.
    pub fn set_access_token(
        &self,
        api: &mut ApiClient,
        token: &str,
        auth_type: AuthType,
        location: Option<Location>,
    ) {
        let location = location.unwrap_or(self.location);
        api.set_session(Credential::new(token, auth_type, location, ""));
    }

    /// Forget the session and delete the saved credential. Safe to repeat.
    pub fn logout(&self, api: &mut ApiClient) -> Result<()> {
        let had_session = api.clear_session().is_some();
        if let Some(store) = &self.store {
            store.clear()?;
        }
        if had_session {
            tracing::info!("Logged out");
        }
        Ok(())
    }

    pub fn saved_email(&self) -> Option<String> {
        self.store
            .as_ref()
            .and_then(|store| store.load_or_discard().ok().flatten())
            .map(|credential| credential.email)
            .filter(|email| !email.is_empty())
    }

    pub fn credentials_info(&self, api: &ApiClient) -> CredentialsInfo {
        let credential = api
            .session()
            .map(|s| s.credential.clone())
            .or_else(|| {
                self.store
                    .as_ref()
                    .and_then(|s| s.load_or_discard().ok().flatten())
            });

        CredentialsInfo {
            authenticated: api.is_authenticated(),
            token_manager_enabled: self.store.is_some(),
            file: self.token_file.clone(),
            email: credential
                .as_ref()
                .map(|c| c.email.clone())
                .filter(|e| !e.is_empty()),
            location_id: credential.as_ref().map(|c| c.location_id.id()),
            auth_type: credential.as_ref().map(|c| c.token_type),
            age_days: credential.as_ref().map(Credential::age_days),
        }
    }

    fn persist(&self, credential: &Credential) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        store.save(credential).inspect_err(|e| {
            tracing::error!(
                path = %store.path().display(),
                error = %e,
                "Could not save credential"
            );
        })
    }
}

/// Lightweight authenticated call used to check a token.
async fn check_token(api: &mut ApiClient) -> Result<UserInfo> {
    api.get_as("userinfo", &[]).await
}

/// Credential rejections surface as authentication errors; other failures
/// pass through.
fn rejection_to_auth_error(error: PCloudError) -> PCloudError {
    match error {
        PCloudError::Api {
            code,
            category: ErrorCategory::Auth,
            message,
        } => PCloudError::Authentication(format!("{message} (code {code})")),
        other => other,
    }
}
