//! HTTP transport: URL building, token attachment, timeouts and retries.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio_util::io::ReaderStream;

use crate::config::ClientConfig;
use crate::envelope;
use crate::error::{PCloudError, Result};
use crate::models::{Location, UserInfo};
use crate::token_store::Credential;

/// Upper bound for a single backoff pause.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// The authenticated state of one SDK instance.
#[derive(Debug, Clone)]
pub struct Session {
    pub credential: Credential,
    /// API root derived from the credential's location, ending in `/`.
    pub base_url: String,
    pub(crate) user_info: Option<UserInfo>,
}

/// How many times, and how patiently, transient failures are retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Exponential backoff: `base_delay * 2^attempt`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// retry budget is spent. `op` receives the 1-based attempt number.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        tracing::debug!(
            endpoint = label,
            attempt = attempt + 1,
            max_retries = policy.max_retries,
            "Executing request attempt"
        );

        match op(attempt + 1).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    endpoint = label,
                    error = %e,
                    "Transient failure, retrying after {}ms (attempt {}/{})",
                    delay.as_millis(),
                    attempt + 1,
                    policy.max_retries
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::error!(
                        endpoint = label,
                        error = %e,
                        total_attempts = attempt + 1,
                        "Request failed after all retries"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Turn an HTTP response into an envelope payload.
async fn read_envelope(response: Response) -> Result<Map<String, Value>> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PCloudError::HttpStatus {
            status: status.as_u16(),
            body,
        });
    }
    let body = response.text().await?;
    envelope::decode(&body)
}

/// Low-level pCloud API client holding the HTTP pool and the session.
///
/// Not meant for concurrent use: every call that may touch the session
/// takes `&mut self`.
pub struct ApiClient {
    http: Client,
    config: ClientConfig,
    session: Option<Session>,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http,
            config,
            session: None,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.config.max_retries,
            base_delay: self.config.retry_base_delay,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub(crate) fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    /// Bind a credential; the base URL follows its location.
    pub fn set_session(&mut self, credential: Credential) {
        let base_url = self.config.base_url_for(credential.location_id);
        self.session = Some(Session {
            credential,
            base_url,
            user_info: None,
        });
    }

    pub fn clear_session(&mut self) -> Option<Session> {
        self.session.take()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| !s.credential.access_token.is_empty())
    }

    /// Scheme of the API root, reused for download hosts.
    pub(crate) fn scheme(&self) -> &'static str {
        let base = match &self.session {
            Some(session) => session.base_url.clone(),
            None => self.config.base_url_for(self.config.location),
        };
        if base.starts_with("http://") {
            "http"
        } else {
            "https"
        }
    }

    /// Full URL plus query (including the token) for an authenticated call.
    fn prepare(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<(String, Vec<(String, String)>)> {
        let session = self
            .session
            .as_ref()
            .filter(|s| !s.credential.access_token.is_empty())
            .ok_or_else(|| PCloudError::Authentication("not logged in".to_string()))?;

        let mut query: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        query.push((
            session.credential.token_type.param_name().to_string(),
            session.credential.access_token.clone(),
        ));

        Ok((format!("{}{}", session.base_url, endpoint), query))
    }

    /// Drop the session when the server says the token is no longer good.
    fn observe<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_auth_failure() && self.session.take().is_some() {
                tracing::warn!(error = %e, "Token rejected, session cleared; log in again");
            }
        }
        result
    }

    /// Authenticated GET returning the envelope payload.
    pub async fn get(
        &mut self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Map<String, Value>> {
        let (url, query) = self.prepare(endpoint, params)?;
        let http = &self.http;
        let (url, query) = (url.as_str(), query.as_slice());

        let result = with_retry(self.retry_policy(), endpoint, move |_| async move {
            let response = http.get(url).query(query).send().await?;
            read_envelope(response).await
        })
        .await;
        self.observe(result)
    }

    /// Authenticated GET shaped into `T`.
    pub async fn get_as<T: DeserializeOwned>(
        &mut self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let payload = self.get(endpoint, params).await?;
        envelope::parse_payload(payload)
    }

    /// Unauthenticated GET against a region, for login and token exchange.
    pub async fn get_public(
        &self,
        location: Location,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Map<String, Value>> {
        let url = format!("{}{}", self.config.base_url_for(location), endpoint);
        let http = &self.http;
        let url = url.as_str();

        with_retry(self.retry_policy(), endpoint, move |_| async move {
            let response = http.get(url).query(params).send().await?;
            read_envelope(response).await
        })
        .await
    }

    /// Authenticated PUT with a raw body (used for upload chunks).
    pub async fn put_body(
        &mut self,
        endpoint: &str,
        params: &[(&str, String)],
        body: &[u8],
    ) -> Result<Map<String, Value>> {
        let (url, query) = self.prepare(endpoint, params)?;
        let http = &self.http;
        let (url, query) = (url.as_str(), query.as_slice());

        let result = with_retry(self.retry_policy(), endpoint, move |_| async move {
            let response = http
                .put(url)
                .query(query)
                .body(body.to_vec())
                .send()
                .await?;
            read_envelope(response).await
        })
        .await;
        self.observe(result)
    }

    /// Authenticated multipart POST streaming one local file.
    pub async fn post_file(
        &mut self,
        endpoint: &str,
        params: &[(&str, String)],
        path: &Path,
        filename: &str,
    ) -> Result<Map<String, Value>> {
        let (url, query) = self.prepare(endpoint, params)?;
        let http = &self.http;
        let (url, query) = (url.as_str(), query.as_slice());
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string();
        let mime_type = mime_type.as_str();

        let result = with_retry(self.retry_policy(), endpoint, move |_| async move {
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|e| PCloudError::local_io(path, e))?;
            let length = file
                .metadata()
                .await
                .map_err(|e| PCloudError::local_io(path, e))?
                .len();

            let body = Body::wrap_stream(ReaderStream::new(file));
            let part = Part::stream_with_length(body, length)
                .file_name(filename.to_string())
                .mime_str(mime_type)?;
            let form = Form::new().part("file", part);

            let response = http
                .post(url)
                .query(query)
                .multipart(form)
                .send()
                .await?;
            read_envelope(response).await
        })
        .await;
        self.observe(result)
    }

    /// Open a streamed GET on an absolute URL (download hosts).
    pub async fn open_stream(&self, url: &str) -> Result<Response> {
        let http = &self.http;
        with_retry(self.retry_policy(), "download", move |_| async move {
            let response = http.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(PCloudError::HttpStatus {
                    status: status.as_u16(),
                    body,
                });
            }
            Ok(response)
        })
        .await
    }
}
