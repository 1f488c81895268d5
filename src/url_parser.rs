//! Extraction of OAuth2 authorization codes from pCloud redirect URLs.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{PCloudError, Result};
use crate::models::Location;

static CODE_PARAM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&#]code=([a-zA-Z0-9_-]+)").expect("Invalid code param regex"));

static LOCATION_PARAM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&#]locationid=(\d+)").expect("Invalid locationid param regex"));

static ERROR_PARAM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&#]error=([^&#]+)").expect("Invalid error param regex"));

static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://").expect("Invalid URL regex"));

/// A raw authorization code (alphanumeric, underscore, hyphen).
static RAW_CODE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("Invalid code regex"));

/// What the OAuth2 redirect handed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCode {
    pub code: String,
    /// Region of the account, when the redirect carried `locationid`.
    pub location: Option<Location>,
}

/// Extract the authorization code from a redirect URL, or validate a raw code.
///
/// Supports:
/// - `https://host/callback?code=<CODE>&locationid=2&hostname=eapi.pcloud.com`
/// - `http://localhost:8080/?locationid=1&code=<CODE>`
/// - Raw code string
///
/// # Examples
///
/// ```
/// use pcloud_sdk::url_parser::parse_authorization_redirect;
/// use pcloud_sdk::Location;
///
/// let url = "http://localhost/cb?code=abc123&locationid=2";
/// let auth = parse_authorization_redirect(url).unwrap();
/// assert_eq!(auth.code, "abc123");
/// assert_eq!(auth.location, Some(Location::Eu));
///
/// let auth = parse_authorization_redirect("abc123").unwrap();
/// assert_eq!(auth.location, None);
/// ```
pub fn parse_authorization_redirect(url_or_code: &str) -> Result<AuthorizationCode> {
    let trimmed = url_or_code.trim();

    if URL_REGEX.is_match(trimmed) {
        if let Some(captures) = ERROR_PARAM_REGEX.captures(trimmed) {
            return Err(PCloudError::InvalidCodeOrUrl(format!(
                "authorization was refused: {}",
                &captures[1]
            )));
        }

        let code = CODE_PARAM_REGEX
            .captures(trimmed)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| {
                PCloudError::InvalidCodeOrUrl(format!("no 'code' parameter in {trimmed}"))
            })?;

        let location = match LOCATION_PARAM_REGEX.captures(trimmed) {
            Some(captures) => {
                let id: u8 = captures[1].parse().map_err(|_| {
                    PCloudError::InvalidCodeOrUrl(format!("bad locationid in {trimmed}"))
                })?;
                Some(Location::try_from(id)?)
            }
            None => None,
        };

        return Ok(AuthorizationCode { code, location });
    }

    if RAW_CODE_REGEX.is_match(trimmed) {
        return Ok(AuthorizationCode {
            code: trimmed.to_string(),
            location: None,
        });
    }

    Err(PCloudError::InvalidCodeOrUrl(url_or_code.to_string()))
}
