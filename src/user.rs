//! Account information.

use crate::error::Result;
use crate::models::UserInfo;
use crate::transport::ApiClient;

/// User operations, borrowed from the SDK.
pub struct User<'a> {
    api: &'a mut ApiClient,
}

impl<'a> User<'a> {
    pub fn new(api: &'a mut ApiClient) -> Self {
        Self { api }
    }

    /// Full `userinfo`, fetched once per session and then cached.
    pub async fn get_user_info(&mut self) -> Result<UserInfo> {
        if let Some(info) = self.api.session().and_then(|s| s.user_info.clone()) {
            return Ok(info);
        }
        self.refresh_user_info().await
    }

    /// Fetch `userinfo` again, replacing the cached copy.
    pub async fn refresh_user_info(&mut self) -> Result<UserInfo> {
        let info: UserInfo = self.api.get_as("userinfo", &[]).await?;
        if let Some(session) = self.api.session_mut() {
            session.user_info = Some(info.clone());
        }
        Ok(info)
    }

    pub async fn get_user_id(&mut self) -> Result<u64> {
        Ok(self.get_user_info().await?.userid)
    }

    pub async fn get_user_email(&mut self) -> Result<String> {
        Ok(self.get_user_info().await?.email)
    }

    pub async fn get_used_quota(&mut self) -> Result<u64> {
        Ok(self.get_user_info().await?.usedquota)
    }

    pub async fn get_quota(&mut self) -> Result<u64> {
        Ok(self.get_user_info().await?.quota)
    }

    pub async fn get_public_link_quota(&mut self) -> Result<u64> {
        Ok(self.get_user_info().await?.publiclinkquota.unwrap_or(0))
    }

    /// Bytes left; zero for an account over its quota.
    pub async fn get_free_quota(&mut self) -> Result<u64> {
        let info = self.get_user_info().await?;
        Ok(info.quota.saturating_sub(info.usedquota))
    }
}
