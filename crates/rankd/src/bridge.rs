//! Gateway bridge clients
//!
//! The chat gateway itself lives in a separate process; rankd reaches it over
//! a small HTTP API to read and grant roles and to post announcements.

use async_trait::async_trait;
use rank_common::{
    AnnouncementSink, ChannelId, CommunityId, MemberId, RoleGrantExecutor, RoleId,
    SideEffectError,
};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// HTTP client for the gateway bridge
pub struct HttpBridge {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct MessageBody<'a> {
    community: CommunityId,
    content: &'a str,
}

impl HttpBridge {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn roles_url(&self, community: CommunityId, member: MemberId) -> String {
        format!(
            "{}/communities/{}/members/{}/roles",
            self.base_url, community, member
        )
    }
}

fn request_error(err: reqwest::Error) -> SideEffectError {
    if let Some(status) = err.status() {
        SideEffectError::Status(status.as_u16())
    } else if err.is_timeout() {
        SideEffectError::Request("timed out".to_string())
    } else {
        SideEffectError::Request(err.to_string())
    }
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SideEffectError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(SideEffectError::Status(status.as_u16()))
    }
}

#[async_trait]
impl RoleGrantExecutor for HttpBridge {
    async fn has_role(
        &self,
        community: CommunityId,
        member: MemberId,
        role: RoleId,
    ) -> Result<bool, SideEffectError> {
        let response = self
            .client
            .get(self.roles_url(community, member))
            .send()
            .await
            .map_err(request_error)?;
        let roles: Vec<RoleId> = check_status(response)?
            .json()
            .await
            .map_err(request_error)?;
        Ok(roles.contains(&role))
    }

    async fn grant_role(
        &self,
        community: CommunityId,
        member: MemberId,
        role: RoleId,
    ) -> Result<(), SideEffectError> {
        let url = format!("{}/{}", self.roles_url(community, member), role);
        let response = self.client.put(url).send().await.map_err(request_error)?;
        check_status(response)?;
        debug!("Bridge granted role {} to {}", role, member);
        Ok(())
    }
}

#[async_trait]
impl AnnouncementSink for HttpBridge {
    async fn send(
        &self,
        community: CommunityId,
        channel: ChannelId,
        text: &str,
    ) -> Result<(), SideEffectError> {
        let url = format!("{}/channels/{}/messages", self.base_url, channel);
        let response = self
            .client
            .post(url)
            .json(&MessageBody {
                community,
                content: text,
            })
            .send()
            .await
            .map_err(request_error)?;
        check_status(response)?;
        Ok(())
    }
}

/// Used when no bridge is configured. Logs every side effect and reports
/// success; members are treated as holding no roles.
#[derive(Default)]
pub struct LogBridge;

#[async_trait]
impl RoleGrantExecutor for LogBridge {
    async fn has_role(
        &self,
        _community: CommunityId,
        _member: MemberId,
        _role: RoleId,
    ) -> Result<bool, SideEffectError> {
        Ok(false)
    }

    async fn grant_role(
        &self,
        community: CommunityId,
        member: MemberId,
        role: RoleId,
    ) -> Result<(), SideEffectError> {
        info!("[no bridge] grant role {} to {} in {}", role, member, community);
        Ok(())
    }
}

#[async_trait]
impl AnnouncementSink for LogBridge {
    async fn send(
        &self,
        community: CommunityId,
        channel: ChannelId,
        text: &str,
    ) -> Result<(), SideEffectError> {
        info!("[no bridge] {} #{}: {}", community, channel, text);
        Ok(())
    }
}
