//! HTTP client for rankd

use anyhow::{anyhow, Context, Result};
use rank_common::api::{
    BindRoleRequest, ClaimRequest, ErrorResponse, HealthResponse, LeaderboardResponse,
    MemberRankResponse, SnapshotImportRequest, SnapshotImportResponse,
};
use rank_common::ledger::{LegacyEntryInput, LevelRoleBinding};
use rank_common::{ClaimReceipt, CommunityId, MemberId, RoleId};
use serde::de::DeserializeOwned;
use std::time::Duration;

pub struct RankdClient {
    http: reqwest::Client,
    base_url: String,
}

impl RankdClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn community_url(&self, community: CommunityId, rest: &str) -> String {
        self.url(&format!("/v1/communities/{}{}", community, rest))
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.fetch(self.http.get(self.url("/v1/health"))).await
    }

    pub async fn member(&self, community: CommunityId, member: MemberId) -> Result<MemberRankResponse> {
        let url = self.community_url(community, &format!("/members/{}", member));
        self.fetch(self.http.get(url)).await
    }

    pub async fn leaderboard(&self, community: CommunityId, limit: usize) -> Result<LeaderboardResponse> {
        let url = self.community_url(community, "/leaderboard");
        self.fetch(self.http.get(url).query(&[("limit", limit)])).await
    }

    pub async fn claim(
        &self,
        community: CommunityId,
        member: MemberId,
        names: Vec<String>,
    ) -> Result<ClaimReceipt> {
        let url = self.community_url(community, "/claim");
        let body = ClaimRequest { member, names };
        self.fetch(self.http.post(url).json(&body)).await
    }

    pub async fn import(
        &self,
        community: CommunityId,
        entries: Vec<LegacyEntryInput>,
    ) -> Result<SnapshotImportResponse> {
        let url = self.community_url(community, "/snapshot");
        let body = SnapshotImportRequest { entries };
        self.fetch(self.http.post(url).json(&body)).await
    }

    pub async fn roles(&self, community: CommunityId) -> Result<Vec<LevelRoleBinding>> {
        let url = self.community_url(community, "/level-roles");
        self.fetch(self.http.get(url)).await
    }

    pub async fn bind_role(
        &self,
        community: CommunityId,
        level: u32,
        role: RoleId,
    ) -> Result<Vec<LevelRoleBinding>> {
        let url = self.community_url(community, "/level-roles");
        let body = BindRoleRequest { level, role };
        self.fetch(self.http.post(url).json(&body)).await
    }

    pub async fn unbind_role(&self, community: CommunityId, role: RoleId) -> Result<()> {
        let url = self.community_url(community, &format!("/level-roles/{}", role));
        let response = self.send(self.http.delete(url)).await?;
        check(response).await?;
        Ok(())
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        request.send().await.map_err(|e| {
            anyhow!(
                "Cannot reach rankd at {}: {}\n\n\
                 Check that the daemon is running or pass --url.",
                self.base_url,
                e
            )
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = check(self.send(request).await?).await?;
        response
            .json()
            .await
            .context("Unexpected response from rankd")
    }
}

/// Turn an error status into the daemon's error message.
async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match response.json::<ErrorResponse>().await {
        Ok(body) => Err(anyhow!("{} ({})", body.error, body.code)),
        Err(_) => Err(anyhow!("rankd answered with status {}", status)),
    }
}
