//! GitHub pull request lookups for cards sitting in review.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use scrumbot_core::domain::board::PullRequest;
use scrumbot_core::errors::PortError;
use scrumbot_core::ports::GithubApi;

use crate::http::send_json;

pub const GITHUB_API: &str = "https://api.github.com";
const SERVICE: &str = "github";
const USER_AGENT: &str = "scrumbot";

#[derive(Clone)]
pub struct GithubClient {
    client: Client,
    base_url: String,
    org: String,
    token: Option<SecretString>,
}

impl GithubClient {
    pub fn new(client: Client, org: impl Into<String>, token: Option<SecretString>) -> Self {
        Self { client, base_url: GITHUB_API.to_string(), org: org.into(), token }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn pull_url(&self, repo: &str, number: u64) -> String {
        format!("{}/repos/{}/{repo}/pulls/{number}", self.base_url, self.org)
    }
}

#[derive(Debug, Deserialize)]
struct PullPayload {
    number: u64,
    #[serde(default)]
    merged: bool,
    merged_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl From<PullPayload> for PullRequest {
    fn from(payload: PullPayload) -> Self {
        Self {
            number: payload.number,
            merged: payload.merged || payload.merged_at.is_some(),
            merged_at: payload.merged_at,
            updated_at: payload.updated_at,
        }
    }
}

#[async_trait]
impl GithubApi for GithubClient {
    async fn pull_request(&self, repo: &str, number: u64) -> Result<PullRequest, PortError> {
        let mut request = self
            .client
            .get(self.pull_url(repo, number))
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }
        let payload: PullPayload = send_json(SERVICE, request).await?;
        Ok(payload.into())
    }
}
