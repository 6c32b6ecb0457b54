//! Slack Web API and incoming webhook client.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use scrumbot_core::errors::PortError;
use scrumbot_core::ports::{ChatNotifier, Notice};

use crate::message::{BotIdentity, MessagePayload};

pub const SLACK_API: &str = "https://slack.com/api";
const SERVICE: &str = "slack";
const DEFAULT_RETRY_AFTER_SECS: u64 = 30;
const MEMBER_PAGE_SIZE: &str = "200";

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SlackProfile {
    pub real_name: String,
    pub display_name: String,
    pub email: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SlackUser {
    pub id: String,
    pub name: String,
    pub real_name: String,
    pub profile: SlackProfile,
}

impl SlackUser {
    /// Real name from the profile, falling back to the account level fields.
    pub fn full_name(&self) -> &str {
        [self.profile.real_name.as_str(), self.real_name.as_str(), self.name.as_str()]
            .into_iter()
            .find(|name| !name.trim().is_empty())
            .unwrap_or_default()
    }
}

/// Workspace lookups used for permission checks and self-registration.
#[async_trait]
pub trait SlackDirectory: Send + Sync {
    async fn user(&self, user_id: &str) -> Result<SlackUser, PortError>;
    async fn channel_members(&self, channel: &str) -> Result<Vec<String>, PortError>;
}

/// `true` when a member of `channel` has the same Slack name as `user_id`.
pub async fn member_by_name(
    directory: &dyn SlackDirectory,
    channel: &str,
    user_id: &str,
) -> Result<bool, PortError> {
    if channel.is_empty() {
        return Ok(false);
    }
    let requester = directory.user(user_id).await?;
    for member_id in directory.channel_members(channel).await? {
        let member = directory.user(&member_id).await?;
        if member.name.eq_ignore_ascii_case(&requester.name) {
            return Ok(true);
        }
    }
    Ok(false)
}

#[derive(Clone)]
pub struct SlackWebClient {
    client: Client,
    base_url: String,
    bot_token: SecretString,
    app_token: SecretString,
    webhook_url: Option<SecretString>,
    identity: BotIdentity,
}

impl SlackWebClient {
    pub fn new(
        client: Client,
        bot_token: SecretString,
        app_token: SecretString,
        webhook_url: Option<SecretString>,
        identity: BotIdentity,
    ) -> Self {
        Self {
            client,
            base_url: SLACK_API.to_string(),
            bot_token,
            app_token,
            webhook_url,
            identity,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn identity(&self) -> &BotIdentity {
        &self.identity
    }

    /// Socket Mode websocket url from `apps.connections.open`.
    pub async fn open_socket_url(&self) -> Result<String, PortError> {
        let request = self
            .client
            .post(self.method_url("apps.connections.open"))
            .bearer_auth(self.app_token.expose_secret());
        let response = finish("apps.connections.open", request).await?;
        response
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PortError::Decode {
                service: SERVICE,
                message: "apps.connections.open returned no url".into(),
            })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    async fn get(&self, method: &str, query: &[(&str, &str)]) -> Result<Value, PortError> {
        let request = self
            .client
            .get(self.method_url(method))
            .bearer_auth(self.bot_token.expose_secret())
            .query(query);
        finish(method, request).await
    }

    async fn post_json(&self, method: &str, body: &Value) -> Result<Value, PortError> {
        let request = self
            .client
            .post(self.method_url(method))
            .bearer_auth(self.bot_token.expose_secret())
            .json(body);
        finish(method, request).await
    }

    async fn post_webhook(&self, url: &SecretString, payload: &MessagePayload) -> Result<(), PortError> {
        let response = self
            .client
            .post(url.expose_secret())
            .json(payload)
            .send()
            .await
            .map_err(|error| PortError::Transport { service: SERVICE, message: error.to_string() })?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(PortError::Status { service: SERVICE, status, body });
        }
        Ok(())
    }

    async fn open_direct_channel(&self, user_id: &str) -> Result<String, PortError> {
        let response = self.post_json("conversations.open", &json!({ "users": user_id })).await?;
        response
            .pointer("/channel/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PortError::Decode {
                service: SERVICE,
                message: "conversations.open returned no channel".into(),
            })
    }
}

#[async_trait]
impl ChatNotifier for SlackWebClient {
    async fn post(&self, notice: &Notice) -> Result<(), PortError> {
        let payload = MessagePayload::from_notice(notice, &self.identity);
        debug!(event_name = "egress.slack.post", channel = %notice.channel, "posting slack message");
        match &self.webhook_url {
            Some(url) => self.post_webhook(url, &payload).await,
            None => {
                let body = serde_json::to_value(&payload).map_err(|error| PortError::Decode {
                    service: SERVICE,
                    message: error.to_string(),
                })?;
                self.post_json("chat.postMessage", &body).await.map(|_| ())
            }
        }
    }

    async fn direct_message(&self, slack_user_id: &str, notice: &Notice) -> Result<(), PortError> {
        let channel = self.open_direct_channel(slack_user_id).await?;
        let payload = MessagePayload::from_notice(notice, &self.identity).to_channel(channel);
        let body = serde_json::to_value(&payload)
            .map_err(|error| PortError::Decode { service: SERVICE, message: error.to_string() })?;
        debug!(event_name = "egress.slack.direct_message", user = %slack_user_id, "sending slack dm");
        self.post_json("chat.postMessage", &body).await.map(|_| ())
    }
}

#[async_trait]
impl SlackDirectory for SlackWebClient {
    async fn user(&self, user_id: &str) -> Result<SlackUser, PortError> {
        let response = self.get("users.info", &[("user", user_id)]).await?;
        let user = response.get("user").cloned().unwrap_or(Value::Null);
        serde_json::from_value(user)
            .map_err(|error| PortError::Decode { service: SERVICE, message: error.to_string() })
    }

    async fn channel_members(&self, channel: &str) -> Result<Vec<String>, PortError> {
        let mut members = Vec::new();
        let mut cursor = String::new();
        loop {
            let mut query = vec![("channel", channel), ("limit", MEMBER_PAGE_SIZE)];
            if !cursor.is_empty() {
                query.push(("cursor", cursor.as_str()));
            }
            let response = self.get("conversations.members", &query).await?;
            let page = member_page(&response);
            members.extend(page.members);
            if page.next_cursor.is_empty() {
                return Ok(members);
            }
            cursor = page.next_cursor;
        }
    }
}

struct MemberPage {
    members: Vec<String>,
    next_cursor: String,
}

fn member_page(response: &Value) -> MemberPage {
    let members = response
        .get("members")
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    let next_cursor = response
        .pointer("/response_metadata/next_cursor")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    MemberPage { members, next_cursor }
}

/// Sends a Web API request and unwraps Slack's `ok`/`error` envelope.
async fn finish(method: &str, request: RequestBuilder) -> Result<Value, PortError> {
    let response = request
        .send()
        .await
        .map_err(|error| PortError::Transport { service: SERVICE, message: error.to_string() })?;

    if response.status() == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get("Retry-After")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        return Err(PortError::RateLimited { service: SERVICE, retry_after_secs });
    }
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(PortError::Status { service: SERVICE, status, body });
    }

    let body: Value = response
        .json()
        .await
        .map_err(|error| PortError::Decode { service: SERVICE, message: error.to_string() })?;
    check_ok(method, body)
}

fn check_ok(method: &str, body: Value) -> Result<Value, PortError> {
    if body.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(body);
    }
    let error = body.get("error").and_then(Value::as_str).unwrap_or("unknown");
    Err(PortError::Rejected { service: SERVICE, message: format!("{method} failed: {error}") })
}
