//! Trello REST client.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

use scrumbot_core::domain::board::{
    Attachment, Board, BoardList, Card, CardAction, FieldUpdate, Label, Member, PluginData,
};
use scrumbot_core::errors::PortError;
use scrumbot_core::ports::TrelloApi;

use crate::http::{send, send_json};

pub const TRELLO_API: &str = "https://api.trello.com/1";
const SERVICE: &str = "trello";

#[derive(Clone)]
pub struct TrelloClient {
    client: Client,
    base_url: String,
    key: SecretString,
    token: SecretString,
}

impl TrelloClient {
    pub fn new(client: Client, key: SecretString, token: SecretString) -> Self {
        Self::with_base_url(client, TRELLO_API, key, token)
    }

    pub fn with_base_url(
        client: Client,
        base_url: impl Into<String>,
        key: SecretString,
        token: SecretString,
    ) -> Self {
        Self { client, base_url: base_url.into().trim_end_matches('/').to_string(), key, token }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        debug!(event_name = "trello.request", method = %method, path = %path, "trello call");
        self.client.request(method, format!("{}{path}", self.base_url)).query(&[
            ("key", self.key.expose_secret()),
            ("token", self.token.expose_secret()),
        ])
    }

    async fn execute(&self, request: RequestBuilder) -> Result<(), PortError> {
        send(SERVICE, request).await.map(|_| ())
    }
}

/// Body for the custom field item endpoint. An empty text clears the field.
pub fn custom_field_body(value: &FieldUpdate) -> Value {
    match value {
        FieldUpdate::Text(text) if text.is_empty() => json!({ "value": "" }),
        FieldUpdate::Text(text) => json!({ "value": { "text": text } }),
        FieldUpdate::Number(number) => json!({ "value": { "number": number } }),
    }
}

#[async_trait]
impl TrelloApi for TrelloClient {
    async fn board(&self, board_id: &str) -> Result<Board, PortError> {
        let request = self
            .request(Method::GET, &format!("/boards/{board_id}"))
            .query(&[("fields", "name,url,shortUrl")]);
        send_json(SERVICE, request).await
    }

    async fn board_lists(&self, board_id: &str) -> Result<Vec<BoardList>, PortError> {
        let request = self
            .request(Method::GET, &format!("/boards/{board_id}/lists"))
            .query(&[("filter", "open")]);
        send_json(SERVICE, request).await
    }

    async fn board_labels(&self, board_id: &str) -> Result<Vec<Label>, PortError> {
        let request = self
            .request(Method::GET, &format!("/boards/{board_id}/labels"))
            .query(&[("limit", "1000")]);
        send_json(SERVICE, request).await
    }

    async fn board_cards(&self, board_id: &str) -> Result<Vec<Card>, PortError> {
        let request = self
            .request(Method::GET, &format!("/boards/{board_id}/cards/visible"))
            .query(&[("customFieldItems", "true")]);
        send_json(SERVICE, request).await
    }

    async fn list_cards(&self, list_id: &str) -> Result<Vec<Card>, PortError> {
        let request = self
            .request(Method::GET, &format!("/lists/{list_id}/cards"))
            .query(&[("customFieldItems", "true")]);
        send_json(SERVICE, request).await
    }

    async fn card_plugin_data(&self, card_id: &str) -> Result<Vec<PluginData>, PortError> {
        send_json(SERVICE, self.request(Method::GET, &format!("/cards/{card_id}/pluginData"))).await
    }

    async fn card_actions(
        &self,
        card_id: &str,
        filter: &str,
    ) -> Result<Vec<CardAction>, PortError> {
        let request = self
            .request(Method::GET, &format!("/cards/{card_id}/actions"))
            .query(&[("filter", filter), ("limit", "1000")]);
        send_json(SERVICE, request).await
    }

    async fn card_attachments(&self, card_id: &str) -> Result<Vec<Attachment>, PortError> {
        send_json(SERVICE, self.request(Method::GET, &format!("/cards/{card_id}/attachments"))).await
    }

    async fn card_members(&self, card_id: &str) -> Result<Vec<Member>, PortError> {
        let request = self
            .request(Method::GET, &format!("/cards/{card_id}/members"))
            .query(&[("fields", "username,fullName")]);
        send_json(SERVICE, request).await
    }

    async fn move_card(&self, card_id: &str, list_id: &str) -> Result<(), PortError> {
        let request =
            self.request(Method::PUT, &format!("/cards/{card_id}")).query(&[("idList", list_id)]);
        self.execute(request).await
    }

    async fn move_card_to_top(&self, card_id: &str) -> Result<(), PortError> {
        let request = self.request(Method::PUT, &format!("/cards/{card_id}")).query(&[("pos", "top")]);
        self.execute(request).await
    }

    async fn remove_label(&self, card_id: &str, label_id: &str) -> Result<(), PortError> {
        self.execute(self.request(Method::DELETE, &format!("/cards/{card_id}/idLabels/{label_id}")))
            .await
    }

    async fn remove_member(&self, card_id: &str, member_id: &str) -> Result<(), PortError> {
        self.execute(self.request(Method::DELETE, &format!("/cards/{card_id}/idMembers/{member_id}")))
            .await
    }

    async fn add_comment(&self, card_id: &str, text: &str) -> Result<(), PortError> {
        let request = self
            .request(Method::POST, &format!("/cards/{card_id}/actions/comments"))
            .query(&[("text", text)]);
        self.execute(request).await
    }

    async fn set_custom_field(
        &self,
        card_id: &str,
        field_id: &str,
        value: FieldUpdate,
    ) -> Result<(), PortError> {
        let request = self
            .request(Method::PUT, &format!("/cards/{card_id}/customField/{field_id}/item"))
            .json(&custom_field_body(&value));
        self.execute(request).await
    }

    async fn archive_card(&self, card_id: &str) -> Result<(), PortError> {
        let request =
            self.request(Method::PUT, &format!("/cards/{card_id}")).query(&[("closed", "true")]);
        self.execute(request).await
    }

    async fn create_card(&self, list_id: &str, name: &str) -> Result<Card, PortError> {
        let request =
            self.request(Method::POST, "/cards").query(&[("idList", list_id), ("name", name)]);
        send_json(SERVICE, request).await
    }

    async fn create_board(&self, name: &str, org_id: &str) -> Result<Board, PortError> {
        let request = self.request(Method::POST, "/boards").query(&[
            ("name", name),
            ("idOrganization", org_id),
            ("defaultLists", "false"),
        ]);
        send_json(SERVICE, request).await
    }

    async fn create_list(&self, board_id: &str, name: &str) -> Result<BoardList, PortError> {
        let request = self.request(Method::POST, "/lists").query(&[
            ("name", name),
            ("idBoard", board_id),
            ("pos", "top"),
        ]);
        send_json(SERVICE, request).await
    }

    async fn add_board_to_collection(
        &self,
        board_id: &str,
        collection_id: &str,
    ) -> Result<(), PortError> {
        let request = self
            .request(Method::POST, &format!("/boards/{board_id}/idTags"))
            .query(&[("value", collection_id)]);
        self.execute(request).await
    }

    async fn add_board_member(&self, board_id: &str, username: &str) -> Result<(), PortError> {
        let request = self
            .request(Method::PUT, &format!("/boards/{board_id}/members/{username}"))
            .query(&[("type", "normal")]);
        self.execute(request).await
    }
}
