use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Board {
    pub id: String,
    pub name: String,
    pub url: String,
    pub short_url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BoardList {
    pub id: String,
    pub name: String,
    pub closed: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Label {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Member {
    pub id: String,
    pub username: String,
    pub full_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Attachment {
    pub id: String,
    pub name: String,
    pub url: String,
    pub is_upload: bool,
}

/// Private data a power-up stored on a card. `value` is the raw JSON string.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginData {
    pub id_plugin: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldValue {
    pub text: Option<String>,
    pub number: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomFieldItem {
    pub id_custom_field: String,
    pub value: Option<FieldValue>,
}

/// Value written to a custom field. Trello wants numbers as strings too.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldUpdate {
    Text(String),
    Number(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Card {
    pub id: String,
    pub id_short: u64,
    pub name: String,
    pub url: String,
    pub short_url: String,
    pub id_list: String,
    pub id_board: String,
    pub closed: bool,
    pub labels: Vec<Label>,
    pub id_labels: Vec<String>,
    pub id_members: Vec<String>,
    pub custom_field_items: Vec<CustomFieldItem>,
    pub date_last_activity: Option<DateTime<Utc>>,
}

impl Card {
    pub fn has_label(&self, label_id: &str) -> bool {
        !label_id.is_empty()
            && (self.id_labels.iter().any(|id| id == label_id)
                || self.labels.iter().any(|label| label.id == label_id))
    }

    pub fn label_ids(&self) -> Vec<&str> {
        if self.id_labels.is_empty() {
            self.labels.iter().map(|label| label.id.as_str()).collect()
        } else {
            self.id_labels.iter().map(String::as_str).collect()
        }
    }

    pub fn has_labels(&self) -> bool {
        !self.id_labels.is_empty() || !self.labels.is_empty()
    }

    /// Text or number held by a custom field, `None` when the card has no item for it.
    pub fn field(&self, field_id: &str) -> Option<&str> {
        self.custom_field_items
            .iter()
            .find(|item| item.id_custom_field == field_id)
            .and_then(|item| item.value.as_ref())
            .and_then(|value| value.number.as_deref().or(value.text.as_deref()))
    }

    /// Creation time encoded in the first eight hex digits of the card id.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        created_at_from_id(&self.id)
    }

    /// `true` for titles tagged `{spike}`, which are allowed to carry zero points.
    pub fn is_spike(&self) -> bool {
        braced_tag(&self.name).is_some_and(|tag| tag.eq_ignore_ascii_case("spike"))
    }

    pub fn link(&self) -> String {
        format!("<https://trello.com/c/{}|{}>", self.id, self.name)
    }

    pub fn short_link(&self) -> String {
        let url = if self.short_url.is_empty() { &self.url } else { &self.short_url };
        format!("<{}|{}>", url, self.name)
    }
}

pub fn created_at_from_id(id: &str) -> Option<DateTime<Utc>> {
    let prefix = id.get(0..8)?;
    let seconds = i64::from_str_radix(prefix, 16).ok()?;
    Utc.timestamp_opt(seconds, 0).single()
}

/// Text between the first `{` and the following `}`.
pub fn braced_tag(value: &str) -> Option<&str> {
    let start = value.find('{')? + 1;
    let end = value[start..].find('}')? + start;
    Some(&value[start..end])
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionList {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActionData {
    pub list_before: Option<ActionList>,
    pub list_after: Option<ActionList>,
    pub list: Option<ActionList>,
    pub text: Option<String>,
}

/// One entry of a card's history (`updateCard:idList`, `createCard`, `commentCard`, ...).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CardAction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub date: Option<DateTime<Utc>>,
    pub id_member_creator: String,
    pub data: ActionData,
}

impl CardAction {
    pub fn moved_into(&self, list_id: &str) -> bool {
        self.data.list_after.as_ref().is_some_and(|list| list.id == list_id)
    }

    pub fn moved_from(&self, list_id: &str) -> bool {
        self.data.list_before.as_ref().is_some_and(|list| list.id == list_id)
    }
}

/// Most recent time the card was moved into `list_id`, if its history shows one.
pub fn entered_list_at(actions: &[CardAction], list_id: &str) -> Option<DateTime<Utc>> {
    actions.iter().filter(|action| action.moved_into(list_id)).filter_map(|action| action.date).max()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub merged: bool,
    pub merged_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Repository and number from a `https://github.com/{org}/{repo}/pull/{n}` link.
pub fn parse_pull_request_url(url: &str) -> Option<(String, u64)> {
    if !url.contains("github.com") || !url.contains("/pull/") {
        return None;
    }
    let segments: Vec<&str> =
        url.trim_end_matches('/').split('/').filter(|segment| !segment.is_empty()).collect();
    if segments.len() < 3 {
        return None;
    }
    let number = segments[segments.len() - 1].parse::<u64>().ok()?;
    let repo = segments[segments.len() - 3].to_string();
    Some((repo, number))
}
