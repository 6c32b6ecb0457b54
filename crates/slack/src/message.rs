use serde::Serialize;

use scrumbot_core::ports::Notice;

/// Name and emoji the bot posts under.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BotIdentity {
    pub name: String,
    pub emoji: String,
}

/// Legacy attachment with a coloured side bar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub color: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub pretext: String,
    pub text: String,
    pub mrkdwn_in: Vec<&'static str>,
}

/// Body accepted by both the incoming webhook and `chat.postMessage`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessagePayload {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub channel: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_emoji: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl MessagePayload {
    pub fn from_notice(notice: &Notice, identity: &BotIdentity) -> Self {
        let attachments = notice
            .attachment
            .iter()
            .map(|attachment| Attachment {
                color: attachment.color.clone(),
                title: attachment.title.clone(),
                pretext: attachment.pretext.clone(),
                text: attachment.text.clone(),
                mrkdwn_in: vec!["text", "pretext"],
            })
            .collect();

        Self {
            channel: notice.channel.clone(),
            text: notice.text.clone(),
            username: non_empty(&identity.name),
            icon_emoji: non_empty(&identity.emoji).map(|emoji| emoji_code(&emoji)),
            attachments,
        }
    }

    pub fn to_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// `robot_face` and `:robot_face:` both become `:robot_face:`.
fn emoji_code(emoji: &str) -> String {
    format!(":{}:", emoji.trim_matches(':'))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use scrumbot_core::ports::Notice;

    use super::{BotIdentity, MessagePayload};

    fn identity() -> BotIdentity {
        BotIdentity { name: "TikTok".into(), emoji: "alarm_clock".into() }
    }

    #[test]
    fn plain_notice_serializes_without_attachments() {
        let payload = MessagePayload::from_notice(&Notice::text("C42", "Hello team"), &identity());

        assert_eq!(
            serde_json::to_value(&payload).expect("json"),
            json!({
                "channel": "C42",
                "text": "Hello team",
                "username": "TikTok",
                "icon_emoji": ":alarm_clock:"
            })
        );
    }

    #[test]
    fn attachment_notice_keeps_colour_and_markdown_fields() {
        let notice =
            Notice::with_attachment("C1", "<!here> Warning Un-Assigned Work!!", "#ff0000", "card one\n")
                .titled("Working");
        let payload = MessagePayload::from_notice(&notice, &BotIdentity::default()).to_channel("D9");
        let value = serde_json::to_value(&payload).expect("json");

        assert_eq!(value["channel"], "D9");
        assert!(value.get("username").is_none());
        assert_eq!(value["attachments"][0]["color"], "#ff0000");
        assert_eq!(value["attachments"][0]["title"], "Working");
        assert!(value["attachments"][0].get("pretext").is_none());
        assert_eq!(value["attachments"][0]["mrkdwn_in"], json!(["text", "pretext"]));
    }
}
