use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use scrumbot_core::ports::Notice;

use crate::commands::{ChatRequest, CommandRouteError, CommandRouter, CommandService};

const NOT_UNDERSTOOD: &str = "I'm not sure what you are asking me to do. Try `help`.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    Message(MessageEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::Message(_) => SlackEventType::Message,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    Message,
    Unsupported,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// `app_mention` in a channel.
    Mention,
    /// Plain `message`, only acted on in direct messages.
    Message,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub kind: MessageKind,
    pub channel_id: String,
    pub channel_type: String,
    pub user_id: String,
    pub text: String,
    pub ts: String,
    pub bot_id: Option<String>,
    pub subtype: Option<String>,
}

impl MessageEvent {
    pub fn is_direct(&self) -> bool {
        self.channel_type == "im" || self.channel_id.starts_with('D')
    }
}

/// One Socket Mode frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketFrame {
    Hello,
    Disconnect { reason: String },
    Envelope(SlackEnvelope),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("malformed socket mode frame: {0}")]
pub struct FrameError(String);

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    envelope_id: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    channel: String,
    channel_type: String,
    user: String,
    text: String,
    ts: String,
    bot_id: Option<String>,
    subtype: Option<String>,
}

pub fn parse_frame(text: &str) -> Result<SocketFrame, FrameError> {
    let frame: RawFrame =
        serde_json::from_str(text).map_err(|error| FrameError(error.to_string()))?;
    match frame.kind.as_str() {
        "hello" => Ok(SocketFrame::Hello),
        "disconnect" => Ok(SocketFrame::Disconnect { reason: frame.reason }),
        "events_api" => {
            let raw = frame.payload.get("event").cloned().unwrap_or(Value::Null);
            let event: RawEvent =
                serde_json::from_value(raw).map_err(|error| FrameError(error.to_string()))?;
            Ok(SocketFrame::Envelope(SlackEnvelope {
                envelope_id: frame.envelope_id,
                event: message_event(event),
            }))
        }
        other => Ok(SocketFrame::Envelope(SlackEnvelope {
            envelope_id: frame.envelope_id,
            event: SlackEvent::Unsupported { event_type: other.to_string() },
        })),
    }
}

fn message_event(event: RawEvent) -> SlackEvent {
    let kind = match event.kind.as_str() {
        "app_mention" => MessageKind::Mention,
        "message" => MessageKind::Message,
        other => return SlackEvent::Unsupported { event_type: other.to_string() },
    };
    SlackEvent::Message(MessageEvent {
        kind,
        channel_id: event.channel,
        channel_type: event.channel_type,
        user_id: event.user,
        text: event.text,
        ts: event.ts,
        bot_id: event.bot_id,
        subtype: event.subtype,
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(Notice),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Route(#[from] CommandRouteError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Dispatcher with the chat command handler registered.
pub fn command_dispatcher<S>(service: S, bot_user_id: impl Into<String>) -> EventDispatcher
where
    S: CommandService + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MessageHandler::new(service, bot_user_id));
    dispatcher
}

/// Routes messages addressed to the bot through the command table.
pub struct MessageHandler<S> {
    router: CommandRouter<S>,
    bot_user_id: String,
}

impl<S> MessageHandler<S>
where
    S: CommandService,
{
    pub fn new(service: S, bot_user_id: impl Into<String>) -> Self {
        Self { router: CommandRouter::new(service), bot_user_id: bot_user_id.into() }
    }

    fn addressed(&self, event: &MessageEvent) -> bool {
        if event.bot_id.is_some() || event.subtype.is_some() || event.user_id.is_empty() {
            return false;
        }
        if !self.bot_user_id.is_empty() && event.user_id == self.bot_user_id {
            return false;
        }
        match event.kind {
            MessageKind::Mention => true,
            MessageKind::Message => event.is_direct(),
        }
    }

    fn strip_mention(&self, text: &str) -> String {
        if self.bot_user_id.is_empty() {
            return text.trim().to_string();
        }
        text.replace(&format!("<@{}>", self.bot_user_id), " ").trim().to_string()
    }
}

#[async_trait]
impl<S> EventHandler for MessageHandler<S>
where
    S: CommandService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::Message
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::Message(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if !self.addressed(event) {
            return Ok(HandlerResult::Ignored);
        }

        let request = ChatRequest {
            channel_id: event.channel_id.clone(),
            user_id: event.user_id.clone(),
            text: self.strip_mention(&event.text),
            ts: event.ts.clone(),
        };
        let reply = match self.router.route(&request).await {
            Ok(Some(reply)) => reply,
            Ok(None) => NOT_UNDERSTOOD.to_string(),
            Err(CommandRouteError::Service { reply, detail }) => {
                warn!(
                    event_name = "ingress.slack.command_failed",
                    correlation_id = %ctx.correlation_id,
                    channel = %event.channel_id,
                    user = %event.user_id,
                    error = %detail,
                    "chat command failed"
                );
                reply
            }
        };
        if reply.is_empty() {
            return Ok(HandlerResult::Processed);
        }
        Ok(HandlerResult::Responded(Notice::text(&event.channel_id, reply)))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use scrumbot_core::ports::Notice;

    use super::{
        command_dispatcher, parse_frame, EventContext, EventDispatcher, HandlerResult,
        MessageEvent, MessageKind, SlackEnvelope, SlackEvent, SocketFrame,
    };
    use crate::commands::{ChatRequest, CommandRouteError, CommandService, ParsedCommand, Tier};

    struct EchoService;

    #[async_trait]
    impl CommandService for EchoService {
        async fn permitted(&self, _tier: Tier, _user_id: &str) -> Result<bool, CommandRouteError> {
            Ok(true)
        }

        async fn team_listing(&self) -> Result<String, CommandRouteError> {
            Ok(String::new())
        }

        async fn execute(
            &self,
            command: &ParsedCommand,
            request: &ChatRequest,
        ) -> Result<String, CommandRouteError> {
            if command.team.as_deref() == Some("broken") {
                return Err(CommandRouteError::Service {
                    reply: "Trello is having a moment.".into(),
                    detail: "status 503".into(),
                });
            }
            Ok(format!("{:?} for {}: {}", command.action, request.user_id, request.text))
        }
    }

    fn message(kind: MessageKind, channel: &str, text: &str) -> SlackEnvelope {
        SlackEnvelope {
            envelope_id: "env-1".into(),
            event: SlackEvent::Message(MessageEvent {
                kind,
                channel_id: channel.into(),
                channel_type: if channel.starts_with('D') { "im".into() } else { "channel".into() },
                user_id: "U1".into(),
                text: text.into(),
                ts: "1760000000.000200".into(),
                bot_id: None,
                subtype: None,
            }),
        }
    }

    #[test]
    fn parses_socket_mode_frames() {
        assert_eq!(parse_frame(r#"{"type":"hello","num_connections":1}"#), Ok(SocketFrame::Hello));
        assert_eq!(
            parse_frame(r#"{"type":"disconnect","reason":"refresh_requested"}"#),
            Ok(SocketFrame::Disconnect { reason: "refresh_requested".into() })
        );

        let frame = parse_frame(
            r#"{"type":"events_api","envelope_id":"e-77","accepts_response_payload":false,
                "payload":{"event":{"type":"app_mention","user":"U1","channel":"C9",
                "text":"<@UBOT> count cards [mcboard]","ts":"1760000000.1"}}}"#,
        )
        .expect("frame");
        let SocketFrame::Envelope(envelope) = frame else {
            panic!("expected an envelope");
        };
        assert_eq!(envelope.envelope_id, "e-77");
        assert!(matches!(
            envelope.event,
            SlackEvent::Message(MessageEvent { kind: MessageKind::Mention, .. })
        ));

        let slash = parse_frame(r#"{"type":"slash_commands","envelope_id":"e-78","payload":{}}"#)
            .expect("frame");
        assert!(matches!(
            slash,
            SocketFrame::Envelope(SlackEnvelope { event: SlackEvent::Unsupported { .. }, .. })
        ));
        assert!(parse_frame("not json").is_err());
    }

    #[tokio::test]
    async fn mentions_are_routed_and_answered_in_channel() {
        let dispatcher = command_dispatcher(EchoService, "UBOT");

        let result = dispatcher
            .dispatch(
                &message(MessageKind::Mention, "C9", "<@UBOT> count cards [mcboard]"),
                &EventContext::default(),
            )
            .await
            .expect("dispatch");

        assert_eq!(
            result,
            HandlerResult::Responded(Notice::text("C9", "CountCards for U1: count cards [mcboard]"))
        );
    }

    #[tokio::test]
    async fn plain_channel_messages_and_bot_echoes_are_ignored() {
        let dispatcher = command_dispatcher(EchoService, "UBOT");
        let ctx = EventContext::default();

        let channel = message(MessageKind::Message, "C9", "count cards [mcboard]");
        assert_eq!(dispatcher.dispatch(&channel, &ctx).await.expect("dispatch"), HandlerResult::Ignored);

        let mut own = message(MessageKind::Message, "D1", "count cards [mcboard]");
        if let SlackEvent::Message(event) = &mut own.event {
            event.bot_id = Some("B1".into());
        }
        assert_eq!(dispatcher.dispatch(&own, &ctx).await.expect("dispatch"), HandlerResult::Ignored);
    }

    #[tokio::test]
    async fn direct_messages_get_fallback_and_error_replies() {
        let dispatcher = command_dispatcher(EchoService, "UBOT");
        let ctx = EventContext::default();

        let unknown = dispatcher
            .dispatch(&message(MessageKind::Message, "D1", "what is the meaning of life"), &ctx)
            .await
            .expect("dispatch");
        assert!(matches!(unknown, HandlerResult::Responded(notice) if notice.text.contains("help")));

        let failed = dispatcher
            .dispatch(&message(MessageKind::Message, "D1", "count cards [broken]"), &ctx)
            .await
            .expect("dispatch");
        assert_eq!(failed, HandlerResult::Responded(Notice::text("D1", "Trello is having a moment.")));
    }

    #[tokio::test]
    async fn empty_dispatcher_ignores_everything() {
        let dispatcher = EventDispatcher::new();
        let result = dispatcher
            .dispatch(&message(MessageKind::Mention, "C1", "help"), &EventContext::default())
            .await
            .expect("dispatch");
        assert_eq!(result, HandlerResult::Ignored);
        assert_eq!(command_dispatcher(EchoService, "UBOT").handler_count(), 1);
    }
}
