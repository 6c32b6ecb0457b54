use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use scrumbot_core::ports::ChatNotifier;

use crate::commands::parse_command;
use crate::events::{
    parse_frame, DispatchError, EventContext, EventDispatcher, HandlerResult, SlackEnvelope,
    SlackEvent, SocketFrame,
};
use crate::web::SlackWebClient;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Debug, Error)]
pub enum SocketError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 10, base_delay_ms: 500, max_delay_ms: 60_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    /// Next envelope; `Ok(None)` ends the session for good.
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

type SocketStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Socket Mode over a websocket opened through `apps.connections.open`.
pub struct WebSocketTransport {
    slack: SlackWebClient,
    stream: Mutex<Option<SocketStream>>,
}

impl WebSocketTransport {
    pub fn new(slack: SlackWebClient) -> Self {
        Self { slack, stream: Mutex::new(None) }
    }
}

#[async_trait]
impl SocketTransport for WebSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = self
            .slack
            .open_socket_url()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let (stream, _) =
            connect_async(url.as_str()).await.map_err(|error| TransportError::Connect(error.to_string()))?;
        *self.stream.lock().await = Some(stream);
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        let mut guard = self.stream.lock().await;
        let Some(stream) = guard.as_mut() else {
            return Err(TransportError::Receive("socket is not connected".into()));
        };

        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => match parse_frame(&text) {
                    Ok(SocketFrame::Hello) => debug!("socket mode hello received"),
                    Ok(SocketFrame::Disconnect { reason }) => {
                        return Err(TransportError::Receive(format!(
                            "slack requested a reconnect ({reason})"
                        )));
                    }
                    Ok(SocketFrame::Envelope(envelope)) => return Ok(Some(envelope)),
                    Err(error) => warn!(error = %error, "skipping socket mode frame"),
                },
                Some(Ok(Message::Ping(payload))) => {
                    stream
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|error| TransportError::Receive(error.to_string()))?;
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(TransportError::Receive("socket closed by slack".into()));
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => return Err(TransportError::Receive(error.to_string())),
            }
        }
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        let mut guard = self.stream.lock().await;
        let Some(stream) = guard.as_mut() else {
            return Err(TransportError::Acknowledge("socket is not connected".into()));
        };
        let ack = json!({ "envelope_id": envelope_id }).to_string();
        stream
            .send(Message::Text(ack))
            .await
            .map_err(|error| TransportError::Acknowledge(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(mut stream) = self.stream.lock().await.take() else {
            return Ok(());
        };
        stream.close(None).await.map_err(|error| TransportError::Disconnect(error.to_string()))
    }
}

pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    dispatcher: EventDispatcher,
    notifier: Arc<dyn ChatNotifier>,
    reconnect_policy: ReconnectPolicy,
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        dispatcher: EventDispatcher,
        notifier: Arc<dyn ChatNotifier>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, notifier, reconnect_policy }
    }

    /// Pumps envelopes until the transport ends the session or reconnects are exhausted.
    /// Consecutive connect failures count against the retry budget; a successful connect
    /// resets it.
    pub async fn start(&self) -> Result<()> {
        let mut attempt = 0_u32;
        loop {
            let mut connected = false;
            match self.connect_and_pump(attempt, &mut connected).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    if connected {
                        attempt = 0;
                    }
                    warn!(
                        event_name = "ingress.slack.transport_failed",
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "socket mode transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "socket mode retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn connect_and_pump(
        &self,
        attempt: u32,
        connected: &mut bool,
    ) -> Result<(), TransportError> {
        info!(attempt, "opening socket mode transport connection");
        self.transport.connect().await?;
        *connected = true;
        info!(event_name = "ingress.slack.connected", attempt, "socket mode transport connected");

        loop {
            let Some(envelope) = self.transport.next_envelope().await? else {
                info!(attempt, "socket mode transport stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };
            let (channel, team) = correlation_fields(&envelope);

            info!(
                event_name = "ingress.slack.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                channel = channel.as_deref().unwrap_or("unknown"),
                team = team.as_deref().unwrap_or("unknown"),
                "received slack envelope"
            );

            if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
                warn!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    error = %error,
                    "failed to acknowledge slack envelope"
                );
            } else {
                debug!(
                    event_name = "ingress.slack.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    "acknowledged slack envelope"
                );
            }

            let context = EventContext { correlation_id: envelope.envelope_id.clone() };
            match self.dispatcher.dispatch(&envelope, &context).await {
                Ok(HandlerResult::Responded(notice)) => {
                    if let Err(error) = self.notifier.post(&notice).await {
                        warn!(
                            event_name = "egress.slack.reply_failed",
                            correlation_id = %envelope.envelope_id,
                            channel = %notice.channel,
                            error = %error,
                            "could not post reply"
                        );
                    }
                }
                Ok(HandlerResult::Processed | HandlerResult::Ignored) => {}
                Err(error) => {
                    warn!(
                        envelope_id = %envelope.envelope_id,
                        correlation_id = %envelope.envelope_id,
                        error = %error,
                        "event dispatch failed; continuing socket loop"
                    );
                }
            }
        }
    }
}

/// Channel and `[team]` token of a message envelope, for log correlation.
fn correlation_fields(envelope: &SlackEnvelope) -> (Option<String>, Option<String>) {
    match &envelope.event {
        SlackEvent::Message(event) => (
            Some(event.channel_id.clone()),
            parse_command(&event.text).and_then(|command| command.team),
        ),
        SlackEvent::Unsupported { .. } => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex as StdMutex};

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use scrumbot_core::errors::PortError;
    use scrumbot_core::ports::{ChatNotifier, Notice};

    use super::{ReconnectPolicy, SocketModeRunner, SocketTransport, TransportError};
    use crate::commands::{ChatRequest, CommandRouteError, CommandService, ParsedCommand, Tier};
    use crate::events::{
        command_dispatcher, EventDispatcher, MessageEvent, MessageKind, SlackEnvelope, SlackEvent,
    };

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        envelopes: VecDeque<Result<Option<SlackEnvelope>, TransportError>>,
        connect_attempts: usize,
        acknowledgements: Vec<String>,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            envelopes: Vec<Result<Option<SlackEnvelope>, TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    envelopes: envelopes.into(),
                    ..ScriptedState::default()
                }),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn acknowledgements(&self) -> Vec<String> {
            self.state.lock().await.acknowledgements.clone()
        }
    }

    #[async_trait]
    impl SocketTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
            let mut state = self.state.lock().await;
            state.envelopes.pop_front().unwrap_or(Ok(None))
        }

        async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.acknowledgements.push(envelope_id.to_owned());
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        posts: StdMutex<Vec<Notice>>,
    }

    #[async_trait]
    impl ChatNotifier for RecordingNotifier {
        async fn post(&self, notice: &Notice) -> Result<(), PortError> {
            self.posts.lock().expect("lock").push(notice.clone());
            Ok(())
        }

        async fn direct_message(&self, _user: &str, notice: &Notice) -> Result<(), PortError> {
            self.post(notice).await
        }
    }

    struct VersionService;

    #[async_trait]
    impl CommandService for VersionService {
        async fn permitted(&self, _tier: Tier, _user_id: &str) -> Result<bool, CommandRouteError> {
            Ok(false)
        }

        async fn team_listing(&self) -> Result<String, CommandRouteError> {
            Ok(String::new())
        }

        async fn execute(
            &self,
            _command: &ParsedCommand,
            _request: &ChatRequest,
        ) -> Result<String, CommandRouteError> {
            Ok("TikTok v0.1.2".into())
        }
    }

    fn unsupported(id: &str) -> SlackEnvelope {
        SlackEnvelope {
            envelope_id: id.to_owned(),
            event: SlackEvent::Unsupported { event_type: "test".to_owned() },
        }
    }

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 }
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![Ok(Some(unsupported("env-1"))), Ok(None)],
        ));

        let runner = SocketModeRunner::new(
            transport.clone(),
            EventDispatcher::default(),
            Arc::new(RecordingNotifier::default()),
            policy(),
        );

        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.acknowledgements().await, vec!["env-1"]);
    }

    #[tokio::test]
    async fn exhausts_retries_without_crashing() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Err(TransportError::Connect("fail-3".to_owned())),
            ],
            vec![],
        ));

        let runner = SocketModeRunner::new(
            transport.clone(),
            EventDispatcher::default(),
            Arc::new(RecordingNotifier::default()),
            policy(),
        );

        runner.start().await.expect("runner should degrade gracefully");
        assert_eq!(transport.connect_attempts().await, 3);
    }

    #[tokio::test]
    async fn slack_requested_reconnect_resets_the_retry_budget() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Ok(()),
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Ok(()),
            ],
            vec![
                Ok(Some(unsupported("env-1"))),
                Err(TransportError::Receive("slack requested a reconnect".to_owned())),
                Ok(Some(unsupported("env-2"))),
                Ok(None),
            ],
        ));

        let runner = SocketModeRunner::new(
            transport.clone(),
            EventDispatcher::default(),
            Arc::new(RecordingNotifier::default()),
            policy(),
        );

        runner.start().await.expect("runner");
        assert_eq!(transport.connect_attempts().await, 4);
        assert_eq!(transport.acknowledgements().await, vec!["env-1", "env-2"]);
    }

    #[tokio::test]
    async fn replies_are_posted_through_the_notifier() {
        let envelope = SlackEnvelope {
            envelope_id: "env-9".into(),
            event: SlackEvent::Message(MessageEvent {
                kind: MessageKind::Mention,
                channel_id: "C7".into(),
                channel_type: "channel".into(),
                user_id: "U1".into(),
                text: "<@UBOT> what is your version".into(),
                ts: "1".into(),
                bot_id: None,
                subtype: None,
            }),
        };
        let transport = Arc::new(ScriptedTransport::with_script(vec![Ok(())], vec![Ok(Some(envelope))]));
        let notifier = Arc::new(RecordingNotifier::default());

        let runner = SocketModeRunner::new(
            transport,
            command_dispatcher(VersionService, "UBOT"),
            notifier.clone(),
            policy(),
        );
        runner.start().await.expect("runner");

        let posts = notifier.posts.lock().expect("lock").clone();
        assert_eq!(posts, vec![Notice::text("C7", "TikTok v0.1.2")]);
    }
}
