//! Slack surface of the bot.
//!
//! - `socket` keeps the Socket Mode websocket alive and acknowledges envelopes.
//! - `events` turns frames into message events and routes them to commands.
//! - `commands` holds the command table, permission tiers and the router.
//! - `web` talks to the Web API and the incoming webhook.
//!
//! ```text
//! Slack ─ws─> SocketModeRunner -> EventDispatcher -> MessageHandler -> CommandRouter
//!                                                                         |
//!                 ChatNotifier <────────────── reply <── CommandService ──┘
//! ```

pub mod commands;
pub mod events;
pub mod message;
pub mod socket;
pub mod web;

pub use commands::{CommandRouter, CommandService, ParsedCommand, Tier};
pub use events::{command_dispatcher, EventDispatcher};
pub use message::BotIdentity;
pub use socket::{ReconnectPolicy, SocketModeRunner, WebSocketTransport};
pub use web::{SlackDirectory, SlackWebClient};
