//! HTTP adapters for the Trello and GitHub ports.

mod http;
pub mod github;
pub mod trello;

pub use github::GithubClient;
pub use trello::TrelloClient;
