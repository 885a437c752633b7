//! Chat platform boundary: outbound REST operations behind [`ChatGateway`]
//! and the inbound event stream.

pub mod events;
pub mod gateway;
pub mod rest;

use async_trait::async_trait;
use likewatch_core::CoreError;
use serde::{Deserialize, Serialize};

pub use events::{parse_dispatch, ChatEvent, ReactionAdded};
pub use gateway::EventStream;
pub use rest::DiscordRest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    pub guild_id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionCount {
    pub emoji: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub author_id: String,
    pub author_is_bot: bool,
    pub content: String,
    pub is_reply: bool,
    pub reactions: Vec<ReactionCount>,
}

impl ChatMessage {
    /// Current total for `emoji` on this message, zero when nobody reacted with it.
    pub fn reaction_count(&self, emoji: &str) -> u32 {
        self.reactions
            .iter()
            .find(|r| r.emoji == emoji)
            .map(|r| r.count)
            .unwrap_or(0)
    }
}

#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// `Ok(None)` when the channel does not exist or is not visible.
    async fn fetch_channel(&self, channel_id: &str) -> Result<Option<ChannelInfo>, CoreError>;

    /// Post `content` to the channel, returning the new message id.
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<String, CoreError>;

    /// Reply to an existing message, returning the new message id.
    async fn reply(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<String, CoreError>;

    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), CoreError>;

    async fn fetch_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<ChatMessage, CoreError>;

    /// Most recent messages of the channel, newest first.
    async fn recent_messages(
        &self,
        channel_id: &str,
        limit: u8,
    ) -> Result<Vec<ChatMessage>, CoreError>;
}
