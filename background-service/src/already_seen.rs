//! Replies to user messages that link a post the channel has already seen,
//! pointing at the original announcement.

use crate::urls::UrlFormat;
use chat_client::{ChatGateway, ChatMessage};
use database::AnnouncementStore;
use likewatch_core::CoreError;
use std::sync::Arc;
use tracing::{debug, info};

pub struct AlreadySeenDetector {
    chat: Arc<dyn ChatGateway>,
    store: Arc<dyn AnnouncementStore>,
    urls: UrlFormat,
    announce_channel_id: String,
    notice: String,
}

impl AlreadySeenDetector {
    pub fn new(
        chat: Arc<dyn ChatGateway>,
        store: Arc<dyn AnnouncementStore>,
        urls: UrlFormat,
        announce_channel_id: impl Into<String>,
        notice: impl Into<String>,
    ) -> Self {
        Self {
            chat,
            store,
            urls,
            announce_channel_id: announce_channel_id.into(),
            notice: notice.into(),
        }
    }

    /// Link to a message in the announce channel.
    pub fn jump_link(&self, guild_id: Option<&str>, message_id: &str) -> String {
        format!(
            "https://discord.com/channels/{}/{}/{}",
            guild_id.unwrap_or("@me"),
            self.announce_channel_id,
            message_id
        )
    }

    /// Returns the id of the reply when one was sent.
    pub async fn inspect(&self, message: &ChatMessage) -> Result<Option<String>, CoreError> {
        if message.author_is_bot || message.is_reply {
            return Ok(None);
        }
        let Some(post_id) = self.urls.trailing_status_id(&message.content) else {
            return Ok(None);
        };

        let Some(record) = self.store.get(&post_id).await? else {
            debug!(post_id = %post_id, "Linked post not announced before");
            return Ok(None);
        };

        let link = self.jump_link(message.guild_id.as_deref(), &record.message_id);
        let reply_id = self
            .chat
            .reply(
                &message.channel_id,
                &message.id,
                &format!("{}\n{}", self.notice, link),
            )
            .await?;
        info!(post_id = %post_id, message_id = %message.id, "Pointed repost at earlier announcement");
        Ok(Some(reply_id))
    }
}
