use crate::urls::UrlFormat;
use chat_client::ChatMessage;
use database::AnnouncementStore;
use likewatch_core::{CoreError, ReactionCountMode};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionOutcome {
    Updated { post_id: String, count: i64 },
    /// The message links a post that has no announcement record.
    MissingRecord { post_id: String },
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    BotReactor,
    ForeignMessage,
    UnnotableEmoji,
    NoCanonicalUrl,
}

/// Keeps the stored reaction count of announced posts in step with the
/// notable reactions on their announcement messages.
pub struct ReactionCounter {
    store: Arc<dyn AnnouncementStore>,
    urls: UrlFormat,
    bot_id: String,
    notable: HashSet<String>,
    mode: ReactionCountMode,
}

impl ReactionCounter {
    pub fn new(
        store: Arc<dyn AnnouncementStore>,
        urls: UrlFormat,
        bot_id: impl Into<String>,
        notable: impl IntoIterator<Item = String>,
        mode: ReactionCountMode,
    ) -> Self {
        Self {
            store,
            urls,
            bot_id: bot_id.into(),
            notable: notable.into_iter().collect(),
            mode,
        }
    }

    pub fn is_notable(&self, emoji: &str) -> bool {
        self.notable.contains(emoji)
    }

    /// Apply one reaction-added event to `message`, the fully fetched target.
    pub async fn handle(
        &self,
        reactor_is_bot: bool,
        emoji: &str,
        message: &ChatMessage,
    ) -> Result<ReactionOutcome, CoreError> {
        if reactor_is_bot {
            return Ok(ReactionOutcome::Ignored(IgnoreReason::BotReactor));
        }
        if message.author_id != self.bot_id {
            return Ok(ReactionOutcome::Ignored(IgnoreReason::ForeignMessage));
        }
        if !self.is_notable(emoji) {
            return Ok(ReactionOutcome::Ignored(IgnoreReason::UnnotableEmoji));
        }
        let Some(post_id) = self.urls.extract_post_id(&message.content) else {
            debug!(message_id = %message.id, "Reacted message has no post link");
            return Ok(ReactionOutcome::Ignored(IgnoreReason::NoCanonicalUrl));
        };

        let (found, count) = match self.mode {
            ReactionCountMode::Set => {
                let count = i64::from(message.reaction_count(emoji));
                (self.store.update_reaction_count(&post_id, count).await?, count)
            }
            ReactionCountMode::Increment => {
                let found = self.store.increment_reaction_count(&post_id).await?;
                let count = match self.store.get(&post_id).await? {
                    Some(record) => record.reaction_count,
                    None => 0,
                };
                (found, count)
            }
        };

        if !found {
            warn!(post_id = %post_id, "No announcement record to update reaction count");
            return Ok(ReactionOutcome::MissingRecord { post_id });
        }

        info!(post_id = %post_id, count, "React count updated");
        Ok(ReactionOutcome::Updated { post_id, count })
    }
}
