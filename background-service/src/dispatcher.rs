use crate::urls::UrlFormat;
use chat_client::{ChatGateway, ChatMessage};
use chrono::Utc;
use database::AnnouncementStore;
use feed_client::FeedGateway;
use likewatch_core::{
    AnnouncementRecord, CoreError, Post, RetryExecutor, UnpersistedPolicy,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub channel_id: String,
    /// Only this author's history messages count as earlier announcements.
    pub bot_id: String,
    pub announce_prefix: String,
    pub max_per_poll: usize,
    pub unpersisted_policy: UnpersistedPolicy,
}

/// What happened to each post handed to [`Dispatcher::dispatch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Sent and recorded.
    pub announced: Vec<String>,
    /// Sent, but the record could not be written.
    pub unpersisted: Vec<String>,
    /// Found in channel history and recorded without sending again. A failed
    /// back-fill lands in `unpersisted` instead.
    pub recovered: Vec<String>,
    /// Handle resolution or send failed.
    pub failed: Vec<String>,
    /// Dropped by the per-poll cap.
    pub discarded: usize,
}

impl DispatchReport {
    pub fn sent(&self) -> usize {
        self.announced.len() + self.unpersisted.len()
    }
}

pub struct Dispatcher {
    feed: Arc<dyn FeedGateway>,
    chat: Arc<dyn ChatGateway>,
    store: Arc<dyn AnnouncementStore>,
    urls: UrlFormat,
    retry: RetryExecutor,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        feed: Arc<dyn FeedGateway>,
        chat: Arc<dyn ChatGateway>,
        store: Arc<dyn AnnouncementStore>,
        urls: UrlFormat,
        retry: RetryExecutor,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            feed,
            chat,
            store,
            urls,
            retry,
            settings,
        }
    }

    /// Announce `fresh` posts oldest first, at most `max_per_poll` of them.
    ///
    /// Only a missing or unreadable target channel fails the whole batch;
    /// per-post failures are logged and reported.
    pub async fn dispatch(&self, mut fresh: Vec<Post>) -> Result<DispatchReport, CoreError> {
        let mut report = DispatchReport::default();
        if fresh.is_empty() {
            return Ok(report);
        }

        fresh.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        if fresh.len() > self.settings.max_per_poll {
            report.discarded = fresh.len() - self.settings.max_per_poll;
            warn!(
                "Discarding {} new posts over the per-poll cap of {}",
                report.discarded, self.settings.max_per_poll
            );
            fresh.truncate(self.settings.max_per_poll);
        }

        let channel_id = self.settings.channel_id.as_str();
        let channel = self
            .retry
            .execute("fetch announce channel", || self.chat.fetch_channel(channel_id))
            .await?;
        if channel.is_none() {
            error!("Channel with ID {} not found", channel_id);
            return Err(CoreError::NotFound {
                resource: format!("channel {channel_id}"),
            });
        }

        let history = self.load_history().await;

        for post in fresh {
            if let Some(message) = self.find_in_history(&history, &post.id) {
                info!(
                    post_id = %post.id,
                    message_id = %message.id,
                    "Post already in channel history, recording without resending"
                );
                if self.persist(&post, &message.id).await {
                    report.recovered.push(post.id);
                } else {
                    report.unpersisted.push(post.id);
                }
                continue;
            }

            let message_id = match self.announce(&post).await {
                Ok(message_id) => message_id,
                Err(e) => {
                    error!(post_id = %post.id, "Failed to announce post: {}", e);
                    report.failed.push(post.id);
                    continue;
                }
            };

            if self.persist(&post, &message_id).await {
                report.announced.push(post.id);
            } else {
                report.unpersisted.push(post.id);
            }
        }

        info!(
            announced = report.announced.len(),
            unpersisted = report.unpersisted.len(),
            recovered = report.recovered.len(),
            failed = report.failed.len(),
            "Finished dispatching new likes"
        );
        Ok(report)
    }

    async fn announce(&self, post: &Post) -> Result<String, CoreError> {
        let handle = self
            .retry
            .execute("resolve author handle", || self.feed.user_handle(&post.author_id))
            .await?;
        let content = format!(
            "{}\n{}",
            self.settings.announce_prefix,
            self.urls.canonical_url(&handle, &post.id)
        );

        debug!(post_id = %post.id, "Sending announcement");
        self.retry
            .execute("send announcement", || {
                self.chat.send_message(&self.settings.channel_id, &content)
            })
            .await
    }

    /// Returns whether the record was written. Failures are logged only.
    async fn persist(&self, post: &Post, message_id: &str) -> bool {
        let record = AnnouncementRecord::from_post(post, message_id, Utc::now());
        match self
            .retry
            .execute("record announcement", || self.store.insert(&record))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!(
                    post_id = %post.id,
                    message_id,
                    "Failed to store announcement record: {}", e
                );
                false
            }
        }
    }

    fn find_in_history<'a>(&self, history: &'a [ChatMessage], post_id: &str) -> Option<&'a ChatMessage> {
        history.iter().find(|message| {
            message.author_id == self.settings.bot_id
                && self.urls.extract_post_id(&message.content).as_deref() == Some(post_id)
        })
    }

    async fn load_history(&self) -> Vec<ChatMessage> {
        let UnpersistedPolicy::CheckHistory { lookback } = self.settings.unpersisted_policy else {
            return Vec::new();
        };

        let channel_id = self.settings.channel_id.as_str();
        match self
            .retry
            .execute("load channel history", || {
                self.chat.recent_messages(channel_id, lookback)
            })
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Could not read channel history, sending without the check: {}", e);
                Vec::new()
            }
        }
    }
}
