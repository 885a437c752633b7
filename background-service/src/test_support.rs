//! In-memory stand-ins for the feed, the chat platform and a failing store.

use async_trait::async_trait;
use chat_client::{ChannelInfo, ChatGateway, ChatMessage};
use chrono::{TimeZone, Utc};
use database::{AnnouncementStore, MemoryStore};
use likewatch_core::{
    AnnouncementRecord, ChatApiError, CoreError, DatabaseError, EngagementCounts, FeedApiError,
    LikesPage, Post, RetryConfig, RetryExecutor,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

pub const BOT_ID: &str = "901";
pub const CHANNEL_ID: &str = "900";
pub const GUILD_ID: &str = "77";

pub fn quick_retry() -> RetryExecutor {
    RetryExecutor::new(RetryConfig {
        max_attempts: 3,
        base_delay_ms: 1,
        max_delay_ms: 5,
        backoff_multiplier: 2.0,
        jitter_factor: 0.0,
    })
}

/// A post by author `42` created `secs` seconds after a fixed epoch.
pub fn post(id: &str, secs: i64) -> Post {
    Post {
        id: id.to_string(),
        author_id: "42".to_string(),
        created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        text: format!("post {id}"),
        counts: EngagementCounts::default(),
        lang: Some("en".to_string()),
        reply_to: None,
        quoted: None,
        entities: None,
    }
}

pub fn record_for(post: &Post) -> AnnouncementRecord {
    AnnouncementRecord::from_post(post, format!("msg-{}", post.id), Utc::now())
}

pub fn bot_message(id: &str, content: &str) -> ChatMessage {
    ChatMessage {
        id: id.to_string(),
        channel_id: CHANNEL_ID.to_string(),
        guild_id: Some(GUILD_ID.to_string()),
        author_id: BOT_ID.to_string(),
        author_is_bot: true,
        content: content.to_string(),
        is_reply: false,
        reactions: Vec::new(),
    }
}

pub fn user_message(id: &str, content: &str) -> ChatMessage {
    ChatMessage {
        author_id: "3".to_string(),
        author_is_bot: false,
        ..bot_message(id, content)
    }
}

#[derive(Default)]
pub struct FakeFeed {
    likes: Mutex<Vec<Post>>,
    failing_handles: Mutex<HashSet<String>>,
    fetch_failures: AtomicU32,
    fetch_calls: AtomicUsize,
}

impl FakeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_likes(&self, likes: Vec<Post>) {
        *self.likes.lock().unwrap() = likes;
    }

    pub fn fail_next_fetches(&self, count: u32) {
        self.fetch_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_handle_for(&self, user_id: &str) {
        self.failing_handles.lock().unwrap().insert(user_id.to_string());
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl feed_client::FeedGateway for FakeFeed {
    async fn fetch_likes(&self, _account_id: &str) -> Result<LikesPage, CoreError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fetch_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fetch_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(CoreError::FeedApi(FeedApiError::ServerError { status_code: 503 }));
        }
        Ok(LikesPage {
            items: self.likes.lock().unwrap().clone(),
            next_cursor: None,
        })
    }

    async fn user_handle(&self, user_id: &str) -> Result<String, CoreError> {
        if self.failing_handles.lock().unwrap().contains(user_id) {
            return Err(CoreError::FeedApi(FeedApiError::UserNotFound {
                user_id: user_id.to_string(),
            }));
        }
        Ok(format!("user{user_id}"))
    }
}

/// Records outbound traffic. Sent messages also land in the channel history.
pub struct FakeChat {
    channel_exists: bool,
    next_id: AtomicU64,
    sent: Mutex<Vec<(String, String)>>,
    replies: Mutex<Vec<(String, String)>>,
    reactions: Mutex<Vec<(String, String)>>,
    history: Mutex<Vec<ChatMessage>>,
    messages: Mutex<HashMap<String, ChatMessage>>,
    failing_sends: Mutex<Vec<String>>,
}

impl FakeChat {
    pub fn new() -> Self {
        Self {
            channel_exists: true,
            next_id: AtomicU64::new(5000),
            sent: Mutex::default(),
            replies: Mutex::default(),
            reactions: Mutex::default(),
            history: Mutex::default(),
            messages: Mutex::default(),
            failing_sends: Mutex::default(),
        }
    }

    pub fn without_channel() -> Self {
        Self {
            channel_exists: false,
            ..Self::new()
        }
    }

    fn next_message_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::SeqCst).to_string()
    }

    pub fn fail_sends_containing(&self, needle: &str) {
        self.failing_sends.lock().unwrap().push(needle.to_string());
    }

    pub fn clear_send_failures(&self) {
        self.failing_sends.lock().unwrap().clear();
    }

    /// Add an older message to the channel history, returning its id.
    pub fn push_history(&self, author_id: &str, content: &str) -> String {
        let id = self.next_message_id();
        let mut message = bot_message(&id, content);
        message.author_id = author_id.to_string();
        self.history.lock().unwrap().push(message);
        id
    }

    /// Make `message` available to `fetch_message`.
    pub fn store_message(&self, message: ChatMessage) {
        self.messages
            .lock()
            .unwrap()
            .insert(message.id.clone(), message);
    }

    pub fn sent_contents(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn sent_ids(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
    }

    /// `(replied-to message id, content)` pairs.
    pub fn replies(&self) -> Vec<(String, String)> {
        self.replies.lock().unwrap().clone()
    }

    /// `(message id, emoji)` pairs.
    pub fn reactions(&self) -> Vec<(String, String)> {
        self.reactions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatGateway for FakeChat {
    async fn fetch_channel(&self, channel_id: &str) -> Result<Option<ChannelInfo>, CoreError> {
        Ok(self.channel_exists.then(|| ChannelInfo {
            id: channel_id.to_string(),
            guild_id: Some(GUILD_ID.to_string()),
            name: Some("likes".to_string()),
        }))
    }

    async fn send_message(&self, _channel_id: &str, content: &str) -> Result<String, CoreError> {
        if self
            .failing_sends
            .lock()
            .unwrap()
            .iter()
            .any(|needle| content.contains(needle.as_str()))
        {
            return Err(CoreError::ChatApi(ChatApiError::ServerError { status_code: 500 }));
        }
        let id = self.next_message_id();
        self.sent
            .lock()
            .unwrap()
            .push((id.clone(), content.to_string()));
        self.history
            .lock()
            .unwrap()
            .insert(0, bot_message(&id, content));
        Ok(id)
    }

    async fn reply(
        &self,
        _channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<String, CoreError> {
        self.replies
            .lock()
            .unwrap()
            .push((message_id.to_string(), content.to_string()));
        Ok(self.next_message_id())
    }

    async fn add_reaction(
        &self,
        _channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), CoreError> {
        self.reactions
            .lock()
            .unwrap()
            .push((message_id.to_string(), emoji.to_string()));
        Ok(())
    }

    async fn fetch_message(
        &self,
        _channel_id: &str,
        message_id: &str,
    ) -> Result<ChatMessage, CoreError> {
        self.messages
            .lock()
            .unwrap()
            .get(message_id)
            .cloned()
            .ok_or_else(|| {
                CoreError::ChatApi(ChatApiError::Unknown {
                    resource: format!("message {message_id}"),
                })
            })
    }

    async fn recent_messages(
        &self,
        _channel_id: &str,
        limit: u8,
    ) -> Result<Vec<ChatMessage>, CoreError> {
        let history = self.history.lock().unwrap();
        Ok(history.iter().take(limit as usize).cloned().collect())
    }
}

/// Memory store whose inserts can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_inserts: AtomicBool,
}

impl FlakyStore {
    pub fn failing_inserts() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_inserts: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl AnnouncementStore for FlakyStore {
    async fn get(&self, post_id: &str) -> Result<Option<AnnouncementRecord>, CoreError> {
        self.inner.get(post_id).await
    }

    async fn insert(&self, record: &AnnouncementRecord) -> Result<(), CoreError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(CoreError::Database(DatabaseError::QueryFailed {
                query: "insert announcement".to_string(),
            }));
        }
        self.inner.insert(record).await
    }

    async fn update_reaction_count(&self, post_id: &str, count: i64) -> Result<bool, CoreError> {
        self.inner.update_reaction_count(post_id, count).await
    }

    async fn increment_reaction_count(&self, post_id: &str) -> Result<bool, CoreError> {
        self.inner.increment_reaction_count(post_id).await
    }
}
