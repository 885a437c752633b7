use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Engagement counters as reported by the upstream platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementCounts {
    pub like_count: i64,
    pub reply_count: i64,
    pub quote_count: i64,
    pub retweet_count: i64,
}

/// A single item from the tracked account's liked feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    pub text: String,
    pub counts: EngagementCounts,
    pub lang: Option<String>,
    pub reply_to: Option<String>,
    pub quoted: Option<String>,
    /// Links/media as delivered upstream; stored without interpretation.
    pub entities: Option<serde_json::Value>,
}

/// First page of the liked feed plus the upstream continuation cursor.
#[derive(Debug, Clone, Default)]
pub struct LikesPage {
    pub items: Vec<Post>,
    pub next_cursor: Option<String>,
}

/// Durable proof that a post was announced, plus its reaction counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnouncementRecord {
    pub post_id: String,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    pub text: String,
    pub entities: Option<serde_json::Value>,
    pub counts: EngagementCounts,
    pub lang: Option<String>,
    pub reply_to: Option<String>,
    pub quoted: Option<String>,
    pub reaction_count: i64,
    pub message_id: String,
    pub announced_at: DateTime<Utc>,
}

impl AnnouncementRecord {
    pub fn from_post(post: &Post, message_id: impl Into<String>, announced_at: DateTime<Utc>) -> Self {
        Self {
            post_id: post.id.clone(),
            author_id: post.author_id.clone(),
            created_at: post.created_at,
            text: post.text.clone(),
            entities: post.entities.clone(),
            counts: post.counts,
            lang: post.lang.clone(),
            reply_to: post.reply_to.clone(),
            quoted: post.quoted.clone(),
            reaction_count: 0,
            message_id: message_id.into(),
            announced_at,
        }
    }
}
