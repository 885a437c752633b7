//! Upstream feed gateway: the liked-posts feed of the tracked account and
//! author handle lookups, behind the [`FeedGateway`] trait.

pub mod api;
pub mod auth;


use async_trait::async_trait;
use likewatch_core::{CoreError, LikesPage};

pub use api::TwitterClient;
pub use auth::{AuthState, SessionManager, SessionToken};

#[async_trait]
pub trait FeedGateway: Send + Sync {
    /// Current first page of the account's liked posts, in upstream order.
    async fn fetch_likes(&self, account_id: &str) -> Result<LikesPage, CoreError>;

    /// Public handle (username) of a post author.
    async fn user_handle(&self, user_id: &str) -> Result<String, CoreError>;
}
