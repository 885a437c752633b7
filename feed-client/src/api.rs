use crate::auth::{SessionManager, DEFAULT_TOKEN_URL};
use crate::FeedGateway;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use likewatch_core::{
    CoreError, EngagementCounts, FeedApiError, FeedCredentials, LikesPage, Post,
};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const DEFAULT_API_BASE: &str = "https://api.twitter.com";
const DEFAULT_USER_AGENT: &str = concat!("likewatch/", env!("CARGO_PKG_VERSION"));
const TWEET_FIELDS: &str =
    "author_id,created_at,lang,public_metrics,referenced_tweets,entities";
const SNOWFLAKE_EPOCH_MS: i64 = 1_288_834_974_657;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TweetListing {
    #[serde(default)]
    pub data: Vec<TweetData>,
    pub meta: Option<ListingMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingMeta {
    pub result_count: Option<u32>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TweetData {
    pub id: String,
    pub text: String,
    pub author_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub lang: Option<String>,
    pub public_metrics: Option<PublicMetrics>,
    #[serde(default)]
    pub referenced_tweets: Vec<ReferencedTweet>,
    pub entities: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PublicMetrics {
    #[serde(default)]
    pub retweet_count: i64,
    #[serde(default)]
    pub reply_count: i64,
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub quote_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferencedTweet {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEnvelope {
    pub data: Option<UserData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserData {
    pub id: String,
    pub name: String,
    pub username: String,
}

/// Feed gateway backed by the v2 REST API.
#[derive(Debug)]
pub struct TwitterClient {
    http_client: Client,
    session: SessionManager,
    api_base: String,
    page_size: u32,
}

impl TwitterClient {
    pub fn new(credentials: &FeedCredentials) -> Result<Self, CoreError> {
        Self::with_endpoints(credentials, DEFAULT_API_BASE, DEFAULT_TOKEN_URL)
    }

    pub fn with_endpoints(
        credentials: &FeedCredentials,
        api_base: &str,
        token_url: &str,
    ) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            session: SessionManager::with_token_url(credentials, token_url)?,
            api_base: api_base.trim_end_matches('/').to_string(),
            page_size: 100,
        })
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    async fn make_request(
        &self,
        endpoint: &str,
        access_token: &str,
        query_params: &[(&str, &str)],
    ) -> Result<Response, CoreError> {
        let url = format!("{}{}", self.api_base, endpoint);

        debug!("Making feed API request: GET {}", endpoint);
        let response = match self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .query(query_params)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("Network error for GET {}: {}", endpoint, e);
                if e.is_timeout() {
                    return Err(CoreError::FeedApi(FeedApiError::RequestTimeout));
                }
                return Err(CoreError::Network(e));
            }
        };

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());

        match map_status(response.status(), retry_after, endpoint) {
            Some(err) => {
                error!(
                    "Request failed with status: {} for {}",
                    response.status(),
                    endpoint
                );
                Err(CoreError::FeedApi(err))
            }
            None => Ok(response),
        }
    }

    /// GET `endpoint` and decode JSON, logging in again once if the session was rejected.
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
    ) -> Result<T, CoreError> {
        let token = self.session.bearer().await?;
        let response = match self.make_request(endpoint, &token, query_params).await {
            Err(CoreError::FeedApi(FeedApiError::InvalidToken)) => {
                self.session.invalidate().await;
                let token = self.session.bearer().await?;
                self.make_request(endpoint, &token, query_params).await?
            }
            other => other?,
        };

        response.json::<T>().await.map_err(|e| {
            error!("Failed to parse response from {}: {}", endpoint, e);
            CoreError::FeedApi(FeedApiError::InvalidResponse {
                details: format!("Failed to parse {endpoint}"),
            })
        })
    }

    /// First page of posts liked by `account_id`.
    pub async fn get_liked_posts(&self, account_id: &str) -> Result<TweetListing, CoreError> {
        let endpoint = format!("/2/users/{}/liked_tweets", account_id);
        let max_results = self.page_size.to_string();
        let params = [
            ("max_results", max_results.as_str()),
            ("tweet.fields", TWEET_FIELDS),
        ];

        let listing: TweetListing = self.get_json(&endpoint, &params).await?;
        info!(
            "Retrieved {} liked posts for account {}",
            listing.data.len(),
            account_id
        );
        Ok(listing)
    }

    pub async fn get_user(&self, user_id: &str) -> Result<UserData, CoreError> {
        let endpoint = format!("/2/users/{}", user_id);
        let envelope: UserEnvelope = self.get_json(&endpoint, &[]).await?;

        // Unknown users come back as 200 with an `errors` array and no `data`
        envelope.data.ok_or_else(|| {
            CoreError::FeedApi(FeedApiError::UserNotFound {
                user_id: user_id.to_string(),
            })
        })
    }
}

#[async_trait]
impl FeedGateway for TwitterClient {
    async fn fetch_likes(&self, account_id: &str) -> Result<LikesPage, CoreError> {
        let listing = self.get_liked_posts(account_id).await?;
        let next_cursor = listing.meta.and_then(|meta| meta.next_token);

        let mut items = Vec::with_capacity(listing.data.len());
        for tweet in listing.data {
            match Post::try_from(tweet) {
                Ok(post) => items.push(post),
                Err(e) => warn!("Skipping malformed liked post: {}", e),
            }
        }

        Ok(LikesPage { items, next_cursor })
    }

    async fn user_handle(&self, user_id: &str) -> Result<String, CoreError> {
        Ok(self.get_user(user_id).await?.username)
    }
}

/// Translate a non-success HTTP status into the feed error taxonomy.
pub fn map_status(
    status: StatusCode,
    retry_after: Option<u64>,
    endpoint: &str,
) -> Option<FeedApiError> {
    if status.is_success() {
        return None;
    }

    let err = match status.as_u16() {
        429 => FeedApiError::RateLimitExceeded {
            retry_after: retry_after.unwrap_or(60),
        },
        401 => FeedApiError::InvalidToken,
        403 => FeedApiError::Forbidden {
            resource: endpoint.to_string(),
        },
        404 => FeedApiError::InvalidResponse {
            details: format!("{endpoint} not found"),
        },
        code if status.is_server_error() => FeedApiError::ServerError { status_code: code },
        code => FeedApiError::InvalidResponse {
            details: format!("unexpected status {code} from {endpoint}"),
        },
    };
    Some(err)
}

/// Creation time encoded in a snowflake identifier.
pub fn snowflake_time(id: &str) -> Option<DateTime<Utc>> {
    let raw: i64 = id.parse().ok()?;
    let millis = (raw >> 22) + SNOWFLAKE_EPOCH_MS;
    Utc.timestamp_millis_opt(millis).single()
}

impl TryFrom<TweetData> for Post {
    type Error = CoreError;

    fn try_from(tweet: TweetData) -> Result<Self, Self::Error> {
        let created_at = tweet
            .created_at
            .or_else(|| snowflake_time(&tweet.id))
            .ok_or_else(|| {
                CoreError::FeedApi(FeedApiError::InvalidResponse {
                    details: format!("post {} has no creation time", tweet.id),
                })
            })?;
        let author_id = tweet.author_id.ok_or_else(|| {
            CoreError::FeedApi(FeedApiError::InvalidResponse {
                details: format!("post {} has no author", tweet.id),
            })
        })?;

        let referenced = |kind: &str| {
            tweet
                .referenced_tweets
                .iter()
                .find(|r| r.kind == kind)
                .map(|r| r.id.clone())
        };
        let reply_to = referenced("replied_to");
        let quoted = referenced("quoted");
        let metrics = tweet.public_metrics.unwrap_or_default();

        Ok(Post {
            id: tweet.id,
            author_id,
            created_at,
            text: tweet.text,
            counts: EngagementCounts {
                like_count: metrics.like_count,
                reply_count: metrics.reply_count,
                quote_count: metrics.quote_count,
                retweet_count: metrics.retweet_count,
            },
            lang: tweet.lang,
            reply_to,
            quoted,
            entities: tweet.entities,
        })
    }
}
