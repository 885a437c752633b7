use crate::events::MessageData;
use crate::{ChannelInfo, ChatGateway, ChatMessage};
use async_trait::async_trait;
use likewatch_core::{ChatApiError, CoreError, Secret};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error};

pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";
const DEFAULT_USER_AGENT: &str = concat!(
    "DiscordBot (https://github.com/likewatch/likewatch, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

#[derive(Debug, Deserialize)]
struct ChannelData {
    id: String,
    guild_id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedMessage {
    id: String,
}

/// Outbound chat operations over the REST API.
#[derive(Debug, Clone)]
pub struct DiscordRest {
    http_client: Client,
    token: Secret,
    api_base: String,
}

impl DiscordRest {
    pub fn new(token: Secret) -> Result<Self, CoreError> {
        Self::with_api_base(token, DISCORD_API_BASE)
    }

    pub fn with_api_base(token: Secret, api_base: &str) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            token,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        self.http_client
            .request(method, format!("{}{}", self.api_base, endpoint))
            .header("Authorization", format!("Bot {}", self.token.expose()))
    }

    async fn execute(&self, builder: RequestBuilder, endpoint: &str) -> Result<Response, CoreError> {
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Network error for {}: {}", endpoint, e);
                if e.is_timeout() {
                    return Err(CoreError::ChatApi(ChatApiError::RequestTimeout));
                }
                return Err(CoreError::Network(e));
            }
        };

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<f64>().ok());

        match map_status(response.status(), retry_after, endpoint) {
            Some(err) => {
                error!(
                    "Chat request failed with status: {} for {}",
                    response.status(),
                    endpoint
                );
                Err(CoreError::ChatApi(err))
            }
            None => {
                debug!("Chat request successful: {} {}", response.status(), endpoint);
                Ok(response)
            }
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response, endpoint: &str) -> Result<T, CoreError> {
        response.json::<T>().await.map_err(|e| {
            error!("Failed to parse chat response from {}: {}", endpoint, e);
            CoreError::ChatApi(ChatApiError::InvalidResponse {
                details: format!("Failed to parse {endpoint}"),
            })
        })
    }

    async fn create_message(
        &self,
        channel_id: &str,
        body: serde_json::Value,
    ) -> Result<String, CoreError> {
        let endpoint = format!("/channels/{}/messages", channel_id);
        let builder = self.request(Method::POST, &endpoint).json(&body);
        let response = self.execute(builder, &endpoint).await?;
        let created: CreatedMessage = Self::decode(response, &endpoint).await?;
        Ok(created.id)
    }
}

#[async_trait]
impl ChatGateway for DiscordRest {
    async fn fetch_channel(&self, channel_id: &str) -> Result<Option<ChannelInfo>, CoreError> {
        let endpoint = format!("/channels/{}", channel_id);
        let builder = self.request(Method::GET, &endpoint);
        let response = match self.execute(builder, &endpoint).await {
            Ok(response) => response,
            Err(CoreError::ChatApi(ChatApiError::Unknown { .. })) => return Ok(None),
            Err(e) => return Err(e),
        };

        let channel: ChannelData = Self::decode(response, &endpoint).await?;
        Ok(Some(ChannelInfo {
            id: channel.id,
            guild_id: channel.guild_id,
            name: channel.name,
        }))
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> Result<String, CoreError> {
        self.create_message(channel_id, json!({ "content": content }))
            .await
    }

    async fn reply(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<String, CoreError> {
        self.create_message(
            channel_id,
            json!({
                "content": content,
                "message_reference": { "message_id": message_id, "fail_if_not_exists": false },
                "allowed_mentions": { "replied_user": false },
            }),
        )
        .await
    }

    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), CoreError> {
        let encoded: String = url::form_urlencoded::byte_serialize(emoji.as_bytes()).collect();
        let endpoint = format!(
            "/channels/{}/messages/{}/reactions/{}/@me",
            channel_id, message_id, encoded
        );
        let builder = self.request(Method::PUT, &endpoint);
        self.execute(builder, &endpoint).await?;
        Ok(())
    }

    async fn fetch_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<ChatMessage, CoreError> {
        let endpoint = format!("/channels/{}/messages/{}", channel_id, message_id);
        let builder = self.request(Method::GET, &endpoint);
        let response = self.execute(builder, &endpoint).await?;
        let message: MessageData = Self::decode(response, &endpoint).await?;
        Ok(message.into())
    }

    async fn recent_messages(
        &self,
        channel_id: &str,
        limit: u8,
    ) -> Result<Vec<ChatMessage>, CoreError> {
        let endpoint = format!("/channels/{}/messages", channel_id);
        let limit = limit.clamp(1, 100).to_string();
        let builder = self
            .request(Method::GET, &endpoint)
            .query(&[("limit", limit.as_str())]);
        let response = self.execute(builder, &endpoint).await?;
        let messages: Vec<MessageData> = Self::decode(response, &endpoint).await?;
        Ok(messages.into_iter().map(ChatMessage::from).collect())
    }
}

/// Translate a non-success HTTP status into the chat error taxonomy.
pub fn map_status(
    status: StatusCode,
    retry_after_secs: Option<f64>,
    endpoint: &str,
) -> Option<ChatApiError> {
    if status.is_success() {
        return None;
    }

    let err = match status.as_u16() {
        429 => ChatApiError::RateLimited {
            retry_after_ms: retry_after_secs
                .map(|secs| (secs * 1000.0).ceil() as u64)
                .unwrap_or(1000),
        },
        401 => ChatApiError::AuthenticationFailed {
            reason: "bot token rejected".to_string(),
        },
        403 => ChatApiError::MissingPermission {
            resource: endpoint.to_string(),
        },
        404 => ChatApiError::Unknown {
            resource: endpoint.to_string(),
        },
        code if status.is_server_error() => ChatApiError::ServerError { status_code: code },
        code => ChatApiError::InvalidResponse {
            details: format!("unexpected status {code} from {endpoint}"),
        },
    };
    Some(err)
}
