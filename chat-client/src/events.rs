use crate::{ChatMessage, ReactionCount};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Inbound events the service reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Ready { user_id: String },
    MessageCreated(ChatMessage),
    ReactionAdded(ReactionAdded),
}

/// A reaction-added notification. The platform only sends references here;
/// content and counts have to be fetched from the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionAdded {
    pub message_id: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub user_id: String,
    pub user_is_bot: bool,
    pub emoji: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct UserData {
    pub id: String,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EmojiData {
    pub id: Option<String>,
    pub name: Option<String>,
}

impl EmojiData {
    /// Unicode emoji are identified by the character itself, custom ones by name.
    fn display_name(&self) -> Option<String> {
        match (&self.name, &self.id) {
            (Some(name), _) => Some(name.clone()),
            (None, Some(id)) => Some(id.clone()),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ReactionData {
    pub count: u32,
    pub emoji: EmojiData,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MessageData {
    pub id: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub author: UserData,
    #[serde(default)]
    pub content: String,
    pub message_reference: Option<Value>,
    #[serde(default)]
    pub reactions: Vec<ReactionData>,
}

impl From<MessageData> for ChatMessage {
    fn from(data: MessageData) -> Self {
        Self {
            id: data.id,
            channel_id: data.channel_id,
            guild_id: data.guild_id,
            author_id: data.author.id,
            author_is_bot: data.author.bot,
            content: data.content,
            is_reply: data.message_reference.is_some(),
            reactions: data
                .reactions
                .into_iter()
                .filter_map(|r| {
                    r.emoji.display_name().map(|emoji| ReactionCount {
                        emoji,
                        count: r.count,
                    })
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct MemberData {
    user: Option<UserData>,
}

#[derive(Debug, Clone, Deserialize)]
struct ReactionAddData {
    user_id: String,
    channel_id: String,
    message_id: String,
    guild_id: Option<String>,
    member: Option<MemberData>,
    emoji: EmojiData,
}

#[derive(Debug, Clone, Deserialize)]
struct ReadyData {
    user: UserData,
}

/// Translate a gateway dispatch (`op` 0) into a [`ChatEvent`].
///
/// Returns `None` for event types the service does not consume and for
/// payloads that fail to decode.
pub fn parse_dispatch(event_type: &str, data: Value) -> Option<ChatEvent> {
    let parsed = match event_type {
        "READY" => serde_json::from_value::<ReadyData>(data).map(|ready| ChatEvent::Ready {
            user_id: ready.user.id,
        }),
        "MESSAGE_CREATE" => serde_json::from_value::<MessageData>(data)
            .map(|message| ChatEvent::MessageCreated(message.into())),
        "MESSAGE_REACTION_ADD" => serde_json::from_value::<ReactionAddData>(data).map(|r| {
            let user_is_bot = r
                .member
                .and_then(|member| member.user)
                .map(|user| user.bot)
                .unwrap_or(false);
            ChatEvent::ReactionAdded(ReactionAdded {
                message_id: r.message_id,
                channel_id: r.channel_id,
                guild_id: r.guild_id,
                user_id: r.user_id,
                user_is_bot,
                emoji: r.emoji.display_name().unwrap_or_default(),
            })
        }),
        other => {
            debug!("Ignoring dispatch {}", other);
            return None;
        }
    };

    match parsed {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Failed to decode {} dispatch: {}", event_type, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ready_dispatch() {
        let event = parse_dispatch(
            "READY",
            json!({"v": 10, "user": {"id": "901", "username": "likewatch", "bot": true}}),
        );
        assert_eq!(
            event,
            Some(ChatEvent::Ready {
                user_id: "901".to_string()
            })
        );
    }

    #[test]
    fn test_message_create_dispatch() {
        let event = parse_dispatch(
            "MESSAGE_CREATE",
            json!({
                "id": "5001",
                "channel_id": "900",
                "guild_id": "77",
                "author": {"id": "3", "username": "someone"},
                "content": "look https://x.com/cat/status/1790",
                "reactions": [{"count": 2, "me": false, "emoji": {"id": null, "name": "😹"}}]
            }),
        );

        match event {
            Some(ChatEvent::MessageCreated(message)) => {
                assert_eq!(message.id, "5001");
                assert_eq!(message.guild_id.as_deref(), Some("77"));
                assert!(!message.author_is_bot);
                assert!(!message.is_reply);
                assert_eq!(message.reaction_count("😹"), 2);
                assert_eq!(message.reaction_count("🤓"), 0);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_reply_is_flagged() {
        let event = parse_dispatch(
            "MESSAGE_CREATE",
            json!({
                "id": "5002",
                "channel_id": "900",
                "author": {"id": "3", "bot": false},
                "content": "hi",
                "message_reference": {"message_id": "5001"}
            }),
        );
        assert!(matches!(
            event,
            Some(ChatEvent::MessageCreated(ChatMessage { is_reply: true, .. }))
        ));
    }

    #[test]
    fn test_reaction_add_dispatch() {
        let event = parse_dispatch(
            "MESSAGE_REACTION_ADD",
            json!({
                "user_id": "3",
                "channel_id": "900",
                "message_id": "5001",
                "guild_id": "77",
                "member": {"user": {"id": "3", "bot": true}},
                "emoji": {"id": "123", "name": "catwithtearsofjoyfacebook"}
            }),
        );

        match event {
            Some(ChatEvent::ReactionAdded(reaction)) => {
                assert_eq!(reaction.message_id, "5001");
                assert_eq!(reaction.emoji, "catwithtearsofjoyfacebook");
                assert!(reaction.user_is_bot);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_and_malformed_dispatches_are_dropped() {
        assert!(parse_dispatch("TYPING_START", json!({})).is_none());
        assert!(parse_dispatch("MESSAGE_CREATE", json!({"id": 1})).is_none());
    }
}
