//! Routes inbound chat events to the reaction counter, the already-seen
//! detector and the random reaction.

use crate::already_seen::AlreadySeenDetector;
use crate::reactions::{ReactionCounter, ReactionOutcome};
use chat_client::{ChatEvent, ChatGateway, ChatMessage, ReactionAdded};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Reacts to a user message with probability `1 / odds`. Zero odds disables it.
pub struct RandomReact {
    odds: u32,
    emoji: String,
    rng: Mutex<fastrand::Rng>,
}

impl RandomReact {
    pub fn new(odds: u32, emoji: impl Into<String>) -> Self {
        Self::with_rng(odds, emoji, fastrand::Rng::new())
    }

    pub fn with_rng(odds: u32, emoji: impl Into<String>, rng: fastrand::Rng) -> Self {
        Self {
            odds,
            emoji: emoji.into(),
            rng: Mutex::new(rng),
        }
    }

    pub fn emoji(&self) -> &str {
        &self.emoji
    }

    pub fn roll(&self) -> bool {
        if self.odds == 0 {
            return false;
        }
        match self.rng.lock() {
            Ok(mut rng) => rng.u32(0..self.odds) == 0,
            Err(_) => false,
        }
    }
}

pub struct EventRouter {
    chat: Arc<dyn ChatGateway>,
    bot_id: String,
    reactions: ReactionCounter,
    already_seen: AlreadySeenDetector,
    random_react: RandomReact,
}

impl EventRouter {
    pub fn new(
        chat: Arc<dyn ChatGateway>,
        bot_id: impl Into<String>,
        reactions: ReactionCounter,
        already_seen: AlreadySeenDetector,
        random_react: RandomReact,
    ) -> Self {
        Self {
            chat,
            bot_id: bot_id.into(),
            reactions,
            already_seen,
            random_react,
        }
    }

    /// Handle events until the channel closes or `cancel` fires.
    pub async fn run(&self, mut events: mpsc::Receiver<ChatEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => {
                        info!("Chat event stream ended");
                        break;
                    }
                },
            }
        }
    }

    pub async fn handle(&self, event: ChatEvent) {
        match event {
            ChatEvent::Ready { user_id } => {
                if user_id != self.bot_id {
                    warn!(
                        "Connected as {} but DISCORD_BOT_ID is {}; reactions will not match",
                        user_id, self.bot_id
                    );
                } else {
                    info!("Chat gateway ready as {}", user_id);
                }
            }
            ChatEvent::MessageCreated(message) => self.on_message(&message).await,
            ChatEvent::ReactionAdded(reaction) => self.on_reaction(&reaction).await,
        }
    }

    async fn on_message(&self, message: &ChatMessage) {
        if message.author_is_bot {
            return;
        }

        if self.random_react.roll() {
            if let Err(e) = self
                .chat
                .add_reaction(&message.channel_id, &message.id, self.random_react.emoji())
                .await
            {
                warn!(message_id = %message.id, "Failed to add random reaction: {}", e);
            }
        }

        if let Err(e) = self.already_seen.inspect(message).await {
            error!(message_id = %message.id, "Already-seen check failed: {}", e);
        }
    }

    async fn on_reaction(&self, reaction: &ReactionAdded) {
        // Skip the fetch for events the counter would drop anyway
        if reaction.user_is_bot || !self.reactions.is_notable(&reaction.emoji) {
            debug!(message_id = %reaction.message_id, "Ignoring reaction");
            return;
        }

        let message = match self
            .chat
            .fetch_message(&reaction.channel_id, &reaction.message_id)
            .await
        {
            Ok(message) => message,
            Err(e) => {
                error!(
                    message_id = %reaction.message_id,
                    "Something went wrong when fetching the message: {}", e
                );
                return;
            }
        };

        match self
            .reactions
            .handle(reaction.user_is_bot, &reaction.emoji, &message)
            .await
        {
            Ok(ReactionOutcome::Ignored(reason)) => {
                debug!(message_id = %message.id, ?reason, "Reaction ignored")
            }
            Ok(_) => {}
            Err(e) => error!(message_id = %message.id, "Failed to update react count: {}", e),
        }
    }
}
