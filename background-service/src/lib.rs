//! The likewatch service: polls the tracked account's likes, announces new
//! ones to the chat channel and keeps reaction counts for them.

pub mod already_seen;
pub mod dispatcher;
pub mod events;
pub mod filter;
pub mod quiet_hours;
pub mod reactions;
pub mod scheduler;
pub mod urls;

#[cfg(test)]
mod test_support;
#[cfg(test)]
mod tests;

use chat_client::{ChatEvent, ChatGateway};
use database::AnnouncementStore;
use feed_client::FeedGateway;
use likewatch_core::{AppConfig, CoreError, RetryExecutor, SeenStrategy};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use already_seen::AlreadySeenDetector;
pub use dispatcher::{DispatchReport, DispatchSettings, Dispatcher};
pub use events::{EventRouter, RandomReact};
pub use filter::{FeedSnapshot, SeenItemFilter};
pub use quiet_hours::{QuietHours, ScheduleState, Transition};
pub use reactions::{IgnoreReason, ReactionCounter, ReactionOutcome};
pub use scheduler::{run_scheduler, Announcer, PollOutcome, PollTiming};
pub use urls::UrlFormat;

pub struct BackgroundService {
    announcer: Arc<Announcer>,
    router: EventRouter,
    timing: PollTiming,
    cancel: CancellationToken,
}

impl BackgroundService {
    pub fn new(
        config: &AppConfig,
        feed: Arc<dyn FeedGateway>,
        chat: Arc<dyn ChatGateway>,
        store: Arc<dyn AnnouncementStore>,
    ) -> Result<Self, CoreError> {
        let urls = UrlFormat::new(&config.embed_host)?;
        let retry = RetryExecutor::new(config.retry.clone());

        let filter = match config.seen_strategy {
            SeenStrategy::Store => SeenItemFilter::StoreLookup {
                store: store.clone(),
                retry: retry.clone(),
            },
            SeenStrategy::Memory => SeenItemFilter::Snapshot {
                suppress_first_poll: config.suppress_first_poll,
            },
        };

        let dispatcher = Dispatcher::new(
            feed.clone(),
            chat.clone(),
            store.clone(),
            urls.clone(),
            retry.clone(),
            DispatchSettings {
                channel_id: config.discord_channel_id.clone(),
                bot_id: config.discord_bot_id.clone(),
                announce_prefix: config.announce_prefix.clone(),
                max_per_poll: config.max_announcements_per_poll,
                unpersisted_policy: config.unpersisted_policy,
            },
        );

        let announcer = Announcer::new(
            feed,
            chat.clone(),
            filter,
            dispatcher,
            retry,
            config.tracked_account_id.clone(),
            config.discord_channel_id.clone(),
            config.quiet_hours.clone().map(QuietHours::new),
        );

        let router = EventRouter::new(
            chat.clone(),
            config.discord_bot_id.clone(),
            ReactionCounter::new(
                store.clone(),
                urls.clone(),
                config.discord_bot_id.clone(),
                config.notable_emojis.clone(),
                config.reaction_count_mode,
            ),
            AlreadySeenDetector::new(
                chat,
                store,
                urls,
                config.discord_channel_id.clone(),
                config.already_seen_notice.clone(),
            ),
            RandomReact::new(config.random_react_odds, config.random_react_emoji.clone()),
        );

        Ok(Self {
            announcer: Arc::new(announcer),
            router,
            timing: PollTiming {
                min: config.poll_interval_min,
                max: config.poll_interval_max,
                poll_on_startup: config.poll_on_startup,
            },
            cancel: CancellationToken::new(),
        })
    }

    pub fn announcer(&self) -> Arc<Announcer> {
        self.announcer.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the poll schedule and the event router until [`stop`](Self::stop).
    pub async fn start(&self, events: mpsc::Receiver<ChatEvent>) -> Result<(), CoreError> {
        info!(
            "Background service started, polling every {:?} to {:?}",
            self.timing.min, self.timing.max
        );
        let scheduler = run_scheduler(self.announcer.clone(), self.timing, self.cancel.clone());
        let router = self.router.run(events, self.cancel.clone());
        tokio::join!(scheduler, router);
        info!("Background service stopped");
        Ok(())
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}
