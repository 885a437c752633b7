use crate::dispatcher::{DispatchReport, Dispatcher};
use crate::filter::{FeedSnapshot, SeenItemFilter};
use crate::quiet_hours::{QuietHours, ScheduleState};
use chat_client::ChatGateway;
use chrono::{DateTime, Utc};
use feed_client::FeedGateway;
use likewatch_core::{CoreError, ErrorExt, RetryExecutor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Completed(DispatchReport),
    /// Quiet hours are in effect; nothing was fetched.
    Quiet,
    /// Another poll was still running.
    Skipped,
}

/// One poll cycle: quiet-hours gate, fetch, filter, dispatch.
pub struct Announcer {
    feed: Arc<dyn FeedGateway>,
    chat: Arc<dyn ChatGateway>,
    filter: SeenItemFilter,
    dispatcher: Dispatcher,
    retry: RetryExecutor,
    account_id: String,
    channel_id: String,
    snapshot: Mutex<FeedSnapshot>,
    quiet_hours: Mutex<Option<QuietHours>>,
    in_flight: AtomicBool,
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Announcer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        feed: Arc<dyn FeedGateway>,
        chat: Arc<dyn ChatGateway>,
        filter: SeenItemFilter,
        dispatcher: Dispatcher,
        retry: RetryExecutor,
        account_id: impl Into<String>,
        channel_id: impl Into<String>,
        quiet_hours: Option<QuietHours>,
    ) -> Self {
        Self {
            feed,
            chat,
            filter,
            dispatcher,
            retry,
            account_id: account_id.into(),
            channel_id: channel_id.into(),
            snapshot: Mutex::new(FeedSnapshot::empty()),
            quiet_hours: Mutex::new(quiet_hours),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Replace the feed snapshot, e.g. to restore one from an earlier run.
    pub async fn set_snapshot(&self, snapshot: FeedSnapshot) {
        *self.snapshot.lock().await = snapshot;
    }

    pub async fn snapshot(&self) -> FeedSnapshot {
        self.snapshot.lock().await.clone()
    }

    pub fn is_polling(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn poll(&self, now: DateTime<Utc>) -> Result<PollOutcome, CoreError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Previous poll still running, skipping this one");
            return Ok(PollOutcome::Skipped);
        }
        let _guard = InFlightGuard(&self.in_flight);

        if self.observe_quiet_hours(now).await == ScheduleState::Quiet {
            debug!("Quiet hours, not checking for new likes");
            return Ok(PollOutcome::Quiet);
        }

        info!("Checking for new likes");
        let account_id = self.account_id.as_str();
        let page = self
            .retry
            .execute("fetch likes", || self.feed.fetch_likes(account_id))
            .await?;

        let (fresh, previous) = {
            let mut snapshot = self.snapshot.lock().await;
            let previous = snapshot.clone();
            (self.filter.new_items(page.items, &mut snapshot).await?, previous)
        };

        // Posts that were not delivered must stay new for the next poll
        let report = match self.dispatcher.dispatch(fresh).await {
            Ok(report) => report,
            Err(e) => {
                *self.snapshot.lock().await = previous;
                return Err(e);
            }
        };
        if !report.failed.is_empty() {
            self.snapshot.lock().await.forget(&report.failed);
        }

        info!("Finished checking for new likes");
        Ok(PollOutcome::Completed(report))
    }

    async fn observe_quiet_hours(&self, now: DateTime<Utc>) -> ScheduleState {
        let mut quiet_hours = self.quiet_hours.lock().await;
        let Some(quiet) = quiet_hours.as_mut() else {
            return ScheduleState::Active;
        };

        if let Some(transition) = quiet.observe(now) {
            let notice = quiet.notice(transition).to_string();
            let channel_id = self.channel_id.as_str();
            if let Err(e) = self
                .retry
                .execute("send quiet hours notice", || {
                    self.chat.send_message(channel_id, &notice)
                })
                .await
            {
                error!("Failed to send quiet hours notice: {}", e);
            }
        }
        quiet.state()
    }
}

/// Bounds of the randomized wait between poll starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiming {
    pub min: Duration,
    pub max: Duration,
    pub poll_on_startup: bool,
}

impl PollTiming {
    pub fn next_interval(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(fastrand::u64(min..=max))
    }
}

/// Poll on a jittered schedule until `cancel` fires.
///
/// Each deadline is measured from the start of the previous poll. Polls run
/// as their own tasks, so a slow one meets the next tick at the
/// [`Announcer`]'s in-flight guard instead of delaying the schedule.
pub async fn run_scheduler(announcer: Arc<Announcer>, timing: PollTiming, cancel: CancellationToken) {
    let mut deadline = if timing.poll_on_startup {
        Instant::now()
    } else {
        Instant::now() + timing.next_interval()
    };
    let mut current: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep_until(deadline) => {}
        }

        let started = Instant::now();
        let interval = timing.next_interval();
        deadline = started + interval;
        debug!("Next poll in {:?}", interval);

        let announcer = announcer.clone();
        current = Some(tokio::spawn(async move {
            match announcer.poll(Utc::now()).await {
                Ok(PollOutcome::Completed(report)) => {
                    debug!(sent = report.sent(), "Poll completed")
                }
                Ok(outcome) => debug!(?outcome, "Poll did not dispatch"),
                Err(e) => {
                    e.log_error();
                }
            }
        }));
    }

    info!("Scheduler stopping");
    if let Some(handle) = current {
        if let Err(e) = handle.await {
            error!("Poll task failed: {}", e);
        }
    }
}
