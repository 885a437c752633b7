use chrono::{DateTime, NaiveTime, Utc};
use likewatch_core::QuietHoursConfig;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleState {
    Active,
    Quiet,
}

/// A state change observed by [`QuietHours::observe`]. Each fires once per change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    EnteredQuiet,
    Resumed,
}

/// Active/Quiet state machine gated by a local time-of-day window.
#[derive(Debug, Clone)]
pub struct QuietHours {
    config: QuietHoursConfig,
    state: ScheduleState,
}

impl QuietHours {
    /// Starts Active; a process launched inside the window goes quiet
    /// (and says so) on its first observation.
    pub fn new(config: QuietHoursConfig) -> Self {
        Self {
            config,
            state: ScheduleState::Active,
        }
    }

    pub fn state(&self) -> ScheduleState {
        self.state
    }

    pub fn config(&self) -> &QuietHoursConfig {
        &self.config
    }

    /// Whether `at` falls inside the window, `[start, end)` in local time.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&self.config.utc_offset).time();
        window_contains(self.config.start, self.config.end, local)
    }

    pub fn observe(&mut self, now: DateTime<Utc>) -> Option<Transition> {
        let next = if self.contains(now) {
            ScheduleState::Quiet
        } else {
            ScheduleState::Active
        };
        if next == self.state {
            return None;
        }

        self.state = next;
        let transition = match next {
            ScheduleState::Quiet => Transition::EnteredQuiet,
            ScheduleState::Active => Transition::Resumed,
        };
        info!(?transition, "Quiet hours state changed");
        Some(transition)
    }

    /// Notice to post for `transition`.
    pub fn notice(&self, transition: Transition) -> &str {
        match transition {
            Transition::EnteredQuiet => &self.config.start_message,
            Transition::Resumed => &self.config.end_message,
        }
    }
}

fn window_contains(start: NaiveTime, end: NaiveTime, t: NaiveTime) -> bool {
    if start < end {
        start <= t && t < end
    } else {
        // wraps past midnight
        t >= start || t < end
    }
}
