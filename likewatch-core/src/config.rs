//! Process configuration, read from environment variables at startup.
//!
//! Required variables abort startup when missing; everything else falls back
//! to a default. [`AppConfig::from_lookup`] takes any key lookup so callers
//! (and tests) are not tied to the real process environment.

use crate::{ConfigError, RetryConfig};
use chrono::{FixedOffset, NaiveTime, Offset, Utc};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://likewatch.db";
pub const DEFAULT_NOTABLE_EMOJIS: &str = "😹,catwithtearsofjoyfacebook";
pub const DEFAULT_EMBED_HOST: &str = "vxtwitter.com";
pub const DEFAULT_ANNOUNCE_PREFIX: &str = "New like";
pub const DEFAULT_ALREADY_SEEN_NOTICE: &str = "Already posted";
pub const DEFAULT_QUIET_START_MESSAGE: &str = "Going quiet for a while. Likes will resume later.";
pub const DEFAULT_QUIET_END_MESSAGE: &str = "Back on watch.";
pub const DEFAULT_RANDOM_REACT_EMOJI: &str = "🤓";

/// A string that never shows up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// How the seen-item filter decides whether a post was already announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeenStrategy {
    /// Look every post up in the announcement store.
    Store,
    /// Diff against the previous poll's batch held in memory.
    Memory,
}

/// What to do about posts that were sent but whose record failed to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnpersistedPolicy {
    /// Accept a possible duplicate announcement on the next poll.
    Accept,
    /// Scan the channel's recent messages for the post before sending.
    CheckHistory { lookback: u8 },
}

/// How a reaction event updates the stored counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionCountMode {
    /// Overwrite with the count reported by the chat platform.
    Set,
    /// Add one per event.
    Increment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedCredentials {
    pub api_key: Secret,
    pub api_secret: Secret,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuietHoursConfig {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub utc_offset: FixedOffset,
    pub start_message: String,
    pub end_message: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub feed_credentials: FeedCredentials,
    pub tracked_account_id: String,
    pub discord_token: Secret,
    pub discord_channel_id: String,
    pub discord_bot_id: String,
    pub database_url: String,
    pub notable_emojis: Vec<String>,
    pub quiet_hours: Option<QuietHoursConfig>,
    pub poll_interval_min: Duration,
    pub poll_interval_max: Duration,
    pub poll_on_startup: bool,
    pub max_announcements_per_poll: usize,
    pub seen_strategy: SeenStrategy,
    pub suppress_first_poll: bool,
    pub unpersisted_policy: UnpersistedPolicy,
    pub reaction_count_mode: ReactionCountMode,
    pub embed_host: String,
    pub announce_prefix: String,
    pub already_seen_notice: String,
    pub random_react_odds: u32,
    pub random_react_emoji: String,
    pub retry: RetryConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let feed_credentials = FeedCredentials {
            api_key: Secret::new(env.required("TWITTER_API_KEY")?),
            api_secret: Secret::new(env.required("TWITTER_API_SECRET")?),
        };
        let tracked_account_id = env.required("TRACKED_ACCOUNT_ID")?;
        let discord_token = Secret::new(env.required("DISCORD_TOKEN")?);
        let discord_channel_id = env.required("DISCORD_CHANNEL_ID")?;
        let discord_bot_id = env.required("DISCORD_BOT_ID")?;

        let notable_emojis = env
            .optional("NOTABLE_EMOJIS")
            .unwrap_or_else(|| DEFAULT_NOTABLE_EMOJIS.to_string())
            .split(',')
            .map(|emoji| emoji.trim().to_string())
            .filter(|emoji| !emoji.is_empty())
            .collect();

        let quiet_hours = match env.optional("QUIET_HOURS") {
            Some(raw) => {
                let (start, end) = parse_quiet_window(&raw)?;
                let utc_offset = match env.optional("QUIET_HOURS_UTC_OFFSET") {
                    Some(offset) => parse_utc_offset(&offset)?,
                    None => utc(),
                };
                Some(QuietHoursConfig {
                    start,
                    end,
                    utc_offset,
                    start_message: env
                        .optional("QUIET_START_MESSAGE")
                        .unwrap_or_else(|| DEFAULT_QUIET_START_MESSAGE.to_string()),
                    end_message: env
                        .optional("QUIET_END_MESSAGE")
                        .unwrap_or_else(|| DEFAULT_QUIET_END_MESSAGE.to_string()),
                })
            }
            None => None,
        };

        let poll_interval_min = Duration::from_secs(env.parse_or("POLL_INTERVAL_MIN_SECS", 900)?);
        let poll_interval_max = Duration::from_secs(env.parse_or("POLL_INTERVAL_MAX_SECS", 2400)?);
        if poll_interval_min.is_zero() || poll_interval_min > poll_interval_max {
            return Err(ConfigError::ValidationFailed {
                reason: format!(
                    "poll interval bounds must satisfy 0 < min <= max, got {}s..{}s",
                    poll_interval_min.as_secs(),
                    poll_interval_max.as_secs()
                ),
            });
        }

        let max_announcements_per_poll: usize = env.parse_or("MAX_ANNOUNCEMENTS_PER_POLL", 10)?;
        if max_announcements_per_poll == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MAX_ANNOUNCEMENTS_PER_POLL".to_string(),
                value: "0".to_string(),
            });
        }

        let seen_strategy = match env.optional("SEEN_STRATEGY").as_deref() {
            None | Some("store") => SeenStrategy::Store,
            Some("memory") => SeenStrategy::Memory,
            Some(other) => return Err(invalid("SEEN_STRATEGY", other)),
        };

        let lookback: u8 = env.parse_or("HISTORY_LOOKBACK", 50)?;
        if lookback == 0 || lookback > 100 {
            return Err(invalid("HISTORY_LOOKBACK", &lookback.to_string()));
        }
        let unpersisted_policy = match env.optional("UNPERSISTED_POLICY").as_deref() {
            None | Some("accept") => UnpersistedPolicy::Accept,
            Some("check-history") => UnpersistedPolicy::CheckHistory { lookback },
            Some(other) => return Err(invalid("UNPERSISTED_POLICY", other)),
        };

        let reaction_count_mode = match env.optional("REACTION_COUNT_MODE").as_deref() {
            None | Some("set") => ReactionCountMode::Set,
            Some("increment") => ReactionCountMode::Increment,
            Some(other) => return Err(invalid("REACTION_COUNT_MODE", other)),
        };

        let retry = RetryConfig {
            max_attempts: env.parse_or("RETRY_MAX_ATTEMPTS", 3)?,
            base_delay_ms: env.parse_or("RETRY_BASE_DELAY_MS", 2000)?,
            max_delay_ms: env.parse_or("RETRY_MAX_DELAY_MS", 60000)?,
            ..RetryConfig::default()
        };
        if retry.max_attempts == 0 {
            return Err(invalid("RETRY_MAX_ATTEMPTS", "0"));
        }

        Ok(Self {
            feed_credentials,
            tracked_account_id,
            discord_token,
            discord_channel_id,
            discord_bot_id,
            database_url: env
                .optional("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            notable_emojis,
            quiet_hours,
            poll_interval_min,
            poll_interval_max,
            poll_on_startup: env.bool_or("POLL_ON_STARTUP", false)?,
            max_announcements_per_poll,
            seen_strategy,
            suppress_first_poll: env.bool_or("SUPPRESS_FIRST_POLL", true)?,
            unpersisted_policy,
            reaction_count_mode,
            embed_host: env
                .optional("EMBED_HOST")
                .unwrap_or_else(|| DEFAULT_EMBED_HOST.to_string()),
            announce_prefix: env
                .optional("ANNOUNCE_PREFIX")
                .unwrap_or_else(|| DEFAULT_ANNOUNCE_PREFIX.to_string()),
            already_seen_notice: env
                .optional("ALREADY_SEEN_NOTICE")
                .unwrap_or_else(|| DEFAULT_ALREADY_SEEN_NOTICE.to_string()),
            random_react_odds: env.parse_or("RANDOM_REACT_ODDS", 500)?,
            random_react_emoji: env
                .optional("RANDOM_REACT_EMOJI")
                .unwrap_or_else(|| DEFAULT_RANDOM_REACT_EMOJI.to_string()),
            retry,
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvironmentVariable {
                var_name: key.to_string(),
            })
    }

    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.optional(key) {
            Some(raw) => raw.parse().map_err(|_| invalid(key, &raw)),
            None => Ok(default),
        }
    }

    fn bool_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.optional(key) {
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(invalid(key, &raw)),
            },
            None => Ok(default),
        }
    }
}

fn invalid(field: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

/// Parse `HH:MM-HH:MM`. The window may wrap past midnight but must not be empty.
pub fn parse_quiet_window(raw: &str) -> Result<(NaiveTime, NaiveTime), ConfigError> {
    let (start, end) = raw
        .split_once('-')
        .ok_or_else(|| invalid("QUIET_HOURS", raw))?;
    let start = NaiveTime::parse_from_str(start.trim(), "%H:%M")
        .map_err(|_| invalid("QUIET_HOURS", raw))?;
    let end = NaiveTime::parse_from_str(end.trim(), "%H:%M")
        .map_err(|_| invalid("QUIET_HOURS", raw))?;
    if start == end {
        return Err(invalid("QUIET_HOURS", raw));
    }
    Ok((start, end))
}

/// Parse `+HH:MM`, `-HH:MM`, `+HH` or `Z`.
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset, ConfigError> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return Ok(utc());
    }

    let err = || invalid("QUIET_HOURS_UTC_OFFSET", raw);
    let (sign, rest) = match raw.chars().next() {
        Some('+') => (1, &raw[1..]),
        Some('-') => (-1, &raw[1..]),
        _ => return Err(err()),
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None => (rest, "0"),
    };
    let digits = |field: &str| !field.is_empty() && field.bytes().all(|b| b.is_ascii_digit());
    if !digits(hours) || !digits(minutes) {
        return Err(err());
    }
    let hours: i32 = hours.parse().map_err(|_| err())?;
    let minutes: i32 = minutes.parse().map_err(|_| err())?;
    if hours > 14 || minutes > 59 {
        return Err(err());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(err)
}
