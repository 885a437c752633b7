use crate::error::*;
use std::time::Duration;
use tracing::{error, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::FeedApi(e) => {
                error!("Feed API error details: {:?}", e);
            }
            CoreError::ChatApi(e) => {
                error!("Chat API error details: {:?}", e);
            }
            CoreError::Database(e) => {
                error!("Database error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::FeedApi(e) => e.is_retryable(),
            CoreError::ChatApi(e) => e.is_retryable(),
            CoreError::Database(e) => e.is_retryable(),
            CoreError::Network(_) => true,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::FeedApi(e) => e.retry_after(),
            CoreError::ChatApi(e) => e.retry_after(),
            CoreError::Database(e) => e.retry_after(),
            _ => None,
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::FeedApi(_) => "FEED_API".to_string(),
            CoreError::ChatApi(_) => "CHAT_API".to_string(),
            CoreError::Database(_) => "DATABASE".to_string(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Io(_) => "IO".to_string(),
            CoreError::Serialization(_) => "SERIALIZATION".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
            CoreError::InvalidInput { .. } => "INVALID_INPUT".to_string(),
            CoreError::NotFound { .. } => "NOT_FOUND".to_string(),
            CoreError::Internal { .. } => "INTERNAL".to_string(),
        }
    }
}

impl ErrorExt for FeedApiError {
    fn log_error(&self) -> &Self {
        error!("FeedApiError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("FeedApiError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            FeedApiError::RateLimitExceeded { .. } => true,
            FeedApiError::RequestTimeout => true,
            FeedApiError::Unreachable { .. } => true,
            // The gateway drops its session on this, so the next attempt logs in again
            FeedApiError::InvalidToken => true,
            FeedApiError::ServerError { status_code } => *status_code >= 500,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            FeedApiError::RateLimitExceeded { retry_after } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ => None,
        }
    }

    fn error_code(&self) -> String {
        match self {
            FeedApiError::AuthenticationFailed { .. } => "FEED_AUTH_FAILED".to_string(),
            FeedApiError::RateLimitExceeded { .. } => "FEED_RATE_LIMIT".to_string(),
            FeedApiError::Forbidden { .. } => "FEED_FORBIDDEN".to_string(),
            FeedApiError::UserNotFound { .. } => "FEED_USER_NOT_FOUND".to_string(),
            FeedApiError::InvalidToken => "FEED_INVALID_TOKEN".to_string(),
            FeedApiError::RequestTimeout => "FEED_TIMEOUT".to_string(),
            FeedApiError::Unreachable { .. } => "FEED_UNREACHABLE".to_string(),
            FeedApiError::InvalidResponse { .. } => "FEED_INVALID_RESPONSE".to_string(),
            FeedApiError::ServerError { .. } => "FEED_SERVER_ERROR".to_string(),
        }
    }
}

impl ErrorExt for ChatApiError {
    fn log_error(&self) -> &Self {
        error!("ChatApiError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ChatApiError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChatApiError::RateLimited { .. }
                | ChatApiError::RequestTimeout
                | ChatApiError::GatewayConnection { .. }
                | ChatApiError::ServerError { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ChatApiError::RateLimited { retry_after_ms } => {
                Some(Duration::from_millis(*retry_after_ms))
            }
            _ => None,
        }
    }

    fn error_code(&self) -> String {
        match self {
            ChatApiError::AuthenticationFailed { .. } => "CHAT_AUTH_FAILED".to_string(),
            ChatApiError::RateLimited { .. } => "CHAT_RATE_LIMIT".to_string(),
            ChatApiError::MissingPermission { .. } => "CHAT_MISSING_PERMISSION".to_string(),
            ChatApiError::Unknown { .. } => "CHAT_UNKNOWN_RESOURCE".to_string(),
            ChatApiError::RequestTimeout => "CHAT_TIMEOUT".to_string(),
            ChatApiError::GatewayConnection { .. } => "CHAT_GATEWAY".to_string(),
            ChatApiError::InvalidResponse { .. } => "CHAT_INVALID_RESPONSE".to_string(),
            ChatApiError::ServerError { .. } => "CHAT_SERVER_ERROR".to_string(),
        }
    }
}

impl ErrorExt for DatabaseError {
    fn log_error(&self) -> &Self {
        error!("DatabaseError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("DatabaseError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            DatabaseError::DatabaseLocked | DatabaseError::ConnectionFailed { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            DatabaseError::DatabaseLocked => Some(Duration::from_millis(100)),
            _ => None,
        }
    }

    fn error_code(&self) -> String {
        match self {
            DatabaseError::ConnectionFailed { .. } => "DB_CONNECTION_FAILED".to_string(),
            DatabaseError::MigrationFailed { .. } => "DB_MIGRATION_FAILED".to_string(),
            DatabaseError::QueryFailed { .. } => "DB_QUERY_FAILED".to_string(),
            DatabaseError::ConstraintViolation { .. } => "DB_CONSTRAINT_VIOLATION".to_string(),
            DatabaseError::DatabaseLocked => "DB_LOCKED".to_string(),
            DatabaseError::Sql(_) => "DB_SQL_ERROR".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::MissingEnvironmentVariable { .. } => "CONFIG_MISSING_ENV_VAR".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::ValidationFailed { .. } => "CONFIG_VALIDATION_FAILED".to_string(),
        }
    }
}
