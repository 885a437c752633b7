use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Feed API error: {0}")]
    FeedApi(#[from] FeedApiError),

    #[error("Chat API error: {0}")]
    ChatApi(#[from] ChatApiError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

#[derive(Error, Debug, Clone)]
pub enum FeedApiError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Rate limit exceeded. Retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Forbidden access to resource: {resource}")]
    Forbidden { resource: String },

    #[error("User not found: {user_id}")]
    UserNotFound { user_id: String },

    #[error("Session token invalid or expired")]
    InvalidToken,

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Upstream unreachable: {reason}")]
    Unreachable { reason: String },

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },
}

#[derive(Error, Debug, Clone)]
pub enum ChatApiError {
    #[error("Chat authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Rate limited by chat platform. Retry after {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Missing permission for {resource}")]
    MissingPermission { resource: String },

    #[error("Unknown {resource}")]
    Unknown { resource: String },

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Gateway connection failed: {reason}")]
    GatewayConnection { reason: String },

    #[error("Invalid chat response: {details}")]
    InvalidResponse { details: String },

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Migration failed: {migration}")]
    MigrationFailed { migration: String },

    #[error("Query execution failed: {query}")]
    QueryFailed { query: String },

    #[error("Constraint violation: {constraint}")]
    ConstraintViolation { constraint: String },

    #[error("Database locked")]
    DatabaseLocked,

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable not set: {var_name}")]
    MissingEnvironmentVariable { var_name: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },
}
