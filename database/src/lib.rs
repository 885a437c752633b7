mod memory;
#[cfg(test)]
mod tests;

use async_trait::async_trait;
use likewatch_core::{AnnouncementRecord, CoreError, DatabaseError, EngagementCounts};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

pub use memory::MemoryStore;

/// Persistence boundary for announcement records.
///
/// A missing record is a normal outcome: `get` returns `None`, the update
/// operations return `false`.
#[async_trait]
pub trait AnnouncementStore: Send + Sync {
    async fn get(&self, post_id: &str) -> Result<Option<AnnouncementRecord>, CoreError>;

    async fn insert(&self, record: &AnnouncementRecord) -> Result<(), CoreError>;

    /// Overwrite the reaction counter. Returns whether the record exists.
    async fn update_reaction_count(&self, post_id: &str, count: i64) -> Result<bool, CoreError>;

    /// Add one to the reaction counter. Returns whether the record exists.
    async fn increment_reaction_count(&self, post_id: &str) -> Result<bool, CoreError>;
}

pub struct Database {
    connection_string: String,
    pool: Option<SqlitePool>,
}

impl Database {
    pub fn new(connection_string: String) -> Self {
        Self {
            connection_string,
            pool: None,
        }
    }

    pub async fn connect(&mut self) -> Result<(), CoreError> {
        let options = SqliteConnectOptions::from_str(&self.connection_string)
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        info!("Connected to database {}", self.connection_string);
        self.pool = Some(pool);
        Ok(())
    }

    pub async fn run_migrations(&self) -> Result<(), CoreError> {
        sqlx::migrate!("./migrations")
            .run(self.pool()?)
            .await
            .map_err(|e| DatabaseError::MigrationFailed {
                migration: e.to_string(),
            })?;
        debug!("Database migrations applied");
        Ok(())
    }

    pub async fn announcement_count(&self) -> Result<i64, CoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM announcements")
            .fetch_one(self.pool()?)
            .await
            .map_err(|e| map_sqlx_error(e, "count announcements"))?;
        Ok(count)
    }

    fn pool(&self) -> Result<&SqlitePool, CoreError> {
        self.pool.as_ref().ok_or_else(|| {
            CoreError::Database(DatabaseError::ConnectionFailed {
                reason: "database not connected".to_string(),
            })
        })
    }
}

#[async_trait]
impl AnnouncementStore for Database {
    async fn get(&self, post_id: &str) -> Result<Option<AnnouncementRecord>, CoreError> {
        let row = sqlx::query("SELECT * FROM announcements WHERE post_id = ?")
            .bind(post_id)
            .fetch_optional(self.pool()?)
            .await
            .map_err(|e| map_sqlx_error(e, "select announcement"))?;

        row.map(|row| record_from_row(&row)).transpose()
    }

    async fn insert(&self, record: &AnnouncementRecord) -> Result<(), CoreError> {
        let entities = record
            .entities
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            "INSERT INTO announcements (post_id, author_id, created_at, full_text, entities, \
             lang, reply_to, quoted, like_count, reply_count, quote_count, retweet_count, \
             reaction_count, message_id, announced_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.post_id)
        .bind(&record.author_id)
        .bind(record.created_at)
        .bind(&record.text)
        .bind(entities)
        .bind(&record.lang)
        .bind(&record.reply_to)
        .bind(&record.quoted)
        .bind(record.counts.like_count)
        .bind(record.counts.reply_count)
        .bind(record.counts.quote_count)
        .bind(record.counts.retweet_count)
        .bind(record.reaction_count)
        .bind(&record.message_id)
        .bind(record.announced_at)
        .execute(self.pool()?)
        .await
        .map_err(|e| map_sqlx_error(e, "insert announcement"))?;

        debug!(post_id = %record.post_id, "Announcement recorded");
        Ok(())
    }

    async fn update_reaction_count(&self, post_id: &str, count: i64) -> Result<bool, CoreError> {
        let result = sqlx::query("UPDATE announcements SET reaction_count = ? WHERE post_id = ?")
            .bind(count)
            .bind(post_id)
            .execute(self.pool()?)
            .await
            .map_err(|e| map_sqlx_error(e, "update reaction count"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn increment_reaction_count(&self, post_id: &str) -> Result<bool, CoreError> {
        let result = sqlx::query(
            "UPDATE announcements SET reaction_count = reaction_count + 1 WHERE post_id = ?",
        )
        .bind(post_id)
        .execute(self.pool()?)
        .await
        .map_err(|e| map_sqlx_error(e, "increment reaction count"))?;
        Ok(result.rows_affected() > 0)
    }
}

fn record_from_row(row: &SqliteRow) -> Result<AnnouncementRecord, CoreError> {
    let get_err = |e: sqlx::Error| map_sqlx_error(e, "decode announcement");

    let entities: Option<String> = row.try_get("entities").map_err(get_err)?;
    let entities = entities
        .map(|raw| serde_json::from_str::<serde_json::Value>(&raw))
        .transpose()?;

    Ok(AnnouncementRecord {
        post_id: row.try_get("post_id").map_err(get_err)?,
        author_id: row.try_get("author_id").map_err(get_err)?,
        created_at: row.try_get("created_at").map_err(get_err)?,
        text: row.try_get("full_text").map_err(get_err)?,
        entities,
        counts: EngagementCounts {
            like_count: row.try_get("like_count").map_err(get_err)?,
            reply_count: row.try_get("reply_count").map_err(get_err)?,
            quote_count: row.try_get("quote_count").map_err(get_err)?,
            retweet_count: row.try_get("retweet_count").map_err(get_err)?,
        },
        lang: row.try_get("lang").map_err(get_err)?,
        reply_to: row.try_get("reply_to").map_err(get_err)?,
        quoted: row.try_get("quoted").map_err(get_err)?,
        reaction_count: row.try_get("reaction_count").map_err(get_err)?,
        message_id: row.try_get("message_id").map_err(get_err)?,
        announced_at: row.try_get("announced_at").map_err(get_err)?,
    })
}

/// Classify sqlx failures so lock contention is retryable and duplicates are recognizable.
fn map_sqlx_error(err: sqlx::Error, query: &str) -> CoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return CoreError::Database(DatabaseError::ConstraintViolation {
                constraint: format!("{query}: {}", db_err.message()),
            });
        }
        // SQLITE_BUSY / SQLITE_LOCKED
        if matches!(db_err.code().as_deref(), Some("5") | Some("6")) {
            return CoreError::Database(DatabaseError::DatabaseLocked);
        }
    }
    CoreError::Database(DatabaseError::Sql(err))
}
