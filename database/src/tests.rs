#[cfg(test)]
mod tests {
    use crate::{AnnouncementStore, Database, MemoryStore};
    use chrono::{TimeZone, Utc};
    use likewatch_core::{AnnouncementRecord, CoreError, DatabaseError, EngagementCounts};
    use serde_json::json;
    use std::env;

    async fn setup_test_db() -> Database {
        let db_path = env::temp_dir().join(format!("test_likewatch_{}.db", uuid::Uuid::new_v4()));
        let db_url = format!("sqlite://{}", db_path.display());

        let mut db = Database::new(db_url);
        db.connect()
            .await
            .expect("Failed to connect to test database");
        db.run_migrations().await.expect("Failed to run migrations");

        db
    }

    fn sample_record(post_id: &str) -> AnnouncementRecord {
        AnnouncementRecord {
            post_id: post_id.to_string(),
            author_id: "42".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 13, 9, 30, 0).unwrap(),
            text: "a cat falls off a table".to_string(),
            entities: Some(json!({"urls": [{"expanded_url": "https://example.com/cat"}]})),
            counts: EngagementCounts {
                like_count: 120,
                reply_count: 4,
                quote_count: 1,
                retweet_count: 9,
            },
            lang: Some("en".to_string()),
            reply_to: None,
            quoted: Some("1700".to_string()),
            reaction_count: 0,
            message_id: "5001".to_string(),
            announced_at: Utc.with_ymd_and_hms(2024, 5, 13, 10, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_database_connection_and_migrations() {
        let db = setup_test_db().await;
        assert_eq!(db.announcement_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unconnected_database_reports_connection_failure() {
        let db = Database::new("sqlite::memory:".to_string());
        match db.get("1").await {
            Err(CoreError::Database(DatabaseError::ConnectionFailed { .. })) => {}
            other => panic!("expected connection failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_round_trip() {
        let db = setup_test_db().await;
        let record = sample_record("1790");

        db.insert(&record).await.expect("Failed to insert record");
        let stored = db.get("1790").await.expect("Failed to read record");

        assert_eq!(stored, Some(record));
        assert_eq!(db.announcement_count().await.unwrap(), 1);
        assert_eq!(db.get("9999").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_record_without_entities() {
        let db = setup_test_db().await;
        let mut record = sample_record("1791");
        record.entities = None;
        record.quoted = None;

        db.insert(&record).await.unwrap();
        let stored = db.get("1791").await.unwrap().unwrap();
        assert!(stored.entities.is_none());
        assert!(stored.quoted.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_a_constraint_violation() {
        let db = setup_test_db().await;
        db.insert(&sample_record("1790")).await.unwrap();

        match db.insert(&sample_record("1790")).await {
            Err(CoreError::Database(DatabaseError::ConstraintViolation { .. })) => {}
            other => panic!("expected constraint violation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reaction_count_updates() {
        let db = setup_test_db().await;
        db.insert(&sample_record("1790")).await.unwrap();

        assert!(db.update_reaction_count("1790", 5).await.unwrap());
        assert_eq!(db.get("1790").await.unwrap().unwrap().reaction_count, 5);

        assert!(db.increment_reaction_count("1790").await.unwrap());
        assert_eq!(db.get("1790").await.unwrap().unwrap().reaction_count, 6);

        assert!(!db.update_reaction_count("404", 1).await.unwrap());
        assert!(!db.increment_reaction_count("404").await.unwrap());
        assert!(db.get("404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_matches_database_semantics() {
        let store = MemoryStore::new();
        assert!(store.is_empty().await);

        store.insert(&sample_record("1790")).await.unwrap();
        assert!(store.insert(&sample_record("1790")).await.is_err());
        assert_eq!(store.len().await, 1);

        assert!(store.update_reaction_count("1790", 3).await.unwrap());
        assert!(store.increment_reaction_count("1790").await.unwrap());
        assert_eq!(store.get("1790").await.unwrap().unwrap().reaction_count, 4);
        assert!(!store.increment_reaction_count("404").await.unwrap());
    }
}
