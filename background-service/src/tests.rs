#[cfg(test)]
mod tests {
    use crate::test_support::{post, quick_retry, record_for, FakeChat, FakeFeed, BOT_ID, CHANNEL_ID};
    use crate::{
        Announcer, BackgroundService, DispatchSettings, Dispatcher, PollOutcome, QuietHours,
        SeenItemFilter, UrlFormat,
    };
    use chrono::{FixedOffset, NaiveTime, TimeZone, Utc};
    use database::{AnnouncementStore, MemoryStore};
    use likewatch_core::{AppConfig, QuietHoursConfig, UnpersistedPolicy};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn announcer(
        feed: Arc<FakeFeed>,
        chat: Arc<FakeChat>,
        store: Arc<MemoryStore>,
        quiet_hours: Option<QuietHours>,
    ) -> Announcer {
        let dispatcher = Dispatcher::new(
            feed.clone(),
            chat.clone(),
            store.clone(),
            UrlFormat::new("vxtwitter.com").unwrap(),
            quick_retry(),
            DispatchSettings {
                channel_id: CHANNEL_ID.to_string(),
                bot_id: BOT_ID.to_string(),
                announce_prefix: "New like".to_string(),
                max_per_poll: 10,
                unpersisted_policy: UnpersistedPolicy::Accept,
            },
        );
        Announcer::new(
            feed,
            chat,
            SeenItemFilter::StoreLookup {
                store,
                retry: quick_retry(),
            },
            dispatcher,
            quick_retry(),
            "1234",
            CHANNEL_ID,
            quiet_hours,
        )
    }

    #[tokio::test]
    async fn test_only_unannounced_like_is_sent() {
        let feed = Arc::new(FakeFeed::new());
        feed.set_likes(vec![post("P1", 10), post("P2", 5), post("P3", 5)]);
        let chat = Arc::new(FakeChat::new());
        let store = Arc::new(MemoryStore::new());
        store.insert(&record_for(&post("P2", 5))).await.unwrap();
        store.insert(&record_for(&post("P3", 5))).await.unwrap();

        let announcer = announcer(feed, chat.clone(), store.clone(), None);
        let outcome = announcer.poll(Utc::now()).await.unwrap();

        match outcome {
            PollOutcome::Completed(report) => assert_eq!(report.announced, vec!["P1"]),
            other => panic!("unexpected outcome: {other:?}"),
        }
        let sent = chat.sent_contents();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("https://vxtwitter.com/user42/status/P1"));
        assert_eq!(store.len().await, 3);
        assert_eq!(
            store.get("P1").await.unwrap().unwrap().message_id,
            chat.sent_ids()[0]
        );
    }

    #[tokio::test]
    async fn test_repeated_poll_announces_nothing_new() {
        let feed = Arc::new(FakeFeed::new());
        feed.set_likes(vec![post("1", 10), post("2", 20)]);
        let chat = Arc::new(FakeChat::new());
        let announcer = announcer(feed, chat.clone(), Arc::new(MemoryStore::new()), None);

        announcer.poll(Utc::now()).await.unwrap();
        let second = announcer.poll(Utc::now()).await.unwrap();

        assert!(matches!(second, PollOutcome::Completed(ref r) if r.sent() == 0));
        assert_eq!(chat.sent_contents().len(), 2);
    }

    #[tokio::test]
    async fn test_quiet_hours_start_sends_one_notice_and_nothing_else() {
        let feed = Arc::new(FakeFeed::new());
        feed.set_likes(vec![post("1", 10), post("2", 20)]);
        let chat = Arc::new(FakeChat::new());
        let quiet = QuietHours::new(QuietHoursConfig {
            start: NaiveTime::from_hms_opt(4, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
            utc_offset: FixedOffset::east_opt(0).unwrap(),
            start_message: "Going quiet".to_string(),
            end_message: "Back on watch".to_string(),
        });
        let announcer = announcer(
            feed.clone(),
            chat.clone(),
            Arc::new(MemoryStore::new()),
            Some(quiet),
        );

        let at_0401 = Utc.with_ymd_and_hms(2024, 5, 13, 4, 1, 0).unwrap();
        assert_eq!(announcer.poll(at_0401).await.unwrap(), PollOutcome::Quiet);
        assert_eq!(chat.sent_contents(), vec!["Going quiet"]);
        assert_eq!(feed.fetch_calls(), 0);

        let at_0600 = Utc.with_ymd_and_hms(2024, 5, 13, 6, 0, 0).unwrap();
        assert_eq!(announcer.poll(at_0600).await.unwrap(), PollOutcome::Quiet);
        assert_eq!(chat.sent_contents().len(), 1);

        let at_1100 = Utc.with_ymd_and_hms(2024, 5, 13, 11, 0, 0).unwrap();
        let outcome = announcer.poll(at_1100).await.unwrap();
        assert!(matches!(outcome, PollOutcome::Completed(ref r) if r.announced.len() == 2));
        let sent = chat.sent_contents();
        assert_eq!(sent[1], "Back on watch");
        assert_eq!(sent.len(), 4);
    }

    fn config() -> AppConfig {
        let env = HashMap::from([
            ("TWITTER_API_KEY", "key"),
            ("TWITTER_API_SECRET", "secret"),
            ("TRACKED_ACCOUNT_ID", "1234"),
            ("DISCORD_TOKEN", "token"),
            ("DISCORD_CHANNEL_ID", CHANNEL_ID),
            ("DISCORD_BOT_ID", "901"),
            ("SEEN_STRATEGY", "memory"),
            ("POLL_ON_STARTUP", "true"),
        ]);
        AppConfig::from_lookup(|key| env.get(key).map(|v| v.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_service_first_memory_poll_only_seeds() {
        let feed = Arc::new(FakeFeed::new());
        feed.set_likes(vec![post("1", 10)]);
        let chat = Arc::new(FakeChat::new());
        let service = BackgroundService::new(
            &config(),
            feed.clone(),
            chat.clone(),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();

        let announcer = service.announcer();
        announcer.poll(Utc::now()).await.unwrap();
        assert!(chat.sent_contents().is_empty());
        assert!(announcer.snapshot().await.contains("1"));

        feed.set_likes(vec![post("2", 20), post("1", 10)]);
        announcer.poll(Utc::now()).await.unwrap();
        assert_eq!(chat.sent_contents().len(), 1);
    }

    #[tokio::test]
    async fn test_service_stops_on_cancel() {
        let service = BackgroundService::new(
            &config(),
            Arc::new(FakeFeed::new()),
            Arc::new(FakeChat::new()),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();
        let (_sender, receiver) = mpsc::channel(1);

        service.stop();
        service.start(receiver).await.unwrap();
    }
}
