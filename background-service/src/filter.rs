//! Seen-item filter: decides which posts of a freshly fetched batch have
//! never been announced.

use database::AnnouncementStore;
use likewatch_core::{CoreError, Post, RetryExecutor};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Identifiers of the previous poll's batch, owned by the poll loop.
///
/// A fresh snapshot is unseeded: it has not observed any batch yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedSnapshot {
    ids: HashSet<String>,
    seeded: bool,
}

impl FeedSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn seeded<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            seeded: true,
        }
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    pub fn contains(&self, post_id: &str) -> bool {
        self.ids.contains(post_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Drop `post_ids` so the next batch that still carries them reports them again.
    pub fn forget<'a, I>(&mut self, post_ids: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        for id in post_ids {
            self.ids.remove(id);
        }
    }
}

pub enum SeenItemFilter {
    /// Authoritative: a post is new iff the store has no record for it.
    StoreLookup {
        store: Arc<dyn AnnouncementStore>,
        retry: RetryExecutor,
    },
    /// Set difference against the previous batch held in a [`FeedSnapshot`].
    Snapshot { suppress_first_poll: bool },
}

impl SeenItemFilter {
    /// Posts of `batch` not announced before, in batch order, each id at most once.
    ///
    /// The snapshot is only read and replaced by the `Snapshot` strategy.
    pub async fn new_items(
        &self,
        batch: Vec<Post>,
        snapshot: &mut FeedSnapshot,
    ) -> Result<Vec<Post>, CoreError> {
        match self {
            Self::StoreLookup { store, retry } => lookup_new(store.as_ref(), retry, batch).await,
            Self::Snapshot {
                suppress_first_poll,
            } => Ok(diff_snapshot(batch, snapshot, *suppress_first_poll)),
        }
    }
}

async fn lookup_new(
    store: &dyn AnnouncementStore,
    retry: &RetryExecutor,
    batch: Vec<Post>,
) -> Result<Vec<Post>, CoreError> {
    let mut considered = HashSet::new();
    let mut fresh = Vec::new();

    for post in batch {
        if !considered.insert(post.id.clone()) {
            continue;
        }
        let existing = retry
            .execute("announcement lookup", || store.get(&post.id))
            .await?;
        if existing.is_none() {
            fresh.push(post);
        }
    }

    debug!("{} of {} liked posts are new", fresh.len(), considered.len());
    Ok(fresh)
}

fn diff_snapshot(batch: Vec<Post>, snapshot: &mut FeedSnapshot, suppress_first_poll: bool) -> Vec<Post> {
    let current: HashSet<String> = batch.iter().map(|post| post.id.clone()).collect();

    let fresh = if !snapshot.seeded && suppress_first_poll {
        info!("Seeding feed snapshot with {} posts", current.len());
        Vec::new()
    } else {
        let mut emitted = HashSet::new();
        batch
            .into_iter()
            .filter(|post| !snapshot.ids.contains(&post.id))
            .filter(|post| emitted.insert(post.id.clone()))
            .collect()
    };

    snapshot.ids = current;
    snapshot.seeded = true;
    fresh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{post, quick_retry, record_for};
    use database::MemoryStore;

    fn ids(posts: &[Post]) -> HashSet<String> {
        posts.iter().map(|p| p.id.clone()).collect()
    }

    #[tokio::test]
    async fn test_store_lookup_returns_unrecorded_posts() {
        let store = Arc::new(MemoryStore::new());
        store.insert(&record_for(&post("2", 5))).await.unwrap();
        let filter = SeenItemFilter::StoreLookup {
            store: store.clone(),
            retry: quick_retry(),
        };

        let batch = vec![post("1", 10), post("2", 5), post("3", 5), post("1", 10)];
        let fresh = filter
            .new_items(batch, &mut FeedSnapshot::empty())
            .await
            .unwrap();

        assert_eq!(fresh.len(), 2);
        assert_eq!(ids(&fresh), HashSet::from(["1".to_string(), "3".to_string()]));
    }

    #[tokio::test]
    async fn test_order_independence() {
        let store = Arc::new(MemoryStore::new());
        store.insert(&record_for(&post("4", 1))).await.unwrap();
        let lookup = SeenItemFilter::StoreLookup {
            store,
            retry: quick_retry(),
        };
        let snapshot_filter = SeenItemFilter::Snapshot {
            suppress_first_poll: false,
        };

        let forward = vec![post("1", 1), post("2", 2), post("3", 3), post("4", 4)];
        let mut backward = forward.clone();
        backward.reverse();
        let mut shuffled = forward.clone();
        shuffled.swap(0, 2);

        for filter in [&lookup, &snapshot_filter] {
            let previous = FeedSnapshot::seeded(["2"]);
            let mut results = Vec::new();
            for batch in [&forward, &backward, &shuffled] {
                let mut snapshot = previous.clone();
                let fresh = filter.new_items(batch.clone(), &mut snapshot).await.unwrap();
                results.push(ids(&fresh));
            }
            assert_eq!(results[0], results[1]);
            assert_eq!(results[0], results[2]);
        }
    }

    #[tokio::test]
    async fn test_store_lookup_is_idempotent_after_recording() {
        let store = Arc::new(MemoryStore::new());
        let filter = SeenItemFilter::StoreLookup {
            store: store.clone(),
            retry: quick_retry(),
        };
        let batch = vec![post("1", 1), post("2", 2)];

        let mut snapshot = FeedSnapshot::empty();
        let fresh = filter.new_items(batch.clone(), &mut snapshot).await.unwrap();
        assert_eq!(fresh.len(), 2);
        for p in &fresh {
            store.insert(&record_for(p)).await.unwrap();
        }

        let again = filter.new_items(batch, &mut snapshot).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_first_poll_suppression() {
        let filter = SeenItemFilter::Snapshot {
            suppress_first_poll: true,
        };
        let mut snapshot = FeedSnapshot::empty();

        let first = filter
            .new_items(vec![post("1", 1), post("2", 2)], &mut snapshot)
            .await
            .unwrap();
        assert!(first.is_empty());
        assert!(snapshot.is_seeded());
        assert_eq!(snapshot.len(), 2);

        let second = filter
            .new_items(vec![post("3", 3), post("1", 1), post("2", 2)], &mut snapshot)
            .await
            .unwrap();
        assert_eq!(ids(&second), HashSet::from(["3".to_string()]));
        assert!(snapshot.contains("3"));
    }

    #[tokio::test]
    async fn test_snapshot_without_suppression_announces_first_batch() {
        let filter = SeenItemFilter::Snapshot {
            suppress_first_poll: false,
        };
        let mut snapshot = FeedSnapshot::empty();
        let fresh = filter
            .new_items(vec![post("1", 1), post("2", 2)], &mut snapshot)
            .await
            .unwrap();
        assert_eq!(fresh.len(), 2);

        let again = filter
            .new_items(vec![post("1", 1), post("2", 2)], &mut snapshot)
            .await
            .unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_forgets_posts_that_drop_out() {
        let filter = SeenItemFilter::Snapshot {
            suppress_first_poll: false,
        };
        let mut snapshot = FeedSnapshot::seeded(["1", "2"]);

        filter
            .new_items(vec![post("1", 1)], &mut snapshot)
            .await
            .unwrap();
        assert!(!snapshot.contains("2"));

        // A post that reappears after dropping out of the window counts as new again
        let fresh = filter
            .new_items(vec![post("1", 1), post("2", 2)], &mut snapshot)
            .await
            .unwrap();
        assert_eq!(ids(&fresh), HashSet::from(["2".to_string()]));
    }
}
