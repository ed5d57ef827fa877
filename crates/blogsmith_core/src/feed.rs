//! crates/blogsmith_core/src/feed.rs
//!
//! Live subscriptions to individual records. Publishers push full snapshots
//! keyed by record id; subscribers receive them through a cancellable handle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use crate::domain::Account;

const CHANNEL_CAPACITY: usize = 16;

/// A snapshot carrying a per-record version that only moves forward.
pub trait Versioned {
    fn version(&self) -> u64;
}

impl Versioned for Account {
    fn version(&self) -> u64 {
        self.version
    }
}

type Channels<T> = Mutex<HashMap<String, broadcast::Sender<T>>>;

/// A keyed publish/subscribe hub for record snapshots.
///
/// A key's channel lives while it has subscribers; the last subscription to
/// go removes it.
pub struct ChangeFeed<T> {
    channels: Arc<Channels<T>>,
}

pub type AccountFeed = ChangeFeed<Account>;

impl<T: Versioned + Clone + Send + 'static> ChangeFeed<T> {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Delivers `snapshot` to every live subscriber of `key`.
    pub fn publish(&self, key: &str, snapshot: T) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = channels.get(key) else {
            return;
        };
        if sender.send(snapshot).is_err() {
            // Every receiver is gone.
            channels.remove(key);
            debug!("Pruned idle feed channel for {}", key);
        }
    }

    pub fn subscribe(&self, key: &str) -> FeedSubscription<T> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let receiver = channels
            .entry(key.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();
        FeedSubscription {
            receiver,
            last_version: None,
            key: key.to_string(),
            channels: Arc::downgrade(&self.channels),
        }
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.get(key).map_or(0, |s| s.receiver_count())
    }

    /// Number of keys that currently hold a channel.
    pub fn channel_count(&self) -> usize {
        self.channels.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl<T: Versioned + Clone + Send + 'static> Default for ChangeFeed<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A handle on one subscription. Dropping it (or calling `cancel`) unsubscribes.
pub struct FeedSubscription<T> {
    receiver: broadcast::Receiver<T>,
    last_version: Option<u64>,
    key: String,
    channels: Weak<Channels<T>>,
}

impl<T: Versioned + Clone> FeedSubscription<T> {
    /// Waits for the next snapshot newer than any already returned.
    ///
    /// Returns `None` once the feed is dropped. A subscriber that falls behind
    /// skips ahead to the snapshots still buffered.
    pub async fn next(&mut self) -> Option<T> {
        loop {
            match self.receiver.recv().await {
                Ok(snapshot) => {
                    let version = snapshot.version();
                    if self.last_version.is_some_and(|seen| version <= seen) {
                        continue;
                    }
                    self.last_version = Some(version);
                    return Some(snapshot);
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Feed subscriber lagged, skipped {} snapshots", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Marks `snapshot` as already seen, so older or equal versions are dropped.
    pub fn seen(&mut self, snapshot: &T) {
        let version = snapshot.version();
        if self.last_version.map_or(true, |seen| version > seen) {
            self.last_version = Some(version);
        }
    }

    pub fn cancel(self) {}
}

impl<T> Drop for FeedSubscription<T> {
    fn drop(&mut self) {
        let Some(channels) = self.channels.upgrade() else {
            return;
        };
        let mut channels = channels.lock().unwrap_or_else(|e| e.into_inner());
        // Our own receiver is still counted here.
        if channels
            .get(&self.key)
            .is_some_and(|sender| sender.receiver_count() <= 1)
        {
            channels.remove(&self.key);
            debug!("Pruned idle feed channel for {}", self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Doc(u64);

    impl Versioned for Doc {
        fn version(&self) -> u64 {
            self.0
        }
    }

    #[tokio::test]
    async fn subscribers_only_see_their_key() {
        let feed = ChangeFeed::new();
        let mut a = feed.subscribe("a");
        let _b = feed.subscribe("b");

        feed.publish("b", Doc(1));
        feed.publish("a", Doc(7));

        assert_eq!(a.next().await, Some(Doc(7)));
    }

    #[tokio::test]
    async fn stale_versions_are_skipped() {
        let feed = ChangeFeed::new();
        let mut sub = feed.subscribe("doc");

        feed.publish("doc", Doc(3));
        feed.publish("doc", Doc(2));
        feed.publish("doc", Doc(3));
        feed.publish("doc", Doc(4));

        assert_eq!(sub.next().await, Some(Doc(3)));
        assert_eq!(sub.next().await, Some(Doc(4)));
    }

    #[tokio::test]
    async fn seen_snapshot_suppresses_replays() {
        let feed = ChangeFeed::new();
        let mut sub = feed.subscribe("doc");
        sub.seen(&Doc(5));

        feed.publish("doc", Doc(5));
        feed.publish("doc", Doc(6));

        assert_eq!(sub.next().await, Some(Doc(6)));
    }

    #[tokio::test]
    async fn cancelled_subscriptions_are_pruned() {
        let feed = ChangeFeed::new();
        let sub = feed.subscribe("doc");
        assert_eq!(feed.subscriber_count("doc"), 1);

        sub.cancel();
        feed.publish("doc", Doc(1));

        assert_eq!(feed.subscriber_count("doc"), 0);
    }

    #[tokio::test]
    async fn last_subscription_removes_its_channel_without_a_publish() {
        let feed: ChangeFeed<Doc> = ChangeFeed::new();
        let first = feed.subscribe("doc");
        let mut second = feed.subscribe("doc");
        let other = feed.subscribe("other");
        assert_eq!(feed.channel_count(), 2);

        first.cancel();
        assert_eq!(feed.channel_count(), 2);
        feed.publish("doc", Doc(1));
        assert_eq!(second.next().await, Some(Doc(1)));

        drop(second);
        assert_eq!(feed.channel_count(), 1);
        other.cancel();
        assert_eq!(feed.channel_count(), 0);
    }

    #[test]
    fn subscription_outliving_its_feed_drops_cleanly() {
        let feed: ChangeFeed<Doc> = ChangeFeed::new();
        let sub = feed.subscribe("doc");
        drop(feed);
        sub.cancel();
    }

    #[tokio::test]
    async fn lagging_subscriber_catches_up_to_latest() {
        let feed = ChangeFeed::new();
        let mut sub = feed.subscribe("doc");

        for v in 1..=(CHANNEL_CAPACITY as u64 + 5) {
            feed.publish("doc", Doc(v));
        }

        let first = sub.next().await.map(|d| d.0);
        assert!(first > Some(1));
        let mut last = first;
        while let Ok(Some(doc)) =
            tokio::time::timeout(std::time::Duration::from_millis(20), sub.next()).await
        {
            assert!(Some(doc.0) > last);
            last = Some(doc.0);
        }
        assert_eq!(last, Some(CHANNEL_CAPACITY as u64 + 5));
    }
}
