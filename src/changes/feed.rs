//! Change feed subscriptions.
//!
//! A [`ChangesFeed`] is an ordered, cancelable stream over the change log.
//! Events arrive strictly increasing by sequence number. `cancel()` is
//! synchronous: once it returns, no event from any later commit can be
//! delivered, even with writes in flight on other tasks.
//!
//! # Example
//!
//! ```
//! use rev_store::{Database, ChangesOptions};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), rev_store::Error> {
//! let db = Database::open("feed-docs-example")?;
//! db.put(&json!({"_id": "a", "v": 1})).await?;
//!
//! // Backlog-only feed: yields existing changes, then ends.
//! let mut feed = db.changes(&ChangesOptions::default())?;
//! let event = feed.next().await.expect("one change");
//! assert_eq!(event.id, "a");
//! assert!(feed.next().await.is_none());
//! # Database::destroy("feed-docs-example").await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use super::ChangeLog;

/// Options for [`crate::Database::changes`].
#[derive(Debug, Clone, Default)]
pub struct ChangesOptions {
    /// Keep delivering new events after the backlog (default: false, which
    /// delivers the existing backlog and then completes).
    pub continuous: bool,
    /// Attach the current winning payload to each event.
    pub include_docs: bool,
    /// Deliver only events with a sequence number greater than this.
    pub since: u64,
}

impl ChangesOptions {
    /// Live feed: backlog first, then new events until cancelled.
    #[must_use]
    pub fn with_continuous(mut self) -> Self {
        self.continuous = true;
        self
    }

    /// Attach winning payloads to events.
    #[must_use]
    pub fn with_include_docs(mut self) -> Self {
        self.include_docs = true;
        self
    }

    /// Resume after a previously seen sequence number.
    #[must_use]
    pub fn with_since(mut self, since: u64) -> Self {
        self.since = since;
        self
    }
}

/// One delivered change.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    /// Sequence number of the commit.
    pub seq: u64,
    /// Document id.
    pub id: String,
    /// Winning revision at commit time.
    pub rev: String,
    /// Deleted flag of that winner.
    pub deleted: bool,
    /// Winning payload, when the feed asked for documents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<Value>,
}

/// Handle to an active subscription.
pub struct ChangesFeed {
    rx: mpsc::UnboundedReceiver<ChangeEvent>,
    /// Present only for continuous feeds that are still registered.
    subscription: Option<(Arc<ChangeLog>, u64)>,
    cancelled: bool,
}

impl ChangesFeed {
    pub(crate) fn new(
        rx: mpsc::UnboundedReceiver<ChangeEvent>,
        subscription: Option<(Arc<ChangeLog>, u64)>,
    ) -> Self {
        Self { rx, subscription, cancelled: false }
    }

    /// Next event, or `None` when the feed has ended (backlog exhausted,
    /// cancelled, or the database was destroyed).
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        if self.cancelled {
            return None;
        }
        self.rx.recv().await
    }

    /// Non-blocking variant of [`ChangesFeed::next`].
    pub fn try_next(&mut self) -> Option<ChangeEvent> {
        if self.cancelled {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Stop the subscription. Synchronous: after this returns, no event
    /// from a later commit is delivered, and already-queued events are
    /// discarded too.
    pub fn cancel(&mut self) {
        if let Some((log, id)) = self.subscription.take() {
            log.unsubscribe(id);
            crate::metrics::record_feed_cancelled();
        }
        self.rx.close();
        self.cancelled = true;
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl Drop for ChangesFeed {
    fn drop(&mut self) {
        if let Some((log, id)) = self.subscription.take() {
            log.unsubscribe(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revision::RevId;
    use serde_json::json;

    fn rev(s: &str) -> RevId {
        RevId::parse(s).unwrap()
    }

    fn live_feed(log: &Arc<ChangeLog>) -> ChangesFeed {
        let (rx, sub) = log.subscribe(0, true, false, |_| None);
        ChangesFeed::new(rx, sub.map(|id| (log.clone(), id)))
    }

    #[tokio::test]
    async fn test_feed_yields_in_seq_order() {
        let log = Arc::new(ChangeLog::new());
        let mut feed = live_feed(&log);
        log.append("a", &rev("1-x"), false, &json!({}));
        log.append("b", &rev("1-y"), false, &json!({}));
        assert_eq!(feed.next().await.unwrap().seq, 1);
        assert_eq!(feed.next().await.unwrap().seq, 2);
    }

    #[tokio::test]
    async fn test_cancel_blocks_later_commits() {
        let log = Arc::new(ChangeLog::new());
        let mut feed = live_feed(&log);
        feed.cancel();
        log.append("a", &rev("1-x"), false, &json!({}));
        assert!(feed.next().await.is_none());
        assert!(feed.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_discards_queued_events() {
        let log = Arc::new(ChangeLog::new());
        let mut feed = live_feed(&log);
        log.append("a", &rev("1-x"), false, &json!({}));
        feed.cancel();
        assert!(feed.next().await.is_none());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let log = Arc::new(ChangeLog::new());
        let mut feed = live_feed(&log);
        feed.cancel();
        feed.cancel();
        assert_eq!(log.subscriber_count(), 0);
    }

    #[test]
    fn test_drop_deregisters() {
        let log = Arc::new(ChangeLog::new());
        let feed = live_feed(&log);
        assert_eq!(log.subscriber_count(), 1);
        drop(feed);
        assert_eq!(log.subscriber_count(), 0);
    }

    #[test]
    fn test_options_builder() {
        let opts = ChangesOptions::default()
            .with_continuous()
            .with_include_docs()
            .with_since(42);
        assert!(opts.continuous);
        assert!(opts.include_docs);
        assert_eq!(opts.since, 42);

        let defaults = ChangesOptions::default();
        assert!(!defaults.continuous);
        assert!(!defaults.include_docs);
        assert_eq!(defaults.since, 0);
    }

    #[test]
    fn test_event_serialization_skips_missing_doc() {
        let event = ChangeEvent {
            seq: 3,
            id: "a".into(),
            rev: "1-x".into(),
            deleted: false,
            doc: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("doc").is_none());
        assert_eq!(json["seq"], 3);
    }
}
