// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Append-only change log.
//!
//! Every committed mutation appends one entry carrying the next sequence
//! number, the document id and the *winning* revision state at commit time.
//! The log is the source of truth for `update_seq` (highest assigned seq)
//! and `doc_count` (ids whose latest entry is not deleted); neither is
//! tracked anywhere else, so they cannot drift.
//!
//! Subscriber fan-out happens under the same write lock as the append:
//! backlog snapshot and live registration are therefore atomic with respect
//! to writers, which is what makes feeds gapless and duplicate-free.
//! Delivery itself is an unbounded channel send and never blocks a writer.

pub mod feed;

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::revision::RevId;
use feed::ChangeEvent;

/// One committed mutation.
#[derive(Debug, Clone)]
pub(crate) struct ChangeEntry {
    pub seq: u64,
    pub id: String,
    /// Winning revision at the time this entry was appended.
    pub rev: RevId,
    /// Deleted flag of that winner.
    pub deleted: bool,
}

struct Subscriber {
    id: u64,
    include_docs: bool,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

struct LogInner {
    entries: Vec<ChangeEntry>,
    /// doc id -> index of its latest entry in `entries`.
    latest: HashMap<String, usize>,
    live_docs: u64,
    next_seq: u64,
    next_subscriber_id: u64,
    subscribers: Vec<Subscriber>,
}

/// Shared, lock-protected change log. See the module docs for the locking
/// rule that keeps feeds ordered.
pub(crate) struct ChangeLog {
    inner: RwLock<LogInner>,
}

impl ChangeLog {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(LogInner {
                entries: Vec::new(),
                latest: HashMap::new(),
                live_docs: 0,
                next_seq: 1,
                next_subscriber_id: 1,
                subscribers: Vec::new(),
            }),
        }
    }

    /// Append one entry and fan it out to live subscribers. `winner_doc` is
    /// the rendered winning payload (tombstone stub for deleted winners),
    /// attached only for subscribers that asked for documents.
    ///
    /// Callers must not hold any document-map guard across this call.
    pub(crate) fn append(&self, id: &str, rev: &RevId, deleted: bool, winner_doc: &Value) -> u64 {
        let mut inner = self.inner.write();
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let was_live = inner
            .latest
            .get(id)
            .and_then(|&i| inner.entries.get(i))
            .map(|entry| !entry.deleted);
        match (was_live, deleted) {
            (Some(true), true) => inner.live_docs = inner.live_docs.saturating_sub(1),
            (Some(false) | None, false) => inner.live_docs += 1,
            _ => {}
        }

        let index = inner.entries.len();
        inner.entries.push(ChangeEntry {
            seq,
            id: id.to_string(),
            rev: rev.clone(),
            deleted,
        });
        inner.latest.insert(id.to_string(), index);

        let mut delivered = 0usize;
        inner.subscribers.retain(|sub| {
            let event = ChangeEvent {
                seq,
                id: id.to_string(),
                rev: rev.to_string(),
                deleted,
                doc: sub.include_docs.then(|| winner_doc.clone()),
            };
            let alive = sub.tx.send(event).is_ok();
            if alive {
                delivered += 1;
            }
            alive
        });
        if delivered > 0 {
            crate::metrics::record_changes_delivered(delivered);
        }
        seq
    }

    /// Highest assigned sequence number (0 before the first write).
    pub(crate) fn update_seq(&self) -> u64 {
        self.inner.read().next_seq - 1
    }

    /// Number of ids whose latest entry is not deleted.
    pub(crate) fn doc_count(&self) -> u64 {
        self.inner.read().live_docs
    }

    /// Snapshot the backlog after `since` into a fresh channel and, for
    /// continuous feeds, register the sender for live delivery. Returns the
    /// receiver plus the subscriber id (None for backlog-only feeds, whose
    /// channel closes once drained).
    ///
    /// `lookup` renders the current winning payload for `include_docs`; it
    /// may read the document map, which is safe because writers never hold
    /// a document-map guard while appending here.
    pub(crate) fn subscribe<F>(
        &self,
        since: u64,
        continuous: bool,
        include_docs: bool,
        lookup: F,
    ) -> (mpsc::UnboundedReceiver<ChangeEvent>, Option<u64>)
    where
        F: Fn(&str) -> Option<Value>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.write();

        for entry in inner.entries.iter().filter(|e| e.seq > since) {
            let doc = if include_docs { lookup(&entry.id) } else { None };
            let _ = tx.send(ChangeEvent {
                seq: entry.seq,
                id: entry.id.clone(),
                rev: entry.rev.to_string(),
                deleted: entry.deleted,
                doc,
            });
        }

        if !continuous {
            return (rx, None);
        }
        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;
        inner.subscribers.push(Subscriber { id, include_docs, tx });
        (rx, Some(id))
    }

    /// Remove a subscriber. After this returns the subscriber cannot
    /// receive an event from any later append.
    pub(crate) fn unsubscribe(&self, subscriber_id: u64) {
        self.inner
            .write()
            .subscribers
            .retain(|s| s.id != subscriber_id);
    }

    /// Drop every subscriber (destroy path); their feeds end.
    pub(crate) fn close_all_subscribers(&self) {
        self.inner.write().subscribers.clear();
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.inner.read().subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rev(s: &str) -> RevId {
        RevId::parse(s).unwrap()
    }

    #[test]
    fn test_seq_starts_at_one_and_increments() {
        let log = ChangeLog::new();
        assert_eq!(log.update_seq(), 0);
        assert_eq!(log.append("a", &rev("1-x"), false, &json!({})), 1);
        assert_eq!(log.append("b", &rev("1-y"), false, &json!({})), 2);
        assert_eq!(log.update_seq(), 2);
    }

    #[test]
    fn test_doc_count_transitions() {
        let log = ChangeLog::new();
        log.append("a", &rev("1-x"), false, &json!({}));
        assert_eq!(log.doc_count(), 1);
        // delete
        log.append("a", &rev("2-x"), true, &json!({}));
        assert_eq!(log.doc_count(), 0);
        // resurrection
        log.append("a", &rev("3-x"), false, &json!({}));
        assert_eq!(log.doc_count(), 1);
        // repeated live updates do not double count
        log.append("a", &rev("4-x"), false, &json!({}));
        assert_eq!(log.doc_count(), 1);
    }

    #[test]
    fn test_doc_count_ignores_docs_born_deleted() {
        let log = ChangeLog::new();
        log.append("ghost", &rev("1-g"), true, &json!({}));
        assert_eq!(log.doc_count(), 0);
        assert_eq!(log.update_seq(), 1);
    }

    #[tokio::test]
    async fn test_live_subscriber_receives_appends() {
        let log = ChangeLog::new();
        let (mut rx, sub) = log.subscribe(0, true, false, |_| None);
        assert!(sub.is_some());
        log.append("a", &rev("1-x"), false, &json!({"v": 1}));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.seq, 1);
        assert_eq!(event.id, "a");
        assert_eq!(event.rev, "1-x");
        assert!(event.doc.is_none());
    }

    #[tokio::test]
    async fn test_include_docs_attaches_payload() {
        let log = ChangeLog::new();
        let (mut rx, _) = log.subscribe(0, true, true, |_| None);
        log.append("a", &rev("1-x"), false, &json!({"v": 7}));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.doc.unwrap()["v"], 7);
    }

    #[tokio::test]
    async fn test_backlog_respects_since() {
        let log = ChangeLog::new();
        log.append("a", &rev("1-x"), false, &json!({}));
        log.append("b", &rev("1-y"), false, &json!({}));
        log.append("c", &rev("1-z"), false, &json!({}));
        let (mut rx, sub) = log.subscribe(1, false, false, |_| None);
        assert!(sub.is_none());
        assert_eq!(rx.recv().await.unwrap().seq, 2);
        assert_eq!(rx.recv().await.unwrap().seq, 3);
        // backlog-only channel closes after draining
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_backlog_lookup_used_for_docs() {
        let log = ChangeLog::new();
        log.append("a", &rev("1-x"), false, &json!({}));
        let (mut rx, _) = log.subscribe(0, false, true, |id| Some(json!({"looked_up": id})));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.doc.unwrap()["looked_up"], "a");
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let log = ChangeLog::new();
        let (mut rx, sub) = log.subscribe(0, true, false, |_| None);
        log.unsubscribe(sub.unwrap());
        assert_eq!(log.subscriber_count(), 0);
        log.append("a", &rev("1-x"), false, &json!({}));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dead_receiver_is_pruned_on_append() {
        let log = ChangeLog::new();
        let (rx, _) = log.subscribe(0, true, false, |_| None);
        drop(rx);
        assert_eq!(log.subscriber_count(), 1);
        log.append("a", &rev("1-x"), false, &json!({}));
        assert_eq!(log.subscriber_count(), 0);
    }

    #[test]
    fn test_close_all_ends_every_feed() {
        let log = ChangeLog::new();
        let (mut rx1, _) = log.subscribe(0, true, false, |_| None);
        let (mut rx2, _) = log.subscribe(0, true, false, |_| None);
        log.close_all_subscribers();
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_err());
        assert_eq!(log.subscriber_count(), 0);
    }
}
