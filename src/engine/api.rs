//! Client-facing database handle.
//!
//! A [`Database`] is a lightweight view onto a shared [`DbCore`]:
//! - `open()` / `open_with()` - attach to (or create) a named database
//! - `put()` / `post()` / `remove()` - single-document writes
//! - `get()` / `get_with()` - winner or exact-revision reads
//! - `bulk_docs()` - ordered multi-document writes
//! - `changes()` - live or backlog change feeds
//! - `info()` / `id()` - metadata
//! - `close()` - release this handle without touching stored state
//!
//! Any number of handles may be open against the same name; they all see
//! one shared document map and one change log. Closing a handle is local
//! to it. Destroying the database (by name) invalidates every handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{OwnedRwLockReadGuard, RwLock};
use tracing::{debug, instrument};

use crate::changes::feed::{ChangesFeed, ChangesOptions};
use crate::config::DatabaseConfig;
use crate::document;
use crate::error::Error;
use crate::metrics::LatencyTimer;
use crate::options::{BulkOptions, GetOptions};
use crate::revision::RevId;

use super::{registry, DatabaseInfo, DbCore, DocResult, WriteResult};

/// Handle to a named database.
///
/// Cheap to create; all heavy state lives in the shared core. Operations
/// on a closed handle fail with a 400, but the underlying database keeps
/// running for every other handle.
///
/// # Example
///
/// ```rust
/// use rev_store::Database;
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), rev_store::Error> {
/// let db = Database::open("handle-example")?;
///
/// let written = db.put(&json!({"_id": "greeting", "text": "hello"})).await?;
/// let doc = db.get("greeting").await?;
/// assert_eq!(doc["_rev"], json!(written.rev));
///
/// Database::destroy("handle-example").await?;
/// # Ok(())
/// # }
/// ```
pub struct Database {
    core: Arc<DbCore>,

    /// Close gate. Operations hold it for read across their whole run;
    /// `close()` takes it for write, so it cannot cut an operation short.
    gate: Arc<RwLock<()>>,

    /// Set before the gate is taken, so new operations stop queueing.
    closed: Arc<AtomicBool>,

    /// Continuous subscriptions registered through this handle, released
    /// on close.
    feeds: Arc<Mutex<Vec<u64>>>,
}

impl Database {
    // ═══════════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════════

    /// Open a handle with default configuration. Creates the database on
    /// first open of the name; later opens attach to the same state.
    pub fn open(name: &str) -> Result<Self, Error> {
        Self::open_with(name, DatabaseConfig::default())
    }

    /// Open a handle with explicit configuration.
    ///
    /// Configuration is fixed when the core is first created; an
    /// `open_with` against an already-open name attaches to the existing
    /// core and its original configuration.
    pub fn open_with(name: &str, config: DatabaseConfig) -> Result<Self, Error> {
        if name.is_empty() {
            return Err(Error::bad_request("database name is required"));
        }
        let core = registry::open_core(name, config);
        debug!(db = %name, instance_id = %core.instance_id, "handle opened");
        Ok(Self {
            core,
            gate: Arc::new(RwLock::new(())),
            closed: Arc::new(AtomicBool::new(false)),
            feeds: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Tear down the named database: waits for the in-flight write, ends
    /// every feed, drops all documents, and invalidates every open handle.
    /// Destroying a name that is not open is a no-op.
    ///
    /// A later [`Database::open`] of the same name starts from empty state
    /// with a fresh `instance_id`.
    pub async fn destroy(name: &str) -> Result<(), Error> {
        registry::destroy(name).await
    }

    /// Close this handle: wait for its in-flight operations, then release
    /// its feed subscriptions. Stored state is untouched and other handles
    /// keep working. Idempotent.
    #[instrument(skip(self), fields(db = %self.core.name))]
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _exclusive = self.gate.write().await;
        let subscriptions = std::mem::take(&mut *self.feeds.lock());
        for id in subscriptions {
            self.core.log.unsubscribe(id);
        }
        debug!("handle closed");
    }

    /// True once [`Database::close`] has begun on this handle.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Instance identifier of the underlying database. Stable across
    /// handles and across close/reopen; changes only on destroy.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.core.instance_id
    }

    /// Name this handle was opened under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Fails fast on a closed handle, otherwise pins the close gate open
    /// for the duration of the returned guard.
    async fn begin_op(&self) -> Result<OwnedRwLockReadGuard<()>, Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::bad_request("database is closed"));
        }
        Ok(self.gate.clone().read_owned().await)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Writes
    // ═══════════════════════════════════════════════════════════════════════════

    /// Create or update a document with an explicit `_id`.
    ///
    /// Updates must carry the current winning revision in `_rev`; a stale
    /// or fabricated revision fails with a conflict and changes nothing.
    ///
    /// # Example
    ///
    /// ```rust
    /// use rev_store::Database;
    /// use serde_json::json;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), rev_store::Error> {
    /// let db = Database::open("put-example")?;
    ///
    /// let v1 = db.put(&json!({"_id": "config", "retries": 3})).await?;
    /// let v2 = db
    ///     .put(&json!({"_id": "config", "_rev": v1.rev, "retries": 5}))
    ///     .await?;
    /// assert!(v2.rev.starts_with("2-"));
    ///
    /// Database::destroy("put-example").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self, doc), fields(db = %self.core.name))]
    pub async fn put(&self, doc: &Value) -> Result<WriteResult, Error> {
        let _op = self.begin_op().await?;
        let _timer = LatencyTimer::new("put");
        let results = self
            .core
            .apply_batch(std::slice::from_ref(doc), &BulkOptions::default(), true)
            .await?;
        single(results)
    }

    /// Create a document, generating an id when `_id` is absent.
    #[instrument(skip(self, doc), fields(db = %self.core.name))]
    pub async fn post(&self, doc: &Value) -> Result<WriteResult, Error> {
        let _op = self.begin_op().await?;
        let _timer = LatencyTimer::new("post");
        let results = self
            .core
            .apply_batch(std::slice::from_ref(doc), &BulkOptions::default(), false)
            .await?;
        single(results)
    }

    /// Delete a document. `doc` must carry `_id` and the current winning
    /// `_rev`; everything else in it is ignored. The deletion itself is a
    /// new revision, so the returned `rev` is the tombstone's.
    #[instrument(skip(self, doc), fields(db = %self.core.name))]
    pub async fn remove(&self, doc: &Value) -> Result<WriteResult, Error> {
        let _op = self.begin_op().await?;
        let _timer = LatencyTimer::new("remove");
        let (id, rev) = document::extract_id_rev(doc)?;
        self.apply_tombstone(&id, rev).await
    }

    /// Delete by id and revision, without a document payload.
    #[instrument(skip(self), fields(db = %self.core.name))]
    pub async fn remove_by(&self, id: &str, rev: &str) -> Result<WriteResult, Error> {
        let _op = self.begin_op().await?;
        let _timer = LatencyTimer::new("remove");
        let rev = RevId::parse(rev)?;
        self.apply_tombstone(id, rev).await
    }

    /// Shared deletion path; caller holds the close gate.
    async fn apply_tombstone(&self, id: &str, rev: RevId) -> Result<WriteResult, Error> {
        let tombstone = serde_json::json!({
            "_id": id,
            "_rev": rev.to_string(),
            "_deleted": true,
        });
        let results = self
            .core
            .apply_batch(std::slice::from_ref(&tombstone), &BulkOptions::default(), true)
            .await?;
        single(results)
    }

    /// Write a batch of documents, returning one result per input slot in
    /// input order. See [`BulkOptions`] for `new_edits` and failure-mode
    /// behavior.
    ///
    /// # Example
    ///
    /// ```rust
    /// use rev_store::{BulkOptions, Database};
    /// use serde_json::json;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), rev_store::Error> {
    /// let db = Database::open("bulk-example")?;
    ///
    /// let results = db
    ///     .bulk_docs(
    ///         &[json!({"_id": "a", "n": 1}), json!({"n": 2})],
    ///         &BulkOptions::default(),
    ///     )
    ///     .await?;
    /// assert!(results.iter().all(|slot| slot.is_ok()));
    ///
    /// Database::destroy("bulk-example").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self, docs, opts), fields(db = %self.core.name, count = docs.len()))]
    pub async fn bulk_docs(
        &self,
        docs: &[Value],
        opts: &BulkOptions,
    ) -> Result<Vec<DocResult>, Error> {
        let _op = self.begin_op().await?;
        let _timer = LatencyTimer::new("bulk_docs");
        self.core.apply_batch(docs, opts, false).await
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Reads
    // ═══════════════════════════════════════════════════════════════════════════

    /// Fetch the winning revision of a document.
    ///
    /// # Returns
    /// - the document with `_id` and `_rev` attached
    /// - `404 missing` for an unknown id
    /// - `404 deleted` when the winner is a tombstone
    #[instrument(skip(self), fields(db = %self.core.name))]
    pub async fn get(&self, id: &str) -> Result<Value, Error> {
        self.get_with(id, &GetOptions::default()).await
    }

    /// Fetch with options: an exact revision, revision history, or the
    /// list of conflicting leaf revisions.
    #[instrument(skip(self, opts), fields(db = %self.core.name))]
    pub async fn get_with(&self, id: &str, opts: &GetOptions) -> Result<Value, Error> {
        let _op = self.begin_op().await?;
        let _timer = LatencyTimer::new("get");
        self.core.get_doc(id, opts)
    }

    /// Database metadata: `doc_count`, `update_seq`, `instance_id`.
    #[instrument(skip(self), fields(db = %self.core.name))]
    pub async fn info(&self) -> Result<DatabaseInfo, Error> {
        let _op = self.begin_op().await?;
        self.core.info()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Changes
    // ═══════════════════════════════════════════════════════════════════════════

    /// Subscribe to the change feed.
    ///
    /// Backlog entries after `options.since` are queued onto the feed
    /// immediately; with `continuous` the feed then stays registered for
    /// live commits until cancelled, dropped, or the handle closes.
    ///
    /// # Example
    ///
    /// ```rust
    /// use rev_store::{ChangesOptions, Database};
    /// use serde_json::json;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), rev_store::Error> {
    /// let db = Database::open("changes-example")?;
    /// db.put(&json!({"_id": "a", "n": 1})).await?;
    ///
    /// let mut feed = db.changes(&ChangesOptions::default())?;
    /// let event = feed.next().await.expect("backlog entry");
    /// assert_eq!(event.seq, 1);
    /// assert_eq!(event.id, "a");
    ///
    /// Database::destroy("changes-example").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn changes(&self, options: &ChangesOptions) -> Result<ChangesFeed, Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::bad_request("database is closed"));
        }
        self.core.ensure_alive()?;
        let (rx, subscriber_id) =
            self.core
                .subscribe(options.since, options.continuous, options.include_docs);
        if let Some(id) = subscriber_id {
            self.feeds.lock().push(id);
        }
        crate::metrics::record_feed_opened(options.continuous);
        Ok(ChangesFeed::new(
            rx,
            subscriber_id.map(|id| (Arc::clone(&self.core.log), id)),
        ))
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.core.name)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Collapse a single-slot batch result into one write result.
fn single(mut results: Vec<DocResult>) -> Result<WriteResult, Error> {
    match results.pop() {
        Some(DocResult::Ok(result)) => Ok(result),
        Some(DocResult::Err { error, .. }) => Err(error),
        None => Err(Error::bad_request("empty batch")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_open_rejects_empty_name() {
        let err = Database::open("").unwrap_err();
        assert_eq!(err.reason(), "database name is required");
    }

    #[tokio::test]
    async fn test_two_handles_share_one_database() {
        let a = Database::open("api-shared").unwrap();
        let b = Database::open("api-shared").unwrap();
        assert_eq!(a.id(), b.id());

        a.put(&json!({"_id": "doc", "from": "a"})).await.unwrap();
        let doc = b.get("doc").await.unwrap();
        assert_eq!(doc["from"], json!("a"));
        assert_eq!(b.info().await.unwrap().doc_count, 1);

        Database::destroy("api-shared").await.unwrap();
    }

    #[tokio::test]
    async fn test_close_gates_this_handle_only() {
        let a = Database::open("api-close").unwrap();
        let b = Database::open("api-close").unwrap();
        a.put(&json!({"_id": "doc"})).await.unwrap();

        a.close().await;
        assert!(a.is_closed());
        let err = a.get("doc").await.unwrap_err();
        assert_eq!(err.reason(), "database is closed");
        let err = a.put(&json!({"_id": "other"})).await.unwrap_err();
        assert_eq!(err.reason(), "database is closed");
        assert!(a.changes(&ChangesOptions::default()).is_err());

        // Closing twice is fine, and the other handle is untouched.
        a.close().await;
        let doc = b.get("doc").await.unwrap();
        assert_eq!(doc["_id"], json!("doc"));

        Database::destroy("api-close").await.unwrap();
    }

    #[tokio::test]
    async fn test_close_releases_this_handles_feeds() {
        let a = Database::open("api-close-feeds").unwrap();
        let b = Database::open("api-close-feeds").unwrap();

        let mut feed_a = a
            .changes(&ChangesOptions::default().with_continuous())
            .unwrap();
        let mut feed_b = b
            .changes(&ChangesOptions::default().with_continuous())
            .unwrap();

        a.close().await;
        b.put(&json!({"_id": "after-close"})).await.unwrap();

        // The closed handle's feed ends without seeing the write; the
        // other handle's feed still gets it.
        assert!(feed_a.next().await.is_none());
        let event = feed_b.next().await.unwrap();
        assert_eq!(event.id, "after-close");

        Database::destroy("api-close-feeds").await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_by_rejects_malformed_rev() {
        let db = Database::open("api-bad-rev").unwrap();
        db.put(&json!({"_id": "doc"})).await.unwrap();

        let err = db.remove_by("doc", "not-a-rev").await.unwrap_err();
        assert_eq!(err.status(), 400);

        Database::destroy("api-bad-rev").await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_requires_id_and_rev_fields() {
        let db = Database::open("api-remove-fields").unwrap();

        let err = db.remove(&json!({"_rev": "1-aa"})).await.unwrap_err();
        assert_eq!(err, Error::MissingId);
        let err = db.remove(&json!({"_id": "doc"})).await.unwrap_err();
        assert_eq!(err.reason(), "_rev is required to remove a document");

        Database::destroy("api-remove-fields").await.unwrap();
    }

    #[tokio::test]
    async fn test_post_generates_distinct_ids() {
        let db = Database::open("api-post").unwrap();

        let first = db.post(&json!({"n": 1})).await.unwrap();
        let second = db.post(&json!({"n": 2})).await.unwrap();
        assert_ne!(first.id, second.id);
        assert!(!first.id.is_empty());
        assert_eq!(db.info().await.unwrap().doc_count, 2);

        Database::destroy("api-post").await.unwrap();
    }

    #[tokio::test]
    async fn test_put_without_id_is_missing_id() {
        let db = Database::open("api-put-noid").unwrap();
        let err = db.put(&json!({"n": 1})).await.unwrap_err();
        assert_eq!(err, Error::MissingId);
        Database::destroy("api-put-noid").await.unwrap();
    }

    #[tokio::test]
    async fn test_destroyed_handle_fails_not_found() {
        let db = Database::open("api-destroyed").unwrap();
        db.put(&json!({"_id": "doc"})).await.unwrap();
        Database::destroy("api-destroyed").await.unwrap();

        let err = db.get("doc").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.reason(), "database is destroyed");
        assert!(db.changes(&ChangesOptions::default()).is_err());

        // Reopening starts fresh with a new identity.
        let fresh = Database::open("api-destroyed").unwrap();
        assert_ne!(fresh.id(), db.id());
        assert!(fresh.get("doc").await.unwrap_err().is_not_found());
        assert_eq!(fresh.info().await.unwrap().update_seq, 0);

        Database::destroy("api-destroyed").await.unwrap();
    }
}
