// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Engine core: one [`DbCore`] per database name.
//!
//! All handles opened under the same name share a single core through the
//! [`registry`]. The core owns the document map (one revision tree per
//! document id), the change log, and the write serialization point:
//!
//! ```text
//! Database handle ──┐
//! Database handle ──┼──▶ DbCore ──▶ docs: DashMap<id, RevTree>
//! Database handle ──┘       │
//!                           └─────▶ log: ChangeLog ──▶ ChangesFeed, info()
//! ```
//!
//! Writes take the core-wide mutex, mutate one tree at a time, and append
//! to the change log in commit order. Reads never take the mutex; they go
//! straight to the document map and the log.
//!
//! A core survives its handle count reaching zero. Only [`registry::destroy`]
//! tears it down; after that every operation through a stale handle fails
//! with `not_found`.

mod api;
pub(crate) mod registry;
mod types;

pub use api::Database;
pub use types::{DatabaseInfo, DocResult, WriteResult};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::changes::feed::ChangeEvent;
use crate::changes::ChangeLog;
use crate::config::DatabaseConfig;
use crate::document::{self, ParsedDoc};
use crate::error::Error;
use crate::options::{BatchMode, BulkOptions, GetOptions};
use crate::revision::RevId;
use crate::revtree::{EditKind, EditOutcome, RevTree};

/// Shared engine state for a single database name.
pub(crate) struct DbCore {
    /// Database name, fixed at creation.
    pub(super) name: String,

    /// Fresh token per core; a destroy-and-reopen cycle produces a new one.
    pub(super) instance_id: String,

    /// Engine behavior knobs, fixed at creation.
    pub(super) config: DatabaseConfig,

    /// One revision tree per document id. Sharded map so reads stay
    /// lock-free with respect to the write mutex.
    pub(super) docs: DashMap<String, RevTree>,

    /// Commit history and feed fan-out. Source of truth for `update_seq`
    /// and `doc_count`.
    pub(super) log: Arc<ChangeLog>,

    /// Serializes every mutation of `docs` and the log.
    pub(super) write_lock: Mutex<()>,

    /// Set once by destroy; stale handles observe it on every call.
    pub(super) destroyed: AtomicBool,
}

/// One validated slot of a batch, ready to apply under the write lock.
struct PreparedEdit {
    id: String,
    kind: EditKind,
    body: Map<String, Value>,
    deleted: bool,
}

/// Winner snapshot captured while the tree guard is still held, so the
/// log append can run after the guard drops.
struct CommitSnapshot {
    winner_rev: RevId,
    winner_deleted: bool,
    winner_doc: Value,
}

impl DbCore {
    // ═══════════════════════════════════════════════════════════════════════════
    // Construction
    // ═══════════════════════════════════════════════════════════════════════════

    pub(crate) fn new(name: &str, config: DatabaseConfig) -> Self {
        let instance_id = crate::revision::random_token();
        debug!(db = %name, instance_id = %instance_id, "engine core created");
        Self {
            name: name.to_string(),
            instance_id,
            config,
            docs: DashMap::new(),
            log: Arc::new(ChangeLog::new()),
            write_lock: Mutex::new(()),
            destroyed: AtomicBool::new(false),
        }
    }

    fn ensure_alive(&self) -> Result<(), Error> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(Error::not_found("database is destroyed"));
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Write path
    // ═══════════════════════════════════════════════════════════════════════════

    /// Apply a batch of document edits.
    ///
    /// Every slot is validated up front; in [`BatchMode::Strict`] a single
    /// validation failure rejects the whole batch before anything is
    /// written. Conflicts and missing documents are always per-slot: they
    /// depend on tree state, not on the submitted payload alone.
    ///
    /// The write mutex is held across the full batch, so slots commit in
    /// order and their change-log sequences are contiguous.
    #[instrument(skip(self, docs, opts), fields(db = %self.name, count = docs.len()))]
    pub(crate) async fn apply_batch(
        &self,
        docs: &[Value],
        opts: &BulkOptions,
        require_id: bool,
    ) -> Result<Vec<DocResult>, Error> {
        self.ensure_alive()?;

        let prepared: Vec<Result<PreparedEdit, (Option<String>, Error)>> = docs
            .iter()
            .map(|raw| prepare_edit(raw, opts.new_edits, require_id))
            .collect();

        if opts.mode == BatchMode::Strict {
            let fatal = prepared
                .iter()
                .filter_map(|slot| slot.as_ref().err())
                .find(|(_, error)| error.is_validation());
            if let Some((_, error)) = fatal {
                return Err(error.clone());
            }
        }

        let _guard = self.write_lock.lock().await;
        // A destroy may have slotted in while we waited for the lock.
        self.ensure_alive()?;

        let mut results = Vec::with_capacity(prepared.len());
        for slot in prepared {
            match slot {
                Ok(edit) => results.push(self.apply_one(edit)),
                Err((id, error)) => {
                    crate::metrics::record_write_rejected(error.name());
                    results.push(DocResult::failure(id, error));
                }
            }
        }
        crate::metrics::set_doc_count(&self.name, self.log.doc_count());
        Ok(results)
    }

    /// Apply one prepared edit and, if it changed the tree, append the new
    /// winner state to the change log.
    ///
    /// Lock order: the tree shard guard is released before `log.append`
    /// runs. The log's subscribe path reads the document map under the log
    /// lock, so holding both here would invert that order.
    fn apply_one(&self, edit: PreparedEdit) -> DocResult {
        let PreparedEdit { id, kind, body, deleted } = edit;

        let applied = match self.docs.entry(id.clone()) {
            Entry::Occupied(mut occupied) => {
                let result = occupied
                    .get_mut()
                    .apply_edit(kind, body, deleted, &self.config);
                result.map(|outcome| (snapshot_winner(&id, occupied.get(), &outcome), outcome))
            }
            Entry::Vacant(vacant) => {
                let mut tree = RevTree::new();
                match tree.apply_edit(kind, body, deleted, &self.config) {
                    Ok(outcome) => {
                        let snapshot = snapshot_winner(&id, &tree, &outcome);
                        // Only a successful first edit materializes the tree.
                        vacant.insert(tree);
                        Ok((snapshot, outcome))
                    }
                    Err(error) => Err(error),
                }
            }
        };

        match applied {
            Ok((snapshot, outcome)) => {
                if let Some(snap) = snapshot {
                    let seq = self.log.append(
                        &id,
                        &snap.winner_rev,
                        snap.winner_deleted,
                        &snap.winner_doc,
                    );
                    crate::metrics::record_write_committed(deleted);
                    debug!(id = %id, rev = %outcome.rev(), seq, "edit committed");
                }
                DocResult::Ok(WriteResult { id, rev: outcome.rev().to_string() })
            }
            Err(error) => {
                crate::metrics::record_write_rejected(error.name());
                DocResult::failure(Some(id), error)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Read path
    // ═══════════════════════════════════════════════════════════════════════════

    /// Fetch a document: the winner by default, or the exact revision named
    /// in `opts.rev`. Tombstones read back as `{_id, _rev, _deleted: true}`.
    pub(crate) fn get_doc(&self, id: &str, opts: &GetOptions) -> Result<Value, Error> {
        self.ensure_alive()?;

        let requested = match opts.rev.as_deref() {
            Some(text) => Some(RevId::parse(text)?),
            None => None,
        };

        let tree = self
            .docs
            .get(id)
            .ok_or_else(|| Error::not_found("missing"))?;
        let (rev, node) = tree.get(requested.as_ref())?;
        let mut doc = render_revision(id, rev, node.deleted, node.body.as_ref());

        if opts.revs_info {
            let history: Vec<Value> = tree
                .revs_info(rev)
                .iter()
                .map(|info| {
                    serde_json::json!({
                        "rev": info.rev.to_string(),
                        "status": info.status.as_str(),
                    })
                })
                .collect();
            if let Some(fields) = doc.as_object_mut() {
                fields.insert("_revs_info".to_string(), Value::Array(history));
            }
        }

        if opts.conflicts {
            let conflicts = tree.conflicts(rev);
            if !conflicts.is_empty() {
                let revs: Vec<Value> = conflicts
                    .iter()
                    .map(|r| Value::String(r.to_string()))
                    .collect();
                if let Some(fields) = doc.as_object_mut() {
                    fields.insert("_conflicts".to_string(), Value::Array(revs));
                }
            }
        }

        Ok(doc)
    }

    /// Current winning payload for a document, if it exists. Used by the
    /// change log's `include_docs` lookup, so it must not block.
    pub(crate) fn winner_doc(&self, id: &str) -> Option<Value> {
        let tree = self.docs.get(id)?;
        let (rev, node) = tree.winner()?;
        Some(render_revision(id, rev, node.deleted, node.body.as_ref()))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Changes & info
    // ═══════════════════════════════════════════════════════════════════════════

    /// Register a change subscription. Backlog snapshot and live
    /// registration happen atomically inside the log, so no commit is
    /// missed or duplicated across the boundary.
    pub(crate) fn subscribe(
        &self,
        since: u64,
        continuous: bool,
        include_docs: bool,
    ) -> (
        tokio::sync::mpsc::UnboundedReceiver<ChangeEvent>,
        Option<u64>,
    ) {
        self.log
            .subscribe(since, continuous, include_docs, |id| self.winner_doc(id))
    }

    pub(crate) fn info(&self) -> Result<DatabaseInfo, Error> {
        self.ensure_alive()?;
        Ok(DatabaseInfo {
            db_name: self.name.clone(),
            doc_count: self.log.doc_count(),
            update_seq: self.log.update_seq(),
            instance_id: self.instance_id.clone(),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Teardown
    // ═══════════════════════════════════════════════════════════════════════════

    /// Mark the core destroyed and drop its state. Waits for any in-flight
    /// batch by taking the write mutex, then ends every live feed.
    #[instrument(skip(self), fields(db = %self.name))]
    pub(crate) async fn destroy(&self) {
        let _guard = self.write_lock.lock().await;
        self.destroyed.store(true, Ordering::SeqCst);
        self.docs.clear();
        self.log.close_all_subscribers();
        info!("database destroyed");
    }
}

/// Validate one raw payload into an edit, without touching any tree.
///
/// Errors carry the document id when it was recoverable, so a batch
/// result row can still name the document that failed.
fn prepare_edit(
    raw: &Value,
    new_edits: bool,
    require_id: bool,
) -> Result<PreparedEdit, (Option<String>, Error)> {
    let ParsedDoc { id, rev, deleted, body } =
        document::parse_document(raw, require_id).map_err(|error| (None, error))?;

    if new_edits {
        let id = match id {
            Some(id) => id,
            None => document::generate_doc_id(),
        };
        return Ok(PreparedEdit {
            id,
            kind: EditKind::Checked { expected_parent: rev },
            body,
            deleted,
        });
    }

    // Replication form: the payload dictates its own revision, so both
    // identifiers are mandatory.
    let id = match id {
        Some(id) => id,
        None => return Err((None, Error::MissingId)),
    };
    let rev = match rev {
        Some(rev) => rev,
        None => {
            return Err((
                Some(id),
                Error::bad_request("_rev is required when new_edits is false"),
            ))
        }
    };
    Ok(PreparedEdit {
        id,
        kind: EditKind::AsGiven { rev, parent: None },
        body,
        deleted,
    })
}

/// Render one stored revision as a wire document.
fn render_revision(id: &str, rev: &RevId, deleted: bool, body: Option<&Map<String, Value>>) -> Value {
    if deleted {
        return document::tombstone(id, rev);
    }
    match body {
        Some(body) => document::assemble(id, rev, body),
        // Placeholders are never winners and never returned by exact-rev
        // lookups, but render an empty body rather than panic.
        None => document::assemble(id, rev, &Map::new()),
    }
}

/// Capture the post-edit winner while the tree guard is held. `None` when
/// the edit was a duplicate and nothing was committed.
fn snapshot_winner(id: &str, tree: &RevTree, outcome: &EditOutcome) -> Option<CommitSnapshot> {
    if !outcome.is_applied() {
        return None;
    }
    let (rev, node) = tree.winner()?;
    Some(CommitSnapshot {
        winner_rev: rev.clone(),
        winner_deleted: node.deleted,
        winner_doc: render_revision(id, rev, node.deleted, node.body.as_ref()),
    })
}
