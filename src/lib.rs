//! # Rev Store
//!
//! An embeddable document store with CouchDB-style MVCC semantics.
//!
//! ## Architecture
//!
//! Every document carries a branching revision history. Edits must name
//! the revision they descend from, conflicting edits are detected rather
//! than silently overwritten, and deletions are tombstoned rather than
//! erased. A write flows through five stages:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Database Handle                        │
//! │  • put / post / remove / bulk_docs entry points            │
//! │  • close gate: in-flight ops finish before close           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Validator + Coordinator                    │
//! │  • reserved-field allow-list, id and rev checks            │
//! │  • per-slot or strict batch failure modes                  │
//! │  • one write mutex: batches commit one at a time           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Revision Trees (per document)                │
//! │  • arena of (generation, digest) nodes with parent links   │
//! │  • deterministic winner over all leaves                    │
//! │  • depth-limited history (revs_limit stemming)             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Change Log + Change Feeds                   │
//! │  • append-only, gapless sequence numbers                   │
//! │  • source of truth for update_seq and doc_count            │
//! │  • gapless live subscriptions, synchronous cancel          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All handles opened under one name share a single engine instance, so
//! two handles always agree on document state, sequence numbers and
//! counts. The instance survives its last handle closing; only
//! [`Database::destroy`] tears it down.
//!
//! ## Quick Start
//!
//! ```rust
//! use rev_store::{ChangesOptions, Database};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), rev_store::Error> {
//!     let db = Database::open("quickstart")?;
//!
//!     // Create, then update against the returned revision.
//!     let v1 = db.put(&json!({"_id": "note", "text": "draft"})).await?;
//!     let v2 = db
//!         .put(&json!({"_id": "note", "_rev": v1.rev, "text": "final"}))
//!         .await?;
//!
//!     let doc = db.get("note").await?;
//!     assert_eq!(doc["text"], json!("final"));
//!     assert_eq!(doc["_rev"], json!(v2.rev.clone()));
//!
//!     // Deletion is one more revision; the tombstone stays readable.
//!     let gone = db.remove(&doc).await?;
//!     assert!(db.get("note").await.is_err());
//!
//!     // Every commit is on the change feed, in order.
//!     let mut feed = db.changes(&ChangesOptions::default())?;
//!     let mut seqs = Vec::new();
//!     while let Some(event) = feed.next().await {
//!         seqs.push(event.seq);
//!     }
//!     assert_eq!(seqs, vec![1, 2, 3]);
//!     assert!(gone.rev.starts_with("3-"));
//!
//!     Database::destroy("quickstart").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Optimistic concurrency**: stale writers get a conflict, never a
//!   silent overwrite
//! - **Branching histories**: replication-style writes (`new_edits:
//!   false`) can introduce parallel branches; the winner is
//!   deterministic and order-independent
//! - **Tombstoned deletes**: removed documents keep their history and
//!   can be resurrected by a fresh edit
//! - **Ordered change feeds**: resumable from any sequence, live or
//!   backlog-only, cancellable mid-stream
//! - **Shared handles**: any number of handles per database name, one
//!   shared state
//!
//! ## Configuration
//!
//! See [`DatabaseConfig`] for revision-depth and digest options.
//!
//! ## Modules
//!
//! - [`engine`]: the [`Database`] handle, shared core and registry
//! - [`revtree`]: per-document revision arenas and winner resolution
//! - [`changes`]: the change log and [`ChangesFeed`] subscriptions
//! - [`document`]: boundary validation of raw JSON documents
//! - [`revision`]: `generation-digest` revision identifiers
//! - [`error`]: the error taxonomy and wire payload shape
//! - [`metrics`]: instrumentation hooks (recorder chosen by the host)

pub mod changes;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod options;
pub mod revision;
pub mod revtree;

// Re-export the public API at the crate root.
pub use changes::feed::{ChangeEvent, ChangesFeed, ChangesOptions};
pub use config::DatabaseConfig;
pub use engine::{Database, DatabaseInfo, DocResult, WriteResult};
pub use error::{Error, ErrorBody};
pub use metrics::LatencyTimer;
pub use options::{BatchMode, BulkOptions, GetOptions};
pub use revision::RevId;
pub use revtree::history::RevInfo;
pub use revtree::{EditKind, EditOutcome, RevNode, RevTree, RevisionStatus};
