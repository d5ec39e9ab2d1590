// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-document revision trees.
//!
//! Each document owns an arena of revisions keyed by [`RevId`]; a revision
//! stores its parent *key* (never a live reference), so branches, merges of
//! replicated history and stemming are all plain map operations. The winning
//! revision is a pure function of the arena: the greatest `(generation,
//! digest)` among the leaves. That makes winner selection deterministic and
//! independent of the order edits arrived in.
//!
//! Two edit modes exist. `Checked` is the optimistic-concurrency path used
//! by ordinary writes: the supplied parent must equal the current winner.
//! `AsGiven` is the replication-style path: the revision is inserted exactly
//! as stated, may open a new branch, and is never conflict-checked.

pub mod history;

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::config::DatabaseConfig;
use crate::error::Error;
use crate::revision::{new_digest, RevId};

/// One stored revision.
#[derive(Debug, Clone)]
pub struct RevNode {
    /// Parent revision key; `None` for roots (generation-1 revisions and
    /// as-given inserts with unknown ancestry).
    pub parent: Option<RevId>,
    /// Tombstone flag.
    pub deleted: bool,
    /// Stored body. `None` marks a placeholder ancestor referenced by an
    /// as-given edit but never itself written; reads treat it as missing.
    pub body: Option<Map<String, Value>>,
}

/// How an edit positions itself in the tree.
#[derive(Debug, Clone)]
pub enum EditKind {
    /// Optimistic write: `expected_parent` must match the current winner
    /// (`None` when creating, or when re-creating a deleted document).
    Checked {
        /// The revision the caller believes is current.
        expected_parent: Option<RevId>,
    },
    /// Insert `rev` exactly as stated, optionally under `parent`. No
    /// conflict check; used for replicated edits, never by put/post/remove.
    AsGiven {
        /// The revision id to insert.
        rev: RevId,
        /// Known parent, if the caller has ancestry information.
        parent: Option<RevId>,
    },
}

/// Availability of a revision within a history walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionStatus {
    /// Body stored and readable.
    Available,
    /// Tombstone.
    Deleted,
    /// Referenced by ancestry but never stored, or stemmed away.
    Missing,
}

impl RevisionStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RevisionStatus::Available => "available",
            RevisionStatus::Deleted => "deleted",
            RevisionStatus::Missing => "missing",
        }
    }
}

/// Result of a successful [`RevTree::apply_edit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// A new revision was stored.
    Applied(RevId),
    /// The revision already existed; nothing changed.
    Noop(RevId),
}

impl EditOutcome {
    /// The revision this edit resolved to, applied or not.
    #[must_use]
    pub fn rev(&self) -> &RevId {
        match self {
            EditOutcome::Applied(rev) | EditOutcome::Noop(rev) => rev,
        }
    }

    /// True when the tree was actually mutated.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, EditOutcome::Applied(_))
    }
}

/// Revision arena for a single document.
#[derive(Debug, Default)]
pub struct RevTree {
    nodes: HashMap<RevId, RevNode>,
    /// Cached winner; kept in sync by every mutation.
    winner: Option<RevId>,
}

impl RevTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored revisions (placeholders included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn contains(&self, rev: &RevId) -> bool {
        self.nodes.contains_key(rev)
    }

    /// Current winning revision and its node, if any revision exists.
    #[must_use]
    pub fn winner(&self) -> Option<(&RevId, &RevNode)> {
        let rev = self.winner.as_ref()?;
        let node = self.nodes.get(rev)?;
        Some((rev, node))
    }

    /// All leaf revisions (no revision names them as parent), ascending.
    #[must_use]
    pub fn leaves(&self) -> Vec<RevId> {
        let parents: HashSet<&RevId> =
            self.nodes.values().filter_map(|n| n.parent.as_ref()).collect();
        let mut leaves: Vec<RevId> = self
            .nodes
            .keys()
            .filter(|rev| !parents.contains(*rev))
            .cloned()
            .collect();
        leaves.sort();
        leaves
    }

    /// Apply one edit. Tombstone bodies are reduced to empty here, so the
    /// stored form of a deleted revision never carries caller fields.
    pub fn apply_edit(
        &mut self,
        kind: EditKind,
        body: Map<String, Value>,
        deleted: bool,
        config: &DatabaseConfig,
    ) -> Result<EditOutcome, Error> {
        let stored_body = if deleted { Map::new() } else { body };

        let outcome = match kind {
            EditKind::Checked { expected_parent } => {
                self.apply_checked(expected_parent, stored_body, deleted, config)?
            }
            EditKind::AsGiven { rev, parent } => {
                self.apply_as_given(rev, parent, stored_body, deleted)?
            }
        };

        if outcome.is_applied() {
            self.refresh_winner();
            self.stem(config.revs_limit);
        }
        Ok(outcome)
    }

    fn apply_checked(
        &mut self,
        expected_parent: Option<RevId>,
        body: Map<String, Value>,
        deleted: bool,
        config: &DatabaseConfig,
    ) -> Result<EditOutcome, Error> {
        let current = self.winner().map(|(rev, node)| (rev.clone(), node.deleted));

        let parent = match (current, expected_parent) {
            // First revision of a new document.
            (None, None) => None,
            // A stated parent on a document that has no tree is a fabricated
            // revision, which reads as a conflict, not a missing document.
            (None, Some(_)) => return Err(Error::Conflict),
            (Some((winner, winner_deleted)), None) => {
                if winner_deleted && !deleted {
                    // Re-create after delete: the new revision descends from
                    // the tombstone so history stays connected.
                    Some(winner)
                } else {
                    return Err(Error::Conflict);
                }
            }
            (Some((winner, winner_deleted)), Some(expected)) => {
                if expected != winner {
                    return Err(Error::Conflict);
                }
                if deleted && winner_deleted {
                    return Err(Error::not_found("deleted"));
                }
                Some(winner)
            }
        };

        let generation = parent.as_ref().map_or(1, |p| p.generation() + 1);
        let digest = new_digest(parent.as_ref(), deleted, &body, config.deterministic_revs);
        let rev = RevId::from_parts(generation, digest);

        if self.nodes.contains_key(&rev) {
            // Deterministic digests make identical edits collide here;
            // treat the replay as already done.
            return Ok(EditOutcome::Noop(rev));
        }

        self.nodes.insert(
            rev.clone(),
            RevNode { parent, deleted, body: Some(body) },
        );
        Ok(EditOutcome::Applied(rev))
    }

    fn apply_as_given(
        &mut self,
        rev: RevId,
        parent: Option<RevId>,
        body: Map<String, Value>,
        deleted: bool,
    ) -> Result<EditOutcome, Error> {
        if let Some(p) = &parent {
            if p.generation() + 1 != rev.generation() {
                return Err(Error::bad_request(
                    "revision generation does not follow its parent",
                ));
            }
        }

        match self.nodes.get_mut(&rev) {
            Some(node) if node.body.is_some() => Ok(EditOutcome::Noop(rev)),
            Some(node) => {
                // Fill a placeholder left behind by an earlier descendant.
                node.deleted = deleted;
                node.body = Some(body);
                Ok(EditOutcome::Applied(rev))
            }
            None => {
                if let Some(p) = parent.clone() {
                    self.nodes.entry(p).or_insert(RevNode {
                        parent: None,
                        deleted: false,
                        body: None,
                    });
                }
                self.nodes.insert(
                    rev.clone(),
                    RevNode { parent, deleted, body: Some(body) },
                );
                Ok(EditOutcome::Applied(rev))
            }
        }
    }

    /// Fetch a revision: the stated one, or the winner when `rev` is `None`.
    ///
    /// Winner reads fail with `not_found("deleted")` when the winner is a
    /// tombstone; explicit reads of a tombstone succeed (callers render the
    /// stub). Placeholders always read as missing.
    pub fn get(&self, rev: Option<&RevId>) -> Result<(&RevId, &RevNode), Error> {
        match rev {
            Some(requested) => {
                let (key, node) = self
                    .nodes
                    .get_key_value(requested)
                    .ok_or_else(|| Error::not_found("missing"))?;
                if node.body.is_none() {
                    return Err(Error::not_found("missing"));
                }
                Ok((key, node))
            }
            None => {
                let (rev, node) = self.winner().ok_or_else(|| Error::not_found("missing"))?;
                if node.deleted {
                    return Err(Error::not_found("deleted"));
                }
                Ok((rev, node))
            }
        }
    }

    fn refresh_winner(&mut self) {
        let parents: HashSet<&RevId> =
            self.nodes.values().filter_map(|n| n.parent.as_ref()).collect();
        self.winner = self
            .nodes
            .keys()
            .filter(|rev| !parents.contains(*rev))
            .max()
            .cloned();
    }

    /// Drop revisions deeper than `limit` below every leaf. Children of a
    /// dropped revision become roots. The winner is unaffected (leaves are
    /// always kept).
    fn stem(&mut self, limit: usize) {
        if limit == 0 || self.nodes.len() <= limit {
            return;
        }
        let mut keep: HashSet<RevId> = HashSet::with_capacity(self.nodes.len());
        for leaf in self.leaves() {
            let mut current = Some(leaf);
            let mut depth = 0;
            while let Some(rev) = current {
                if depth == limit {
                    break;
                }
                depth += 1;
                current = self.nodes.get(&rev).and_then(|n| n.parent.clone());
                keep.insert(rev);
            }
        }
        if keep.len() == self.nodes.len() {
            return;
        }
        self.nodes.retain(|rev, _| keep.contains(rev));
        for node in self.nodes.values_mut() {
            if node.parent.as_ref().is_some_and(|p| !keep.contains(p)) {
                node.parent = None;
            }
        }
    }

    pub(crate) fn node(&self, rev: &RevId) -> Option<&RevNode> {
        self.nodes.get(rev)
    }
}
