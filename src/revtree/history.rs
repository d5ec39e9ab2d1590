// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Revision history inspection.
//!
//! `revs_info` walks a revision's ancestry newest-first and reports a
//! per-revision availability status; `conflicts` lists the live leaves that
//! lost the winner election. Both are read-only views over the arena.

use super::{RevTree, RevisionStatus};
use crate::revision::RevId;

/// Summary of one revision in an ancestry walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevInfo {
    /// The revision id.
    pub rev: RevId,
    /// Whether the revision's body is readable.
    pub status: RevisionStatus,
}

impl RevTree {
    /// Ancestry of `from`, newest first. Empty when `from` is not stored.
    ///
    /// Generations strictly decrease along parent links, so the walk always
    /// terminates; stemmed-away ancestry simply ends the chain.
    #[must_use]
    pub fn revs_info(&self, from: &RevId) -> Vec<RevInfo> {
        let mut out = Vec::new();
        let mut current = Some(from.clone());
        while let Some(rev) = current {
            let Some(node) = self.node(&rev) else { break };
            let status = if node.body.is_none() {
                RevisionStatus::Missing
            } else if node.deleted {
                RevisionStatus::Deleted
            } else {
                RevisionStatus::Available
            };
            current = node.parent.clone();
            out.push(RevInfo { rev, status });
        }
        out
    }

    /// Live leaves other than `winner`, highest first.
    #[must_use]
    pub fn conflicts(&self, winner: &RevId) -> Vec<RevId> {
        let mut losers: Vec<RevId> = self
            .leaves()
            .into_iter()
            .filter(|rev| rev != winner)
            .filter(|rev| {
                self.node(rev)
                    .is_some_and(|n| !n.deleted && n.body.is_some())
            })
            .collect();
        losers.sort_by(|a, b| b.cmp(a));
        losers
    }
}
