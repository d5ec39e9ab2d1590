//! Caller-facing option structs for reads and bulk writes.
//!
//! # Example
//!
//! ```rust
//! use rev_store::{BulkOptions, BatchMode, GetOptions};
//!
//! // Default bulk write: per-document independence, normal edits
//! let opts = BulkOptions::default();
//! assert!(opts.new_edits);
//! assert_eq!(opts.mode, BatchMode::Independent);
//!
//! // Replication-style insert of pre-assigned revisions
//! let opts = BulkOptions::default().with_new_edits(false);
//!
//! // Read with history attached
//! let opts = GetOptions::default().with_revs_info();
//! ```

/// Failure-scoping mode for a bulk write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchMode {
    /// Each document succeeds or fails on its own; one slot's validation
    /// failure never blocks another slot's write.
    #[default]
    Independent,
    /// Validation is all-or-nothing: if any document fails validation the
    /// whole call errors and nothing is applied. Conflicts and missing
    /// documents are still reported per slot.
    Strict,
}

/// Options for [`crate::Database::bulk_docs`].
#[derive(Debug, Clone)]
pub struct BulkOptions {
    /// `true` (default): documents are ordinary optimistic edits. `false`:
    /// each document carries its own `_rev` and is inserted exactly as
    /// given, possibly opening a conflict branch.
    pub new_edits: bool,
    /// Failure scoping; see [`BatchMode`].
    pub mode: BatchMode,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self { new_edits: true, mode: BatchMode::Independent }
    }
}

impl BulkOptions {
    #[must_use]
    pub fn with_new_edits(mut self, new_edits: bool) -> Self {
        self.new_edits = new_edits;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: BatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Shorthand for the all-or-nothing validation mode.
    #[must_use]
    pub fn strict(self) -> Self {
        self.with_mode(BatchMode::Strict)
    }
}

/// Options for [`crate::Database::get_with`].
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Fetch this exact revision instead of the winner. Explicit reads of a
    /// tombstone succeed and return the stub.
    pub rev: Option<String>,
    /// Attach `_revs_info`: the ancestry of the returned revision, newest
    /// first, with per-revision availability status.
    pub revs_info: bool,
    /// Attach `_conflicts`: live leaves that lost the winner election.
    /// Only present when at least one conflict exists.
    pub conflicts: bool,
}

impl GetOptions {
    #[must_use]
    pub fn with_rev(mut self, rev: impl Into<String>) -> Self {
        self.rev = Some(rev.into());
        self
    }

    #[must_use]
    pub fn with_revs_info(mut self) -> Self {
        self.revs_info = true;
        self
    }

    #[must_use]
    pub fn with_conflicts(mut self) -> Self {
        self.conflicts = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_defaults() {
        let opts = BulkOptions::default();
        assert!(opts.new_edits);
        assert_eq!(opts.mode, BatchMode::Independent);
    }

    #[test]
    fn test_bulk_builders() {
        let opts = BulkOptions::default().with_new_edits(false).strict();
        assert!(!opts.new_edits);
        assert_eq!(opts.mode, BatchMode::Strict);
    }

    #[test]
    fn test_get_defaults() {
        let opts = GetOptions::default();
        assert!(opts.rev.is_none());
        assert!(!opts.revs_info);
        assert!(!opts.conflicts);
    }

    #[test]
    fn test_get_builders() {
        let opts = GetOptions::default()
            .with_rev("2-abc")
            .with_revs_info()
            .with_conflicts();
        assert_eq!(opts.rev.as_deref(), Some("2-abc"));
        assert!(opts.revs_info);
        assert!(opts.conflicts);
    }
}
