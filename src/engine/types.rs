//! Result and metadata types returned by database operations.

use serde::Serialize;

use crate::error::Error;

/// Identity of a successful write: the document id and the revision the
/// edit resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteResult {
    pub id: String,
    pub rev: String,
}

/// Per-slot outcome of a bulk write, in input order.
#[derive(Debug, Clone)]
pub enum DocResult {
    /// The slot's edit was applied (or was an idempotent replay).
    Ok(WriteResult),
    /// The slot failed; `id` is attached when it was parseable.
    Err {
        id: Option<String>,
        error: Error,
    },
}

impl DocResult {
    pub(crate) fn failure(id: Option<String>, error: Error) -> Self {
        DocResult::Err { id, error }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, DocResult::Ok(_))
    }

    /// The success payload, if any.
    #[must_use]
    pub fn ok(&self) -> Option<&WriteResult> {
        match self {
            DocResult::Ok(result) => Some(result),
            DocResult::Err { .. } => None,
        }
    }

    /// The failure, if any.
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        match self {
            DocResult::Ok(_) => None,
            DocResult::Err { error, .. } => Some(error),
        }
    }

    /// Document id this slot refers to, when known.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            DocResult::Ok(result) => Some(&result.id),
            DocResult::Err { id, .. } => id.as_deref(),
        }
    }
}

/// Metadata snapshot from [`crate::Database::info`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseInfo {
    /// Name the database was opened under.
    pub db_name: String,
    /// Ids whose winning revision is not deleted.
    pub doc_count: u64,
    /// Highest assigned sequence number (0 when never written).
    pub update_seq: u64,
    /// Stable identifier of the underlying engine instance.
    pub instance_id: String,
}
