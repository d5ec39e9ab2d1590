//! Error taxonomy for the document store.
//!
//! Every fallible operation returns [`Error`]. Each variant maps onto the
//! wire-level triple `{status, error, reason}` via [`Error::status`],
//! [`Error::name`] and [`Error::reason`], so a transport layer can render
//! failures without matching on variants.
//!
//! # Example
//!
//! ```
//! use rev_store::Error;
//!
//! let err = Error::Conflict;
//! assert_eq!(err.status(), 409);
//! assert_eq!(err.name(), "conflict");
//! assert_eq!(err.reason(), "Document update conflict");
//! ```

use serde::Serialize;
use thiserror::Error;

/// Failure modes surfaced by the engine. Nothing here is retried
/// internally; callers decide whether a retry makes sense.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The submitted document value is not a JSON object.
    #[error("Document must be a JSON object")]
    NotAnObject,

    /// A `put` or `remove` was submitted without an `_id`.
    #[error("_id is required for puts")]
    MissingId,

    /// `_id` is present but not a non-empty string.
    #[error("_id field must contain a string")]
    InvalidId,

    /// `_id` starts with an underscore.
    #[error("Only reserved document ids may start with underscore.")]
    ReservedId,

    /// Malformed request outside the dedicated cases above
    /// (bad `_rev` syntax, missing `_rev` on remove, closed handle, ...).
    #[error("{reason}")]
    BadRequest {
        /// Human-readable description of what was wrong.
        reason: String,
    },

    /// Unknown document id, a deleted winning revision read without an
    /// explicit revision, or any operation against a destroyed database.
    #[error("{reason}")]
    NotFound {
        /// `"missing"`, `"deleted"` or `"database is destroyed"`.
        reason: String,
    },

    /// Supplied parent revision does not match the current winner.
    #[error("Document update conflict")]
    Conflict,

    /// A reserved underscore field outside the allow-listed set was present.
    #[error("Bad special document member: {field}")]
    DocValidation {
        /// The offending field name, e.g. `_zing`.
        field: String,
    },
}

impl Error {
    /// Shorthand for a [`Error::NotFound`] with the given reason.
    pub fn not_found(reason: impl Into<String>) -> Self {
        Error::NotFound { reason: reason.into() }
    }

    /// Shorthand for a [`Error::BadRequest`] with the given reason.
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Error::BadRequest { reason: reason.into() }
    }

    /// HTTP-style status code for this failure.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Error::NotAnObject
            | Error::MissingId
            | Error::InvalidId
            | Error::ReservedId
            | Error::BadRequest { .. } => 400,
            Error::NotFound { .. } => 404,
            Error::Conflict => 409,
            Error::DocValidation { .. } => 500,
        }
    }

    /// Short machine-readable error code.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Error::MissingId => "missing_id",
            Error::NotAnObject
            | Error::InvalidId
            | Error::ReservedId
            | Error::BadRequest { .. } => "bad_request",
            Error::NotFound { .. } => "not_found",
            Error::Conflict => "conflict",
            Error::DocValidation { .. } => "doc_validation",
        }
    }

    /// Human-readable reason (the `Display` rendering).
    #[must_use]
    pub fn reason(&self) -> String {
        self.to_string()
    }

    /// True for failures a caller resolves by re-reading and resubmitting.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict)
    }

    /// True for missing-document class failures.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// True when the document itself (not the engine state) was at fault,
    /// i.e. the write was rejected before touching any revision tree.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        !matches!(self, Error::Conflict | Error::NotFound { .. })
    }

    /// Wire-level payload for this failure.
    #[must_use]
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            status: self.status(),
            error: self.name(),
            reason: self.reason(),
        }
    }
}

/// Serializable `{status, error, reason}` triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    /// HTTP-style status code.
    pub status: u16,
    /// Short machine-readable code, e.g. `"conflict"`.
    pub error: &'static str,
    /// Human-readable explanation.
    pub reason: String,
}
