//! Revision identifiers.
//!
//! A revision id is a `(generation, digest)` pair rendered as
//! `"<generation>-<digest>"`, e.g. `"3-9f72a1c4…"`. Generation numbers start
//! at 1; the digest is an opaque lowercase-hex token. Ordering is generation
//! first, then lexicographic digest, which is exactly the tie-break the
//! winning-revision rule needs.
//!
//! # Example
//!
//! ```
//! use rev_store::RevId;
//!
//! let rev: RevId = "2-beef".parse().unwrap();
//! assert_eq!(rev.generation(), 2);
//! assert_eq!(rev.digest(), "beef");
//! assert_eq!(rev.to_string(), "2-beef");
//!
//! let older: RevId = "1-ffff".parse().unwrap();
//! assert!(rev > older); // generation dominates digest
//! ```

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::Error;

/// Identifier of a single revision within a document's tree.
///
/// Field order matters: the derived `Ord` compares generation before digest,
/// giving the deterministic winner ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RevId {
    generation: u64,
    digest: String,
}

impl RevId {
    /// Build a revision id from parts. Generation 0 is rejected.
    pub fn new(generation: u64, digest: impl Into<String>) -> Result<Self, Error> {
        let digest = digest.into();
        if generation == 0 || digest.is_empty() {
            return Err(Error::bad_request("Invalid rev format"));
        }
        Ok(Self { generation, digest })
    }

    /// Internal infallible constructor; both parts come from the engine.
    pub(crate) fn from_parts(generation: u64, digest: String) -> Self {
        debug_assert!(generation >= 1 && !digest.is_empty());
        Self { generation, digest }
    }

    /// Parse a `"<generation>-<digest>"` string.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let (gen_part, digest) = s
            .split_once('-')
            .ok_or_else(|| Error::bad_request("Invalid rev format"))?;
        let generation: u64 = gen_part
            .parse()
            .map_err(|_| Error::bad_request("Invalid rev format"))?;
        Self::new(generation, digest)
    }

    /// Generation number (always >= 1).
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Digest token.
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl fmt::Display for RevId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.generation, self.digest)
    }
}

impl FromStr for RevId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Compute the digest for a new revision.
///
/// Deterministic mode hashes the parent revision id, the deleted marker and
/// the canonical JSON of the body (serde_json maps are key-sorted, so field
/// insertion order does not affect the digest). Identical logical edits thus
/// produce identical revision ids, which makes replays idempotent.
#[must_use]
pub(crate) fn new_digest(
    parent: Option<&RevId>,
    deleted: bool,
    body: &Map<String, Value>,
    deterministic: bool,
) -> String {
    if !deterministic {
        return random_token();
    }
    let mut hasher = Sha256::new();
    if let Some(parent) = parent {
        hasher.update(parent.to_string().as_bytes());
    }
    hasher.update(if deleted { b"D" } else { b"L" });
    // Map<String, Value> serialization cannot fail; mirror that with a
    // defaulting fallback rather than threading a Result through.
    let canonical = serde_json::to_string(body).unwrap_or_default();
    hasher.update(canonical.as_bytes());
    let full = hasher.finalize();
    hex::encode(&full[..16])
}

/// 32-char lowercase hex token (random). Used for non-deterministic digests
/// and for engine-generated document ids.
#[must_use]
pub(crate) fn random_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
