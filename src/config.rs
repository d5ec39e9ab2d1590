//! Configuration for a database instance.
//!
//! # Example
//!
//! ```
//! use rev_store::DatabaseConfig;
//!
//! // Defaults
//! let config = DatabaseConfig::default();
//! assert_eq!(config.revs_limit, 1000);
//! assert!(config.deterministic_revs);
//!
//! // Overrides
//! let config = DatabaseConfig {
//!     revs_limit: 20,
//!     ..Default::default()
//! };
//! ```

use serde::Deserialize;

/// Configuration applied when a database instance is first created.
///
/// The config travels with the engine instance, not the handle: later opens
/// of the same name reuse the instance and the config it was created with.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Maximum revision-history depth retained per document. After every
    /// edit the tree is stemmed so no leaf has more than this many stored
    /// ancestors. A limit of 0 disables stemming and keeps unbounded
    /// history (default: 1000).
    #[serde(default = "default_revs_limit")]
    pub revs_limit: usize,

    /// Derive revision digests from content (parent id + deleted flag +
    /// canonical body JSON) so identical edits yield identical revision ids.
    /// When `false`, digests are random (default: true).
    #[serde(default = "default_deterministic_revs")]
    pub deterministic_revs: bool,
}

fn default_revs_limit() -> usize { 1000 }
fn default_deterministic_revs() -> bool { true }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            revs_limit: default_revs_limit(),
            deterministic_revs: default_deterministic_revs(),
        }
    }
}
