// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Process-wide registry mapping database names to engine cores.
//!
//! Handles hold an `Arc` to the core, never the core itself, so every
//! handle opened under one name observes the same documents, the same
//! change log and the same sequence counter. A core stays registered
//! while its handle count is zero; only [`destroy`] removes it. This is
//! what makes close-then-reopen preserve `update_seq` and `doc_count`.

use std::sync::Arc;
use std::sync::OnceLock;

use dashmap::DashMap;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::Error;

use super::DbCore;

static REGISTRY: OnceLock<DashMap<String, Arc<DbCore>>> = OnceLock::new();

fn registry() -> &'static DashMap<String, Arc<DbCore>> {
    REGISTRY.get_or_init(DashMap::new)
}

/// Attach to the core for `name`, creating it on first open.
///
/// `config` only takes effect when this call creates the core; it is
/// ignored when attaching to one that already exists.
pub(crate) fn open_core(name: &str, config: DatabaseConfig) -> Arc<DbCore> {
    let map = registry();
    let core = map
        .entry(name.to_string())
        .or_insert_with(|| Arc::new(DbCore::new(name, config)))
        .clone();
    crate::metrics::set_open_databases(map.len());
    core
}

/// Remove `name` from the registry and tear its core down.
///
/// The entry is removed first, so a concurrent open of the same name
/// gets a fresh, empty core rather than the dying one. Destroying a name
/// that was never opened succeeds without effect.
pub(crate) async fn destroy(name: &str) -> Result<(), Error> {
    let map = registry();
    let removed = map.remove(name);
    crate::metrics::set_open_databases(map.len());
    match removed {
        Some((_, core)) => {
            core.destroy().await;
            info!(db = %name, "database destroyed and deregistered");
            Ok(())
        }
        None => Ok(()),
    }
}

#[cfg(test)]
pub(crate) fn is_registered(name: &str) -> bool {
    registry().contains_key(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_name_shares_one_core() {
        let a = open_core("registry-shared", DatabaseConfig::default());
        let b = open_core("registry-shared", DatabaseConfig::default());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.instance_id, b.instance_id);
        destroy("registry-shared").await.unwrap();
    }

    #[tokio::test]
    async fn test_core_survives_dropped_references() {
        let first = open_core("registry-sticky", DatabaseConfig::default());
        let token = first.instance_id.clone();
        drop(first);

        // No live handle, but the registry still owns the core.
        assert!(is_registered("registry-sticky"));
        let again = open_core("registry-sticky", DatabaseConfig::default());
        assert_eq!(again.instance_id, token);
        destroy("registry-sticky").await.unwrap();
    }

    #[tokio::test]
    async fn test_destroy_then_reopen_is_fresh() {
        let old = open_core("registry-fresh", DatabaseConfig::default());
        let old_token = old.instance_id.clone();
        destroy("registry-fresh").await.unwrap();
        assert!(!is_registered("registry-fresh"));

        let fresh = open_core("registry-fresh", DatabaseConfig::default());
        assert_ne!(fresh.instance_id, old_token);
        destroy("registry-fresh").await.unwrap();
    }

    #[tokio::test]
    async fn test_destroy_unknown_name_is_noop() {
        destroy("registry-never-opened").await.unwrap();
    }

    #[tokio::test]
    async fn test_config_applies_on_first_open_only() {
        let custom = DatabaseConfig { revs_limit: 5, ..DatabaseConfig::default() };
        let first = open_core("registry-config", custom);
        assert_eq!(first.config.revs_limit, 5);

        let second = open_core("registry-config", DatabaseConfig::default());
        assert_eq!(second.config.revs_limit, 5);
        destroy("registry-config").await.unwrap();
    }
}
