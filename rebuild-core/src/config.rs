//! Build configuration.
//!
//! Configuration values are opaque key/value strings mixed into every
//! recipe's request key, so changing a config value invalidates exactly
//! the recipes whose cache keys incorporate it (all of them, in the
//! reference scheduler).

use rebuild_hash::{hash_bytes, Hash};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Build-wide configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Explicit store root override; `None` uses `rebuild_store::discover_root`.
    pub store_root: Option<PathBuf>,
    /// Reserved for a future parallel scheduler; accepted and validated but
    /// not yet load-bearing (the reference scheduler is single-threaded).
    pub jobs: usize,
    /// When true, cache probing always misses; traces are still written.
    pub cache_disabled: bool,
    /// Opaque key/value pairs mixed into every recipe's request key.
    pub values: BTreeMap<String, String>,
}

impl Config {
    /// Creates a default configuration: no store override, one job, cache
    /// enabled, no config values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store_root: None,
            jobs: 1,
            cache_disabled: false,
            values: BTreeMap::new(),
        }
    }

    /// Hashes the configuration's key/value map for inclusion in a request
    /// key. Iterates `values` in sorted order (guaranteed by `BTreeMap`) so
    /// the hash is independent of insertion order.
    #[must_use]
    pub fn hash(&self) -> Hash {
        let mut acc = Hash::ZERO;
        for (k, v) in &self.values {
            acc = acc.combine(hash_bytes(k.as_bytes())).combine(hash_bytes(v.as_bytes()));
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_order_independent() {
        let mut a = Config::new();
        a.values.insert("b".into(), "2".into());
        a.values.insert("a".into(), "1".into());

        let mut b = Config::new();
        b.values.insert("a".into(), "1".into());
        b.values.insert("b".into(), "2".into());

        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn hash_changes_with_values() {
        let mut a = Config::new();
        a.values.insert("k".into(), "1".into());
        let mut b = Config::new();
        b.values.insert("k".into(), "2".into());
        assert_ne!(a.hash(), b.hash());
    }
}
