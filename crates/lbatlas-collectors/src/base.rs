// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared collector plumbing: a per-vendor OID name table over the proxy
//! cache, with cache-or-fetch recovery.

use std::collections::BTreeMap;
use std::sync::Arc;

use lbatlas_snmp::{Oid, SnmpProxy, SnmpValue};

use crate::error::CollectError;

/// A symbolic OID name plus index components.
pub(crate) type Key<'a> = (&'a str, Vec<u64>);

pub(crate) struct Mib {
    proxy: Arc<SnmpProxy>,
    oids: &'static [(&'static str, &'static str)],
}

impl Mib {
    pub fn new(proxy: Arc<SnmpProxy>, oids: &'static [(&'static str, &'static str)]) -> Self {
        Self { proxy, oids }
    }

    pub fn proxy(&self) -> &SnmpProxy {
        &self.proxy
    }

    /// Numeric base of a symbolic name. The tables are static; a miss is a
    /// programming error.
    pub fn base(&self, name: &str) -> Oid {
        let numeric = self
            .oids
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, oid)| *oid)
            .unwrap_or_else(|| panic!("OID name {name} not registered"));
        Oid::parse(numeric).expect("static OID table entry")
    }

    pub fn oid(&self, name: &str, index: &[u64]) -> Oid {
        self.base(name).child(index)
    }

    pub fn value(&self, name: &str, index: &[u64]) -> Result<SnmpValue, CollectError> {
        Ok(self.proxy.cache_value(&self.oid(name, index))?)
    }

    pub fn int(&self, name: &str, index: &[u64]) -> Result<i64, CollectError> {
        self.value(name, index)?
            .as_int()
            .ok_or_else(|| CollectError::Value(format!("{name}{}", Oid::from(index))))
    }

    pub fn text(&self, name: &str, index: &[u64]) -> Result<String, CollectError> {
        self.value(name, index)?
            .as_text()
            .ok_or_else(|| CollectError::Value(format!("{name}{}", Oid::from(index))))
    }

    /// Trimmed map of the cached subtree under a name, empty when nothing
    /// has been collected there.
    pub fn table(&self, name: &str, index: &[u64]) -> BTreeMap<Oid, SnmpValue> {
        self.proxy
            .cache_table(&self.oid(name, index))
            .unwrap_or_default()
    }

    /// True iff every key resolves in the cache, exactly or as a prefix.
    pub fn is_cached(&self, keys: &[Key<'_>]) -> bool {
        keys.iter()
            .all(|(name, index)| self.proxy.lookup(&self.oid(name, index)).is_ok())
    }

    /// Fetch whatever is missing from the cache with one batched GET.
    /// Leaves legitimately absent on the device stay absent; the typed
    /// readers handle those case by case.
    pub async fn cache_or_get(&self, keys: &[Key<'_>]) -> Result<(), CollectError> {
        let missing: Vec<Oid> = keys
            .iter()
            .map(|(name, index)| self.oid(name, index))
            .filter(|oid| self.proxy.cache_value(oid).is_err())
            .collect();
        if !missing.is_empty() {
            self.proxy.get(&missing).await?;
        }
        Ok(())
    }

    pub async fn walk(&self, name: &str) -> Result<(), CollectError> {
        self.proxy.walk(&self.base(name)).await?;
        Ok(())
    }

    pub async fn walk_under(&self, name: &str, index: &[u64]) -> Result<(), CollectError> {
        self.proxy.walk(&self.oid(name, index)).await?;
        Ok(())
    }

    /// Walk every table of the MIB, the opening move of a full collect.
    pub async fn walk_all(&self) -> Result<(), CollectError> {
        for (name, _) in self.oids {
            self.walk(name).await?;
        }
        Ok(())
    }
}
