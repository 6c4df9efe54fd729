// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

//! The per-device SNMP proxy: typed GET/GETBULK/WALK/SET with a result
//! cache. GET and WALK deposit their results in the cache; GETNEXT and
//! GETBULK do not, since a raw step can return OIDs the caller never asked
//! to keep. SET goes through a separate transport carrying the write
//! community, so the read path never holds writable credentials.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{SnmpError, SnmpResult};
use crate::oid::Oid;
use crate::transport::{SnmpTransport, SnmpVersion};
use crate::value::SnmpValue;

/// How many repetitions one GETBULK step asks for.
const BULK_REPETITIONS: u32 = 40;

/// Result of a cache lookup: an exact scalar, or the trimmed map of the
/// subtree below the requested prefix (keys are the OID suffixes).
#[derive(Clone, Debug)]
pub enum CacheLookup {
    Value(SnmpValue),
    Table(BTreeMap<Oid, SnmpValue>),
}

pub struct SnmpProxy {
    read: Arc<dyn SnmpTransport>,
    write: Option<Arc<dyn SnmpTransport>>,
    bulk: bool,
    cache: RwLock<BTreeMap<Oid, SnmpValue>>,
}

impl SnmpProxy {
    pub fn new(
        read: Arc<dyn SnmpTransport>,
        write: Option<Arc<dyn SnmpTransport>>,
        bulk: bool,
    ) -> Self {
        Self {
            read,
            write,
            bulk,
            cache: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn can_write(&self) -> bool {
        self.write.is_some()
    }

    /// Switch both transports to v2c once a collector has been selected.
    pub fn upgrade(&self) {
        self.read.set_version(SnmpVersion::V2c);
        if let Some(write) = &self.write {
            write.set_version(SnmpVersion::V2c);
        }
    }

    pub fn version(&self) -> SnmpVersion {
        self.read.version()
    }

    /// Batched GET. Successful varbinds are cached; absent varbinds
    /// (noSuchInstance and friends) are skipped.
    pub async fn get(&self, oids: &[Oid]) -> SnmpResult<BTreeMap<Oid, SnmpValue>> {
        let pairs = self.read.get(oids).await?;
        let mut out = BTreeMap::new();
        let mut cache = self.cache.write();
        for (oid, value) in pairs {
            if value.is_absent() {
                continue;
            }
            cache.insert(oid.clone(), value.clone());
            out.insert(oid, value);
        }
        Ok(out)
    }

    pub async fn getnext(&self, oid: &Oid) -> SnmpResult<Vec<(Oid, SnmpValue)>> {
        self.read.getnext(oid).await
    }

    /// One walk step: GETBULK on v2c devices configured for it, otherwise a
    /// single GETNEXT.
    pub async fn getbulk(&self, oid: &Oid) -> SnmpResult<Vec<(Oid, SnmpValue)>> {
        if self.bulk && self.read.version() == SnmpVersion::V2c {
            self.read.getbulk(oid, BULK_REPETITIONS).await
        } else {
            self.read.getnext(oid).await
        }
    }

    /// Walk the subtree below `base` and cache every collected pair.
    ///
    /// Termination: an OID already seen (loop), an OID outside the subtree,
    /// an end-of-MIB marker, an empty step, or any transport error (the
    /// walk then silently keeps what it has).
    pub async fn walk(&self, base: &Oid) -> SnmpResult<BTreeMap<Oid, SnmpValue>> {
        let mut results: BTreeMap<Oid, SnmpValue> = BTreeMap::new();
        let mut last = base.clone();
        loop {
            let pairs = match self.getbulk(&last).await {
                Ok(pairs) => pairs,
                Err(SnmpError::Transport(_)) => break,
                Err(e) => return Err(e),
            };
            if pairs.is_empty() {
                break;
            }
            let mut stop = false;
            for (oid, value) in pairs {
                if value == SnmpValue::EndOfMibView {
                    stop = true;
                    continue;
                }
                if results.contains_key(&oid) {
                    stop = true;
                    continue;
                }
                if !oid.starts_with(base) {
                    stop = true;
                    continue;
                }
                if oid > last {
                    last = oid.clone();
                }
                results.insert(oid, value);
            }
            if stop {
                break;
            }
        }
        let mut cache = self.cache.write();
        for (oid, value) in &results {
            cache.insert(oid.clone(), value.clone());
        }
        Ok(results)
    }

    /// SET through the write transport. Fails with `NoWriteCommunity` on
    /// devices configured with a read community only.
    pub async fn set(&self, oid: &Oid, value: SnmpValue) -> SnmpResult<()> {
        let write = self.write.as_ref().ok_or(SnmpError::NoWriteCommunity)?;
        write.set(oid, value).await
    }

    /// Read-only cache lookup: an exact match yields the scalar, otherwise
    /// the trimmed subtree map. Fails with `NotCached` when neither exists.
    pub fn lookup(&self, oid: &Oid) -> SnmpResult<CacheLookup> {
        let cache = self.cache.read();
        if let Some(value) = cache.get(oid) {
            return Ok(CacheLookup::Value(value.clone()));
        }
        let mut table = BTreeMap::new();
        for (key, value) in cache.range(oid.clone()..) {
            if !key.starts_with(oid) {
                break;
            }
            if let Some(suffix) = key.suffix(oid) {
                table.insert(suffix, value.clone());
            }
        }
        if table.is_empty() {
            return Err(SnmpError::NotCached(oid.to_string()));
        }
        Ok(CacheLookup::Table(table))
    }

    /// Exact scalar from the cache.
    pub fn cache_value(&self, oid: &Oid) -> SnmpResult<SnmpValue> {
        self.cache
            .read()
            .get(oid)
            .cloned()
            .ok_or_else(|| SnmpError::NotCached(oid.to_string()))
    }

    /// Trimmed map of the cached subtree strictly below `prefix`.
    pub fn cache_table(&self, prefix: &Oid) -> SnmpResult<BTreeMap<Oid, SnmpValue>> {
        match self.lookup(prefix)? {
            CacheLookup::Table(table) => Ok(table),
            CacheLookup::Value(_) => Err(SnmpError::NotCached(prefix.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{FakeTransport, Op};

    fn proxy_with(objects: &[(&str, SnmpValue)], bulk: bool) -> (Arc<FakeTransport>, SnmpProxy) {
        let transport = Arc::new(FakeTransport::new());
        for (oid, value) in objects {
            transport.insert(oid, value.clone());
        }
        transport.set_version(SnmpVersion::V2c);
        let proxy = SnmpProxy::new(transport.clone(), None, bulk);
        (transport, proxy)
    }

    #[tokio::test]
    async fn walk_stays_in_subtree_and_caches() {
        let (_, proxy) = proxy_with(
            &[
                (".1.3.6.1.4.1.7.1.1", SnmpValue::Int(1)),
                (".1.3.6.1.4.1.7.1.2", SnmpValue::Int(2)),
                (".1.3.6.1.4.1.7.2.1", SnmpValue::Int(3)),
            ],
            true,
        );
        let base = Oid::parse(".1.3.6.1.4.1.7.1").unwrap();
        let walked = proxy.walk(&base).await.unwrap();
        assert_eq!(walked.len(), 2);
        assert_eq!(
            proxy
                .cache_value(&Oid::parse(".1.3.6.1.4.1.7.1.2").unwrap())
                .unwrap(),
            SnmpValue::Int(2)
        );
        // The out-of-subtree OID was not cached.
        assert!(proxy
            .cache_value(&Oid::parse(".1.3.6.1.4.1.7.2.1").unwrap())
            .is_err());
    }

    #[tokio::test]
    async fn walk_falls_back_to_getnext() {
        let (transport, proxy) = proxy_with(&[(".1.3.6.1.4.1.7.1.1", SnmpValue::Int(1))], false);
        let base = Oid::parse(".1.3.6.1.4.1.7.1").unwrap();
        let walked = proxy.walk(&base).await.unwrap();
        assert_eq!(walked.len(), 1);
        assert!(transport
            .ops()
            .iter()
            .all(|op| !matches!(op, Op::GetBulk(_))));
    }

    #[tokio::test]
    async fn walk_on_empty_subtree_is_empty() {
        let (_, proxy) = proxy_with(&[(".1.3.6.1.2.1.1.1.0", SnmpValue::Int(1))], true);
        let base = Oid::parse(".1.3.6.1.4.1.9999").unwrap();
        assert!(proxy.walk(&base).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cache_prefix_lookup_trims_keys() {
        let (_, proxy) = proxy_with(
            &[
                (".1.3.6.1.4.1.7.1.1.5", SnmpValue::Int(10)),
                (".1.3.6.1.4.1.7.1.2.5", SnmpValue::Int(20)),
            ],
            true,
        );
        let base = Oid::parse(".1.3.6.1.4.1.7.1").unwrap();
        proxy.walk(&base).await.unwrap();
        let table = proxy.cache_table(&base).unwrap();
        assert_eq!(
            table.keys().cloned().collect::<Vec<_>>(),
            vec![Oid::new(vec![1, 5]), Oid::new(vec![2, 5])]
        );
        assert!(proxy
            .cache_table(&Oid::parse(".1.3.6.1.4.1.8").unwrap())
            .is_err());
    }

    #[tokio::test]
    async fn get_fills_cache_and_skips_absent() {
        let (_, proxy) = proxy_with(&[(".1.3.6.1.2.1.1.1.0", SnmpValue::Str(b"lb".to_vec()))], true);
        let present = Oid::parse(".1.3.6.1.2.1.1.1.0").unwrap();
        let missing = Oid::parse(".1.3.6.1.2.1.1.9.0").unwrap();
        let got = proxy.get(&[present.clone(), missing.clone()]).await.unwrap();
        assert_eq!(got.len(), 1);
        assert!(proxy.cache_value(&present).is_ok());
        assert!(proxy.cache_value(&missing).is_err());
    }

    #[tokio::test]
    async fn set_requires_write_community() {
        let (_, proxy) = proxy_with(&[], true);
        let oid = Oid::parse(".1.3.6.1.4.1.7.1.1").unwrap();
        assert!(matches!(
            proxy.set(&oid, SnmpValue::Int(1)).await,
            Err(SnmpError::NoWriteCommunity)
        ));

        let read = Arc::new(FakeTransport::new());
        let write = Arc::new(FakeTransport::new());
        let proxy = SnmpProxy::new(read, Some(write.clone()), true);
        proxy.set(&oid, SnmpValue::Int(2)).await.unwrap();
        assert_eq!(write.sets(), vec![(oid, SnmpValue::Int(2))]);
    }
}
