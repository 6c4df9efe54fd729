// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

//! The device dispatcher: resolves configured devices, probes the plugin
//! factories, dedups in-flight refreshes by scope prefix and hands
//! collected trees to the bitemporal writer.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use lbatlas_config::CollectorConfig;
use lbatlas_model::Actions;
use lbatlas_snmp::{Oid, Snmp2Transport, SnmpProxy, SnmpTransport, SYS_DESCR, SYS_OBJECT_ID};
use lbatlas_store::{Scope, Store};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::collector::{Collector, CollectorFactory};
use crate::error::CollectError;
use crate::multi::MultiCollector;

/// How long an HTTP caller may reuse a built collector (and its SNMP
/// cache) across several scoped reads.
const COLLECTOR_CACHE_TTL: Duration = Duration::from_secs(10);

/// A joinable, cloneable handle on one in-flight refresh.
pub type RefreshHandle = Shared<BoxFuture<'static, Result<(), Arc<CollectError>>>>;

type RefreshKey = (Option<String>, Option<String>, Option<String>);

struct CachedCollector {
    collector: Arc<dyn Collector>,
    created: Instant,
}

pub struct Dispatcher {
    config: CollectorConfig,
    store: Store,
    factories: Vec<Arc<dyn CollectorFactory>>,
    inflight: Mutex<HashMap<RefreshKey, RefreshHandle>>,
    collectors: Mutex<HashMap<String, CachedCollector>>,
}

/// Scope prefixes that subsume a refresh of `key`: the fleet, the device,
/// the virtual server, then the exact scope.
fn prefixes(key: &RefreshKey) -> Vec<RefreshKey> {
    let mut candidates = vec![(None, None, None)];
    if let Some(lb) = &key.0 {
        candidates.push((Some(lb.clone()), None, None));
        if let Some(vs) = &key.1 {
            candidates.push((Some(lb.clone()), Some(vs.clone()), None));
            if let Some(rs) = &key.2 {
                candidates.push((Some(lb.clone()), Some(vs.clone()), Some(rs.clone())));
            }
        }
    }
    candidates
}

impl Dispatcher {
    pub fn new(config: CollectorConfig, store: Store) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            factories: crate::factories(),
            inflight: Mutex::new(HashMap::new()),
            collectors: Mutex::new(HashMap::new()),
        })
    }

    pub fn device_names(&self) -> Vec<String> {
        self.config.lb.keys().cloned().collect()
    }

    /// Refresh a device, one of its virtual servers, one real server, or
    /// (with no device at all) the whole fleet. An in-flight refresh of
    /// any enclosing scope is joined instead of duplicated.
    pub fn refresh(
        self: &Arc<Self>,
        lb: Option<&str>,
        vs: Option<&str>,
        rs: Option<&str>,
        cached: bool,
    ) -> RefreshHandle {
        let key: RefreshKey = (
            lb.map(str::to_string),
            vs.map(str::to_string),
            rs.map(str::to_string),
        );
        let mut inflight = self.inflight.lock();
        for candidate in prefixes(&key) {
            if let Some(handle) = inflight.get(&candidate) {
                return handle.clone();
            }
        }

        let (tx, rx) = oneshot::channel();
        let this = self.clone();
        let task_key = key.clone();
        tokio::spawn(async move {
            let result = this
                .clone()
                .do_refresh(task_key.clone(), cached)
                .await
                .map_err(Arc::new);
            // Drop the in-flight entry before anyone can observe the
            // result: the map must never hold a completed refresh.
            this.inflight.lock().remove(&task_key);
            let _ = tx.send(result);
        });
        let handle: RefreshHandle = async move {
            rx.await.unwrap_or_else(|_| {
                Err(Arc::new(CollectError::Value("refresh task vanished".into())))
            })
        }
        .boxed()
        .shared();
        inflight.insert(key, handle.clone());
        handle
    }

    async fn do_refresh(self: Arc<Self>, key: RefreshKey, cached: bool) -> Result<(), CollectError> {
        let (lb, vs, rs) = key;
        match lb {
            Some(lb) => {
                self.refresh_device(&lb, vs.as_deref(), rs.as_deref(), cached)
                    .await
            }
            None => {
                // Fleet-wide pass: per-device failures are logged, the
                // sweep continues, and the expiry pass runs at the end.
                for name in self.device_names() {
                    if let Err(e) = self.refresh_device(&name, None, None, false).await {
                        error!(lb = %name, error = %e, "error while exploring device");
                    }
                }
                self.store.expire(self.config.expire).await?;
                Ok(())
            }
        }
    }

    async fn refresh_device(
        &self,
        lb: &str,
        vs: Option<&str>,
        rs: Option<&str>,
        cached: bool,
    ) -> Result<(), CollectError> {
        let collector = self.collector_for(lb, cached).await?;
        let snapshot = collector.collect(vs, rs).await?;
        let scope = match (vs, rs) {
            (None, _) => Scope::lb(lb),
            (Some(vs), None) => Scope::vs(lb, vs),
            (Some(vs), Some(rs)) => Scope::rs(lb, vs, rs),
        };
        self.store.write_snapshot(&scope, snapshot.as_ref()).await?;
        Ok(())
    }

    /// List the actions a collector offers for a scope.
    pub async fn actions(
        &self,
        lb: &str,
        vs: Option<&str>,
        rs: Option<&str>,
    ) -> Result<Actions, CollectError> {
        let collector = self.collector_for(lb, true).await?;
        collector.actions(vs, rs).await
    }

    /// Execute an action; on success the affected scope is re-polled and
    /// persisted (device-wide actions skip the re-poll). `Ok(None)` means
    /// the action is not defined, which callers surface as 404.
    pub async fn execute(
        self: &Arc<Self>,
        lb: &str,
        vs: Option<&str>,
        rs: Option<&str>,
        action: &str,
        args: &[String],
    ) -> Result<Option<()>, CollectError> {
        let collector = self.collector_for(lb, true).await?;
        let done = collector.execute(action, args, vs, rs).await?;
        if done.is_some() && vs.is_some() {
            self.refresh(Some(lb), vs, rs, false)
                .await
                .map_err(|e| CollectError::Value(e.to_string()))?;
        }
        Ok(done)
    }

    /// Build (or reuse, within a short window, when the caller opts in)
    /// the collector for a device.
    async fn collector_for(
        &self,
        lb: &str,
        cached: bool,
    ) -> Result<Arc<dyn Collector>, CollectError> {
        if cached {
            let collectors = self.collectors.lock();
            if let Some(entry) = collectors.get(lb) {
                if entry.created.elapsed() < COLLECTOR_CACHE_TTL {
                    return Ok(entry.collector.clone());
                }
            }
        }
        let collector = self.build_collector(lb).await?;
        self.collectors.lock().insert(
            lb.to_string(),
            CachedCollector {
                collector: collector.clone(),
                created: Instant::now(),
            },
        );
        Ok(collector)
    }

    async fn build_collector(&self, lb: &str) -> Result<Arc<dyn Collector>, CollectError> {
        let community = self
            .config
            .lb
            .get(lb)
            .ok_or_else(|| CollectError::UnknownLoadBalancer(lb.to_string()))?;

        // Literal addresses skip resolution.
        let ip: IpAddr = match lb.parse() {
            Ok(ip) => ip,
            Err(_) => tokio::net::lookup_host((lb, 161))
                .await
                .map_err(|e| CollectError::Resolve(lb.to_string(), e.to_string()))?
                .next()
                .map(|addr| addr.ip())
                .ok_or_else(|| {
                    CollectError::Resolve(lb.to_string(), "no address found".to_string())
                })?,
        };
        let target = SocketAddr::new(ip, 161);
        let read: Arc<dyn SnmpTransport> = Arc::new(Snmp2Transport::new(target, community.read()));
        let write: Option<Arc<dyn SnmpTransport>> = community
            .write()
            .map(|rw| Arc::new(Snmp2Transport::new(target, rw)) as Arc<dyn SnmpTransport>);
        let proxy = Arc::new(SnmpProxy::new(read, write, self.config.bulk));

        let sys = proxy
            .get(&[
                Oid::parse(SYS_DESCR).expect("static OID"),
                Oid::parse(SYS_OBJECT_ID).expect("static OID"),
            ])
            .await?;
        let description = sys
            .get(&Oid::parse(SYS_DESCR).expect("static OID"))
            .and_then(|v| v.as_text())
            .unwrap_or_default();
        let sys_oid = sys
            .get(&Oid::parse(SYS_OBJECT_ID).expect("static OID"))
            .and_then(|v| v.as_oid().cloned())
            .unwrap_or_default();

        let collector =
            select_collector(&self.factories, proxy.clone(), lb, &description, &sys_oid).await?;
        // Probing ran on v1; data collection is far cheaper over v2c.
        proxy.upgrade();
        Ok(collector)
    }
}

/// Probe every registered factory and build the collector for the one
/// that claims the device. Several claimants are only acceptable when all
/// of them are host subagents, which the Multi collector aggregates.
async fn select_collector(
    factories: &[Arc<dyn CollectorFactory>],
    proxy: Arc<SnmpProxy>,
    lb: &str,
    description: &str,
    sys_oid: &Oid,
) -> Result<Arc<dyn Collector>, CollectError> {
    let mut claims = Vec::new();
    for factory in factories {
        if factory.probe(&proxy, description, sys_oid).await {
            claims.push(factory.clone());
        }
    }
    match claims.len() {
        0 => Err(CollectError::NoPlugin(lb.to_string())),
        1 => {
            info!(lb, plugin = claims[0].name(), "collecting through plugin");
            Ok(claims[0].build(proxy, lb, description))
        }
        _ if claims.iter().all(|factory| factory.composable()) => {
            let names: Vec<&str> = claims.iter().map(|f| f.name()).collect();
            info!(lb, plugins = ?names, "aggregating host subagent plugins");
            let subs = claims
                .iter()
                .map(|factory| factory.build(proxy.clone(), lb, description))
                .collect();
            Ok(Arc::new(MultiCollector::new(lb, description, subs)))
        }
        _ => Err(CollectError::AmbiguousPlugin(
            lb.to_string(),
            claims.iter().map(|f| f.name()).collect(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lbatlas_model::Snapshot;
    use lbatlas_snmp::FakeTransport;

    struct StaticFactory {
        name: &'static str,
        claims: bool,
        composable: bool,
    }

    struct NamedCollector(&'static str);

    #[async_trait]
    impl Collector for NamedCollector {
        fn kind(&self) -> String {
            self.0.to_string()
        }

        async fn collect(
            &self,
            _vs: Option<&str>,
            _rs: Option<&str>,
        ) -> Result<Option<Snapshot>, CollectError> {
            Ok(None)
        }

        async fn execute(
            &self,
            _action: &str,
            _args: &[String],
            _vs: Option<&str>,
            _rs: Option<&str>,
        ) -> Result<Option<()>, CollectError> {
            Ok(None)
        }
    }

    #[async_trait]
    impl CollectorFactory for StaticFactory {
        fn name(&self) -> &'static str {
            self.name
        }

        fn composable(&self) -> bool {
            self.composable
        }

        async fn probe(&self, _proxy: &SnmpProxy, _description: &str, _sys_oid: &Oid) -> bool {
            self.claims
        }

        fn build(
            &self,
            _proxy: Arc<SnmpProxy>,
            _name: &str,
            _description: &str,
        ) -> Arc<dyn Collector> {
            Arc::new(NamedCollector(self.name))
        }
    }

    fn proxy() -> Arc<SnmpProxy> {
        Arc::new(SnmpProxy::new(Arc::new(FakeTransport::new()), None, true))
    }

    fn factory(name: &'static str, claims: bool, composable: bool) -> Arc<dyn CollectorFactory> {
        Arc::new(StaticFactory {
            name,
            claims,
            composable,
        })
    }

    #[tokio::test]
    async fn no_claimant_is_noplugin() {
        let factories = vec![factory("a", false, false), factory("b", false, true)];
        let err = match select_collector(&factories, proxy(), "lb1", "", &Oid::new(vec![1])).await
        {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };
        assert!(matches!(err, CollectError::NoPlugin(_)));
    }

    #[tokio::test]
    async fn single_claimant_wins() {
        let factories = vec![factory("a", true, false), factory("b", false, false)];
        let collector = select_collector(&factories, proxy(), "lb1", "", &Oid::new(vec![1]))
            .await
            .unwrap();
        assert_eq!(collector.kind(), "a");
    }

    #[tokio::test]
    async fn composable_claimants_aggregate() {
        let factories = vec![
            factory("keepalived", true, true),
            factory("haproxy", true, true),
            factory("alteon", false, false),
        ];
        let collector = select_collector(&factories, proxy(), "lb1", "", &Oid::new(vec![1]))
            .await
            .unwrap();
        assert_eq!(collector.kind(), "keepalived + haproxy");
    }

    #[tokio::test]
    async fn mixed_claimants_are_ambiguous() {
        let factories = vec![factory("alteon", true, false), factory("haproxy", true, true)];
        let err = match select_collector(&factories, proxy(), "lb1", "", &Oid::new(vec![1])).await
        {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };
        assert!(matches!(err, CollectError::AmbiguousPlugin(_, _)));
    }

    #[test]
    fn refresh_prefixes_cover_enclosing_scopes() {
        let key = (
            Some("lb1".to_string()),
            Some("v1".to_string()),
            Some("r1".to_string()),
        );
        let candidates = prefixes(&key);
        assert_eq!(candidates.len(), 4);
        assert_eq!(candidates[0], (None, None, None));
        assert_eq!(candidates[1], (Some("lb1".into()), None, None));
        assert_eq!(candidates[3], key);

        let fleet = prefixes(&(None, None, None));
        assert_eq!(fleet, vec![(None, None, None)]);
    }
}
