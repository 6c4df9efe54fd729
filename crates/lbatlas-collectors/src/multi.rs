// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

//! Aggregating collector for hosts running several balancer subsystems at
//! once (typically keepalived + HAProxy behind one SNMP agent).
//!
//! A full collect fans out to every sub-collector and merges the results
//! into one load balancer whose kind is the " + "-join of the sub-kinds;
//! every merged key is suffixed `@{kind}` to avoid collisions. A scoped
//! operation is routed to the sub-collector owning the suffix.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use lbatlas_model::{Actions, LoadBalancer, Snapshot};
use tracing::warn;

use crate::collector::Collector;
use crate::error::CollectError;

pub struct MultiCollector {
    name: String,
    description: String,
    subs: Vec<Arc<dyn Collector>>,
}

impl MultiCollector {
    pub fn new(name: &str, description: &str, subs: Vec<Arc<dyn Collector>>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            subs,
        }
    }

    fn route(&self, kind: &str) -> Option<&Arc<dyn Collector>> {
        self.subs.iter().find(|sub| sub.kind() == kind)
    }

    /// Split a suffixed id `x@kind` into its parts.
    fn split_suffixed(id: &str) -> Option<(&str, &str)> {
        id.rsplit_once('@')
    }

    fn merge(&self, results: Vec<Option<LoadBalancer>>) -> LoadBalancer {
        let mut kinds = Vec::new();
        let mut merged = LoadBalancer::new(&self.name, "", &self.description);
        for lb in results.into_iter().flatten() {
            let kind = lb.kind.clone();
            for (key, value) in lb.extra {
                merged.extra.insert(format!("{key}@{kind}"), value);
            }
            for (key, value) in lb.actions {
                merged.actions.insert(format!("{key}@{kind}"), value);
            }
            for (key, value) in lb.virtualservers {
                merged.virtualservers.insert(format!("{key}@{kind}"), value);
            }
            kinds.push(kind);
        }
        merged.kind = kinds.join(" + ");
        merged
    }
}

#[async_trait]
impl Collector for MultiCollector {
    fn kind(&self) -> String {
        self.subs
            .iter()
            .map(|sub| sub.kind())
            .collect::<Vec<_>>()
            .join(" + ")
    }

    async fn collect(
        &self,
        vs: Option<&str>,
        rs: Option<&str>,
    ) -> Result<Option<Snapshot>, CollectError> {
        match vs {
            None => {
                let collects = join_all(self.subs.iter().map(|sub| sub.collect(None, None))).await;
                let mut results = Vec::with_capacity(collects.len());
                for (sub, collected) in self.subs.iter().zip(collects) {
                    match collected {
                        Ok(Some(Snapshot::LoadBalancer(lb))) => results.push(Some(lb)),
                        Ok(_) => results.push(None),
                        Err(e) => {
                            warn!(lb = %self.name, kind = %sub.kind(), error = %e,
                                  "sub-collector failed, skip it");
                            results.push(None);
                        }
                    }
                }
                Ok(Some(Snapshot::LoadBalancer(self.merge(results))))
            }
            Some(vs) => {
                let (rvs, kind) = Self::split_suffixed(vs)
                    .ok_or_else(|| CollectError::BadVirtualServer(vs.to_string()))?;
                let sub = self
                    .route(kind)
                    .ok_or_else(|| CollectError::BadVirtualServer(vs.to_string()))?;
                sub.collect(Some(rvs), rs).await
            }
        }
    }

    async fn actions(&self, vs: Option<&str>, rs: Option<&str>) -> Result<Actions, CollectError> {
        match vs {
            None => {
                let mut merged = Actions::new();
                for sub in &self.subs {
                    let kind = sub.kind();
                    for (key, value) in sub.actions(None, None).await? {
                        merged.insert(format!("{key}@{kind}"), value);
                    }
                }
                Ok(merged)
            }
            Some(vs) => {
                let (rvs, kind) = Self::split_suffixed(vs)
                    .ok_or_else(|| CollectError::BadVirtualServer(vs.to_string()))?;
                let sub = self
                    .route(kind)
                    .ok_or_else(|| CollectError::BadVirtualServer(vs.to_string()))?;
                sub.actions(Some(rvs), rs).await
            }
        }
    }

    async fn execute(
        &self,
        action: &str,
        args: &[String],
        vs: Option<&str>,
        rs: Option<&str>,
    ) -> Result<Option<()>, CollectError> {
        match vs {
            // Device-wide actions are themselves suffixed by the backend
            // kind to use.
            None => {
                let Some((raction, kind)) = Self::split_suffixed(action) else {
                    return Ok(None);
                };
                match self.route(kind) {
                    Some(sub) => sub.execute(raction, args, None, None).await,
                    None => Ok(None),
                }
            }
            Some(vs) => {
                let (rvs, kind) = Self::split_suffixed(vs)
                    .ok_or_else(|| CollectError::BadVirtualServer(vs.to_string()))?;
                let sub = self
                    .route(kind)
                    .ok_or_else(|| CollectError::BadVirtualServer(vs.to_string()))?;
                sub.execute(action, args, Some(rvs), rs).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lbatlas_model::VirtualServer;
    use parking_lot::Mutex;

    struct FakeSub {
        kind: &'static str,
        fail: bool,
        executed: Mutex<Vec<(String, Option<String>)>>,
    }

    impl FakeSub {
        fn new(kind: &'static str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                kind,
                fail,
                executed: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Collector for FakeSub {
        fn kind(&self) -> String {
            self.kind.to_string()
        }

        async fn collect(
            &self,
            vs: Option<&str>,
            _rs: Option<&str>,
        ) -> Result<Option<Snapshot>, CollectError> {
            if self.fail {
                return Err(CollectError::Value("boom".into()));
            }
            match vs {
                None => {
                    let mut lb = LoadBalancer::new("host", self.kind, "");
                    lb.virtualservers.insert(
                        "v1".into(),
                        VirtualServer::new("one", "10.0.0.1:80", "TCP", "rr"),
                    );
                    Ok(Some(Snapshot::LoadBalancer(lb)))
                }
                Some(vs) => Ok(Some(Snapshot::VirtualServer(VirtualServer::new(
                    vs, "", "TCP", "rr",
                )))),
            }
        }

        async fn execute(
            &self,
            action: &str,
            _args: &[String],
            vs: Option<&str>,
            _rs: Option<&str>,
        ) -> Result<Option<()>, CollectError> {
            self.executed
                .lock()
                .push((action.to_string(), vs.map(str::to_string)));
            Ok(Some(()))
        }
    }

    fn multi() -> (Arc<FakeSub>, Arc<FakeSub>, MultiCollector) {
        let a = FakeSub::new("KeepAlived", false);
        let b = FakeSub::new("HAProxy", false);
        let multi = MultiCollector::new("host", "a dual host", vec![a.clone(), b.clone()]);
        (a, b, multi)
    }

    #[tokio::test]
    async fn full_collect_merges_with_suffixes() {
        let (_, _, multi) = multi();
        let Some(Snapshot::LoadBalancer(lb)) = multi.collect(None, None).await.unwrap() else {
            panic!("expected a load balancer");
        };
        assert_eq!(lb.kind, "KeepAlived + HAProxy");
        let ids: Vec<&str> = lb.virtualservers.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["v1@HAProxy", "v1@KeepAlived"]);
    }

    #[tokio::test]
    async fn failing_sub_collector_is_skipped() {
        let a = FakeSub::new("KeepAlived", true);
        let b = FakeSub::new("HAProxy", false);
        let multi = MultiCollector::new("host", "", vec![a, b]);
        let Some(Snapshot::LoadBalancer(lb)) = multi.collect(None, None).await.unwrap() else {
            panic!("expected a load balancer");
        };
        assert_eq!(lb.kind, "HAProxy");
        assert_eq!(lb.virtualservers.len(), 1);
    }

    #[tokio::test]
    async fn scoped_operations_route_by_suffix() {
        let (_, _, multi) = multi();
        let Some(Snapshot::VirtualServer(vs)) = multi
            .collect(Some("v1@KeepAlived"), None)
            .await
            .unwrap()
        else {
            panic!("expected a virtual server");
        };
        assert_eq!(vs.name, "v1");
        assert!(multi.collect(Some("v1"), None).await.is_err());
        assert!(multi.collect(Some("v1@Unknown"), None).await.is_err());
    }

    #[tokio::test]
    async fn execute_routes_both_forms() {
        let (a, b, multi) = multi();
        multi
            .execute("flush@HAProxy", &[], None, None)
            .await
            .unwrap();
        assert_eq!(b.executed.lock().as_slice(), &[("flush".to_string(), None)]);
        multi
            .execute("enable", &[], Some("v1@KeepAlived"), Some("r1"))
            .await
            .unwrap();
        assert_eq!(
            a.executed.lock().as_slice(),
            &[("enable".to_string(), Some("v1".to_string()))]
        );
    }
}
