// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

//! The federation client. It keeps, per as-of date, a fleet map from load
//! balancer to the backends that own it, refreshed from every backend's
//! `loadbalancer/` listing; fleet-wide queries fan out to a covering
//! subset of backends and single-device requests fail over through the
//! owners in order. The tier holds no device state of its own.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use lbatlas_config::MetaWebConfig;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Instant;
use tracing::warn;

use crate::http::{MetaHttp, MetaResponse};

/// Load balancer -> backends that can answer for it, in discovery order.
pub type FleetMap = BTreeMap<String, Vec<String>>;

type DateKey = Option<String>;

#[derive(Default)]
struct MetaState {
    maps: HashMap<DateKey, FleetMap>,
    updated: HashMap<DateKey, Instant>,
    refreshing: HashMap<DateKey, Shared<BoxFuture<'static, ()>>>,
}

/// What a proxied single-device request came to.
pub enum ProxyOutcome {
    /// No backend claims the device.
    Unknown,
    /// Every owning backend failed.
    NoGateway,
    /// First non-erroring backend's verbatim answer, with the backend
    /// that served it.
    Response(MetaResponse, String),
}

pub struct MetaClient {
    services: Vec<String>,
    timeout: Duration,
    parallel: usize,
    expire: Duration,
    http: Arc<dyn MetaHttp>,
    state: Mutex<MetaState>,
}

/// Extend `scheduled` until every load balancer is covered by a scheduled
/// backend, preferring the thinnest-homed load balancers first so shared
/// backends cover several devices with one request. Returns the newly
/// added backends.
pub(crate) fn schedule(
    lbs: &FleetMap,
    scheduled: &mut Vec<String>,
    failed: &HashSet<String>,
) -> Vec<String> {
    let mut added = Vec::new();
    let mut order: Vec<(&String, &Vec<String>)> = lbs.iter().collect();
    order.sort_by_key(|(lb, services)| (services.len(), lb.as_str()));
    for (lb, services) in order {
        if services.iter().any(|svc| scheduled.contains(svc)) {
            continue;
        }
        match services.iter().find(|svc| !failed.contains(*svc)) {
            Some(svc) => {
                scheduled.push(svc.clone());
                added.push(svc.clone());
            }
            None => warn!(lb = %lb, "no service available for load balancer"),
        }
    }
    added
}

impl MetaClient {
    pub fn new(config: &MetaWebConfig, http: Arc<dyn MetaHttp>) -> Arc<Self> {
        Arc::new(Self {
            services: config.proxy.clone(),
            timeout: Duration::from_secs(config.timeout),
            parallel: config.parallel.max(1),
            expire: Duration::from_secs(config.expire),
            http,
            state: Mutex::new(MetaState::default()),
        })
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    fn fleet_map(&self, date: Option<&str>) -> FleetMap {
        self.state
            .lock()
            .maps
            .get(&date.map(str::to_string))
            .cloned()
            .unwrap_or_default()
    }

    /// Refresh the fleet map for a date unless it is still fresh. When a
    /// map already exists the refresh runs in the background and the call
    /// returns immediately; otherwise it waits for the first map.
    pub async fn refresh(self: &Arc<Self>, date: Option<&str>) {
        let key: DateKey = date.map(str::to_string);
        let wait = {
            let mut state = self.state.lock();
            if let Some(running) = state.refreshing.get(&key) {
                if state.maps.contains_key(&key) {
                    None
                } else {
                    Some(running.clone())
                }
            } else if state
                .updated
                .get(&key)
                .is_some_and(|updated| updated.elapsed() < self.expire)
            {
                None
            } else {
                let this = self.clone();
                let task_key = key.clone();
                let running: Shared<BoxFuture<'static, ()>> =
                    async move { this.do_refresh(task_key).await }.boxed().shared();
                tokio::spawn(running.clone());
                state.refreshing.insert(key.clone(), running.clone());
                if state.maps.contains_key(&key) {
                    None
                } else {
                    warn!("no load balancer list available, wait to get one");
                    Some(running)
                }
            }
        };
        if let Some(running) = wait {
            running.await;
        }
    }

    async fn do_refresh(self: Arc<Self>, key: DateKey) {
        let mut answers: HashMap<String, Vec<String>> = HashMap::new();
        let mut queries = FuturesUnordered::new();
        let mut backlog: VecDeque<String> = self.services.iter().cloned().collect();
        loop {
            while queries.len() < self.parallel {
                let Some(service) = backlog.pop_front() else { break };
                let this = self.clone();
                let date = key.clone();
                queries.push(async move {
                    let response = this
                        .http
                        .get(
                            &service,
                            Some(this.timeout),
                            date.as_deref(),
                            &["loadbalancer".to_string()],
                        )
                        .await;
                    (service, response)
                });
            }
            let Some((service, response)) = queries.next().await else {
                break;
            };
            match response {
                Ok(response) if response.status == 200 && response.is_json() => {
                    match serde_json::from_slice::<Vec<String>>(&response.body) {
                        Ok(lbs) => {
                            answers.insert(service, lbs);
                        }
                        Err(e) => warn!(service = %service, error = %e, "bad loadbalancer listing"),
                    }
                }
                Ok(response) => {
                    warn!(service = %service, status = response.status, "service responded error");
                }
                Err(e) => warn!(service = %service, error = %e, "service is unavailable"),
            }
        }

        // Merge in configured order so ownership lists are stable.
        let mut map = FleetMap::new();
        for service in &self.services {
            if let Some(lbs) = answers.get(service) {
                for lb in lbs {
                    map.entry(lb.clone()).or_default().push(service.clone());
                }
            }
        }

        let mut state = self.state.lock();
        state.maps.insert(key.clone(), map);
        state.updated.insert(key.clone(), Instant::now());
        state.refreshing.remove(&key);
        // Drop maps nobody asked about for a while.
        let horizon = self.expire * 4;
        let stale: Vec<DateKey> = state
            .updated
            .iter()
            .filter(|(date, updated)| **date != key && updated.elapsed() > horizon)
            .map(|(date, _)| date.clone())
            .collect();
        for date in stale {
            state.updated.remove(&date);
            state.maps.remove(&date);
        }
    }

    /// The load balancers the federation can currently answer for.
    pub async fn loadbalancers(self: &Arc<Self>, date: Option<&str>) -> Vec<String> {
        self.refresh(date).await;
        self.fleet_map(date).keys().cloned().collect()
    }

    /// The raw fleet map, for the status resource.
    pub async fn status(self: &Arc<Self>, date: Option<&str>) -> FleetMap {
        self.refresh(date).await;
        self.fleet_map(date)
    }

    /// Each configured backend, up when the current fleet map references
    /// it.
    pub fn ping(&self) -> BTreeMap<String, &'static str> {
        let map = self.fleet_map(None);
        self.services
            .iter()
            .map(|service| {
                let up = map.values().any(|owners| owners.contains(service));
                (service.clone(), if up { "up" } else { "down" })
            })
            .collect()
    }

    /// Fan a request out to a covering subset of backends, rescheduling
    /// around failures, and collect the successful JSON bodies.
    pub async fn get_all(self: &Arc<Self>, date: Option<&str>, segments: &[String]) -> Vec<Value> {
        self.refresh(date).await;
        let lbs = self.fleet_map(date);
        let mut scheduled: Vec<String> = Vec::new();
        let mut failed: HashSet<String> = HashSet::new();
        let mut backlog: VecDeque<String> =
            schedule(&lbs, &mut scheduled, &failed).into_iter().collect();

        let mut results = Vec::new();
        let mut queries = FuturesUnordered::new();
        loop {
            while queries.len() < self.parallel {
                let Some(service) = backlog.pop_front() else { break };
                let this = self.clone();
                let date = date.map(str::to_string);
                let segments = segments.to_vec();
                queries.push(async move {
                    let response = this
                        .http
                        .get(&service, None, date.as_deref(), &segments)
                        .await;
                    (service, response)
                });
            }
            let Some((service, response)) = queries.next().await else {
                break;
            };
            match response {
                Ok(response) if response.status == 200 && response.is_json() => {
                    match serde_json::from_slice::<Value>(&response.body) {
                        Ok(value) => results.push(value),
                        Err(e) => warn!(service = %service, error = %e, "bad JSON from backend"),
                    }
                }
                Ok(response) => {
                    warn!(service = %service, status = response.status, "backend answered error status");
                }
                Err(e) => {
                    warn!(service = %service, error = %e, "backend failed, rescheduling");
                    scheduled.retain(|svc| svc != &service);
                    failed.insert(service);
                    backlog.extend(schedule(&lbs, &mut scheduled, &failed));
                }
            }
        }
        results
    }

    /// Proxy a single-device request to the backends owning it, in order,
    /// returning the first non-error answer verbatim.
    pub async fn proxy(
        self: &Arc<Self>,
        date: Option<&str>,
        lb: &str,
        segments: &[String],
    ) -> ProxyOutcome {
        self.refresh(date).await;
        let Some(owners) = self.fleet_map(date).get(lb).cloned() else {
            return ProxyOutcome::Unknown;
        };
        let mut request = vec!["loadbalancer".to_string(), lb.to_string()];
        request.extend(segments.iter().cloned());
        for service in owners {
            match self.http.get(&service, None, date, &request).await {
                Ok(response) => return ProxyOutcome::Response(response, service),
                Err(e) => warn!(service = %service, error = %e, "backend failed, trying the next one"),
            }
        }
        ProxyOutcome::NoGateway
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::MetaError;
    use async_trait::async_trait;

    fn fleet(entries: &[(&str, &[&str])]) -> FleetMap {
        entries
            .iter()
            .map(|(lb, services)| {
                (
                    lb.to_string(),
                    services.iter().map(|s| s.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn covering_subset_prefers_shared_backends() {
        let lbs = fleet(&[("lb1", &["A", "B"]), ("lb2", &["B"]), ("lb3", &["C"])]);
        let mut scheduled = Vec::new();
        let added = schedule(&lbs, &mut scheduled, &HashSet::new());
        assert_eq!(added, vec!["B".to_string(), "C".to_string()]);
        assert_eq!(scheduled, vec!["B".to_string(), "C".to_string()]);
    }

    #[test]
    fn failed_backends_are_substituted() {
        let lbs = fleet(&[("lb1", &["A", "B"]), ("lb2", &["B"]), ("lb3", &["C"])]);
        let mut scheduled = vec!["C".to_string()];
        let mut failed = HashSet::new();
        failed.insert("B".to_string());
        let added = schedule(&lbs, &mut scheduled, &failed);
        // lb2 has no backend left; lb1 falls back to A.
        assert_eq!(added, vec!["A".to_string()]);
        assert_eq!(scheduled, vec!["C".to_string(), "A".to_string()]);
    }

    struct TableHttp {
        // (service, joined segments) -> response or error status
        entries: Mutex<HashMap<(String, String), Result<MetaResponse, u16>>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl TableHttp {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                entries: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn put_json(&self, service: &str, path: &str, body: &str) {
            self.entries.lock().insert(
                (service.to_string(), path.to_string()),
                Ok(MetaResponse {
                    status: 200,
                    content_type: "application/json; charset=UTF-8".into(),
                    body: body.as_bytes().to_vec(),
                }),
            );
        }

        fn put_error(&self, service: &str, path: &str, status: u16) {
            self.entries
                .lock()
                .insert((service.to_string(), path.to_string()), Err(status));
        }

        fn calls_to(&self, path: &str) -> Vec<String> {
            self.calls
                .lock()
                .iter()
                .filter(|(_, p)| p == path)
                .map(|(service, _)| service.clone())
                .collect()
        }
    }

    #[async_trait]
    impl MetaHttp for TableHttp {
        async fn get(
            &self,
            service: &str,
            _timeout: Option<Duration>,
            date: Option<&str>,
            segments: &[String],
        ) -> Result<MetaResponse, MetaError> {
            let mut path = segments.join("/");
            if let Some(date) = date {
                path = format!("past/{date}/{path}");
            }
            self.calls.lock().push((service.to_string(), path.clone()));
            match self.entries.lock().get(&(service.to_string(), path)) {
                Some(Ok(response)) => Ok(response.clone()),
                Some(Err(status)) => Err(MetaError::Backend(*status)),
                None => Ok(MetaResponse {
                    status: 404,
                    content_type: "application/json; charset=UTF-8".into(),
                    body: b"{}".to_vec(),
                }),
            }
        }
    }

    fn config(services: &[&str]) -> MetaWebConfig {
        MetaWebConfig {
            proxy: services.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn refresh_merges_ownership() {
        let http = TableHttp::new();
        http.put_json("A", "loadbalancer", r#"["lb1"]"#);
        http.put_json("B", "loadbalancer", r#"["lb1", "lb2"]"#);
        let client = MetaClient::new(&config(&["A", "B"]), http.clone());
        let lbs = client.loadbalancers(None).await;
        assert_eq!(lbs, vec!["lb1".to_string(), "lb2".to_string()]);
        let map = client.status(None).await;
        assert_eq!(map["lb1"], vec!["A".to_string(), "B".to_string()]);
        assert_eq!(map["lb2"], vec!["B".to_string()]);
        assert_eq!(client.ping()["A"], "up");
    }

    #[tokio::test]
    async fn unreachable_backends_are_down() {
        let http = TableHttp::new();
        http.put_json("A", "loadbalancer", r#"["lb1"]"#);
        http.put_error("B", "loadbalancer", 503);
        let client = MetaClient::new(&config(&["A", "B"]), http.clone());
        client.refresh(None).await;
        let ping = client.ping();
        assert_eq!(ping["A"], "up");
        assert_eq!(ping["B"], "down");
    }

    #[tokio::test]
    async fn fan_out_covers_and_reschedules() {
        let http = TableHttp::new();
        http.put_json("A", "loadbalancer", r#"["lb1"]"#);
        http.put_json("B", "loadbalancer", r#"["lb1", "lb2"]"#);
        http.put_json("C", "loadbalancer", r#"["lb3"]"#);
        http.put_json("A", "search/foo", r#"["/a"]"#);
        http.put_error("B", "search/foo", 500);
        http.put_json("C", "search/foo", r#"["/c"]"#);
        let client = MetaClient::new(&config(&["A", "B", "C"]), http.clone());
        let results = client
            .get_all(None, &["search".to_string(), "foo".to_string()])
            .await;
        // B failed, so A was scheduled as a substitute: three requests in
        // total and both surviving bodies collected.
        let mut called = http.calls_to("search/foo");
        called.sort();
        assert_eq!(called, vec!["A".to_string(), "B".to_string(), "C".to_string()]);
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn proxy_fails_over_in_owner_order() {
        let http = TableHttp::new();
        http.put_json("A", "loadbalancer", r#"["lb1"]"#);
        http.put_json("B", "loadbalancer", r#"["lb1"]"#);
        http.put_error("A", "loadbalancer/lb1/virtualserver", 502);
        http.put_json("B", "loadbalancer/lb1/virtualserver", r#"{"v1": []}"#);
        let client = MetaClient::new(&config(&["A", "B"]), http.clone());
        let outcome = client
            .proxy(None, "lb1", &["virtualserver".to_string()])
            .await;
        let ProxyOutcome::Response(response, service) = outcome else {
            panic!("expected a proxied response");
        };
        assert_eq!(service, "B");
        assert_eq!(response.status, 200);

        let outcome = client.proxy(None, "nowhere", &[]).await;
        assert!(matches!(outcome, ProxyOutcome::Unknown));
    }

    #[tokio::test]
    async fn all_owners_failing_is_no_gateway() {
        let http = TableHttp::new();
        http.put_json("A", "loadbalancer", r#"["lb1"]"#);
        http.put_error("A", "loadbalancer/lb1", 500);
        let client = MetaClient::new(&config(&["A"]), http.clone());
        let outcome = client.proxy(None, "lb1", &[]).await;
        assert!(matches!(outcome, ProxyOutcome::NoGateway));
    }

    #[tokio::test(start_paused = true)]
    async fn maps_expire_and_old_dates_are_collected() {
        let http = TableHttp::new();
        http.put_json("A", "loadbalancer", r#"["lb1"]"#);
        http.put_json("A", "past/2011-07-01/loadbalancer", r#"["lb1"]"#);
        let client = MetaClient::new(&config(&["A"]), http.clone());
        client.refresh(Some("2011-07-01")).await;
        client.refresh(None).await;
        assert_eq!(client.state.lock().maps.len(), 2);
        // Fresh enough: no extra request.
        client.refresh(None).await;
        assert_eq!(http.calls_to("loadbalancer").len(), 1);
        // Well past 4*expire, a live refresh drops the stale dated map.
        tokio::time::advance(Duration::from_secs(300)).await;
        client.refresh(None).await;
        // The dated map was garbage collected once the refresh landed.
        tokio::task::yield_now().await;
        let state_len = client.state.lock().maps.len();
        assert_eq!(state_len, 1);
        assert_eq!(http.calls_to("loadbalancer").len(), 2);
    }
}
