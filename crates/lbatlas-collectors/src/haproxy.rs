// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

//! Collector for HAProxy through the EXCELIANCE-MIB subagent.
//!
//! The MIB does not link backends to frontends, so the mapping is by name
//! convention: backend B serves frontend F when B equals F, equals F's
//! VIP-stripped suffix, or starts with `F--` or `suffix--`. The VIP is the
//! part of the frontend name before the first `--`, and a server's
//! `ip:port` is the part of its name before the first `--`.

use std::sync::Arc;

use async_trait::async_trait;
use lbatlas_model::{
    BackendServer, LoadBalancer, RealServer, ServerState, Snapshot, SorryServer, VirtualServer,
};
use lbatlas_snmp::{Oid, SnmpProxy, SnmpValue};
use regex::Regex;
use tracing::warn;

use crate::base::Mib;
use crate::collector::{Collector, CollectorFactory};
use crate::error::CollectError;

const KIND: &str = "HAProxy";

/// alProcessID of the first process; probed to recognise the subagent.
const PROBE_OID: &str = ".1.3.6.1.4.1.23263.4.2.1.3.1.1.1.1";

const OIDS: &[(&str, &str)] = &[
    // Frontend
    ("alFrontendName", ".1.3.6.1.4.1.23263.4.2.1.3.2.1.3"),
    ("alFrontendStatus", ".1.3.6.1.4.1.23263.4.2.1.3.2.1.13"),
    // Backend
    ("alBackendName", ".1.3.6.1.4.1.23263.4.2.1.3.3.1.3"),
    ("alBackendStatus", ".1.3.6.1.4.1.23263.4.2.1.3.3.1.20"),
    ("alBackendDownTime", ".1.3.6.1.4.1.23263.4.2.1.3.3.1.23"),
    // Servers
    ("alServerName", ".1.3.6.1.4.1.23263.4.2.1.3.4.1.4"),
    ("alServerStatus", ".1.3.6.1.4.1.23263.4.2.1.3.4.1.19"),
    ("alServerWeight", ".1.3.6.1.4.1.23263.4.2.1.3.4.1.21"),
    ("alServerActive", ".1.3.6.1.4.1.23263.4.2.1.3.4.1.22"),
    ("alServerBackup", ".1.3.6.1.4.1.23263.4.2.1.3.4.1.23"),
    ("alServerDownTime", ".1.3.6.1.4.1.23263.4.2.1.3.4.1.26"),
];

/// Centiseconds of downtime as hh:mm:ss.
fn downtime(centiseconds: i64) -> String {
    let seconds = centiseconds / 100;
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds / 60) % 60,
        seconds % 60
    )
}

/// Whether backend `bname` serves frontend `fname` (with `sfname` its
/// VIP-stripped suffix).
fn backend_matches(bname: &str, fname: &str, sfname: &str) -> bool {
    bname == fname
        || bname == sfname
        || bname.starts_with(&format!("{fname}--"))
        || bname.starts_with(&format!("{sfname}--"))
}

pub struct HaProxyCollector {
    mib: Mib,
    name: String,
    description: String,
}

impl HaProxyCollector {
    pub fn new(proxy: Arc<SnmpProxy>, name: &str, description: &str) -> Self {
        Self {
            mib: Mib::new(proxy, OIDS),
            name: name.to_string(),
            description: description.to_string(),
        }
    }

    fn parse_vs(vs: &str) -> Result<(u64, u64), CollectError> {
        let re = Regex::new(r"^p(\d+),f(\d+)$").expect("static regex");
        let caps = re
            .captures(vs)
            .ok_or_else(|| CollectError::BadVirtualServer(vs.to_string()))?;
        Ok((
            caps[1]
                .parse()
                .map_err(|_| CollectError::BadVirtualServer(vs.to_string()))?,
            caps[2]
                .parse()
                .map_err(|_| CollectError::BadVirtualServer(vs.to_string()))?,
        ))
    }

    fn parse_rs(rs: &str) -> Result<(u64, u64), CollectError> {
        let re = Regex::new(r"^b(\d+),s(\d+)$").expect("static regex");
        let caps = re
            .captures(rs)
            .ok_or_else(|| CollectError::BadRealServer(rs.to_string()))?;
        Ok((
            caps[1]
                .parse()
                .map_err(|_| CollectError::BadRealServer(rs.to_string()))?,
            caps[2]
                .parse()
                .map_err(|_| CollectError::BadRealServer(rs.to_string()))?,
        ))
    }

    async fn process_all(&self) -> Result<LoadBalancer, CollectError> {
        self.mib.walk_all().await?;

        let mut lb = LoadBalancer::new(&self.name, KIND, &self.description);
        let frontends: Vec<(u64, u64)> = self
            .mib
            .table("alFrontendName", &[])
            .keys()
            .filter_map(|suffix| match suffix.components() {
                &[pid, front] => Some((pid, front)),
                _ => None,
            })
            .collect();
        for (pid, front) in frontends {
            if let Some(vs) = self.process_vs(pid, front).await? {
                lb.virtualservers.insert(format!("p{pid},f{front}"), vs);
            }
        }
        Ok(lb)
    }

    async fn process_vs(
        &self,
        pid: u64,
        front: u64,
    ) -> Result<Option<VirtualServer>, CollectError> {
        self.mib
            .cache_or_get(&[
                ("alFrontendName", vec![pid, front]),
                ("alFrontendStatus", vec![pid, front]),
            ])
            .await?;

        let fname = self.mib.text("alFrontendName", &[pid, front])?;
        let (vip, sfname) = match fname.split_once("--") {
            Some((vip, suffix)) => (vip.to_string(), suffix.to_string()),
            None => ("unknown".to_string(), fname.clone()),
        };
        let mut vs = VirtualServer::new(&sfname, &vip, "unknown", "unknown");
        if let Ok(status) = self.mib.text("alFrontendStatus", &[pid, front]) {
            vs.extra.insert("status".into(), status);
        }

        if self.mib.table("alBackendName", &[pid]).is_empty() {
            self.mib.walk_under("alBackendName", &[pid]).await?;
        }
        let backends = self.mib.table("alBackendName", &[pid]);
        for (suffix, bname) in &backends {
            let Some(bid) = suffix.first() else { continue };
            let Some(bname) = bname.as_text() else { continue };
            if !backend_matches(&bname, &fname, &sfname) {
                continue;
            }
            if self.mib.table("alServerName", &[pid, bid]).is_empty() {
                self.mib.walk_under("alServerName", &[pid, bid]).await?;
            }
            let servers: Vec<u64> = self
                .mib
                .table("alServerName", &[pid, bid])
                .keys()
                .filter_map(Oid::first)
                .collect();
            if servers.is_empty() {
                warn!(lb = %self.name, backend = %bname, "no servers, skip it");
                continue;
            }
            for sid in servers {
                if let Some(rs) = self.process_rs(pid, bid, sid).await? {
                    vs.realservers.insert(format!("b{bid},s{sid}"), rs);
                }
            }
        }

        Ok(Some(vs))
    }

    async fn process_rs(
        &self,
        pid: u64,
        bid: u64,
        sid: u64,
    ) -> Result<Option<BackendServer>, CollectError> {
        let backend_keys: Vec<(&str, Vec<u64>)> = OIDS
            .iter()
            .filter(|(n, _)| n.starts_with("alBackend"))
            .map(|(n, _)| (*n, vec![pid, bid]))
            .collect();
        let server_keys: Vec<(&str, Vec<u64>)> = OIDS
            .iter()
            .filter(|(n, _)| n.starts_with("alServer"))
            .map(|(n, _)| (*n, vec![pid, bid, sid]))
            .collect();
        let mut keys = backend_keys;
        keys.extend(server_keys);
        self.mib.cache_or_get(&keys).await?;

        let bname = self.mib.text("alBackendName", &[pid, bid]).unwrap_or_default();
        let full_name = self.mib.text("alServerName", &[pid, bid, sid])?;
        let mut rip = "0.0.0.0".to_string();
        let mut rport = None;
        let mut rname = full_name.clone();
        if let Some((endpoint, suffix)) = full_name.split_once("--") {
            rname = suffix.to_string();
            match endpoint.split_once(':') {
                Some((ip, port)) => {
                    rip = ip.to_string();
                    rport = port.parse::<i32>().ok();
                }
                None => rip = endpoint.to_string(),
            }
        }

        let weight = self.mib.int("alServerWeight", &[pid, bid, sid]).unwrap_or(0) as i32;
        let state = if self.mib.int("alServerActive", &[pid, bid, sid]).unwrap_or(0) != 0 {
            ServerState::Up
        } else {
            ServerState::Down
        };
        let backup = self.mib.int("alServerBackup", &[pid, bid, sid]).unwrap_or(0) != 0;

        let mut rs = if backup {
            BackendServer::Sorry(SorryServer::new(&rname, &rip, rport, "unknown", state))
        } else {
            BackendServer::Real(RealServer::new(
                &rname, &rip, rport, "unknown", weight, state,
            ))
        };

        let extra = rs.extra_mut();
        extra.insert("backend".into(), bname);
        if let Ok(down) = self.mib.int("alServerDownTime", &[pid, bid, sid]) {
            extra.insert("down time".into(), downtime(down));
        }
        if let Ok(down) = self.mib.int("alBackendDownTime", &[pid, bid]) {
            extra.insert("backend down time".into(), downtime(down));
        }
        if let Ok(status) = self.mib.text("alServerStatus", &[pid, bid, sid]) {
            extra.insert("status".into(), status);
        }
        if let Ok(status) = self.mib.text("alBackendStatus", &[pid, bid]) {
            extra.insert("backend status".into(), status);
        }
        Ok(Some(rs))
    }
}

#[async_trait]
impl Collector for HaProxyCollector {
    fn kind(&self) -> String {
        KIND.to_string()
    }

    async fn collect(
        &self,
        vs: Option<&str>,
        rs: Option<&str>,
    ) -> Result<Option<Snapshot>, CollectError> {
        match (vs, rs) {
            (None, _) => Ok(Some(Snapshot::LoadBalancer(self.process_all().await?))),
            (Some(vs), None) => {
                let (pid, front) = Self::parse_vs(vs)?;
                Ok(self
                    .process_vs(pid, front)
                    .await?
                    .map(Snapshot::VirtualServer))
            }
            (Some(vs), Some(rs)) => {
                let (pid, _) = Self::parse_vs(vs)?;
                let (bid, sid) = Self::parse_rs(rs)?;
                Ok(self
                    .process_rs(pid, bid, sid)
                    .await?
                    .map(Snapshot::Backend))
            }
        }
    }

    async fn execute(
        &self,
        _action: &str,
        _args: &[String],
        _vs: Option<&str>,
        _rs: Option<&str>,
    ) -> Result<Option<()>, CollectError> {
        // No actions on this equipment.
        Ok(None)
    }
}

pub struct HaProxyFactory;

#[async_trait]
impl CollectorFactory for HaProxyFactory {
    fn name(&self) -> &'static str {
        "haproxy"
    }

    fn composable(&self) -> bool {
        true
    }

    async fn probe(&self, proxy: &SnmpProxy, _description: &str, _sys_oid: &Oid) -> bool {
        let oid = Oid::parse(PROBE_OID).expect("static OID");
        proxy.get(&[oid]).await.map(|r| !r.is_empty()).unwrap_or(false)
    }

    fn build(&self, proxy: Arc<SnmpProxy>, name: &str, description: &str) -> Arc<dyn Collector> {
        Arc::new(HaProxyCollector::new(proxy, name, description))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lbatlas_snmp::{FakeTransport, SnmpTransport, SnmpVersion};

    fn oid_of(name: &str) -> &'static str {
        OIDS.iter().find(|(n, _)| *n == name).map(|(_, o)| *o).unwrap()
    }

    fn device() -> (Arc<FakeTransport>, HaProxyCollector) {
        let t = Arc::new(FakeTransport::new());
        t.set_version(SnmpVersion::V2c);
        let proxy = Arc::new(SnmpProxy::new(t.clone(), None, true));
        let collector = HaProxyCollector::new(proxy, "haproxy.example.net", "Linux proxy1");
        (t, collector)
    }

    fn insert_str(t: &FakeTransport, name: &str, index: &[u64], value: &str) {
        t.insert_under(oid_of(name), index, SnmpValue::Str(value.as_bytes().to_vec()));
    }

    fn load(t: &FakeTransport) {
        insert_str(t, "alFrontendName", &[1, 1], "192.0.2.7--www");
        insert_str(t, "alFrontendStatus", &[1, 1], "OPEN");
        // Matching backends: exact suffix and suffixed with "--".
        insert_str(t, "alBackendName", &[1, 1], "www");
        insert_str(t, "alBackendName", &[1, 2], "www--static");
        // Non-matching backend.
        insert_str(t, "alBackendName", &[1, 3], "other");
        for bid in [1u64, 2, 3] {
            t.insert_under(oid_of("alBackendDownTime"), &[1, bid], SnmpValue::Int(0));
            insert_str(t, "alBackendStatus", &[1, bid], "UP");
        }
        insert_str(t, "alServerName", &[1, 1, 1], "10.0.0.1:8080--web1");
        t.insert_under(oid_of("alServerWeight"), &[1, 1, 1], SnmpValue::Int(10));
        t.insert_under(oid_of("alServerActive"), &[1, 1, 1], SnmpValue::Int(1));
        t.insert_under(oid_of("alServerBackup"), &[1, 1, 1], SnmpValue::Int(0));
        t.insert_under(oid_of("alServerDownTime"), &[1, 1, 1], SnmpValue::Int(366_000));
        insert_str(t, "alServerStatus", &[1, 1, 1], "UP");
        insert_str(t, "alServerName", &[1, 2, 1], "10.0.0.2--spare");
        t.insert_under(oid_of("alServerWeight"), &[1, 2, 1], SnmpValue::Int(1));
        t.insert_under(oid_of("alServerActive"), &[1, 2, 1], SnmpValue::Int(0));
        t.insert_under(oid_of("alServerBackup"), &[1, 2, 1], SnmpValue::Int(1));
        t.insert_under(oid_of("alServerDownTime"), &[1, 2, 1], SnmpValue::Int(0));
        insert_str(t, "alServerStatus", &[1, 2, 1], "no check");
    }

    #[tokio::test]
    async fn frontend_maps_to_matching_backends() {
        let (t, collector) = device();
        load(&t);
        let Some(Snapshot::LoadBalancer(lb)) = collector.collect(None, None).await.unwrap() else {
            panic!("expected a load balancer");
        };
        let vs = &lb.virtualservers["p1,f1"];
        assert_eq!(vs.name, "www");
        assert_eq!(vs.vip, "192.0.2.7");
        let ids: Vec<&str> = vs.realservers.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["b1,s1", "b2,s1"]);

        let web1 = &vs.realservers["b1,s1"];
        assert!(!web1.is_sorry());
        assert_eq!(web1.name(), "web1");
        assert_eq!(web1.state(), ServerState::Up);
        assert_eq!(web1.extra()["down time"], "01:01:00");
        assert_eq!(web1.extra()["backend"], "www");

        let spare = &vs.realservers["b2,s1"];
        assert!(spare.is_sorry());
        assert_eq!(spare.state(), ServerState::Down);
    }

    #[tokio::test]
    async fn scoped_member_parses_endpoint() {
        let (t, collector) = device();
        load(&t);
        let Some(Snapshot::Backend(BackendServer::Real(rs))) = collector
            .collect(Some("p1,f1"), Some("b1,s1"))
            .await
            .unwrap()
        else {
            panic!("expected a real server");
        };
        assert_eq!(rs.rip, "10.0.0.1");
        assert_eq!(rs.rport, Some(8080));
        assert_eq!(rs.weight, 10);
    }

    #[test]
    fn backend_name_convention() {
        assert!(backend_matches("www", "192.0.2.7--www", "www"));
        assert!(backend_matches("192.0.2.7--www", "192.0.2.7--www", "www"));
        assert!(backend_matches("www--static", "192.0.2.7--www", "www"));
        assert!(backend_matches("192.0.2.7--www--x", "192.0.2.7--www", "www"));
        assert!(!backend_matches("wwwx", "192.0.2.7--www", "www"));
        assert!(!backend_matches("other", "192.0.2.7--www", "www"));
    }

    #[test]
    fn bad_ids_are_input_errors() {
        assert!(HaProxyCollector::parse_vs("p1f1").is_err());
        assert!(HaProxyCollector::parse_rs("s1,b1").is_err());
        assert!(HaProxyCollector::parse_vs("p1,f2").is_ok());
    }
}
