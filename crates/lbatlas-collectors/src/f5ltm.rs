// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

//! Collector for F5 BigIP Local Traffic Managers (F5-BIGIP-LOCAL-MIB).
//!
//! A virtual server is keyed by its F5 object name, a variable-length
//! string packed into the OID tail. When HTTP classes are attached, each
//! class becomes its own virtual server `{vs};{class}` with the pool
//! overridden by the class pool; the pool-less entry is kept as long as a
//! default pool exists. IPv6 virtual servers and pool members are skipped.
//!
//! ltmVirtualServProfileType cannot be walked per index (known agent bug),
//! so the protocol lookup walks the whole table once.

use std::sync::Arc;

use async_trait::async_trait;
use lbatlas_model::{
    Actions, BackendServer, LoadBalancer, RealServer, ServerState, Snapshot, VirtualServer,
};
use lbatlas_snmp::{oid_string, string_oid, Oid, SnmpProxy, SnmpValue};
use regex::Regex;
use tracing::warn;

use crate::base::Mib;
use crate::collector::{Collector, CollectorFactory};
use crate::error::CollectError;

const KIND: &str = "F5 LTM";

const OIDS: &[(&str, &str)] = &[
    // Nodes
    ("ltmNodeAddrScreenName", ".1.3.6.1.4.1.3375.2.2.4.1.2.1.12"),
    // Pools
    ("ltmPoolLbMode", ".1.3.6.1.4.1.3375.2.2.5.1.2.1.2"),
    ("ltmPoolStatusAvailState", ".1.3.6.1.4.1.3375.2.2.5.5.2.1.2"),
    ("ltmPoolStatusEnabledState", ".1.3.6.1.4.1.3375.2.2.5.5.2.1.3"),
    ("ltmPoolStatusDetailReason", ".1.3.6.1.4.1.3375.2.2.5.5.2.1.5"),
    ("ltmPoolMemberMonitorRule", ".1.3.6.1.4.1.3375.2.2.5.3.2.1.14"),
    ("ltmPoolMemberWeight", ".1.3.6.1.4.1.3375.2.2.5.3.2.1.7"),
    ("ltmPoolMemberNewSessionEnable", ".1.3.6.1.4.1.3375.2.2.5.3.2.1.12"),
    ("ltmPoolMemberSessionStatus", ".1.3.6.1.4.1.3375.2.2.5.3.2.1.13"),
    ("ltmPoolMbrStatusAvailState", ".1.3.6.1.4.1.3375.2.2.5.6.2.1.5"),
    ("ltmPoolMbrStatusEnabledState", ".1.3.6.1.4.1.3375.2.2.5.6.2.1.6"),
    ("ltmPoolMbrStatusDetailReason", ".1.3.6.1.4.1.3375.2.2.5.6.2.1.8"),
    // Virtual servers
    ("ltmVirtualServAddrType", ".1.3.6.1.4.1.3375.2.2.10.1.2.1.2"),
    ("ltmVirtualServAddr", ".1.3.6.1.4.1.3375.2.2.10.1.2.1.3"),
    ("ltmVirtualServPort", ".1.3.6.1.4.1.3375.2.2.10.1.2.1.6"),
    ("ltmVirtualServTranslateAddr", ".1.3.6.1.4.1.3375.2.2.10.1.2.1.13"),
    ("ltmVirtualServDefaultPool", ".1.3.6.1.4.1.3375.2.2.10.1.2.1.19"),
    ("ltmVirtualServProfileType", ".1.3.6.1.4.1.3375.2.2.10.5.2.1.3"),
    ("ltmVsStatusAvailState", ".1.3.6.1.4.1.3375.2.2.10.13.2.1.2"),
    ("ltmVsStatusEnabledState", ".1.3.6.1.4.1.3375.2.2.10.13.2.1.3"),
    ("ltmVsStatusDetailReason", ".1.3.6.1.4.1.3375.2.2.10.13.2.1.5"),
    // HTTP classes
    ("ltmVsHttpClassProfileName", ".1.3.6.1.4.1.3375.2.2.10.16.2.1.2"),
    ("ltmHttpClassPoolName", ".1.3.6.1.4.1.3375.2.2.6.15.1.2.1.6"),
];

fn mode_name(mode: i64) -> &'static str {
    match mode {
        0 => "round robin",
        1 => "ratio member",
        2 => "least conn member",
        3 => "observed member",
        4 => "predictive member",
        5 => "ratio node",
        6 => "least conn node",
        7 => "fastest node",
        8 => "observed node",
        9 => "predictive node",
        10 => "dynamic ratio",
        11 => "fastest response",
        12 => "least sessions",
        13 => "dynamic ratio member",
        14 => "l3 address",
        _ => "unknown",
    }
}

fn avail_state(avail: i64) -> ServerState {
    match avail {
        1 => ServerState::Up,
        0 | 2 | 3 | 4 | 5 => ServerState::Down,
        _ => ServerState::Unknown,
    }
}

fn enabled_name(enabled: i64) -> &'static str {
    match enabled {
        1 => "enabled",
        0 | 2 | 3 => "disabled",
        _ => "unknown",
    }
}

pub struct F5LtmCollector {
    mib: Mib,
    name: String,
    description: String,
}

impl F5LtmCollector {
    pub fn new(proxy: Arc<SnmpProxy>, name: &str, description: &str) -> Self {
        Self {
            mib: Mib::new(proxy, OIDS),
            name: name.to_string(),
            description: description.to_string(),
        }
    }

    /// A VS id is the object name, optionally suffixed `;{http class}`.
    fn parse_vs(vs: &str) -> (String, Option<String>) {
        match vs.split_once(';') {
            Some((name, class)) => (name.to_string(), Some(class.to_string())),
            None => (vs.to_string(), None),
        }
    }

    fn parse_rs(rs: &str) -> Result<(String, u64), CollectError> {
        let re = Regex::new(r"^(\d+\.\d+\.\d+\.\d+):(\d+)$").expect("static regex");
        let caps = re
            .captures(rs)
            .ok_or_else(|| CollectError::BadRealServer(rs.to_string()))?;
        let ip: std::net::Ipv4Addr = caps[1]
            .parse()
            .map_err(|_| CollectError::BadRealServer(rs.to_string()))?;
        let port = caps[2]
            .parse::<u64>()
            .map_err(|_| CollectError::BadRealServer(rs.to_string()))?;
        Ok((ip.to_string(), port))
    }

    fn rip_index(rip: &str) -> Vec<u64> {
        rip.parse::<std::net::Ipv4Addr>()
            .map(|ip| ip.octets().iter().map(|o| u64::from(*o)).collect())
            .unwrap_or_default()
    }

    /// The pool serving a VS: the class pool when an HTTP class is named,
    /// the default pool otherwise. Empty names mean no pool.
    async fn pool_of(
        &self,
        ov: &[u64],
        class: Option<&str>,
    ) -> Result<Option<String>, CollectError> {
        let pool = match class {
            Some(class) => {
                let oclass = oid_string(class);
                self.mib
                    .cache_or_get(&[("ltmHttpClassPoolName", oclass.clone())])
                    .await?;
                self.mib.text("ltmHttpClassPoolName", &oclass).unwrap_or_default()
            }
            None => {
                self.mib
                    .cache_or_get(&[("ltmVirtualServDefaultPool", ov.to_vec())])
                    .await?;
                self.mib
                    .text("ltmVirtualServDefaultPool", ov)
                    .unwrap_or_default()
            }
        };
        Ok(if pool.is_empty() { None } else { Some(pool) })
    }

    /// First profile attached to the VS, walked globally because the agent
    /// cannot walk this table per index.
    async fn protocol(&self, ov: &[u64]) -> Result<String, CollectError> {
        if !self.mib.is_cached(&[("ltmVirtualServProfileType", ov.to_vec())]) {
            self.mib.walk("ltmVirtualServProfileType").await?;
        }
        let profiles = self.mib.table("ltmVirtualServProfileType", ov);
        let protocol = profiles
            .keys()
            .next()
            .and_then(|suffix| string_oid(suffix.components()))
            .and_then(|strings| strings.into_iter().next())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(protocol)
    }

    async fn process_all(&self) -> Result<LoadBalancer, CollectError> {
        self.mib.walk_all().await?;

        let mut lb = LoadBalancer::new(&self.name, KIND, &self.description);
        let servers: Vec<String> = self
            .mib
            .table("ltmVirtualServAddrType", &[])
            .keys()
            .filter_map(|suffix| string_oid(suffix.components()))
            .filter_map(|strings| strings.into_iter().next())
            .collect();
        for v in servers {
            let ov = oid_string(&v);
            let classes: Vec<String> = self
                .mib
                .table("ltmVsHttpClassProfileName", &ov)
                .values()
                .filter_map(SnmpValue::as_text)
                .filter(|class| !class.is_empty())
                .collect();
            if self.pool_of(&ov, None).await?.is_some() {
                if let Some(vs) = self.process_vs(&v, None).await? {
                    lb.virtualservers.insert(v.clone(), vs);
                }
            }
            for class in classes {
                if let Some(vs) = self.process_vs(&v, Some(&class)).await? {
                    lb.virtualservers.insert(format!("{v};{class}"), vs);
                }
            }
        }
        Ok(lb)
    }

    async fn process_vs(
        &self,
        v: &str,
        class: Option<&str>,
    ) -> Result<Option<VirtualServer>, CollectError> {
        let ov = oid_string(v);
        let keys: Vec<(&str, Vec<u64>)> = OIDS
            .iter()
            .filter(|(n, _)| {
                (n.starts_with("ltmVirtualServ") || n.starts_with("ltmVs"))
                    && !n.starts_with("ltmVirtualServProfile")
                    && !n.starts_with("ltmVsHttpClass")
            })
            .map(|(n, _)| (*n, ov.clone()))
            .collect();
        self.mib.cache_or_get(&keys).await?;

        if self.mib.int("ltmVirtualServAddrType", &ov)? != 1 {
            warn!(vs = v, "unable to handle IPv6 virtual server, skip it");
            return Ok(None);
        }

        let Some(pool) = self.pool_of(&ov, class).await? else {
            warn!(vs = v, ?class, "no pool for virtual server, skip it");
            return Ok(None);
        };
        let op = oid_string(&pool);
        let pool_keys: Vec<(&str, Vec<u64>)> = OIDS
            .iter()
            .filter(|(n, _)| {
                n.starts_with("ltmPool")
                    && !n.starts_with("ltmPoolMbr")
                    && !n.starts_with("ltmPoolMember")
            })
            .map(|(n, _)| (*n, op.clone()))
            .collect();
        self.mib.cache_or_get(&pool_keys).await?;

        let ip = self
            .mib
            .value("ltmVirtualServAddr", &ov)?
            .as_ip_text()
            .ok_or_else(|| CollectError::Value(format!("virtual server {v} address")))?;
        let port = self.mib.int("ltmVirtualServPort", &ov)?;
        let vip = format!("{ip}:{port}");
        let protocol = self.protocol(&ov).await?;
        let mode = mode_name(self.mib.int("ltmPoolLbMode", &op).unwrap_or(-1));

        let mut vs = VirtualServer::new(v, &vip, &protocol, mode);
        if let Some(class) = class {
            vs.extra.insert("http class".into(), class.to_string());
        }
        if let Ok(avail) = self.mib.int("ltmVsStatusAvailState", &ov) {
            vs.extra
                .insert("vs availability state".into(), avail_state(avail).to_string());
        }
        if let Ok(enabled) = self.mib.int("ltmVsStatusEnabledState", &ov) {
            vs.extra
                .insert("vs enabled state".into(), enabled_name(enabled).into());
        }
        if let Ok(reason) = self.mib.text("ltmVsStatusDetailReason", &ov) {
            vs.extra.insert("virtual server detailed reason".into(), reason);
        }
        if let Ok(translate) = self.mib.int("ltmVirtualServTranslateAddr", &ov) {
            vs.extra.insert(
                "address translation".into(),
                if translate == 1 { "enabled" } else { "disabled" }.into(),
            );
        }
        vs.extra.insert("pool name".into(), pool.clone());
        if let Ok(avail) = self.mib.int("ltmPoolStatusAvailState", &op) {
            vs.extra
                .insert("pool availability state".into(), avail_state(avail).to_string());
        }
        if let Ok(enabled) = self.mib.int("ltmPoolStatusEnabledState", &op) {
            vs.extra
                .insert("pool enabled state".into(), enabled_name(enabled).into());
        }
        if let Ok(reason) = self.mib.text("ltmPoolStatusDetailReason", &op) {
            vs.extra.insert("pool detailed reason".into(), reason);
        }

        // Pool members. The member tables have to be walked globally.
        if !self.mib.is_cached(&[("ltmPoolMbrStatusAvailState", op.clone())]) {
            for (name, _) in OIDS {
                if name.starts_with("ltmPoolMbr") || name.starts_with("ltmPoolMember") {
                    self.mib.walk(name).await?;
                }
            }
        }
        let mut member_index = op.clone();
        member_index.extend([1, 4]);
        if !self
            .mib
            .is_cached(&[("ltmPoolMbrStatusAvailState", member_index.clone())])
        {
            warn!(vs = v, "unable to handle IPv6 real servers, skip it");
            return Ok(None);
        }
        let members = self.mib.table("ltmPoolMbrStatusAvailState", &member_index);
        for suffix in members.keys() {
            let parts = suffix.components();
            if parts.len() < 5 {
                continue;
            }
            let rip = parts[..4]
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(".");
            let port = parts[parts.len() - 1];
            if let Some(rs) = self.process_rs(v, class, &rip, port).await? {
                vs.realservers.insert(format!("{rip}:{port}"), rs);
            }
        }

        Ok(Some(vs))
    }

    async fn process_rs(
        &self,
        v: &str,
        class: Option<&str>,
        rip: &str,
        port: u64,
    ) -> Result<Option<BackendServer>, CollectError> {
        let ov = oid_string(v);
        let Some(pool) = self.pool_of(&ov, class).await? else {
            return Ok(None);
        };
        let op = oid_string(&pool);
        let orip = Self::rip_index(rip);

        let mut member = op.clone();
        member.extend([1, 4]);
        member.extend(orip.clone());
        member.push(port);
        let keys: Vec<(&str, Vec<u64>)> = OIDS
            .iter()
            .filter(|(n, _)| n.starts_with("ltmPoolMbr") || n.starts_with("ltmPoolMember"))
            .map(|(n, _)| (*n, member.clone()))
            .collect();
        self.mib.cache_or_get(&keys).await?;

        let mut node = vec![1, 4];
        node.extend(orip);
        self.mib
            .cache_or_get(&[("ltmNodeAddrScreenName", node.clone())])
            .await?;
        let mut name = self.mib.text("ltmNodeAddrScreenName", &node).unwrap_or_default();
        if name.is_empty() {
            name = rip.to_string();
        }

        let protocol = self.protocol(&ov).await?;
        let weight = self.mib.int("ltmPoolMemberWeight", &member).unwrap_or(0) as i32;
        let avail = self.mib.int("ltmPoolMbrStatusAvailState", &member)?;
        let enabled = self.mib.int("ltmPoolMbrStatusEnabledState", &member)?;
        let session = self.mib.int("ltmPoolMemberSessionStatus", &member).unwrap_or(1);
        // A member pulled out of new sessions or administratively disabled
        // is disabled regardless of its monitor state.
        let state = if session != 1 || enabled != 1 {
            ServerState::Disabled
        } else {
            avail_state(avail)
        };

        let mut rs = RealServer::new(&name, rip, Some(port as i32), &protocol, weight, state);
        if let Ok(reason) = self.mib.text("ltmPoolMbrStatusDetailReason", &member) {
            rs.extra.insert("detailed reason".into(), reason);
        }
        if let Ok(rule) = self.mib.text("ltmPoolMemberMonitorRule", &member) {
            rs.extra.insert("monitor rule".into(), rule);
        }
        rs.actions.insert("enable".into(), "Enable".into());
        rs.actions.insert("disable".into(), "Disable".into());
        Ok(Some(BackendServer::Real(rs)))
    }
}

#[async_trait]
impl Collector for F5LtmCollector {
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
                let (v, class) = Self::parse_vs(vs);
                Ok(self
                    .process_vs(&v, class.as_deref())
                    .await?
                    .map(Snapshot::VirtualServer))
            }
            (Some(vs), Some(rs)) => {
                let (v, class) = Self::parse_vs(vs);
                let (rip, port) = Self::parse_rs(rs)?;
                Ok(self
                    .process_rs(&v, class.as_deref(), &rip, port)
                    .await?
                    .map(Snapshot::Backend))
            }
        }
    }

    async fn execute(
        &self,
        action: &str,
        _args: &[String],
        vs: Option<&str>,
        rs: Option<&str>,
    ) -> Result<Option<()>, CollectError> {
        let (Some(vs), Some(rs)) = (vs, rs) else {
            return Ok(None);
        };
        let enable = match action {
            "enable" => 2,
            "disable" => 1,
            _ => return Ok(None),
        };
        let (v, class) = Self::parse_vs(vs);
        let (rip, port) = Self::parse_rs(rs)?;
        let ov = oid_string(&v);
        let Some(pool) = self.pool_of(&ov, class.as_deref()).await? else {
            return Ok(None);
        };
        let mut member = oid_string(&pool);
        member.extend([1, 4]);
        member.extend(Self::rip_index(&rip));
        member.push(port);
        let oid = self.mib.oid("ltmPoolMemberNewSessionEnable", &member);
        self.mib.proxy().set(&oid, SnmpValue::Int(enable)).await?;
        Ok(Some(()))
    }
}

pub struct F5LtmFactory;

#[async_trait]
impl CollectorFactory for F5LtmFactory {
    fn name(&self) -> &'static str {
        "f5ltm"
    }

    async fn probe(&self, _proxy: &SnmpProxy, _description: &str, sys_oid: &Oid) -> bool {
        sys_oid.starts_with(&Oid::parse(".1.3.6.1.4.1.3375.2").expect("static OID"))
    }

    fn build(&self, proxy: Arc<SnmpProxy>, name: &str, description: &str) -> Arc<dyn Collector> {
        Arc::new(F5LtmCollector::new(proxy, name, description))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lbatlas_snmp::{FakeTransport, SnmpTransport, SnmpVersion};

    fn oid_of(name: &str) -> &'static str {
        OIDS.iter().find(|(n, _)| *n == name).map(|(_, o)| *o).unwrap()
    }

    fn device() -> (Arc<FakeTransport>, F5LtmCollector) {
        let t = Arc::new(FakeTransport::new());
        t.set_version(SnmpVersion::V2c);
        let proxy = Arc::new(SnmpProxy::new(t.clone(), Some(t.clone() as Arc<dyn SnmpTransport>), true));
        let collector = F5LtmCollector::new(proxy, "f5.example.net", "BIG-IP 3600");
        (t, collector)
    }

    fn insert_str(t: &FakeTransport, name: &str, index: &[u64], value: &str) {
        let oid = Oid::parse(oid_of(name)).unwrap().child(index);
        t.insert(&oid.to_string(), SnmpValue::Str(value.as_bytes().to_vec()));
    }

    fn insert_int(t: &FakeTransport, name: &str, index: &[u64], value: i64) {
        let oid = Oid::parse(oid_of(name)).unwrap().child(index);
        t.insert(&oid.to_string(), SnmpValue::Int(value));
    }

    fn load_pool(t: &FakeTransport, pool: &str, member_ip: [u8; 4], port: u64, session: i64) {
        let mut member = oid_string(pool);
        member.extend([1, 4]);
        member.extend(member_ip.iter().map(|o| u64::from(*o)));
        member.push(port);
        insert_int(t, "ltmPoolLbMode", &oid_string(pool), 0);
        insert_int(t, "ltmPoolStatusAvailState", &oid_string(pool), 1);
        insert_int(t, "ltmPoolStatusEnabledState", &oid_string(pool), 1);
        insert_str(t, "ltmPoolStatusDetailReason", &oid_string(pool), "ok");
        insert_int(t, "ltmPoolMbrStatusAvailState", &member, 1);
        insert_int(t, "ltmPoolMbrStatusEnabledState", &member, 1);
        insert_str(t, "ltmPoolMbrStatusDetailReason", &member, "monitor ok");
        insert_int(t, "ltmPoolMemberWeight", &member, 5);
        insert_int(t, "ltmPoolMemberSessionStatus", &member, session);
        insert_str(t, "ltmPoolMemberMonitorRule", &member, "tcp");
        let mut node = vec![1, 4];
        node.extend(member_ip.iter().map(|o| u64::from(*o)));
        insert_str(t, "ltmNodeAddrScreenName", &node, "node1");
    }

    fn load_vs(t: &FakeTransport, v: &str, default_pool: &str) {
        let ov = oid_string(v);
        insert_int(t, "ltmVirtualServAddrType", &ov, 1);
        t.insert(
            &Oid::parse(oid_of("ltmVirtualServAddr")).unwrap().child(&ov).to_string(),
            SnmpValue::Str(vec![203, 0, 113, 10]),
        );
        insert_int(t, "ltmVirtualServPort", &ov, 80);
        insert_int(t, "ltmVirtualServTranslateAddr", &ov, 1);
        insert_str(t, "ltmVirtualServDefaultPool", &ov, default_pool);
        insert_int(t, "ltmVsStatusAvailState", &ov, 1);
        insert_int(t, "ltmVsStatusEnabledState", &ov, 1);
        insert_str(t, "ltmVsStatusDetailReason", &ov, "");
        // Profile table: key suffix is ov ++ packed profile name.
        let mut profile = ov.clone();
        profile.extend(oid_string("tcp"));
        insert_int(t, "ltmVirtualServProfileType", &profile, 1);
    }

    #[tokio::test]
    async fn http_class_split_produces_two_entries() {
        let (t, collector) = device();
        load_vs(&t, "vsA", "defaultPool");
        load_pool(&t, "defaultPool", [10, 0, 0, 1], 80, 1);
        load_pool(&t, "classPool", [10, 0, 0, 2], 81, 1);
        let mut class_row = oid_string("vsA");
        class_row.push(1);
        let class_oid = Oid::parse(oid_of("ltmVsHttpClassProfileName"))
            .unwrap()
            .child(&class_row);
        t.insert(&class_oid.to_string(), SnmpValue::Str(b"classX".to_vec()));
        insert_str(&t, "ltmHttpClassPoolName", &oid_string("classX"), "classPool");

        let Some(Snapshot::LoadBalancer(lb)) = collector.collect(None, None).await.unwrap() else {
            panic!("expected a load balancer");
        };
        let ids: Vec<&str> = lb.virtualservers.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["vsA", "vsA;classX"]);
        assert_eq!(lb.virtualservers["vsA"].extra["pool name"], "defaultPool");
        assert_eq!(lb.virtualservers["vsA;classX"].extra["pool name"], "classPool");
        assert!(lb.virtualservers["vsA"].realservers.contains_key("10.0.0.1:80"));
        assert!(lb.virtualservers["vsA;classX"].realservers.contains_key("10.0.0.2:81"));
        assert_eq!(lb.virtualservers["vsA"].protocol, "tcp");
    }

    #[tokio::test]
    async fn disabled_session_overrides_monitor_state() {
        let (t, collector) = device();
        load_vs(&t, "vsB", "poolB");
        load_pool(&t, "poolB", [10, 0, 0, 3], 8080, 2);
        let Some(Snapshot::VirtualServer(vs)) =
            collector.collect(Some("vsB"), None).await.unwrap()
        else {
            panic!("expected a virtual server");
        };
        let rs = &vs.realservers["10.0.0.3:8080"];
        assert_eq!(rs.state(), ServerState::Disabled);
        assert!(rs.actions().contains_key("enable"));
    }

    #[tokio::test]
    async fn ipv6_virtual_servers_are_skipped() {
        let (t, collector) = device();
        load_vs(&t, "vs6", "pool6");
        insert_int(&t, "ltmVirtualServAddrType", &oid_string("vs6"), 2);
        let collected = collector.collect(Some("vs6"), None).await.unwrap();
        assert!(collected.is_none());
    }

    #[tokio::test]
    async fn enable_toggles_new_session_state() {
        let (t, collector) = device();
        load_vs(&t, "vsA", "defaultPool");
        load_pool(&t, "defaultPool", [10, 0, 0, 1], 80, 1);
        let done = collector
            .execute("disable", &[], Some("vsA"), Some("10.0.0.1:80"))
            .await
            .unwrap();
        assert_eq!(done, Some(()));
        let mut member = oid_string("defaultPool");
        member.extend([1, 4, 10, 0, 0, 1, 80]);
        let target = Oid::parse(oid_of("ltmPoolMemberNewSessionEnable"))
            .unwrap()
            .child(&member);
        assert_eq!(t.sets(), vec![(target, SnmpValue::Int(1))]);
    }

    #[tokio::test]
    async fn bad_member_id_is_an_input_error() {
        let (_, collector) = device();
        let err = collector
            .collect(Some("vsA"), Some("not-an-endpoint"))
            .await
            .unwrap_err();
        assert!(err.is_input_error());
    }
}
