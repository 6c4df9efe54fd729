// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

//! Collector for Cisco CS and ArrowPoint content switches (APENT-MIB and
//! friends). The two differ only in the enterprise base OID, so one
//! parameterised collector serves both.
//!
//! A virtual server is an (owner, content) pair, both variable-length
//! strings packed into the OID tail. A real server is a service, named the
//! same way. Groups are ignored; the primary and secondary sorry servers
//! hang off the content entry. The equipment offers no actions.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use lbatlas_model::{
    Actions, BackendServer, LoadBalancer, RealServer, ServerState, Snapshot, SorryServer,
    VirtualServer,
};
use lbatlas_snmp::{oid_string, string_oid, Oid, SnmpProxy, SnmpValue};

use crate::collector::{Collector, CollectorFactory};
use crate::error::CollectError;

const ARROW_BASE: &str = ".1.3.6.1.4.1.2467";
const CS_BASE: &str = ".1.3.6.1.4.1.9.9.368";

const RELATIVE_OIDS: &[(&str, &str)] = &[
    // Content
    ("apCntIPAddress", ".1.16.4.1.4"),
    ("apCntIPProtocol", ".1.16.4.1.5"),
    ("apCntPort", ".1.16.4.1.6"),
    ("apCntUrl", ".1.16.4.1.7"),
    ("apCntSticky", ".1.16.4.1.8"),
    ("apCntBalance", ".1.16.4.1.9"),
    ("apCntEnable", ".1.16.4.1.11"),
    ("apCntPersistence", ".1.16.4.1.15"),
    ("apCntContentType", ".1.16.4.1.43"),
    ("apCntPrimarySorryServer", ".1.16.4.1.58"),
    ("apCntSecondSorryServer", ".1.16.4.1.59"),
    // Content/service association
    ("apCntsvcSvcName", ".1.18.2.1.3"),
    // Services
    ("apSvcIPAddress", ".1.15.2.1.3"),
    ("apSvcIPProtocol", ".1.15.2.1.4"),
    ("apSvcPort", ".1.15.2.1.5"),
    ("apSvcKALType", ".1.15.2.1.6"),
    ("apSvcKALFrequency", ".1.15.2.1.7"),
    ("apSvcKALMaxFailure", ".1.15.2.1.8"),
    ("apSvcKALRetryPeriod", ".1.15.2.1.9"),
    ("apSvcKALUri", ".1.15.2.1.10"),
    ("apSvcEnable", ".1.15.2.1.12"),
    ("apSvcWeight", ".1.15.2.1.16"),
    ("apSvcState", ".1.15.2.1.17"),
    ("apSvcKALPort", ".1.15.2.1.31"),
];

fn mode_name(balance: i64) -> &'static str {
    match balance {
        1 => "roundrobin",
        2 => "aca",
        3 => "destip",
        4 => "srcip",
        5 => "domain",
        6 => "url",
        7 => "leastconn",
        8 => "weightedrr",
        9 => "domainhash",
        10 => "urlhash",
        _ => "unknown",
    }
}

fn sticky_name(sticky: i64) -> &'static str {
    match sticky {
        1 => "none",
        2 => "ssl",
        3 => "cookieurl",
        4 => "url",
        5 => "cookies",
        6 => "sticky-srcip-dstport",
        7 => "sticky-srcip",
        8 => "arrowpoint-cookie",
        9 => "wap-msisdn",
        _ => "unknown",
    }
}

fn protocol_name(protocol: i64) -> &'static str {
    match protocol {
        0 => "any",
        6 => "TCP",
        17 => "UDP",
        _ => "unknown",
    }
}

fn service_state(state: i64) -> ServerState {
    match state {
        1 => ServerState::Disabled,
        2 | 5 => ServerState::Down,
        4 => ServerState::Up,
        _ => ServerState::Unknown,
    }
}

fn content_type_name(content: i64) -> &'static str {
    match content {
        1 => "http",
        2 => "ftp-control",
        3 => "realaudio-control",
        4 => "ssl",
        5 => "bypass",
        _ => "unknown",
    }
}

fn kal_name(kal: i64) -> &'static str {
    match kal {
        0 => "none",
        1 => "icmp",
        2 => "http",
        3 => "ftp",
        4 => "tcp",
        5 => "named",
        6 => "script",
        _ => "unknown",
    }
}

pub struct CsCollector {
    proxy: Arc<SnmpProxy>,
    base: Oid,
    kind: &'static str,
    name: String,
    description: String,
}

impl CsCollector {
    fn with_base(
        proxy: Arc<SnmpProxy>,
        base: &str,
        kind: &'static str,
        name: &str,
        description: &str,
    ) -> Self {
        Self {
            proxy,
            base: Oid::parse(base).expect("static OID"),
            kind,
            name: name.to_string(),
            description: description.to_string(),
        }
    }

    fn oid(&self, name: &str, index: &[u64]) -> Oid {
        let relative = RELATIVE_OIDS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, oid)| *oid)
            .unwrap_or_else(|| panic!("OID name {name} not registered"));
        let relative = Oid::parse(relative).expect("static OID table entry");
        self.base.child(relative.components()).child(index)
    }

    fn value(&self, name: &str, index: &[u64]) -> Result<SnmpValue, CollectError> {
        Ok(self.proxy.cache_value(&self.oid(name, index))?)
    }

    fn int(&self, name: &str, index: &[u64]) -> Result<i64, CollectError> {
        self.value(name, index)?
            .as_int()
            .ok_or_else(|| CollectError::Value(name.to_string()))
    }

    async fn cache_or_get(&self, keys: &[(&str, &[u64])]) -> Result<(), CollectError> {
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

    /// Split an OWNER|CONTENT id on the literal separator.
    fn parse_vs(vs: &str) -> Result<(String, String), CollectError> {
        vs.split_once('|')
            .map(|(owner, content)| (owner.to_string(), content.to_string()))
            .ok_or_else(|| CollectError::BadVirtualServer(vs.to_string()))
    }

    async fn process_all(&self) -> Result<LoadBalancer, CollectError> {
        for (name, _) in RELATIVE_OIDS {
            self.proxy.walk(&self.oid(name, &[])).await?;
        }

        let mut lb = LoadBalancer::new(&self.name, self.kind, &self.description);
        let contents: BTreeMap<Oid, SnmpValue> = self
            .proxy
            .cache_table(&self.oid("apCntIPAddress", &[]))
            .unwrap_or_default();
        for suffix in contents.keys() {
            let Some(strings) = string_oid(suffix.components()) else {
                continue;
            };
            let [owner, content] = strings.as_slice() else {
                continue;
            };
            let vs = self.process_vs(owner, content).await?;
            lb.virtualservers.insert(format!("{owner}|{content}"), vs);
        }
        Ok(lb)
    }

    async fn process_vs(&self, owner: &str, content: &str) -> Result<VirtualServer, CollectError> {
        let mut index = oid_string(owner);
        index.extend(oid_string(content));

        let keys: Vec<(&str, &[u64])> = RELATIVE_OIDS
            .iter()
            .filter(|(n, _)| n.starts_with("apCnt") && !n.starts_with("apCntsvc"))
            .map(|(n, _)| (*n, index.as_slice()))
            .collect();
        self.cache_or_get(&keys).await?;

        let ip = self
            .value("apCntIPAddress", &index)?
            .as_ip_text()
            .ok_or_else(|| CollectError::Value(format!("content {owner}|{content} address")))?;
        let port = self.int("apCntPort", &index)?;
        let vip = format!("{ip}:{port}");
        let protocol = protocol_name(self.int("apCntIPProtocol", &index)?);
        let mode = mode_name(self.int("apCntBalance", &index)?);
        let mut vs = VirtualServer::new(content, &vip, protocol, mode);

        if let Ok(url) = self.value("apCntUrl", &index).map(|v| v.as_text()) {
            if let Some(url) = url {
                vs.extra.insert("URL".into(), url);
            }
        }
        vs.extra.insert(
            "sticky".into(),
            sticky_name(self.int("apCntSticky", &index)?).into(),
        );
        vs.extra.insert(
            "virtual server status".into(),
            if self.int("apCntEnable", &index)? != 0 {
                "up"
            } else {
                "down"
            }
            .into(),
        );
        vs.extra.insert(
            "persistence".into(),
            if self.int("apCntPersistence", &index)? != 0 {
                "enabled"
            } else {
                "disabled"
            }
            .into(),
        );
        vs.extra.insert(
            "content type".into(),
            content_type_name(self.int("apCntContentType", &index)?).into(),
        );

        // The services bound to this content.
        let assoc = self.oid("apCntsvcSvcName", &index);
        if self.proxy.cache_table(&assoc).is_err() {
            self.proxy.walk(&assoc).await?;
        }
        let services = self.proxy.cache_table(&assoc).unwrap_or_default();
        for suffix in services.keys() {
            let Some(strings) = string_oid(suffix.components()) else {
                continue;
            };
            let Some(service) = strings.first() else {
                continue;
            };
            let rs = self.process_rs(service, None).await?;
            vs.realservers.insert(service.clone(), rs);
        }

        // Primary and secondary sorry servers.
        for (name, backup) in [
            ("apCntPrimarySorryServer", "primary"),
            ("apCntSecondSorryServer", "second"),
        ] {
            let service = self
                .value(name, &index)
                .ok()
                .and_then(|v| v.as_text())
                .unwrap_or_default();
            if service.is_empty() {
                continue;
            }
            let rs = self.process_rs(&service, Some(backup)).await?;
            vs.realservers.insert(service, rs);
        }

        Ok(vs)
    }

    async fn process_rs(
        &self,
        service: &str,
        backup: Option<&str>,
    ) -> Result<BackendServer, CollectError> {
        let index = oid_string(service);
        let keys: Vec<(&str, &[u64])> = RELATIVE_OIDS
            .iter()
            .filter(|(n, _)| n.starts_with("apSvc"))
            .map(|(n, _)| (*n, index.as_slice()))
            .collect();
        self.cache_or_get(&keys).await?;

        let rip = self
            .value("apSvcIPAddress", &index)?
            .as_ip_text()
            .ok_or_else(|| CollectError::Value(format!("service {service} address")))?;
        let rport = self.int("apSvcPort", &index)? as i32;
        let protocol = protocol_name(self.int("apSvcIPProtocol", &index)?);
        let state = service_state(self.int("apSvcState", &index)?);

        let mut rs = match backup {
            None => {
                let weight = self.int("apSvcWeight", &index)? as i32;
                BackendServer::Real(RealServer::new(
                    service,
                    &rip,
                    Some(rport),
                    protocol,
                    weight,
                    state,
                ))
            }
            Some(position) => {
                let mut sorry =
                    SorryServer::new(service, &rip, Some(rport), protocol, state);
                sorry
                    .extra
                    .insert("backup type".into(), position.to_string());
                BackendServer::Sorry(sorry)
            }
        };

        let extra = rs.extra_mut();
        extra.insert(
            "KAL type".into(),
            kal_name(self.int("apSvcKALType", &index)?).into(),
        );
        for (label, name) in [
            ("KAL frequency", "apSvcKALFrequency"),
            ("KAL max failure", "apSvcKALMaxFailure"),
            ("KAL retry period", "apSvcKALRetryPeriod"),
            ("KAL port", "apSvcKALPort"),
        ] {
            if let Ok(value) = self.int(name, &index) {
                extra.insert(label.into(), value.to_string());
            }
        }
        if let Ok(Some(uri)) = self.value("apSvcKALUri", &index).map(|v| v.as_text()) {
            extra.insert("KAL URI".into(), uri);
        }
        Ok(rs)
    }
}

#[async_trait]
impl Collector for CsCollector {
    fn kind(&self) -> String {
        self.kind.to_string()
    }

    async fn collect(
        &self,
        vs: Option<&str>,
        rs: Option<&str>,
    ) -> Result<Option<Snapshot>, CollectError> {
        match (vs, rs) {
            (None, _) => Ok(Some(Snapshot::LoadBalancer(self.process_all().await?))),
            (Some(vs), None) => {
                let (owner, content) = Self::parse_vs(vs)?;
                Ok(Some(Snapshot::VirtualServer(
                    self.process_vs(&owner, &content).await?,
                )))
            }
            (Some(vs), Some(rs)) => {
                Self::parse_vs(vs)?;
                Ok(Some(Snapshot::Backend(self.process_rs(rs, None).await?)))
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

pub struct CsFactory;

#[async_trait]
impl CollectorFactory for CsFactory {
    fn name(&self) -> &'static str {
        "cisco-cs"
    }

    async fn probe(&self, _proxy: &SnmpProxy, _description: &str, sys_oid: &Oid) -> bool {
        sys_oid.starts_with(&Oid::parse(CS_BASE).expect("static OID"))
    }

    fn build(&self, proxy: Arc<SnmpProxy>, name: &str, description: &str) -> Arc<dyn Collector> {
        Arc::new(CsCollector::with_base(
            proxy, CS_BASE, "Cisco CS", name, description,
        ))
    }
}

pub struct ArrowFactory;

#[async_trait]
impl CollectorFactory for ArrowFactory {
    fn name(&self) -> &'static str {
        "arrowpoint"
    }

    async fn probe(&self, _proxy: &SnmpProxy, _description: &str, sys_oid: &Oid) -> bool {
        sys_oid.starts_with(&Oid::parse(ARROW_BASE).expect("static OID"))
    }

    fn build(&self, proxy: Arc<SnmpProxy>, name: &str, description: &str) -> Arc<dyn Collector> {
        Arc::new(CsCollector::with_base(
            proxy,
            ARROW_BASE,
            "ArrowPoint CSS",
            name,
            description,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lbatlas_snmp::{FakeTransport, SnmpTransport, SnmpVersion};

    fn device() -> (Arc<FakeTransport>, CsCollector) {
        let t = Arc::new(FakeTransport::new());
        t.set_version(SnmpVersion::V2c);
        let proxy = Arc::new(SnmpProxy::new(t.clone(), None, true));
        let collector =
            CsCollector::with_base(proxy, CS_BASE, "Cisco CS", "cs.example.net", "CS 11000");
        (t, collector)
    }

    fn full_oid(collector: &CsCollector, name: &str, index: &[u64]) -> String {
        collector.oid(name, index).to_string()
    }

    fn load(t: &FakeTransport, c: &CsCollector) {
        let mut vs_index = oid_string("web");
        vs_index.extend(oid_string("shop"));
        let svc_index = oid_string("srv1");

        t.insert(
            &full_oid(c, "apCntIPAddress", &vs_index),
            SnmpValue::Str(vec![192, 0, 2, 80]),
        );
        t.insert(&full_oid(c, "apCntPort", &vs_index), SnmpValue::Int(443));
        t.insert(&full_oid(c, "apCntIPProtocol", &vs_index), SnmpValue::Int(6));
        t.insert(&full_oid(c, "apCntBalance", &vs_index), SnmpValue::Int(1));
        t.insert(&full_oid(c, "apCntSticky", &vs_index), SnmpValue::Int(2));
        t.insert(&full_oid(c, "apCntEnable", &vs_index), SnmpValue::Int(1));
        t.insert(&full_oid(c, "apCntPersistence", &vs_index), SnmpValue::Int(0));
        t.insert(&full_oid(c, "apCntContentType", &vs_index), SnmpValue::Int(4));
        t.insert(
            &full_oid(c, "apCntUrl", &vs_index),
            SnmpValue::Str(b"/*".to_vec()),
        );
        t.insert(
            &full_oid(c, "apCntPrimarySorryServer", &vs_index),
            SnmpValue::Str(b"sorry1".to_vec()),
        );

        // Association row: content index ++ service index.
        let mut assoc = vs_index.clone();
        assoc.extend(svc_index.clone());
        t.insert(
            &full_oid(c, "apCntsvcSvcName", &assoc),
            SnmpValue::Str(b"srv1".to_vec()),
        );

        for (service, state) in [("srv1", 4i64), ("sorry1", 2)] {
            let index = oid_string(service);
            t.insert(
                &full_oid(c, "apSvcIPAddress", &index),
                SnmpValue::Str(vec![10, 1, 0, 1]),
            );
            t.insert(&full_oid(c, "apSvcPort", &index), SnmpValue::Int(8443));
            t.insert(&full_oid(c, "apSvcIPProtocol", &index), SnmpValue::Int(6));
            t.insert(&full_oid(c, "apSvcState", &index), SnmpValue::Int(state));
            t.insert(&full_oid(c, "apSvcWeight", &index), SnmpValue::Int(10));
            t.insert(&full_oid(c, "apSvcKALType", &index), SnmpValue::Int(2));
            t.insert(&full_oid(c, "apSvcKALFrequency", &index), SnmpValue::Int(5));
        }
    }

    #[tokio::test]
    async fn full_collect_decodes_string_indices() {
        let (t, collector) = device();
        load(&t, &collector);
        let Some(Snapshot::LoadBalancer(lb)) = collector.collect(None, None).await.unwrap() else {
            panic!("expected a load balancer");
        };
        assert_eq!(lb.kind, "Cisco CS");
        let vs = &lb.virtualservers["web|shop"];
        assert_eq!(vs.name, "shop");
        assert_eq!(vs.vip, "192.0.2.80:443");
        assert_eq!(vs.protocol, "TCP");
        assert_eq!(vs.mode, "roundrobin");
        assert_eq!(vs.extra["sticky"], "ssl");
        assert_eq!(vs.extra["content type"], "ssl");

        let srv = &vs.realservers["srv1"];
        assert!(!srv.is_sorry());
        assert_eq!(srv.state(), ServerState::Up);
        assert_eq!(srv.extra()["KAL type"], "http");

        let sorry = &vs.realservers["sorry1"];
        assert!(sorry.is_sorry());
        assert_eq!(sorry.state(), ServerState::Down);
        assert_eq!(sorry.extra()["backup type"], "primary");
    }

    #[tokio::test]
    async fn vs_ids_split_on_the_literal_separator() {
        assert_eq!(
            CsCollector::parse_vs("a|b").unwrap(),
            ("a".to_string(), "b".to_string())
        );
        // Owners may be empty, but the separator is mandatory.
        assert!(CsCollector::parse_vs("nothing-here").is_err());
    }

    #[tokio::test]
    async fn no_actions_on_this_equipment() {
        let (_, collector) = device();
        assert!(collector.actions(None, None).await.unwrap().is_empty());
        assert_eq!(
            collector
                .execute("enable", &[], Some("a|b"), Some("srv1"))
                .await
                .unwrap(),
            None
        );
    }
}
