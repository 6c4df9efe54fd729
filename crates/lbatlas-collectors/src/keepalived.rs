// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

//! Collector for Keepalived (KEEPALIVED-MIB, any host running keepalived
//! with the SNMP subagent).
//!
//! Virtual servers come in three types: a firewall mark, a plain address,
//! or a group whose VIP is synthesised by joining the members (addresses,
//! ranges and fwmarks) with " + ". IPv4 and IPv6 are both accepted; v6
//! addresses are bracketed inside textual VIPs. Enabling and disabling a
//! real server is a weight change on realServerWeight, which is also how
//! a weight 0 member reads back as disabled.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use lbatlas_model::{
    Actions, BackendServer, LoadBalancer, RealServer, ServerState, Snapshot, SorryServer,
    VirtualServer,
};
use lbatlas_snmp::{Oid, SnmpProxy, SnmpValue};
use regex::Regex;
use tracing::warn;

use crate::base::Mib;
use crate::collector::{Collector, CollectorFactory};
use crate::error::CollectError;

const KIND: &str = "KeepAlived";

/// keepalived's own subtree; probed to recognise the subagent.
const PROBE_OID: &str = ".1.3.6.1.4.1.9586.100.5.1.1.0";

const OIDS: &[(&str, &str)] = &[
    // Groups
    ("virtualServerGroupName", ".1.3.6.1.4.1.9586.100.5.3.1.1.2"),
    ("virtualServerGroupMemberType", ".1.3.6.1.4.1.9586.100.5.3.2.1.2"),
    ("virtualServerGroupMemberFwMark", ".1.3.6.1.4.1.9586.100.5.3.2.1.3"),
    ("virtualServerGroupMemberAddrType", ".1.3.6.1.4.1.9586.100.5.3.2.1.4"),
    ("virtualServerGroupMemberAddress", ".1.3.6.1.4.1.9586.100.5.3.2.1.5"),
    ("virtualServerGroupMemberAddr1", ".1.3.6.1.4.1.9586.100.5.3.2.1.6"),
    ("virtualServerGroupMemberAddr2", ".1.3.6.1.4.1.9586.100.5.3.2.1.7"),
    ("virtualServerGroupMemberPort", ".1.3.6.1.4.1.9586.100.5.3.2.1.8"),
    // Virtual server
    ("virtualServerType", ".1.3.6.1.4.1.9586.100.5.3.3.1.2"),
    ("virtualServerNameOfGroup", ".1.3.6.1.4.1.9586.100.5.3.3.1.3"),
    ("virtualServerFwMark", ".1.3.6.1.4.1.9586.100.5.3.3.1.4"),
    ("virtualServerAddrType", ".1.3.6.1.4.1.9586.100.5.3.3.1.5"),
    ("virtualServerAddress", ".1.3.6.1.4.1.9586.100.5.3.3.1.6"),
    ("virtualServerPort", ".1.3.6.1.4.1.9586.100.5.3.3.1.7"),
    ("virtualServerProtocol", ".1.3.6.1.4.1.9586.100.5.3.3.1.8"),
    ("virtualServerLoadBalancingAlgo", ".1.3.6.1.4.1.9586.100.5.3.3.1.9"),
    ("virtualServerLoadBalancingKind", ".1.3.6.1.4.1.9586.100.5.3.3.1.10"),
    ("virtualServerStatus", ".1.3.6.1.4.1.9586.100.5.3.3.1.11"),
    ("virtualServerVirtualHost", ".1.3.6.1.4.1.9586.100.5.3.3.1.12"),
    ("virtualServerPersist", ".1.3.6.1.4.1.9586.100.5.3.3.1.13"),
    ("virtualServerPersistTimeout", ".1.3.6.1.4.1.9586.100.5.3.3.1.14"),
    ("virtualServerPersistGranularity", ".1.3.6.1.4.1.9586.100.5.3.3.1.15"),
    ("virtualServerDelayLoop", ".1.3.6.1.4.1.9586.100.5.3.3.1.16"),
    ("virtualServerRealServersTotal", ".1.3.6.1.4.1.9586.100.5.3.3.1.20"),
    ("virtualServerRealServersUp", ".1.3.6.1.4.1.9586.100.5.3.3.1.21"),
    ("virtualServerQuorum", ".1.3.6.1.4.1.9586.100.5.3.3.1.22"),
    ("virtualServerQuorumStatus", ".1.3.6.1.4.1.9586.100.5.3.3.1.23"),
    ("virtualServerQuorumUp", ".1.3.6.1.4.1.9586.100.5.3.3.1.24"),
    ("virtualServerQuorumDown", ".1.3.6.1.4.1.9586.100.5.3.3.1.25"),
    ("virtualServerHysteresis", ".1.3.6.1.4.1.9586.100.5.3.3.1.26"),
    // Real server
    ("realServerType", ".1.3.6.1.4.1.9586.100.5.3.4.1.2"),
    ("realServerAddrType", ".1.3.6.1.4.1.9586.100.5.3.4.1.3"),
    ("realServerAddress", ".1.3.6.1.4.1.9586.100.5.3.4.1.4"),
    ("realServerPort", ".1.3.6.1.4.1.9586.100.5.3.4.1.5"),
    ("realServerStatus", ".1.3.6.1.4.1.9586.100.5.3.4.1.6"),
    ("realServerWeight", ".1.3.6.1.4.1.9586.100.5.3.4.1.7"),
    ("realServerUpperConnectionLimit", ".1.3.6.1.4.1.9586.100.5.3.4.1.8"),
    ("realServerLowerConnectionLimit", ".1.3.6.1.4.1.9586.100.5.3.4.1.9"),
    ("realServerActionWhenDown", ".1.3.6.1.4.1.9586.100.5.3.4.1.10"),
    ("realServerNotifyUp", ".1.3.6.1.4.1.9586.100.5.3.4.1.11"),
    ("realServerNotifyDown", ".1.3.6.1.4.1.9586.100.5.3.4.1.12"),
    ("realServerFailedChecks", ".1.3.6.1.4.1.9586.100.5.3.4.1.13"),
];

fn mode_name(algo: i64) -> &'static str {
    match algo {
        1 => "rr",
        2 => "wrr",
        3 => "lc",
        4 => "wlc",
        5 => "lblc",
        6 => "lblcr",
        7 => "dh",
        8 => "sh",
        9 => "sed",
        10 => "nq",
        _ => "unknown",
    }
}

fn method_name(kind: i64) -> &'static str {
    match kind {
        1 => "nat",
        2 => "dr",
        3 => "tun",
        _ => "unknown",
    }
}

fn protocol_name(protocol: i64) -> &'static str {
    match protocol {
        1 => "TCP",
        2 => "UDP",
        _ => "unknown",
    }
}

/// Bracket v6 addresses when they appear inside an `addr:port` VIP.
fn vip_text(ip: &IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{v6}]"),
    }
}

pub struct KeepalivedCollector {
    mib: Mib,
    name: String,
    description: String,
}

impl KeepalivedCollector {
    pub fn new(proxy: Arc<SnmpProxy>, name: &str, description: &str) -> Self {
        Self {
            mib: Mib::new(proxy, OIDS),
            name: name.to_string(),
            description: description.to_string(),
        }
    }

    fn parse_vs(vs: &str) -> Result<u64, CollectError> {
        let re = Regex::new(r"^v(\d+)$").expect("static regex");
        re.captures(vs)
            .and_then(|caps| caps[1].parse::<u64>().ok())
            .ok_or_else(|| CollectError::BadVirtualServer(vs.to_string()))
    }

    fn parse_rs(rs: &str) -> Result<u64, CollectError> {
        let re = Regex::new(r"^r(\d+)$").expect("static regex");
        re.captures(rs)
            .and_then(|caps| caps[1].parse::<u64>().ok())
            .ok_or_else(|| CollectError::BadRealServer(rs.to_string()))
    }

    async fn process_all(&self) -> Result<LoadBalancer, CollectError> {
        self.mib.walk_all().await?;

        let mut lb = LoadBalancer::new(&self.name, KIND, &self.description);
        let servers: Vec<u64> = self
            .mib
            .table("virtualServerType", &[])
            .keys()
            .filter_map(Oid::first)
            .collect();
        for v in servers {
            if let Some(vs) = self.process_vs(v).await? {
                lb.virtualservers.insert(format!("v{v}"), vs);
            }
        }
        Ok(lb)
    }

    /// Synthesise the composite VIP of a virtual server group by joining
    /// its members.
    async fn group_vip(&self, group_name: &str) -> Result<Vec<String>, CollectError> {
        if self.mib.table("virtualServerGroupName", &[]).is_empty() {
            self.mib.walk("virtualServerGroupName").await?;
        }
        let groups = self.mib.table("virtualServerGroupName", &[]);
        let mut names = Vec::new();
        for (suffix, value) in &groups {
            if value.as_text().as_deref() != Some(group_name) {
                continue;
            }
            let Some(g) = suffix.first() else { continue };
            if self.mib.table("virtualServerGroupMemberType", &[g]).is_empty() {
                for (name, _) in OIDS {
                    if name.starts_with("virtualServerGroupMember") {
                        self.mib.walk(name).await?;
                    }
                }
            }
            let members: Vec<u64> = self
                .mib
                .table("virtualServerGroupMemberType", &[g])
                .keys()
                .filter_map(Oid::first)
                .collect();
            for m in members {
                let port = self.mib.int("virtualServerGroupMemberPort", &[g, m]).unwrap_or(0);
                match self.mib.int("virtualServerGroupMemberType", &[g, m])? {
                    // fwmark
                    1 => {
                        let mark = self.mib.int("virtualServerGroupMemberFwMark", &[g, m])?;
                        names.push(format!("mark{mark}:{port}"));
                    }
                    // plain address
                    2 => {
                        let Some(ip) = self
                            .mib
                            .value("virtualServerGroupMemberAddress", &[g, m])?
                            .as_ip()
                        else {
                            continue;
                        };
                        names.push(format!("{}:{port}", vip_text(&ip)));
                    }
                    // address range
                    3 => {
                        let first = self
                            .mib
                            .value("virtualServerGroupMemberAddr1", &[g, m])?
                            .as_ip();
                        let last = self
                            .mib
                            .value("virtualServerGroupMemberAddr2", &[g, m])?
                            .as_ip();
                        let (Some(first), Some(last)) = (first, last) else {
                            continue;
                        };
                        names.push(format!(
                            "{}-{}:{port}",
                            vip_text(&first),
                            vip_text(&last)
                        ));
                    }
                    _ => continue,
                }
            }
            break;
        }
        Ok(names)
    }

    async fn process_vs(&self, v: u64) -> Result<Option<VirtualServer>, CollectError> {
        let keys: Vec<(&str, Vec<u64>)> = OIDS
            .iter()
            .filter(|(n, _)| {
                n.starts_with("virtualServer") && !n.starts_with("virtualServerGroupMember")
                    && *n != "virtualServerGroupName"
            })
            .map(|(n, _)| (*n, vec![v]))
            .collect();
        self.mib.cache_or_get(&keys).await?;

        let (name, vip) = match self.mib.int("virtualServerType", &[v])? {
            // fwmark
            1 => {
                let mark = self.mib.int("virtualServerFwMark", &[v])?;
                (format!("fwmark {mark}"), format!("mark{mark}:0"))
            }
            // plain address, v4 or v6
            2 => {
                let Some(ip) = self.mib.value("virtualServerAddress", &[v])?.as_ip() else {
                    warn!(vs = v, "cannot read virtual server address, skip it");
                    return Ok(None);
                };
                let port = self.mib.int("virtualServerPort", &[v])?;
                (format!("IP {ip}"), format!("{}:{port}", vip_text(&ip)))
            }
            // group
            3 => {
                let group = self.mib.text("virtualServerNameOfGroup", &[v])?;
                let names = self.group_vip(&group).await?;
                if names.is_empty() {
                    warn!(group = %group, "unable to build a VIP for virtual server group, skip it");
                    return Ok(None);
                }
                (group, names.join(" + "))
            }
            other => {
                warn!(vs = v, kind = other, "unknown virtual server type, skip it");
                return Ok(None);
            }
        };

        let protocol = protocol_name(self.mib.int("virtualServerProtocol", &[v])?);
        let mode = mode_name(self.mib.int("virtualServerLoadBalancingAlgo", &[v])?);
        let mut vs = VirtualServer::new(&name, &vip, protocol, mode);

        vs.extra.insert(
            "packet-forwarding method".into(),
            method_name(self.mib.int("virtualServerLoadBalancingKind", &[v])?).into(),
        );
        vs.extra.insert(
            "virtual server status".into(),
            if self.mib.int("virtualServerStatus", &[v])? == 1 {
                "up"
            } else {
                "down"
            }
            .into(),
        );
        for (label, oid) in [
            ("virtual host", "virtualServerVirtualHost"),
            ("quorum up command", "virtualServerQuorumUp"),
            ("quorum down command", "virtualServerQuorumDown"),
        ] {
            if let Ok(value) = self.mib.text(oid, &[v]) {
                if !value.is_empty() {
                    vs.extra.insert(label.into(), value);
                }
            }
        }
        for (label, oid) in [
            ("persist timeout", "virtualServerPersistTimeout"),
            ("persist granularity", "virtualServerPersistGranularity"),
            ("check delay", "virtualServerDelayLoop"),
            ("quorum", "virtualServerQuorum"),
            ("quorum hysterisis", "virtualServerHysteresis"),
        ] {
            if let Ok(value) = self.mib.int(oid, &[v]) {
                vs.extra.insert(label.into(), value.to_string());
            }
        }
        vs.extra.insert(
            "persistence".into(),
            if self.mib.int("virtualServerPersist", &[v])? == 1 {
                "enabled"
            } else {
                "disabled"
            }
            .into(),
        );
        vs.extra.insert(
            "quorum status".into(),
            if self.mib.int("virtualServerQuorumStatus", &[v])? == 1 {
                "met"
            } else {
                "lost"
            }
            .into(),
        );
        vs.extra.insert(
            "real servers".into(),
            format!(
                "{} up / {} total",
                self.mib.int("virtualServerRealServersUp", &[v]).unwrap_or(0),
                self.mib.int("virtualServerRealServersTotal", &[v]).unwrap_or(0),
            ),
        );

        if self.mib.table("realServerType", &[v]).is_empty() {
            self.mib.walk_under("realServerType", &[v]).await?;
        }
        let reals: Vec<u64> = self
            .mib
            .table("realServerType", &[v])
            .keys()
            .filter_map(Oid::first)
            .collect();
        for r in reals {
            if let Some(rs) = self.process_rs(v, r).await? {
                vs.realservers.insert(format!("r{r}"), rs);
            }
        }

        Ok(Some(vs))
    }

    async fn process_rs(&self, v: u64, r: u64) -> Result<Option<BackendServer>, CollectError> {
        let keys: Vec<(&str, Vec<u64>)> = OIDS
            .iter()
            .filter(|(n, _)| n.starts_with("realServer"))
            .map(|(n, _)| (*n, vec![v, r]))
            .collect();
        self.mib.cache_or_get(&keys).await?;

        let Some(ip) = self.mib.value("realServerAddress", &[v, r])?.as_ip() else {
            warn!(vs = v, rs = r, "cannot read real server address, skip it");
            return Ok(None);
        };
        let rip = ip.to_string();
        let rport = self.mib.int("realServerPort", &[v, r])? as i32;
        let protocol = protocol_name(
            self.mib
                .int("virtualServerProtocol", &[v])
                .unwrap_or_default(),
        );

        if self.mib.int("realServerType", &[v, r])? == 1 {
            let weight = self.mib.int("realServerWeight", &[v, r])? as i32;
            // Weight 0 is how keepalived expresses "administratively out".
            let state = if weight == 0 {
                ServerState::Disabled
            } else if self.mib.int("realServerStatus", &[v, r])? == 1 {
                ServerState::Up
            } else {
                ServerState::Down
            };
            let mut rs = RealServer::new(&rip, &rip, Some(rport), protocol, weight, state);
            for (label, oid) in [
                ("upper connection limit", "realServerUpperConnectionLimit"),
                ("lower connection limit", "realServerLowerConnectionLimit"),
                ("failed checks", "realServerFailedChecks"),
            ] {
                if let Ok(value) = self.mib.int(oid, &[v, r]) {
                    rs.extra.insert(label.into(), value.to_string());
                }
            }
            for (label, oid) in [
                ("notify up command", "realServerNotifyUp"),
                ("notify down command", "realServerNotifyDown"),
            ] {
                if let Ok(value) = self.mib.text(oid, &[v, r]) {
                    if !value.is_empty() {
                        rs.extra.insert(label.into(), value);
                    }
                }
            }
            rs.extra.insert(
                "on fail".into(),
                if self.mib.int("realServerActionWhenDown", &[v, r]).unwrap_or(1) == 1 {
                    "remove"
                } else {
                    "inhibit"
                }
                .into(),
            );
            rs.actions = Self::real_server_actions();
            Ok(Some(BackendServer::Real(rs)))
        } else {
            // Sorry server: no weight, not much information either.
            Ok(Some(BackendServer::Sorry(SorryServer::new(
                &rip,
                &rip,
                Some(rport),
                protocol,
                ServerState::Up,
            ))))
        }
    }

    fn real_server_actions() -> Actions {
        let mut actions = Actions::from([
            ("enable".to_string(), "Enable".to_string()),
            ("disable".to_string(), "Disable".to_string()),
            (
                "enableall".to_string(),
                "Enable this IP on all virtual servers".to_string(),
            ),
            (
                "disableall".to_string(),
                "Disable this IP on all virtual servers".to_string(),
            ),
        ]);
        for w in 1..=5 {
            actions.insert(format!("enable/{w}"), format!("Enable with weight {w}"));
        }
        actions
    }

    async fn set_weight(&self, v: u64, r: u64, weight: i64) -> Result<(), CollectError> {
        let oid = self.mib.oid("realServerWeight", &[v, r]);
        self.mib.proxy().set(&oid, SnmpValue::Int(weight)).await?;
        Ok(())
    }

    /// Apply a weight to every real server sharing this one's address,
    /// across all virtual servers.
    async fn set_weight_everywhere(
        &self,
        v: u64,
        r: u64,
        weight: i64,
    ) -> Result<(), CollectError> {
        self.mib
            .cache_or_get(&[("realServerAddress", vec![v, r])])
            .await?;
        let me = self.mib.value("realServerAddress", &[v, r])?;
        let everyone = self.mib.proxy().walk(&self.mib.base("realServerAddress")).await?;
        let base = self.mib.base("realServerAddress");
        for (oid, value) in everyone {
            if value != me {
                continue;
            }
            let Some(suffix) = oid.suffix(&base) else { continue };
            let &[ov, or] = suffix.components() else { continue };
            self.set_weight(ov, or, weight).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Collector for KeepalivedCollector {
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
                let v = Self::parse_vs(vs)?;
                Ok(self.process_vs(v).await?.map(Snapshot::VirtualServer))
            }
            (Some(vs), Some(rs)) => {
                let v = Self::parse_vs(vs)?;
                let r = Self::parse_rs(rs)?;
                Ok(self.process_rs(v, r).await?.map(Snapshot::Backend))
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
        let (Some(vs), Some(rs)) = (vs, rs) else {
            return Ok(None);
        };
        let v = Self::parse_vs(vs)?;
        let r = Self::parse_rs(rs)?;
        match action {
            "enable" => {
                let weight = match args.first() {
                    None => 1,
                    Some(arg) => match arg.parse::<i64>() {
                        Ok(w) if (1..=5).contains(&w) => w,
                        _ => return Ok(None),
                    },
                };
                self.set_weight(v, r, weight).await?;
                Ok(Some(()))
            }
            "disable" => {
                self.set_weight(v, r, 0).await?;
                Ok(Some(()))
            }
            "enableall" => {
                self.set_weight_everywhere(v, r, 1).await?;
                Ok(Some(()))
            }
            "disableall" => {
                self.set_weight_everywhere(v, r, 0).await?;
                Ok(Some(()))
            }
            _ => Ok(None),
        }
    }
}

pub struct KeepalivedFactory;

#[async_trait]
impl CollectorFactory for KeepalivedFactory {
    fn name(&self) -> &'static str {
        "keepalived"
    }

    fn composable(&self) -> bool {
        true
    }

    async fn probe(&self, proxy: &SnmpProxy, _description: &str, _sys_oid: &Oid) -> bool {
        let oid = Oid::parse(PROBE_OID).expect("static OID");
        proxy.get(&[oid]).await.map(|r| !r.is_empty()).unwrap_or(false)
    }

    fn build(&self, proxy: Arc<SnmpProxy>, name: &str, description: &str) -> Arc<dyn Collector> {
        Arc::new(KeepalivedCollector::new(proxy, name, description))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lbatlas_snmp::{FakeTransport, SnmpTransport, SnmpVersion};

    fn oid_of(name: &str) -> &'static str {
        OIDS.iter().find(|(n, _)| *n == name).map(|(_, o)| *o).unwrap()
    }

    fn device() -> (Arc<FakeTransport>, KeepalivedCollector) {
        let t = Arc::new(FakeTransport::new());
        t.set_version(SnmpVersion::V2c);
        let proxy = Arc::new(SnmpProxy::new(t.clone(), Some(t.clone() as Arc<dyn SnmpTransport>), true));
        let collector = KeepalivedCollector::new(proxy, "lvs.example.net", "Linux lvs1");
        (t, collector)
    }

    fn load_vs(t: &FakeTransport, v: u64) {
        t.insert_under(oid_of("virtualServerType"), &[v], SnmpValue::Int(2));
        t.insert_under(
            oid_of("virtualServerAddrType"),
            &[v],
            SnmpValue::Int(1),
        );
        t.insert_under(
            oid_of("virtualServerAddress"),
            &[v],
            SnmpValue::Str(vec![192, 0, 2, 25]),
        );
        t.insert_under(oid_of("virtualServerPort"), &[v], SnmpValue::Int(25));
        t.insert_under(oid_of("virtualServerProtocol"), &[v], SnmpValue::Int(1));
        t.insert_under(oid_of("virtualServerLoadBalancingAlgo"), &[v], SnmpValue::Int(2));
        t.insert_under(oid_of("virtualServerLoadBalancingKind"), &[v], SnmpValue::Int(2));
        t.insert_under(oid_of("virtualServerStatus"), &[v], SnmpValue::Int(1));
        t.insert_under(oid_of("virtualServerPersist"), &[v], SnmpValue::Int(2));
        t.insert_under(oid_of("virtualServerQuorumStatus"), &[v], SnmpValue::Int(1));
        t.insert_under(oid_of("virtualServerRealServersTotal"), &[v], SnmpValue::Int(2));
        t.insert_under(oid_of("virtualServerRealServersUp"), &[v], SnmpValue::Int(1));
    }

    fn load_rs(t: &FakeTransport, v: u64, r: u64, ip: [u8; 4], weight: i64, status: i64) {
        t.insert_under(oid_of("realServerType"), &[v, r], SnmpValue::Int(1));
        t.insert_under(oid_of("realServerAddrType"), &[v, r], SnmpValue::Int(1));
        t.insert_under(
            oid_of("realServerAddress"),
            &[v, r],
            SnmpValue::Str(ip.to_vec()),
        );
        t.insert_under(oid_of("realServerPort"), &[v, r], SnmpValue::Int(25));
        t.insert_under(oid_of("realServerStatus"), &[v, r], SnmpValue::Int(status));
        t.insert_under(oid_of("realServerWeight"), &[v, r], SnmpValue::Int(weight));
    }

    #[tokio::test]
    async fn weight_zero_reads_back_disabled() {
        let (t, collector) = device();
        load_vs(&t, 2);
        // Up according to the checker, but weight 0.
        load_rs(&t, 2, 3, [10, 0, 0, 3], 0, 1);
        let Some(Snapshot::Backend(rs)) = collector.collect(Some("v2"), Some("r3")).await.unwrap()
        else {
            panic!("expected a real server");
        };
        assert_eq!(rs.state(), ServerState::Disabled);
    }

    #[tokio::test]
    async fn full_collect_builds_tree() {
        let (t, collector) = device();
        load_vs(&t, 1);
        load_rs(&t, 1, 1, [10, 0, 0, 1], 1, 1);
        load_rs(&t, 1, 2, [10, 0, 0, 2], 1, 2);
        let Some(Snapshot::LoadBalancer(lb)) = collector.collect(None, None).await.unwrap() else {
            panic!("expected a load balancer");
        };
        assert_eq!(lb.kind, "KeepAlived");
        let vs = &lb.virtualservers["v1"];
        assert_eq!(vs.vip, "192.0.2.25:25");
        assert_eq!(vs.mode, "wrr");
        assert_eq!(vs.extra["packet-forwarding method"], "dr");
        assert_eq!(vs.extra["real servers"], "1 up / 2 total");
        assert_eq!(vs.realservers["r1"].state(), ServerState::Up);
        assert_eq!(vs.realservers["r2"].state(), ServerState::Down);
        assert!(vs.realservers["r1"].actions().contains_key("enable/3"));
    }

    #[tokio::test]
    async fn group_vip_joins_members() {
        let (t, collector) = device();
        t.insert_under(oid_of("virtualServerType"), &[4], SnmpValue::Int(3));
        t.insert_under(
            oid_of("virtualServerNameOfGroup"),
            &[4],
            SnmpValue::Str(b"mailfarm".to_vec()),
        );
        t.insert_under(oid_of("virtualServerProtocol"), &[4], SnmpValue::Int(1));
        t.insert_under(oid_of("virtualServerLoadBalancingAlgo"), &[4], SnmpValue::Int(1));
        t.insert_under(oid_of("virtualServerLoadBalancingKind"), &[4], SnmpValue::Int(1));
        t.insert_under(oid_of("virtualServerStatus"), &[4], SnmpValue::Int(1));
        t.insert_under(oid_of("virtualServerPersist"), &[4], SnmpValue::Int(2));
        t.insert_under(oid_of("virtualServerQuorumStatus"), &[4], SnmpValue::Int(1));
        t.insert_under(
            oid_of("virtualServerGroupName"),
            &[9],
            SnmpValue::Str(b"mailfarm".to_vec()),
        );
        // Member 1: address, member 2: fwmark, member 3: range.
        t.insert_under(oid_of("virtualServerGroupMemberType"), &[9, 1], SnmpValue::Int(2));
        t.insert_under(
            oid_of("virtualServerGroupMemberAddress"),
            &[9, 1],
            SnmpValue::Str(vec![192, 0, 2, 1]),
        );
        t.insert_under(oid_of("virtualServerGroupMemberPort"), &[9, 1], SnmpValue::Int(25));
        t.insert_under(oid_of("virtualServerGroupMemberType"), &[9, 2], SnmpValue::Int(1));
        t.insert_under(oid_of("virtualServerGroupMemberFwMark"), &[9, 2], SnmpValue::Int(7));
        t.insert_under(oid_of("virtualServerGroupMemberPort"), &[9, 2], SnmpValue::Int(0));
        t.insert_under(oid_of("virtualServerGroupMemberType"), &[9, 3], SnmpValue::Int(3));
        t.insert_under(
            oid_of("virtualServerGroupMemberAddr1"),
            &[9, 3],
            SnmpValue::Str(vec![192, 0, 2, 10]),
        );
        t.insert_under(
            oid_of("virtualServerGroupMemberAddr2"),
            &[9, 3],
            SnmpValue::Str(vec![192, 0, 2, 20]),
        );
        t.insert_under(oid_of("virtualServerGroupMemberPort"), &[9, 3], SnmpValue::Int(25));

        let Some(Snapshot::VirtualServer(vs)) =
            collector.collect(Some("v4"), None).await.unwrap()
        else {
            panic!("expected a virtual server");
        };
        assert_eq!(vs.name, "mailfarm");
        assert_eq!(vs.vip, "192.0.2.1:25 + mark7:0 + 192.0.2.10-192.0.2.20:25");
    }

    #[tokio::test]
    async fn enable_with_weight_sets_it() {
        let (t, collector) = device();
        load_vs(&t, 2);
        load_rs(&t, 2, 3, [10, 0, 0, 3], 0, 1);
        let done = collector
            .execute("enable", &["3".to_string()], Some("v2"), Some("r3"))
            .await
            .unwrap();
        assert_eq!(done, Some(()));
        let target = Oid::parse(oid_of("realServerWeight")).unwrap().child(&[2, 3]);
        assert_eq!(t.sets(), vec![(target, SnmpValue::Int(3))]);
        // Weights outside 1..5 are not an action.
        let bad = collector
            .execute("enable", &["9".to_string()], Some("v2"), Some("r3"))
            .await
            .unwrap();
        assert_eq!(bad, None);
    }

    #[tokio::test]
    async fn disableall_matches_by_address() {
        let (t, collector) = device();
        load_vs(&t, 1);
        load_vs(&t, 2);
        load_rs(&t, 1, 1, [10, 0, 0, 9], 1, 1);
        load_rs(&t, 2, 4, [10, 0, 0, 9], 1, 1);
        load_rs(&t, 2, 5, [10, 0, 0, 8], 1, 1);
        let done = collector
            .execute("disableall", &[], Some("v1"), Some("r1"))
            .await
            .unwrap();
        assert_eq!(done, Some(()));
        let weight = |v: u64, r: u64| {
            Oid::parse(oid_of("realServerWeight")).unwrap().child(&[v, r])
        };
        assert_eq!(
            t.sets(),
            vec![
                (weight(1, 1), SnmpValue::Int(0)),
                (weight(2, 4), SnmpValue::Int(0)),
            ]
        );
    }

    #[tokio::test]
    async fn probe_checks_the_subagent() {
        let (t, _) = device();
        let proxy = SnmpProxy::new(t.clone(), None, true);
        assert!(!KeepalivedFactory.probe(&proxy, "", &Oid::new(vec![1, 3])).await);
        t.insert(PROBE_OID, SnmpValue::Str(b"keepalived".to_vec()));
        assert!(KeepalivedFactory.probe(&proxy, "", &Oid::new(vec![1, 3])).await);
    }
}
