// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

//! Collector for Nortel/Radware Alteon application switches (AAS 2xxx and
//! 3xxx series, ALTEON-CHEETAH-LAYER4-MIB).
//!
//! A logical virtual server is the triple (virtServer, virtService,
//! group); group membership is a bitmap whose positions key the
//! slbCurCfgRealServer tables. Backup servers and backup groups can hang
//! off a real server or a group; both are flattened into sorry servers.

use std::sync::Arc;

use async_trait::async_trait;
use lbatlas_model::{
    Actions, BackendServer, LoadBalancer, RealServer, ServerState, Snapshot, SorryServer,
    VirtualServer,
};
use lbatlas_snmp::{bitmap, Oid, SnmpProxy, SnmpValue};
use regex::Regex;

use crate::base::Mib;
use crate::collector::{Collector, CollectorFactory};
use crate::error::CollectError;

const KIND: &str = "AAS";

const OIDS: &[(&str, &str)] = &[
    // Virtual server
    ("slbCurCfgVirtServerVname", ".1.3.6.1.4.1.1872.2.5.4.1.1.4.2.1.10"),
    ("slbCurCfgVirtServerState", ".1.3.6.1.4.1.1872.2.5.4.1.1.4.2.1.4"),
    ("slbCurCfgVirtServerIpAddress", ".1.3.6.1.4.1.1872.2.5.4.1.1.4.2.1.2"),
    // Virtual service
    ("slbCurCfgVirtServiceVirtPort", ".1.3.6.1.4.1.1872.2.5.4.1.1.4.5.1.3"),
    ("slbCurCfgVirtServiceRealGroup", ".1.3.6.1.4.1.1872.2.5.4.1.1.4.5.1.4"),
    ("slbCurCfgVirtServiceRealPort", ".1.3.6.1.4.1.1872.2.5.4.1.1.4.5.1.5"),
    ("slbCurCfgVirtServiceHname", ".1.3.6.1.4.1.1872.2.5.4.1.1.4.5.1.7"),
    ("slbCurCfgVirtServiceUDPBalance", ".1.3.6.1.4.1.1872.2.5.4.1.1.4.5.1.6"),
    // Groups
    ("slbCurCfgGroupMetric", ".1.3.6.1.4.1.1872.2.5.4.1.1.3.3.1.3"),
    ("slbCurCfgGroupName", ".1.3.6.1.4.1.1872.2.5.4.1.1.3.3.1.8"),
    ("slbCurCfgGroupHealthCheckLayer", ".1.3.6.1.4.1.1872.2.5.4.1.1.3.3.1.7"),
    ("slbCurCfgGroupRealServers", ".1.3.6.1.4.1.1872.2.5.4.1.1.3.3.1.2"),
    // Real server
    ("slbCurCfgRealServerIpAddr", ".1.3.6.1.4.1.1872.2.5.4.1.1.2.2.1.2"),
    ("slbCurCfgRealServerWeight", ".1.3.6.1.4.1.1872.2.5.4.1.1.2.2.1.3"),
    ("slbCurCfgRealServerPingInterval", ".1.3.6.1.4.1.1872.2.5.4.1.1.2.2.1.7"),
    ("slbCurCfgRealServerFailRetry", ".1.3.6.1.4.1.1872.2.5.4.1.1.2.2.1.8"),
    ("slbCurCfgRealServerSuccRetry", ".1.3.6.1.4.1.1872.2.5.4.1.1.2.2.1.9"),
    ("slbCurCfgRealServerState", ".1.3.6.1.4.1.1872.2.5.4.1.1.2.2.1.10"),
    ("slbCurCfgRealServerName", ".1.3.6.1.4.1.1872.2.5.4.1.1.2.2.1.12"),
    ("slbCurCfgGroupRealServerState", ".1.3.6.1.4.1.1872.2.5.4.1.1.3.5.1.3"),
    ("slbVirtServicesInfoState", ".1.3.6.1.4.1.1872.2.5.4.3.4.1.6"),
    ("slbRealServerInfoState", ".1.3.6.1.4.1.1872.2.5.4.3.1.1.7"),
    // Sorry servers
    ("slbCurCfgGroupBackupGroup", ".1.3.6.1.4.1.1872.2.5.4.1.1.3.3.1.5"),
    ("slbCurCfgGroupBackupServer", ".1.3.6.1.4.1.1872.2.5.4.1.1.3.3.1.4"),
    ("slbCurCfgRealServerBackUp", ".1.3.6.1.4.1.1872.2.5.4.1.1.2.2.1.6"),
];

// SET targets; never walked, so they live outside the collection table.
const NEW_CFG_GROUP_REAL_SERVER_STATE: &str = ".1.3.6.1.4.1.1872.2.5.4.1.2.3.5.1.3";
const OPER_GROUP_REAL_SERVER_STATE: &str = ".1.3.6.1.4.1.1872.2.5.4.4.3.1.3";
const AG_APPLY_PENDING: &str = ".1.3.6.1.4.1.1872.2.5.1.1.1.0";
const AG_APPLY_CONFIG: &str = ".1.3.6.1.4.1.1872.2.5.1.1.2.0";

fn mode_name(metric: i64) -> &'static str {
    match metric {
        1 => "round robin",
        2 => "least connections",
        3 => "min misses",
        4 => "hash",
        5 => "response",
        6 => "bandwidth",
        7 => "phash",
        _ => "unknown",
    }
}

fn admin_state(state: i64) -> &'static str {
    match state {
        2 => "enabled",
        3 => "disabled",
        _ => "unknown",
    }
}

fn server_state(status: i64) -> ServerState {
    match status {
        1 | 4 => ServerState::Disabled,
        2 => ServerState::Up,
        3 => ServerState::Down,
        _ => ServerState::Unknown,
    }
}

fn healthcheck_name(check: i64) -> String {
    let name = match check {
        1 => "icmp",
        2 => "tcp",
        3 => "http",
        44 => "httphead",
        4 => "dns",
        5 => "smtp",
        6 => "pop3",
        7 => "nntp",
        8 => "ftp",
        9 => "imap",
        10 => "radius",
        11 => "sslh",
        28 => "link",
        29 => "wsp",
        30 => "wtls",
        31 => "ldap",
        32 => "udpdns",
        33 => "arp",
        34 => "snmp1",
        35 => "snmp2",
        36 => "snmp3",
        37 => "snmp4",
        38 => "snmp5",
        39 => "radiusacs",
        40 => "tftp",
        41 => "wtp",
        42 => "rtsp",
        43 => "sipping",
        45 => "sipoptions",
        46 => "wts",
        47 => "dhcp",
        48 => "radiusaa",
        // Scripted checks come in two ranges.
        12..=27 => return format!("script{}", check - 11),
        116..=163 => return format!("script{}", check - 99),
        _ => "unknown",
    };
    name.to_string()
}

pub struct AlteonCollector {
    mib: Mib,
    name: String,
    description: String,
}

impl AlteonCollector {
    pub fn new(proxy: Arc<SnmpProxy>, name: &str, description: &str) -> Self {
        Self {
            mib: Mib::new(proxy, OIDS),
            name: name.to_string(),
            description: description.to_string(),
        }
    }

    fn parse_vs(vs: &str) -> Result<(u64, u64, u64), CollectError> {
        let re = Regex::new(r"^v(\d+)s(\d+)g(\d+)$").expect("static regex");
        let caps = re
            .captures(vs)
            .ok_or_else(|| CollectError::BadVirtualServer(vs.to_string()))?;
        let field = |i: usize| {
            caps[i]
                .parse::<u64>()
                .map_err(|_| CollectError::BadVirtualServer(vs.to_string()))
        };
        Ok((field(1)?, field(2)?, field(3)?))
    }

    fn parse_rs(rs: &str) -> Result<u64, CollectError> {
        let re = Regex::new(r"^[rb](\d+)$").expect("static regex");
        let caps = re
            .captures(rs)
            .ok_or_else(|| CollectError::BadRealServer(rs.to_string()))?;
        caps[1]
            .parse::<u64>()
            .map_err(|_| CollectError::BadRealServer(rs.to_string()))
    }

    async fn process_all(&self) -> Result<LoadBalancer, CollectError> {
        self.mib.walk_all().await?;

        let mut lb = LoadBalancer::new(&self.name, KIND, &self.description);
        let servers: Vec<u64> = self
            .mib
            .table("slbCurCfgVirtServerIpAddress", &[])
            .keys()
            .filter_map(Oid::first)
            .collect();
        for v in servers {
            let services: Vec<u64> = self
                .mib
                .table("slbCurCfgVirtServiceRealGroup", &[v])
                .keys()
                .filter_map(Oid::first)
                .collect();
            for s in services {
                let g = self.mib.int("slbCurCfgVirtServiceRealGroup", &[v, s])? as u64;
                let vs = self.process_vs(v, s, g).await?;
                lb.virtualservers.insert(format!("v{v}s{s}g{g}"), vs);
            }
        }
        Ok(lb)
    }

    async fn process_vs(&self, v: u64, s: u64, g: u64) -> Result<VirtualServer, CollectError> {
        self.mib
            .cache_or_get(&[
                ("slbCurCfgVirtServerVname", vec![v]),
                ("slbCurCfgVirtServiceHname", vec![v, s]),
                ("slbCurCfgGroupName", vec![g]),
                ("slbCurCfgVirtServerIpAddress", vec![v]),
                ("slbCurCfgVirtServiceVirtPort", vec![v, s]),
                ("slbCurCfgVirtServiceUDPBalance", vec![v, s]),
                ("slbCurCfgVirtServiceRealPort", vec![v, s]),
                ("slbCurCfgGroupMetric", vec![g]),
                ("slbCurCfgVirtServerState", vec![v]),
                ("slbCurCfgGroupHealthCheckLayer", vec![g]),
                ("slbCurCfgGroupBackupServer", vec![g]),
                ("slbCurCfgGroupBackupGroup", vec![g]),
                ("slbCurCfgGroupRealServers", vec![g]),
            ])
            .await?;

        let index = format!("v{v}s{s}g{g}");
        let mut names = Vec::new();
        for key in [
            ("slbCurCfgVirtServerVname", vec![v]),
            ("slbCurCfgVirtServiceHname", vec![v, s]),
            ("slbCurCfgGroupName", vec![g]),
        ] {
            if let Ok(part) = self.mib.text(key.0, &key.1) {
                if !part.is_empty() {
                    names.push(part);
                }
            }
        }
        let name = if names.is_empty() {
            index.clone()
        } else {
            names.join(" ~ ")
        };

        let ip = self
            .mib
            .value("slbCurCfgVirtServerIpAddress", &[v])?
            .as_ip_text()
            .ok_or_else(|| CollectError::Value(format!("virtual server {v} address")))?;
        let port = self.mib.int("slbCurCfgVirtServiceVirtPort", &[v, s])?;
        let vip = format!("{ip}:{port}");
        let protocol = if self.mib.int("slbCurCfgVirtServiceUDPBalance", &[v, s])? != 3 {
            "UDP"
        } else {
            "TCP"
        };
        let mode = mode_name(self.mib.int("slbCurCfgGroupMetric", &[g])?);

        let mut vs = VirtualServer::new(&name, &vip, protocol, mode);
        vs.extra.insert(
            "virtual server status".into(),
            admin_state(self.mib.int("slbCurCfgVirtServerState", &[v])?).into(),
        );
        vs.extra.insert(
            "healthcheck".into(),
            healthcheck_name(self.mib.int("slbCurCfgGroupHealthCheckLayer", &[g])?),
        );

        // Group members, then their attached backups.
        let members = self
            .mib
            .value("slbCurCfgGroupRealServers", &[g])
            .ok()
            .and_then(|v| v.as_bytes().map(<[u8]>::to_vec))
            .unwrap_or_default();
        for r in bitmap(&members) {
            let rs = self.process_rs(v, s, r, false).await?;
            vs.realservers.insert(format!("r{r}"), rs);

            self.mib
                .cache_or_get(&[("slbCurCfgRealServerBackUp", vec![r])])
                .await?;
            let backup = self
                .mib
                .int("slbCurCfgRealServerBackUp", &[r])
                .unwrap_or(0) as u64;
            if backup != 0 {
                let rs = self.process_rs(v, s, backup, true).await?;
                vs.realservers.insert(format!("b{backup}"), rs);
            }
        }

        // Backup server and backup group of the group itself.
        let backup = self.mib.int("slbCurCfgGroupBackupServer", &[g]).unwrap_or(0) as u64;
        if backup != 0 {
            let rs = self.process_rs(v, s, backup, true).await?;
            vs.realservers.insert(format!("b{backup}"), rs);
        }
        let backup_group = self.mib.int("slbCurCfgGroupBackupGroup", &[g]).unwrap_or(0) as u64;
        if backup_group != 0 {
            let oid = self.mib.oid("slbCurCfgGroupRealServers", &[backup_group]);
            self.mib.proxy().get(&[oid]).await?;
            let members = self
                .mib
                .value("slbCurCfgGroupRealServers", &[backup_group])
                .ok()
                .and_then(|v| v.as_bytes().map(<[u8]>::to_vec))
                .unwrap_or_default();
            for r in bitmap(&members) {
                let rs = self.process_rs(v, s, r, true).await?;
                vs.realservers.insert(format!("b{r}"), rs);
            }
        }

        Ok(vs)
    }

    async fn process_rs(
        &self,
        v: u64,
        s: u64,
        r: u64,
        backup: bool,
    ) -> Result<BackendServer, CollectError> {
        self.mib
            .cache_or_get(&[
                ("slbCurCfgRealServerIpAddr", vec![r]),
                ("slbCurCfgRealServerName", vec![r]),
                ("slbCurCfgVirtServiceRealPort", vec![v, s]),
                ("slbCurCfgVirtServiceUDPBalance", vec![v, s]),
                ("slbCurCfgRealServerWeight", vec![r]),
                ("slbVirtServicesInfoState", vec![v, s, r]),
                ("slbRealServerInfoState", vec![r]),
                ("slbCurCfgRealServerPingInterval", vec![r]),
                ("slbCurCfgRealServerFailRetry", vec![r]),
                ("slbCurCfgRealServerSuccRetry", vec![r]),
            ])
            .await?;

        let rip = self
            .mib
            .value("slbCurCfgRealServerIpAddr", &[r])?
            .as_ip_text()
            .ok_or_else(|| CollectError::Value(format!("real server {r} address")))?;
        let mut name = self.mib.text("slbCurCfgRealServerName", &[r]).unwrap_or_default();
        if name.is_empty() {
            name = rip.clone();
        }
        let rport = self.mib.int("slbCurCfgVirtServiceRealPort", &[v, s])? as i32;
        let protocol = if self.mib.int("slbCurCfgVirtServiceUDPBalance", &[v, s])? != 3 {
            "UDP"
        } else {
            "TCP"
        };

        let mut rs = if !backup {
            let weight = self.mib.int("slbCurCfgRealServerWeight", &[r])? as i32;
            // No per-service state means the server is disabled there.
            let state = match self.mib.int("slbVirtServicesInfoState", &[v, s, r]) {
                Ok(status) => server_state(status),
                Err(_) => ServerState::Disabled,
            };
            BackendServer::Real(RealServer::new(
                &name,
                &rip,
                Some(rport),
                protocol,
                weight,
                state,
            ))
        } else {
            let state = self
                .mib
                .int("slbRealServerInfoState", &[r])
                .map(server_state)
                .unwrap_or(ServerState::Unknown);
            BackendServer::Sorry(SorryServer::new(&name, &rip, Some(rport), protocol, state))
        };

        let extra = rs.extra_mut();
        for (label, oid) in [
            ("ping interval", "slbCurCfgRealServerPingInterval"),
            ("fail retry", "slbCurCfgRealServerFailRetry"),
            ("success retry", "slbCurCfgRealServerSuccRetry"),
        ] {
            if let Ok(value) = self.mib.int(oid, &[r]) {
                extra.insert(label.into(), value.to_string());
            }
        }
        Ok(rs)
    }

    /// Two-step commit: after a configuration SET the switch wants an
    /// explicit apply. When an apply is pending (2) and the apply engine
    /// reports complete (4) it must be reset to idle (2) before requesting
    /// the apply (1).
    async fn apply(&self) -> Result<(), CollectError> {
        let pending_oid = Oid::parse(AG_APPLY_PENDING).expect("static OID");
        let config_oid = Oid::parse(AG_APPLY_CONFIG).expect("static OID");
        let got = self
            .mib
            .proxy()
            .get(&[pending_oid.clone(), config_oid.clone()])
            .await?;
        let pending = got
            .get(&pending_oid)
            .and_then(SnmpValue::as_int)
            .unwrap_or(0);
        let config = got.get(&config_oid).and_then(SnmpValue::as_int).unwrap_or(0);
        if pending == 2 {
            if config == 4 {
                self.mib.proxy().set(&config_oid, SnmpValue::Int(2)).await?;
            }
            self.mib.proxy().set(&config_oid, SnmpValue::Int(1)).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Collector for AlteonCollector {
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
                let (v, s, g) = Self::parse_vs(vs)?;
                Ok(Some(Snapshot::VirtualServer(
                    self.process_vs(v, s, g).await?,
                )))
            }
            (Some(vs), Some(rs)) => {
                let (v, s, _) = Self::parse_vs(vs)?;
                let backup = rs.starts_with('b');
                let r = Self::parse_rs(rs)?;
                Ok(Some(Snapshot::Backend(
                    self.process_rs(v, s, r, backup).await?,
                )))
            }
        }
    }

    async fn actions(&self, vs: Option<&str>, rs: Option<&str>) -> Result<Actions, CollectError> {
        let (Some(vs), Some(rs)) = (vs, rs) else {
            return Ok(Actions::new());
        };
        Self::parse_vs(vs)?;
        Self::parse_rs(rs)?;
        Ok(Actions::from([
            ("enable".to_string(), "Enable".to_string()),
            ("disable".to_string(), "Disable".to_string()),
            ("operenable".to_string(), "Enable (oper)".to_string()),
            ("operdisable".to_string(), "Disable (oper)".to_string()),
        ]))
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
        let (_, _, g) = Self::parse_vs(vs)?;
        let r = Self::parse_rs(rs)?;
        match action {
            // Configuration state needs the two-step apply afterwards.
            "enable" | "disable" => {
                let state = if action == "enable" { 1 } else { 2 };
                let oid = Oid::parse(NEW_CFG_GROUP_REAL_SERVER_STATE)
                    .expect("static OID")
                    .child(&[g, r]);
                self.mib.proxy().set(&oid, SnmpValue::Int(state)).await?;
                self.apply().await?;
                Ok(Some(()))
            }
            // Operational state applies immediately.
            "operenable" | "operdisable" => {
                let state = if action == "operenable" { 1 } else { 2 };
                let oid = Oid::parse(OPER_GROUP_REAL_SERVER_STATE)
                    .expect("static OID")
                    .child(&[g, r]);
                self.mib.proxy().set(&oid, SnmpValue::Int(state)).await?;
                Ok(Some(()))
            }
            _ => Ok(None),
        }
    }
}

pub struct AlteonFactory;

#[async_trait]
impl CollectorFactory for AlteonFactory {
    fn name(&self) -> &'static str {
        "alteon"
    }

    async fn probe(&self, _proxy: &SnmpProxy, _description: &str, sys_oid: &Oid) -> bool {
        sys_oid.starts_with(&Oid::parse(".1.3.6.1.4.1.1872.1.13").expect("static OID"))
    }

    fn build(&self, proxy: Arc<SnmpProxy>, name: &str, description: &str) -> Arc<dyn Collector> {
        Arc::new(AlteonCollector::new(proxy, name, description))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lbatlas_snmp::{FakeTransport, SnmpVersion, SnmpTransport};

    fn oid_of(name: &str) -> &'static str {
        OIDS.iter()
            .find(|(n, _)| *n == name)
            .map(|(_, o)| *o)
            .unwrap()
    }

    fn device() -> (Arc<FakeTransport>, AlteonCollector) {
        let t = Arc::new(FakeTransport::new());
        t.set_version(SnmpVersion::V2c);
        let proxy = Arc::new(SnmpProxy::new(t.clone(), Some(t.clone() as Arc<dyn SnmpTransport>), true));
        let collector = AlteonCollector::new(proxy, "lb1.example.net", "Alteon AAS 2208");
        (t, collector)
    }

    fn load_group3(t: &FakeTransport) {
        // Virtual server 1, service 1 -> group 3.
        t.insert_under(
            oid_of("slbCurCfgVirtServerIpAddress"),
            &[1],
            SnmpValue::Str(vec![192, 0, 2, 1]),
        );
        t.insert_under(oid_of("slbCurCfgVirtServerVname"), &[1], SnmpValue::Str(b"www".to_vec()));
        t.insert_under(oid_of("slbCurCfgVirtServerState"), &[1], SnmpValue::Int(2));
        t.insert_under(oid_of("slbCurCfgVirtServiceRealGroup"), &[1, 1], SnmpValue::Int(3));
        t.insert_under(oid_of("slbCurCfgVirtServiceVirtPort"), &[1, 1], SnmpValue::Int(80));
        t.insert_under(oid_of("slbCurCfgVirtServiceRealPort"), &[1, 1], SnmpValue::Int(8080));
        t.insert_under(oid_of("slbCurCfgVirtServiceUDPBalance"), &[1, 1], SnmpValue::Int(3));
        t.insert_under(oid_of("slbCurCfgGroupMetric"), &[3], SnmpValue::Int(1));
        t.insert_under(oid_of("slbCurCfgGroupHealthCheckLayer"), &[3], SnmpValue::Int(3));
        // Bitmap 0x03: LSB bits 0 and 1 are positions 8 and 7.
        t.insert_under(oid_of("slbCurCfgGroupRealServers"), &[3], SnmpValue::Str(vec![0x03]));
        for r in [7u64, 8, 11] {
            t.insert_under(
                oid_of("slbCurCfgRealServerIpAddr"),
                &[r],
                SnmpValue::Str(vec![10, 0, 0, r as u8]),
            );
            t.insert_under(
                oid_of("slbCurCfgRealServerName"),
                &[r],
                SnmpValue::Str(format!("web{r}").into_bytes()),
            );
            t.insert_under(oid_of("slbCurCfgRealServerWeight"), &[r], SnmpValue::Int(1));
        }
        t.insert_under(oid_of("slbVirtServicesInfoState"), &[1, 1, 7], SnmpValue::Int(2));
        // No per-service state for r8: it must come out disabled.
        t.insert_under(oid_of("slbCurCfgRealServerBackUp"), &[7], SnmpValue::Int(0));
        t.insert_under(oid_of("slbCurCfgRealServerBackUp"), &[8], SnmpValue::Int(11));
        t.insert_under(oid_of("slbRealServerInfoState"), &[11], SnmpValue::Int(3));
    }

    #[tokio::test]
    async fn full_collect_flattens_backups() {
        let (t, collector) = device();
        load_group3(&t);
        let snapshot = collector.collect(None, None).await.unwrap().unwrap();
        let Snapshot::LoadBalancer(lb) = snapshot else {
            panic!("expected a load balancer");
        };
        assert_eq!(lb.kind, "AAS");
        let vs = &lb.virtualservers["v1s1g3"];
        assert_eq!(vs.vip, "192.0.2.1:80");
        assert_eq!(vs.protocol, "TCP");
        assert_eq!(vs.mode, "round robin");
        assert_eq!(vs.extra["healthcheck"], "http");
        let ids: Vec<&str> = vs.realservers.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["b11", "r7", "r8"]);
        assert_eq!(vs.realservers["r7"].state(), ServerState::Up);
        assert_eq!(vs.realservers["r8"].state(), ServerState::Disabled);
        let backup = &vs.realservers["b11"];
        assert!(backup.is_sorry());
        assert_eq!(backup.state(), ServerState::Down);
    }

    #[tokio::test]
    async fn scoped_collect_returns_subtrees() {
        let (t, collector) = device();
        load_group3(&t);
        let vs = collector.collect(Some("v1s1g3"), None).await.unwrap().unwrap();
        assert!(matches!(vs, Snapshot::VirtualServer(_)));
        let rs = collector
            .collect(Some("v1s1g3"), Some("r7"))
            .await
            .unwrap()
            .unwrap();
        let Snapshot::Backend(BackendServer::Real(rs)) = rs else {
            panic!("expected a real server");
        };
        assert_eq!(rs.rip, "10.0.0.7");
        assert_eq!(rs.rport, Some(8080));
    }

    #[tokio::test]
    async fn malformed_ids_are_input_errors() {
        let (_, collector) = device();
        let err = collector.collect(Some("nonsense"), None).await.unwrap_err();
        assert!(err.is_input_error());
        let err = collector
            .collect(Some("v1s1g3"), Some("x9"))
            .await
            .unwrap_err();
        assert!(err.is_input_error());
    }

    #[tokio::test]
    async fn enable_runs_the_apply_protocol() {
        let (t, collector) = device();
        t.insert(AG_APPLY_PENDING, SnmpValue::Int(2));
        t.insert(AG_APPLY_CONFIG, SnmpValue::Int(4));
        let done = collector
            .execute("enable", &[], Some("v0s0g4"), Some("r5"))
            .await
            .unwrap();
        assert_eq!(done, Some(()));
        let new_state = Oid::parse(NEW_CFG_GROUP_REAL_SERVER_STATE)
            .unwrap()
            .child(&[4, 5]);
        let apply = Oid::parse(AG_APPLY_CONFIG).unwrap();
        assert_eq!(
            t.sets(),
            vec![
                (new_state, SnmpValue::Int(1)),
                (apply.clone(), SnmpValue::Int(2)),
                (apply, SnmpValue::Int(1)),
            ]
        );
    }

    #[tokio::test]
    async fn unknown_action_is_none() {
        let (_, collector) = device();
        let done = collector
            .execute("frobnicate", &[], Some("v0s0g4"), Some("r5"))
            .await
            .unwrap();
        assert_eq!(done, None);
    }

    #[tokio::test]
    async fn actions_need_a_real_server() {
        let (_, collector) = device();
        assert!(collector.actions(None, None).await.unwrap().is_empty());
        let actions = collector
            .actions(Some("v1s1g3"), Some("r7"))
            .await
            .unwrap();
        assert!(actions.contains_key("enable"));
        assert!(actions.contains_key("operdisable"));
    }
}
