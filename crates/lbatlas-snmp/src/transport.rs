// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

//! The transport trait separating the proxy and the collectors from the
//! actual `snmp2` session, plus an in-memory implementation used by tests.

use std::net::SocketAddr;

use async_trait::async_trait;
use parking_lot::Mutex;
use snmp2::AsyncSession;

use crate::error::{SnmpError, SnmpResult};
use crate::oid::Oid;
use crate::value::SnmpValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnmpVersion {
    V1,
    V2c,
}

/// One SNMP agent, reachable with one community. Probing starts at v1;
/// the dispatcher upgrades to v2c once a collector is selected.
#[async_trait]
pub trait SnmpTransport: Send + Sync {
    async fn get(&self, oids: &[Oid]) -> SnmpResult<Vec<(Oid, SnmpValue)>>;
    async fn getnext(&self, oid: &Oid) -> SnmpResult<Vec<(Oid, SnmpValue)>>;
    async fn getbulk(&self, oid: &Oid, max_repetitions: u32) -> SnmpResult<Vec<(Oid, SnmpValue)>>;
    async fn set(&self, oid: &Oid, value: SnmpValue) -> SnmpResult<()>;
    fn set_version(&self, version: SnmpVersion);
    fn version(&self) -> SnmpVersion;
}

type Session = Option<(SnmpVersion, AsyncSession)>;

/// Production transport over `snmp2::AsyncSession`. The UDP session is
/// created on first use and recreated when the version switches, so a
/// transport carrying the write community opens no socket until the first
/// SET.
pub struct Snmp2Transport {
    target: SocketAddr,
    community: String,
    version: Mutex<SnmpVersion>,
    session: tokio::sync::Mutex<Session>,
}

impl Snmp2Transport {
    pub fn new(target: SocketAddr, community: &str) -> Self {
        Self {
            target,
            community: community.to_string(),
            version: Mutex::new(SnmpVersion::V1),
            session: tokio::sync::Mutex::new(None),
        }
    }

    fn err(e: impl std::fmt::Display) -> SnmpError {
        SnmpError::Transport(e.to_string())
    }

    fn to_wire(oid: &Oid) -> SnmpResult<snmp2::Oid<'static>> {
        snmp2::Oid::from(oid.components()).map_err(|_| SnmpError::BadOid(oid.to_string()))
    }

    fn from_pdu(pdu: snmp2::Pdu<'_>) -> Vec<(Oid, SnmpValue)> {
        pdu.varbinds
            .map(|(oid, value)| {
                let components: Vec<u64> = match oid.iter() {
                    Some(iter) => iter.collect(),
                    None => Vec::new(),
                };
                (Oid::new(components), SnmpValue::from(&value))
            })
            .collect()
    }

    async fn ensure(&self, guard: &mut Session) -> SnmpResult<()> {
        let want = self.version();
        if !matches!(guard.as_ref(), Some((v, _)) if *v == want) {
            let session = match want {
                SnmpVersion::V1 => {
                    AsyncSession::new_v1(self.target, self.community.as_bytes(), 0).await
                }
                SnmpVersion::V2c => {
                    AsyncSession::new_v2c(self.target, self.community.as_bytes(), 0).await
                }
            }
            .map_err(Self::err)?;
            *guard = Some((want, session));
        }
        Ok(())
    }
}

#[async_trait]
impl SnmpTransport for Snmp2Transport {
    async fn get(&self, oids: &[Oid]) -> SnmpResult<Vec<(Oid, SnmpValue)>> {
        let mut guard = self.session.lock().await;
        self.ensure(&mut guard).await?;
        let (_, session) = guard.as_mut().expect("session initialised");
        let mut pairs = Vec::with_capacity(oids.len());
        for oid in oids {
            let wire = Self::to_wire(oid)?;
            let pdu = session.get(&wire).await.map_err(Self::err)?;
            pairs.extend(Self::from_pdu(pdu));
        }
        Ok(pairs)
    }

    async fn getnext(&self, oid: &Oid) -> SnmpResult<Vec<(Oid, SnmpValue)>> {
        let mut guard = self.session.lock().await;
        self.ensure(&mut guard).await?;
        let (_, session) = guard.as_mut().expect("session initialised");
        let wire = Self::to_wire(oid)?;
        let pdu = session.getnext(&wire).await.map_err(Self::err)?;
        Ok(Self::from_pdu(pdu))
    }

    async fn getbulk(&self, oid: &Oid, max_repetitions: u32) -> SnmpResult<Vec<(Oid, SnmpValue)>> {
        let mut guard = self.session.lock().await;
        self.ensure(&mut guard).await?;
        let (_, session) = guard.as_mut().expect("session initialised");
        let wire = Self::to_wire(oid)?;
        let pdu = session
            .getbulk(&[&wire], 0, max_repetitions)
            .await
            .map_err(Self::err)?;
        Ok(Self::from_pdu(pdu))
    }

    async fn set(&self, oid: &Oid, value: SnmpValue) -> SnmpResult<()> {
        let wire_value = match value {
            SnmpValue::Int(i) => snmp2::Value::Integer(i),
            other => {
                return Err(SnmpError::Transport(format!(
                    "unsupported SET value {other:?}"
                )))
            }
        };
        let mut guard = self.session.lock().await;
        self.ensure(&mut guard).await?;
        let (_, session) = guard.as_mut().expect("session initialised");
        let wire = Self::to_wire(oid)?;
        session
            .set(&[(&wire, wire_value)])
            .await
            .map_err(Self::err)?;
        Ok(())
    }

    fn set_version(&self, version: SnmpVersion) {
        *self.version.lock() = version;
    }

    fn version(&self) -> SnmpVersion {
        *self.version.lock()
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    //! A recording in-memory agent. GET behaves per version: v1 answers a
    //! missing OID with a transport error, v2c with a noSuchInstance
    //! varbind, which is exactly the asymmetry the probing and
    //! cache-or-get paths rely on.

    use std::collections::BTreeMap;
    use std::ops::Bound;

    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    pub enum Op {
        Get(Oid),
        GetNext(Oid),
        GetBulk(Oid),
        Set(Oid, SnmpValue),
    }

    #[derive(Default)]
    pub struct FakeTransport {
        objects: Mutex<BTreeMap<Oid, SnmpValue>>,
        version: Mutex<Option<SnmpVersion>>,
        ops: Mutex<Vec<Op>>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, oid: &str, value: SnmpValue) {
            let oid = Oid::parse(oid).expect("literal OID");
            self.objects.lock().insert(oid, value);
        }

        pub fn insert_under(&self, base: &str, index: &[u64], value: SnmpValue) {
            let oid = Oid::parse(base).expect("literal OID").child(index);
            self.objects.lock().insert(oid, value);
        }

        pub fn value(&self, oid: &Oid) -> Option<SnmpValue> {
            self.objects.lock().get(oid).cloned()
        }

        pub fn ops(&self) -> Vec<Op> {
            self.ops.lock().clone()
        }

        pub fn sets(&self) -> Vec<(Oid, SnmpValue)> {
            self.ops
                .lock()
                .iter()
                .filter_map(|op| match op {
                    Op::Set(oid, value) => Some((oid.clone(), value.clone())),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl SnmpTransport for FakeTransport {
        async fn get(&self, oids: &[Oid]) -> SnmpResult<Vec<(Oid, SnmpValue)>> {
            self.ops
                .lock()
                .extend(oids.iter().map(|oid| Op::Get(oid.clone())));
            let objects = self.objects.lock();
            let mut pairs = Vec::new();
            for oid in oids {
                match objects.get(oid) {
                    Some(value) => pairs.push((oid.clone(), value.clone())),
                    None if self.version() == SnmpVersion::V1 => {
                        return Err(SnmpError::Transport(format!("noSuchName: {oid}")));
                    }
                    None => pairs.push((oid.clone(), SnmpValue::NoSuchInstance)),
                }
            }
            Ok(pairs)
        }

        async fn getnext(&self, oid: &Oid) -> SnmpResult<Vec<(Oid, SnmpValue)>> {
            self.ops.lock().push(Op::GetNext(oid.clone()));
            let objects = self.objects.lock();
            match objects
                .range::<Oid, _>((Bound::Excluded(oid.clone()), Bound::Unbounded))
                .next()
            {
                Some((k, v)) => Ok(vec![(k.clone(), v.clone())]),
                None if self.version() == SnmpVersion::V1 => {
                    Err(SnmpError::Transport("endOfMibView".into()))
                }
                None => Ok(vec![(oid.clone(), SnmpValue::EndOfMibView)]),
            }
        }

        async fn getbulk(
            &self,
            oid: &Oid,
            max_repetitions: u32,
        ) -> SnmpResult<Vec<(Oid, SnmpValue)>> {
            self.ops.lock().push(Op::GetBulk(oid.clone()));
            let objects = self.objects.lock();
            Ok(objects
                .range::<Oid, _>((Bound::Excluded(oid.clone()), Bound::Unbounded))
                .take(max_repetitions as usize)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect())
        }

        async fn set(&self, oid: &Oid, value: SnmpValue) -> SnmpResult<()> {
            self.ops.lock().push(Op::Set(oid.clone(), value.clone()));
            self.objects.lock().insert(oid.clone(), value);
            Ok(())
        }

        fn set_version(&self, version: SnmpVersion) {
            *self.version.lock() = Some(version);
        }

        fn version(&self) -> SnmpVersion {
            self.version.lock().unwrap_or(SnmpVersion::V1)
        }
    }
}
