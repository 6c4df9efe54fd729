// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

use std::net::{IpAddr, Ipv4Addr};

use crate::oid::Oid;

/// An owned SNMP value, detached from the response buffer at the transport
/// boundary so the cache and the collectors never borrow from a PDU.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SnmpValue {
    Int(i64),
    Uint(u64),
    Str(Vec<u8>),
    Oid(Oid),
    Ip(Ipv4Addr),
    Bool(bool),
    Null,
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl SnmpValue {
    /// Whether a GET/GETBULK varbind carries no actual value. Such entries
    /// are never cached.
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            SnmpValue::NoSuchObject | SnmpValue::NoSuchInstance | SnmpValue::EndOfMibView
        )
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SnmpValue::Int(i) => Some(*i),
            SnmpValue::Uint(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            SnmpValue::Int(i) => u64::try_from(*i).ok(),
            SnmpValue::Uint(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            SnmpValue::Str(b) => Some(b),
            _ => None,
        }
    }

    /// Octet strings as lossy UTF-8 text.
    pub fn as_text(&self) -> Option<String> {
        match self {
            SnmpValue::Str(b) => Some(String::from_utf8_lossy(b).into_owned()),
            _ => None,
        }
    }

    pub fn as_oid(&self) -> Option<&Oid> {
        match self {
            SnmpValue::Oid(oid) => Some(oid),
            _ => None,
        }
    }

    /// The dotted text form of an address carried either as an SNMP
    /// IpAddress or as a 4/16-byte octet string.
    pub fn as_ip_text(&self) -> Option<String> {
        match self {
            SnmpValue::Ip(ip) => Some(ip.to_string()),
            SnmpValue::Str(b) => crate::helpers::ip_from_bytes(b).map(|ip| ip.to_string()),
            _ => None,
        }
    }

    pub fn as_ip(&self) -> Option<IpAddr> {
        match self {
            SnmpValue::Ip(ip) => Some(IpAddr::V4(*ip)),
            SnmpValue::Str(b) => crate::helpers::ip_from_bytes(b),
            _ => None,
        }
    }
}

impl From<&snmp2::Value<'_>> for SnmpValue {
    fn from(value: &snmp2::Value<'_>) -> Self {
        use snmp2::Value;
        match value {
            Value::Integer(i) => SnmpValue::Int(*i),
            Value::Counter32(c) => SnmpValue::Uint(u64::from(*c)),
            Value::Unsigned32(u) => SnmpValue::Uint(u64::from(*u)),
            Value::Timeticks(t) => SnmpValue::Uint(u64::from(*t)),
            Value::Counter64(c) => SnmpValue::Uint(*c),
            Value::OctetString(b) => SnmpValue::Str(b.to_vec()),
            Value::Opaque(b) => SnmpValue::Str(b.to_vec()),
            Value::ObjectIdentifier(oid) => match oid.iter() {
                Some(iter) => SnmpValue::Oid(Oid::new(iter.collect())),
                None => SnmpValue::Null,
            },
            Value::IpAddress(octets) => SnmpValue::Ip(Ipv4Addr::from(*octets)),
            Value::Boolean(b) => SnmpValue::Bool(*b),
            Value::EndOfMibView => SnmpValue::EndOfMibView,
            Value::NoSuchObject => SnmpValue::NoSuchObject,
            Value::NoSuchInstance => SnmpValue::NoSuchInstance,
            _ => SnmpValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(SnmpValue::Int(3).as_int(), Some(3));
        assert_eq!(SnmpValue::Uint(7).as_int(), Some(7));
        assert_eq!(
            SnmpValue::Str(b"web1".to_vec()).as_text().as_deref(),
            Some("web1")
        );
        assert_eq!(
            SnmpValue::Str(vec![192, 0, 2, 10]).as_ip_text().as_deref(),
            Some("192.0.2.10")
        );
        assert!(SnmpValue::NoSuchInstance.is_absent());
        assert!(!SnmpValue::Null.is_absent());
    }
}
