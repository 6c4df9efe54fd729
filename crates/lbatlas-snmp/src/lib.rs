// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

//! SNMP plumbing shared by every collector: an owned OID type, an owned
//! value type, a narrow transport trait over the `snmp2` session, and the
//! caching proxy that drives GET/GETBULK/WALK/SET against one device.

mod error;
mod helpers;
mod oid;
mod proxy;
mod transport;
mod value;

pub use error::{SnmpError, SnmpResult};
pub use helpers::{bitmap, ip_from_bytes, oid_string, string_oid};
pub use oid::Oid;
pub use proxy::{CacheLookup, SnmpProxy};
pub use transport::{Snmp2Transport, SnmpTransport, SnmpVersion};
pub use value::SnmpValue;

#[cfg(any(test, feature = "testing"))]
pub use transport::testing::FakeTransport;

/// sysDescr.0 and sysObjectID.0, probed before any vendor plugin runs.
pub const SYS_DESCR: &str = ".1.3.6.1.2.1.1.1.0";
pub const SYS_OBJECT_ID: &str = ".1.3.6.1.2.1.1.2.0";
