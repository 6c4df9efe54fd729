// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

//! Vendor collectors and the device dispatcher.
//!
//! Each collector is a small state machine mapping one vendor MIB onto the
//! normalised load-balancer tree, driven through the caching SNMP proxy.
//! The dispatcher probes the registered factories against sysObjectID and
//! sysDescr, dedups in-flight refreshes and hands fresh trees to the
//! bitemporal writer.

mod alteon;
mod base;
mod collector;
mod cs;
mod dispatcher;
mod error;
mod f5ltm;
mod haproxy;
mod keepalived;
mod multi;

use std::sync::Arc;

pub use collector::{Collector, CollectorFactory};
pub use dispatcher::{Dispatcher, RefreshHandle};
pub use error::CollectError;

pub use alteon::AlteonFactory;
pub use cs::{ArrowFactory, CsFactory};
pub use f5ltm::F5LtmFactory;
pub use haproxy::HaProxyFactory;
pub use keepalived::KeepalivedFactory;
pub use multi::MultiCollector;

/// Every factory the dispatcher probes, in no particular order.
pub fn factories() -> Vec<Arc<dyn CollectorFactory>> {
    vec![
        Arc::new(AlteonFactory),
        Arc::new(CsFactory),
        Arc::new(ArrowFactory),
        Arc::new(F5LtmFactory),
        Arc::new(KeepalivedFactory),
        Arc::new(HaProxyFactory),
    ]
}
