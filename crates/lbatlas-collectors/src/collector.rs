// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use async_trait::async_trait;
use lbatlas_model::{Actions, Snapshot};
use lbatlas_snmp::{Oid, SnmpProxy};

use crate::error::CollectError;

/// One vendor state machine bound to one device.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Vendor tag ("AAS", "F5 LTM", ...). The Multi collector joins the
    /// tags of its parts with " + ".
    fn kind(&self) -> String;

    /// Collect the whole device (`vs` and `rs` both `None`), one virtual
    /// server, or one real server. `Ok(None)` means the entity could not
    /// be rendered (skipped address families and the like); the writer
    /// treats it as a no-op.
    async fn collect(
        &self,
        vs: Option<&str>,
        rs: Option<&str>,
    ) -> Result<Option<Snapshot>, CollectError>;

    /// Actions available for the given scope. Collectors which embed their
    /// actions inside the returned tree report none here.
    async fn actions(&self, _vs: Option<&str>, _rs: Option<&str>) -> Result<Actions, CollectError> {
        Ok(Actions::new())
    }

    /// Execute an action. `Ok(None)` means the action is not defined for
    /// this scope; the HTTP boundary turns that into 404.
    async fn execute(
        &self,
        action: &str,
        args: &[String],
        vs: Option<&str>,
        rs: Option<&str>,
    ) -> Result<Option<()>, CollectError>;
}

/// Builds a collector for devices it recognises.
#[async_trait]
pub trait CollectorFactory: Send + Sync {
    fn name(&self) -> &'static str;

    /// Host-subagent factories (Keepalived, HAProxy) legitimately coexist
    /// on one device; when several of them claim a probe the dispatcher
    /// aggregates them instead of failing AmbiguousPlugin.
    fn composable(&self) -> bool {
        false
    }

    /// Whether this factory can handle the device, judged from sysDescr
    /// and sysObjectID, possibly with extra probing through the proxy.
    async fn probe(&self, proxy: &SnmpProxy, description: &str, sys_oid: &Oid) -> bool;

    fn build(&self, proxy: Arc<SnmpProxy>, name: &str, description: &str) -> Arc<dyn Collector>;
}
