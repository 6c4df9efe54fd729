// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

//! The bitemporal writer. One collection pass is one transaction: the
//! prior rows of the written scope are closed (archived into `*_past`
//! with `deleted = CURRENT_TIMESTAMP` and removed from the live table),
//! then the fresh subtree is inserted. Entities absent from the fresh
//! snapshot are thereby closed and not reinserted, and a reader sees the
//! old snapshot in full or the new in full, never a mix.

use deadpool_postgres::Transaction;
use lbatlas_model::{Actions, BackendServer, LoadBalancer, Snapshot, VirtualServer};
use tracing::debug;

use crate::error::StoreError;
use crate::Store;

/// The subtree a write is restricted to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scope {
    pub lb: String,
    pub vs: Option<String>,
    pub rs: Option<String>,
}

impl Scope {
    pub fn lb(lb: &str) -> Self {
        Scope {
            lb: lb.to_string(),
            vs: None,
            rs: None,
        }
    }

    pub fn vs(lb: &str, vs: &str) -> Self {
        Scope {
            lb: lb.to_string(),
            vs: Some(vs.to_string()),
            rs: None,
        }
    }

    pub fn rs(lb: &str, vs: &str, rs: &str) -> Self {
        Scope {
            lb: lb.to_string(),
            vs: Some(vs.to_string()),
            rs: Some(rs.to_string()),
        }
    }
}

/// Archive-and-delete the live rows of `table` matching `keys`, equality
/// on each named column.
async fn close(
    txn: &Transaction<'_>,
    table: &str,
    columns: &str,
    keys: &[(&str, &String)],
) -> Result<(), StoreError> {
    let mut predicate = String::from("deleted = 'infinity'");
    for (i, (column, _)) in keys.iter().enumerate() {
        predicate.push_str(&format!(" AND {column} = ${}", i + 1));
    }
    let params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> =
        keys.iter().map(|(_, v)| *v as _).collect();
    let archive = format!(
        "INSERT INTO {table}_past ({columns}, deleted) \
         SELECT {columns}, CURRENT_TIMESTAMP FROM {table} WHERE {predicate}"
    );
    txn.execute(archive.as_str(), &params).await?;
    let delete = format!("DELETE FROM {table} WHERE {predicate}");
    txn.execute(delete.as_str(), &params).await?;
    Ok(())
}

const LB_COLUMNS: &str = "name, type, description, created, updated";
const VS_COLUMNS: &str = "lb, vs, name, vip, protocol, mode, created, updated";
const VS_EXTRA_COLUMNS: &str = "lb, vs, key, value, created, updated";
const RS_COLUMNS: &str = "lb, vs, rs, name, rip, port, protocol, weight, rstate, sorry, created, updated";
const RS_EXTRA_COLUMNS: &str = "lb, vs, rs, key, value, created, updated";

async fn close_scope(txn: &Transaction<'_>, scope: &Scope) -> Result<(), StoreError> {
    let lb = &scope.lb;
    match (&scope.vs, &scope.rs) {
        (None, _) => {
            close(txn, "loadbalancer", LB_COLUMNS, &[("name", lb)]).await?;
            close(txn, "virtualserver", VS_COLUMNS, &[("lb", lb)]).await?;
            close(txn, "virtualserver_extra", VS_EXTRA_COLUMNS, &[("lb", lb)]).await?;
            close(txn, "realserver", RS_COLUMNS, &[("lb", lb)]).await?;
            close(txn, "realserver_extra", RS_EXTRA_COLUMNS, &[("lb", lb)]).await?;
            txn.execute("DELETE FROM action WHERE lb = $1", &[lb]).await?;
        }
        (Some(vs), None) => {
            let keys = [("lb", lb), ("vs", vs)];
            close(txn, "virtualserver", VS_COLUMNS, &keys).await?;
            close(txn, "virtualserver_extra", VS_EXTRA_COLUMNS, &keys).await?;
            close(txn, "realserver", RS_COLUMNS, &keys).await?;
            close(txn, "realserver_extra", RS_EXTRA_COLUMNS, &keys).await?;
            txn.execute("DELETE FROM action WHERE lb = $1 AND vs = $2", &[lb, vs])
                .await?;
        }
        (Some(vs), Some(rs)) => {
            let keys = [("lb", lb), ("vs", vs), ("rs", rs)];
            close(txn, "realserver", RS_COLUMNS, &keys).await?;
            close(txn, "realserver_extra", RS_EXTRA_COLUMNS, &keys).await?;
            txn.execute(
                "DELETE FROM action WHERE lb = $1 AND vs = $2 AND rs = $3",
                &[lb, vs, rs],
            )
            .await?;
        }
        (None, Some(_)) => return Err(StoreError::ScopeMismatch),
    }
    Ok(())
}

async fn insert_actions(
    txn: &Transaction<'_>,
    lb: &str,
    vs: &str,
    rs: &str,
    actions: &Actions,
) -> Result<(), StoreError> {
    for (action, label) in actions {
        txn.execute(
            "INSERT INTO action (lb, vs, rs, action, label) VALUES ($1, $2, $3, $4, $5)",
            &[&lb, &vs, &rs, action, label],
        )
        .await?;
    }
    Ok(())
}

async fn insert_backend(
    txn: &Transaction<'_>,
    lb: &str,
    vs: &str,
    rs_id: &str,
    backend: &BackendServer,
) -> Result<(), StoreError> {
    let (name, rip, port, protocol, weight, state, sorry) = match backend {
        BackendServer::Real(rs) => (
            &rs.name,
            &rs.rip,
            rs.rport,
            &rs.protocol,
            Some(rs.weight),
            rs.state,
            false,
        ),
        BackendServer::Sorry(rs) => (
            &rs.name,
            &rs.rip,
            rs.rport,
            &rs.protocol,
            None,
            rs.state,
            true,
        ),
    };
    txn.execute(
        "INSERT INTO realserver (lb, vs, rs, name, rip, port, protocol, weight, rstate, sorry) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        &[
            &lb,
            &vs,
            &rs_id,
            name,
            rip,
            &port,
            protocol,
            &weight,
            &state.as_str(),
            &sorry,
        ],
    )
    .await?;
    for (key, value) in backend.extra() {
        txn.execute(
            "INSERT INTO realserver_extra (lb, vs, rs, key, value) VALUES ($1, $2, $3, $4, $5)",
            &[&lb, &vs, &rs_id, key, value],
        )
        .await?;
    }
    insert_actions(txn, lb, vs, rs_id, backend.actions()).await
}

async fn insert_virtualserver(
    txn: &Transaction<'_>,
    lb: &str,
    vs_id: &str,
    vs: &VirtualServer,
) -> Result<(), StoreError> {
    txn.execute(
        "INSERT INTO virtualserver (lb, vs, name, vip, protocol, mode) \
         VALUES ($1, $2, $3, $4, $5, $6)",
        &[&lb, &vs_id, &vs.name, &vs.vip, &vs.protocol, &vs.mode],
    )
    .await?;
    for (key, value) in &vs.extra {
        txn.execute(
            "INSERT INTO virtualserver_extra (lb, vs, key, value) VALUES ($1, $2, $3, $4)",
            &[&lb, &vs_id, key, value],
        )
        .await?;
    }
    insert_actions(txn, lb, vs_id, "", &vs.actions).await?;
    for (rs_id, backend) in &vs.realservers {
        insert_backend(txn, lb, vs_id, rs_id, backend).await?;
    }
    Ok(())
}

async fn insert_loadbalancer(txn: &Transaction<'_>, lb: &LoadBalancer) -> Result<(), StoreError> {
    txn.execute(
        "INSERT INTO loadbalancer (name, type, description) VALUES ($1, $2, $3)",
        &[&lb.name, &lb.kind, &lb.description],
    )
    .await?;
    insert_actions(txn, &lb.name, "", "", &lb.actions).await?;
    for (vs_id, vs) in &lb.virtualservers {
        insert_virtualserver(txn, &lb.name, vs_id, vs).await?;
    }
    Ok(())
}

/// Scoped writes renew the freshness of their parents, so refresh-on-read
/// sees a real-server refresh through the virtual server's age too.
async fn bump_parents(txn: &Transaction<'_>, scope: &Scope) -> Result<(), StoreError> {
    if scope.vs.is_some() {
        txn.execute(
            "UPDATE loadbalancer SET updated = CURRENT_TIMESTAMP \
             WHERE name = $1 AND deleted = 'infinity'",
            &[&scope.lb],
        )
        .await?;
    }
    if let (Some(vs), Some(_)) = (&scope.vs, &scope.rs) {
        txn.execute(
            "UPDATE virtualserver SET updated = CURRENT_TIMESTAMP \
             WHERE lb = $1 AND vs = $2 AND deleted = 'infinity'",
            &[&scope.lb, vs],
        )
        .await?;
    }
    Ok(())
}

impl Store {
    /// Persist one collected snapshot, superseding the previous state of
    /// the written scope. Writing a missing tree (an action succeeded but
    /// the poll returned nothing) is a no-op.
    pub async fn write_snapshot(
        &self,
        scope: &Scope,
        snapshot: Option<&Snapshot>,
    ) -> Result<(), StoreError> {
        let Some(snapshot) = snapshot else {
            debug!(lb = %scope.lb, "empty snapshot, nothing to write");
            return Ok(());
        };
        // The snapshot shape must match the scope it supersedes.
        match (snapshot, &scope.vs, &scope.rs) {
            (Snapshot::LoadBalancer(_), None, None)
            | (Snapshot::VirtualServer(_), Some(_), None)
            | (Snapshot::Backend(_), Some(_), Some(_)) => {}
            _ => return Err(StoreError::ScopeMismatch),
        }

        let mut client = self.pool().get().await?;
        let txn = client.transaction().await?;
        close_scope(&txn, scope).await?;
        match snapshot {
            Snapshot::LoadBalancer(lb) => insert_loadbalancer(&txn, lb).await?,
            Snapshot::VirtualServer(vs) => {
                let vs_id = scope.vs.as_deref().expect("checked above");
                insert_virtualserver(&txn, &scope.lb, vs_id, vs).await?;
            }
            Snapshot::Backend(backend) => {
                let vs_id = scope.vs.as_deref().expect("checked above");
                let rs_id = scope.rs.as_deref().expect("checked above");
                insert_backend(&txn, &scope.lb, vs_id, rs_id, backend).await?;
            }
        }
        bump_parents(&txn, scope).await?;
        txn.commit().await?;
        Ok(())
    }

    /// Close every load balancer (and its subtree) untouched for more
    /// than `expire_days` days.
    pub async fn expire(&self, expire_days: u32) -> Result<(), StoreError> {
        let mut client = self.pool().get().await?;
        let txn = client.transaction().await?;
        let stale = txn
            .query(
                "SELECT name FROM loadbalancer \
                 WHERE deleted = 'infinity' \
                 AND updated < CURRENT_TIMESTAMP - make_interval(days => $1)",
                &[&(expire_days as i32)],
            )
            .await?;
        for row in &stale {
            let name: String = row.get(0);
            debug!(lb = %name, "expiring stale load balancer");
            close_scope(&txn, &Scope::lb(&name)).await?;
        }
        txn.commit().await?;
        Ok(())
    }
}
