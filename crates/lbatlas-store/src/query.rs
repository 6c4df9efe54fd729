// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

//! Read queries. Every query exists in a live form (`deleted =
//! 'infinity'` against the live table) and a past form (the `*_full`
//! view restricted to `created <= D < deleted`); the `Past` context picks
//! the form and carries the as-of date, which is always the last SQL
//! parameter.

use std::collections::BTreeMap;
use std::net::IpAddr;

use tokio_postgres::types::ToSql;
use tracing::warn;

use crate::error::StoreError;
use crate::Store;

/// Optional as-of date. The date is forwarded verbatim to the SQL engine,
/// which is the authority on accepted timestamp syntax.
#[derive(Clone, Debug, Default)]
pub struct Past(pub Option<String>);

impl Past {
    pub fn live() -> Self {
        Past(None)
    }

    pub fn at(date: &str) -> Self {
        Past(Some(date.to_string()))
    }

    pub fn is_past(&self) -> bool {
        self.0.is_some()
    }

    fn table(&self, table: &str) -> String {
        match self.0 {
            Some(_) => format!("{table}_full"),
            None => table.to_string(),
        }
    }

    /// The liveness predicate for `alias`, with the date as parameter
    /// `$date_param` in past mode.
    fn pred(&self, alias: &str, date_param: usize) -> String {
        match self.0 {
            Some(_) => format!(
                "{alias}.created <= ${date_param}::timestamptz \
                 AND {alias}.deleted > ${date_param}::timestamptz"
            ),
            None => format!("{alias}.deleted = 'infinity'"),
        }
    }

    /// Extend a parameter list with the date in past mode.
    fn params<'a>(
        &'a self,
        mut params: Vec<&'a (dyn ToSql + Sync)>,
    ) -> Vec<&'a (dyn ToSql + Sync)> {
        if let Some(date) = &self.0 {
            params.push(date);
        }
        params
    }
}

#[derive(Clone, Debug)]
pub struct LbDetail {
    pub name: String,
    pub description: String,
    pub kind: String,
}

#[derive(Clone, Debug)]
pub struct VsListEntry {
    pub vs: String,
    pub name: String,
    pub vip: String,
    pub rstate: String,
}

#[derive(Clone, Debug)]
pub struct VsDetail {
    pub name: String,
    pub vip: String,
    pub protocol: String,
    pub mode: String,
    pub states: Vec<String>,
    pub extra: BTreeMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct RsListEntry {
    pub rs: String,
    pub name: String,
    pub rstate: String,
}

#[derive(Clone, Debug)]
pub struct RsDetail {
    pub name: String,
    pub rip: String,
    pub port: Option<i32>,
    pub protocol: Option<String>,
    pub weight: Option<i32>,
    pub rstate: String,
    pub extra: BTreeMap<String, String>,
    pub actions: BTreeMap<String, String>,
}

impl Store {
    pub async fn list_loadbalancers(&self, past: &Past) -> Result<Vec<String>, StoreError> {
        let sql = format!(
            "SELECT name FROM {} lb WHERE {} ORDER BY name",
            past.table("loadbalancer"),
            past.pred("lb", 1),
        );
        let client = self.pool().get().await?;
        let rows = client.query(sql.as_str(), &past.params(Vec::new())).await?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    pub async fn get_loadbalancer(
        &self,
        past: &Past,
        lb: &str,
    ) -> Result<Option<LbDetail>, StoreError> {
        let sql = format!(
            "SELECT name, description, type FROM {} lb WHERE lb.name = $1 AND {}",
            past.table("loadbalancer"),
            past.pred("lb", 2),
        );
        let client = self.pool().get().await?;
        let rows = client.query(sql.as_str(), &past.params(vec![&lb])).await?;
        Ok(rows.first().map(|row| LbDetail {
            name: row.get(0),
            description: row.get(1),
            kind: row.get(2),
        }))
    }

    /// The virtual servers of a load balancer with the states of their
    /// primary members; virtual servers without members do not appear.
    pub async fn list_virtualservers(
        &self,
        past: &Past,
        lb: &str,
    ) -> Result<Vec<VsListEntry>, StoreError> {
        let sql = format!(
            "SELECT vs.vs, vs.name, vs.vip, rs.rstate \
             FROM {} vs, {} rs \
             WHERE vs.lb = $1 AND rs.lb = vs.lb AND rs.vs = vs.vs AND NOT rs.sorry \
             AND {} AND {}",
            past.table("virtualserver"),
            past.table("realserver"),
            past.pred("vs", 2),
            past.pred("rs", 2),
        );
        let client = self.pool().get().await?;
        let rows = client.query(sql.as_str(), &past.params(vec![&lb])).await?;
        Ok(rows
            .iter()
            .map(|row| VsListEntry {
                vs: row.get(0),
                name: row.get(1),
                vip: row.get(2),
                rstate: row.get(3),
            })
            .collect())
    }

    pub async fn get_virtualserver(
        &self,
        past: &Past,
        lb: &str,
        vs: &str,
    ) -> Result<Option<VsDetail>, StoreError> {
        let client = self.pool().get().await?;
        let sql = format!(
            "SELECT vs.name, vs.vip, vs.protocol, vs.mode FROM {} vs \
             WHERE vs.lb = $1 AND vs.vs = $2 AND {}",
            past.table("virtualserver"),
            past.pred("vs", 3),
        );
        let rows = client.query(sql.as_str(), &past.params(vec![&lb, &vs])).await?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let mut detail = VsDetail {
            name: row.get(0),
            vip: row.get(1),
            protocol: row.get(2),
            mode: row.get(3),
            states: Vec::new(),
            extra: BTreeMap::new(),
        };

        let sql = format!(
            "SELECT rs.rstate FROM {} rs \
             WHERE rs.lb = $1 AND rs.vs = $2 AND NOT rs.sorry AND {}",
            past.table("realserver"),
            past.pred("rs", 3),
        );
        let rows = client.query(sql.as_str(), &past.params(vec![&lb, &vs])).await?;
        detail.states = rows.iter().map(|row| row.get(0)).collect();

        let sql = format!(
            "SELECT vse.key, vse.value FROM {} vse \
             WHERE vse.lb = $1 AND vse.vs = $2 AND {}",
            past.table("virtualserver_extra"),
            past.pred("vse", 3),
        );
        let rows = client.query(sql.as_str(), &past.params(vec![&lb, &vs])).await?;
        detail.extra = rows.iter().map(|row| (row.get(0), row.get(1))).collect();
        Ok(Some(detail))
    }

    pub async fn list_realservers(
        &self,
        past: &Past,
        lb: &str,
        vs: &str,
        sorry: bool,
    ) -> Result<Vec<RsListEntry>, StoreError> {
        let sql = format!(
            "SELECT rs.rs, rs.name, rs.rstate FROM {} rs \
             WHERE rs.lb = $1 AND rs.vs = $2 AND {} rs.sorry AND {}",
            past.table("realserver"),
            if sorry { "" } else { "NOT" },
            past.pred("rs", 3),
        );
        let client = self.pool().get().await?;
        let rows = client.query(sql.as_str(), &past.params(vec![&lb, &vs])).await?;
        Ok(rows
            .iter()
            .map(|row| RsListEntry {
                rs: row.get(0),
                name: row.get(1),
                rstate: row.get(2),
            })
            .collect())
    }

    pub async fn get_realserver(
        &self,
        past: &Past,
        lb: &str,
        vs: &str,
        rs: &str,
        sorry: bool,
    ) -> Result<Option<RsDetail>, StoreError> {
        let client = self.pool().get().await?;
        let sql = format!(
            "SELECT rs.name, rs.rip, rs.port, rs.protocol, rs.weight, rs.rstate \
             FROM {} rs \
             WHERE rs.lb = $1 AND rs.vs = $2 AND rs.rs = $3 AND {} rs.sorry AND {}",
            past.table("realserver"),
            if sorry { "" } else { "NOT" },
            past.pred("rs", 4),
        );
        let rows = client.query(sql.as_str(), &past.params(vec![&lb, &vs, &rs])).await?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let mut detail = RsDetail {
            name: row.get(0),
            rip: row.get(1),
            port: row.get(2),
            protocol: row.get(3),
            weight: row.get(4),
            rstate: row.get(5),
            extra: BTreeMap::new(),
            actions: BTreeMap::new(),
        };

        let sql = format!(
            "SELECT rse.key, rse.value FROM {} rse \
             WHERE rse.lb = $1 AND rse.vs = $2 AND rse.rs = $3 AND {}",
            past.table("realserver_extra"),
            past.pred("rse", 4),
        );
        let rows = client.query(sql.as_str(), &past.params(vec![&lb, &vs, &rs])).await?;
        detail.extra = rows.iter().map(|row| (row.get(0), row.get(1))).collect();

        // The action table carries no history; only current reads see it.
        if !past.is_past() {
            let rows = client
                .query(
                    "SELECT action, label FROM action WHERE lb = $1 AND vs = $2 AND rs = $3",
                    &[&lb, &vs, &rs],
                )
                .await?;
            detail.actions = rows.iter().map(|row| (row.get(0), row.get(1))).collect();
        }
        Ok(Some(detail))
    }

    /// Age in seconds of the freshest row describing the resource, `None`
    /// when it does not exist. Drives the refresh-on-read thresholds.
    pub async fn age(
        &self,
        lb: &str,
        vs: Option<&str>,
        rs: Option<&str>,
        sorry: bool,
    ) -> Result<Option<i64>, StoreError> {
        let client = self.pool().get().await?;
        let rows = match (vs, rs) {
            (Some(vs), Some(rs)) => {
                let sql = format!(
                    "SELECT EXTRACT(EPOCH FROM CURRENT_TIMESTAMP - updated)::bigint \
                     FROM realserver \
                     WHERE lb = $1 AND vs = $2 AND rs = $3 AND {} sorry \
                     AND deleted = 'infinity'",
                    if sorry { "" } else { "NOT" },
                );
                client.query(sql.as_str(), &[&lb, &vs, &rs]).await?
            }
            (Some(vs), None) => {
                client
                    .query(
                        "SELECT EXTRACT(EPOCH FROM CURRENT_TIMESTAMP - updated)::bigint \
                         FROM virtualserver \
                         WHERE lb = $1 AND vs = $2 AND deleted = 'infinity'",
                        &[&lb, &vs],
                    )
                    .await?
            }
            _ => {
                client
                    .query(
                        "SELECT EXTRACT(EPOCH FROM CURRENT_TIMESTAMP - updated)::bigint \
                         FROM loadbalancer WHERE name = $1 AND deleted = 'infinity'",
                        &[&lb],
                    )
                    .await?
            }
        };
        Ok(rows.first().map(|row| row.get(0)))
    }

    /// Brute-force search over the persisted text fields. Per-fragment
    /// errors are logged and skipped; results are deduplicated URL paths
    /// (without the API prefix).
    pub async fn search(&self, past: &Past, term: &str) -> Result<Vec<String>, StoreError> {
        let client = self.pool().get().await?;
        let mut results = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for sql in search_fragments(past, term) {
            let rows = match client.query(sql.as_str(), &past.params(vec![&term])).await {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(term, error = %e, "search fragment failed, skip it");
                    continue;
                }
            };
            for row in rows {
                let url: String = row.get(0);
                if seen.insert(url.clone()) {
                    results.push(url);
                }
            }
        }
        Ok(results)
    }
}

/// The parameterised fragments a search runs: ILIKE over the textual
/// fields of every table, plus an exact match on the real-server address
/// when the term parses as an IP.
fn search_fragments(past: &Past, term: &str) -> Vec<String> {
    let mut fragments = vec![
        format!(
            "SELECT 'loadbalancer/' || name || '/' FROM {} lb \
             WHERE {} AND (name ILIKE '%' || $1 || '%' \
             OR description ILIKE '%' || $1 || '%' \
             OR type ILIKE '%' || $1 || '%')",
            past.table("loadbalancer"),
            past.pred("lb", 2),
        ),
        format!(
            "SELECT 'loadbalancer/' || lb || '/virtualserver/' || vs || '/' FROM {} v \
             WHERE {} AND (name ILIKE '%' || $1 || '%' \
             OR vip ILIKE '%' || $1 || '%' \
             OR mode ILIKE '%' || $1 || '%')",
            past.table("virtualserver"),
            past.pred("v", 2),
        ),
        format!(
            "SELECT 'loadbalancer/' || lb || '/virtualserver/' || vs || '/' FROM {} v \
             WHERE {} AND value ILIKE '%' || $1 || '%'",
            past.table("virtualserver_extra"),
            past.pred("v", 2),
        ),
        format!(
            "SELECT 'loadbalancer/' || lb || '/virtualserver/' || vs || \
             '/realserver/' || rs || '/' FROM {} r \
             WHERE {} AND (name ILIKE '%' || $1 || '%' OR rip ILIKE '%' || $1 || '%')",
            past.table("realserver"),
            past.pred("r", 2),
        ),
        format!(
            "SELECT 'loadbalancer/' || lb || '/virtualserver/' || vs || \
             '/realserver/' || rs || '/' FROM {} r \
             WHERE {} AND value ILIKE '%' || $1 || '%'",
            past.table("realserver_extra"),
            past.pred("r", 2),
        ),
    ];
    if term.parse::<IpAddr>().is_ok() {
        fragments.push(format!(
            "SELECT 'loadbalancer/' || lb || '/virtualserver/' || vs || \
             '/realserver/' || rs || '/' FROM {} r WHERE {} AND rip = $1",
            past.table("realserver"),
            past.pred("r", 2),
        ));
    }
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_queries_use_the_live_table() {
        let past = Past::live();
        assert_eq!(past.table("loadbalancer"), "loadbalancer");
        assert_eq!(past.pred("lb", 3), "lb.deleted = 'infinity'");
    }

    #[test]
    fn past_queries_use_the_full_view_with_a_window() {
        let past = Past::at("2011-07-01 12:00:00");
        assert_eq!(past.table("loadbalancer"), "loadbalancer_full");
        assert_eq!(
            past.pred("lb", 2),
            "lb.created <= $2::timestamptz AND lb.deleted > $2::timestamptz"
        );
    }

    #[test]
    fn ip_terms_add_the_equality_fragment() {
        let live = Past::live();
        assert_eq!(search_fragments(&live, "web").len(), 5);
        assert_eq!(search_fragments(&live, "10.0.0.1").len(), 6);
        assert_eq!(search_fragments(&live, "2001:db8::1").len(), 6);
    }

    #[test]
    fn past_search_rewrites_every_fragment() {
        let past = Past::at("2011-07-01");
        for fragment in search_fragments(&past, "web") {
            assert!(fragment.contains("_full"));
            assert!(fragment.contains("$2::timestamptz"));
        }
    }
}
