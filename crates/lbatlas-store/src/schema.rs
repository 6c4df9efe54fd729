// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

//! Versioned, idempotent schema migrations, upgrade-only.
//!
//! Each migration probes a sentinel query and runs its DDL only when the
//! probe fails, so re-running the manager on an upgraded database is a
//! no-op. Migrations run while normal traffic is flowing and take no
//! locks beyond their DDL.

use tracing::{debug, info};

use crate::error::StoreError;
use crate::Store;

struct Migration {
    name: &'static str,
    sentinel: &'static str,
    ddl: &'static str,
}

/// Run in sorted name order.
const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "00-base",
        sentinel: "SELECT 1 FROM loadbalancer LIMIT 1",
        ddl: BASE_DDL,
    },
    Migration {
        name: "01-action",
        sentinel: "SELECT 1 FROM action LIMIT 1",
        ddl: ACTION_DDL,
    },
    Migration {
        name: "02-past",
        sentinel: "SELECT 1 FROM loadbalancer_past LIMIT 1",
        ddl: PAST_DDL,
    },
];

const BASE_DDL: &str = r#"
CREATE TABLE loadbalancer (
    name        text NOT NULL,
    type        text NOT NULL,
    description text NOT NULL DEFAULT '',
    created     timestamptz NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated     timestamptz NOT NULL DEFAULT CURRENT_TIMESTAMP,
    deleted     timestamptz NOT NULL DEFAULT 'infinity',
    PRIMARY KEY (name)
);
CREATE TABLE virtualserver (
    lb       text NOT NULL,
    vs       text NOT NULL,
    name     text NOT NULL,
    vip      text NOT NULL DEFAULT '',
    protocol text NOT NULL DEFAULT 'unknown',
    mode     text NOT NULL DEFAULT 'unknown',
    created  timestamptz NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated  timestamptz NOT NULL DEFAULT CURRENT_TIMESTAMP,
    deleted  timestamptz NOT NULL DEFAULT 'infinity',
    PRIMARY KEY (lb, vs)
);
CREATE TABLE virtualserver_extra (
    lb      text NOT NULL,
    vs      text NOT NULL,
    key     text NOT NULL,
    value   text NOT NULL DEFAULT '',
    created timestamptz NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated timestamptz NOT NULL DEFAULT CURRENT_TIMESTAMP,
    deleted timestamptz NOT NULL DEFAULT 'infinity',
    PRIMARY KEY (lb, vs, key)
);
CREATE TABLE realserver (
    lb       text NOT NULL,
    vs       text NOT NULL,
    rs       text NOT NULL,
    name     text NOT NULL,
    rip      text NOT NULL DEFAULT '',
    port     integer,
    protocol text,
    weight   integer,
    rstate   text NOT NULL DEFAULT 'unknown',
    sorry    boolean NOT NULL DEFAULT false,
    created  timestamptz NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated  timestamptz NOT NULL DEFAULT CURRENT_TIMESTAMP,
    deleted  timestamptz NOT NULL DEFAULT 'infinity',
    PRIMARY KEY (lb, vs, rs)
);
CREATE TABLE realserver_extra (
    lb      text NOT NULL,
    vs      text NOT NULL,
    rs      text NOT NULL,
    key     text NOT NULL,
    value   text NOT NULL DEFAULT '',
    created timestamptz NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated timestamptz NOT NULL DEFAULT CURRENT_TIMESTAMP,
    deleted timestamptz NOT NULL DEFAULT 'infinity',
    PRIMARY KEY (lb, vs, rs, key)
);
"#;

const ACTION_DDL: &str = r#"
CREATE TABLE action (
    lb     text NOT NULL,
    vs     text NOT NULL DEFAULT '',
    rs     text NOT NULL DEFAULT '',
    action text NOT NULL,
    label  text NOT NULL DEFAULT '',
    PRIMARY KEY (lb, vs, rs, action)
);
CREATE INDEX action_scope ON action (lb, vs, rs);
"#;

const PAST_DDL: &str = r#"
CREATE TABLE loadbalancer_past (
    name        text NOT NULL,
    type        text NOT NULL,
    description text NOT NULL DEFAULT '',
    created     timestamptz NOT NULL,
    updated     timestamptz NOT NULL,
    deleted     timestamptz NOT NULL,
    PRIMARY KEY (name, deleted)
);
CREATE TABLE virtualserver_past (
    lb       text NOT NULL,
    vs       text NOT NULL,
    name     text NOT NULL,
    vip      text NOT NULL DEFAULT '',
    protocol text NOT NULL DEFAULT 'unknown',
    mode     text NOT NULL DEFAULT 'unknown',
    created  timestamptz NOT NULL,
    updated  timestamptz NOT NULL,
    deleted  timestamptz NOT NULL,
    PRIMARY KEY (lb, vs, deleted)
);
CREATE TABLE virtualserver_extra_past (
    lb      text NOT NULL,
    vs      text NOT NULL,
    key     text NOT NULL,
    value   text NOT NULL DEFAULT '',
    created timestamptz NOT NULL,
    updated timestamptz NOT NULL,
    deleted timestamptz NOT NULL,
    PRIMARY KEY (lb, vs, key, deleted)
);
CREATE TABLE realserver_past (
    lb       text NOT NULL,
    vs       text NOT NULL,
    rs       text NOT NULL,
    name     text NOT NULL,
    rip      text NOT NULL DEFAULT '',
    port     integer,
    protocol text,
    weight   integer,
    rstate   text NOT NULL DEFAULT 'unknown',
    sorry    boolean NOT NULL DEFAULT false,
    created  timestamptz NOT NULL,
    updated  timestamptz NOT NULL,
    deleted  timestamptz NOT NULL,
    PRIMARY KEY (lb, vs, rs, deleted)
);
CREATE TABLE realserver_extra_past (
    lb      text NOT NULL,
    vs      text NOT NULL,
    rs      text NOT NULL,
    key     text NOT NULL,
    value   text NOT NULL DEFAULT '',
    created timestamptz NOT NULL,
    updated timestamptz NOT NULL,
    deleted timestamptz NOT NULL,
    PRIMARY KEY (lb, vs, rs, key, deleted)
);
CREATE VIEW loadbalancer_full AS
    SELECT * FROM loadbalancer UNION SELECT * FROM loadbalancer_past;
CREATE VIEW virtualserver_full AS
    SELECT * FROM virtualserver UNION SELECT * FROM virtualserver_past;
CREATE VIEW virtualserver_extra_full AS
    SELECT * FROM virtualserver_extra UNION SELECT * FROM virtualserver_extra_past;
CREATE VIEW realserver_full AS
    SELECT * FROM realserver UNION SELECT * FROM realserver_past;
CREATE VIEW realserver_extra_full AS
    SELECT * FROM realserver_extra UNION SELECT * FROM realserver_extra_past;
"#;

impl Store {
    /// Probe connectivity, then apply whatever migrations are missing.
    /// A dead database is fatal to the caller.
    pub async fn upgrade(&self) -> Result<(), StoreError> {
        let client = self.pool().get().await?;
        client.simple_query("SELECT 1").await?;
        for migration in MIGRATIONS {
            match client.simple_query(migration.sentinel).await {
                Ok(_) => debug!(migration = migration.name, "schema migration already applied"),
                Err(_) => {
                    info!(migration = migration.name, "applying schema migration");
                    client.batch_execute(migration.ddl).await?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_sorted_and_probed() {
        let names: Vec<&str> = MIGRATIONS.iter().map(|m| m.name).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
        for migration in MIGRATIONS {
            assert!(migration.sentinel.starts_with("SELECT 1 FROM "));
            assert!(!migration.ddl.trim().is_empty());
        }
    }

    #[test]
    fn every_bitemporal_table_has_a_past_shadow_and_view() {
        for table in [
            "loadbalancer",
            "virtualserver",
            "virtualserver_extra",
            "realserver",
            "realserver_extra",
        ] {
            assert!(PAST_DDL.contains(&format!("CREATE TABLE {table}_past")));
            assert!(PAST_DDL.contains(&format!("CREATE VIEW {table}_full")));
        }
    }
}
