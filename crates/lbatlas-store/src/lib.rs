// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

//! Bitemporal PostgreSQL persistence.
//!
//! Live tables hold only rows with `deleted = 'infinity'`; closing a row
//! archives it into the matching `*_past` table with a finite `deleted`
//! timestamp, and the `*_full` views union both so a point-in-time query
//! at date D is simply `created <= D < deleted` over the view.

mod error;
mod query;
mod schema;
mod writer;

use deadpool_postgres::{Pool, Runtime};
use lbatlas_config::DatabaseConfig;
use tokio_postgres::NoTls;

pub use error::StoreError;
pub use query::{LbDetail, Past, RsDetail, RsListEntry, VsDetail, VsListEntry};
pub use writer::Scope;

#[derive(Clone)]
pub struct Store {
    pool: Pool,
}

impl Store {
    /// Build the connection pool. No connection is attempted until first
    /// use; `upgrade` is the startup probe.
    pub fn connect(config: &DatabaseConfig) -> Result<Store, StoreError> {
        let mut pg = deadpool_postgres::Config::new();
        pg.host = Some(config.host.clone());
        pg.port = Some(config.port);
        pg.dbname = Some(config.database.clone());
        pg.user = Some(config.username.clone());
        pg.password = Some(config.password.clone());
        let pool = pg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::Pool(e.to_string()))?;
        Ok(Store { pool })
    }

    pub(crate) fn pool(&self) -> &Pool {
        &self.pool
    }
}
