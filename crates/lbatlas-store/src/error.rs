// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] tokio_postgres::Error),

    #[error("database pool error: {0}")]
    Pool(String),

    /// The collected snapshot does not fit the scope it is written under.
    #[error("snapshot does not match its write scope")]
    ScopeMismatch,
}

impl From<deadpool_postgres::PoolError> for StoreError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        StoreError::Pool(e.to_string())
    }
}
