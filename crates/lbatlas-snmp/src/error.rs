// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

pub type SnmpResult<T> = Result<T, SnmpError>;

#[derive(Debug, Error)]
pub enum SnmpError {
    /// A cache lookup found neither an exact match nor any prefix.
    #[error("{0} is not available in cache")]
    NotCached(String),

    /// Timeout, no-such-name, end-of-MIB or any other transport failure.
    /// Walks swallow this and terminate with what they have; point GETs
    /// propagate it.
    #[error("SNMP transport error: {0}")]
    Transport(String),

    #[error("no write community is configured")]
    NoWriteCommunity,

    #[error("malformed OID {0:?}")]
    BadOid(String),
}
