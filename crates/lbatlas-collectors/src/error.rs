// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

use lbatlas_snmp::SnmpError;
use lbatlas_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectError {
    /// A name was passed to `refresh` that the configuration does not know.
    #[error("{0} is not a known load balancer")]
    UnknownLoadBalancer(String),

    #[error("no plugin available for {0}")]
    NoPlugin(String),

    #[error("too many plugins available for {0}: {1:?}")]
    AmbiguousPlugin(String, Vec<&'static str>),

    #[error("{0:?} is not a valid virtual server")]
    BadVirtualServer(String),

    #[error("{0:?} is not a valid real server")]
    BadRealServer(String),

    /// A device answered with a value the MIB says cannot be there.
    #[error("unexpected value for {0}")]
    Value(String),

    #[error("cannot resolve {0}: {1}")]
    Resolve(String, String),

    #[error(transparent)]
    Snmp(#[from] SnmpError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CollectError {
    /// Parse errors on caller-supplied ids surface as 400 at the HTTP
    /// boundary; everything else is a 500.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            CollectError::BadVirtualServer(_)
                | CollectError::BadRealServer(_)
                | CollectError::UnknownLoadBalancer(_)
        )
    }
}
