// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

//! The `past/{date}` request context. Resources mounted under the past
//! prefix see the date through this extractor and run their queries
//! against the `*_full` views; everything else runs live.

use async_trait::async_trait;
use axum::extract::{FromRequestParts, RawPathParams};
use axum::http::request::Parts;
use lbatlas_store::Past;

pub struct PastDate(pub Past);

#[async_trait]
impl<S> FromRequestParts<S> for PastDate
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let date = match RawPathParams::from_request_parts(parts, state).await {
            Ok(params) => params
                .iter()
                .find(|(key, _)| *key == "date")
                .map(|(_, value)| value.to_string()),
            Err(_) => None,
        };
        Ok(PastDate(Past(date)))
    }
}
