// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::json;

use crate::error::{ApiError, ApiJson};
use crate::past::PastDate;
use crate::{AppState, API_VERSION};

#[derive(Deserialize)]
pub struct SearchParams {
    pub term: String,
}

/// `GET /search/{term}/` — URLs of everything matching the term.
pub async fn search(
    State(state): State<AppState>,
    past: PastDate,
    Path(params): Path<SearchParams>,
) -> Result<ApiJson, ApiError> {
    let results = state.store.search(&past.0, &params.term).await?;
    let urls: Vec<String> = results
        .into_iter()
        .map(|path| format!("/api/{API_VERSION}/{path}"))
        .collect();
    Ok(ApiJson(json!(urls)))
}
