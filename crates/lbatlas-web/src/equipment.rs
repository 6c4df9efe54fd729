// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

use axum::extract::{Path, State};
use serde_json::json;

use crate::error::{ApiError, ApiJson};
use crate::past::PastDate;
use crate::refresh::{ensure_fresh, LbParams};
use crate::AppState;

/// `GET /loadbalancer/` — the names of every known load balancer.
pub async fn list(State(state): State<AppState>, past: PastDate) -> Result<ApiJson, ApiError> {
    let names = state.store.list_loadbalancers(&past.0).await?;
    Ok(ApiJson(json!(names)))
}

/// `GET /loadbalancer/{lb}/` — name, description and vendor type.
pub async fn detail(
    State(state): State<AppState>,
    past: PastDate,
    Path(params): Path<LbParams>,
) -> Result<ApiJson, ApiError> {
    ensure_fresh(&state, &past, &params.lb, None, None, false).await;
    let detail = state
        .store
        .get_loadbalancer(&past.0, &params.lb)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(ApiJson(json!({
        "name": detail.name,
        "description": detail.description,
        "type": detail.kind,
    })))
}
