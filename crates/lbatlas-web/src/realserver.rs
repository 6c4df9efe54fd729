// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

use axum::extract::{Path, State};
use serde_json::{json, Map, Value};

use crate::error::{ApiError, ApiJson};
use crate::past::PastDate;
use crate::refresh::{ensure_fresh, RsParams, VsParams};
use crate::virtualserver::merge_extra;
use crate::AppState;

async fn list(
    state: AppState,
    past: PastDate,
    params: VsParams,
    sorry: bool,
) -> Result<ApiJson, ApiError> {
    ensure_fresh(&state, &past, &params.lb, Some(&params.vs), None, sorry).await;
    let rows = state
        .store
        .list_realservers(&past.0, &params.lb, &params.vs, sorry)
        .await?;
    let mut document = Map::new();
    for row in rows {
        document.insert(row.rs, json!([row.name, row.rstate]));
    }
    Ok(ApiJson(Value::Object(document)))
}

async fn detail(
    state: AppState,
    past: PastDate,
    params: RsParams,
    sorry: bool,
) -> Result<ApiJson, ApiError> {
    ensure_fresh(
        &state,
        &past,
        &params.lb,
        Some(&params.vs),
        Some(&params.rs),
        sorry,
    )
    .await;
    let detail = state
        .store
        .get_realserver(&past.0, &params.lb, &params.vs, &params.rs, sorry)
        .await?
        .ok_or(ApiError::NotFound)?;
    let mut document = Map::new();
    document.insert("name".into(), json!(detail.name));
    document.insert("IP".into(), json!(detail.rip));
    document.insert("port".into(), json!(detail.port));
    document.insert("protocol".into(), json!(detail.protocol));
    if !sorry {
        document.insert("weight".into(), json!(detail.weight));
    }
    document.insert("state".into(), json!(detail.rstate));
    merge_extra(&mut document, &detail.extra);
    if !detail.actions.is_empty() {
        document.insert("actions".into(), json!(detail.actions));
    }
    Ok(ApiJson(Value::Object(document)))
}

/// `GET .../realserver/` — `{rs: [name, state]}` for the primary members.
pub async fn list_real(
    State(state): State<AppState>,
    past: PastDate,
    Path(params): Path<VsParams>,
) -> Result<ApiJson, ApiError> {
    list(state, past, params, false).await
}

/// `GET .../sorryserver/` — same shape for the backup members.
pub async fn list_sorry(
    State(state): State<AppState>,
    past: PastDate,
    Path(params): Path<VsParams>,
) -> Result<ApiJson, ApiError> {
    list(state, past, params, true).await
}

pub async fn detail_real(
    State(state): State<AppState>,
    past: PastDate,
    Path(params): Path<RsParams>,
) -> Result<ApiJson, ApiError> {
    detail(state, past, params, false).await
}

pub async fn detail_sorry(
    State(state): State<AppState>,
    past: PastDate,
    Path(params): Path<RsParams>,
) -> Result<ApiJson, ApiError> {
    detail(state, past, params, true).await
}
