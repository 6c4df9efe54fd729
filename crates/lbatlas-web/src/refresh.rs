// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

//! Refresh resources and the refresh-on-read decorator. A real server
//! older than 10 seconds, or a virtual server / load balancer older than
//! 300 seconds, is refreshed before the read; past queries never refresh.

use std::time::Instant;

use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::error::{ApiError, ApiJson};
use crate::past::PastDate;
use crate::AppState;

const RS_MAX_AGE: i64 = 10;
const VS_MAX_AGE: i64 = 300;
const LB_MAX_AGE: i64 = 300;

#[derive(Deserialize)]
pub struct LbParams {
    pub lb: String,
}

#[derive(Deserialize)]
pub struct VsParams {
    pub lb: String,
    pub vs: String,
}

#[derive(Deserialize)]
pub struct RsParams {
    pub lb: String,
    pub vs: String,
    pub rs: String,
}

/// Refresh before a read when the persisted copy is stale. Failures are
/// logged; the read proceeds on whatever state is persisted.
pub async fn ensure_fresh(
    state: &AppState,
    past: &PastDate,
    lb: &str,
    vs: Option<&str>,
    rs: Option<&str>,
    sorry: bool,
) {
    if past.0.is_past() {
        return;
    }
    let age = match state.store.age(lb, vs, rs, sorry).await {
        Ok(age) => age,
        Err(e) => {
            warn!(lb, error = %e, "cannot compute resource age");
            return;
        }
    };
    // An unknown resource is not refreshed; the read will 404 on its own.
    let Some(age) = age else { return };
    let fresh = if rs.is_some() {
        age < RS_MAX_AGE
    } else if vs.is_some() {
        age < VS_MAX_AGE
    } else {
        age < LB_MAX_AGE
    };
    if fresh {
        return;
    }
    // Scoped reads reuse the device's recent collector and SNMP cache.
    let cached = vs.is_some();
    if let Err(e) = state.dispatcher.refresh(Some(lb), vs, rs, cached).await {
        warn!(lb, error = %e, "unable to autorefresh");
    }
}

/// Run a refresh and report how long it took, the shape the original API
/// promised its callers.
async fn run(
    state: &AppState,
    lb: Option<&str>,
    vs: Option<&str>,
    rs: Option<&str>,
) -> Result<ApiJson, ApiError> {
    let start = Instant::now();
    state
        .dispatcher
        .refresh(lb, vs, rs, false)
        .await
        .map_err(ApiError::from)?;
    Ok(ApiJson(json!(format!(
        "Refreshed in {} second(s)",
        start.elapsed().as_secs()
    ))))
}

/// The resource must exist (and the request must not be in the past) for
/// an explicit refresh to run.
async fn check_exists(
    state: &AppState,
    past: &PastDate,
    lb: &str,
    vs: Option<&str>,
    rs: Option<&str>,
) -> Result<(), ApiError> {
    if past.0.is_past() {
        return Err(ApiError::NotFound);
    }
    match state.store.age(lb, vs, rs, false).await? {
        Some(_) => Ok(()),
        None => Err(ApiError::NotFound),
    }
}

pub async fn fleet(State(state): State<AppState>, past: PastDate) -> Result<ApiJson, ApiError> {
    if past.0.is_past() {
        return Err(ApiError::NotFound);
    }
    run(&state, None, None, None).await
}

pub async fn device(
    State(state): State<AppState>,
    past: PastDate,
    Path(params): Path<LbParams>,
) -> Result<ApiJson, ApiError> {
    check_exists(&state, &past, &params.lb, None, None).await?;
    run(&state, Some(&params.lb), None, None).await
}

pub async fn virtualserver(
    State(state): State<AppState>,
    past: PastDate,
    Path(params): Path<VsParams>,
) -> Result<ApiJson, ApiError> {
    check_exists(&state, &past, &params.lb, Some(&params.vs), None).await?;
    run(&state, Some(&params.lb), Some(&params.vs), None).await
}

pub async fn realserver(
    State(state): State<AppState>,
    past: PastDate,
    Path(params): Path<RsParams>,
) -> Result<ApiJson, ApiError> {
    check_exists(&state, &past, &params.lb, Some(&params.vs), Some(&params.rs)).await?;
    run(&state, Some(&params.lb), Some(&params.vs), Some(&params.rs)).await
}
