// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

//! Action resources. Listing asks the device's collector what it offers;
//! execution runs the action and, on success, the dispatcher re-polls and
//! persists the affected scope. Neither exists in the past.

use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::json;

use crate::error::{ApiError, ApiJson};
use crate::past::PastDate;
use crate::AppState;

#[derive(Deserialize)]
pub struct LbActionParams {
    pub lb: String,
    #[serde(default)]
    pub rest: String,
}

#[derive(Deserialize)]
pub struct VsActionParams {
    pub lb: String,
    pub vs: String,
    #[serde(default)]
    pub rest: String,
}

#[derive(Deserialize)]
pub struct RsActionParams {
    pub lb: String,
    pub vs: String,
    pub rs: String,
    #[serde(default)]
    pub rest: String,
}

/// An action URL tail: the action id, then its arguments, one segment
/// each (`enable/3/` is the action `enable` with argument `3`).
fn parse_rest(rest: &str) -> Result<(String, Vec<String>), ApiError> {
    let mut segments = rest
        .trim_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string);
    let action = segments
        .next()
        .ok_or_else(|| ApiError::BadRequest("no action given".to_string()))?;
    Ok((action, segments.collect()))
}

async fn list(
    state: &AppState,
    past: &PastDate,
    lb: &str,
    vs: Option<&str>,
    rs: Option<&str>,
) -> Result<ApiJson, ApiError> {
    if past.0.is_past() {
        return Err(ApiError::NotFound);
    }
    state
        .store
        .age(lb, vs, rs, false)
        .await?
        .ok_or(ApiError::NotFound)?;
    let actions = state.dispatcher.actions(lb, vs, rs).await?;
    Ok(ApiJson(json!(actions)))
}

async fn execute(
    state: &AppState,
    past: &PastDate,
    lb: &str,
    vs: Option<&str>,
    rs: Option<&str>,
    rest: &str,
) -> Result<ApiJson, ApiError> {
    if past.0.is_past() {
        return Err(ApiError::NotFound);
    }
    let (action, args) = parse_rest(rest)?;
    match state.dispatcher.execute(lb, vs, rs, &action, &args).await? {
        // An unknown action is indistinguishable from a missing resource.
        None => Err(ApiError::NotFound),
        Some(()) => Ok(ApiJson(json!(true))),
    }
}

pub async fn list_for_lb(
    State(state): State<AppState>,
    past: PastDate,
    Path(params): Path<LbActionParams>,
) -> Result<ApiJson, ApiError> {
    list(&state, &past, &params.lb, None, None).await
}

pub async fn execute_for_lb(
    State(state): State<AppState>,
    past: PastDate,
    Path(params): Path<LbActionParams>,
) -> Result<ApiJson, ApiError> {
    execute(&state, &past, &params.lb, None, None, &params.rest).await
}

pub async fn list_for_vs(
    State(state): State<AppState>,
    past: PastDate,
    Path(params): Path<VsActionParams>,
) -> Result<ApiJson, ApiError> {
    list(&state, &past, &params.lb, Some(&params.vs), None).await
}

pub async fn execute_for_vs(
    State(state): State<AppState>,
    past: PastDate,
    Path(params): Path<VsActionParams>,
) -> Result<ApiJson, ApiError> {
    execute(&state, &past, &params.lb, Some(&params.vs), None, &params.rest).await
}

pub async fn list_for_rs(
    State(state): State<AppState>,
    past: PastDate,
    Path(params): Path<RsActionParams>,
) -> Result<ApiJson, ApiError> {
    list(&state, &past, &params.lb, Some(&params.vs), Some(&params.rs)).await
}

pub async fn execute_for_rs(
    State(state): State<AppState>,
    past: PastDate,
    Path(params): Path<RsActionParams>,
) -> Result<ApiJson, ApiError> {
    execute(
        &state,
        &past,
        &params.lb,
        Some(&params.vs),
        Some(&params.rs),
        &params.rest,
    )
    .await
}
