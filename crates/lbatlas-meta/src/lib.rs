// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

//! The federation tier: one API over many collector instances. It owns no
//! device state — single-device requests are proxied to the instance
//! owning the device and fleet-wide requests fan out over a covering
//! subset of backends.

mod client;
mod http;

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use lbatlas_config::MetaWebConfig;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

pub use client::{FleetMap, MetaClient, ProxyOutcome};
pub use http::{MetaError, MetaHttp, MetaResponse, ReqwestHttp};

/// Which backend actually served a proxied request.
fn served_by() -> HeaderName {
    HeaderName::from_static("x-qcss-server")
}

pub fn meta_client(config: &MetaWebConfig) -> Arc<MetaClient> {
    MetaClient::new(config, Arc::new(ReqwestHttp::new()))
}

#[derive(Clone)]
struct MetaAppState {
    client: Arc<MetaClient>,
}

/// Extract the optional `past/{date}` segment, mirroring the collector
/// API's context handling.
fn past_of(params: &std::collections::HashMap<String, String>) -> Option<String> {
    params.get("date").cloned()
}

fn json_response(value: Value) -> Response {
    (
        [(header::CONTENT_TYPE, "application/json; charset=UTF-8")],
        serde_json::to_vec(&value).unwrap_or_default(),
    )
        .into_response()
}

async fn loadbalancers(
    State(state): State<MetaAppState>,
    Path(params): Path<std::collections::HashMap<String, String>>,
) -> Response {
    let date = past_of(&params);
    let names = state.client.loadbalancers(date.as_deref()).await;
    json_response(json!(names))
}

async fn proxy(
    State(state): State<MetaAppState>,
    Path(raw): Path<std::collections::HashMap<String, String>>,
) -> Response {
    let lb = raw.get("lb").cloned().unwrap_or_default();
    let rest = raw.get("rest").cloned().unwrap_or_default();
    let date = past_of(&raw);
    let segments: Vec<String> = rest
        .trim_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect();
    match state.client.proxy(date.as_deref(), &lb, &segments).await {
        ProxyOutcome::Unknown => (
            StatusCode::NOT_FOUND,
            json_response(json!({"error": "not found"})),
        )
            .into_response(),
        ProxyOutcome::NoGateway => {
            (StatusCode::GATEWAY_TIMEOUT, "No gateway available").into_response()
        }
        ProxyOutcome::Response(response, service) => {
            let status =
                StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (
                status,
                [
                    (header::CONTENT_TYPE, response.content_type),
                    (served_by(), service),
                ],
                response.body,
            )
                .into_response()
        }
    }
}

async fn search(
    State(state): State<MetaAppState>,
    Path(raw): Path<std::collections::HashMap<String, String>>,
) -> Response {
    let date = past_of(&raw);
    let term = raw.get("term").cloned().unwrap_or_default();
    let bodies = state
        .client
        .get_all(date.as_deref(), &["search".to_string(), term])
        .await;
    // Concatenate and dedup the per-backend result lists.
    let mut merged: Vec<Value> = Vec::new();
    for body in bodies {
        if let Value::Array(urls) = body {
            for url in urls {
                if !merged.contains(&url) {
                    merged.push(url);
                }
            }
        }
    }
    json_response(Value::Array(merged))
}

async fn status(
    State(state): State<MetaAppState>,
    Path(raw): Path<std::collections::HashMap<String, String>>,
) -> Response {
    let date = past_of(&raw);
    let map = state.client.status(date.as_deref()).await;
    json_response(json!(map))
}

async fn ping(
    State(state): State<MetaAppState>,
    Path(raw): Path<std::collections::HashMap<String, String>>,
) -> Response {
    // Backend liveness is only meaningful now.
    if past_of(&raw).is_some() {
        return (
            StatusCode::NOT_FOUND,
            json_response(json!({"error": "not found"})),
        )
            .into_response();
    }
    json_response(json!(state.client.ping()))
}

fn resources() -> Router<MetaAppState> {
    Router::new()
        .route("/loadbalancer/", get(loadbalancers))
        .route("/loadbalancer/:lb/", get(proxy))
        .route("/loadbalancer/:lb/*rest", get(proxy))
        .route("/search/:term/", get(search))
        .route("/status/", get(status))
        .route("/ping/", get(ping))
}

pub fn router(client: Arc<MetaClient>) -> Router {
    let state = MetaAppState { client };
    Router::new()
        .nest("/api/1.0", resources())
        .nest("/api/1.0/past/:date", resources())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(
    client: Arc<MetaClient>,
    interface: &str,
    port: u16,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((interface, port)).await?;
    tracing::info!(interface, port, "federation API listening");
    axum::serve(listener, router(client)).await
}
