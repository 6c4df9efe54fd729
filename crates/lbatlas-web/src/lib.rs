// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

//! The HTTP/JSON API: read resources over the bitemporal store (with an
//! optional `past/{date}` context), refresh-on-read, and the action
//! vocabulary proxied to the collectors.

mod action;
mod equipment;
mod error;
mod past;
mod realserver;
mod refresh;
mod search;
mod virtualserver;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use lbatlas_collectors::Dispatcher;
use lbatlas_store::Store;
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ApiJson};
pub use past::PastDate;

pub const API_VERSION: &str = "1.0";

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub dispatcher: Arc<Dispatcher>,
}

fn resources() -> Router<AppState> {
    Router::new()
        .route("/loadbalancer/", get(equipment::list))
        .route("/loadbalancer/:lb/", get(equipment::detail))
        .route("/loadbalancer/:lb/refresh/", get(refresh::device))
        .route("/loadbalancer/:lb/action/", get(action::list_for_lb))
        .route("/loadbalancer/:lb/action/*rest", get(action::execute_for_lb))
        .route("/loadbalancer/:lb/virtualserver/", get(virtualserver::list))
        .route("/loadbalancer/:lb/virtualserver/:vs/", get(virtualserver::detail))
        .route(
            "/loadbalancer/:lb/virtualserver/:vs/refresh/",
            get(refresh::virtualserver),
        )
        .route(
            "/loadbalancer/:lb/virtualserver/:vs/action/",
            get(action::list_for_vs),
        )
        .route(
            "/loadbalancer/:lb/virtualserver/:vs/action/*rest",
            get(action::execute_for_vs),
        )
        .route(
            "/loadbalancer/:lb/virtualserver/:vs/realserver/",
            get(realserver::list_real),
        )
        .route(
            "/loadbalancer/:lb/virtualserver/:vs/realserver/:rs/",
            get(realserver::detail_real),
        )
        .route(
            "/loadbalancer/:lb/virtualserver/:vs/realserver/:rs/refresh/",
            get(refresh::realserver),
        )
        .route(
            "/loadbalancer/:lb/virtualserver/:vs/realserver/:rs/action/",
            get(action::list_for_rs),
        )
        .route(
            "/loadbalancer/:lb/virtualserver/:vs/realserver/:rs/action/*rest",
            get(action::execute_for_rs),
        )
        .route(
            "/loadbalancer/:lb/virtualserver/:vs/sorryserver/",
            get(realserver::list_sorry),
        )
        .route(
            "/loadbalancer/:lb/virtualserver/:vs/sorryserver/:rs/",
            get(realserver::detail_sorry),
        )
        .route("/refresh/", get(refresh::fleet))
        .route("/search/:term/", get(search::search))
}

/// The full API router: every resource is reachable directly and under
/// one `past/{date}` segment that attaches an as-of date to the request.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest(&format!("/api/{API_VERSION}"), resources())
        .nest(&format!("/api/{API_VERSION}/past/:date"), resources())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, interface: &str, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((interface, port)).await?;
    tracing::info!(interface, port, "web API listening");
    axum::serve(listener, router(state)).await
}
