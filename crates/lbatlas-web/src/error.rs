// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use lbatlas_collectors::CollectError;
use lbatlas_store::StoreError;

/// JSON body with the charset the original wire format carries.
pub struct ApiJson(pub serde_json::Value);

impl IntoResponse for ApiJson {
    fn into_response(self) -> Response {
        let body = serde_json::to_vec(&self.0).unwrap_or_default();
        (
            [(header::CONTENT_TYPE, "application/json; charset=UTF-8")],
            body,
        )
            .into_response()
    }
}

#[derive(Debug)]
pub enum ApiError {
    /// The requested entity does not exist (or the action is undefined).
    NotFound,
    /// Malformed caller input, typically a vendor id that does not parse.
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };
        (status, ApiJson(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<CollectError> for ApiError {
    fn from(e: CollectError) -> Self {
        if e.is_input_error() {
            ApiError::BadRequest(e.to_string())
        } else {
            ApiError::Internal(e.to_string())
        }
    }
}

impl From<Arc<CollectError>> for ApiError {
    fn from(e: Arc<CollectError>) -> Self {
        if e.is_input_error() {
            ApiError::BadRequest(e.to_string())
        } else {
            ApiError::Internal(e.to_string())
        }
    }
}
