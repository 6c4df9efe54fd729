// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

//! The federation tier's backend client. Unlike a general-purpose HTTP
//! client it treats 5xx (and network failures) as "try another backend"
//! and passes 4xx bodies through untouched, because a backend's 404 is a
//! real answer.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum MetaError {
    #[error("bad backend URL {0}: {1}")]
    BadUrl(String, String),

    #[error("backend error {0}")]
    Backend(u16),

    #[error("request failed: {0}")]
    Http(String),
}

#[derive(Clone, Debug)]
pub struct MetaResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl MetaResponse {
    pub fn is_json(&self) -> bool {
        self.content_type.starts_with("application/json")
    }
}

/// One GET against a backend's API: `{service}/api/1.0/[past/{date}/]
/// {segments.../}`. Implemented over reqwest in production and by an
/// in-memory table in tests.
#[async_trait]
pub trait MetaHttp: Send + Sync {
    async fn get(
        &self,
        service: &str,
        timeout: Option<Duration>,
        date: Option<&str>,
        segments: &[String],
    ) -> Result<MetaResponse, MetaError>;
}

pub(crate) fn backend_url(
    service: &str,
    date: Option<&str>,
    segments: &[String],
) -> Result<Url, MetaError> {
    let mut url = Url::parse(service).map_err(|e| MetaError::BadUrl(service.into(), e.to_string()))?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|()| MetaError::BadUrl(service.into(), "cannot be a base".into()))?;
        path.push("api");
        path.push("1.0");
        if let Some(date) = date {
            path.push("past");
            path.push(date);
        }
        for segment in segments {
            path.push(segment);
        }
        // Resources all carry a trailing slash.
        path.push("");
    }
    Ok(url)
}

pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl ReqwestHttp {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestHttp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetaHttp for ReqwestHttp {
    async fn get(
        &self,
        service: &str,
        timeout: Option<Duration>,
        date: Option<&str>,
        segments: &[String],
    ) -> Result<MetaResponse, MetaError> {
        let url = backend_url(service, date, segments)?;
        let mut request = self.client.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await.map_err(|e| MetaError::Http(e.to_string()))?;
        let status = response.status().as_u16();
        if status >= 500 {
            return Err(MetaError::Backend(status));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response
            .bytes()
            .await
            .map_err(|e| MetaError::Http(e.to_string()))?
            .to_vec();
        Ok(MetaResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_carry_the_past_segment_and_trailing_slash() {
        let url = backend_url("http://backend:8089", None, &["loadbalancer".into()]).unwrap();
        assert_eq!(url.as_str(), "http://backend:8089/api/1.0/loadbalancer/");
        let url = backend_url(
            "http://backend:8089",
            Some("2011-07-01 12:00:00"),
            &["search".into(), "web".into()],
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "http://backend:8089/api/1.0/past/2011-07-01%2012:00:00/search/web/"
        );
    }
}
